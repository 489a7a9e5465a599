use std::collections::{BTreeSet, HashMap};
use std::fmt::Write;

use crate::bytecode::{Instruction, Opcode, ProgramBc};

/// Disassemble a bytecode program into a listing.
///
/// Function entries get a `name:` label, jump/call targets a `►` marker and
/// a separator line.
pub fn disassemble(bc: &ProgramBc) -> String {
    let mut output = String::new();
    let jump_targets = collect_jump_targets(&bc.code);

    for (ip, ins) in bc.code.iter().enumerate() {
        if let Some(name) = bc.function_at(ip) {
            let _ = writeln!(output, "{}:", name);
        } else if jump_targets.contains(&ip) {
            output.push_str("      ┌──────────────────────────────────\n");
        }

        let _ = write!(output, "{:04} ", ip);

        if jump_targets.contains(&ip) {
            output.push_str("► ");
        } else {
            output.push_str("  ");
        }

        output.push_str(&format_instruction(bc, ins, ip));
        output.push('\n');
    }

    output
}

fn collect_jump_targets(code: &[Instruction]) -> BTreeSet<usize> {
    code.iter().filter_map(Instruction::target).collect()
}

fn format_instruction(bc: &ProgramBc, ins: &Instruction, ip: usize) -> String {
    let name = ins.opcode.name();

    match (ins.opcode, ins.target()) {
        (Opcode::Call, Some(target)) => match bc.function_at(target) {
            Some(func) => format!("{:<10}{:04} ; {}", name, target, func),
            None => format!("{:<10}{:04}", name, target),
        },
        (_, Some(target)) => {
            let direction = if target <= ip { "↑" } else { "↓" };
            format!("{:<10}{:04} {}", name, target, direction)
        }
        _ if ins.operands.is_empty() => name.to_string(),
        _ => {
            let operands: Vec<String> = ins.operands.iter().map(|o| o.to_string()).collect();
            format!("{:<10}{}", name, operands.join(" "))
        }
    }
}

/// Count how often each opcode occurs.
pub fn opcode_counts(bc: &ProgramBc) -> HashMap<Opcode, usize> {
    let mut counts = HashMap::new();
    for ins in &bc.code {
        *counts.entry(ins.opcode).or_insert(0) += 1;
    }
    counts
}

impl std::fmt::Display for ProgramBc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&disassemble(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_disassemble_straight_line() {
        let bc = ProgramBc::from_instructions(vec![
            Instruction::push(2),
            Instruction::store("x"),
            Instruction::func("print", 1),
            Instruction::halt(),
        ]);

        let expected = "\
0000   PUSH      2
0001   STORE     x
0002   FUNC      print 1
0003   HALT
";
        assert_eq!(disassemble(&bc), expected);
    }

    #[test]
    fn test_jump_targets_are_marked() {
        let bc = ProgramBc::from_instructions(vec![
            Instruction::push(true),
            Instruction::jump_if(3),
            Instruction::jump(0),
            Instruction::halt(),
        ]);

        let output = disassemble(&bc);
        assert!(output.contains("0000 ► PUSH"));
        assert!(output.contains("0003 ► HALT"));
        assert!(output.contains("JUMP_IF   0003 ↓"));
        assert!(output.contains("JUMP      0000 ↑"));
    }

    #[test]
    fn test_function_labels() {
        let mut bc = ProgramBc::from_instructions(vec![
            Instruction::jump(2),
            Instruction::ret(),
            Instruction::call(1),
            Instruction::halt(),
        ]);
        bc.functions.insert("noop".to_string(), 1);

        let output = disassemble(&bc);
        assert!(output.contains("noop:\n0001 ► RET"));
        assert!(output.contains("CALL      0001 ; noop"));
        assert_eq!(output, bc.to_string());
    }

    #[test]
    fn test_opcode_counts() {
        let bc = ProgramBc::from_instructions(vec![
            Instruction::push(1),
            Instruction::push(2),
            Instruction::simple(Opcode::Add),
            Instruction::push(3),
            Instruction::simple(Opcode::Mul),
        ]);

        let counts = opcode_counts(&bc);
        assert_eq!(counts.get(&Opcode::Push), Some(&3));
        assert_eq!(counts.get(&Opcode::Add), Some(&1));
        assert_eq!(counts.get(&Opcode::Halt), None);
    }
}
