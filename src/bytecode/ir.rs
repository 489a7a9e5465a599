use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::bytecode::op::{Opcode, Operand};
use crate::lang::value::Value;

/// One opcode occurrence plus its immediate operands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
}

impl Instruction {
    pub fn new(opcode: Opcode, operands: Vec<Operand>) -> Self {
        Self { opcode, operands }
    }

    /// Instruction without immediates (ADD, RET, HALT, ...).
    pub fn simple(opcode: Opcode) -> Self {
        Self::new(opcode, Vec::new())
    }

    pub fn push(value: impl Into<Value>) -> Self {
        Self::new(Opcode::Push, vec![Operand::Value(value.into())])
    }

    pub fn load(name: impl Into<String>) -> Self {
        Self::new(Opcode::Load, vec![Operand::Name(name.into())])
    }

    pub fn store(name: impl Into<String>) -> Self {
        Self::new(Opcode::Store, vec![Operand::Name(name.into())])
    }

    pub fn jump(target: usize) -> Self {
        Self::new(Opcode::Jump, vec![Operand::Address(target)])
    }

    pub fn jump_if(target: usize) -> Self {
        Self::new(Opcode::JumpIf, vec![Operand::Address(target)])
    }

    pub fn call(target: usize) -> Self {
        Self::new(Opcode::Call, vec![Operand::Address(target)])
    }

    pub fn func(name: impl Into<String>, argc: usize) -> Self {
        Self::new(
            Opcode::Func,
            vec![Operand::Name(name.into()), Operand::Count(argc)],
        )
    }

    pub fn ret() -> Self {
        Self::simple(Opcode::Ret)
    }

    pub fn halt() -> Self {
        Self::simple(Opcode::Halt)
    }

    /// Code address of a JUMP / JUMP_IF / CALL.
    pub fn target(&self) -> Option<usize> {
        if !self.opcode.is_branch() {
            return None;
        }
        match self.operands.first() {
            Some(Operand::Address(target)) => Some(*target),
            _ => None,
        }
    }

    /// Rewrite the address operand in place. Returns false if this is not a
    /// branch instruction.
    pub fn set_target(&mut self, target: usize) -> bool {
        if !self.opcode.is_branch() {
            return false;
        }
        match self.operands.first_mut() {
            Some(Operand::Address(slot)) => {
                *slot = target;
                true
            }
            _ => false,
        }
    }
}

/// Structural problem found by [`ProgramBc::validate`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProgramError {
    #[error("{opcode} at {address:04} expects {expected} operand(s), found {found}")]
    ArityMismatch {
        address: usize,
        opcode: Opcode,
        expected: usize,
        found: usize,
    },

    #[error("{opcode} at {address:04}: operand {index} should be {expected}, found {found}")]
    OperandKind {
        address: usize,
        opcode: Opcode,
        index: usize,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{opcode} at {address:04} targets {target:04}, outside the program (len {len})")]
    InvalidTarget {
        address: usize,
        opcode: Opcode,
        target: usize,
        len: usize,
    },

    #[error("function '{name}' entry {entry:04} is outside the program (len {len})")]
    InvalidEntry {
        name: String,
        entry: usize,
        len: usize,
    },
}

/// A compiled bytecode program.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramBc {
    /// Flat instruction stream. An address is an index into this vector.
    pub code: Vec<Instruction>,

    /// Function entry addresses, in declaration order: name -> address.
    /// Debug symbols only; the engine never reads them.
    pub functions: IndexMap<String, usize>,
}

impl ProgramBc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_instructions(code: Vec<Instruction>) -> Self {
        Self {
            code,
            functions: IndexMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn get(&self, address: usize) -> Option<&Instruction> {
        self.code.get(address)
    }

    /// Name of the function whose entry is `address`, if any.
    pub fn function_at(&self, address: usize) -> Option<&str> {
        self.functions
            .iter()
            .find(|(_, entry)| **entry == address)
            .map(|(name, _)| name.as_str())
    }

    /// Check operand counts, operand kinds and branch targets.
    pub fn validate(&self) -> Result<(), ProgramError> {
        let len = self.code.len();

        for (address, ins) in self.code.iter().enumerate() {
            let expected = ins.opcode.arity();
            if ins.operands.len() != expected {
                return Err(ProgramError::ArityMismatch {
                    address,
                    opcode: ins.opcode,
                    expected,
                    found: ins.operands.len(),
                });
            }

            for (index, (operand, kind)) in ins
                .operands
                .iter()
                .zip(expected_kinds(ins.opcode))
                .enumerate()
            {
                if operand.kind() != *kind {
                    return Err(ProgramError::OperandKind {
                        address,
                        opcode: ins.opcode,
                        index,
                        expected: *kind,
                        found: operand.kind(),
                    });
                }
            }

            if let Some(target) = ins.target() {
                if target >= len {
                    return Err(ProgramError::InvalidTarget {
                        address,
                        opcode: ins.opcode,
                        target,
                        len,
                    });
                }
            }
        }

        for (name, entry) in &self.functions {
            if *entry >= len {
                return Err(ProgramError::InvalidEntry {
                    name: name.clone(),
                    entry: *entry,
                    len,
                });
            }
        }

        Ok(())
    }
}

fn expected_kinds(opcode: Opcode) -> &'static [&'static str] {
    match opcode {
        Opcode::Push => &["value"],
        Opcode::Load | Opcode::Store => &["name"],
        Opcode::Jump | Opcode::JumpIf | Opcode::Call => &["address"],
        Opcode::Func => &["name", "count"],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_set_target_only_touches_branches() {
        let mut jump = Instruction::jump(0);
        assert!(jump.set_target(9));
        assert_eq!(jump.target(), Some(9));

        let mut push = Instruction::push(1);
        assert!(!push.set_target(9));
        assert_eq!(push.target(), None);
    }

    #[test]
    fn test_validate_accepts_well_formed_program() {
        let prog = ProgramBc::from_instructions(vec![
            Instruction::push(1),
            Instruction::jump_if(3),
            Instruction::func("print", 0),
            Instruction::halt(),
        ]);
        assert_eq!(prog.validate(), Ok(()));
    }

    #[test]
    fn test_validate_rejects_out_of_range_target() {
        let prog = ProgramBc::from_instructions(vec![Instruction::jump(5), Instruction::halt()]);
        assert_eq!(
            prog.validate(),
            Err(ProgramError::InvalidTarget {
                address: 0,
                opcode: Opcode::Jump,
                target: 5,
                len: 2,
            })
        );
    }

    #[test]
    fn test_validate_rejects_wrong_arity() {
        let prog = ProgramBc::from_instructions(vec![Instruction::new(Opcode::Push, vec![])]);
        assert!(matches!(
            prog.validate(),
            Err(ProgramError::ArityMismatch {
                expected: 1,
                found: 0,
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_wrong_operand_kind() {
        let prog = ProgramBc::from_instructions(vec![Instruction::new(
            Opcode::Load,
            vec![Operand::Address(0)],
        )]);
        let err = prog.validate().unwrap_err();
        assert!(err.to_string().contains("should be name"));
    }

    #[test]
    fn test_json_round_trip() {
        let mut prog = ProgramBc::from_instructions(vec![
            Instruction::jump(3),
            Instruction::store("x"),
            Instruction::ret(),
            Instruction::push(2.5),
            Instruction::push("s"),
            Instruction::call(1),
            Instruction::func("print", 1),
            Instruction::halt(),
        ]);
        prog.functions.insert("f".to_string(), 1);

        let json = serde_json::to_string(&prog).unwrap();
        let back: ProgramBc = serde_json::from_str(&json).unwrap();

        assert_eq!(back, prog);
        assert_eq!(back.validate(), Ok(()));
    }

    #[test]
    fn test_function_at() {
        let mut prog = ProgramBc::from_instructions(vec![Instruction::ret(), Instruction::halt()]);
        prog.functions.insert("f".to_string(), 0);
        assert_eq!(prog.function_at(0), Some("f"));
        assert_eq!(prog.function_at(1), None);
    }
}
