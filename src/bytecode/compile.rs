use std::collections::{BTreeSet, HashSet};

use indexmap::IndexMap;
use tracing::debug;

use crate::{
    bytecode::{Instruction, Opcode, ProgramBc, compile_error::CompileError},
    lang::{
        node::{BinaryOp, Node, UnaryOp},
        program::Program,
    },
};

/// Operand written into a jump or call whose target is not known yet.
const PLACEHOLDER: usize = usize::MAX;

/// A CALL emitted before its callee's entry address was known.
#[derive(Debug)]
struct PendingCall {
    at: usize,
    callee: String,
}

pub struct Compiler {
    /// Output instruction stream
    code: Vec<Instruction>,

    /// Function table: name -> entry address
    functions: IndexMap<String, usize>,

    /// Names compiled to FUNC instead of CALL
    builtins: BTreeSet<String>,

    /// Calls waiting for their callee's entry address
    pending_calls: Vec<PendingCall>,

    /// Function whose body is being emitted (pass 1 only)
    current_function: Option<String>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    /// Compiler that knows no builtins.
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            functions: IndexMap::new(),
            builtins: BTreeSet::new(),
            pending_calls: Vec::new(),
            current_function: None,
        }
    }

    /// Compiler that emits FUNC for calls to any of `names`.
    pub fn with_builtins<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut compiler = Self::new();
        compiler.builtins = names.into_iter().map(Into::into).collect();
        compiler
    }

    pub fn compile_program(mut self, program: &Program) -> Result<ProgramBc, CompileError> {
        // Pass 1: function bodies, behind a leading jump
        self.compile_functions(program)?;

        // Pass 2: everything else, in order
        for node in &program.statements {
            if matches!(node, Node::Function { .. }) {
                continue;
            }
            self.compile_node(node)?;
        }
        self.emit(Instruction::halt());

        self.resolve_pending_calls()?;

        debug!(
            instructions = self.code.len(),
            functions = self.functions.len(),
            "program compiled"
        );

        let program_bc = ProgramBc {
            code: self.code,
            functions: self.functions,
        };
        debug_assert_eq!(program_bc.validate(), Ok(()));

        Ok(program_bc)
    }

    fn compile_functions(&mut self, program: &Program) -> Result<(), CompileError> {
        let mut decls = program.functions().peekable();
        if decls.peek().is_none() {
            return Ok(());
        }

        let skip_functions = self.emit_placeholder(Opcode::Jump);

        for decl in decls {
            let Node::Function { name, params, body } = decl else {
                continue;
            };
            self.compile_function(name, params, body)?;
        }

        let after_functions = self.here();
        self.patch(skip_functions, after_functions);

        Ok(())
    }

    fn compile_function(
        &mut self,
        name: &str,
        params: &[String],
        body: &Node,
    ) -> Result<(), CompileError> {
        if self.functions.contains_key(name) {
            return Err(CompileError::DuplicateFunction {
                name: name.to_string(),
            });
        }
        if self.builtins.contains(name) {
            return Err(CompileError::ShadowsBuiltin {
                name: name.to_string(),
            });
        }

        let mut seen = HashSet::new();
        for param in params {
            if !seen.insert(param.as_str()) {
                return Err(CompileError::DuplicateParameter {
                    function: name.to_string(),
                    param: param.clone(),
                });
            }
        }

        let entry = self.here();
        self.functions.insert(name.to_string(), entry);
        debug!(function = name, entry, params = params.len(), "function registered");

        // arguments were pushed in declaration order, so they pop in reverse
        for param in params.iter().rev() {
            self.emit(Instruction::store(param.clone()));
        }

        self.current_function = Some(name.to_string());
        let compiled = self.compile_node(body);
        self.current_function = None;
        compiled?;

        if self.needs_implicit_ret(entry) {
            self.emit(Instruction::ret());
        }

        Ok(())
    }

    /// A body needs a trailing RET unless it already ends with one that no
    /// jump inside the body skips past.
    fn needs_implicit_ret(&self, entry: usize) -> bool {
        let end = self.here();
        let ends_with_ret = end > entry
            && self
                .code
                .last()
                .is_some_and(|ins| ins.opcode == Opcode::Ret);
        let jumps_to_end = self.code[entry..]
            .iter()
            .any(|ins| ins.target() == Some(end));

        !ends_with_ret || jumps_to_end
    }

    fn resolve_pending_calls(&mut self) -> Result<(), CompileError> {
        for pending in std::mem::take(&mut self.pending_calls) {
            let Some(&entry) = self.functions.get(&pending.callee) else {
                let builtins: Vec<&str> = self.builtins.iter().map(String::as_str).collect();
                return Err(CompileError::unknown_function(&pending.callee, &builtins));
            };
            self.patch(pending.at, entry);
        }
        Ok(())
    }

    fn compile_node(&mut self, node: &Node) -> Result<(), CompileError> {
        match node {
            Node::Literal(value) => {
                self.emit(Instruction::push(value.clone()));
            }

            Node::Identifier(name) => {
                self.emit(Instruction::load(name.clone()));
            }

            Node::Assign { name, value } => {
                self.compile_node(value)?;
                self.emit(Instruction::store(name.clone()));
            }

            Node::Binary { op, left, right } => {
                self.compile_node(left)?;
                self.compile_node(right)?;
                self.emit_binary_op(*op);
            }

            Node::Unary { op, operand } => {
                self.compile_node(operand)?;
                match op {
                    UnaryOp::Not => {
                        self.emit(Instruction::simple(Opcode::Not));
                    }
                    UnaryOp::Neg => {
                        self.emit(Instruction::push(-1));
                        self.emit(Instruction::simple(Opcode::Mul));
                    }
                }
            }

            Node::Call { callee, args } => {
                for arg in args {
                    self.compile_node(arg)?;
                }
                self.emit_call(callee, args.len());
            }

            Node::Return(value) => {
                self.compile_node(value)?;
                self.emit(Instruction::ret());
            }

            Node::Block(children) => {
                for child in children {
                    self.compile_node(child)?;
                }
            }

            Node::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.compile_node(condition)?;
                self.emit(Instruction::simple(Opcode::Not));
                let skip_then = self.emit_placeholder(Opcode::JumpIf);

                self.compile_node(then_branch)?;

                match else_branch {
                    Some(else_branch) => {
                        let skip_else = self.emit_placeholder(Opcode::Jump);
                        self.patch(skip_then, self.here());
                        self.compile_node(else_branch)?;
                        self.patch(skip_else, self.here());
                    }
                    None => self.patch(skip_then, self.here()),
                }
            }

            Node::While { condition, body } => {
                let top = self.here();
                self.compile_node(condition)?;
                self.emit(Instruction::simple(Opcode::Not));
                let exit = self.emit_placeholder(Opcode::JumpIf);

                self.compile_node(body)?;
                self.emit(Instruction::jump(top));

                self.patch(exit, self.here());
            }

            Node::DoWhile { body, condition } => {
                let top = self.here();
                self.compile_node(body)?;
                self.compile_node(condition)?;
                self.emit(Instruction::jump_if(top));
            }

            Node::For {
                var,
                start,
                end,
                body,
            } => {
                self.compile_node(start)?;
                self.emit(Instruction::store(var.clone()));

                // exit once var >= end
                let top = self.here();
                self.emit(Instruction::load(var.clone()));
                self.compile_node(end)?;
                self.emit(Instruction::simple(Opcode::IsGe));
                let exit = self.emit_placeholder(Opcode::JumpIf);

                self.compile_node(body)?;

                self.emit(Instruction::load(var.clone()));
                self.emit(Instruction::push(1));
                self.emit(Instruction::simple(Opcode::Add));
                self.emit(Instruction::store(var.clone()));
                self.emit(Instruction::jump(top));

                self.patch(exit, self.here());
            }

            Node::Function { name, .. } => {
                let context = match &self.current_function {
                    Some(outer) => format!("function '{}'", outer),
                    None => "a nested block".to_string(),
                };
                return Err(CompileError::nested_function(name, &context));
            }
        }

        Ok(())
    }

    fn emit_binary_op(&mut self, op: BinaryOp) {
        let opcodes: &[Opcode] = match op {
            BinaryOp::Add => &[Opcode::Add],
            BinaryOp::Sub => &[Opcode::Sub],
            BinaryOp::Mul => &[Opcode::Mul],
            BinaryOp::Div => &[Opcode::Div],
            BinaryOp::And => &[Opcode::And],
            BinaryOp::Or => &[Opcode::Or],
            BinaryOp::Eq => &[Opcode::IsEq],
            BinaryOp::Gt => &[Opcode::IsGt],
            BinaryOp::GtEq => &[Opcode::IsGe],
            // no dedicated opcodes: negate the complement
            BinaryOp::NotEq => &[Opcode::IsEq, Opcode::Not],
            BinaryOp::Lt => &[Opcode::IsGe, Opcode::Not],
            BinaryOp::LtEq => &[Opcode::IsGt, Opcode::Not],
        };

        for opcode in opcodes {
            self.emit(Instruction::simple(*opcode));
        }
    }

    fn emit_call(&mut self, callee: &str, argc: usize) {
        if self.builtins.contains(callee) {
            self.emit(Instruction::func(callee, argc));
            return;
        }

        match self.functions.get(callee) {
            Some(&entry) => {
                self.emit(Instruction::call(entry));
            }
            None => {
                let at = self.emit_placeholder(Opcode::Call);
                self.pending_calls.push(PendingCall {
                    at,
                    callee: callee.to_string(),
                });
            }
        }
    }

    // =========================================================================
    // Emission and backpatching
    // =========================================================================

    /// Address the next emitted instruction will get.
    fn here(&self) -> usize {
        self.code.len()
    }

    fn emit(&mut self, ins: Instruction) -> usize {
        let at = self.here();
        self.code.push(ins);
        at
    }

    /// Emit a branch whose target is patched later.
    fn emit_placeholder(&mut self, opcode: Opcode) -> usize {
        let ins = match opcode {
            Opcode::Jump => Instruction::jump(PLACEHOLDER),
            Opcode::JumpIf => Instruction::jump_if(PLACEHOLDER),
            _ => Instruction::call(PLACEHOLDER),
        };
        self.emit(ins)
    }

    /// Rewrite the target operand of the branch at `at`. Addresses never move.
    fn patch(&mut self, at: usize, target: usize) {
        let patched = self.code[at].set_target(target);
        debug_assert!(patched, "patched a non-branch instruction at {}", at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::value::Value;
    use pretty_assertions::assert_eq;

    fn compile(statements: Vec<Node>) -> Result<ProgramBc, CompileError> {
        Compiler::with_builtins(["print"]).compile_program(&Program::new(statements))
    }

    fn op(opcode: Opcode) -> Instruction {
        Instruction::simple(opcode)
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    #[test]
    fn test_compile_literal_and_assignment() {
        let bc = compile(vec![Node::assign("x", Node::int(5))]).unwrap();

        assert_eq!(
            bc.code,
            vec![
                Instruction::push(5),
                Instruction::store("x"),
                Instruction::halt()
            ]
        );
        assert!(bc.functions.is_empty());
    }

    #[test]
    fn test_binary_operands_left_then_right() {
        let bc = compile(vec![Node::binary(
            BinaryOp::Sub,
            Node::ident("a"),
            Node::ident("b"),
        )])
        .unwrap();

        assert_eq!(
            bc.code,
            vec![
                Instruction::load("a"),
                Instruction::load("b"),
                op(Opcode::Sub),
                Instruction::halt()
            ]
        );
    }

    #[test]
    fn test_complement_comparisons() {
        for (binop, expected) in [
            (BinaryOp::NotEq, [Opcode::IsEq, Opcode::Not]),
            (BinaryOp::Lt, [Opcode::IsGe, Opcode::Not]),
            (BinaryOp::LtEq, [Opcode::IsGt, Opcode::Not]),
        ] {
            let bc = compile(vec![Node::binary(binop, Node::int(1), Node::int(2))]).unwrap();
            assert_eq!(bc.code[2].opcode, expected[0], "{:?}", binop);
            assert_eq!(bc.code[3].opcode, expected[1], "{:?}", binop);
        }
    }

    #[test]
    fn test_unary_negation() {
        let bc = compile(vec![Node::unary(UnaryOp::Neg, Node::ident("x"))]).unwrap();

        assert_eq!(
            bc.code,
            vec![
                Instruction::load("x"),
                Instruction::push(-1),
                op(Opcode::Mul),
                Instruction::halt()
            ]
        );
    }

    #[test]
    fn test_builtin_call() {
        let bc = compile(vec![Node::call(
            "print",
            vec![Node::string("a"), Node::int(1)],
        )])
        .unwrap();

        assert_eq!(
            bc.code,
            vec![
                Instruction::push(Value::Str("a".to_string())),
                Instruction::push(1),
                Instruction::func("print", 2),
                Instruction::halt()
            ]
        );
    }

    #[test]
    fn test_unknown_callee_is_compile_error() {
        let err = compile(vec![Node::call("missing", vec![])]).unwrap_err();

        assert!(matches!(
            err,
            CompileError::UnknownFunction { ref name, .. } if name == "missing"
        ));
    }

    #[test]
    fn test_builtins_are_unknown_to_a_plain_compiler() {
        let result = Compiler::new()
            .compile_program(&Program::new(vec![Node::call("print", vec![Node::int(1)])]));
        assert!(result.is_err());
    }

    // =========================================================================
    // Control flow
    // =========================================================================

    #[test]
    fn test_if_without_else() {
        let bc = compile(vec![Node::if_else(
            Node::ident("x"),
            Node::assign("y", Node::int(1)),
            None,
        )])
        .unwrap();

        assert_eq!(
            bc.code,
            vec![
                Instruction::load("x"),
                op(Opcode::Not),
                Instruction::jump_if(5),
                Instruction::push(1),
                Instruction::store("y"),
                Instruction::halt()
            ]
        );
    }

    #[test]
    fn test_if_with_else() {
        let bc = compile(vec![Node::if_else(
            Node::ident("x"),
            Node::assign("y", Node::int(1)),
            Some(Node::assign("y", Node::int(2))),
        )])
        .unwrap();

        assert_eq!(
            bc.code,
            vec![
                Instruction::load("x"),
                op(Opcode::Not),
                Instruction::jump_if(6),
                Instruction::push(1),
                Instruction::store("y"),
                Instruction::jump(8),
                Instruction::push(2),
                Instruction::store("y"),
                Instruction::halt()
            ]
        );
    }

    #[test]
    fn test_while_loop_shape() {
        let bc = compile(vec![Node::while_loop(
            Node::ident("go"),
            Node::assign("go", Node::boolean(false)),
        )])
        .unwrap();

        assert_eq!(
            bc.code,
            vec![
                Instruction::load("go"),
                op(Opcode::Not),
                Instruction::jump_if(6),
                Instruction::push(false),
                Instruction::store("go"),
                Instruction::jump(0),
                Instruction::halt()
            ]
        );
    }

    #[test]
    fn test_do_while_tests_after_body() {
        let bc = compile(vec![Node::do_while(
            Node::assign("n", Node::int(0)),
            Node::ident("n"),
        )])
        .unwrap();

        assert_eq!(
            bc.code,
            vec![
                Instruction::push(0),
                Instruction::store("n"),
                Instruction::load("n"),
                Instruction::jump_if(0),
                Instruction::halt()
            ]
        );
    }

    #[test]
    fn test_for_loop_shape() {
        let bc = compile(vec![Node::for_range(
            "i",
            Node::int(0),
            Node::int(3),
            Node::Block(vec![]),
        )])
        .unwrap();

        assert_eq!(
            bc.code,
            vec![
                Instruction::push(0),
                Instruction::store("i"),
                Instruction::load("i"),
                Instruction::push(3),
                op(Opcode::IsGe),
                Instruction::jump_if(11),
                Instruction::load("i"),
                Instruction::push(1),
                op(Opcode::Add),
                Instruction::store("i"),
                Instruction::jump(2),
                Instruction::halt()
            ]
        );
    }

    // =========================================================================
    // Functions
    // =========================================================================

    #[test]
    fn test_function_layout() {
        let bc = compile(vec![
            Node::function(
                "add",
                &["a", "b"],
                Node::ret(Node::binary(BinaryOp::Add, Node::ident("a"), Node::ident("b"))),
            ),
            Node::call("print", vec![Node::call("add", vec![Node::int(2), Node::int(3)])]),
        ])
        .unwrap();

        assert_eq!(
            bc.code,
            vec![
                Instruction::jump(7),
                Instruction::store("b"),
                Instruction::store("a"),
                Instruction::load("a"),
                Instruction::load("b"),
                op(Opcode::Add),
                Instruction::ret(),
                Instruction::push(2),
                Instruction::push(3),
                Instruction::call(1),
                Instruction::func("print", 1),
                Instruction::halt()
            ]
        );
        assert_eq!(bc.functions.get("add"), Some(&1));
    }

    #[test]
    fn test_implicit_ret_appended() {
        let bc = compile(vec![Node::function(
            "noop",
            &[],
            Node::assign("x", Node::int(1)),
        )])
        .unwrap();

        assert_eq!(bc.code[3], Instruction::ret());
        assert_eq!(bc.code[0], Instruction::jump(4));
    }

    #[test]
    fn test_implicit_ret_when_branch_jumps_past_final_ret() {
        // if c { return 1 } else { return 2 }: the then-branch's JUMP lands
        // one past the final RET, so another RET must be there
        let bc = compile(vec![Node::function(
            "pick",
            &["c"],
            Node::if_else(
                Node::ident("c"),
                Node::ret(Node::int(1)),
                Some(Node::ret(Node::int(2))),
            ),
        )])
        .unwrap();

        let end = bc.code.len() - 1; // HALT
        assert_eq!(bc.code[end - 1], Instruction::ret());
        assert_eq!(bc.code[end - 2], Instruction::ret());
        assert_eq!(bc.validate(), Ok(()));
    }

    #[test]
    fn test_functions_interleaved_with_statements() {
        let bc = compile(vec![
            Node::assign("x", Node::int(1)),
            Node::function("f", &[], Node::ret(Node::int(7))),
            Node::assign("y", Node::call("f", vec![])),
        ])
        .unwrap();

        // function body first, then top-level statements in source order
        assert_eq!(bc.code[0], Instruction::jump(3));
        assert_eq!(bc.code[3], Instruction::push(1));
        assert_eq!(bc.code[5], Instruction::call(1));
    }

    #[test]
    fn test_forward_reference_between_functions() {
        let bc = compile(vec![
            Node::function("a", &[], Node::ret(Node::call("b", vec![]))),
            Node::function("b", &[], Node::ret(Node::int(1))),
        ])
        .unwrap();

        let b_entry = bc.functions["b"];
        assert_eq!(bc.code[1], Instruction::call(b_entry));
        assert_eq!(bc.validate(), Ok(()));
    }

    #[test]
    fn test_nested_function_rejected() {
        let err = compile(vec![Node::function(
            "outer",
            &[],
            Node::function("inner", &[], Node::Block(vec![])),
        )])
        .unwrap_err();

        assert_eq!(
            err,
            CompileError::nested_function("inner", "function 'outer'")
        );
    }

    #[test]
    fn test_function_in_top_level_block_rejected() {
        let err = compile(vec![Node::Block(vec![Node::function(
            "f",
            &[],
            Node::Block(vec![]),
        )])])
        .unwrap_err();

        assert!(matches!(err, CompileError::NestedFunction { .. }));
    }

    #[test]
    fn test_duplicate_function_rejected() {
        let err = compile(vec![
            Node::function("f", &[], Node::Block(vec![])),
            Node::function("f", &[], Node::Block(vec![])),
        ])
        .unwrap_err();

        assert_eq!(
            err,
            CompileError::DuplicateFunction {
                name: "f".to_string()
            }
        );
    }

    #[test]
    fn test_function_shadowing_builtin_rejected() {
        let print = Node::function("print", &["x"], Node::ret(Node::ident("x")));

        let err = compile(vec![print.clone()]).unwrap_err();
        assert_eq!(
            err,
            CompileError::ShadowsBuiltin {
                name: "print".to_string()
            }
        );

        // without a builtin of that name it is an ordinary function
        let bc = Compiler::new()
            .compile_program(&Program::new(vec![
                print,
                Node::call("print", vec![Node::int(1)]),
            ]))
            .unwrap();
        assert_eq!(bc.functions.get("print"), Some(&1));
        assert!(bc.code.contains(&Instruction::call(1)));
    }

    #[test]
    fn test_duplicate_parameter_rejected() {
        let err = compile(vec![Node::function("f", &["a", "a"], Node::Block(vec![]))])
            .unwrap_err();

        assert!(matches!(err, CompileError::DuplicateParameter { .. }));
    }

    #[test]
    fn test_no_leading_jump_without_functions() {
        let bc = compile(vec![Node::call("print", vec![Node::int(1)])]).unwrap();
        assert_eq!(bc.code[0], Instruction::push(1));
    }
}
