//! Instruction table: opcode name -> (arity, handler).

use std::collections::HashMap;

use crate::bytecode::{Opcode, Operand};
use crate::runtime::handlers;
use crate::runtime::runtime_error::RuntimeError;
use crate::runtime::vm_bc::MachineState;

/// Execution logic for one opcode.
///
/// Handlers receive the machine state with the instruction pointer already
/// advanced past the instruction, plus exactly `arity` immediate operands.
pub type Handler = fn(&mut MachineState, &[Operand]) -> Result<(), RuntimeError>;

/// Name, arity and handler of one opcode. Immutable once registered.
#[derive(Debug, Clone)]
pub struct InstructionDescriptor {
    pub name: String,
    pub arity: usize,
    pub handler: Handler,
}

impl InstructionDescriptor {
    pub fn new(name: impl Into<String>, arity: usize, handler: Handler) -> Self {
        Self {
            name: name.into(),
            arity,
            handler,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InstructionTable {
    table: HashMap<String, InstructionDescriptor>,
}

impl InstructionTable {
    /// Table with nothing registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with every opcode in [`Opcode::ALL`] registered.
    pub fn standard() -> Self {
        macro_rules! op {
            ($opcode:ident, $handler:ident) => {
                InstructionDescriptor::new(
                    Opcode::$opcode.name(),
                    Opcode::$opcode.arity(),
                    handlers::$handler,
                )
            };
        }

        let mut table = Self::new();
        for descriptor in [
            op!(Halt, halt),
            op!(Push, push),
            op!(Pop, pop),
            op!(Dup, dup),
            op!(Add, add),
            op!(Sub, sub),
            op!(Mul, mul),
            op!(Div, div),
            op!(And, and),
            op!(Or, or),
            op!(Not, not),
            op!(IsEq, is_eq),
            op!(IsGt, is_gt),
            op!(IsGe, is_ge),
            op!(Jump, jump),
            op!(JumpIf, jump_if),
            op!(Load, load),
            op!(Store, store),
            op!(Func, call_builtin),
            op!(Call, call),
            op!(Ret, ret),
        ] {
            table.register(descriptor);
        }
        table
    }

    /// Insert a descriptor, replacing any existing one with the same name.
    pub fn register(&mut self, descriptor: InstructionDescriptor) {
        self.table.insert(descriptor.name.clone(), descriptor);
    }

    pub fn resolve(&self, name: &str) -> Result<&InstructionDescriptor, RuntimeError> {
        self.table
            .get(name)
            .ok_or_else(|| RuntimeError::UnsupportedInstruction {
                name: name.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
