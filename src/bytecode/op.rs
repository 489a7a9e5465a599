use serde::{Deserialize, Serialize};

use crate::lang::value::Value;

// =============================================================================
// OPCODE - Instruction vocabulary
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    // stack ops
    /// Push the literal operand. `( -- x )`
    Push,
    /// Discard the top value. `( x -- )`
    Pop,
    /// Duplicate the top value. `( x -- x x )`
    Dup,

    // arithmetic
    Add,
    Sub,
    Mul,
    Div,

    // logic
    And,
    Or,
    Not,

    // comparison
    IsEq,
    IsGt,
    IsGe,

    // control flow; operands are absolute addresses
    /// Unconditional jump.
    Jump,
    /// Pop a condition, jump if it is truthy.
    JumpIf,

    // memory
    /// Push the named variable of the active frame.
    Load,
    /// Pop into the named variable of the active frame.
    Store,

    // calls
    /// Push a frame and jump to the operand address.
    Call,
    /// Pop the active frame and resume at its return address.
    Ret,
    /// Call a builtin: operands are the name and the argument count.
    Func,

    Halt,
}

impl Opcode {
    pub const ALL: [Opcode; 21] = [
        Opcode::Push,
        Opcode::Pop,
        Opcode::Dup,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::And,
        Opcode::Or,
        Opcode::Not,
        Opcode::IsEq,
        Opcode::IsGt,
        Opcode::IsGe,
        Opcode::Jump,
        Opcode::JumpIf,
        Opcode::Load,
        Opcode::Store,
        Opcode::Call,
        Opcode::Ret,
        Opcode::Func,
        Opcode::Halt,
    ];

    /// Name under which the opcode is registered in the instruction table.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Push => "PUSH",
            Opcode::Pop => "POP",
            Opcode::Dup => "DUP",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Not => "NOT",
            Opcode::IsEq => "ISEQ",
            Opcode::IsGt => "ISGT",
            Opcode::IsGe => "ISGE",
            Opcode::Jump => "JUMP",
            Opcode::JumpIf => "JUMP_IF",
            Opcode::Load => "LOAD",
            Opcode::Store => "STORE",
            Opcode::Call => "CALL",
            Opcode::Ret => "RET",
            Opcode::Func => "FUNC",
            Opcode::Halt => "HALT",
        }
    }

    /// Number of immediate operands carried by the instruction itself.
    pub fn arity(self) -> usize {
        match self {
            Opcode::Push
            | Opcode::Jump
            | Opcode::JumpIf
            | Opcode::Load
            | Opcode::Store
            | Opcode::Call => 1,
            Opcode::Func => 2,
            _ => 0,
        }
    }

    pub fn from_name(name: &str) -> Option<Opcode> {
        Opcode::ALL.into_iter().find(|op| op.name() == name)
    }

    /// Opcodes whose single operand is a code address.
    pub fn is_branch(self) -> bool {
        matches!(self, Opcode::Jump | Opcode::JumpIf | Opcode::Call)
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// OPERAND - Immediate instruction data
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// Literal for PUSH.
    Value(Value),
    /// Variable or builtin name.
    Name(String),
    /// Absolute instruction address.
    Address(usize),
    /// Argument count for FUNC.
    Count(usize),
}

impl Operand {
    pub fn kind(&self) -> &'static str {
        match self {
            Operand::Value(_) => "value",
            Operand::Name(_) => "name",
            Operand::Address(_) => "address",
            Operand::Count(_) => "count",
        }
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Value(Value::Str(s)) => write!(f, "{:?}", s),
            Operand::Value(v) => write!(f, "{}", v),
            Operand::Name(name) => write!(f, "{}", name),
            Operand::Address(addr) => write!(f, "{:04}", addr),
            Operand::Count(n) => write!(f, "{}", n),
        }
    }
}
