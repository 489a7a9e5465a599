use crate::bytecode::Opcode;

/// Which stack ran dry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackKind {
    /// Pop on an empty operand stack.
    Operand,
    /// RET with only the root frame left.
    Frame,
}

impl std::fmt::Display for StackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StackKind::Operand => f.write_str("operand stack"),
            StackKind::Frame => f.write_str("call-frame stack"),
        }
    }
}

/// Fatal execution failure. The machine halts and never retries.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    #[error("runtime error: instruction '{name}' is not supported")]
    UnsupportedInstruction { name: String },

    #[error("runtime error: malformed {opcode} at {address:04}: {reason}")]
    MalformedInstruction {
        address: usize,
        opcode: Opcode,
        reason: String,
    },

    #[error("runtime error: {opcode} underflowed the {stack}")]
    StackUnderflow { stack: StackKind, opcode: Opcode },

    #[error("runtime error: variable '{name}' is not bound in the current frame")]
    UnboundVariable { name: String },

    #[error("runtime error: unknown builtin '{name}'")]
    UnknownBuiltin { name: String },

    #[error("runtime error: builtin '{name}' failed: {message}")]
    Builtin { name: String, message: String },

    #[error("runtime error: type error: cannot apply {opcode} to {left} and {right}")]
    TypeMismatch {
        opcode: Opcode,
        left: &'static str,
        right: &'static str,
    },

    #[error("runtime error: division by zero")]
    DivisionByZero,

    #[error("runtime error: integer overflow in {opcode}")]
    IntegerOverflow { opcode: Opcode },

    #[error("runtime error: instruction pointer {address:04} is outside the program (len {len})")]
    InvalidAddress { address: usize, len: usize },

    #[error("runtime error: execution step limit exceeded ({limit})")]
    StepLimitExceeded { limit: u64 },

    #[error("runtime error: call depth limit exceeded ({limit}) - possible infinite recursion")]
    FrameLimitExceeded { limit: usize },

    #[error("runtime error: operand stack size limit exceeded ({limit})")]
    StackOverflow { limit: usize },
}

pub fn stack_underflow(opcode: Opcode) -> RuntimeError {
    RuntimeError::StackUnderflow {
        stack: StackKind::Operand,
        opcode,
    }
}

pub fn type_mismatch(
    opcode: Opcode,
    left: &crate::lang::value::Value,
    right: &crate::lang::value::Value,
) -> RuntimeError {
    RuntimeError::TypeMismatch {
        opcode,
        left: left.type_name(),
        right: right.type_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::value::Value;

    #[test]
    fn test_stack_underflow_display() {
        let err = stack_underflow(Opcode::Add);
        assert_eq!(
            err.to_string(),
            "runtime error: ADD underflowed the operand stack"
        );

        let err = RuntimeError::StackUnderflow {
            stack: StackKind::Frame,
            opcode: Opcode::Ret,
        };
        assert!(err.to_string().contains("call-frame stack"));
    }

    #[test]
    fn test_type_mismatch_names_both_sides() {
        let err = type_mismatch(Opcode::Sub, &Value::Str("a".into()), &Value::Int(1));
        let msg = err.to_string();
        assert!(msg.contains("SUB"));
        assert!(msg.contains("string and int"));
    }

    #[test]
    fn test_malformed_instruction_display() {
        let err = RuntimeError::MalformedInstruction {
            address: 3,
            opcode: Opcode::Push,
            reason: "expected 1 operand(s), found 0".to_string(),
        };
        assert!(err.to_string().contains("PUSH at 0003"));
    }
}
