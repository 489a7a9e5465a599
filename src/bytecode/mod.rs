pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod ir;
pub mod op;

pub use compile::Compiler;
pub use compile_error::CompileError;
pub use disasm::disassemble;
pub use ir::{Instruction, ProgramBc, ProgramError};
pub use op::{Opcode, Operand};
