//! # cinder
//!
//! A two-pass bytecode compiler and a stack machine for a small imperative
//! language.
//!
//! The pipeline is:
//!
//! ```text
//! Program (AST) --Compiler--> ProgramBc --Machine--> stack + side effects
//! ```
//!
//! [`compile`] turns a [`Program`] into a flat instruction stream with
//! function bodies placed behind a leading jump. [`Machine`] executes that
//! stream with an operand stack and an explicit call-frame stack; builtins
//! registered in [`Builtins`] are its only way out to the host.

pub mod bytecode;
pub mod lang;
pub mod runtime;

pub use bytecode::{CompileError, Compiler, Instruction, Opcode, Operand, ProgramBc, disassemble};
pub use lang::{Node, Program, Value};
pub use runtime::{Builtins, Machine, RuntimeError, VmConfig};

/// Failure anywhere in the pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Compile `program`, resolving calls against the names in `builtins`.
pub fn compile(program: &Program, builtins: &Builtins) -> Result<ProgramBc, CompileError> {
    Compiler::with_builtins(builtins.names()).compile_program(program)
}

/// Compile and run to HALT, returning the halted machine.
pub fn compile_and_run(
    program: &Program,
    builtins: Builtins,
    config: VmConfig,
) -> Result<Machine, Error> {
    let program_bc = compile(program, &builtins)?;
    let mut machine = Machine::with_config(program_bc, builtins, config);
    machine.run()?;
    Ok(machine)
}
