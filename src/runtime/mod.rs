//! # Bytecode execution
//!
//! [`Machine`] runs a [`ProgramBc`](crate::bytecode::ProgramBc) by looking
//! every opcode up in an [`InstructionTable`] and handing its operands to the
//! registered handler.

pub mod builtins;
pub mod config;
pub mod frame;
pub mod handlers;
pub mod runtime_error;
pub mod table;
pub mod vm_bc;

pub use builtins::{BuiltinError, BuiltinFn, Builtins};
pub use config::VmConfig;
pub use frame::Frame;
pub use runtime_error::{RuntimeError, StackKind};
pub use table::{Handler, InstructionDescriptor, InstructionTable};
pub use vm_bc::{ExecutionStats, Machine, MachineState};
