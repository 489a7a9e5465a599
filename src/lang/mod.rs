//! # Source-level language model
//!
//! The AST consumed by the bytecode compiler, plus the runtime [`Value`]
//! type shared by both ends of the pipeline.

pub mod literal;
pub mod node;
pub mod program;
pub mod value;

pub use literal::{LiteralError, parse_literal};
pub use node::{BinaryOp, Node, UnaryOp};
pub use program::Program;
pub use value::Value;
