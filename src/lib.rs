//! Core of the Rill compiler: type inference, match compilation, lowering to
//! LIR, optimization and register allocation. Parsing and code emission live
//! on either side of this crate.

pub mod backend;
pub mod diagnostics;
pub mod driver;
pub mod error;
pub mod frontend;
pub mod index;
pub mod middle;

pub use driver::{CompileOptions, CompiledProgram, compile_program};
pub use error::CompileError;
