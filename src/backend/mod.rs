//! The backend of the compiler deals with allocated LIR. The middle hands
//! over functions whose values live in an unbounded number of virtual
//! registers, and the backend decides where each of them lives on a machine
//! with a fixed number of registers, spilling the rest to the stack.
//!
//! Everything here is built on the liveness analysis in [`liveness`], which
//! the optimization passes share.

pub mod liveness;
pub mod regalloc;
