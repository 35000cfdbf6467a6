use itertools::Itertools;
use thiserror::Error;

use crate::{
    backend::regalloc::AllocationError, diagnostics::Diagnostic, middle::lir::verify::LoweringError,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// The program is wrong. Every problem found before giving up is listed.
    #[error("{}", .0.iter().join("\n"))]
    Diagnostics(Vec<Diagnostic>),
    #[error("internal compiler error: {0}")]
    Lowering(#[from] LoweringError),
    #[error("internal compiler error: {0}")]
    Allocation(#[from] AllocationError),
}

impl CompileError {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CompileError::Diagnostics(diagnostics) => diagnostics,
            _ => &[],
        }
    }
}
