//! Optimizations on lowered functions. Every pass keeps each block ending in
//! exactly one terminator, but may leave blocks unreachable.

use log::debug;

use crate::middle::lir;

pub mod constant_folding;
pub mod constant_propagation;
pub mod dead_code;

pub use constant_folding::ConstantFoldingPass;
pub use constant_propagation::ConstantPropagationPass;
pub use dead_code::DeadCodeEliminationPass;

/// A transformation of a single function
pub trait FunctionPass: Send {
    fn name(&self) -> &'static str;

    /// Returns true if the function was changed
    fn run_on_function(&mut self, function: &mut lir::Function) -> bool;
}

pub struct PassManager {
    passes: Vec<Box<dyn FunctionPass>>,
    max_iterations: usize,
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PassManager {
    pub const DEFAULT_MAX_ITERATIONS: usize = 16;

    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_default_passes() -> Self {
        let mut manager = Self::new();
        manager.add_pass(ConstantPropagationPass);
        manager.add_pass(ConstantFoldingPass);
        manager.add_pass(DeadCodeEliminationPass);
        manager
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn add_pass<P: FunctionPass + 'static>(&mut self, pass: P) {
        self.passes.push(Box::new(pass));
    }

    /// Runs every pass in order until none of them changes the function or
    /// the iteration limit is hit. Returns the number of iterations which
    /// changed something.
    pub fn run(&mut self, function: &mut lir::Function) -> usize {
        let mut iterations = 0;

        while iterations < self.max_iterations {
            let mut changed = false;

            for pass in &mut self.passes {
                if pass.run_on_function(function) {
                    debug!("`{}` changed `{}`", pass.name(), function.name);
                    changed = true;
                }
            }

            if !changed {
                break;
            }

            iterations += 1;
        }

        iterations
    }
}
