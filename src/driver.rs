//! Runs a whole program through the compiler. Type checking and match
//! checking see every function before anything is reported, so a single run
//! lists all the problems of a program. Only when there are none is each
//! function lowered, optimized and allocated on its own.

use log::{debug, info};
use rayon::prelude::*;

use crate::{
    backend::regalloc::{self, AllocatedFunction, AllocationStrategy},
    diagnostics::Diagnostic,
    error::CompileError,
    frontend::ast,
    middle::{
        hir::TypedFunction,
        lir::{hir_lowering, verify::verify},
        optimization::PassManager,
        pattern::{MatchDecisions, check_matches},
        type_checking::{TypeCheckResults, check_program},
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    pub num_physical_registers: u16,
    pub strategy: AllocationStrategy,
    pub optimize: bool,
    /// Compile functions on the rayon thread pool once checking is done
    pub parallel: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            num_physical_registers: 8,
            strategy: AllocationStrategy::default(),
            optimize: true,
            parallel: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledProgram {
    /// In declaration order, methods included
    pub functions: Vec<AllocatedFunction>,
}

impl CompiledProgram {
    pub fn function(&self, name: &str) -> Option<&AllocatedFunction> {
        self.functions
            .iter()
            .find(|f| f.function.name.value() == name)
    }
}

pub fn compile_program(
    program: &ast::Program,
    options: &CompileOptions,
) -> Result<CompiledProgram, CompileError> {
    let TypeCheckResults {
        program: typed,
        errors,
    } = check_program(program);

    let mut diagnostics: Vec<Diagnostic> = errors.iter().map(Diagnostic::from).collect();
    let mut decisions = Vec::with_capacity(typed.functions.len());

    for function in &typed.functions {
        let (function_decisions, errors) = check_matches(function, &typed.records);
        diagnostics.extend(errors.iter().map(Diagnostic::from));
        decisions.push(function_decisions);
    }

    if !diagnostics.is_empty() {
        debug!("stopping after {} diagnostics", diagnostics.len());
        return Err(CompileError::Diagnostics(diagnostics));
    }

    let jobs: Vec<(&TypedFunction, &MatchDecisions)> =
        typed.functions.iter().zip(&decisions).collect();

    let functions = if options.parallel {
        jobs.par_iter()
            .map(|(function, decisions)| compile_function(function, decisions, options))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        jobs.iter()
            .map(|(function, decisions)| compile_function(function, decisions, options))
            .collect::<Result<Vec<_>, _>>()?
    };

    info!("compiled {} functions", functions.len());
    Ok(CompiledProgram { functions })
}

/// Everything after checking, for a single function
pub fn compile_function(
    function: &TypedFunction,
    decisions: &MatchDecisions,
    options: &CompileOptions,
) -> Result<AllocatedFunction, CompileError> {
    let mut lir = hir_lowering::lower(function, decisions)?;
    verify(&lir)?;

    if options.optimize {
        let iterations = PassManager::with_default_passes().run(&mut lir);
        debug!("optimized `{}` in {iterations} iterations", lir.name);
        verify(&lir)?;
    }

    Ok(regalloc::allocate(
        &lir,
        options.num_physical_registers,
        options.strategy,
    )?)
}
