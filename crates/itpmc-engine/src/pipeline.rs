//! End-to-end verification: parse, lower, unroll and run IMC.

#![allow(clippy::result_large_err)]

use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use itpmc_dsl::ast;
use itpmc_dsl::errors::ParseError;
use itpmc_ir::cfa::Cfa;
use itpmc_ir::lowering::{self, LoweringError, SpannedLoweringError};
use itpmc_smt::formula::{FormulaError, FormulaManager, SolverChoice};

use crate::bounds::LoopBoundAdjuster;
use crate::error::ImcError;
use crate::explore::CfaUnroller;
use crate::imc::ImcDriver;
use crate::options::ImcOptions;
use crate::result::ImcOutcome;
use crate::shutdown::ShutdownNotifier;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Lowering error: {0}")]
    Lowering(#[from] LoweringError),
    #[error("Solver error: {0}")]
    Solver(#[from] FormulaError),
    #[error(transparent)]
    Imc(#[from] ImcError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub solver: SolverChoice,
    /// Largest loop bound before giving up.
    pub max_bound: u32,
    /// Wall-clock budget of the whole run, 0 for none.
    pub timeout_secs: u64,
    /// Directory receiving every solver query as an SMT-LIB script.
    pub dump_smt: Option<PathBuf>,
    pub imc: ImcOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            solver: SolverChoice::Enumerative,
            max_bound: 20,
            timeout_secs: 300,
            dump_smt: None,
            imc: ImcOptions::default(),
        }
    }
}

pub fn parse(source: &str, filename: &str) -> Result<ast::Program, PipelineError> {
    Ok(itpmc_dsl::parse(source, filename)?)
}

pub fn lower(program: &ast::Program) -> Result<Cfa, PipelineError> {
    Ok(lowering::lower(program)?)
}

/// Lower with source-span diagnostics for rendering by `miette`.
pub fn lower_with_source(
    program: &ast::Program,
    source: &str,
    filename: &str,
) -> Result<Cfa, SpannedLoweringError> {
    lowering::lower_with_source(program, source, filename)
}

/// The formula manager a run over `cfa` uses.
pub fn formula_manager(cfa: &Cfa, options: &PipelineOptions) -> Result<FormulaManager, PipelineError> {
    let fmgr = FormulaManager::new(options.solver, cfa.var_sorts())
        .with_timeout_secs(options.timeout_secs);
    Ok(match &options.dump_smt {
        Some(dir) => fmgr.with_dump_dir(dir)?,
        None => fmgr,
    })
}

/// Parse, lower and verify a program.
pub fn verify(
    source: &str,
    filename: &str,
    options: &PipelineOptions,
) -> Result<ImcOutcome, PipelineError> {
    let program = parse(source, filename)?;
    let cfa = lower(&program)?;
    verify_cfa(&cfa, options)
}

pub fn verify_cfa(cfa: &Cfa, options: &PipelineOptions) -> Result<ImcOutcome, PipelineError> {
    let shutdown = ShutdownNotifier::with_timeout_secs(options.timeout_secs);
    verify_cfa_with_shutdown(cfa, options, shutdown)
}

/// Like [`verify_cfa`], stopping when `shutdown` fires.
pub fn verify_cfa_with_shutdown(
    cfa: &Cfa,
    options: &PipelineOptions,
    shutdown: ShutdownNotifier,
) -> Result<ImcOutcome, PipelineError> {
    let started = Instant::now();
    info!(
        program = %cfa.name,
        solver = %options.solver,
        max_bound = options.max_bound,
        "verifying"
    );
    let fmgr = formula_manager(cfa, options)?;
    let unroller = CfaUnroller::new(cfa);
    let mut arg = unroller.initial_arg();
    let bounds = LoopBoundAdjuster::new(options.max_bound, shutdown.clone());
    let mut driver = ImcDriver::new(&fmgr, unroller, bounds, shutdown, options.imc.clone());
    let outcome = driver.run(&mut arg)?;
    info!(
        verdict = %outcome.verdict,
        elapsed_ms = started.elapsed().as_millis(),
        "verification finished"
    );
    Ok(outcome)
}
