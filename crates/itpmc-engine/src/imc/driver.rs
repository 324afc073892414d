//! Outer IMC loop: unroll, partition, check, interpolate, raise the bound.

use tracing::{debug, info};

use itpmc_ir::arg::Arg;
use itpmc_smt::formula::FormulaManager;
use itpmc_smt::solver::Model;

use super::interpolation::{InterpolationEngine, InterpolationOutcome};
use super::partition::collector_for;
use super::safety::SafetyChecker;
use crate::bounds::BoundAdjuster;
use crate::error::ImcError;
use crate::explore::ExplorationEngine;
use crate::options::ImcOptions;
use crate::result::{ImcOutcome, TerminationReason, Verdict};
use crate::shutdown::ShutdownNotifier;
use crate::stats::ImcStatistics;

pub struct ImcDriver<'m, E, B> {
    fmgr: &'m FormulaManager,
    explorer: E,
    bounds: B,
    shutdown: ShutdownNotifier,
    options: ImcOptions,
}

impl<'m, E: ExplorationEngine, B: BoundAdjuster> ImcDriver<'m, E, B> {
    pub fn new(
        fmgr: &'m FormulaManager,
        explorer: E,
        bounds: B,
        shutdown: ShutdownNotifier,
        options: ImcOptions,
    ) -> Self {
        Self {
            fmgr,
            explorer,
            bounds,
            shutdown,
            options,
        }
    }

    /// Runs rounds until a verdict is reached or a fatal condition occurs.
    pub fn run(&mut self, arg: &mut Arg) -> Result<ImcOutcome, ImcError> {
        let collector = collector_for(self.options.formula_collection);
        let safety = SafetyChecker::new(self.fmgr);
        let mut stats = ImcStatistics::default();
        debug!(collector = collector.name(), "starting IMC");

        loop {
            let bound = self.bounds.current_bound();
            if bound == 0 {
                return Err(ImcError::InvalidBound(bound));
            }
            // every smaller bound must already have been searched for errors
            let expected = stats.rounds + 1;
            if bound != expected {
                return Err(ImcError::NonSequentialBound {
                    expected,
                    got: bound,
                });
            }
            stats.rounds += 1;
            info!(round = stats.rounds, bound, "IMC round");

            self.shutdown.check()?;
            stats
                .unrolling
                .time(|| self.explorer.unroll(arg, bound, &self.shutdown))?;
            self.shutdown.check()?;
            stats.arg_states = arg.len();

            if self.options.check_existence_of_covered_states && !arg.covered_states().is_empty()
            {
                return Err(ImcError::Unsupported("covered states exist in ARG".into()));
            }
            let loop_heads = arg.loop_head_locations();
            if loop_heads.len() > 1 {
                return Err(ImcError::Unsupported(format!(
                    "program has {} loop heads, only single-loop programs are supported",
                    loop_heads.len()
                )));
            }

            let formulas = stats.partitioning.time(|| collector.collect(arg, bound))?;
            formulas.log();
            if self.options.check_sanity_of_formulas && !safety.formulas_are_sane(&formulas)? {
                return Err(ImcError::InsaneFormulas(
                    "prefix and loop formulas are unsatisfiable together".into(),
                ));
            }

            if let Some(model) = stats.safety_check.time(|| safety.find_error(&formulas))? {
                info!(bound, "error location reachable");
                return Ok(self.finish(
                    Verdict::UnsafePrecise,
                    bound,
                    TerminationReason::ErrorReachable,
                    Some(model),
                    stats,
                    arg,
                ));
            }

            if self.options.check_forward_conditions
                && stats
                    .bounding_check
                    .time(|| safety.loop_head_unreachable_at_bound(&formulas))?
            {
                info!(bound, "no state reaches the loop head at the bound");
                return Ok(self.finish(
                    Verdict::SafePrecise,
                    bound,
                    TerminationReason::BoundingAssertionUnsat,
                    None,
                    stats,
                    arg,
                ));
            }

            if self.options.interpolation && bound > 1 {
                stats.interpolation_attempts += 1;
                let engine =
                    InterpolationEngine::new(self.fmgr, self.options.derive_interpolant_from_suffix);
                let attempt = stats.interpolation.time(|| engine.run(&formulas))?;
                stats.interpolation_iterations += attempt.outcome.iterations();
                if let InterpolationOutcome::FixedPoint { iterations } = attempt.outcome {
                    info!(bound, iterations, "interpolation reached a fixed point");
                    return Ok(self.finish(
                        Verdict::SafePrecise,
                        bound,
                        TerminationReason::FixedPoint { iterations },
                        None,
                        stats,
                        arg,
                    ));
                }
            }

            if !self.bounds.try_increase_bound() {
                info!(bound, "loop bound exhausted without proof");
                return Ok(self.finish(
                    Verdict::UnsafeImprecise,
                    bound,
                    TerminationReason::BoundExhausted,
                    None,
                    stats,
                    arg,
                ));
            }
        }
    }

    fn finish(
        &self,
        verdict: Verdict,
        bound: u32,
        reason: TerminationReason,
        counterexample: Option<Model>,
        mut stats: ImcStatistics,
        arg: &Arg,
    ) -> ImcOutcome {
        stats.solver_queries = self.fmgr.query_count();
        stats.arg_states = arg.len();
        info!(%verdict, bound, reason = %reason, "IMC finished");
        ImcOutcome {
            verdict,
            bound,
            reason,
            counterexample,
            stats,
        }
    }
}
