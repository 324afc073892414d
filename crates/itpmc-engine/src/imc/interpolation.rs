//! Interpolation-based fixed-point search.

use tracing::debug;

use itpmc_smt::formula::{FormulaError, FormulaManager};
use itpmc_smt::solver::InterpolatingProver;
use itpmc_smt::terms::SmtTerm;

use super::partition::PartitionedFormulas;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolationOutcome {
    /// The image became inductive: no unrolling reaches the target.
    FixedPoint { iterations: u32 },
    /// The over-approximation admits a path to the target.
    Diverged { iterations: u32 },
}

impl InterpolationOutcome {
    pub fn iterations(self) -> u32 {
        match self {
            InterpolationOutcome::FixedPoint { iterations }
            | InterpolationOutcome::Diverged { iterations } => iterations,
        }
    }
}

/// One interpolation attempt with the images it went through.
#[derive(Debug, Clone)]
pub struct InterpolationRun {
    pub outcome: InterpolationOutcome,
    /// Reachable-state images in the prefix's version frame, oldest first.
    pub images: Vec<SmtTerm>,
}

pub struct InterpolationEngine<'m> {
    fmgr: &'m FormulaManager,
    derive_from_suffix: bool,
}

impl<'m> InterpolationEngine<'m> {
    pub fn new(fmgr: &'m FormulaManager, derive_from_suffix: bool) -> Self {
        Self {
            fmgr,
            derive_from_suffix,
        }
    }

    /// Runs one attempt on a fresh prover. The prover is released when this
    /// returns, on every path.
    pub fn run(&self, p: &PartitionedFormulas) -> Result<InterpolationRun, FormulaError> {
        let mut prover = self.fmgr.new_interpolating_prover();
        let suffix = prover.push(&SmtTerm::conj([p.tail.clone(), p.target.clone()]))?;
        let loop_group = prover.push(&p.loop_formula)?;
        let mut reached = prover.push(p.prefix.formula())?;

        let mut image = p.prefix.formula().clone();
        let mut images = vec![image.clone()];
        let mut iterations = 0u32;

        while prover.is_unsat()? {
            iterations += 1;
            let interpolant = if self.derive_from_suffix {
                prover.interpolate(&[suffix])?.negate()
            } else {
                prover.interpolate(&[loop_group, reached])?
            };
            let interpolant = self
                .fmgr
                .instantiate(&self.fmgr.uninstantiate(&interpolant), p.prefix.ssa());
            debug!(iteration = iterations, interpolant = %interpolant, "computed interpolant");

            if self.fmgr.implies(&interpolant, &image)? {
                debug!(iterations, "interpolation reached a fixed point");
                return Ok(InterpolationRun {
                    outcome: InterpolationOutcome::FixedPoint { iterations },
                    images,
                });
            }
            image = SmtTerm::disj([image, interpolant.clone()]);
            images.push(image.clone());
            prover.pop()?;
            reached = prover.push(&interpolant)?;
        }

        debug!(iterations, "interpolation diverged");
        Ok(InterpolationRun {
            outcome: InterpolationOutcome::Diverged { iterations },
            images,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use itpmc_smt::formula::SolverChoice;
    use itpmc_smt::path_formula::{MemoryFootprint, PathFormula};
    use itpmc_smt::sorts::SmtSort;
    use itpmc_smt::ssa::SsaMap;

    fn manager() -> FormulaManager {
        let mut sorts = IndexMap::new();
        sorts.insert("x".to_string(), SmtSort::Range(0, 7));
        FormulaManager::new(SolverChoice::Enumerative, sorts)
    }

    fn x(v: u32) -> SmtTerm {
        SmtTerm::var(format!("x@{v}"))
    }

    /// x starts at 0 and the loop adds 2 (mod 8 by the range); the target
    /// asks for an odd value after two more iterations.
    fn even_counter(target_value: i64) -> PartitionedFormulas {
        let mut ssa = SsaMap::empty();
        ssa.set_index("x", 0);
        let step = |from: u32, to: u32| {
            SmtTerm::disj([
                SmtTerm::conj([x(from).lt(SmtTerm::int(6)), x(to).eq(x(from).add(SmtTerm::int(2)))]),
                SmtTerm::conj([x(from).ge(SmtTerm::int(6)), x(to).eq(SmtTerm::int(0))]),
            ])
        };
        PartitionedFormulas {
            prefix: PathFormula::new(x(0).eq(SmtTerm::int(0)), ssa, MemoryFootprint::empty(), 1),
            loop_formula: step(0, 1),
            tail: step(1, 2),
            target: x(2).eq(SmtTerm::int(target_value)),
            bound: SmtTerm::tt(),
            error_before_loop: SmtTerm::ff(),
        }
    }

    #[test]
    fn odd_target_reaches_fixed_point_both_ways() {
        let fmgr = manager();
        for from_suffix in [true, false] {
            let run = InterpolationEngine::new(&fmgr, from_suffix)
                .run(&even_counter(3))
                .unwrap();
            assert!(
                matches!(run.outcome, InterpolationOutcome::FixedPoint { .. }),
                "from_suffix = {from_suffix}: {:?}",
                run.outcome
            );
        }
    }

    #[test]
    fn reachable_target_diverges() {
        let fmgr = manager();
        let run = InterpolationEngine::new(&fmgr, false)
            .run(&even_counter(6))
            .unwrap();
        assert!(matches!(run.outcome, InterpolationOutcome::Diverged { .. }));
    }

    #[test]
    fn images_grow_monotonically() {
        let fmgr = manager();
        for from_suffix in [true, false] {
            let run = InterpolationEngine::new(&fmgr, from_suffix)
                .run(&even_counter(3))
                .unwrap();
            assert_eq!(run.images.len() as u32, run.outcome.iterations());
            for pair in run.images.windows(2) {
                assert!(fmgr.implies(&pair[0], &pair[1]).unwrap());
            }
        }
    }
}
