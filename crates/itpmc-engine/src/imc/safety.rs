//! Reach-error and bounding-assertion checks of one round.

use tracing::{debug, warn};

use itpmc_smt::formula::{FormulaError, FormulaManager};
use itpmc_smt::solver::Model;
use itpmc_smt::terms::SmtTerm;

use super::partition::PartitionedFormulas;

/// `(prefix ∧ loop ∧ tail ∧ target) ∨ error_before_loop`
pub fn reach_error_formula(p: &PartitionedFormulas) -> SmtTerm {
    SmtTerm::disj([
        SmtTerm::conj([
            p.prefix.formula().clone(),
            p.loop_formula.clone(),
            p.tail.clone(),
            p.target.clone(),
        ]),
        p.error_before_loop.clone(),
    ])
}

/// `prefix ∧ loop ∧ tail ∧ bound`
pub fn bounding_assertion(p: &PartitionedFormulas) -> SmtTerm {
    SmtTerm::conj([
        p.prefix.formula().clone(),
        p.loop_formula.clone(),
        p.tail.clone(),
        p.bound.clone(),
    ])
}

pub struct SafetyChecker<'m> {
    fmgr: &'m FormulaManager,
}

impl<'m> SafetyChecker<'m> {
    pub fn new(fmgr: &'m FormulaManager) -> Self {
        Self { fmgr }
    }

    /// A model of the reach-error formula, if an error is reachable.
    pub fn find_error(&self, p: &PartitionedFormulas) -> Result<Option<Model>, FormulaError> {
        let model = self.fmgr.model(&reach_error_formula(p))?;
        debug!(reachable = model.is_some(), "checked reach-error formula");
        Ok(model)
    }

    /// Whether no state reaches the loop head at the current bound.
    pub fn loop_head_unreachable_at_bound(
        &self,
        p: &PartitionedFormulas,
    ) -> Result<bool, FormulaError> {
        let unsat = self.fmgr.is_unsat(&bounding_assertion(p))?;
        debug!(unsat, "checked bounding assertion");
        Ok(unsat)
    }

    /// `false` when a non-trivial prefix and loop contradict each other.
    pub fn formulas_are_sane(&self, p: &PartitionedFormulas) -> Result<bool, FormulaError> {
        let prefix = p.prefix.formula();
        if prefix.is_false() || p.loop_formula.is_true() {
            return Ok(true);
        }
        let conj = SmtTerm::conj([prefix.clone(), p.loop_formula.clone()]);
        if self.fmgr.is_unsat(&conj)? {
            warn!("prefix and loop formulas are unsatisfiable together");
            return Ok(false);
        }
        Ok(true)
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

    fn partition(target: SmtTerm, bound: SmtTerm) -> PartitionedFormulas {
        let mut ssa = SsaMap::empty();
        ssa.set_index("x", 0);
        PartitionedFormulas {
            prefix: PathFormula::new(
                x(0).eq(SmtTerm::int(0)),
                ssa,
                MemoryFootprint::empty(),
                1,
            ),
            loop_formula: x(1).eq(x(0).add(SmtTerm::int(1))),
            tail: x(2).eq(x(1).add(SmtTerm::int(1))),
            target,
            bound,
            error_before_loop: SmtTerm::ff(),
        }
    }

    #[test]
    fn reach_error_is_the_disjunction_of_both_parts() {
        let mut p = partition(x(2).eq(SmtTerm::int(2)), SmtTerm::tt());
        p.error_before_loop = x(0).eq(SmtTerm::int(5));
        let f = reach_error_formula(&p);
        assert!(matches!(f, SmtTerm::Or(ref parts) if parts.len() == 2));
    }

    #[test]
    fn reachable_target_yields_model() {
        let fmgr = manager();
        let checker = SafetyChecker::new(&fmgr);
        let p = partition(x(2).eq(SmtTerm::int(2)), SmtTerm::tt());
        let model = checker.find_error(&p).unwrap().expect("error reachable");
        assert_eq!(model.get_int("x@2"), Some(2));
    }

    #[test]
    fn unreachable_target_yields_none() {
        let fmgr = manager();
        let checker = SafetyChecker::new(&fmgr);
        let p = partition(x(2).gt(SmtTerm::int(5)), SmtTerm::tt());
        assert!(checker.find_error(&p).unwrap().is_none());
    }

    #[test]
    fn bounding_assertion_detects_dead_loop_head() {
        let fmgr = manager();
        let checker = SafetyChecker::new(&fmgr);
        let blocked = partition(SmtTerm::ff(), x(2).gt(SmtTerm::int(3)));
        assert!(checker.loop_head_unreachable_at_bound(&blocked).unwrap());
        let open = partition(SmtTerm::ff(), x(2).lt(SmtTerm::int(3)));
        assert!(!checker.loop_head_unreachable_at_bound(&open).unwrap());
    }

    #[test]
    fn sanity_check_flags_contradicting_prefix_and_loop() {
        let fmgr = manager();
        let checker = SafetyChecker::new(&fmgr);
        let mut p = partition(SmtTerm::ff(), SmtTerm::tt());
        assert!(checker.formulas_are_sane(&p).unwrap());
        p.loop_formula = x(0).gt(SmtTerm::int(3));
        assert!(!checker.formulas_are_sane(&p).unwrap());
    }
}
