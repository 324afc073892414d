use std::collections::{BTreeMap, HashMap};

use thiserror::Error;
use z3::SatResult as Z3SatResult;

use crate::solver::{Model, ModelValue, SatResult, SmtSolver};
use crate::sorts::SmtSort;
use crate::terms::SmtTerm;

#[derive(Debug, Error)]
pub enum Z3Error {
    #[error("Z3 error: {0}")]
    Internal(String),
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),
}

pub struct Z3Solver {
    solver: z3::Solver,
    int_vars: HashMap<String, z3::ast::Int>,
    bool_vars: HashMap<String, z3::ast::Bool>,
    // Range side conditions live outside the push/pop stack so that a pop
    // never drops the domain of a variable declared inside the popped scope.
    ranges: BTreeMap<String, (i64, i64)>,
    params: Option<z3::Params>,
}

impl Z3Solver {
    pub fn new() -> Self {
        Self {
            solver: z3::Solver::new(),
            int_vars: HashMap::new(),
            bool_vars: HashMap::new(),
            ranges: BTreeMap::new(),
            params: None,
        }
    }

    pub fn with_timeout_secs(timeout_secs: u64) -> Self {
        if timeout_secs == 0 {
            return Self::new();
        }
        let mut solver = Self::new();
        let mut params = z3::Params::new();
        let timeout_ms = u32::try_from(timeout_secs.saturating_mul(1000)).unwrap_or(u32::MAX);
        params.set_u32("timeout", timeout_ms);
        solver.solver.set_params(&params);
        solver.params = Some(params);
        solver
    }

    fn translate_term(&self, term: &SmtTerm) -> Result<Z3Term, Z3Error> {
        match term {
            SmtTerm::Var(name) => {
                if let Some(v) = self.int_vars.get(name) {
                    Ok(Z3Term::Int(v.clone()))
                } else if let Some(v) = self.bool_vars.get(name) {
                    Ok(Z3Term::Bool(v.clone()))
                } else {
                    Err(Z3Error::UnknownVariable(name.clone()))
                }
            }
            SmtTerm::IntLit(n) => Ok(Z3Term::Int(z3::ast::Int::from_i64(*n))),
            SmtTerm::BoolLit(b) => Ok(Z3Term::Bool(z3::ast::Bool::from_bool(*b))),
            SmtTerm::Add(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_int()?;
                let r = self.translate_term(rhs)?.into_int()?;
                Ok(Z3Term::Int(&l + &r))
            }
            SmtTerm::Sub(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_int()?;
                let r = self.translate_term(rhs)?.into_int()?;
                Ok(Z3Term::Int(&l - &r))
            }
            SmtTerm::Mul(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_int()?;
                let r = self.translate_term(rhs)?.into_int()?;
                Ok(Z3Term::Int(&l * &r))
            }
            SmtTerm::Neg(inner) => {
                let zero = z3::ast::Int::from_i64(0);
                let v = self.translate_term(inner)?.into_int()?;
                Ok(Z3Term::Int(&zero - &v))
            }
            SmtTerm::Eq(lhs, rhs) => {
                let l = self.translate_term(lhs)?;
                let r = self.translate_term(rhs)?;
                match (l, r) {
                    (Z3Term::Int(li), Z3Term::Int(ri)) => Ok(Z3Term::Bool(li.eq(&ri))),
                    (Z3Term::Bool(lb), Z3Term::Bool(rb)) => Ok(Z3Term::Bool(lb.eq(&rb))),
                    _ => Err(Z3Error::Internal("Sort mismatch in Eq".into())),
                }
            }
            SmtTerm::Lt(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_int()?;
                let r = self.translate_term(rhs)?.into_int()?;
                Ok(Z3Term::Bool(l.lt(&r)))
            }
            SmtTerm::Le(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_int()?;
                let r = self.translate_term(rhs)?.into_int()?;
                Ok(Z3Term::Bool(l.le(&r)))
            }
            SmtTerm::Gt(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_int()?;
                let r = self.translate_term(rhs)?.into_int()?;
                Ok(Z3Term::Bool(l.gt(&r)))
            }
            SmtTerm::Ge(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_int()?;
                let r = self.translate_term(rhs)?.into_int()?;
                Ok(Z3Term::Bool(l.ge(&r)))
            }
            SmtTerm::And(terms) => {
                let bools = terms
                    .iter()
                    .map(|t| self.translate_term(t).and_then(Z3Term::into_bool))
                    .collect::<Result<Vec<_>, _>>()?;
                let refs: Vec<&z3::ast::Bool> = bools.iter().collect();
                Ok(Z3Term::Bool(z3::ast::Bool::and(&refs)))
            }
            SmtTerm::Or(terms) => {
                let bools = terms
                    .iter()
                    .map(|t| self.translate_term(t).and_then(Z3Term::into_bool))
                    .collect::<Result<Vec<_>, _>>()?;
                let refs: Vec<&z3::ast::Bool> = bools.iter().collect();
                Ok(Z3Term::Bool(z3::ast::Bool::or(&refs)))
            }
            SmtTerm::Not(inner) => {
                let b = self.translate_term(inner)?.into_bool()?;
                Ok(Z3Term::Bool(b.not()))
            }
            SmtTerm::Implies(lhs, rhs) => {
                let l = self.translate_term(lhs)?.into_bool()?;
                let r = self.translate_term(rhs)?.into_bool()?;
                Ok(Z3Term::Bool(l.implies(&r)))
            }
            SmtTerm::Ite(cond, then, els) => {
                let c = self.translate_term(cond)?.into_bool()?;
                let t = self.translate_term(then)?;
                let e = self.translate_term(els)?;
                match (t, e) {
                    (Z3Term::Int(ti), Z3Term::Int(ei)) => Ok(Z3Term::Int(c.ite(&ti, &ei))),
                    (Z3Term::Bool(tb), Z3Term::Bool(eb)) => Ok(Z3Term::Bool(c.ite(&tb, &eb))),
                    _ => Err(Z3Error::Internal("Sort mismatch in ITE".into())),
                }
            }
        }
    }

    /// Check with the range side conditions of every declared variable.
    fn check_within_ranges(&mut self) -> Z3SatResult {
        self.solver.push();
        for (name, (lo, hi)) in &self.ranges {
            if let Some(v) = self.int_vars.get(name) {
                self.solver.assert(&v.ge(&z3::ast::Int::from_i64(*lo)));
                self.solver.assert(&v.le(&z3::ast::Int::from_i64(*hi)));
            }
        }
        self.solver.check()
    }
}

enum Z3Term {
    Int(z3::ast::Int),
    Bool(z3::ast::Bool),
}

impl Z3Term {
    fn into_int(self) -> Result<z3::ast::Int, Z3Error> {
        match self {
            Z3Term::Int(i) => Ok(i),
            Z3Term::Bool(_) => Err(Z3Error::Internal("Expected Int, got Bool".into())),
        }
    }

    fn into_bool(self) -> Result<z3::ast::Bool, Z3Error> {
        match self {
            Z3Term::Bool(b) => Ok(b),
            Z3Term::Int(_) => Err(Z3Error::Internal("Expected Bool, got Int".into())),
        }
    }
}

impl Default for Z3Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl SmtSolver for Z3Solver {
    type Error = Z3Error;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), Z3Error> {
        match sort {
            SmtSort::Int => {
                self.int_vars
                    .insert(name.to_string(), z3::ast::Int::new_const(name));
            }
            SmtSort::Range(lo, hi) => {
                self.int_vars
                    .insert(name.to_string(), z3::ast::Int::new_const(name));
                self.ranges.insert(name.to_string(), (*lo, *hi));
            }
            SmtSort::Bool => {
                self.bool_vars
                    .insert(name.to_string(), z3::ast::Bool::new_const(name));
            }
        }
        Ok(())
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), Z3Error> {
        let z3_term = self.translate_term(term)?.into_bool()?;
        self.solver.assert(&z3_term);
        Ok(())
    }

    fn push(&mut self) -> Result<(), Z3Error> {
        self.solver.push();
        Ok(())
    }

    fn pop(&mut self) -> Result<(), Z3Error> {
        self.solver.pop(1);
        Ok(())
    }

    fn check_sat(&mut self) -> Result<SatResult, Z3Error> {
        let result = self.check_within_ranges();
        self.solver.pop(1);
        Ok(match result {
            Z3SatResult::Sat => SatResult::Sat,
            Z3SatResult::Unsat => SatResult::Unsat,
            Z3SatResult::Unknown => SatResult::Unknown("Z3 returned unknown".into()),
        })
    }

    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), Z3Error> {
        let outcome = match self.check_within_ranges() {
            Z3SatResult::Sat => match self.solver.get_model() {
                Some(z3_model) => {
                    let mut values = BTreeMap::new();
                    for &(name, sort) in var_names {
                        if sort.is_bool() {
                            if let Some(b) = self
                                .bool_vars
                                .get(name)
                                .and_then(|v| z3_model.eval::<z3::ast::Bool>(v, true))
                                .and_then(|val| val.as_bool())
                            {
                                values.insert(name.to_string(), ModelValue::Bool(b));
                            }
                        } else if let Some(n) = self
                            .int_vars
                            .get(name)
                            .and_then(|v| z3_model.eval::<z3::ast::Int>(v, true))
                            .and_then(|val| val.as_i64())
                        {
                            values.insert(name.to_string(), ModelValue::Int(n));
                        }
                    }
                    Ok((SatResult::Sat, Some(Model { values })))
                }
                None => Err(Z3Error::Internal("SAT but no model available".into())),
            },
            Z3SatResult::Unsat => Ok((SatResult::Unsat, None)),
            Z3SatResult::Unknown => Ok((SatResult::Unknown("Z3 returned unknown".into()), None)),
        };
        self.solver.pop(1);
        outcome
    }

    fn reset(&mut self) -> Result<(), Z3Error> {
        self.solver.reset();
        // Z3 may drop per-solver parameters on reset; reapply timeout if configured.
        if let Some(params) = &self.params {
            self.solver.set_params(params);
        }
        self.int_vars.clear();
        self.bool_vars.clear();
        self.ranges.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn z3_basic_sat() -> TestResult {
        let mut solver = Z3Solver::new();

        solver.declare_var("x", &SmtSort::Int)?;
        solver.declare_var("y", &SmtSort::Int)?;

        // x > 0 && y > 0 && x + y == 10
        let term = SmtTerm::and(vec![
            SmtTerm::var("x").gt(SmtTerm::int(0)),
            SmtTerm::var("y").gt(SmtTerm::int(0)),
            SmtTerm::var("x")
                .add(SmtTerm::var("y"))
                .eq(SmtTerm::int(10)),
        ]);
        solver.assert(&term)?;
        assert_eq!(solver.check_sat()?, SatResult::Sat);
        Ok(())
    }

    #[test]
    fn z3_respects_declared_ranges() -> TestResult {
        let mut solver = Z3Solver::new();
        solver.declare_var("x@1", &SmtSort::Range(0, 3))?;
        solver.assert(&SmtTerm::var("x@1").gt(SmtTerm::int(3)))?;
        assert_eq!(solver.check_sat()?, SatResult::Unsat);
        Ok(())
    }

    #[test]
    fn z3_ranges_survive_pop() -> TestResult {
        let mut solver = Z3Solver::new();
        solver.push()?;
        solver.declare_var("x", &SmtSort::Range(0, 3))?;
        solver.assert(&SmtTerm::var("x").eq(SmtTerm::int(1)))?;
        assert_eq!(solver.check_sat()?, SatResult::Sat);
        solver.pop()?;
        solver.assert(&SmtTerm::var("x").eq(SmtTerm::int(7)))?;
        assert_eq!(solver.check_sat()?, SatResult::Unsat);
        Ok(())
    }

    #[test]
    fn z3_model_extraction_with_negation() -> TestResult {
        let mut solver = Z3Solver::new();

        solver.declare_var("x", &SmtSort::Range(-10, 10))?;
        solver.declare_var("b", &SmtSort::Bool)?;
        solver.assert(&SmtTerm::var("x").neg().eq(SmtTerm::int(4)))?;
        solver.assert(&SmtTerm::var("b"))?;

        let vars = vec![("x", &SmtSort::Range(-10, 10)), ("b", &SmtSort::Bool)];
        let (result, model) = solver.check_sat_with_model(&vars)?;
        assert_eq!(result, SatResult::Sat);
        let model = model.ok_or_else(|| {
            std::io::Error::other("expected model for SAT result in z3_model_extraction")
        })?;
        assert_eq!(model.get_int("x"), Some(-4));
        assert_eq!(model.get_bool("b"), Some(true));
        Ok(())
    }

    #[test]
    fn z3_timeout_configuration_survives_reset() -> TestResult {
        let mut solver = Z3Solver::with_timeout_secs(2);
        assert!(solver.params.is_some());

        solver.declare_var("x", &SmtSort::Int)?;
        solver.assert(&SmtTerm::var("x").eq(SmtTerm::int(1)))?;
        assert_eq!(solver.check_sat()?, SatResult::Sat);

        solver.reset()?;
        solver.declare_var("x", &SmtSort::Int)?;
        solver.assert(&SmtTerm::var("x").eq(SmtTerm::int(2)))?;
        assert_eq!(solver.check_sat()?, SatResult::Sat);
        assert!(solver.params.is_some());
        Ok(())
    }

    #[test]
    fn z3_translate_nested_ite() -> TestResult {
        let mut solver = Z3Solver::new();
        solver.declare_var("a", &SmtSort::Bool)?;
        solver.declare_var("b", &SmtSort::Bool)?;
        solver.declare_var("x", &SmtSort::Int)?;

        // x == ite(a, ite(b, 1, 2), 3)
        let inner_ite = SmtTerm::ite(SmtTerm::var("b"), SmtTerm::int(1), SmtTerm::int(2));
        let outer_ite = SmtTerm::ite(SmtTerm::var("a"), inner_ite, SmtTerm::int(3));
        solver.assert(&SmtTerm::var("x").eq(outer_ite))?;
        solver.assert(&SmtTerm::var("a"))?;
        solver.assert(&SmtTerm::var("b").not())?;

        let vars = vec![("x", &SmtSort::Int)];
        let (result, model) = solver.check_sat_with_model(&vars)?;
        assert_eq!(result, SatResult::Sat);
        let model = model.ok_or("expected model")?;
        assert_eq!(model.get_int("x"), Some(2));
        Ok(())
    }

    #[test]
    fn z3_unknown_variable_is_reported() {
        let mut solver = Z3Solver::new();
        let result = solver.assert(&SmtTerm::var("ghost").gt(SmtTerm::int(0)));
        assert!(matches!(result, Err(Z3Error::UnknownVariable(_))));
    }
}
