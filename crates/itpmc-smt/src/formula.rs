//! Formula manager: satisfiability, implication, models, SSA re-indexing and
//! interpolating provers over the variables of one program.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::backends::enumerative::{EnumError, EnumSolver, DEFAULT_NODE_LIMIT};
use crate::backends::smtlib_printer;
use crate::backends::z3_backend::{Z3Error, Z3Solver};
use crate::solver::{FormulaGroup, InterpolatingProver, Model, SatResult, SmtSolver};
use crate::sorts::SmtSort;
use crate::ssa::{self, base_name, SsaMap};
use crate::terms::SmtTerm;

/// Which decision procedure answers satisfiability queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverChoice {
    #[default]
    Enumerative,
    Z3,
}

impl fmt::Display for SolverChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverChoice::Enumerative => write!(f, "enumerative"),
            SolverChoice::Z3 => write!(f, "z3"),
        }
    }
}

impl FromStr for SolverChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enumerative" | "enum" => Ok(SolverChoice::Enumerative),
            "z3" => Ok(SolverChoice::Z3),
            other => Err(format!(
                "unknown solver '{other}' (expected 'enumerative' or 'z3')"
            )),
        }
    }
}

#[derive(Debug, Error)]
pub enum FormulaError {
    #[error(transparent)]
    Enumerative(#[from] EnumError),
    #[error(transparent)]
    Z3(#[from] Z3Error),
    #[error("Variable {0} is not declared")]
    UnknownVariable(String),
    #[error("Solver returned unknown: {0}")]
    Unknown(String),
    #[error("Interpolant requested while the prover stack is satisfiable")]
    SatisfiableStack,
    #[error("Formula group {0} is not on the prover stack")]
    UnknownGroup(usize),
    #[error("Pop on an empty prover stack")]
    EmptyStack,
    #[error("Cannot write SMT dump {path}: {source}")]
    Dump {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A concrete backend selected at runtime.
pub enum BackendSolver {
    Enumerative(EnumSolver),
    Z3(Z3Solver),
}

impl SmtSolver for BackendSolver {
    type Error = FormulaError;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), FormulaError> {
        match self {
            BackendSolver::Enumerative(s) => Ok(s.declare_var(name, sort)?),
            BackendSolver::Z3(s) => Ok(s.declare_var(name, sort)?),
        }
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), FormulaError> {
        match self {
            BackendSolver::Enumerative(s) => Ok(s.assert(term)?),
            BackendSolver::Z3(s) => Ok(s.assert(term)?),
        }
    }

    fn push(&mut self) -> Result<(), FormulaError> {
        match self {
            BackendSolver::Enumerative(s) => Ok(s.push()?),
            BackendSolver::Z3(s) => Ok(s.push()?),
        }
    }

    fn pop(&mut self) -> Result<(), FormulaError> {
        match self {
            BackendSolver::Enumerative(s) => Ok(s.pop()?),
            BackendSolver::Z3(s) => Ok(s.pop()?),
        }
    }

    fn check_sat(&mut self) -> Result<SatResult, FormulaError> {
        match self {
            BackendSolver::Enumerative(s) => Ok(s.check_sat()?),
            BackendSolver::Z3(s) => Ok(s.check_sat()?),
        }
    }

    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), FormulaError> {
        match self {
            BackendSolver::Enumerative(s) => Ok(s.check_sat_with_model(var_names)?),
            BackendSolver::Z3(s) => Ok(s.check_sat_with_model(var_names)?),
        }
    }

    fn reset(&mut self) -> Result<(), FormulaError> {
        match self {
            BackendSolver::Enumerative(s) => Ok(s.reset()?),
            BackendSolver::Z3(s) => Ok(s.reset()?),
        }
    }
}

/// Writes every query as a numbered SMT-LIB script.
#[derive(Debug)]
struct SmtDump {
    dir: PathBuf,
    counter: AtomicU64,
}

impl SmtDump {
    fn write(
        &self,
        label: &str,
        declarations: &[(String, SmtSort)],
        assertions: &[SmtTerm],
    ) -> Result<PathBuf, FormulaError> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!("query-{n:04}.smt2"));
        let text = smtlib_printer::script(label, declarations, assertions);
        std::fs::write(&path, text).map_err(|source| FormulaError::Dump {
            path: path.display().to_string(),
            source,
        })?;
        Ok(path)
    }
}

pub struct FormulaManager {
    solver: SolverChoice,
    sorts: IndexMap<String, SmtSort>,
    node_limit: u64,
    timeout_secs: u64,
    dump: Option<SmtDump>,
    queries: AtomicU64,
}

impl FormulaManager {
    /// `sorts` maps every unversioned program variable to its sort.
    pub fn new(solver: SolverChoice, sorts: IndexMap<String, SmtSort>) -> Self {
        Self {
            solver,
            sorts,
            node_limit: DEFAULT_NODE_LIMIT,
            timeout_secs: 0,
            dump: None,
            queries: AtomicU64::new(0),
        }
    }

    pub fn with_node_limit(mut self, node_limit: u64) -> Self {
        self.node_limit = node_limit;
        self
    }

    /// Per-query timeout in seconds (0 = none). Applies to both backends and
    /// to the projection behind enumerative interpolation.
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Write every query into `dir` as `query-NNNN.smt2`.
    pub fn with_dump_dir(mut self, dir: &Path) -> Result<Self, FormulaError> {
        std::fs::create_dir_all(dir).map_err(|source| FormulaError::Dump {
            path: dir.display().to_string(),
            source,
        })?;
        self.dump = Some(SmtDump {
            dir: dir.to_path_buf(),
            counter: AtomicU64::new(0),
        });
        Ok(self)
    }

    pub fn solver_choice(&self) -> SolverChoice {
        self.solver
    }

    /// Number of satisfiability checks issued so far.
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    pub fn sort_of(&self, name: &str) -> Result<&SmtSort, FormulaError> {
        self.sorts
            .get(base_name(name))
            .ok_or_else(|| FormulaError::UnknownVariable(name.to_string()))
    }

    /// Declarations for every (possibly versioned) variable of `term`.
    pub fn declarations(&self, term: &SmtTerm) -> Result<Vec<(String, SmtSort)>, FormulaError> {
        term.free_vars()
            .into_iter()
            .map(|name| {
                let sort = self.sort_of(&name)?.clone();
                Ok((name, sort))
            })
            .collect()
    }

    pub fn new_solver(&self) -> BackendSolver {
        match self.solver {
            SolverChoice::Enumerative => {
                let solver = EnumSolver::with_node_limit(self.node_limit)
                    .with_timeout_secs(self.timeout_secs);
                BackendSolver::Enumerative(solver)
            }
            SolverChoice::Z3 => BackendSolver::Z3(Z3Solver::with_timeout_secs(self.timeout_secs)),
        }
    }

    fn record_query(
        &self,
        label: &str,
        declarations: &[(String, SmtSort)],
        assertions: &[SmtTerm],
    ) -> Result<(), FormulaError> {
        let n = self.queries.fetch_add(1, Ordering::Relaxed);
        if let Some(dump) = &self.dump {
            let path = dump.write(label, declarations, assertions)?;
            trace!(query = n, path = %path.display(), "dumped SMT query");
        }
        Ok(())
    }

    fn check(
        &self,
        term: &SmtTerm,
        label: &str,
        with_model: bool,
    ) -> Result<(bool, Option<Model>), FormulaError> {
        let declarations = self.declarations(term)?;
        self.record_query(label, &declarations, std::slice::from_ref(term))?;
        let mut solver = self.new_solver();
        for (name, sort) in &declarations {
            solver.declare_var(name, sort)?;
        }
        solver.assert(term)?;
        let (result, model) = if with_model {
            let vars: Vec<(&str, &SmtSort)> = declarations
                .iter()
                .map(|(n, s)| (n.as_str(), s))
                .collect();
            solver.check_sat_with_model(&vars)?
        } else {
            (solver.check_sat()?, None)
        };
        trace!(label, result = ?result, vars = declarations.len(), "solver query");
        match result {
            SatResult::Sat => Ok((true, model)),
            SatResult::Unsat => Ok((false, None)),
            SatResult::Unknown(reason) => Err(FormulaError::Unknown(reason)),
        }
    }

    pub fn is_unsat(&self, term: &SmtTerm) -> Result<bool, FormulaError> {
        match term {
            SmtTerm::BoolLit(b) => Ok(!b),
            _ => Ok(!self.check(term, "is_unsat", false)?.0),
        }
    }

    /// Whether every model of `a` satisfies `b`.
    pub fn implies(&self, a: &SmtTerm, b: &SmtTerm) -> Result<bool, FormulaError> {
        if a.is_false() || b.is_true() {
            return Ok(true);
        }
        let query = SmtTerm::conj([a.clone(), b.clone().negate()]);
        match query {
            SmtTerm::BoolLit(v) => Ok(!v),
            _ => Ok(!self.check(&query, "implies", false)?.0),
        }
    }

    /// A satisfying assignment of `term`, or `None` when it is unsatisfiable.
    pub fn model(&self, term: &SmtTerm) -> Result<Option<Model>, FormulaError> {
        if term.is_false() {
            return Ok(None);
        }
        let (sat, model) = self.check(term, "model", true)?;
        Ok(if sat { Some(model.unwrap_or_default()) } else { None })
    }

    pub fn instantiate(&self, term: &SmtTerm, ssa: &SsaMap) -> SmtTerm {
        ssa::instantiate(term, ssa)
    }

    pub fn uninstantiate(&self, term: &SmtTerm) -> SmtTerm {
        ssa::uninstantiate(term)
    }

    pub fn new_interpolating_prover(&self) -> ProjectionProver<'_> {
        debug!(solver = %self.solver, "opening interpolating prover");
        ProjectionProver {
            manager: self,
            backend: self.new_solver(),
            stack: Vec::new(),
            declared: BTreeSet::new(),
            next_group: 0,
            unsat: None,
        }
    }
}

/// Interpolating prover for finite-domain formulas.
///
/// Satisfiability of the stack is decided by the configured backend. An
/// interpolant for `A` is the existential projection of `A` onto the
/// variables it shares with the rest of the stack: the strongest interpolant.
pub struct ProjectionProver<'m> {
    manager: &'m FormulaManager,
    backend: BackendSolver,
    stack: Vec<(FormulaGroup, SmtTerm)>,
    declared: BTreeSet<String>,
    next_group: usize,
    unsat: Option<bool>,
}

impl ProjectionProver<'_> {
    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

impl InterpolatingProver for ProjectionProver<'_> {
    type Error = FormulaError;

    fn push(&mut self, term: &SmtTerm) -> Result<FormulaGroup, FormulaError> {
        for (name, sort) in self.manager.declarations(term)? {
            if !self.declared.contains(&name) {
                self.backend.declare_var(&name, &sort)?;
                self.declared.insert(name);
            }
        }
        self.backend.push()?;
        self.backend.assert(term)?;
        let group = FormulaGroup(self.next_group);
        self.next_group += 1;
        self.stack.push((group, term.clone()));
        self.unsat = None;
        Ok(group)
    }

    fn pop(&mut self) -> Result<(), FormulaError> {
        self.stack.pop().ok_or(FormulaError::EmptyStack)?;
        self.backend.pop()?;
        self.unsat = None;
        Ok(())
    }

    fn is_unsat(&mut self) -> Result<bool, FormulaError> {
        if let Some(unsat) = self.unsat {
            return Ok(unsat);
        }
        let terms: Vec<SmtTerm> = self.stack.iter().map(|(_, t)| t.clone()).collect();
        let declarations: Vec<(String, SmtSort)> = self
            .declared
            .iter()
            .map(|name| Ok((name.clone(), self.manager.sort_of(name)?.clone())))
            .collect::<Result<_, FormulaError>>()?;
        self.manager
            .record_query("interpolation stack", &declarations, &terms)?;
        let unsat = match self.backend.check_sat()? {
            SatResult::Sat => false,
            SatResult::Unsat => true,
            SatResult::Unknown(reason) => return Err(FormulaError::Unknown(reason)),
        };
        trace!(depth = self.stack.len(), unsat, "interpolation stack check");
        self.unsat = Some(unsat);
        Ok(unsat)
    }

    fn interpolate(&mut self, groups: &[FormulaGroup]) -> Result<SmtTerm, FormulaError> {
        for group in groups {
            if !self.stack.iter().any(|(g, _)| g == group) {
                return Err(FormulaError::UnknownGroup(group.0));
            }
        }
        if !self.is_unsat()? {
            return Err(FormulaError::SatisfiableStack);
        }
        let (a_side, b_side): (Vec<_>, Vec<_>) =
            self.stack.iter().partition(|(g, _)| groups.contains(g));
        let a_vars: BTreeSet<String> = a_side.iter().flat_map(|(_, t)| t.free_vars()).collect();
        let b_vars: BTreeSet<String> = b_side.iter().flat_map(|(_, t)| t.free_vars()).collect();
        let shared: Vec<String> = a_vars.intersection(&b_vars).cloned().collect();

        let mut projector = EnumSolver::with_node_limit(self.manager.node_limit)
            .with_timeout_secs(self.manager.timeout_secs);
        for name in &a_vars {
            projector.declare_var(name, self.manager.sort_of(name)?)?;
        }
        for (_, term) in &a_side {
            projector.assert(term)?;
        }
        let projection = projector.project(&shared)?;
        let interpolant = projection.to_term();
        debug!(
            shared = shared.len(),
            tuples = projection.tuples.len(),
            "computed interpolant by projection"
        );
        Ok(interpolant)
    }
}

impl Drop for ProjectionProver<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.backend.reset() {
            warn!(error = %e, "failed to release interpolating prover");
        }
    }
}
