//! Exact finite-domain backend.
//!
//! Decides satisfiability by backtracking over the values of bounded
//! variables, pruning with three-valued evaluation of the asserted conjuncts.
//! The same search computes existential projections, which is how Craig
//! interpolants are obtained over finite domains.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::trace;

use crate::solver::{Model, ModelValue, SatResult, SmtSolver};
use crate::sorts::SmtSort;
use crate::ssa::split_versioned;
use crate::terms::SmtTerm;

#[derive(Debug, Error)]
pub enum EnumError {
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),
    #[error("Variable {0} has an unbounded sort; the enumerative backend needs a range")]
    UnboundedSort(String),
    #[error("Sort mismatch: {0}")]
    SortMismatch(String),
    #[error("Arithmetic overflow in {0}")]
    Overflow(String),
    #[error("Search budget of {0} assignments exhausted")]
    BudgetExhausted(u64),
    #[error("Domain of {var} has {size} values, more than the search budget of {limit}")]
    DomainTooLarge { var: String, size: u64, limit: u64 },
    #[error("Search deadline exceeded")]
    Timeout,
    #[error("Pop without matching push")]
    EmptyStack,
}

/// Concrete value of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    Bool(bool),
    Int(i64),
}

impl From<Value> for ModelValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Bool(b) => ModelValue::Bool(b),
            Value::Int(n) => ModelValue::Int(n),
        }
    }
}

/// Term with variables resolved to slots of an assignment vector.
#[derive(Debug, Clone)]
enum Compiled {
    Slot(usize),
    Const(Value),
    Add(Box<Compiled>, Box<Compiled>),
    Sub(Box<Compiled>, Box<Compiled>),
    Mul(Box<Compiled>, Box<Compiled>),
    Neg(Box<Compiled>),
    Eq(Box<Compiled>, Box<Compiled>),
    Lt(Box<Compiled>, Box<Compiled>),
    Le(Box<Compiled>, Box<Compiled>),
    And(Vec<Compiled>),
    Or(Vec<Compiled>),
    Not(Box<Compiled>),
    Ite(Box<Compiled>, Box<Compiled>, Box<Compiled>),
}

fn compile(term: &SmtTerm, slots: &HashMap<String, usize>) -> Result<Compiled, EnumError> {
    let bx = |t: &SmtTerm| compile(t, slots).map(Box::new);
    Ok(match term {
        SmtTerm::Var(name) => Compiled::Slot(
            *slots
                .get(name)
                .ok_or_else(|| EnumError::UnknownVariable(name.clone()))?,
        ),
        SmtTerm::IntLit(n) => Compiled::Const(Value::Int(*n)),
        SmtTerm::BoolLit(b) => Compiled::Const(Value::Bool(*b)),
        SmtTerm::Add(l, r) => Compiled::Add(bx(l)?, bx(r)?),
        SmtTerm::Sub(l, r) => Compiled::Sub(bx(l)?, bx(r)?),
        SmtTerm::Mul(l, r) => Compiled::Mul(bx(l)?, bx(r)?),
        SmtTerm::Neg(inner) => Compiled::Neg(bx(inner)?),
        SmtTerm::Eq(l, r) => Compiled::Eq(bx(l)?, bx(r)?),
        SmtTerm::Lt(l, r) => Compiled::Lt(bx(l)?, bx(r)?),
        SmtTerm::Le(l, r) => Compiled::Le(bx(l)?, bx(r)?),
        SmtTerm::Gt(l, r) => Compiled::Lt(bx(r)?, bx(l)?),
        SmtTerm::Ge(l, r) => Compiled::Le(bx(r)?, bx(l)?),
        SmtTerm::And(terms) => Compiled::And(
            terms
                .iter()
                .map(|t| compile(t, slots))
                .collect::<Result<_, _>>()?,
        ),
        SmtTerm::Or(terms) => Compiled::Or(
            terms
                .iter()
                .map(|t| compile(t, slots))
                .collect::<Result<_, _>>()?,
        ),
        SmtTerm::Not(inner) => Compiled::Not(bx(inner)?),
        SmtTerm::Implies(l, r) => Compiled::Or(vec![Compiled::Not(bx(l)?), compile(r, slots)?]),
        SmtTerm::Ite(c, t, e) => Compiled::Ite(bx(c)?, bx(t)?, bx(e)?),
    })
}

fn expect_int(v: Value, ctx: &str) -> Result<i64, EnumError> {
    match v {
        Value::Int(n) => Ok(n),
        Value::Bool(_) => Err(EnumError::SortMismatch(format!("{ctx} expects Int, got Bool"))),
    }
}

fn expect_bool(v: Value, ctx: &str) -> Result<bool, EnumError> {
    match v {
        Value::Bool(b) => Ok(b),
        Value::Int(_) => Err(EnumError::SortMismatch(format!("{ctx} expects Bool, got Int"))),
    }
}

/// Three-valued evaluation: `None` while the value depends on unassigned slots.
fn eval(expr: &Compiled, env: &[Option<Value>]) -> Result<Option<Value>, EnumError> {
    let arith = |l: &Compiled,
                 r: &Compiled,
                 op: fn(i64, i64) -> Option<i64>,
                 name: &str|
     -> Result<Option<Value>, EnumError> {
        match (eval(l, env)?, eval(r, env)?) {
            (Some(a), Some(b)) => {
                let (a, b) = (expect_int(a, name)?, expect_int(b, name)?);
                op(a, b)
                    .map(|n| Some(Value::Int(n)))
                    .ok_or_else(|| EnumError::Overflow(format!("{a} {name} {b}")))
            }
            _ => Ok(None),
        }
    };
    match expr {
        Compiled::Slot(i) => Ok(env[*i]),
        Compiled::Const(v) => Ok(Some(*v)),
        Compiled::Add(l, r) => arith(l, r, i64::checked_add, "+"),
        Compiled::Sub(l, r) => arith(l, r, i64::checked_sub, "-"),
        Compiled::Mul(l, r) => arith(l, r, i64::checked_mul, "*"),
        Compiled::Neg(inner) => match eval(inner, env)? {
            Some(v) => {
                let n = expect_int(v, "-")?;
                n.checked_neg()
                    .map(|m| Some(Value::Int(m)))
                    .ok_or_else(|| EnumError::Overflow(format!("-{n}")))
            }
            None => Ok(None),
        },
        Compiled::Eq(l, r) => match (eval(l, env)?, eval(r, env)?) {
            (Some(a), Some(b)) => match (a, b) {
                (Value::Int(_), Value::Int(_)) | (Value::Bool(_), Value::Bool(_)) => {
                    Ok(Some(Value::Bool(a == b)))
                }
                _ => Err(EnumError::SortMismatch("= between Int and Bool".into())),
            },
            _ => Ok(None),
        },
        Compiled::Lt(l, r) => match (eval(l, env)?, eval(r, env)?) {
            (Some(a), Some(b)) => Ok(Some(Value::Bool(
                expect_int(a, "<")? < expect_int(b, "<")?,
            ))),
            _ => Ok(None),
        },
        Compiled::Le(l, r) => match (eval(l, env)?, eval(r, env)?) {
            (Some(a), Some(b)) => Ok(Some(Value::Bool(
                expect_int(a, "<=")? <= expect_int(b, "<=")?,
            ))),
            _ => Ok(None),
        },
        Compiled::And(terms) => {
            let mut all_known = true;
            for t in terms {
                match eval(t, env)? {
                    Some(v) => {
                        if !expect_bool(v, "and")? {
                            return Ok(Some(Value::Bool(false)));
                        }
                    }
                    None => all_known = false,
                }
            }
            Ok(all_known.then_some(Value::Bool(true)))
        }
        Compiled::Or(terms) => {
            let mut all_known = true;
            for t in terms {
                match eval(t, env)? {
                    Some(v) => {
                        if expect_bool(v, "or")? {
                            return Ok(Some(Value::Bool(true)));
                        }
                    }
                    None => all_known = false,
                }
            }
            Ok(all_known.then_some(Value::Bool(false)))
        }
        Compiled::Not(inner) => match eval(inner, env)? {
            Some(v) => Ok(Some(Value::Bool(!expect_bool(v, "not")?))),
            None => Ok(None),
        },
        Compiled::Ite(c, t, e) => match eval(c, env)? {
            Some(v) => {
                if expect_bool(v, "ite")? {
                    eval(t, env)
                } else {
                    eval(e, env)
                }
            }
            None => {
                let (tv, ev) = (eval(t, env)?, eval(e, env)?);
                Ok(match (tv, ev) {
                    (Some(a), Some(b)) if a == b => Some(a),
                    _ => None,
                })
            }
        },
    }
}

/// Evaluate `term` under a complete assignment of its variables.
pub fn evaluate(term: &SmtTerm, values: &BTreeMap<String, Value>) -> Result<Value, EnumError> {
    let names: Vec<&String> = values.keys().collect();
    let slots: HashMap<String, usize> = names
        .iter()
        .enumerate()
        .map(|(i, n)| ((*n).clone(), i))
        .collect();
    let env: Vec<Option<Value>> = values.values().map(|v| Some(*v)).collect();
    let compiled = compile(term, &slots)?;
    eval(&compiled, &env)?.ok_or_else(|| {
        EnumError::UnknownVariable(format!("unassigned variable in {term}"))
    })
}

/// Values of one variable, indexed lazily so wide ranges cost nothing up front.
#[derive(Debug, Clone, Copy)]
enum Domain {
    Bool,
    Range { lo: i64, len: u64 },
}

impl Domain {
    fn of(sort: &SmtSort, name: &str, limit: u64) -> Result<Self, EnumError> {
        let size = sort
            .cardinality()
            .ok_or_else(|| EnumError::UnboundedSort(name.to_string()))?;
        if size > limit {
            return Err(EnumError::DomainTooLarge {
                var: name.to_string(),
                size,
                limit,
            });
        }
        Ok(match sort {
            SmtSort::Range(lo, _) => Domain::Range { lo: *lo, len: size },
            _ => Domain::Bool,
        })
    }

    fn len(&self) -> u64 {
        match self {
            Domain::Bool => 2,
            Domain::Range { len, .. } => *len,
        }
    }

    fn value(&self, index: u64) -> Value {
        match self {
            Domain::Bool => Value::Bool(index != 0),
            Domain::Range { lo, .. } => Value::Int(lo.wrapping_add_unsigned(index)),
        }
    }
}

/// Order variables by version, then by name, so that SSA chains are assigned
/// front to back and equalities prune as early as possible.
fn search_order(names: &mut [String]) {
    names.sort_by(|a, b| {
        let (ab, av) = split_versioned(a);
        let (bb, bv) = split_versioned(b);
        av.unwrap_or(0)
            .cmp(&bv.unwrap_or(0))
            .then_with(|| ab.cmp(bb))
            .then_with(|| a.cmp(b))
    });
}

struct Search {
    names: Vec<String>,
    domains: Vec<Domain>,
    constraints: Vec<Compiled>,
    assignment: Vec<Option<Value>>,
    nodes: u64,
    node_limit: u64,
    deadline: Option<Instant>,
}

/// Nodes visited between two clock reads.
const DEADLINE_STRIDE: u64 = 1024;

impl Search {
    fn new(
        names: Vec<String>,
        sorts: &HashMap<String, SmtSort>,
        assertions: &[SmtTerm],
        node_limit: u64,
        deadline: Option<Instant>,
    ) -> Result<Self, EnumError> {
        let mut domains = Vec::with_capacity(names.len());
        for name in &names {
            let sort = sorts
                .get(name)
                .ok_or_else(|| EnumError::UnknownVariable(name.clone()))?;
            domains.push(Domain::of(sort, name, node_limit)?);
        }
        let slots: HashMap<String, usize> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        let mut conjuncts = Vec::new();
        for term in assertions {
            flatten_conjuncts(term, &mut conjuncts);
        }
        let constraints = conjuncts
            .iter()
            .map(|t| compile(t, &slots))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            assignment: vec![None; names.len()],
            names,
            domains,
            constraints,
            nodes: 0,
            node_limit,
            deadline,
        })
    }

    fn consistent(&self) -> Result<bool, EnumError> {
        for c in &self.constraints {
            if let Some(v) = eval(c, &self.assignment)? {
                if !expect_bool(v, "assertion")? {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    fn tick(&mut self) -> Result<(), EnumError> {
        self.nodes = self.nodes.saturating_add(1);
        if self.nodes > self.node_limit {
            return Err(EnumError::BudgetExhausted(self.node_limit));
        }
        if let Some(deadline) = self.deadline {
            if self.nodes % DEADLINE_STRIDE == 0 && Instant::now() >= deadline {
                return Err(EnumError::Timeout);
            }
        }
        Ok(())
    }

    /// Extend the assignment from `depth`; on success the model stays in place.
    fn solve_from(&mut self, depth: usize) -> Result<bool, EnumError> {
        if !self.consistent()? {
            return Ok(false);
        }
        if depth == self.names.len() {
            return Ok(true);
        }
        let domain = self.domains[depth];
        for i in 0..domain.len() {
            self.tick()?;
            self.assignment[depth] = Some(domain.value(i));
            if self.solve_from(depth + 1)? {
                return Ok(true);
            }
        }
        self.assignment[depth] = None;
        Ok(false)
    }

    fn clear_from(&mut self, depth: usize) {
        for slot in &mut self.assignment[depth..] {
            *slot = None;
        }
    }

    /// Collect every assignment of the first `width` variables that extends
    /// to a full solution.
    fn project(&mut self, depth: usize, width: usize, out: &mut Vec<Vec<Value>>) -> Result<(), EnumError> {
        if !self.consistent()? {
            return Ok(());
        }
        if depth == width {
            if self.solve_from(depth)? {
                out.push(self.assignment[..width].iter().flatten().copied().collect());
            }
            self.clear_from(depth);
            return Ok(());
        }
        let domain = self.domains[depth];
        for i in 0..domain.len() {
            self.tick()?;
            self.assignment[depth] = Some(domain.value(i));
            self.project(depth + 1, width, out)?;
        }
        self.assignment[depth] = None;
        Ok(())
    }

    fn model(&self) -> Model {
        let values = self
            .names
            .iter()
            .zip(&self.assignment)
            .filter_map(|(n, v)| v.map(|v| (n.clone(), ModelValue::from(v))))
            .collect();
        Model { values }
    }
}

fn flatten_conjuncts(term: &SmtTerm, out: &mut Vec<SmtTerm>) {
    match term {
        SmtTerm::And(terms) => {
            for t in terms {
                flatten_conjuncts(t, out);
            }
        }
        SmtTerm::BoolLit(true) => {}
        other => out.push(other.clone()),
    }
}

/// The set of shared-variable assignments for which a formula is satisfiable.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub vars: Vec<(String, SmtSort)>,
    pub tuples: Vec<Vec<Value>>,
}

impl Projection {
    /// Compact formula describing exactly the projected tuples.
    pub fn to_term(&self) -> SmtTerm {
        build_projection_term(&self.vars, &self.tuples)
    }
}

fn build_projection_term(vars: &[(String, SmtSort)], tuples: &[Vec<Value>]) -> SmtTerm {
    if tuples.is_empty() {
        return SmtTerm::ff();
    }
    let Some(((name, sort), rest_vars)) = vars.split_first() else {
        return SmtTerm::tt();
    };
    let mut by_value: BTreeMap<Value, Vec<Vec<Value>>> = BTreeMap::new();
    for tuple in tuples {
        if let Some((head, tail)) = tuple.split_first() {
            by_value.entry(*head).or_default().push(tail.to_vec());
        }
    }
    // values leading to the same residual set share one disjunct
    let mut by_residual: BTreeMap<Vec<Vec<Value>>, Vec<Value>> = BTreeMap::new();
    for (value, mut residual) in by_value {
        residual.sort();
        residual.dedup();
        by_residual.entry(residual).or_default().push(value);
    }
    SmtTerm::disj(by_residual.into_iter().map(|(residual, values)| {
        SmtTerm::conj([
            value_constraint(name, sort, &values),
            build_projection_term(rest_vars, &residual),
        ])
    }))
}

fn value_constraint(name: &str, sort: &SmtSort, values: &[Value]) -> SmtTerm {
    let var = SmtTerm::var(name);
    match sort {
        SmtSort::Bool => {
            let has = |b: bool| values.contains(&Value::Bool(b));
            match (has(false), has(true)) {
                (true, true) => SmtTerm::tt(),
                (false, true) => var,
                (true, false) => var.not(),
                (false, false) => SmtTerm::ff(),
            }
        }
        SmtSort::Range(..) | SmtSort::Int if !values.is_empty() => {
            let (lo, hi) = match sort {
                SmtSort::Range(lo, hi) => (Some(*lo), Some(*hi)),
                _ => (None, None),
            };
            let mut ints: Vec<i64> = values
                .iter()
                .filter_map(|v| match v {
                    Value::Int(n) => Some(*n),
                    Value::Bool(_) => None,
                })
                .collect();
            ints.sort_unstable();
            let mut runs: Vec<(i64, i64)> = Vec::new();
            for n in ints {
                match runs.last_mut() {
                    Some((_, end)) if end.checked_add(1) == Some(n) => *end = n,
                    _ => runs.push((n, n)),
                }
            }
            SmtTerm::disj(runs.into_iter().map(|(a, b)| {
                let lower = (Some(a) != lo).then(|| SmtTerm::int(a).le(var.clone()));
                let upper = (Some(b) != hi).then(|| var.clone().le(SmtTerm::int(b)));
                if a == b && lower.is_some() && upper.is_some() {
                    var.clone().eq(SmtTerm::int(a))
                } else {
                    SmtTerm::conj(lower.into_iter().chain(upper))
                }
            }))
        }
        _ => SmtTerm::ff(),
    }
}

/// Default bound on the number of partial assignments one query may visit.
pub const DEFAULT_NODE_LIMIT: u64 = 50_000_000;

pub struct EnumSolver {
    sorts: HashMap<String, SmtSort>,
    frames: Vec<Vec<SmtTerm>>,
    node_limit: u64,
    timeout: Option<Duration>,
}

impl EnumSolver {
    pub fn new() -> Self {
        Self::with_node_limit(DEFAULT_NODE_LIMIT)
    }

    pub fn with_node_limit(node_limit: u64) -> Self {
        Self {
            sorts: HashMap::new(),
            frames: vec![Vec::new()],
            node_limit,
            timeout: None,
        }
    }

    /// Bounds the wall-clock time of each query; zero means no bound.
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));
        self
    }

    fn deadline(&self) -> Option<Instant> {
        self.timeout.and_then(|t| Instant::now().checked_add(t))
    }

    fn assertions(&self) -> Vec<SmtTerm> {
        self.frames.iter().flatten().cloned().collect()
    }

    fn search(&self, extra: &[&str]) -> Result<Search, EnumError> {
        let assertions = self.assertions();
        let mut names: Vec<String> = assertions
            .iter()
            .flat_map(SmtTerm::free_vars)
            .chain(extra.iter().map(|s| s.to_string()))
            .collect();
        names.sort();
        names.dedup();
        search_order(&mut names);
        Search::new(names, &self.sorts, &assertions, self.node_limit, self.deadline())
    }

    /// Existentially project the asserted formulas onto `onto`.
    pub fn project(&mut self, onto: &[String]) -> Result<Projection, EnumError> {
        let mut shared: Vec<String> = onto.to_vec();
        shared.sort();
        shared.dedup();
        search_order(&mut shared);
        let assertions = self.assertions();
        let mut others: Vec<String> = assertions
            .iter()
            .flat_map(SmtTerm::free_vars)
            .filter(|n| !shared.contains(n))
            .collect();
        others.sort();
        others.dedup();
        search_order(&mut others);

        let width = shared.len();
        let mut vars = Vec::with_capacity(width);
        for name in &shared {
            let sort = self
                .sorts
                .get(name)
                .ok_or_else(|| EnumError::UnknownVariable(name.clone()))?;
            vars.push((name.clone(), sort.clone()));
        }
        let names: Vec<String> = shared.into_iter().chain(others).collect();
        let mut search = Search::new(
            names,
            &self.sorts,
            &assertions,
            self.node_limit,
            self.deadline(),
        )?;
        let mut tuples = Vec::new();
        search.project(0, width, &mut tuples)?;
        trace!(
            shared = width,
            tuples = tuples.len(),
            nodes = search.nodes,
            "enumerative projection"
        );
        Ok(Projection { vars, tuples })
    }
}

impl Default for EnumSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl SmtSolver for EnumSolver {
    type Error = EnumError;

    fn declare_var(&mut self, name: &str, sort: &SmtSort) -> Result<(), EnumError> {
        if !sort.is_finite() {
            return Err(EnumError::UnboundedSort(name.to_string()));
        }
        self.sorts.insert(name.to_string(), sort.clone());
        Ok(())
    }

    fn assert(&mut self, term: &SmtTerm) -> Result<(), EnumError> {
        if let Some(frame) = self.frames.last_mut() {
            frame.push(term.clone());
        }
        Ok(())
    }

    fn push(&mut self) -> Result<(), EnumError> {
        self.frames.push(Vec::new());
        Ok(())
    }

    fn pop(&mut self) -> Result<(), EnumError> {
        if self.frames.len() <= 1 {
            return Err(EnumError::EmptyStack);
        }
        self.frames.pop();
        Ok(())
    }

    fn check_sat(&mut self) -> Result<SatResult, EnumError> {
        let mut search = self.search(&[])?;
        match search.solve_from(0) {
            Ok(true) => Ok(SatResult::Sat),
            Ok(false) => Ok(SatResult::Unsat),
            Err(EnumError::BudgetExhausted(limit)) => Ok(SatResult::Unknown(format!(
                "search budget of {limit} assignments exhausted"
            ))),
            Err(EnumError::Timeout) => Ok(SatResult::Unknown("timeout".into())),
            Err(e) => Err(e),
        }
    }

    fn check_sat_with_model(
        &mut self,
        var_names: &[(&str, &SmtSort)],
    ) -> Result<(SatResult, Option<Model>), EnumError> {
        let extra: Vec<&str> = var_names.iter().map(|(n, _)| *n).collect();
        let mut search = self.search(&extra)?;
        match search.solve_from(0) {
            Ok(true) => Ok((SatResult::Sat, Some(search.model()))),
            Ok(false) => Ok((SatResult::Unsat, None)),
            Err(EnumError::BudgetExhausted(limit)) => Ok((
                SatResult::Unknown(format!("search budget of {limit} assignments exhausted")),
                None,
            )),
            Err(EnumError::Timeout) => Ok((SatResult::Unknown("timeout".into()), None)),
            Err(e) => Err(e),
        }
    }

    fn reset(&mut self) -> Result<(), EnumError> {
        self.sorts.clear();
        self.frames = vec![Vec::new()];
        Ok(())
    }
}
