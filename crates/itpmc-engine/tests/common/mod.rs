#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use itpmc_engine::pipeline::PipelineOptions;
use itpmc_ir::cfa::{Cfa, LocationId, UpdateValue};
use itpmc_smt::backends::enumerative::{evaluate, Value};
use itpmc_smt::formula::SolverChoice;
use itpmc_smt::sorts::SmtSort;
use itpmc_smt::terms::SmtTerm;

pub fn load_demo(name: &str) -> String {
    let path = format!("{}/../../demos/{name}", env!("CARGO_MANIFEST_DIR"));
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to load {path}: {e}"))
}

pub fn load_demo_cfa(name: &str) -> Cfa {
    let source = load_demo(name);
    let program = itpmc_dsl::parse(&source, name).unwrap_or_else(|e| panic!("{name}: {e}"));
    itpmc_ir::lowering::lower(&program).unwrap_or_else(|e| panic!("{name}: {e}"))
}

pub fn parse_cfa(source: &str) -> Cfa {
    let program = itpmc_dsl::parse(source, "inline.imc").expect("inline source parses");
    itpmc_ir::lowering::lower(&program).expect("inline source lowers")
}

pub fn options(solver: SolverChoice, max_bound: u32) -> PipelineOptions {
    PipelineOptions {
        solver,
        max_bound,
        timeout_secs: 60,
        dump_smt: None,
        ..PipelineOptions::default()
    }
}

type Valuation = BTreeMap<String, Value>;

fn domain(sort: &SmtSort) -> Vec<Value> {
    match sort {
        SmtSort::Bool => vec![Value::Bool(false), Value::Bool(true)],
        SmtSort::Range(lo, hi) => (*lo..=*hi).map(Value::Int).collect(),
        SmtSort::Int => panic!("explicit search needs bounded sorts"),
    }
}

fn in_range(sort: &SmtSort, value: Value) -> bool {
    match (sort, value) {
        (SmtSort::Range(lo, hi), Value::Int(n)) => *lo <= n && n <= *hi,
        (SmtSort::Bool, Value::Bool(_)) => true,
        _ => false,
    }
}

fn holds(term: &SmtTerm, valuation: &Valuation) -> bool {
    matches!(evaluate(term, valuation), Ok(Value::Bool(true)))
}

/// Every valuation of the program variables satisfying `init`.
fn initial_valuations(cfa: &Cfa) -> Vec<Valuation> {
    let mut all = vec![Valuation::new()];
    for var in &cfa.variables {
        let mut next = Vec::new();
        for partial in &all {
            for value in domain(&var.sort) {
                let mut v = partial.clone();
                v.insert(var.name.clone(), value);
                next.push(v);
            }
        }
        all = next;
    }
    all.into_iter().filter(|v| holds(&cfa.init, v)).collect()
}

fn successors(cfa: &Cfa, loc: LocationId, valuation: &Valuation) -> Vec<(LocationId, Valuation)> {
    let mut out = Vec::new();
    for edge in cfa.outgoing(loc) {
        if !holds(&edge.guard, valuation) {
            continue;
        }
        let mut posts = vec![valuation.clone()];
        for update in &edge.updates {
            let Some(var) = cfa.variable(&update.var) else {
                continue;
            };
            let values = match &update.value {
                UpdateValue::Assign(rhs) => match evaluate(rhs, valuation) {
                    Ok(v) => vec![v],
                    Err(_) => vec![],
                },
                UpdateValue::Havoc => domain(&var.sort),
            };
            let mut next = Vec::new();
            for post in &posts {
                for value in values.iter().copied().filter(|v| in_range(&var.sort, *v)) {
                    let mut p = post.clone();
                    p.insert(var.name.clone(), value);
                    next.push(p);
                }
            }
            posts = next;
        }
        out.extend(posts.into_iter().map(|p| (edge.to, p)));
    }
    out
}

/// Breadth-first search over concrete states; `true` when an error location
/// is reachable.
pub fn error_reachable(cfa: &Cfa) -> bool {
    let mut seen: BTreeSet<(LocationId, Valuation)> = BTreeSet::new();
    let mut queue: VecDeque<(LocationId, Valuation)> = VecDeque::new();
    for v in initial_valuations(cfa) {
        if seen.insert((cfa.initial, v.clone())) {
            queue.push_back((cfa.initial, v));
        }
    }
    while let Some((loc, valuation)) = queue.pop_front() {
        if cfa.is_error(loc) {
            return true;
        }
        for succ in successors(cfa, loc, &valuation) {
            if seen.insert(succ.clone()) {
                queue.push_back(succ);
            }
        }
    }
    false
}
