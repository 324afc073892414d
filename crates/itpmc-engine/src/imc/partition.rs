//! Partitioning of the reachability graph into the formulas of one IMC round.

use std::collections::BTreeMap;

use tracing::trace;

use itpmc_ir::arg::{Arg, ArgState, StateId};
use itpmc_smt::path_formula::PathFormula;
use itpmc_smt::terms::SmtTerm;

use crate::error::ImcError;
use crate::options::FormulaCollection;

/// Formulas of one unrolling round.
///
/// `prefix` reaches the first loop-head encounter. `loop_formula` is one
/// iteration and `tail` the iterations up to the bound. `target` reaches an
/// error location after the loop started and `bound` reaches the loop head at
/// the bound. `error_before_loop` reaches an error location without passing a
/// loop head.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionedFormulas {
    pub prefix: PathFormula,
    pub loop_formula: SmtTerm,
    pub tail: SmtTerm,
    pub target: SmtTerm,
    pub bound: SmtTerm,
    pub error_before_loop: SmtTerm,
}

impl PartitionedFormulas {
    /// Partition of a graph without any target after the loop.
    fn without_loop_target(bound: SmtTerm, error_before_loop: SmtTerm) -> Self {
        Self {
            prefix: PathFormula::unsatisfiable(),
            loop_formula: SmtTerm::tt(),
            tail: SmtTerm::tt(),
            target: SmtTerm::ff(),
            bound,
            error_before_loop,
        }
    }

    /// Dumps all six formulas at trace level.
    pub fn log(&self) {
        trace!(formula = %self.prefix.formula(), "prefix");
        trace!(formula = %self.loop_formula, "loop");
        trace!(formula = %self.tail, "tail");
        trace!(formula = %self.target, "target");
        trace!(formula = %self.bound, "bound");
        trace!(formula = %self.error_before_loop, "error before loop");
    }
}

/// Reads [`PartitionedFormulas`] off an unrolled graph.
pub trait FormulaCollector {
    fn name(&self) -> &'static str;

    fn collect(&self, arg: &Arg, bound: u32) -> Result<PartitionedFormulas, ImcError>;
}

pub fn collector_for(collection: FormulaCollection) -> Box<dyn FormulaCollector> {
    match collection {
        FormulaCollection::ArgTraversal => Box::new(ArgTraversalCollector),
        FormulaCollection::SyntacticLoop => Box::new(SyntacticLoopCollector),
    }
}

fn block_of(state: &ArgState) -> Result<&PathFormula, ImcError> {
    state.block().ok_or_else(|| {
        ImcError::Exploration(format!("state {} has no block formula", state.id()))
    })
}

fn disjoin_blocks<'a>(
    arg: &Arg,
    states: impl IntoIterator<Item = &'a StateId>,
) -> Result<SmtTerm, ImcError> {
    let mut parts = Vec::new();
    for &id in states {
        parts.push(block_of(&arg[id])?.formula().clone());
    }
    Ok(SmtTerm::disj(parts))
}

/// Walks abstraction paths from the deepest target states to the root.
///
/// A path `[root, h0, h1, ..., t]` yields `h0` as prefix, `h1` as loop and
/// the remaining loop heads as tail.
pub struct ArgTraversalCollector;

impl FormulaCollector for ArgTraversalCollector {
    fn name(&self) -> &'static str {
        "arg_traversal"
    }

    fn collect(&self, arg: &Arg, _bound: u32) -> Result<PartitionedFormulas, ImcError> {
        let mut before_loop = Vec::new();
        let mut frontier: Vec<(StateId, Vec<StateId>)> = Vec::new();
        let mut longest = 0;
        for id in arg.target_states() {
            let path = arg.abstraction_path_to_root(id);
            if path.len() <= 2 {
                before_loop.push(id);
                continue;
            }
            if path.len() > longest {
                longest = path.len();
                frontier.clear();
            }
            if path.len() == longest {
                frontier.push((id, path));
            }
        }

        let stops: Vec<StateId> = arg
            .loop_head_states()
            .into_iter()
            .filter(|&id| arg[id].is_stopped())
            .collect();
        let bound = disjoin_blocks(arg, &stops)?;
        let error_before_loop = disjoin_blocks(arg, &before_loop)?;

        let Some((_, path)) = frontier.first() else {
            return Ok(PartitionedFormulas::without_loop_target(
                bound,
                error_before_loop,
            ));
        };
        let prefix = block_of(&arg[path[1]])?.clone();
        let loop_formula = if path.len() > 3 {
            block_of(&arg[path[2]])?.formula().clone()
        } else {
            SmtTerm::tt()
        };
        let mut tail = Vec::new();
        for &id in path.iter().take(path.len() - 1).skip(3) {
            tail.push(block_of(&arg[id])?.formula().clone());
        }
        let targets: Vec<StateId> = frontier.iter().map(|(id, _)| *id).collect();

        Ok(PartitionedFormulas {
            prefix,
            loop_formula,
            tail: SmtTerm::conj(tail),
            target: disjoin_blocks(arg, &targets)?,
            bound,
            error_before_loop,
        })
    }
}

/// Groups loop-head and target states by loop iteration.
pub struct SyntacticLoopCollector;

impl FormulaCollector for SyntacticLoopCollector {
    fn name(&self) -> &'static str {
        "syntactic_loop"
    }

    fn collect(&self, arg: &Arg, bound: u32) -> Result<PartitionedFormulas, ImcError> {
        let mut heads: BTreeMap<u32, Vec<StateId>> = BTreeMap::new();
        for id in arg.loop_head_states() {
            if let Some(i) = arg[id].loop_iteration() {
                heads.entry(i).or_default().push(id);
            }
        }
        let at = |i: u32| heads.get(&i).map(Vec::as_slice).unwrap_or_default();

        let mut prefix = PathFormula::unsatisfiable();
        for &id in at(0) {
            prefix = prefix.merge(block_of(&arg[id])?);
        }
        let loop_formula = if bound > 1 {
            disjoin_blocks(arg, at(1))?
        } else {
            SmtTerm::tt()
        };
        let mut tail = Vec::new();
        for i in 2..bound {
            tail.push(disjoin_blocks(arg, at(i))?);
        }

        let mut targets = Vec::new();
        let mut before_loop = Vec::new();
        for id in arg.target_states() {
            match arg[id].loop_iteration() {
                None => before_loop.push(id),
                Some(i) if i + 1 == bound => targets.push(id),
                Some(_) => {}
            }
        }

        Ok(PartitionedFormulas {
            prefix,
            loop_formula,
            tail: SmtTerm::conj(tail),
            target: disjoin_blocks(arg, &targets)?,
            bound: disjoin_blocks(arg, at(bound))?,
            error_before_loop: disjoin_blocks(arg, &before_loop)?,
        })
    }
}
