//! Exploration engine: unrolls a CFA into an abstract reachability graph.
//!
//! The reference engine uses large-block encoding. Abstraction points are the
//! root, loop heads and error locations; everything in between is summarized
//! into one block path formula per abstraction state.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, trace};

use itpmc_ir::arg::{Arg, StateId, StateKind};
use itpmc_ir::cfa::{Cfa, LocationId};
use itpmc_smt::path_formula::PathFormula;
use itpmc_smt::ssa::instantiate;

use crate::shutdown::{Cancelled, ShutdownNotifier};

#[derive(Debug, Error)]
pub enum ExplorationError {
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    #[error("State {0} is not in the reachability graph")]
    UnknownState(StateId),
}

/// Incremental unrolling of a program into an [`Arg`].
pub trait ExplorationEngine {
    /// Extends `arg` until every loop-head state below iteration `bound` is
    /// expanded. Loop-head states at `bound` are left as stop states.
    fn unroll(
        &mut self,
        arg: &mut Arg,
        bound: u32,
        shutdown: &ShutdownNotifier,
    ) -> Result<(), ExplorationError>;
}

/// Reference [`ExplorationEngine`] over a lowered [`Cfa`].
pub struct CfaUnroller<'c> {
    cfa: &'c Cfa,
    /// Topological order of the locations inside blocks.
    order: Vec<LocationId>,
}

impl<'c> CfaUnroller<'c> {
    pub fn new(cfa: &'c Cfa) -> Self {
        Self {
            cfa,
            order: block_order(cfa),
        }
    }

    /// A graph holding only the root at the initial location.
    pub fn initial_arg(&self) -> Arg {
        Arg::new(self.cfa.initial)
    }

    fn expand(&self, arg: &mut Arg, id: StateId) -> Result<(), ExplorationError> {
        let state = arg.get(id).ok_or(ExplorationError::UnknownState(id))?;
        let location = state.location();
        let mut pending: BTreeMap<LocationId, PathFormula> = BTreeMap::new();
        let mut ends: BTreeMap<LocationId, PathFormula> = BTreeMap::new();

        match state.block() {
            Some(block) => self.step(location, &block.block_start(), &mut pending, &mut ends),
            None => {
                let start = PathFormula::empty();
                let init = start.extend(
                    instantiate(&self.cfa.init, start.ssa()),
                    start.ssa().clone(),
                );
                if !init.formula().is_false() {
                    if self.cfa.is_abstraction_location(location) {
                        join(&mut ends, location, init);
                    } else {
                        join(&mut pending, location, init);
                    }
                }
            }
        }

        for &loc in &self.order {
            if let Some(pf) = pending.remove(&loc) {
                self.step(loc, &pf, &mut pending, &mut ends);
            }
        }

        for (loc, block) in ends {
            let kind = if self.cfa.is_error(loc) {
                StateKind::Target
            } else {
                StateKind::LoopHead
            };
            let child = arg.add_child(id, loc, kind, block);
            trace!(
                parent = %id,
                state = %child,
                location = self.cfa.location_name(loc),
                "new abstraction state"
            );
        }
        arg.mark_expanded(id);
        Ok(())
    }

    /// Follows every outgoing edge of `from` once.
    fn step(
        &self,
        from: LocationId,
        pf: &PathFormula,
        pending: &mut BTreeMap<LocationId, PathFormula>,
        ends: &mut BTreeMap<LocationId, PathFormula>,
    ) {
        for edge in self.cfa.outgoing(from) {
            let (constraint, ssa) = edge.encode(pf.ssa());
            if constraint.is_false() {
                continue;
            }
            let next = pf.extend(constraint, ssa);
            if next.formula().is_false() {
                continue;
            }
            if self.cfa.is_abstraction_location(edge.to) {
                join(ends, edge.to, next);
            } else {
                join(pending, edge.to, next);
            }
        }
    }
}

fn join(map: &mut BTreeMap<LocationId, PathFormula>, loc: LocationId, pf: PathFormula) {
    let merged = match map.remove(&loc) {
        Some(existing) => existing.merge(&pf),
        None => pf,
    };
    map.insert(loc, merged);
}

/// Kahn order over non-abstraction locations and the edges between them.
///
/// Locations on cycles without a loop head are unreachable from the initial
/// location and are left out.
fn block_order(cfa: &Cfa) -> Vec<LocationId> {
    let inner = |id: LocationId| !cfa.is_abstraction_location(id);
    let mut indegree = vec![0usize; cfa.locations.len()];
    for edge in &cfa.edges {
        if inner(edge.from) && inner(edge.to) && edge.to < indegree.len() {
            indegree[edge.to] += 1;
        }
    }
    let mut ready: Vec<LocationId> = (0..cfa.locations.len())
        .filter(|&id| inner(id) && indegree[id] == 0)
        .collect();
    let mut order = Vec::with_capacity(cfa.locations.len());
    while let Some(id) = ready.pop() {
        order.push(id);
        for edge in cfa.outgoing(id) {
            if inner(edge.to) && edge.to < indegree.len() {
                indegree[edge.to] -= 1;
                if indegree[edge.to] == 0 {
                    ready.push(edge.to);
                }
            }
        }
    }
    order
}

impl ExplorationEngine for CfaUnroller<'_> {
    fn unroll(
        &mut self,
        arg: &mut Arg,
        bound: u32,
        shutdown: &ShutdownNotifier,
    ) -> Result<(), ExplorationError> {
        for id in arg.loop_head_states() {
            let state = &arg[id];
            if state.is_stopped() && state.loop_iteration().is_some_and(|i| i < bound) {
                arg.set_stopped(id, false);
            }
        }

        loop {
            let frontier = arg.frontier();
            if frontier.is_empty() {
                break;
            }
            for id in frontier {
                shutdown.check()?;
                let at_bound = arg
                    .get(id)
                    .and_then(|s| s.loop_iteration())
                    .is_some_and(|i| i >= bound);
                if at_bound {
                    arg.set_stopped(id, true);
                } else {
                    self.expand(arg, id)?;
                }
            }
        }
        debug!(bound, states = arg.len(), "unrolled reachability graph");
        Ok(())
    }
}
