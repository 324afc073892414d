//! Abstract reachability graph.
//!
//! States live in an arena and refer to each other by [`StateId`]. Edges are
//! kept on both ends, parents and children, so the graph can be walked in
//! either direction without back-pointers.

use std::collections::BTreeSet;
use std::fmt;
use std::ops::Index;

use itpmc_smt::path_formula::PathFormula;

use crate::cfa::LocationId;

/// Index of a state in its [`Arg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(usize);

impl StateId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Annotation of an abstraction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Ordinary,
    /// State at a syntactic loop head.
    LoopHead,
    /// State at an error location.
    Target,
}

#[derive(Debug, Clone)]
pub struct ArgState {
    id: StateId,
    location: LocationId,
    kind: StateKind,
    loop_head_encounters: u32,
    block: Option<PathFormula>,
    parents: BTreeSet<StateId>,
    children: BTreeSet<StateId>,
    covered_by: Option<StateId>,
    covering: BTreeSet<StateId>,
    stopped: bool,
    expanded: bool,
}

impl ArgState {
    pub fn id(&self) -> StateId {
        self.id
    }

    pub fn location(&self) -> LocationId {
        self.location
    }

    pub fn kind(&self) -> StateKind {
        self.kind
    }

    pub fn is_target(&self) -> bool {
        self.kind == StateKind::Target
    }

    pub fn is_loop_head(&self) -> bool {
        self.kind == StateKind::LoopHead
    }

    /// Number of loop-head states on the path from the root, this one included.
    pub fn loop_head_encounters(&self) -> u32 {
        self.loop_head_encounters
    }

    /// Zero-based loop iteration: `None` before the first loop-head encounter.
    pub fn loop_iteration(&self) -> Option<u32> {
        self.loop_head_encounters.checked_sub(1)
    }

    /// Path formula of the block ending in this state. The root has none.
    pub fn block(&self) -> Option<&PathFormula> {
        self.block.as_ref()
    }

    pub fn parents(&self) -> &BTreeSet<StateId> {
        &self.parents
    }

    pub fn children(&self) -> &BTreeSet<StateId> {
        &self.children
    }

    pub fn covered_by(&self) -> Option<StateId> {
        self.covered_by
    }

    pub fn covering(&self) -> &BTreeSet<StateId> {
        &self.covering
    }

    pub fn is_covered(&self) -> bool {
        self.covered_by.is_some()
    }

    /// Loop-head state held back at the current bound.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }
}

/// Arena of abstraction states rooted at a synthetic initial state.
#[derive(Debug, Clone)]
pub struct Arg {
    states: Vec<ArgState>,
}

impl Arg {
    /// A graph holding only the root, placed at `initial`.
    pub fn new(initial: LocationId) -> Self {
        Self {
            states: vec![ArgState {
                id: StateId(0),
                location: initial,
                kind: StateKind::Ordinary,
                loop_head_encounters: 0,
                block: None,
                parents: BTreeSet::new(),
                children: BTreeSet::new(),
                covered_by: None,
                covering: BTreeSet::new(),
                stopped: false,
                expanded: false,
            }],
        }
    }

    pub fn root(&self) -> StateId {
        StateId(0)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, id: StateId) -> Option<&ArgState> {
        self.states.get(id.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArgState> {
        self.states.iter()
    }

    /// Appends a state reached from `parent` through `block`.
    ///
    /// Loop-head encounters are derived from the parent: a loop-head child
    /// counts one more, any other child inherits the parent's count.
    pub fn add_child(
        &mut self,
        parent: StateId,
        location: LocationId,
        kind: StateKind,
        block: PathFormula,
    ) -> StateId {
        let inherited = self
            .get(parent)
            .map(ArgState::loop_head_encounters)
            .unwrap_or(0);
        let loop_head_encounters = match kind {
            StateKind::LoopHead => inherited.saturating_add(1),
            StateKind::Ordinary | StateKind::Target => inherited,
        };
        let id = StateId(self.states.len());
        self.states.push(ArgState {
            id,
            location,
            kind,
            loop_head_encounters,
            block: Some(block),
            parents: BTreeSet::from([parent]),
            children: BTreeSet::new(),
            covered_by: None,
            covering: BTreeSet::new(),
            stopped: false,
            expanded: false,
        });
        if let Some(p) = self.states.get_mut(parent.0) {
            p.children.insert(id);
        }
        id
    }

    /// Records that `covering` subsumes `covered`.
    pub fn cover(&mut self, covered: StateId, covering: StateId) {
        if covered == covering || self.get(covering).is_none() {
            return;
        }
        if let Some(state) = self.states.get_mut(covered.0) {
            state.covered_by = Some(covering);
        } else {
            return;
        }
        if let Some(state) = self.states.get_mut(covering.0) {
            state.covering.insert(covered);
        }
    }

    pub fn set_stopped(&mut self, id: StateId, stopped: bool) {
        if let Some(state) = self.states.get_mut(id.0) {
            state.stopped = stopped;
        }
    }

    pub fn mark_expanded(&mut self, id: StateId) {
        if let Some(state) = self.states.get_mut(id.0) {
            state.expanded = true;
        }
    }

    pub fn target_states(&self) -> Vec<StateId> {
        self.ids_where(ArgState::is_target)
    }

    pub fn loop_head_states(&self) -> Vec<StateId> {
        self.ids_where(ArgState::is_loop_head)
    }

    /// Distinct CFA locations of the loop-head states.
    pub fn loop_head_locations(&self) -> BTreeSet<LocationId> {
        self.states
            .iter()
            .filter(|s| s.is_loop_head())
            .map(ArgState::location)
            .collect()
    }

    pub fn covered_states(&self) -> Vec<StateId> {
        self.ids_where(ArgState::is_covered)
    }

    /// States still waiting for expansion: not expanded, not stopped, not targets.
    pub fn frontier(&self) -> Vec<StateId> {
        self.ids_where(|s| !s.expanded && !s.stopped && !s.is_target())
    }

    /// Abstraction states from the root down to `id`, root first.
    ///
    /// Follows the smallest parent at every step.
    pub fn abstraction_path_to_root(&self, id: StateId) -> Vec<StateId> {
        let mut path = Vec::new();
        let mut seen = BTreeSet::new();
        let mut current = self.get(id);
        while let Some(state) = current {
            if !seen.insert(state.id) {
                break;
            }
            path.push(state.id);
            current = state
                .parents
                .first()
                .and_then(|parent| self.get(*parent));
        }
        path.reverse();
        path
    }

    fn ids_where(&self, pred: impl Fn(&ArgState) -> bool) -> Vec<StateId> {
        self.states
            .iter()
            .filter(|s| pred(s))
            .map(ArgState::id)
            .collect()
    }
}

impl Index<StateId> for Arg {
    type Output = ArgState;

    fn index(&self, id: StateId) -> &ArgState {
        &self.states[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itpmc_smt::ssa::SsaMap;
    use itpmc_smt::terms::SmtTerm;

    fn block(tag: i64) -> PathFormula {
        PathFormula::empty().extend(SmtTerm::var("x@0").eq(SmtTerm::int(tag)), SsaMap::empty())
    }

    /// root -> head(0) -> head(1) -> err, head(0) -> err
    fn sample() -> (Arg, [StateId; 5]) {
        let mut arg = Arg::new(0);
        let root = arg.root();
        let h0 = arg.add_child(root, 1, StateKind::LoopHead, block(0));
        let h1 = arg.add_child(h0, 1, StateKind::LoopHead, block(1));
        let e1 = arg.add_child(h1, 2, StateKind::Target, block(2));
        let e0 = arg.add_child(h0, 2, StateKind::Target, block(3));
        (arg, [root, h0, h1, e1, e0])
    }

    #[test]
    fn encounters_count_loop_heads_on_the_path() {
        let (arg, [root, h0, h1, e1, e0]) = sample();
        assert_eq!(arg[root].loop_iteration(), None);
        assert_eq!(arg[h0].loop_iteration(), Some(0));
        assert_eq!(arg[h1].loop_iteration(), Some(1));
        assert_eq!(arg[e1].loop_head_encounters(), 2);
        assert_eq!(arg[e0].loop_head_encounters(), 1);
    }

    #[test]
    fn queries_by_kind() {
        let (arg, [_, h0, h1, e1, e0]) = sample();
        assert_eq!(arg.loop_head_states(), vec![h0, h1]);
        assert_eq!(arg.target_states(), vec![e1, e0]);
        assert_eq!(arg.loop_head_locations(), BTreeSet::from([1]));
        assert_eq!(arg.len(), 5);
    }

    #[test]
    fn path_to_root_starts_at_root() {
        let (arg, [root, h0, h1, e1, _]) = sample();
        assert_eq!(arg.abstraction_path_to_root(e1), vec![root, h0, h1, e1]);
        assert_eq!(arg.abstraction_path_to_root(root), vec![root]);
    }

    #[test]
    fn children_and_parents_are_linked() {
        let (arg, [root, h0, h1, _, e0]) = sample();
        assert_eq!(arg[root].children(), &BTreeSet::from([h0]));
        assert_eq!(arg[h0].children(), &BTreeSet::from([h1, e0]));
        assert_eq!(arg[h1].parents(), &BTreeSet::from([h0]));
        assert!(arg[root].block().is_none());
        assert!(arg[h0].block().is_some());
    }

    #[test]
    fn coverage_is_recorded_on_both_ends() {
        let (mut arg, [_, h0, h1, _, _]) = sample();
        assert!(arg.covered_states().is_empty());
        arg.cover(h1, h0);
        assert_eq!(arg.covered_states(), vec![h1]);
        assert_eq!(arg[h1].covered_by(), Some(h0));
        assert!(arg[h0].covering().contains(&h1));
        arg.cover(h0, h0);
        assert_eq!(arg.covered_states(), vec![h1]);
    }

    #[test]
    fn frontier_skips_targets_stopped_and_expanded() {
        let (mut arg, [root, h0, h1, _, _]) = sample();
        arg.mark_expanded(root);
        arg.mark_expanded(h0);
        assert_eq!(arg.frontier(), vec![h1]);
        arg.set_stopped(h1, true);
        assert!(arg.frontier().is_empty());
        arg.set_stopped(h1, false);
        assert_eq!(arg.frontier(), vec![h1]);
    }
}
