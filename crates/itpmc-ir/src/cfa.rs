use std::collections::BTreeSet;

use indexmap::IndexMap;
use itpmc_smt::sorts::SmtSort;
use itpmc_smt::ssa::{instantiate, versioned_name, SsaMap};
use itpmc_smt::terms::SmtTerm;

/// A unique identifier for a location.
pub type LocationId = usize;
/// A unique identifier for an edge.
pub type EdgeId = usize;

/// A program variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub sort: SmtSort,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub name: String,
    pub is_error: bool,
}

/// Right-hand side of an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateValue {
    /// Unversioned term over the pre-state.
    Assign(SmtTerm),
    Havoc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub var: String,
    pub value: UpdateValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub from: LocationId,
    pub to: LocationId,
    /// Unversioned guard; `true` when the edge is unguarded.
    pub guard: SmtTerm,
    /// Simultaneous updates.
    pub updates: Vec<Update>,
}

impl Edge {
    /// Constraint of taking this edge from the version frame `ssa`, together
    /// with the frame after it.
    ///
    /// Right-hand sides read the pre-state. A fresh version of a variable is
    /// constrained to its declared range in every query, so an update leaving
    /// the range blocks the transition.
    pub fn encode(&self, ssa: &SsaMap) -> (SmtTerm, SsaMap) {
        let mut next = ssa.clone();
        let mut parts = vec![instantiate(&self.guard, ssa)];
        for update in &self.updates {
            let version = next.bump(&update.var);
            if let UpdateValue::Assign(rhs) = &update.value {
                parts.push(
                    SmtTerm::var(versioned_name(&update.var, version)).eq(instantiate(rhs, ssa)),
                );
            }
        }
        (SmtTerm::conj(parts), next)
    }
}

/// Control-flow automaton of a single-procedure program.
#[derive(Debug, Clone, PartialEq)]
pub struct Cfa {
    pub name: String,
    pub variables: Vec<Variable>,
    pub locations: Vec<Location>,
    pub edges: Vec<Edge>,
    pub initial: LocationId,
    /// Unversioned initial-state constraint.
    pub init: SmtTerm,
    /// Syntactic loop heads (targets of DFS back edges).
    pub loop_heads: BTreeSet<LocationId>,
}

impl Cfa {
    /// Sort registry for the formula manager: base name to sort.
    pub fn var_sorts(&self) -> IndexMap<String, SmtSort> {
        self.variables
            .iter()
            .map(|v| (v.name.clone(), v.sort.clone()))
            .collect()
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn location_name(&self, id: LocationId) -> &str {
        self.locations
            .get(id)
            .map(|l| l.name.as_str())
            .unwrap_or("<unknown>")
    }

    pub fn location_by_name(&self, name: &str) -> Option<LocationId> {
        self.locations.iter().position(|l| l.name == name)
    }

    pub fn is_error(&self, id: LocationId) -> bool {
        self.locations.get(id).is_some_and(|l| l.is_error)
    }

    pub fn is_loop_head(&self, id: LocationId) -> bool {
        self.loop_heads.contains(&id)
    }

    /// Locations at which path formulas are summarized into blocks.
    pub fn is_abstraction_location(&self, id: LocationId) -> bool {
        self.is_loop_head(id) || self.is_error(id)
    }

    pub fn error_locations(&self) -> impl Iterator<Item = LocationId> + '_ {
        self.locations
            .iter()
            .enumerate()
            .filter(|(_, l)| l.is_error)
            .map(|(id, _)| id)
    }

    /// Outgoing edges of `id`; error locations have none.
    pub fn outgoing(&self, id: LocationId) -> impl Iterator<Item = &Edge> + '_ {
        let blocked = self.is_error(id);
        self.edges
            .iter()
            .filter(move |e| !blocked && e.from == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_reads_pre_state_and_bumps_versions() {
        let edge = Edge {
            from: 0,
            to: 0,
            guard: SmtTerm::var("x").lt(SmtTerm::int(10)),
            updates: vec![
                Update {
                    var: "x".into(),
                    value: UpdateValue::Assign(SmtTerm::var("y")),
                },
                Update {
                    var: "y".into(),
                    value: UpdateValue::Assign(SmtTerm::var("x")),
                },
                Update {
                    var: "z".into(),
                    value: UpdateValue::Havoc,
                },
            ],
        };
        let mut ssa = SsaMap::empty();
        ssa.set_index("x", 2);
        let (constraint, next) = edge.encode(&ssa);
        assert_eq!(next.index("x"), 3);
        assert_eq!(next.index("y"), 1);
        assert_eq!(next.index("z"), 1);
        assert_eq!(
            constraint,
            SmtTerm::And(vec![
                SmtTerm::var("x@2").lt(SmtTerm::int(10)),
                SmtTerm::var("x@3").eq(SmtTerm::var("y@0")),
                SmtTerm::var("y@1").eq(SmtTerm::var("x@2")),
            ])
        );
    }

    #[test]
    fn error_locations_have_no_outgoing_edges() {
        let cfa = Cfa {
            name: "t".into(),
            variables: vec![],
            locations: vec![
                Location {
                    name: "a".into(),
                    is_error: false,
                },
                Location {
                    name: "err".into(),
                    is_error: true,
                },
            ],
            edges: vec![
                Edge {
                    from: 0,
                    to: 1,
                    guard: SmtTerm::tt(),
                    updates: vec![],
                },
                Edge {
                    from: 1,
                    to: 1,
                    guard: SmtTerm::tt(),
                    updates: vec![],
                },
            ],
            initial: 0,
            init: SmtTerm::tt(),
            loop_heads: BTreeSet::new(),
        };
        assert_eq!(cfa.outgoing(0).count(), 1);
        assert_eq!(cfa.outgoing(1).count(), 0);
        assert!(cfa.is_abstraction_location(1));
        assert_eq!(cfa.error_locations().collect::<Vec<_>>(), vec![1]);
    }
}
