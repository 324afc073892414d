//! SSA-style variable versioning.
//!
//! A program variable `x` appears in path formulas as `x@i`, where `i` is the
//! version recorded in an [`SsaMap`]. Variables absent from a map have
//! version 0.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::terms::SmtTerm;

/// Separator between a variable's base name and its version.
pub const VERSION_SEPARATOR: char = '@';

/// Render the versioned name of `base` at `version`.
pub fn versioned_name(base: &str, version: u32) -> String {
    format!("{base}{VERSION_SEPARATOR}{version}")
}

/// Split `x@3` into `("x", Some(3))`; unversioned names yield `None`.
pub fn split_versioned(name: &str) -> (&str, Option<u32>) {
    match name.rsplit_once(VERSION_SEPARATOR) {
        Some((base, idx)) => match idx.parse::<u32>() {
            Ok(v) => (base, Some(v)),
            Err(_) => (name, None),
        },
        None => (name, None),
    }
}

/// Base name of a possibly versioned variable.
pub fn base_name(name: &str) -> &str {
    split_versioned(name).0
}

/// Mapping from variable name to its current version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SsaMap {
    indices: BTreeMap<String, u32>,
}

impl SsaMap {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Current version of `var` (0 when never assigned).
    pub fn index(&self, var: &str) -> u32 {
        self.indices.get(var).copied().unwrap_or(0)
    }

    pub fn set_index(&mut self, var: impl Into<String>, index: u32) {
        self.indices.insert(var.into(), index);
    }

    /// Advance `var` to a fresh version and return it.
    pub fn bump(&mut self, var: &str) -> u32 {
        let next = self.index(var).saturating_add(1);
        self.indices.insert(var.to_string(), next);
        next
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.indices.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Pointwise maximum of two maps.
    pub fn merge(&self, other: &SsaMap) -> SsaMap {
        let mut out = self.clone();
        for (var, idx) in other.iter() {
            if idx > out.index(var) {
                out.set_index(var, idx);
            }
        }
        out
    }

    /// Variables present in either map.
    pub fn variables<'a>(&'a self, other: &'a SsaMap) -> impl Iterator<Item = &'a str> {
        let mut names: Vec<&str> = self.indices.keys().map(String::as_str).collect();
        for name in other.indices.keys() {
            if !self.indices.contains_key(name) {
                names.push(name.as_str());
            }
        }
        names.sort_unstable();
        names.into_iter()
    }
}

impl fmt::Display for SsaMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .indices
            .iter()
            .map(|(var, idx)| format!("{var}@{idx}"))
            .collect();
        write!(f, "{{{}}}", entries.join(", "))
    }
}

/// Attach versions from `ssa` to every unversioned variable of `term`.
pub fn instantiate(term: &SmtTerm, ssa: &SsaMap) -> SmtTerm {
    term.rename_vars(&|name: &str| match split_versioned(name) {
        (_, Some(_)) => name.to_string(),
        (base, None) => versioned_name(base, ssa.index(base)),
    })
}

/// Strip the version suffix from every variable of `term`.
pub fn uninstantiate(term: &SmtTerm) -> SmtTerm {
    term.rename_vars(&|name: &str| base_name(name).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_handles_versioned_and_plain_names() {
        assert_eq!(split_versioned("x@3"), ("x", Some(3)));
        assert_eq!(split_versioned("x"), ("x", None));
        assert_eq!(split_versioned("weird@name"), ("weird@name", None));
        assert_eq!(base_name("counter@12"), "counter");
    }

    #[test]
    fn merge_takes_pointwise_maximum() {
        let mut a = SsaMap::empty();
        a.set_index("x", 2);
        a.set_index("y", 1);
        let mut b = SsaMap::empty();
        b.set_index("x", 1);
        b.set_index("z", 4);
        let m = a.merge(&b);
        assert_eq!(m.index("x"), 2);
        assert_eq!(m.index("y"), 1);
        assert_eq!(m.index("z"), 4);
        assert_eq!(m.index("w"), 0);
        let vars: Vec<&str> = a.variables(&b).collect();
        assert_eq!(vars, vec!["x", "y", "z"]);
    }

    #[test]
    fn reindexing_moves_a_formula_onto_another_frame() {
        let mut later = SsaMap::empty();
        later.set_index("x", 5);
        let at_later = instantiate(&SmtTerm::var("x").le(SmtTerm::int(10)), &later);
        assert_eq!(at_later, SmtTerm::var("x@5").le(SmtTerm::int(10)));

        let mut prefix = SsaMap::empty();
        prefix.set_index("x", 1);
        let moved = instantiate(&uninstantiate(&at_later), &prefix);
        assert_eq!(moved, SmtTerm::var("x@1").le(SmtTerm::int(10)));

        let unassigned = instantiate(&SmtTerm::var("y"), &prefix);
        assert_eq!(unassigned, SmtTerm::var("y@0"));
    }
}
