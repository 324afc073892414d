use std::collections::BTreeSet;

use serde::Serialize;

use crate::ssa::{versioned_name, SsaMap};
use crate::terms::SmtTerm;

/// Memory regions a path may touch through aliasing accesses.
///
/// Opaque to the model checker; carried along so that formulas from different
/// paths are only combined together with their footprints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryFootprint {
    regions: BTreeSet<String>,
}

impl MemoryFootprint {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.regions.insert(region.into());
        self
    }

    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.regions.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn merge(&self, other: &MemoryFootprint) -> MemoryFootprint {
        MemoryFootprint {
            regions: self.regions.union(&other.regions).cloned().collect(),
        }
    }
}

/// Symbolic effect of a set of program paths.
#[derive(Debug, Clone, PartialEq)]
pub struct PathFormula {
    formula: SmtTerm,
    ssa: SsaMap,
    footprint: MemoryFootprint,
    length: usize,
}

impl PathFormula {
    pub fn new(formula: SmtTerm, ssa: SsaMap, footprint: MemoryFootprint, length: usize) -> Self {
        Self {
            formula,
            ssa,
            footprint,
            length,
        }
    }

    /// `true` over the empty SSA map: the start of a path from the root.
    pub fn empty() -> Self {
        Self::new(SmtTerm::tt(), SsaMap::empty(), MemoryFootprint::empty(), 0)
    }

    /// `false` over the empty SSA map: the neutral element of [`PathFormula::merge`].
    pub fn unsatisfiable() -> Self {
        Self::new(SmtTerm::ff(), SsaMap::empty(), MemoryFootprint::empty(), 0)
    }

    /// A fresh block continuing this formula's version frame.
    pub fn block_start(&self) -> Self {
        Self::new(SmtTerm::tt(), self.ssa.clone(), self.footprint.clone(), 0)
    }

    pub fn formula(&self) -> &SmtTerm {
        &self.formula
    }

    pub fn ssa(&self) -> &SsaMap {
        &self.ssa
    }

    pub fn footprint(&self) -> &MemoryFootprint {
        &self.footprint
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Conjoin an already instantiated constraint and install the SSA map it
    /// was built against, counting one more edge.
    pub fn extend(&self, constraint: SmtTerm, ssa: SsaMap) -> PathFormula {
        PathFormula {
            formula: SmtTerm::conj([self.formula.clone(), constraint]),
            ssa,
            footprint: self.footprint.clone(),
            length: self.length.saturating_add(1),
        }
    }

    /// Disjunction of two path formulas with possibly different SSA maps.
    ///
    /// Versions are aligned to the pointwise maximum; the branch lagging
    /// behind for a variable is extended with an equality to the newer copy.
    pub fn merge(&self, other: &PathFormula) -> PathFormula {
        let ssa = self.ssa.merge(&other.ssa);
        let lhs = Self::align(&self.formula, &self.ssa, &ssa);
        let rhs = Self::align(&other.formula, &other.ssa, &ssa);
        PathFormula {
            formula: SmtTerm::disj([lhs, rhs]),
            ssa,
            footprint: self.footprint.merge(&other.footprint),
            length: self.length.max(other.length),
        }
    }

    fn align(formula: &SmtTerm, from: &SsaMap, to: &SsaMap) -> SmtTerm {
        if formula.is_false() {
            return SmtTerm::ff();
        }
        let mut parts = vec![formula.clone()];
        for (var, target) in to.iter() {
            let current = from.index(var);
            if current < target {
                parts.push(
                    SmtTerm::var(versioned_name(var, target))
                        .eq(SmtTerm::var(versioned_name(var, current))),
                );
            }
        }
        SmtTerm::conj(parts)
    }
}
