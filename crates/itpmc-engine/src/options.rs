use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How the partitioned formulas are read off the reachability graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaCollection {
    /// Walk abstraction paths from target states to the root.
    #[default]
    ArgTraversal,
    /// Group loop-head states by their iteration.
    SyntacticLoop,
}

impl fmt::Display for FormulaCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaCollection::ArgTraversal => write!(f, "arg_traversal"),
            FormulaCollection::SyntacticLoop => write!(f, "syntactic_loop"),
        }
    }
}

impl FromStr for FormulaCollection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "arg_traversal" | "arg-traversal" => Ok(FormulaCollection::ArgTraversal),
            "syntactic_loop" | "syntactic-loop" => Ok(FormulaCollection::SyntacticLoop),
            other => Err(format!(
                "unknown formula collection '{other}' (expected 'arg_traversal' or 'syntactic_loop')"
            )),
        }
    }
}

/// Switches of the IMC algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImcOptions {
    /// Try to prove safety with interpolants once the bound exceeds 1.
    pub interpolation: bool,
    /// Compute interpolants as the negation of an interpolant of the suffix.
    pub derive_interpolant_from_suffix: bool,
    pub formula_collection: FormulaCollection,
    /// Stop with a proof when no state reaches the loop head at the bound.
    pub check_forward_conditions: bool,
    pub check_existence_of_covered_states: bool,
    pub check_sanity_of_formulas: bool,
}

impl Default for ImcOptions {
    fn default() -> Self {
        Self {
            interpolation: true,
            derive_interpolant_from_suffix: true,
            formula_collection: FormulaCollection::ArgTraversal,
            check_forward_conditions: true,
            check_existence_of_covered_states: true,
            check_sanity_of_formulas: false,
        }
    }
}
