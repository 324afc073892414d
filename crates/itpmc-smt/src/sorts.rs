use serde::{Deserialize, Serialize};

/// SMT sorts.
///
/// `Range` is a bounded integer: every versioned copy of a variable of this
/// sort is constrained to `lo..=hi` in every query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SmtSort {
    Bool,
    Int,
    Range(i64, i64),
}

impl SmtSort {
    /// Whether the enumerative backend can search this sort exhaustively.
    pub fn is_finite(&self) -> bool {
        matches!(self, SmtSort::Bool | SmtSort::Range(..))
    }

    /// Number of values of a finite sort, `None` for `Int`.
    pub fn cardinality(&self) -> Option<u64> {
        match self {
            SmtSort::Bool => Some(2),
            SmtSort::Int => None,
            SmtSort::Range(lo, hi) if lo > hi => Some(0),
            SmtSort::Range(lo, hi) => Some(hi.abs_diff(*lo).saturating_add(1)),
        }
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, SmtSort::Bool)
    }
}

impl std::fmt::Display for SmtSort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SmtSort::Bool => write!(f, "Bool"),
            SmtSort::Int => write!(f, "Int"),
            SmtSort::Range(lo, hi) => write!(f, "Int[{lo}..{hi}]"),
        }
    }
}
