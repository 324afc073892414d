use serde::Serialize;
use std::fmt;

use itpmc_smt::solver::Model;

use crate::stats::ImcStatistics;

/// Final answer of the model checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// An error location is reachable within the explored bound.
    UnsafePrecise,
    /// No error location is reachable in any unrolling.
    SafePrecise,
    /// The bound budget ran out without a proof or a counterexample.
    UnsafeImprecise,
}

impl Verdict {
    pub fn is_conclusive(self) -> bool {
        !matches!(self, Verdict::UnsafeImprecise)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::UnsafePrecise => write!(f, "UNSAFE"),
            Verdict::SafePrecise => write!(f, "SAFE"),
            Verdict::UnsafeImprecise => write!(f, "UNKNOWN"),
        }
    }
}

/// Why the driver stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminationReason {
    /// The reach-error formula is satisfiable.
    ErrorReachable,
    /// No state reaches the loop head at the bound.
    BoundingAssertionUnsat,
    /// Interpolation converged to an inductive over-approximation.
    FixedPoint { iterations: u32 },
    /// The bound could not be increased any further.
    BoundExhausted,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::ErrorReachable => write!(f, "error location reachable"),
            TerminationReason::BoundingAssertionUnsat => {
                write!(f, "loop head unreachable at the current bound")
            }
            TerminationReason::FixedPoint { iterations } => {
                write!(f, "interpolation fixed point after {iterations} iterations")
            }
            TerminationReason::BoundExhausted => write!(f, "loop bound exhausted"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImcOutcome {
    pub verdict: Verdict,
    /// Loop bound of the final round.
    pub bound: u32,
    pub reason: TerminationReason,
    /// Values of versioned variables along an error path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterexample: Option<Model>,
    pub stats: ImcStatistics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_serializes_screaming_case() {
        assert_eq!(
            serde_json::to_string(&Verdict::UnsafeImprecise).unwrap(),
            "\"UNSAFE_IMPRECISE\""
        );
        assert!(!Verdict::UnsafeImprecise.is_conclusive());
        assert!(Verdict::SafePrecise.is_conclusive());
    }

    #[test]
    fn reason_is_internally_tagged() {
        let json = serde_json::to_value(TerminationReason::FixedPoint { iterations: 3 }).unwrap();
        assert_eq!(json["kind"], "fixed_point");
        assert_eq!(json["iterations"], 3);
    }
}
