use thiserror::Error;

use itpmc_smt::formula::FormulaError;

use crate::explore::ExplorationError;
use crate::shutdown::Cancelled;

/// Failures that abort an IMC run without a verdict.
#[derive(Debug, Error)]
pub enum ImcError {
    #[error("Unsupported program: {0}")]
    Unsupported(String),
    #[error("Solver error: {0}")]
    Solver(#[from] FormulaError),
    #[error(transparent)]
    Cancelled(#[from] Cancelled),
    #[error("Collected formulas are inconsistent: {0}")]
    InsaneFormulas(String),
    #[error("Invalid loop bound {0}: the bound must be at least 1")]
    InvalidBound(u32),
    #[error("Loop bound {got} in round {expected}: bounds must start at 1 and step by 1")]
    NonSequentialBound { expected: u32, got: u32 },
    #[error("Exploration error: {0}")]
    Exploration(String),
}

impl From<ExplorationError> for ImcError {
    fn from(err: ExplorationError) -> Self {
        match err {
            ExplorationError::Cancelled(c) => ImcError::Cancelled(c),
            other => ImcError::Exploration(other.to_string()),
        }
    }
}

impl ImcError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ImcError::Cancelled(_))
    }
}
