//! Interpolation-based model checking over an unrolled reachability graph.

pub mod driver;
pub mod interpolation;
pub mod partition;
pub mod safety;

pub use driver::ImcDriver;
pub use interpolation::{InterpolationEngine, InterpolationOutcome, InterpolationRun};
pub use partition::{
    collector_for, ArgTraversalCollector, FormulaCollector, PartitionedFormulas,
    SyntacticLoopCollector,
};
pub use safety::{bounding_assertion, reach_error_formula, SafetyChecker};
