#![doc = include_str!("../README.md")]

//! Formula layer of the interpolating model checker.
//!
//! Solver-agnostic terms over bounded integers and booleans, SSA versioning,
//! path formulas, and a formula manager that answers satisfiability and
//! implication queries and computes Craig interpolants, with an exact
//! finite-domain backend and a Z3 backend.

pub mod backends;
pub mod formula;
pub mod path_formula;
pub mod solver;
pub mod sorts;
pub mod ssa;
pub mod terms;
