#![doc = include_str!("../README.md")]

//! Program model of the interpolating model checker.
//!
//! This crate defines the control-flow automaton, the lowering pass from the
//! DSL AST to it, syntactic loop-head detection, and the abstract
//! reachability graph the exploration engine unrolls into.

pub mod arg;
pub mod cfa;
pub mod loops;
pub mod lowering;
#[cfg(any(test, feature = "proptest"))]
pub mod proptest_generators;
