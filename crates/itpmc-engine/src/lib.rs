#![doc = include_str!("../README.md")]

//! Interpolation-based model checking engine.
//!
//! This crate unrolls a control-flow automaton into an abstract reachability
//! graph, partitions its block formulas per round, checks them for reachable
//! errors, and searches for an inductive over-approximation with Craig
//! interpolants while raising the loop bound.

pub mod bounds;
pub mod error;
pub mod explore;
pub mod imc;
pub mod options;
pub mod pipeline;
pub mod result;
pub mod shutdown;
pub mod stats;
