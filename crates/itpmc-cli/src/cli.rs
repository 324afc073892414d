//! CLI argument definitions: top-level `Cli` struct and `Commands` enum.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub(crate) const CLI_LONG_ABOUT: &str =
    "Interpolation-based model checker for single-loop programs.\n\n\
    Programs are written as control-flow automata:\n  \
    itpmc verify demos/counter_safe.imc\n  \
    itpmc inspect demos/counter_safe.imc --bound 3\n\n\
    Verdicts are SAFE, UNSAFE (with a counterexample) and UNKNOWN when the\n\
    loop bound budget runs out.";

#[derive(Parser)]
#[command(name = "itpmc")]
#[command(about = "Interpolation-based model checker for single-loop programs")]
#[command(long_about = CLI_LONG_ABOUT)]
#[command(version)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Check whether an error location of a program is reachable
    Verify {
        /// Path to the .imc program
        file: PathBuf,

        #[command(flatten)]
        options: VerifyArgs,

        /// Output format: text | json
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Print the control-flow automaton and its unrolled reachability graph
    Inspect {
        /// Path to the .imc program
        file: PathBuf,

        /// Unroll the reachability graph up to this loop bound
        #[arg(long, default_value_t = 1)]
        bound: u32,

        /// Output format: text | json
        #[arg(long, default_value = "text")]
        format: String,
    },
}

/// Verification options. Every flag left unset keeps the value from
/// `--config`, or the built-in default.
#[derive(clap::Args, Debug, Default)]
pub(crate) struct VerifyArgs {
    /// JSON file holding serialized pipeline options
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,

    /// Solver backend: enumerative | z3
    #[arg(long)]
    pub(crate) solver: Option<String>,

    /// Largest loop bound to try
    #[arg(long)]
    pub(crate) max_bound: Option<u32>,

    /// Wall-clock timeout in seconds (0 disables)
    #[arg(long)]
    pub(crate) timeout: Option<u64>,

    /// Write every solver query as an SMT-LIB script into this directory
    #[arg(long)]
    pub(crate) dump_smt: Option<PathBuf>,

    /// Search for a fixed point with interpolants
    #[arg(long)]
    pub(crate) interpolation: Option<bool>,

    /// Derive interpolants by negating an interpolant of the suffix
    #[arg(long)]
    pub(crate) derive_from_suffix: Option<bool>,

    /// Formula collection: arg_traversal | syntactic_loop
    #[arg(long)]
    pub(crate) collection: Option<String>,

    /// Prove safety when no state reaches the loop head at the bound
    #[arg(long)]
    pub(crate) forward_check: Option<bool>,

    /// Reject reachability graphs containing covered states
    #[arg(long)]
    pub(crate) covered_check: Option<bool>,

    /// Check that prefix and loop formulas are jointly satisfiable
    #[arg(long)]
    pub(crate) sanity_check: Option<bool>,
}
