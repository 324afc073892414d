// Shared helpers: input loading, option merging and small renderers.

use std::path::Path;

use miette::IntoDiagnostic;

use itpmc_engine::options::FormulaCollection;
use itpmc_engine::pipeline::{self, PipelineOptions};
use itpmc_ir::cfa::Cfa;
use itpmc_smt::formula::SolverChoice;
use itpmc_smt::sorts::SmtSort;

use crate::cli::VerifyArgs;
use crate::OutputFormat;

pub(crate) fn parse_output_format(raw: &str) -> miette::Result<OutputFormat> {
    match raw {
        "text" => Ok(OutputFormat::Text),
        "json" => Ok(OutputFormat::Json),
        other => miette::bail!("Unknown output format: {other}. Use 'text' or 'json'."),
    }
}

pub(crate) fn read_source(path: &Path) -> miette::Result<String> {
    std::fs::read_to_string(path)
        .into_diagnostic()
        .map_err(|e| e.wrap_err(format!("Cannot read {}", path.display())))
}

/// Reads, parses and lowers a program, keeping source spans for diagnostics.
pub(crate) fn load_cfa(path: &Path) -> miette::Result<Cfa> {
    let source = read_source(path)?;
    let filename = path.display().to_string();
    let program = itpmc_dsl::parse(&source, &filename)?;
    let cfa = pipeline::lower_with_source(&program, &source, &filename)?;
    Ok(cfa)
}

/// Options from `--config` (or defaults), overridden by explicit flags.
pub(crate) fn pipeline_options(args: &VerifyArgs) -> miette::Result<PipelineOptions> {
    let mut options = match &args.config {
        Some(path) => {
            let text = read_source(path)?;
            serde_json::from_str::<PipelineOptions>(&text)
                .into_diagnostic()
                .map_err(|e| e.wrap_err(format!("Invalid config file {}", path.display())))?
        }
        None => PipelineOptions::default(),
    };

    if let Some(raw) = &args.solver {
        options.solver = raw.parse::<SolverChoice>().map_err(miette::Report::msg)?;
    }
    if let Some(max_bound) = args.max_bound {
        options.max_bound = max_bound;
    }
    if let Some(timeout) = args.timeout {
        options.timeout_secs = timeout;
    }
    if let Some(dir) = &args.dump_smt {
        options.dump_smt = Some(dir.clone());
    }

    let imc = &mut options.imc;
    if let Some(raw) = &args.collection {
        imc.formula_collection = raw.parse::<FormulaCollection>().map_err(miette::Report::msg)?;
    }
    if let Some(v) = args.interpolation {
        imc.interpolation = v;
    }
    if let Some(v) = args.derive_from_suffix {
        imc.derive_interpolant_from_suffix = v;
    }
    if let Some(v) = args.forward_check {
        imc.check_forward_conditions = v;
    }
    if let Some(v) = args.covered_check {
        imc.check_existence_of_covered_states = v;
    }
    if let Some(v) = args.sanity_check {
        imc.check_sanity_of_formulas = v;
    }

    if options.max_bound == 0 {
        miette::bail!("--max-bound must be at least 1");
    }
    Ok(options)
}

pub(crate) fn sort_name(sort: &SmtSort) -> String {
    match sort {
        SmtSort::Bool => "bool".into(),
        SmtSort::Int => "int".into(),
        SmtSort::Range(lo, hi) => format!("{lo}..{hi}"),
    }
}
