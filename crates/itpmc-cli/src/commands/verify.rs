// Command handler for: Verify
//
// Loads a program, merges options from `--config` and flags, runs the IMC
// pipeline and prints the outcome.

use std::path::PathBuf;

use miette::IntoDiagnostic;
use serde_json::json;
use tracing::debug;

use itpmc_engine::pipeline::{self, PipelineOptions};
use itpmc_engine::result::ImcOutcome;

use super::helpers::{load_cfa, parse_output_format, pipeline_options};
use crate::cli::VerifyArgs;
use crate::OutputFormat;

const REPORT_SCHEMA_VERSION: u32 = 1;

pub(crate) fn render_outcome_text(file: &str, outcome: &ImcOutcome) -> String {
    let mut out = format!(
        "{file}: {} at bound {} ({})\n",
        outcome.verdict, outcome.bound, outcome.reason
    );
    if let Some(model) = &outcome.counterexample {
        out.push_str("Counterexample:\n");
        for (name, value) in &model.values {
            let value = serde_json::to_string(value).unwrap_or_default();
            out.push_str(&format!("  {name} = {value}\n"));
        }
    }
    out.push_str(&format!("{}\n", outcome.stats));
    out
}

pub(crate) fn render_outcome_json(
    file: &str,
    options: &PipelineOptions,
    outcome: &ImcOutcome,
) -> serde_json::Value {
    json!({
        "schema_version": REPORT_SCHEMA_VERSION,
        "file": file,
        "options": options,
        "result": outcome,
    })
}

pub(crate) fn run_verify_command(
    file: PathBuf,
    args: VerifyArgs,
    format: String,
) -> miette::Result<()> {
    let output_format = parse_output_format(&format)?;
    let options = pipeline_options(&args)?;
    debug!(?options, "resolved pipeline options");
    let cfa = load_cfa(&file)?;
    let filename = file.display().to_string();

    let outcome = pipeline::verify_cfa(&cfa, &options).into_diagnostic()?;

    match output_format {
        OutputFormat::Text => print!("{}", render_outcome_text(&filename, &outcome)),
        OutputFormat::Json => {
            let report = render_outcome_json(&filename, &options, &outcome);
            println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
        }
    }
    Ok(())
}
