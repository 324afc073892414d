// Command handler for: Inspect
//
// Prints the lowered control-flow automaton and the reachability graph the
// reference unroller builds for a given loop bound.

use std::fmt::Write as _;
use std::path::PathBuf;

use miette::IntoDiagnostic;
use serde_json::{json, Value};

use itpmc_engine::explore::{CfaUnroller, ExplorationEngine};
use itpmc_engine::shutdown::ShutdownNotifier;
use itpmc_ir::arg::Arg;
use itpmc_ir::cfa::{Cfa, Edge, UpdateValue};

use super::helpers::{load_cfa, parse_output_format, sort_name};
use crate::OutputFormat;

fn render_edge(cfa: &Cfa, edge: &Edge) -> String {
    let mut out = format!(
        "{} -> {}",
        cfa.location_name(edge.from),
        cfa.location_name(edge.to)
    );
    if !edge.guard.is_true() {
        let _ = write!(out, " when {}", edge.guard);
    }
    if !edge.updates.is_empty() {
        let updates: Vec<String> = edge
            .updates
            .iter()
            .map(|u| match &u.value {
                UpdateValue::Assign(rhs) => format!("{} := {rhs}", u.var),
                UpdateValue::Havoc => format!("{} := *", u.var),
            })
            .collect();
        let _ = write!(out, " do {}", updates.join(", "));
    }
    out
}

fn location_flags(cfa: &Cfa, id: usize) -> Vec<&'static str> {
    let mut flags = Vec::new();
    if id == cfa.initial {
        flags.push("initial");
    }
    if cfa.is_error(id) {
        flags.push("error");
    }
    if cfa.is_loop_head(id) {
        flags.push("loop-head");
    }
    flags
}

pub(crate) fn render_text(cfa: &Cfa, arg: &Arg, bound: u32) -> String {
    let mut out = format!("program {}\n", cfa.name);
    out.push_str("variables:\n");
    for var in &cfa.variables {
        let _ = writeln!(out, "  {}: {}", var.name, sort_name(&var.sort));
    }
    let _ = writeln!(out, "init: {}", cfa.init);
    out.push_str("locations:\n");
    for (id, loc) in cfa.locations.iter().enumerate() {
        let flags = location_flags(cfa, id);
        if flags.is_empty() {
            let _ = writeln!(out, "  {}", loc.name);
        } else {
            let _ = writeln!(out, "  {} [{}]", loc.name, flags.join(", "));
        }
    }
    out.push_str("edges:\n");
    for edge in &cfa.edges {
        let _ = writeln!(out, "  {}", render_edge(cfa, edge));
    }

    let _ = writeln!(out, "reachability graph at bound {bound}: {} states", arg.len());
    for state in arg.iter() {
        let parents: Vec<String> = state.parents().iter().map(ToString::to_string).collect();
        let _ = write!(
            out,
            "  {} {} {:?} encounters={}",
            state.id(),
            cfa.location_name(state.location()),
            state.kind(),
            state.loop_head_encounters()
        );
        if state.is_stopped() {
            out.push_str(" stopped");
        }
        if !parents.is_empty() {
            let _ = write!(out, " parents=[{}]", parents.join(", "));
        }
        out.push('\n');
    }
    out
}

pub(crate) fn render_json(cfa: &Cfa, arg: &Arg, bound: u32) -> Value {
    let variables: Vec<Value> = cfa
        .variables
        .iter()
        .map(|v| json!({ "name": v.name, "sort": sort_name(&v.sort) }))
        .collect();
    let locations: Vec<Value> = cfa
        .locations
        .iter()
        .enumerate()
        .map(|(id, loc)| json!({ "name": loc.name, "flags": location_flags(cfa, id) }))
        .collect();
    let edges: Vec<String> = cfa.edges.iter().map(|e| render_edge(cfa, e)).collect();
    let states: Vec<Value> = arg
        .iter()
        .map(|s| {
            json!({
                "id": s.id().index(),
                "location": cfa.location_name(s.location()),
                "kind": format!("{:?}", s.kind()),
                "loop_head_encounters": s.loop_head_encounters(),
                "stopped": s.is_stopped(),
                "parents": s.parents().iter().map(|p| p.index()).collect::<Vec<_>>(),
                "block": s.block().map(|b| b.formula().to_string()),
            })
        })
        .collect();
    json!({
        "program": cfa.name,
        "variables": variables,
        "init": cfa.init.to_string(),
        "locations": locations,
        "edges": edges,
        "bound": bound,
        "states": states,
    })
}

pub(crate) fn run_inspect_command(file: PathBuf, bound: u32, format: String) -> miette::Result<()> {
    let output_format = parse_output_format(&format)?;
    if bound == 0 {
        miette::bail!("--bound must be at least 1");
    }
    let cfa = load_cfa(&file)?;
    let mut unroller = CfaUnroller::new(&cfa);
    let mut arg = unroller.initial_arg();
    unroller
        .unroll(&mut arg, bound, &ShutdownNotifier::new())
        .into_diagnostic()?;

    match output_format {
        OutputFormat::Text => print!("{}", render_text(&cfa, &arg, bound)),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&render_json(&cfa, &arg, bound)).into_diagnostic()?
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: &str = r#"program p {
        var x: 0..3;
        init x == 0;
        location start initial;
        location head;
        location err error;
        edge start -> head;
        edge head -> head when x < 3 do x := x + 1;
        edge head -> err when x == 3;
    }"#;

    fn unrolled(bound: u32) -> (Cfa, Arg) {
        let program = itpmc_dsl::parse(SRC, "p.imc").unwrap();
        let cfa = itpmc_ir::lowering::lower(&program).unwrap();
        let arg = {
            let mut unroller = CfaUnroller::new(&cfa);
            let mut arg = unroller.initial_arg();
            unroller.unroll(&mut arg, bound, &ShutdownNotifier::new()).unwrap();
            arg
        };
        (cfa, arg)
    }

    #[test]
    fn text_lists_locations_with_flags() {
        let (cfa, arg) = unrolled(2);
        let text = render_text(&cfa, &arg, 2);
        assert!(text.contains("  start [initial]\n"));
        assert!(text.contains("  head [loop-head]\n"));
        assert!(text.contains("  err [error]\n"));
        assert!(text.contains("reachability graph at bound 2"));
        assert!(text.contains("stopped"));
    }

    #[test]
    fn json_has_one_entry_per_state() {
        let (cfa, arg) = unrolled(2);
        let json = render_json(&cfa, &arg, 2);
        assert_eq!(json["states"].as_array().unwrap().len(), arg.len());
        assert_eq!(json["states"][0]["block"], Value::Null);
        assert_eq!(json["edges"].as_array().unwrap().len(), 3);
    }
}
