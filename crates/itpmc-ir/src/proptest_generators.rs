//! Proptest strategies for small single-loop control-flow automata.

use proptest::prelude::*;

use itpmc_smt::sorts::SmtSort;
use itpmc_smt::terms::SmtTerm;

use crate::cfa::{Cfa, Edge, Location, Update, UpdateValue, Variable};
use crate::loops::loop_heads;

fn location(name: &str, is_error: bool) -> Location {
    Location {
        name: name.into(),
        is_error,
    }
}

fn edge(from: usize, to: usize, guard: SmtTerm, updates: Vec<Update>) -> Edge {
    Edge {
        from,
        to,
        guard,
        updates,
    }
}

fn assign(var: &str, value: SmtTerm) -> Update {
    Update {
        var: var.into(),
        value: UpdateValue::Assign(value),
    }
}

/// Strategy for a guard `x <op> c` with `c` inside `0..=hi`.
fn arb_guard(hi: i64) -> impl Strategy<Value = SmtTerm> {
    (0..=hi, 0..4u8).prop_map(|(c, op)| {
        let x = SmtTerm::var("x");
        let c = SmtTerm::int(c);
        match op {
            0 => x.lt(c),
            1 => x.le(c),
            2 => x.eq(c),
            _ => x.ge(c),
        }
    })
}

/// Strategy for a well-formed single-loop `Cfa`.
///
/// Generated automata have:
/// - one bounded integer `x` in `0..=hi` with `hi` in `2..=6`, and a boolean `b`
/// - locations `start` (initial), `head` (the only loop head), `exit`,
///   `err` (error) and optionally `body` between `head` and the back edge
/// - a loop step adding 1 or 2 to `x` (or a havoc), optionally flipping `b`
/// - an exit guard, an error guard after the loop and optionally an error
///   edge straight from `start`
pub fn arb_single_loop_cfa() -> impl Strategy<Value = Cfa> {
    (2..=6i64)
        .prop_flat_map(|hi| {
            (
                Just(hi),
                0..=hi,
                arb_guard(hi),
                arb_guard(hi),
                proptest::option::of(arb_guard(hi)),
                0..3u8,
                any::<bool>(),
                any::<bool>(),
            )
        })
        .prop_map(
            |(hi, init, stay, bad, early, step, with_body, flip)| {
                let x = || SmtTerm::var("x");
                let b = || SmtTerm::var("b");

                let mut locations = vec![
                    location("start", false),
                    location("head", false),
                    location("exit", false),
                    location("err", true),
                ];
                let (start, head, exit, err) = (0, 1, 2, 3);

                let mut body_updates = vec![match step {
                    0 => assign("x", x().add(SmtTerm::int(1))),
                    1 => assign("x", x().add(SmtTerm::int(2))),
                    _ => Update {
                        var: "x".into(),
                        value: UpdateValue::Havoc,
                    },
                }];
                if flip {
                    body_updates.push(assign("b", b().not()));
                }

                let mut edges = vec![edge(start, head, SmtTerm::tt(), vec![])];
                if with_body {
                    locations.push(location("body", false));
                    let body = locations.len() - 1;
                    edges.push(edge(head, body, stay.clone(), vec![]));
                    edges.push(edge(body, head, SmtTerm::tt(), body_updates));
                } else {
                    edges.push(edge(head, head, stay.clone(), body_updates));
                }
                edges.push(edge(head, exit, stay.not(), vec![]));
                edges.push(edge(exit, err, SmtTerm::and(vec![bad, b()]), vec![]));
                if let Some(early) = early {
                    edges.push(edge(start, err, early, vec![]));
                }

                let loop_heads = loop_heads(&locations, &edges, start);
                Cfa {
                    name: "generated".into(),
                    variables: vec![
                        Variable {
                            name: "x".into(),
                            sort: SmtSort::Range(0, hi),
                        },
                        Variable {
                            name: "b".into(),
                            sort: SmtSort::Bool,
                        },
                    ],
                    locations,
                    edges,
                    initial: start,
                    init: SmtTerm::and(vec![x().eq(SmtTerm::int(init)), b()]),
                    loop_heads,
                }
            },
        )
}
