//! Syntactic loop-head detection.

use std::collections::BTreeSet;

use crate::cfa::{Edge, Location, LocationId};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Targets of back edges found by a depth-first search from `initial`.
///
/// Every cycle reachable from `initial` contains at least one back edge, so
/// cutting the CFA at the returned locations leaves an acyclic graph. Edges
/// leaving error locations are not followed.
pub fn loop_heads(
    locations: &[Location],
    edges: &[Edge],
    initial: LocationId,
) -> BTreeSet<LocationId> {
    let mut successors: Vec<Vec<LocationId>> = vec![Vec::new(); locations.len()];
    for edge in edges {
        let from_error = locations.get(edge.from).is_some_and(|l| l.is_error);
        if !from_error && edge.from < locations.len() && edge.to < locations.len() {
            successors[edge.from].push(edge.to);
        }
    }

    let mut heads = BTreeSet::new();
    if initial >= locations.len() {
        return heads;
    }
    let mut color = vec![Color::White; locations.len()];
    // explicit stack of (location, next successor index)
    let mut stack: Vec<(LocationId, usize)> = vec![(initial, 0)];
    color[initial] = Color::Gray;
    while let Some((loc, next)) = stack.pop() {
        if let Some(&succ) = successors[loc].get(next) {
            stack.push((loc, next + 1));
            match color[succ] {
                Color::White => {
                    color[succ] = Color::Gray;
                    stack.push((succ, 0));
                }
                Color::Gray => {
                    heads.insert(succ);
                }
                Color::Black => {}
            }
        } else {
            color[loc] = Color::Black;
        }
    }
    heads
}

#[cfg(test)]
mod tests {
    use super::*;
    use itpmc_smt::terms::SmtTerm;

    fn locs(names: &[(&str, bool)]) -> Vec<Location> {
        names
            .iter()
            .map(|(n, e)| Location {
                name: n.to_string(),
                is_error: *e,
            })
            .collect()
    }

    fn edges(pairs: &[(LocationId, LocationId)]) -> Vec<Edge> {
        pairs
            .iter()
            .map(|(from, to)| Edge {
                from: *from,
                to: *to,
                guard: SmtTerm::tt(),
                updates: vec![],
            })
            .collect()
    }

    #[test]
    fn self_loop_is_a_loop_head() {
        let l = locs(&[("start", false), ("head", false), ("exit", false)]);
        let e = edges(&[(0, 1), (1, 1), (1, 2)]);
        assert_eq!(loop_heads(&l, &e, 0), BTreeSet::from([1]));
    }

    #[test]
    fn loop_through_body_marks_header() {
        let l = locs(&[("start", false), ("head", false), ("body", false), ("exit", false)]);
        let e = edges(&[(0, 1), (1, 2), (2, 1), (1, 3)]);
        assert_eq!(loop_heads(&l, &e, 0), BTreeSet::from([1]));
    }

    #[test]
    fn error_self_loop_is_not_a_loop() {
        let l = locs(&[("start", false), ("err", true)]);
        let e = edges(&[(0, 1), (1, 1)]);
        assert!(loop_heads(&l, &e, 0).is_empty());
    }

    #[test]
    fn diamond_without_cycle_has_no_heads() {
        let l = locs(&[("a", false), ("b", false), ("c", false), ("d", false)]);
        let e = edges(&[(0, 1), (0, 2), (1, 3), (2, 3)]);
        assert!(loop_heads(&l, &e, 0).is_empty());
    }

    #[test]
    fn nested_loops_yield_two_heads() {
        let l = locs(&[("outer", false), ("inner", false), ("exit", false)]);
        let e = edges(&[(0, 1), (1, 1), (1, 0), (0, 2)]);
        assert_eq!(loop_heads(&l, &e, 0), BTreeSet::from([0, 1]));
    }
}
