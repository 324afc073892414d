//! Backend parity tests: the enumerative backend and Z3 must agree on the
//! SAT/UNSAT verdict of bounded formulas, and projection interpolants must
//! satisfy the interpolation conditions.

use proptest::prelude::*;

use itpmc_smt::backends::enumerative::EnumSolver;
use itpmc_smt::backends::z3_backend::Z3Solver;
use itpmc_smt::solver::{SatResult, SmtSolver};
use itpmc_smt::sorts::SmtSort;
use itpmc_smt::terms::SmtTerm;

const VARS: [&str; 3] = ["x@0", "x@1", "y@0"];
const DOMAIN: SmtSort = SmtSort::Range(-2, 3);

fn check_with<S: SmtSolver>(solver: &mut S, term: &SmtTerm) -> SatResult
where
    S::Error: std::fmt::Debug,
{
    for name in VARS {
        solver.declare_var(name, &DOMAIN).unwrap();
    }
    solver.assert(term).unwrap();
    solver.check_sat().unwrap()
}

fn arb_int_term() -> impl Strategy<Value = SmtTerm> {
    let leaf = prop_oneof![
        prop::sample::select(VARS.to_vec()).prop_map(SmtTerm::var),
        (-3i64..=3).prop_map(SmtTerm::int),
    ];
    leaf.prop_recursive(2, 6, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| l.add(r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| l.sub(r)),
            inner.prop_map(SmtTerm::neg),
        ]
    })
}

fn arb_bool_term() -> impl Strategy<Value = SmtTerm> {
    let atom = prop_oneof![
        (arb_int_term(), arb_int_term()).prop_map(|(l, r)| l.le(r)),
        (arb_int_term(), arb_int_term()).prop_map(|(l, r)| l.eq(r)),
        (arb_int_term(), arb_int_term()).prop_map(|(l, r)| l.gt(r)),
    ];
    atom.prop_recursive(2, 8, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..3).prop_map(SmtTerm::and),
            prop::collection::vec(inner.clone(), 1..3).prop_map(SmtTerm::or),
            inner.clone().prop_map(SmtTerm::not),
            (inner.clone(), inner).prop_map(|(l, r)| l.implies(r)),
        ]
    })
}

#[test]
fn both_backends_reject_out_of_range_values() {
    let term = SmtTerm::var("x@0").eq(SmtTerm::int(4));
    assert_eq!(check_with(&mut EnumSolver::new(), &term), SatResult::Unsat);
    assert_eq!(check_with(&mut Z3Solver::new(), &term), SatResult::Unsat);
}

#[test]
fn both_backends_find_chain_solutions() {
    let term = SmtTerm::and(vec![
        SmtTerm::var("x@0").eq(SmtTerm::int(-2)),
        SmtTerm::var("x@1").eq(SmtTerm::var("x@0").add(SmtTerm::int(5))),
    ]);
    assert_eq!(check_with(&mut EnumSolver::new(), &term), SatResult::Sat);
    assert_eq!(check_with(&mut Z3Solver::new(), &term), SatResult::Sat);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn enumerative_and_z3_agree(term in arb_bool_term()) {
        let expected = check_with(&mut Z3Solver::new(), &term);
        let actual = check_with(&mut EnumSolver::new(), &term);
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn projection_is_an_interpolant(a in arb_bool_term(), b in arb_bool_term()) {
        let mut joint = EnumSolver::new();
        prop_assume!(check_with(&mut joint, &SmtTerm::and(vec![a.clone(), b.clone()])) == SatResult::Unsat);

        let shared: Vec<String> = a
            .free_vars()
            .intersection(&b.free_vars())
            .cloned()
            .collect();
        let mut projector = EnumSolver::new();
        for name in VARS {
            projector.declare_var(name, &DOMAIN).unwrap();
        }
        projector.assert(&a).unwrap();
        let itp = projector.project(&shared).unwrap().to_term();

        // A implies I
        let mut z3 = Z3Solver::new();
        prop_assert_eq!(
            check_with(&mut z3, &SmtTerm::and(vec![a.clone(), itp.clone().not()])),
            SatResult::Unsat
        );
        // I and B are inconsistent
        let mut z3 = Z3Solver::new();
        prop_assert_eq!(
            check_with(&mut z3, &SmtTerm::and(vec![itp.clone(), b])),
            SatResult::Unsat
        );
        // I only mentions shared variables
        prop_assert!(itp.free_vars().iter().all(|v| shared.contains(v)));
    }
}
