//! Three Booleans, pairwise exclusion, at least one set.

use oxicp_solver::{Limits, SolveResult, Solver};

#[test]
fn test_exactly_one_sat() {
    let mut s = Solver::new();
    let xs: Vec<_> = (0..3).map(|_| s.new_bool()).collect();
    for i in 0..3 {
        for j in i + 1..3 {
            assert!(s.post_clause(&[!xs[i], !xs[j]]));
        }
    }
    assert!(s.post_clause(&[xs[0], xs[1], xs[2]]));

    assert_eq!(s.solve(Limits::unlimited()), SolveResult::Sat);
    let m = s.get_model();
    let set = xs.iter().filter(|&&x| m.value(x)).count();
    assert_eq!(set, 1);
}

#[test]
fn test_all_negated_assumptions_yield_full_core() {
    let mut s = Solver::new();
    let xs: Vec<_> = (0..3).map(|_| s.new_bool()).collect();
    for i in 0..3 {
        for j in i + 1..3 {
            assert!(s.post_clause(&[!xs[i], !xs[j]]));
        }
    }
    assert!(s.post_clause(&[xs[0], xs[1], xs[2]]));

    for &x in &xs {
        assert!(s.assume(!x));
    }
    assert_eq!(s.solve(Limits::unlimited()), SolveResult::Unsat);

    let core = s.get_conflict();
    assert_eq!(core.len(), 3);
    for &x in &xs {
        assert!(core.contains(&!x), "core must mention every assumption");
    }

    // Dropping the assumptions restores satisfiability.
    s.clear_assumptions();
    assert_eq!(s.solve(Limits::unlimited()), SolveResult::Sat);
}

#[test]
fn test_retract_recovers() {
    let mut s = Solver::new();
    let a = s.new_bool();
    let b = s.new_bool();
    assert!(s.post_clause(&[!a, !b]));

    assert!(s.assume(a));
    assert!(s.assume(b));
    assert_eq!(s.solve(Limits::unlimited()), SolveResult::Unsat);

    s.retract();
    assert_eq!(s.solve(Limits::unlimited()), SolveResult::Sat);
    assert!(s.get_model().value(a));
}
