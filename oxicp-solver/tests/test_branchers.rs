//! Brancher plug-ins steering the search through the public API.

use oxicp_solver::{
    basic_brancher, limit_brancher, seq_brancher, warmstart_brancher, Limits, SolveResult, Solver,
    ValChoice, VarChoice,
};

#[test]
fn test_value_max_steers_model() {
    let mut s = Solver::new();
    let x = s.new_intvar(0, 9).unwrap();
    s.add_brancher(basic_brancher(
        VarChoice::InputOrder,
        ValChoice::Max,
        vec![x],
    ));
    assert_eq!(s.solve(Limits::unlimited()), SolveResult::Sat);
    assert_eq!(s.get_model().int_value(x), 9);
}

#[test]
fn test_warmstart_guides_first_solution() {
    let mut s = Solver::new();
    let x = s.new_intvar(0, 9).unwrap();
    s.add_brancher(warmstart_brancher(vec![x.ge(7)]));
    s.add_brancher(basic_brancher(
        VarChoice::InputOrder,
        ValChoice::Min,
        vec![x],
    ));
    assert_eq!(s.solve(Limits::unlimited()), SolveResult::Sat);
    assert_eq!(s.get_model().int_value(x), 7);
}

#[test]
fn test_exhausted_limit_falls_through_sequence() {
    let mut s = Solver::new();
    let x = s.new_intvar(0, 9).unwrap();
    let greedy = basic_brancher(VarChoice::InputOrder, ValChoice::Max, vec![x]);
    let modest = basic_brancher(VarChoice::InputOrder, ValChoice::Min, vec![x]);
    s.add_brancher(seq_brancher(vec![limit_brancher(greedy, 0), modest]));
    assert_eq!(s.solve(Limits::unlimited()), SolveResult::Sat);
    assert_eq!(s.get_model().int_value(x), 0);
}

#[test]
fn test_first_fail_prefers_tight_domain() {
    let mut s = Solver::new();
    let wide = s.new_intvar(0, 50).unwrap();
    let tight = s.new_intvar(0, 2).unwrap();
    s.add_brancher(basic_brancher(
        VarChoice::FirstFail,
        ValChoice::Min,
        vec![wide, tight],
    ));
    assert_eq!(s.solve(Limits::unlimited()), SolveResult::Sat);
    let m = s.get_model();
    assert_eq!(m.int_value(tight), 0);
    assert_eq!(m.int_value(wide), 0);
}
