//! Linear, product and absolute-value end-to-end checks.

use oxicp_solver::{Limits, SolveResult, Solver, TRUE};

#[test]
fn test_linear_and_product_sat() {
    let mut s = Solver::new();
    let x = s.new_intvar(0, 10).unwrap();
    let y = s.new_intvar(0, 10).unwrap();
    let z = s.new_intvar(0, 100).unwrap();
    assert!(s.mul(z, x, y));
    assert!(s.linear_le(TRUE, &[2, 3], &[x, y], 27));
    assert!(s.post(z.ge(30)));

    assert_eq!(s.solve(Limits::unlimited()), SolveResult::Sat);
    let m = s.get_model();
    let (xv, yv, zv) = (m.int_value(x), m.int_value(y), m.int_value(z));
    assert_eq!(zv, xv * yv);
    assert!(2 * xv + 3 * yv <= 27);
    assert!(zv >= 30);
}

#[test]
fn test_linear_and_product_unsat_when_budget_tight() {
    let mut s = Solver::new();
    let x = s.new_intvar(0, 10).unwrap();
    let y = s.new_intvar(0, 10).unwrap();
    let z = s.new_intvar(0, 100).unwrap();
    assert!(s.mul(z, x, y));
    assert!(s.linear_le(TRUE, &[2, 3], &[x, y], 15));
    assert!(s.post(z.ge(30)));
    // Under 2x + 3y ≤ 15 the product x·y never reaches 30.
    assert_eq!(s.solve(Limits::unlimited()), SolveResult::Unsat);
}

#[test]
fn test_abs_two_point_domain() {
    let mut s = Solver::new();
    let x = s.new_intvar(-4, 4).unwrap();
    let z = s.new_intvar(0, 4).unwrap();
    assert!(s.abs(z, x));
    assert!(s.post(z.ge(3)));
    assert!(s.post(z.le(3)));

    assert_eq!(s.solve(Limits::unlimited()), SolveResult::Sat);
    let xv = s.get_model().int_value(x);
    assert!(xv == -3 || xv == 3);

    // Forcing the sign fixes x = 3.
    assert!(s.post(x.ge(0)));
    assert_eq!(s.solve(Limits::unlimited()), SolveResult::Sat);
    assert_eq!(s.get_model().int_value(x), 3);
}

#[test]
fn test_max_end_to_end() {
    let mut s = Solver::new();
    let a = s.new_intvar(0, 5).unwrap();
    let b = s.new_intvar(0, 5).unwrap();
    let z = s.new_intvar(0, 10).unwrap();
    assert!(s.max(z, &[a, b]));
    assert!(s.post(z.ge(4)));
    assert!(s.post(a.le(2)));

    assert_eq!(s.solve(Limits::unlimited()), SolveResult::Sat);
    let m = s.get_model();
    assert_eq!(m.int_value(z), m.int_value(a).max(m.int_value(b)));
    assert!(m.int_value(b) >= 4);
}

#[test]
fn test_negation_view() {
    let mut s = Solver::new();
    let x = s.new_intvar(-5, 7).unwrap();
    let nx = s.intvar_neg(x);
    assert!(s.post(x.ge(3)));
    assert_eq!(s.solve(Limits::unlimited()), SolveResult::Sat);
    let m = s.get_model();
    assert_eq!(m.int_value(nx), -m.int_value(x));
}

#[test]
fn test_mixed_sign_product() {
    let mut s = Solver::new();
    let x = s.new_intvar(-3, 3).unwrap();
    let y = s.new_intvar(-3, 3).unwrap();
    let z = s.new_intvar(-9, 9).unwrap();
    assert!(s.mul(z, x, y));
    assert!(s.post(z.ge(6)));
    assert!(s.post(x.le(-1)));

    assert_eq!(s.solve(Limits::unlimited()), SolveResult::Sat);
    let m = s.get_model();
    assert_eq!(m.int_value(z), m.int_value(x) * m.int_value(y));
    assert!(m.int_value(z) >= 6);
    assert!(m.int_value(x) <= -1);
}
