//! Disequality.
//!
//! `int_ne` posts `r → x ≠ y`. Small overlapping domains are expanded
//! eagerly into equality-literal clauses; larger ones fall back to the
//! linear-≠ recipe over `x - y ≠ 0`.

use oxicp_core::{Atom, IntVar};
use oxicp_engine::{Engine, PropagatorStore};

use crate::linear::int_linear_ne;

/// Post `r → x ≠ y`.
pub fn int_ne(
    engine: &mut Engine,
    props: &mut PropagatorStore,
    x: IntVar,
    y: IntVar,
    r: Atom,
) -> bool {
    if !engine.ok {
        return false;
    }
    let lb = engine.lb(x).max(engine.lb(y));
    let ub = engine.ub(x).min(engine.ub(y));
    if ub < lb {
        return true;
    }
    if ub - lb < engine.config.eager_threshold {
        for k in lb..=ub {
            let ex = engine.eq_atom(x, k);
            let ey = engine.eq_atom(y, k);
            if !engine.add_clause(&[!r, !ex, !ey]) {
                return false;
            }
        }
        return true;
    }
    int_linear_ne(engine, props, r, &[1, -1], &[x, y], 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxicp_engine::{propagate, Reason, SolverConfig};

    fn fixture() -> (Engine, PropagatorStore) {
        (Engine::new(SolverConfig::default()), PropagatorStore::default())
    }

    #[test]
    fn test_ne_removes_fixed_value() {
        let (mut engine, mut props) = fixture();
        let x = engine.new_intvar(1, 3);
        let y = engine.new_intvar(1, 3);
        assert!(int_ne(&mut engine, &mut props, x, y, Atom::TRUE));
        assert!(propagate(&mut engine, &mut props));

        engine.push_level();
        assert!(engine.enqueue(x.ge(2), Reason::Decision));
        assert!(engine.enqueue(x.le(2), Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        // y can still be 1 or 3 but not 2.
        let e2 = engine.eq_atom(y, 2);
        assert!(engine.state.is_inconsistent(e2));
    }

    #[test]
    fn test_ne_disjoint_domains_trivial() {
        let (mut engine, mut props) = fixture();
        let x = engine.new_intvar(0, 2);
        let y = engine.new_intvar(5, 9);
        let before = props.len();
        assert!(int_ne(&mut engine, &mut props, x, y, Atom::TRUE));
        assert_eq!(props.len(), before);
    }

    #[test]
    fn test_ne_wide_domains_use_linear() {
        let (mut engine, mut props) = fixture();
        let x = engine.new_intvar(0, 1000);
        let y = engine.new_intvar(0, 1000);
        assert!(int_ne(&mut engine, &mut props, x, y, Atom::TRUE));
        assert_eq!(props.len(), 1);
        assert!(propagate(&mut engine, &mut props));

        engine.push_level();
        assert!(engine.enqueue(y.ge(0), Reason::Decision));
        assert!(engine.enqueue(y.le(0), Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        // y = 0 → x ≥ 1.
        assert_eq!(engine.lb(x), 1);
    }
}
