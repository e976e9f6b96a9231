//! All-Different.
//!
//! Decomposed into pairwise disequalities; each pair picks the eager or
//! watched rendition through the usual disequality recipe.

use oxicp_core::{Atom, IntVar};
use oxicp_engine::{Engine, PropagatorStore};

use crate::diseq::int_ne;

/// Post `xs` pairwise distinct.
pub fn all_different(engine: &mut Engine, props: &mut PropagatorStore, xs: &[IntVar]) -> bool {
    for i in 0..xs.len() {
        for j in i + 1..xs.len() {
            if !int_ne(engine, props, xs[i], xs[j], Atom::TRUE) {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxicp_engine::{propagate, Reason, SolverConfig};

    #[test]
    fn test_alldiff_prunes_pairs() {
        let mut engine = Engine::new(SolverConfig::default());
        let mut props = PropagatorStore::default();
        let xs: Vec<IntVar> = (0..3).map(|_| engine.new_intvar(1, 3)).collect();
        assert!(all_different(&mut engine, &mut props, &xs));
        assert!(propagate(&mut engine, &mut props));

        engine.push_level();
        assert!(engine.enqueue(xs[0].le(1), Reason::Decision));
        assert!(engine.enqueue(xs[1].ge(3), Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        // x0 = 1, x1 = 3 leave only 2 for x2.
        let e = engine.eq_atom(xs[2], 1);
        assert!(engine.state.is_inconsistent(e));
        let e = engine.eq_atom(xs[2], 3);
        assert!(engine.state.is_inconsistent(e));
    }
}
