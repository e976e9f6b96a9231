//! OxiCP Engine - The Lazy-Clause-Generation Inference Core.
//!
//! A CDCL-style engine fused with finite-domain propagation:
//! - trailed predicate bounds with push/backtrack ([`Engine`], [`Persistence`])
//! - threshold-keyed watch chains driving clause inference ([`infer`])
//! - a two-queue propagation fixpoint ([`propagate`])
//! - the propagator contract with lazy explanation thunks ([`Propagator`])
//! - 1-UIP conflict analysis and learnt-clause management ([`conflict`],
//!   [`learnt`])
//!
//! Propagators are owned by a [`PropagatorStore`] and addressed by id; the
//! engine context and the store borrow independently, so a running
//! propagator mutates bounds through `&mut Engine` while the store
//! dispatches into it.
//!
//! # Examples
//!
//! ```
//! use oxicp_engine::{propagate, Engine, PropagatorStore, SolverConfig};
//!
//! let mut engine = Engine::new(SolverConfig::default());
//! let mut props = PropagatorStore::default();
//!
//! let x = engine.new_intvar(0, 10);
//! engine.post(x.ge(3));
//! assert!(propagate(&mut engine, &mut props));
//! assert_eq!(engine.lb(x), 3);
//!
//! // Bounds raised above a level are restored exactly on backtrack.
//! engine.push_level();
//! engine.enqueue(x.ge(7), oxicp_engine::Reason::Decision);
//! assert!(propagate(&mut engine, &mut props));
//! assert_eq!(engine.lb(x), 7);
//! engine.bt_to_level(0);
//! assert_eq!(engine.lb(x), 3);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod clause;
pub mod config;
pub mod conflict;
pub mod engine;
pub mod infer;
pub mod invariants;
pub mod learnt;
pub mod persist;
pub mod propagator;
pub mod state;
pub mod stats;

pub use clause::{Clause, ClauseDb, ClauseElt, ClauseHead, ClauseRef};
pub use config::{RestartStrategy, SolverConfig};
pub use conflict::{add_learnt, analyze, analyze_final, Learnt};
pub use engine::{propagate, simplify_at_root, Engine};
pub use infer::{Reason, TrailEntry};
pub use learnt::{grow_budget, over_budget, reduce_db};
pub use persist::{Persistence, TrailedSlot};
pub use propagator::{Event, PropId, Propagator, PropagatorStore, Watch, WatchRes};
pub use state::{PredInit, PredState};
pub use stats::Statistics;

#[cfg(test)]
mod tests {
    use super::*;
    use oxicp_core::{pval_of_int, Atom};

    fn fixture() -> (Engine, PropagatorStore) {
        (Engine::new(SolverConfig::default()), PropagatorStore::default())
    }

    #[test]
    fn test_bounds_restored_on_backtrack() {
        let (mut engine, mut props) = fixture();
        let x = engine.new_intvar(0, 10);
        assert!(propagate(&mut engine, &mut props));

        engine.push_level();
        assert!(engine.enqueue(x.ge(5), Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        assert_eq!(engine.lb(x), 5);
        assert_eq!(engine.lb_prev(x), 0);

        engine.bt_to_level(0);
        assert_eq!(engine.lb(x), 0);
        assert_eq!(engine.ub(x), 10);
        invariants::check_state(&engine);
        invariants::check_trail_lockstep(&engine);
    }

    #[test]
    fn test_binary_clause_propagates() {
        let (mut engine, mut props) = fixture();
        let a = engine.new_bool();
        let b = engine.new_bool();
        assert!(engine.add_clause(&[a, b]));

        engine.push_level();
        assert!(engine.enqueue(!a, Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        assert!(engine.state.is_entailed(b));

        engine.bt_to_level(0);
        assert!(!engine.state.is_entailed(b));
    }

    #[test]
    fn test_long_clause_watch_migration() {
        let (mut engine, mut props) = fixture();
        let a = engine.new_bool();
        let b = engine.new_bool();
        let c = engine.new_bool();
        assert!(engine.add_clause(&[a, b, c]));

        engine.push_level();
        assert!(engine.enqueue(!a, Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        // Still two free literals: nothing propagated.
        assert!(!engine.state.is_entailed(b));
        assert!(!engine.state.is_entailed(c));
        invariants::check_clauses(&engine);

        engine.push_level();
        assert!(engine.enqueue(!b, Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        assert!(engine.state.is_entailed(c));
    }

    #[test]
    fn test_unit_propagation_conflict_sets_buffer() {
        let (mut engine, mut props) = fixture();
        let a = engine.new_bool();
        let b = engine.new_bool();
        assert!(engine.add_clause(&[a, b]));

        engine.push_level();
        assert!(engine.enqueue(!a, Reason::Decision));
        assert!(engine.enqueue(!b, Reason::Decision));
        assert!(!propagate(&mut engine, &mut props));
        assert!(!engine.confl.is_empty());
        // Every conflict element is currently false.
        for &e in &engine.confl {
            assert!(engine.state.is_inconsistent(e));
        }
    }

    #[test]
    fn test_analyze_learns_asserting_clause() {
        let (mut engine, mut props) = fixture();
        let a = engine.new_bool();
        let b = engine.new_bool();
        let c = engine.new_bool();
        // a → b, a → c, ¬b ∨ ¬c ∨ ¬a forces a conflict under a.
        assert!(engine.add_clause(&[!a, b]));
        assert!(engine.add_clause(&[!a, c]));
        assert!(engine.add_clause(&[!b, !c, !a]));

        engine.push_level();
        assert!(engine.enqueue(a, Reason::Decision));
        assert!(!propagate(&mut engine, &mut props));

        let (learnt, bt) = analyze(&mut engine, &props);
        assert_eq!(bt, 0);
        assert_eq!(learnt.len(), 1);
        // The unique current-level source is the decision itself.
        assert_eq!(learnt[0], !a);

        engine.bt_to_level(bt);
        add_learnt(&mut engine, &learnt);
        assert!(propagate(&mut engine, &mut props));
        assert!(engine.state.is_entailed(!a));
    }

    #[test]
    fn test_root_clause_simplification() {
        let (mut engine, mut props) = fixture();
        let a = engine.new_bool();
        let b = engine.new_bool();
        let c = engine.new_bool();
        assert!(engine.add_clause(&[a, b, c]));
        assert_eq!(engine.infer.clause_list.len(), 1);

        // Falsify c at the root: the clause shrinks to a binary and is
        // inlined into its watchers.
        assert!(engine.post(!c));
        assert!(propagate(&mut engine, &mut props));
        simplify_at_root(&mut engine, &mut props);
        assert!(engine.infer.clause_list.is_empty());

        // The inlined binary still propagates.
        engine.push_level();
        assert!(engine.enqueue(!a, Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        assert!(engine.state.is_entailed(b));
    }

    #[test]
    fn test_entailed_root_clause_deleted() {
        let (mut engine, mut props) = fixture();
        let a = engine.new_bool();
        let b = engine.new_bool();
        let c = engine.new_bool();
        assert!(engine.add_clause(&[a, b, c]));
        assert!(engine.post(b));
        assert!(propagate(&mut engine, &mut props));
        simplify_at_root(&mut engine, &mut props);
        assert!(engine.infer.clause_list.is_empty());
    }

    #[test]
    fn test_post_reports_root_inconsistency() {
        let (mut engine, _props) = fixture();
        let x = engine.new_intvar(0, 5);
        assert!(engine.post(x.ge(3)));
        assert!(!engine.post(x.le(2)));
        assert!(!engine.ok);
    }

    #[test]
    fn test_atom_true_constant() {
        let (engine, _props) = fixture();
        assert!(engine.state.is_entailed(Atom::TRUE));
        assert!(!engine.state.is_entailed(!Atom::TRUE));
        assert!(engine.state.is_inconsistent(!Atom::TRUE));
    }

    #[test]
    fn test_eq_atom_links_bounds() {
        let (mut engine, mut props) = fixture();
        let x = engine.new_intvar(0, 5);
        let b = engine.eq_atom(x, 3);
        assert!(propagate(&mut engine, &mut props));

        engine.push_level();
        assert!(engine.enqueue(b, Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        assert_eq!(engine.lb(x), 3);
        assert_eq!(engine.ub(x), 3);
        engine.bt_to_level(0);

        // Fixing x to 3 forces the atom.
        engine.push_level();
        assert!(engine.enqueue(x.ge(3), Reason::Decision));
        assert!(engine.enqueue(x.le(3), Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        assert!(engine.state.is_entailed(b));
    }

    #[test]
    fn test_lazy_pred_initializer_reapplied() {
        let (mut engine, mut props) = fixture();
        let p = engine.new_pred_lazy(PredInit::new(|_| {
            (pval_of_int(2), oxicp_core::pval_inv(pval_of_int(8)))
        }));
        assert!(propagate(&mut engine, &mut props));
        assert_eq!(engine.state.p_vals[p.idx()], pval_of_int(2));

        engine.push_level();
        assert!(engine.enqueue(Atom::new(p, pval_of_int(6)), Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        engine.bt_to_level(0);
        assert_eq!(engine.state.p_vals[p.idx()], pval_of_int(2));
    }

    #[test]
    fn test_trailed_scalar_restored() {
        let (mut engine, _props) = fixture();
        let s = engine.alloc_scalar(11);
        engine.push_level();
        engine.set_scalar(s, 42);
        assert_eq!(engine.scalar(s), 42);
        engine.bt_to_level(0);
        assert_eq!(engine.scalar(s), 11);
    }
}
