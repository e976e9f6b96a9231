//! Debug Invariant Checks.
//!
//! Cheap structural checks compiled into debug builds only. Invariant
//! violations are precondition bugs, never recoverable errors.

use oxicp_core::PVAL_MAX;

use crate::engine::Engine;

/// Bound vectors are pairwise consistent and monotone across snapshots.
pub fn check_state(engine: &Engine) {
    if cfg!(not(debug_assertions)) {
        return;
    }
    let st = &engine.state;
    for pair in 0..st.num_preds() / 2 {
        let f = 2 * pair;
        let b = f + 1;
        debug_assert!(
            st.p_vals[f] + st.p_vals[b] <= PVAL_MAX,
            "pred pair {pair} crossed"
        );
        debug_assert!(st.p_root[f] <= st.p_last[f] && st.p_last[f] <= st.p_vals[f]);
        debug_assert!(st.p_root[b] <= st.p_last[b] && st.p_last[b] <= st.p_vals[b]);
    }
}

/// Every live clause has an entailed literal or two non-false watches.
pub fn check_clauses(engine: &Engine) {
    if cfg!(not(debug_assertions)) {
        return;
    }
    for list in [&engine.infer.clause_list, &engine.infer.learnt_list] {
        for &c in list.iter() {
            let cl = engine.infer.clauses.get(c);
            let satisfied = cl.elts.iter().any(|e| engine.state.is_entailed(e.atom));
            let free_watches = cl
                .elts
                .iter()
                .take(2)
                .filter(|e| !engine.state.is_inconsistent(e.atom))
                .count();
            debug_assert!(
                satisfied || free_watches == 2,
                "clause {c:?} breaks the two-watch invariant"
            );
        }
    }
}

/// Decision-level markers advance in lockstep across every trail.
pub fn check_trail_lockstep(engine: &Engine) {
    if cfg!(not(debug_assertions)) {
        return;
    }
    let l = engine.infer.trail_lim.len();
    debug_assert_eq!(engine.persist.data_lim.len(), l);
    debug_assert_eq!(engine.persist.plast_lim.len(), l);
}
