//! Learnt-Clause Management.
//!
//! Learnt clauses carry an activity counter bumped whenever they resolve a
//! conflict. When the database exceeds its cap, the lower-activity half is
//! deleted; clauses currently acting as trail reasons are kept.

use tracing::debug;

use rustc_hash::FxHashSet;

use crate::engine::{remove_clause, Engine};
use crate::infer::Reason;

/// Delete the low-activity half of the learnt database.
pub fn reduce_db(engine: &mut Engine) {
    let locked: FxHashSet<u32> = engine
        .infer
        .trail
        .iter()
        .filter_map(|e| match e.reason {
            Reason::Clause(c) if engine.infer.clauses.get(c).learnt => Some(c.0),
            _ => None,
        })
        .collect();

    let mut list = std::mem::take(&mut engine.infer.learnt_list);
    list.sort_by(|&a, &b| {
        engine
            .infer
            .clauses
            .get(b)
            .activity
            .total_cmp(&engine.infer.clauses.get(a).activity)
    });
    let keep_target = list.len() / 2;
    let mut kept = Vec::with_capacity(keep_target);
    let mut removed = 0u64;
    for (i, c) in list.into_iter().enumerate() {
        if i < keep_target || locked.contains(&c.0) {
            kept.push(c);
        } else {
            remove_clause(engine, c);
            removed += 1;
        }
    }
    engine.infer.learnt_list = kept;
    engine.stats.learnts_removed += removed;
    debug!(removed, remaining = engine.infer.learnt_list.len(), "reduced learnt database");
}

/// Has the learnt database outgrown its cap?
#[must_use]
pub fn over_budget(engine: &Engine) -> bool {
    engine.infer.learnt_list.len() > engine.config.learnt_dbmax
}

/// Grow the cap after a reduction.
pub fn grow_budget(engine: &mut Engine) {
    let grown = (engine.config.learnt_dbmax as f64 * engine.config.learnt_growth) as usize;
    engine.config.learnt_dbmax = grown.max(engine.config.learnt_dbmax + 1);
}
