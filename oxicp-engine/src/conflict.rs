//! Conflict Analysis.
//!
//! 1-UIP resolution over lazy reasons. The conflict buffer holds clause
//! elements (all false); analysis works on their negations, the entailed
//! antecedents: per-predicate thresholds are merged, the reason of each
//! current-level trail entry crossed by the walk is resolved, and predicate
//! values are rewound along the way so that reason thunks observe the state
//! at the moment their entry was created.

use smallvec::SmallVec;
use tracing::debug;

use oxicp_core::{Atom, PredId, Pval};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::clause::ClauseHead;
use crate::engine::Engine;
use crate::infer::{Reason, TrailEntry};
use crate::propagator::PropagatorStore;

/// A learnt clause: position 0 is asserting, position 1 sits at the
/// backjump level.
pub type Learnt = SmallVec<[Atom; 8]>;

struct Analyzer {
    /// Current-level antecedents: predicate → strongest needed threshold.
    seen: FxHashMap<u32, Pval>,
    /// Earlier-level antecedents, same encoding.
    lower: FxHashMap<u32, Pval>,
    count: usize,
}

impl Analyzer {
    fn new() -> Self {
        Self {
            seen: FxHashMap::default(),
            lower: FxHashMap::default(),
            count: 0,
        }
    }

    /// Merge an entailed antecedent, splitting by level of entailment.
    fn add_antecedent(&mut self, engine: &mut Engine, at: Atom) {
        if engine.state.p_root[at.pid.idx()] >= at.val {
            return;
        }
        engine.bump_activity(at.pid.pair());
        if engine.state.p_last[at.pid.idx()] >= at.val {
            self.lower
                .entry(at.pid.raw())
                .and_modify(|v| *v = (*v).max(at.val))
                .or_insert(at.val);
        } else {
            match self.seen.entry(at.pid.raw()) {
                std::collections::hash_map::Entry::Occupied(mut o) => {
                    let v = o.get_mut();
                    *v = (*v).max(at.val);
                }
                std::collections::hash_map::Entry::Vacant(v) => {
                    v.insert(at.val);
                    self.count += 1;
                }
            }
        }
    }
}

/// Materialize the reason of a trail entry at threshold `need`, appending
/// clause elements to `out`. For `btpred` thunks the entry's predicate is
/// rewound first so the thunk observes the pre-inference state.
fn materialize(
    engine: &mut Engine,
    props: &PropagatorStore,
    e: &TrailEntry,
    need: Pval,
    out: &mut Vec<Atom>,
) {
    match e.reason {
        Reason::Decision => debug_assert!(false, "resolved a decision entry"),
        Reason::Atom(a) => out.push(a),
        Reason::Clause(c) => {
            engine.bump_clause(c);
            for elt in &engine.infer.clauses.get(c).elts {
                if elt.atom.pid != e.pid {
                    out.push(elt.atom);
                }
            }
        }
        Reason::Thunk { prop, tag, btpred } => {
            if btpred {
                engine.state.p_vals[e.pid.idx()] = e.old;
            }
            props.explain(engine, prop, tag, need, out);
        }
    }
}

/// Decision level at which an atom became entailed.
fn entail_level(engine: &Engine, at: Atom) -> usize {
    if engine.state.p_root[at.pid.idx()] >= at.val {
        return 0;
    }
    for i in (0..engine.infer.trail.len()).rev() {
        let e = engine.infer.trail[i];
        if e.pid == at.pid && e.old < at.val {
            return engine.infer.trail_lim.partition_point(|&l| l <= i);
        }
    }
    debug_assert!(false, "atom entailed with no trail crossing");
    0
}

fn finish(engine: &Engine, uip: Option<Atom>, lower: &FxHashMap<u32, Pval>) -> (Learnt, usize) {
    let mut learnt: Learnt = SmallVec::new();
    if let Some(u) = uip {
        learnt.push(!u);
    }
    for (&praw, &v) in lower {
        learnt.push(!Atom::new(PredId::new(praw), v));
    }
    let first_fixed = usize::from(uip.is_some());
    if learnt.len() <= first_fixed {
        return (learnt, 0);
    }
    if uip.is_none() {
        // Degenerate: no current-level antecedent. Order by entailment level
        // so the clause asserts its deepest element after the backjump.
        learnt.sort_by_key(|&a| std::cmp::Reverse(entail_level(engine, !a)));
        let bt = if learnt.len() > 1 {
            entail_level(engine, !learnt[1])
        } else {
            0
        };
        return (learnt, bt);
    }
    let mut best = first_fixed;
    let mut best_level = 0;
    for j in first_fixed..learnt.len() {
        let l = entail_level(engine, !learnt[j]);
        if l > best_level {
            best_level = l;
            best = j;
        }
    }
    learnt.swap(first_fixed, best);
    (learnt, best_level)
}

/// 1-UIP analysis of the engine's conflict buffer.
///
/// Returns the learnt clause and the backjump level. Predicate values above
/// the resolution frontier are rewound as a side effect; the caller must
/// backtrack to the returned level before resuming.
pub fn analyze(engine: &mut Engine, props: &PropagatorStore) -> (Learnt, usize) {
    debug_assert!(engine.level() > 0);
    debug!(conflict = ?engine.confl, level = engine.level(), "analyzing conflict");

    let mut az = Analyzer::new();
    for i in 0..engine.confl.len() {
        let e = engine.confl[i];
        az.add_antecedent(engine, !e);
    }
    engine.confl.clear();

    if az.count == 0 {
        return finish(engine, None, &az.lower);
    }

    let lim = *engine.infer.trail_lim.last().unwrap();
    let mut i = engine.infer.trail.len();
    let mut expl: Vec<Atom> = Vec::new();
    while az.count > 1 {
        debug_assert!(i > lim, "ran out of current-level trail entries");
        i -= 1;
        let e = engine.infer.trail[i];
        let need = az
            .seen
            .get(&e.pid.raw())
            .copied()
            .filter(|&need| e.old < need);
        match need {
            None => {
                engine.state.p_vals[e.pid.idx()] = e.old;
            }
            Some(need) => {
                az.seen.remove(&e.pid.raw());
                az.count -= 1;
                expl.clear();
                materialize(engine, props, &e, need, &mut expl);
                engine.state.p_vals[e.pid.idx()] = e.old;
                for k in 0..expl.len() {
                    let el = expl[k];
                    az.add_antecedent(engine, !el);
                }
            }
        }
    }
    let (&praw, &need) = az.seen.iter().next().unwrap();
    let uip = Atom::new(PredId::new(praw), need);
    let res = finish(engine, Some(uip), &az.lower);
    debug!(learnt = ?res.0, bt_level = res.1, "learnt clause");
    res
}

/// Attach a learnt clause and enqueue its asserting literal.
///
/// Call after backtracking to the backjump level returned by [`analyze`].
pub fn add_learnt(engine: &mut Engine, learnt: &[Atom]) {
    let elts: Vec<Atom> = learnt
        .iter()
        .copied()
        .filter(|&a| !engine.state.is_inconsistent_root(a))
        .collect();
    engine.stats.learnts += 1;
    match elts.len() {
        0 => {
            engine.ok = false;
        }
        1 => {
            engine.enqueue(elts[0], Reason::Decision);
        }
        2 => {
            let n0 = engine.watch_node_of(elts[0]);
            engine.infer.nodes[n0 as usize].heads.push(ClauseHead {
                e0: elts[1],
                cl: None,
            });
            let n1 = engine.watch_node_of(elts[1]);
            engine.infer.nodes[n1 as usize].heads.push(ClauseHead {
                e0: elts[0],
                cl: None,
            });
            engine.enqueue(elts[0], Reason::Atom(elts[1]));
        }
        _ => {
            let c = engine.infer.clauses.alloc(&elts, true);
            let head = ClauseHead {
                e0: elts[2],
                cl: Some(c),
            };
            for i in 0..2 {
                let n = engine.watch_node_of(elts[i]);
                engine.infer.clauses.get_mut(c).elts[i].watch = Some(n);
                engine.infer.nodes[n as usize].heads.push(head);
            }
            engine.infer.learnt_list.push(c);
            engine.bump_clause(c);
            engine.enqueue(elts[0], Reason::Clause(c));
        }
    }
}

/// Final-conflict analysis for an inconsistent assumption.
///
/// Walks the whole trail explaining why `!failed` is entailed; every
/// assumption decision the explanation bottoms out on joins the core. The
/// returned set contains only pushed assumptions (including `failed`).
pub fn analyze_final(
    engine: &mut Engine,
    props: &PropagatorStore,
    assumptions: &[Atom],
    failed: Atom,
) -> Vec<Atom> {
    let mut core: Vec<Atom> = vec![failed];
    let mut in_core: FxHashSet<(u32, Pval)> = FxHashSet::default();
    in_core.insert((failed.pid.raw(), failed.val));

    let mut needed: FxHashMap<u32, Pval> = FxHashMap::default();
    let nf = !failed;
    if engine.state.p_root[nf.pid.idx()] < nf.val {
        needed.insert(nf.pid.raw(), nf.val);
    }
    let mut expl: Vec<Atom> = Vec::new();
    for i in (0..engine.infer.trail.len()).rev() {
        let e = engine.infer.trail[i];
        let need = needed
            .get(&e.pid.raw())
            .copied()
            .filter(|&need| e.old < need);
        let Some(need) = need else {
            engine.state.p_vals[e.pid.idx()] = e.old;
            continue;
        };
        needed.remove(&e.pid.raw());
        match e.reason {
            Reason::Decision => {
                let lvl = engine.infer.trail_lim.partition_point(|&l| l <= i);
                debug_assert!(lvl >= 1 && lvl <= assumptions.len());
                let a = assumptions[lvl - 1];
                if in_core.insert((a.pid.raw(), a.val)) {
                    core.push(a);
                }
                engine.state.p_vals[e.pid.idx()] = e.old;
            }
            _ => {
                expl.clear();
                materialize(engine, props, &e, need, &mut expl);
                engine.state.p_vals[e.pid.idx()] = e.old;
                for k in 0..expl.len() {
                    let a = !expl[k];
                    if engine.state.p_root[a.pid.idx()] < a.val {
                        needed
                            .entry(a.pid.raw())
                            .and_modify(|v| *v = (*v).max(a.val))
                            .or_insert(a.val);
                    }
                }
            }
        }
    }
    debug_assert!(needed.is_empty());
    core
}
