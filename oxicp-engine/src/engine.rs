//! The Engine Context and Propagation Loop.
//!
//! [`Engine`] owns every piece of trailed solver state: predicate bounds,
//! the persistence trails, watch infrastructure, clauses, the two
//! propagation queues and wake callbacks. Propagators live outside in a
//! [`PropagatorStore`] so the two can be borrowed independently; every
//! engine entry point that dispatches into propagators takes both.

use std::collections::VecDeque;

use tracing::trace;

use oxicp_core::{pval_inv, pval_of_int, Atom, IntVar, PredId, Pval};
use rustc_hash::FxHashMap;

use crate::clause::{ClauseElt, ClauseHead, ClauseRef};
use crate::config::SolverConfig;
use crate::infer::{InferInfo, Reason, TrailEntry, NODE_NONE};
use crate::persist::{Persistence, TrailLoc, TrailedSlot};
use crate::propagator::{Event, PropId, PropagatorStore, Watch, WatchRes};
use crate::state::{PredInit, PredState};
use crate::stats::Statistics;

/// The solver engine: all trailed state plus queues and callbacks.
#[derive(Debug)]
pub struct Engine {
    /// Configuration knobs.
    pub config: SolverConfig,
    /// Counters.
    pub stats: Statistics,
    /// Cleared when a root-level inconsistency has been established.
    pub ok: bool,
    /// Predicate bounds.
    pub state: PredState,
    /// Trails and the scalar pool.
    pub persist: Persistence,
    /// Watches, clauses and the inference trail.
    pub infer: InferInfo,
    /// Conflict clause elements (all currently false).
    pub confl: Vec<Atom>,

    pred_queue: VecDeque<PredId>,
    pred_queued: Vec<bool>,
    wake_queue: Vec<PredId>,
    wake_queued: Vec<bool>,
    prop_queue: VecDeque<PropId>,
    prop_queued: Vec<bool>,

    pred_callbacks: Vec<Vec<Watch>>,
    fix_callbacks: Vec<Vec<Watch>>,
    pred_origin: Vec<Option<PropId>>,
    active_prop: Option<PropId>,
    confl_seed: Option<(Atom, Reason)>,

    activity: Vec<f64>,
    act_inc: f64,
    cla_inc: f64,
    /// Branching polarity hints, one per predicate pair.
    pub polarity: Vec<bool>,
    eq_cache: FxHashMap<(u32, i64), Atom>,
}

impl Engine {
    /// Fresh engine; predicate 0 is allocated fixed so [`Atom::TRUE`] holds.
    #[must_use]
    pub fn new(config: SolverConfig) -> Self {
        let mut engine = Self {
            config,
            stats: Statistics::default(),
            ok: true,
            state: PredState::default(),
            persist: Persistence::default(),
            infer: InferInfo::default(),
            confl: Vec::new(),
            pred_queue: VecDeque::new(),
            pred_queued: Vec::new(),
            wake_queue: Vec::new(),
            wake_queued: Vec::new(),
            prop_queue: VecDeque::new(),
            prop_queued: Vec::new(),
            pred_callbacks: Vec::new(),
            fix_callbacks: Vec::new(),
            pred_origin: Vec::new(),
            active_prop: None,
            confl_seed: None,
            activity: Vec::new(),
            act_inc: 1.0,
            cla_inc: 1.0,
            polarity: Vec::new(),
            eq_cache: FxHashMap::default(),
        };
        engine.new_pred(0, 0);
        engine
    }

    /// Current decision level.
    #[must_use]
    pub fn level(&self) -> usize {
        self.infer.trail_lim.len()
    }

    fn alloc_pred(&mut self, lb: Pval, ub: Pval) -> PredId {
        let pid = self.state.new_pred(lb, ub);
        self.infer.grow_preds(pid);
        self.persist.grow_preds();
        for _ in 0..2 {
            self.pred_queued.push(false);
            self.wake_queued.push(false);
            self.pred_callbacks.push(Vec::new());
            self.pred_origin.push(None);
        }
        self.fix_callbacks.push(Vec::new());
        self.activity.push(0.0);
        self.polarity.push(false);
        pid
    }

    /// Allocate a predicate pair with forward ticks `[lb, ub]`.
    ///
    /// Only legal at decision level 0.
    pub fn new_pred(&mut self, lb: Pval, ub: Pval) -> PredId {
        debug_assert_eq!(self.level(), 0);
        let pid = self.alloc_pred(lb, ub);
        self.state.init_end = self.state.initializers.len();
        pid
    }

    /// Allocate a lazily initialized predicate pair.
    ///
    /// The initializer seeds the bounds now and is re-applied at the top of
    /// the next propagation after any backtrack past this point.
    pub fn new_pred_lazy(&mut self, init: PredInit) -> PredId {
        let (lb, inv_ub) = init.eval(&self.state.p_root);
        let pid = self.alloc_pred(lb, pval_inv(inv_ub));
        let (l1, u1) = init.eval(&self.state.p_last);
        self.state.p_last[pid.idx()] = l1;
        self.state.p_last[pid.inv().idx()] = u1;
        let (l2, u2) = init.eval(&self.state.p_vals);
        self.state.p_vals[pid.idx()] = l2;
        self.state.p_vals[pid.inv().idx()] = u2;
        self.state.initializers[pid.pair()] = Some(init);
        pid
    }

    /// New integer variable with the inclusive domain `[lb, ub]`.
    pub fn new_intvar(&mut self, lb: i64, ub: i64) -> IntVar {
        debug_assert!(lb <= ub);
        let pid = self.new_pred(pval_of_int(lb), pval_of_int(ub));
        IntVar::new(pid, 0)
    }

    /// New Boolean atom (a `[0, 1]` predicate at threshold 1).
    pub fn new_bool(&mut self) -> Atom {
        let pid = self.new_pred(pval_of_int(0), pval_of_int(1));
        Atom::new(pid, pval_of_int(1))
    }

    // ---- bound accessors -------------------------------------------------

    /// Current lower bound of a variable.
    #[must_use]
    pub fn lb(&self, x: IntVar) -> i64 {
        x.lb(&self.state.p_vals)
    }

    /// Current upper bound of a variable.
    #[must_use]
    pub fn ub(&self, x: IntVar) -> i64 {
        x.ub(&self.state.p_vals)
    }

    /// Root lower bound.
    #[must_use]
    pub fn lb_root(&self, x: IntVar) -> i64 {
        x.lb(&self.state.p_root)
    }

    /// Root upper bound.
    #[must_use]
    pub fn ub_root(&self, x: IntVar) -> i64 {
        x.ub(&self.state.p_root)
    }

    /// Lower bound at entry to the current level.
    #[must_use]
    pub fn lb_prev(&self, x: IntVar) -> i64 {
        x.lb(&self.state.p_last)
    }

    /// Upper bound at entry to the current level.
    #[must_use]
    pub fn ub_prev(&self, x: IntVar) -> i64 {
        x.ub(&self.state.p_last)
    }

    /// Is the variable fixed?
    #[must_use]
    pub fn is_fixed(&self, x: IntVar) -> bool {
        self.state.is_fixed(x.pid)
    }

    /// Deduce `x ≥ v`.
    pub fn set_lb(&mut self, x: IntVar, v: i64, r: Reason) -> bool {
        self.enqueue(x.ge(v), r)
    }

    /// Deduce `x ≤ v`.
    pub fn set_ub(&mut self, x: IntVar, v: i64, r: Reason) -> bool {
        self.enqueue(x.le(v), r)
    }

    // ---- trailed scalars -------------------------------------------------

    /// Allocate a trailed scalar slot.
    pub fn alloc_scalar(&mut self, init: u64) -> TrailedSlot {
        self.persist.alloc_scalar(init)
    }

    /// Read a trailed scalar.
    #[must_use]
    pub fn scalar(&self, slot: TrailedSlot) -> u64 {
        self.persist.scalar(slot)
    }

    /// Write a trailed scalar.
    pub fn set_scalar(&mut self, slot: TrailedSlot, v: u64) {
        self.persist.set_scalar(slot, v);
    }

    // ---- watches ---------------------------------------------------------

    /// Watch one predicate direction.
    pub fn attach_pred(&mut self, pid: PredId, w: Watch) {
        self.pred_callbacks[pid.idx()].push(w);
    }

    /// Watch a variable for a bound-change event.
    pub fn attach_var(&mut self, x: IntVar, ev: Event, w: Watch) {
        match ev {
            Event::Lb => self.attach_pred(x.pid, w),
            Event::Ub => self.attach_pred(x.pid.inv(), w),
            Event::LbUb => {
                self.attach_pred(x.pid, w);
                self.attach_pred(x.pid.inv(), w);
            }
            Event::Fix => self.fix_callbacks[x.pid.pair()].push(w),
        }
    }

    /// Fire a callback when `at` becomes entailed.
    ///
    /// If `at` is already entailed the callback will not fire until the
    /// bound retreats and crosses the threshold again; callers check first.
    pub fn attach_atom(&mut self, at: Atom, w: Watch) {
        let n = self.infer.get_watch(at.pid, at.val);
        self.infer.nodes[n as usize].cbs.push(w);
    }

    /// Enqueue a propagator run, collapsing duplicates.
    pub fn queue_prop(&mut self, id: PropId) {
        if !self.prop_queued[id.idx()] {
            self.prop_queued[id.idx()] = true;
            self.prop_queue.push_back(id);
        }
    }

    pub(crate) fn grow_props(&mut self) {
        self.prop_queued.push(false);
    }

    // ---- inference -------------------------------------------------------

    /// Raise the bound claimed by `at` with reason `r`.
    ///
    /// On failure the conflict buffer is filled (thunk reasons are deferred
    /// until the propagation loop can reach the store) and `false` returned.
    pub fn enqueue(&mut self, at: Atom, r: Reason) -> bool {
        if self.state.is_entailed(at) {
            return true;
        }
        let old = self.state.p_vals[at.pid.idx()];
        if !self.state.post(at) {
            match r {
                Reason::Thunk { .. } => self.confl_seed = Some((at, r)),
                _ => self.set_confl_inline(at, r),
            }
            return false;
        }
        trace!(atom = %at, "|-");
        if !matches!(r, Reason::Decision) {
            self.stats.propagations += 1;
        }
        self.pred_origin[at.pid.idx()] = self.active_prop;
        self.infer.trail.push(TrailEntry {
            pid: at.pid,
            old,
            reason: r,
        });
        if !self.pred_queued[at.pid.idx()] {
            self.pred_queued[at.pid.idx()] = true;
            self.pred_queue.push_back(at.pid);
        }
        true
    }

    fn set_confl_inline(&mut self, at: Atom, r: Reason) {
        self.confl.clear();
        match r {
            Reason::Decision => self.confl.push(at),
            Reason::Atom(a) => {
                self.confl.push(at);
                self.confl.push(a);
            }
            Reason::Clause(c) => {
                let elts = &self.infer.clauses.get(c).elts;
                self.confl.extend(elts.iter().map(|e| e.atom));
            }
            Reason::Thunk { .. } => unreachable!("thunk conflicts are deferred"),
        }
    }

    /// Post a unit atom at the root.
    pub fn post(&mut self, at: Atom) -> bool {
        debug_assert_eq!(self.level(), 0);
        if !self.ok {
            return false;
        }
        if self.state.is_entailed(at) {
            return true;
        }
        if self.state.is_inconsistent(at) {
            self.ok = false;
            return false;
        }
        self.enqueue(at, Reason::Decision)
    }

    // ---- levels ----------------------------------------------------------

    /// Open a new decision level.
    pub fn push_level(&mut self) {
        self.infer.trail_lim.push(self.infer.trail.len());
        self.persist.data_lim.push(self.persist.data_trail.len());
        self.persist.plast_lim.push(self.persist.plast_trail.len());
        let touched = std::mem::take(&mut self.persist.touched_preds);
        for p in touched {
            self.persist.pred_touched[p.idx()] = false;
            self.persist.plast_trail.push((p, self.state.p_last[p.idx()]));
            self.state.p_last[p.idx()] = self.state.p_vals[p.idx()];
        }
    }

    /// Restore every trail to the state at entry of `level`.
    pub fn bt_to_level(&mut self, level: usize) {
        if level >= self.level() {
            return;
        }
        while self.infer.trail_lim.len() > level {
            let lim = *self.infer.trail_lim.last().unwrap();
            while self.infer.trail.len() > lim {
                let e = self.infer.trail.pop().unwrap();
                self.state.p_vals[e.pid.idx()] = e.old;
            }
            self.infer.trail_lim.pop();
        }
        let dlim = self.persist.data_lim[level];
        while self.persist.data_trail.len() > dlim {
            let (loc, old) = self.persist.data_trail.pop().unwrap();
            match loc {
                TrailLoc::Scalar(s) => self.persist.restore_scalar(s, old),
                TrailLoc::WatchHead(p) => self.infer.head[p as usize] = old as u32,
                TrailLoc::InitEnd => self.state.init_end = old as usize,
            }
        }
        self.persist.data_lim.truncate(level);

        let plim = self.persist.plast_lim[level];
        for p in std::mem::take(&mut self.persist.touched_preds) {
            self.persist.pred_touched[p.idx()] = false;
        }
        for i in (plim..self.persist.plast_trail.len()).rev() {
            let (p, v) = self.persist.plast_trail[i];
            self.state.p_last[p.idx()] = v;
        }
        let seg_end = if level + 1 < self.persist.plast_lim.len() {
            self.persist.plast_lim[level + 1]
        } else {
            self.persist.plast_trail.len()
        };
        for i in plim..seg_end {
            let (p, _) = self.persist.plast_trail[i];
            if !self.persist.pred_touched[p.idx()] {
                self.persist.pred_touched[p.idx()] = true;
                self.persist.touched_preds.push(p);
            }
        }
        self.persist.plast_trail.truncate(plim);
        self.persist.plast_lim.truncate(level);
    }

    pub(crate) fn touch_pred(&mut self, p: PredId) {
        self.persist.touch_pred(p);
    }

    // ---- activity --------------------------------------------------------

    /// Bump the activity of a predicate pair.
    pub fn bump_activity(&mut self, pair: usize) {
        self.activity[pair] += self.act_inc;
        if self.activity[pair] > 1e100 {
            for a in &mut self.activity {
                *a *= 1e-100;
            }
            self.act_inc *= 1e-100;
        }
    }

    /// Activity of a predicate pair.
    #[must_use]
    pub fn activity(&self, pair: usize) -> f64 {
        self.activity[pair]
    }

    /// Bump a learnt clause's activity.
    pub fn bump_clause(&mut self, c: ClauseRef) {
        let cl = self.infer.clauses.get_mut(c);
        cl.activity += self.cla_inc;
        if cl.activity > 1e20 {
            for &lc in &self.infer.learnt_list {
                self.infer.clauses.get_mut(lc).activity *= 1e-20;
            }
            self.cla_inc *= 1e-20;
        }
    }

    /// Scale both activity increments after a conflict.
    pub fn decay_activities(&mut self) {
        self.act_inc /= self.config.pred_act_decay;
        self.cla_inc /= self.config.clause_act_decay;
    }

    // ---- clauses ---------------------------------------------------------

    pub(crate) fn watch_node_of(&mut self, elt: Atom) -> u32 {
        let na = !elt;
        self.infer.get_watch(na.pid, na.val)
    }

    /// Add a clause at the root level.
    ///
    /// Entailed literals satisfy it outright, inconsistent literals are
    /// dropped; an empty remainder establishes root inconsistency, a unit
    /// remainder is posted, a binary remainder is inlined into its watchers.
    pub fn add_clause(&mut self, atoms: &[Atom]) -> bool {
        debug_assert_eq!(self.level(), 0);
        let mut kept: Vec<Atom> = Vec::with_capacity(atoms.len());
        for &a in atoms {
            if self.state.is_entailed(a) {
                return true;
            }
            if self.state.is_inconsistent(a) {
                continue;
            }
            kept.push(a);
        }
        match kept.len() {
            0 => {
                self.ok = false;
                false
            }
            1 => self.enqueue(kept[0], Reason::Decision),
            2 => {
                let n0 = self.watch_node_of(kept[0]);
                self.infer.nodes[n0 as usize].heads.push(ClauseHead {
                    e0: kept[1],
                    cl: None,
                });
                let n1 = self.watch_node_of(kept[1]);
                self.infer.nodes[n1 as usize].heads.push(ClauseHead {
                    e0: kept[0],
                    cl: None,
                });
                true
            }
            _ => {
                let c = self.infer.clauses.alloc(&kept, false);
                let head = ClauseHead {
                    e0: kept[2],
                    cl: Some(c),
                };
                for i in 0..2 {
                    let n = self.watch_node_of(kept[i]);
                    self.infer.clauses.get_mut(c).elts[i].watch = Some(n);
                    self.infer.nodes[n as usize].heads.push(head);
                }
                self.infer.clause_list.push(c);
                true
            }
        }
    }

    /// The (cached) Boolean atom `x = k`, created with its three linking
    /// clauses on first request.
    pub fn eq_atom(&mut self, x: IntVar, k: i64) -> Atom {
        let (lb, ub) = (self.lb_root(x), self.ub_root(x));
        if k < lb || k > ub {
            return !Atom::TRUE;
        }
        if lb == ub {
            return Atom::TRUE;
        }
        let key = (x.pid.raw(), k - x.off);
        if let Some(&b) = self.eq_cache.get(&key) {
            return b;
        }
        debug_assert_eq!(self.level(), 0);
        let b = self.new_bool();
        self.add_clause(&[!b, x.ge(k)]);
        self.add_clause(&[!b, x.le(k)]);
        self.add_clause(&[b, x.le(k - 1), x.ge(k + 1)]);
        self.eq_cache.insert(key, b);
        b
    }

    // ---- initializers ----------------------------------------------------

    fn flush_initializers(&mut self) {
        let n = self.state.initializers.len();
        if self.state.init_end == n {
            return;
        }
        self.persist
            .trail_loc(TrailLoc::InitEnd, self.state.init_end as u64);
        while self.state.init_end < n {
            let pair = self.state.init_end;
            if self.state.initializers[pair].is_some() {
                let (last, vals) = {
                    let init = self.state.initializers[pair].as_ref().unwrap();
                    (init.eval(&self.state.p_last), init.eval(&self.state.p_vals))
                };
                self.state.p_last[2 * pair] = last.0;
                self.state.p_last[2 * pair + 1] = last.1;
                self.state.p_vals[2 * pair] = vals.0;
                self.state.p_vals[2 * pair + 1] = vals.1;
            }
            self.state.init_end += 1;
        }
    }

    pub(crate) fn take_confl_seed(&mut self) -> Option<(Atom, Reason)> {
        self.confl_seed.take()
    }
}

// ---- propagation loop ----------------------------------------------------

/// Materialize a deferred conflict seed into the conflict buffer.
pub fn set_confl(engine: &mut Engine, props: &PropagatorStore, at: Atom, r: Reason) {
    let Reason::Thunk { prop, tag, .. } = r else {
        unreachable!("only thunk conflicts are deferred");
    };
    let mut out = std::mem::take(&mut engine.confl);
    out.clear();
    out.push(at);
    props.explain(engine, prop, tag, at.val, &mut out);
    engine.confl = out;
}

fn fire_node_cbs(engine: &mut Engine, props: &mut PropagatorStore, node: u32) {
    if engine.infer.nodes[node as usize].cbs.is_empty() {
        return;
    }
    let origin = engine.pred_origin[engine.infer.nodes[node as usize].atom.pid.idx()];
    let cbs = std::mem::take(&mut engine.infer.nodes[node as usize].cbs);
    let mut kept = Vec::with_capacity(cbs.len());
    for w in cbs {
        if w.idem && origin.is_some() && origin == Some(w.prop) {
            kept.push(w);
            continue;
        }
        if props.run_wake(engine, w) == WatchRes::Keep {
            kept.push(w);
        }
    }
    let appended = std::mem::take(&mut engine.infer.nodes[node as usize].cbs);
    kept.extend(appended);
    engine.infer.nodes[node as usize].cbs = kept;
}

fn update_watchlist(engine: &mut Engine, elt_atom: Atom, node: u32) -> bool {
    let mut ws = std::mem::take(&mut engine.infer.nodes[node as usize].heads);
    let mut jj = 0;
    let mut ii = 0;
    while ii < ws.len() {
        let ch = ws[ii];
        if engine.state.is_entailed(ch.e0) {
            ws[jj] = ch;
            jj += 1;
            ii += 1;
            continue;
        }
        let Some(cref) = ch.cl else {
            // Inlined binary: the companion must hold now.
            if !engine.enqueue(ch.e0, Reason::Atom(elt_atom)) {
                for k in ii..ws.len() {
                    ws[jj] = ws[k];
                    jj += 1;
                }
                ws.truncate(jj);
                engine.infer.nodes[node as usize].heads = ws;
                return false;
            }
            ws[jj] = ch;
            jj += 1;
            ii += 1;
            continue;
        };
        // Long clause: make position 0 the other watched literal.
        {
            let cl = engine.infer.clauses.get_mut(cref);
            if cl.elts[1].atom != elt_atom {
                debug_assert_eq!(cl.elts[0].atom, elt_atom);
                cl.elts[0] = cl.elts[1];
            }
        }
        let other = engine.infer.clauses.get(cref).elts[0].atom;
        if engine.state.is_entailed(other) {
            // Satisfied: record the witness in the head and keep.
            let cl = engine.infer.clauses.get_mut(cref);
            cl.elts[1] = ClauseElt {
                atom: elt_atom,
                watch: Some(node),
            };
            ws[jj] = ClauseHead {
                e0: other,
                cl: Some(cref),
            };
            jj += 1;
            ii += 1;
            continue;
        }
        // Look for a replacement watch among the tail.
        let mut found: Option<(usize, bool)> = None;
        for li in 2..engine.infer.clauses.get(cref).elts.len() {
            let a = engine.infer.clauses.get(cref).elts[li].atom;
            if engine.state.is_entailed(a) {
                found = Some((li, true));
                break;
            }
            if !engine.state.is_inconsistent(a) {
                found = Some((li, false));
                break;
            }
        }
        match found {
            Some((li, true)) => {
                let sat = engine.infer.clauses.get(cref).elts[li].atom;
                let cl = engine.infer.clauses.get_mut(cref);
                cl.elts[1] = ClauseElt {
                    atom: elt_atom,
                    watch: Some(node),
                };
                ws[jj] = ClauseHead {
                    e0: sat,
                    cl: Some(cref),
                };
                jj += 1;
                ii += 1;
            }
            Some((li, false)) => {
                // Migrate the watch to the free literal.
                let new_watch = engine.infer.clauses.get(cref).elts[li];
                {
                    let cl = engine.infer.clauses.get_mut(cref);
                    cl.elts[li] = ClauseElt {
                        atom: elt_atom,
                        watch: Some(node),
                    };
                    cl.elts[1] = new_watch;
                }
                let dest = match new_watch.watch {
                    Some(w) => w,
                    None => {
                        let na = !new_watch.atom;
                        engine.infer.get_watch(na.pid, na.val)
                    }
                };
                engine.infer.clauses.get_mut(cref).elts[1].watch = Some(dest);
                engine.infer.nodes[dest as usize].heads.push(ch);
                ii += 1;
            }
            None => {
                // Unit (or conflicting).
                {
                    let cl = engine.infer.clauses.get_mut(cref);
                    cl.elts[1] = ClauseElt {
                        atom: elt_atom,
                        watch: Some(node),
                    };
                }
                let first = engine.infer.clauses.get(cref).elts[0].atom;
                ws[jj] = ch;
                jj += 1;
                ii += 1;
                if !engine.enqueue(first, Reason::Clause(cref)) {
                    for k in ii..ws.len() {
                        ws[jj] = ws[k];
                        jj += 1;
                    }
                    ws.truncate(jj);
                    engine.infer.nodes[node as usize].heads = ws;
                    return false;
                }
            }
        }
    }
    ws.truncate(jj);
    engine.infer.nodes[node as usize].heads = ws;
    true
}

fn propagate_pred(engine: &mut Engine, props: &mut PropagatorStore, p: PredId) -> bool {
    let start = engine.infer.head[p.idx()];
    let mut cur = start;
    let ok = loop {
        let next = engine.infer.nodes[cur as usize].succ;
        if next == NODE_NONE {
            break true;
        }
        let at = engine.infer.nodes[next as usize].atom;
        if !engine.state.is_entailed(at) {
            break true;
        }
        cur = next;
        fire_node_cbs(engine, props, cur);
        if !update_watchlist(engine, !at, cur) {
            break false;
        }
    };
    if ok && cur != start {
        engine
            .persist
            .trail_loc(TrailLoc::WatchHead(p.raw()), u64::from(start));
        engine.infer.head[p.idx()] = cur;
    }
    ok
}

fn fire_watch_list(engine: &mut Engine, props: &mut PropagatorStore, list: Vec<Watch>, origin: Option<PropId>) -> Vec<Watch> {
    let mut kept = Vec::with_capacity(list.len());
    for w in list {
        if w.idem && origin.is_some() && origin == Some(w.prop) {
            kept.push(w);
            continue;
        }
        if props.run_wake(engine, w) == WatchRes::Keep {
            kept.push(w);
        }
    }
    kept
}

fn wakeup_pred(engine: &mut Engine, props: &mut PropagatorStore, p: PredId) {
    let origin = engine.pred_origin[p.idx()];
    let cbs = std::mem::take(&mut engine.pred_callbacks[p.idx()]);
    let mut kept = fire_watch_list(engine, props, cbs, origin);
    let appended = std::mem::take(&mut engine.pred_callbacks[p.idx()]);
    kept.extend(appended);
    engine.pred_callbacks[p.idx()] = kept;

    if engine.state.is_fixed(p) {
        let cbs = std::mem::take(&mut engine.fix_callbacks[p.pair()]);
        let mut kept = fire_watch_list(engine, props, cbs, origin);
        let appended = std::mem::take(&mut engine.fix_callbacks[p.pair()]);
        kept.extend(appended);
        engine.fix_callbacks[p.pair()] = kept;
    }
    engine.pred_origin[p.idx()] = None;
    engine.wake_queued[p.idx()] = false;
}

fn prop_cleanup(engine: &mut Engine, props: &mut PropagatorStore) {
    while let Some(p) = engine.pred_queue.pop_front() {
        engine.pred_queued[p.idx()] = false;
        engine.touch_pred(p);
    }
    let wq = std::mem::take(&mut engine.wake_queue);
    for p in wq {
        engine.wake_queued[p.idx()] = false;
        engine.touch_pred(p);
    }
    while let Some(q) = engine.prop_queue.pop_front() {
        engine.prop_queued[q.idx()] = false;
        props.run_cleanup(q);
    }
}

/// Run predicate and propagator queues to a joint fixpoint.
///
/// The predicate queue is fully drained (watch-driven clause inference plus
/// wake callbacks) before any propagator runs, and re-drained after every
/// propagator that touched a bound. Returns `false` with the conflict buffer
/// filled on failure; queues are cleaned up either way.
pub fn propagate(engine: &mut Engine, props: &mut PropagatorStore) -> bool {
    engine.flush_initializers();
    loop {
        while let Some(p) = engine.pred_queue.pop_front() {
            engine.pred_queued[p.idx()] = false;
            if !engine.wake_queued[p.idx()] {
                engine.wake_queued[p.idx()] = true;
                engine.wake_queue.push(p);
            }
            if !propagate_pred(engine, props, p) {
                prop_cleanup(engine, props);
                return false;
            }
        }
        let wq = std::mem::take(&mut engine.wake_queue);
        for p in wq {
            engine.touch_pred(p);
            wakeup_pred(engine, props, p);
        }
        if !engine.pred_queue.is_empty() {
            continue;
        }
        let mut back_to_preds = false;
        while let Some(q) = engine.prop_queue.pop_front() {
            engine.active_prop = Some(q);
            let ok = props.run_propagate(engine, q);
            engine.active_prop = None;
            engine.prop_queued[q.idx()] = false;
            props.run_cleanup(q);
            if !ok {
                if let Some((at, r)) = engine.take_confl_seed() {
                    set_confl(engine, props, at, r);
                }
                prop_cleanup(engine, props);
                return false;
            }
            if !engine.pred_queue.is_empty() {
                back_to_preds = true;
                break;
            }
        }
        if !back_to_preds {
            debug_assert!(engine.pred_queue.is_empty() && engine.prop_queue.is_empty());
            return true;
        }
    }
}

// ---- root simplification ---------------------------------------------------

fn detach_clause(engine: &mut Engine, cref: ClauseRef) {
    for i in 0..2 {
        let elt = engine.infer.clauses.get(cref).elts[i];
        let node = elt.watch.or_else(|| {
            let na = !elt.atom;
            engine.infer.find_watch(na.pid, na.val)
        });
        if let Some(n) = node {
            let heads = &mut engine.infer.nodes[n as usize].heads;
            if let Some(pos) = heads.iter().position(|h| h.cl == Some(cref)) {
                heads.swap_remove(pos);
            }
        }
    }
}

pub(crate) fn remove_clause(engine: &mut Engine, cref: ClauseRef) {
    detach_clause(engine, cref);
    engine.infer.clauses.free(cref);
}

fn replace_watch(engine: &mut Engine, node: u32, cref: ClauseRef, h: ClauseHead) {
    let heads = &mut engine.infer.nodes[node as usize].heads;
    if let Some(pos) = heads.iter().position(|w| w.cl == Some(cref)) {
        heads[pos] = h;
    }
}

/// `true` to keep the clause.
fn simplify_clause(engine: &mut Engine, cref: ClauseRef) -> bool {
    let satisfied = engine
        .infer
        .clauses
        .get(cref)
        .elts
        .iter()
        .any(|e| engine.state.is_entailed(e.atom));
    if satisfied {
        remove_clause(engine, cref);
        return false;
    }
    {
        let state = &engine.state;
        let cl = engine.infer.clauses.get_mut(cref);
        debug_assert!(!state.is_inconsistent(cl.elts[0].atom));
        debug_assert!(!state.is_inconsistent(cl.elts[1].atom));
        cl.elts.retain(|e| !state.is_inconsistent(e.atom));
        debug_assert!(cl.elts.len() >= 2);
    }
    if engine.infer.clauses.get(cref).elts.len() == 2 {
        // Binary remainder: inline into the two watchers.
        let e0 = engine.infer.clauses.get(cref).elts[0];
        let e1 = engine.infer.clauses.get(cref).elts[1];
        if let Some(n) = e0.watch {
            replace_watch(engine, n, cref, ClauseHead {
                e0: e1.atom,
                cl: None,
            });
        }
        if let Some(n) = e1.watch {
            replace_watch(engine, n, cref, ClauseHead {
                e0: e0.atom,
                cl: None,
            });
        }
        engine.infer.clauses.free(cref);
        return false;
    }
    true
}

/// Level-0 simplification after a propagation fixpoint.
///
/// Deletes satisfied clauses, strips root-false literals, inlines binary
/// remainders, promotes current bounds to root, garbage-collects crossed
/// watch nodes, root-simplifies every propagator and clears the trails.
pub fn simplify_at_root(engine: &mut Engine, props: &mut PropagatorStore) {
    debug_assert_eq!(engine.level(), 0);
    let list = std::mem::take(&mut engine.infer.clause_list);
    let mut kept = Vec::with_capacity(list.len());
    for c in list {
        if simplify_clause(engine, c) {
            kept.push(c);
        }
    }
    engine.infer.clause_list = kept;

    let list = std::mem::take(&mut engine.infer.learnt_list);
    let mut kept = Vec::with_capacity(list.len());
    for c in list {
        if simplify_clause(engine, c) {
            kept.push(c);
        }
    }
    engine.infer.learnt_list = kept;
    for i in 0..engine.state.num_preds() {
        engine.state.p_root[i] = engine.state.p_vals[i];
        engine.state.p_last[i] = engine.state.p_vals[i];
        engine.infer.gc_crossed(PredId::new(i as u32));
    }
    props.root_simplify_all(engine);
    engine.infer.trail.clear();
    engine.persist.root_simplify();
}
