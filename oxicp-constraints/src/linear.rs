//! Integer Linear Constraints.
//!
//! `IntLinearLe` propagates `Σ cᵢ·xᵢ ≤ k` by slack: if the sum of
//! lower-bound contributions exceeds `k` the constraint fails (or forces its
//! half-reification literal off); otherwise each variable's opposite bound
//! is tightened to what the slack permits. Explanations are generated
//! lazily, pushing as much of the slack as possible onto root and
//! previous-level bounds so the emitted atoms are as weak as possible.
//!
//! `IntLinearNe` propagates `Σ cᵢ·xᵢ ≠ k` with a two-unfixed-variable watch
//! scheme: nothing can happen while two terms are free; once all-but-one is
//! fixed, the single excluded value is pushed away from whichever bound it
//! sits on.

use tracing::trace;

use oxicp_core::{Atom, IntVar, Pval};
use oxicp_engine::{Engine, Event, PropId, Propagator, PropagatorStore, Reason, Watch, WatchRes};

/// One term of a linear constraint; coefficients are kept positive.
#[derive(Debug, Clone, Copy)]
struct Term {
    c: i64,
    x: IntVar,
}

const TAG_DEACT: u32 = u32::MAX;

/// Half-reified `r → Σ cᵢ·xᵢ ≤ k`.
pub struct IntLinearLe {
    r: Atom,
    r_root: bool,
    /// Positive-coefficient terms (watch lower bounds).
    xs: Vec<Term>,
    /// Negative-coefficient terms, coefficient negated (watch upper bounds).
    ys: Vec<Term>,
    k: i64,
}

impl IntLinearLe {
    /// Sum of lower-bound contributions under the current assignment.
    fn sum_lb(&self, engine: &Engine) -> i64 {
        let mut sum = 0i64;
        for t in &self.xs {
            sum += t.c * engine.lb(t.x);
        }
        for t in &self.ys {
            sum -= t.c * engine.ub(t.x);
        }
        sum
    }

    /// Emit clause elements whose negations imply the current lower-bound
    /// sum up to `slack` of give-away, skipping the term `skip`.
    ///
    /// Terms whose movement from the root bound fits in the remaining slack
    /// are omitted entirely; terms whose movement from the previous level
    /// fits are emitted at the previous-level bound; the rest absorb what
    /// slack is left at their current bound.
    fn make_expl(&self, engine: &Engine, skip: Option<u32>, mut slack: i64, out: &mut Vec<Atom>) {
        debug_assert!(slack >= 0);
        let mut pending: Vec<(bool, usize)> = Vec::new();
        for (i, t) in self.xs.iter().enumerate() {
            if skip == Some(2 * i as u32) {
                continue;
            }
            let lb = engine.lb(t.x);
            let d0 = t.c * (lb - engine.lb_root(t.x));
            if d0 <= slack {
                slack -= d0;
                continue;
            }
            // The level-entry bound can postdate the entry under analysis;
            // never emit above the inference-time bound.
            let lbp = engine.lb_prev(t.x).min(lb);
            let dp = t.c * (lb - lbp);
            if dp <= slack {
                slack -= dp;
                out.push(t.x.lt(lbp));
                continue;
            }
            pending.push((false, i));
        }
        for (i, t) in self.ys.iter().enumerate() {
            if skip == Some(2 * i as u32 + 1) {
                continue;
            }
            let ub = engine.ub(t.x);
            let d0 = t.c * (engine.ub_root(t.x) - ub);
            if d0 <= slack {
                slack -= d0;
                continue;
            }
            let ubp = engine.ub_prev(t.x).max(ub);
            let dp = t.c * (ubp - ub);
            if dp <= slack {
                slack -= dp;
                out.push(t.x.gt(ubp));
                continue;
            }
            pending.push((true, i));
        }
        for (is_y, i) in pending {
            let t = if is_y { &self.ys[i] } else { &self.xs[i] };
            let diff = slack / t.c;
            if is_y {
                out.push(t.x.gt(engine.ub(t.x) + diff));
            } else {
                out.push(t.x.lt(engine.lb(t.x) - diff));
            }
            slack -= t.c * diff;
        }
    }
}

impl Propagator for IntLinearLe {
    fn propagate(&mut self, engine: &mut Engine, me: PropId) -> bool {
        trace!("running int_linear_le");
        let sum = self.sum_lb(engine);
        if sum > self.k {
            if !engine.state.is_entailed(self.r) {
                if engine.state.is_inconsistent(self.r) {
                    return true;
                }
                return engine.enqueue(
                    !self.r,
                    Reason::Thunk {
                        prop: me,
                        tag: TAG_DEACT,
                        btpred: false,
                    },
                );
            }
            let mut confl = std::mem::take(&mut engine.confl);
            confl.clear();
            if !self.r_root {
                confl.push(!self.r);
            }
            self.make_expl(engine, None, sum - self.k - 1, &mut confl);
            engine.confl = confl;
            return false;
        }
        if !engine.state.is_entailed(self.r) {
            return true;
        }
        let slack = self.k - sum;
        for (i, t) in self.xs.iter().enumerate() {
            let diff = slack / t.c;
            let ub_new = engine.lb(t.x) + diff;
            if ub_new < engine.ub(t.x) {
                let r = Reason::Thunk {
                    prop: me,
                    tag: 2 * i as u32,
                    btpred: true,
                };
                if !engine.set_ub(t.x, ub_new, r) {
                    return false;
                }
            }
        }
        for (i, t) in self.ys.iter().enumerate() {
            let diff = slack / t.c;
            let lb_new = engine.ub(t.x) - diff;
            if lb_new > engine.lb(t.x) {
                let r = Reason::Thunk {
                    prop: me,
                    tag: 2 * i as u32 + 1,
                    btpred: true,
                };
                if !engine.set_lb(t.x, lb_new, r) {
                    return false;
                }
            }
        }
        true
    }

    fn explain(&self, engine: &Engine, tag: u32, val: Pval, out: &mut Vec<Atom>) {
        if tag == TAG_DEACT {
            let sum = self.sum_lb(engine);
            self.make_expl(engine, None, sum - self.k - 1, out);
            return;
        }
        let i = (tag / 2) as usize;
        if !self.r_root {
            out.push(!self.r);
        }
        if tag % 2 == 0 {
            let t = &self.xs[i];
            let u = t.x.ub_of_pval(val);
            let lim = self.k - t.c * (u + 1) + 1;
            let mut sum = 0i64;
            for (j, s) in self.xs.iter().enumerate() {
                if j != i {
                    sum += s.c * engine.lb(s.x);
                }
            }
            for s in &self.ys {
                sum -= s.c * engine.ub(s.x);
            }
            self.make_expl(engine, Some(tag), sum - lim, out);
        } else {
            let t = &self.ys[i];
            let l = t.x.lb_of_pval(val);
            let lim = self.k + t.c * (l - 1) + 1;
            let mut sum = 0i64;
            for s in &self.xs {
                sum += s.c * engine.lb(s.x);
            }
            for (j, s) in self.ys.iter().enumerate() {
                if j != i {
                    sum -= s.c * engine.ub(s.x);
                }
            }
            self.make_expl(engine, Some(tag), sum - lim, out);
        }
    }
}

/// Post `r → Σ cs·vs ≤ k`.
pub fn int_linear_le(
    engine: &mut Engine,
    props: &mut PropagatorStore,
    r: Atom,
    cs: &[i64],
    vs: &[IntVar],
    k: i64,
) -> bool {
    debug_assert_eq!(cs.len(), vs.len());
    if engine.state.is_inconsistent_root(r) {
        return true;
    }
    let id = props.next_id();
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for (&c, &x) in cs.iter().zip(vs) {
        if c > 0 {
            engine.attach_var(x, Event::Lb, Watch::new(id, 0).idem());
            xs.push(Term { c, x });
        } else if c < 0 {
            engine.attach_var(x, Event::Ub, Watch::new(id, 0).idem());
            ys.push(Term { c: -c, x });
        }
    }
    if xs.is_empty() && ys.is_empty() {
        if k >= 0 {
            return true;
        }
        return engine.post(!r);
    }
    let r_root = engine.state.is_entailed_root(r);
    if !r_root {
        engine.attach_atom(r, Watch::new(id, 1));
    }
    props.register(
        engine,
        Box::new(IntLinearLe {
            r,
            r_root,
            xs,
            ys,
            k,
        }),
    );
    true
}

const NE_TAG_BOUND: u32 = 1 << 30;
const NE_TAG_R: u32 = u32::MAX;
const NE_EX_LB: u32 = 0;
const NE_EX_UB: u32 = 1 << 28;
const NE_EX_R: u32 = 2 << 28;
const NE_EX_MASK: u32 = 3 << 28;

/// Half-reified `r → Σ cᵢ·xᵢ ≠ k`.
pub struct IntLinearNe {
    r: Atom,
    r_root: bool,
    vs: Vec<Term>,
    k: i64,
    /// Watch permutation: positions 0 and 1 are the watched terms.
    perm: Vec<usize>,
}

impl IntLinearNe {
    /// Fixedness of every term but `skip`, as clause elements.
    fn push_fixed(&self, engine: &Engine, skip: Option<usize>, out: &mut Vec<Atom>) {
        for (j, t) in self.vs.iter().enumerate() {
            if Some(j) == skip {
                continue;
            }
            out.push(t.x.lt(engine.lb(t.x)));
            out.push(t.x.gt(engine.ub(t.x)));
        }
    }
}

impl Propagator for IntLinearNe {
    fn wake(&mut self, engine: &mut Engine, me: PropId, tag: u32) -> WatchRes {
        if tag == NE_TAG_R {
            if engine.is_fixed(self.vs[self.perm[1]].x) {
                engine.queue_prop(me);
            }
            return WatchRes::Keep;
        }
        if tag & NE_TAG_BOUND != 0 {
            if !engine.is_fixed(self.vs[self.perm[1]].x) {
                return WatchRes::Drop;
            }
            engine.queue_prop(me);
            return WatchRes::Keep;
        }
        let vi = tag as usize;
        if self.perm[1] != vi {
            self.perm[0] = self.perm[1];
        }
        for pi in 2..self.perm.len() {
            let wi = self.perm[pi];
            if !engine.is_fixed(self.vs[wi].x) {
                self.perm[1] = wi;
                self.perm[pi] = vi;
                engine.attach_var(self.vs[wi].x, Event::Fix, Watch::new(me, wi as u32).idem());
                return WatchRes::Drop;
            }
        }
        if !engine.is_fixed(self.vs[self.perm[0]].x) {
            let x0 = self.perm[0];
            engine.attach_var(
                self.vs[x0].x,
                Event::LbUb,
                Watch::new(me, NE_TAG_BOUND | x0 as u32).idem(),
            );
        }
        engine.queue_prop(me);
        WatchRes::Keep
    }

    fn propagate(&mut self, engine: &mut Engine, me: PropId) -> bool {
        trace!("running int_linear_ne");
        if engine.state.is_inconsistent(self.r) {
            return true;
        }
        let mut res = self.k;
        let mut unfixed: Option<usize> = None;
        for (i, t) in self.vs.iter().enumerate() {
            if !engine.is_fixed(t.x) {
                if unfixed.is_some() {
                    return true;
                }
                unfixed = Some(i);
            } else {
                res -= t.c * engine.lb(t.x);
            }
        }
        let Some(i) = unfixed else {
            if res != 0 {
                return true;
            }
            if !engine.state.is_entailed(self.r) {
                return engine.enqueue(
                    !self.r,
                    Reason::Thunk {
                        prop: me,
                        tag: NE_EX_R,
                        btpred: false,
                    },
                );
            }
            let mut confl = std::mem::take(&mut engine.confl);
            confl.clear();
            if !self.r_root {
                confl.push(!self.r);
            }
            self.push_fixed(engine, None, &mut confl);
            engine.confl = confl;
            return false;
        };
        if !engine.state.is_entailed(self.r) {
            return true;
        }
        let t = self.vs[i];
        if res % t.c != 0 {
            return true;
        }
        let gap = res / t.c;
        if engine.lb(t.x) == gap {
            let r = Reason::Thunk {
                prop: me,
                tag: NE_EX_LB | i as u32,
                btpred: true,
            };
            return engine.set_lb(t.x, gap + 1, r);
        }
        if engine.ub(t.x) == gap {
            let r = Reason::Thunk {
                prop: me,
                tag: NE_EX_UB | i as u32,
                btpred: true,
            };
            return engine.set_ub(t.x, gap - 1, r);
        }
        true
    }

    fn explain(&self, engine: &Engine, tag: u32, _val: Pval, out: &mut Vec<Atom>) {
        let kind = tag & NE_EX_MASK;
        if kind == NE_EX_R {
            self.push_fixed(engine, None, out);
            return;
        }
        let i = (tag & !NE_EX_MASK) as usize;
        if !self.r_root {
            out.push(!self.r);
        }
        // Residual value the fixed terms leave for vs[i].
        let mut res = self.k;
        for (j, t) in self.vs.iter().enumerate() {
            if j != i {
                res -= t.c * engine.lb(t.x);
            }
        }
        debug_assert_eq!(res % self.vs[i].c, 0);
        let gap = res / self.vs[i].c;
        if kind == NE_EX_LB {
            // lb was sitting on the gap.
            out.push(self.vs[i].x.lt(gap));
        } else {
            out.push(self.vs[i].x.gt(gap));
        }
        self.push_fixed(engine, Some(i), out);
    }
}

/// Post `r → Σ cs·vs ≠ k`.
pub fn int_linear_ne(
    engine: &mut Engine,
    props: &mut PropagatorStore,
    r: Atom,
    cs: &[i64],
    vs: &[IntVar],
    k: i64,
) -> bool {
    debug_assert_eq!(cs.len(), vs.len());
    debug_assert!(vs.len() >= 2);
    if engine.state.is_inconsistent_root(r) {
        return true;
    }
    let id = props.next_id();
    let mut terms = Vec::with_capacity(vs.len());
    let mut perm = Vec::with_capacity(vs.len());
    for (i, (&c, &x)) in cs.iter().zip(vs).enumerate() {
        debug_assert_ne!(c, 0);
        terms.push(Term { c, x });
        perm.push(i);
    }
    // Watch the first two unfixed terms; with fewer, track the survivor's
    // bounds so the excluded value is caught when the domain shrinks onto
    // it.
    let mut free = 0usize;
    for i in 0..perm.len() {
        if !engine.is_fixed(terms[perm[i]].x) {
            perm.swap(free, i);
            free += 1;
            if free == 2 {
                break;
            }
        }
    }
    for &wi in perm.iter().take(free.min(2)) {
        engine.attach_var(terms[wi].x, Event::Fix, Watch::new(id, wi as u32).idem());
    }
    if free == 1 {
        let wi = perm[0];
        engine.attach_var(
            terms[wi].x,
            Event::LbUb,
            Watch::new(id, NE_TAG_BOUND | wi as u32).idem(),
        );
    }
    let r_root = engine.state.is_entailed_root(r);
    if !r_root {
        engine.attach_atom(r, Watch::new(id, NE_TAG_R));
    }
    props.register(
        engine,
        Box::new(IntLinearNe {
            r,
            r_root,
            vs: terms,
            k,
            perm,
        }),
    );
    true
}
