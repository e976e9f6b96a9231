//! Half-Reified Ordering.
//!
//! `PredLeHr` implements `r → x + kx ≤ y + ky` directly on the raw tick
//! scale. While `r` is undecided the propagator stays dormant behind a
//! single moving cut: two expirable watches straddle the midpoint of
//! `[lb(x)+kx, ub(y)+ky]` and are re-aimed as the gap narrows, so detecting
//! that the ordering has become impossible (which forces `¬r`) costs one
//! watch instead of full bound tracking. Once `r` holds, real LB/UB watches
//! are installed and the two bounds chase each other.

use tracing::trace;

use oxicp_core::{pval_inv, Atom, PredId, Pval};
use oxicp_engine::{
    Engine, PropId, Propagator, PropagatorStore, Reason, TrailedSlot, Watch, WatchRes,
};

const S_ACTIVE: u64 = 1;
const S_RED: u64 = 2;

const P_LB: u8 = 1;
const P_UB: u8 = 2;
const P_LU: u8 = P_LB | P_UB;
const P_DEACT: u8 = 4;

const TAG_R: u32 = u32::MAX;
const TAG_WAKE_R: u32 = u32::MAX - 1;
const EX_X: u32 = 0;
const EX_Y: u32 = 1;
const WAKE_X: u32 = 1 << 31;
const WAKE_Y: u32 = WAKE_X + 1;
/// Failure-watch tags carry their generation below the named-tag range.
const GEN_MASK: u32 = (1 << 30) - 1;

fn ge_atom(p: PredId, v: Pval) -> Atom {
    Atom::new(p, v)
}

fn le_atom(p: PredId, v: Pval) -> Atom {
    !Atom::new(p, v + 1)
}

/// Half-reified `x + kx ≤ y + ky` over raw predicates.
pub struct PredLeHr {
    r: Atom,
    x: PredId,
    y: PredId,
    kx: Pval,
    ky: Pval,
    state: TrailedSlot,
    /// Separator tick for the deactivation explanation.
    sep: TrailedSlot,
    mode: u8,
    fwatch_gen: u32,
    attached: [bool; 2],
}

impl PredLeHr {
    fn pred_lb(&self, engine: &Engine, p: PredId) -> Pval {
        engine.state.p_vals[p.idx()]
    }

    fn pred_ub(&self, engine: &Engine, p: PredId) -> Pval {
        pval_inv(engine.state.p_vals[p.inv().idx()])
    }

    fn choose_cut(&self, engine: &Engine) -> Pval {
        let lo = self.pred_lb(engine, self.x) + self.kx;
        let hi = self.pred_ub(engine, self.y) + self.ky;
        debug_assert!(lo <= hi);
        lo + (hi - lo) / 2
    }

    fn attach_fail_watches(&mut self, engine: &mut Engine, me: PropId) {
        let cut = self.choose_cut(engine);
        let gen = self.fwatch_gen & GEN_MASK;
        engine.attach_atom(
            ge_atom(self.x, cut - self.kx + 1),
            Watch::new(me, gen << 1).idem(),
        );
        engine.attach_atom(
            le_atom(self.y, (cut - self.ky).saturating_sub(1)),
            Watch::new(me, (gen << 1) | 1).idem(),
        );
    }
}

impl Propagator for PredLeHr {
    fn wake(&mut self, engine: &mut Engine, me: PropId, tag: u32) -> WatchRes {
        let st = engine.scalar(self.state);
        match tag {
            TAG_WAKE_R => {
                if st & S_RED != 0 {
                    return WatchRes::Keep;
                }
                if !self.attached[0] {
                    engine.attach_pred(self.x, Watch::new(me, WAKE_X).idem());
                    self.attached[0] = true;
                }
                if !self.attached[1] {
                    engine.attach_pred(self.y.inv(), Watch::new(me, WAKE_Y).idem());
                    self.attached[1] = true;
                }
                engine.set_scalar(self.state, st | S_ACTIVE);
                self.mode |= P_LU;
                engine.queue_prop(me);
                WatchRes::Keep
            }
            WAKE_X | WAKE_Y => {
                if st & S_RED != 0 {
                    return WatchRes::Keep;
                }
                if st & S_ACTIVE == 0 {
                    // Backtracked past the activation: let the watch go.
                    self.attached[(tag - WAKE_X) as usize] = false;
                    return WatchRes::Drop;
                }
                self.mode |= if tag == WAKE_X { P_LB } else { P_UB };
                engine.queue_prop(me);
                WatchRes::Keep
            }
            _ => {
                // Failure watch: tag carries its generation.
                if tag >> 1 != self.fwatch_gen & GEN_MASK {
                    return WatchRes::Drop;
                }
                if st & (S_ACTIVE | S_RED) != 0 {
                    return WatchRes::Keep;
                }
                if self.pred_lb(engine, self.x) + self.kx > self.pred_ub(engine, self.y) + self.ky {
                    self.mode |= P_DEACT;
                    engine.queue_prop(me);
                    return WatchRes::Keep;
                }
                self.fwatch_gen += 1;
                self.attach_fail_watches(engine, me);
                WatchRes::Drop
            }
        }
    }

    fn propagate(&mut self, engine: &mut Engine, me: PropId) -> bool {
        trace!("running pred_le_hr");
        let st = engine.scalar(self.state);
        if st & S_RED != 0 {
            return true;
        }
        if self.mode & P_DEACT != 0 && st & S_ACTIVE == 0 {
            let lbx = self.pred_lb(engine, self.x) + self.kx;
            if lbx > self.pred_ub(engine, self.y) + self.ky {
                engine.set_scalar(self.sep, lbx);
                let r = Reason::Thunk {
                    prop: me,
                    tag: TAG_R,
                    btpred: false,
                };
                if !engine.enqueue(!self.r, r) {
                    return false;
                }
                engine.set_scalar(self.state, st | S_RED);
            }
            return true;
        }
        if st & S_ACTIVE == 0 {
            return true;
        }
        if self.mode & P_LB != 0 {
            let lbx = self.pred_lb(engine, self.x) + self.kx;
            if lbx > self.pred_lb(engine, self.y) + self.ky {
                let r = Reason::Thunk {
                    prop: me,
                    tag: EX_Y,
                    btpred: false,
                };
                if !engine.enqueue(ge_atom(self.y, lbx - self.ky), r) {
                    return false;
                }
            }
        }
        if self.mode & P_UB != 0 {
            let uby = self.pred_ub(engine, self.y) + self.ky;
            if uby < self.pred_ub(engine, self.x) + self.kx {
                let r = Reason::Thunk {
                    prop: me,
                    tag: EX_X,
                    btpred: false,
                };
                if !engine.enqueue(le_atom(self.x, uby - self.kx), r) {
                    return false;
                }
            }
        }
        true
    }

    fn cleanup(&mut self) {
        self.mode = 0;
    }

    fn root_simplify(&mut self, engine: &mut Engine) {
        if self.pred_ub(engine, self.x) + self.kx <= self.pred_lb(engine, self.y) + self.ky
            || engine.state.is_inconsistent(self.r)
        {
            engine.set_scalar(self.state, S_RED);
            return;
        }
        if engine.state.is_entailed(self.r) {
            engine.set_scalar(self.state, S_ACTIVE);
        }
    }

    fn explain(&self, engine: &Engine, tag: u32, val: Pval, out: &mut Vec<Atom>) {
        match tag {
            TAG_R => {
                let sep = engine.scalar(self.sep);
                out.push(le_atom(self.x, sep - self.kx - 1));
                out.push(ge_atom(self.y, sep - self.ky));
            }
            EX_Y => {
                // y ≥ val because x + kx ≥ val + ky.
                out.push(!self.r);
                out.push(le_atom(self.x, val + self.ky - self.kx - 1));
            }
            EX_X => {
                // x ≤ inv(val) because y + ky ≤ inv(val) + kx.
                out.push(!self.r);
                out.push(ge_atom(self.y, pval_inv(val) + self.kx - self.ky + 1));
            }
            _ => debug_assert!(false, "unknown pred_le tag"),
        }
    }
}

/// Post `r → x ≤ y + k` over integer variables.
pub fn int_le(
    engine: &mut Engine,
    props: &mut PropagatorStore,
    x: oxicp_core::IntVar,
    y: oxicp_core::IntVar,
    k: i64,
    r: Atom,
) -> bool {
    if !engine.ok {
        return false;
    }
    if engine.state.is_inconsistent_root(r) {
        return true;
    }
    let d = k + y.off - x.off;
    let (kx, ky) = if d < 0 {
        ((-d) as Pval, 0)
    } else {
        (0, d as Pval)
    };
    let lbx = engine.state.p_vals[x.pid.idx()] + kx;
    let uby = pval_inv(engine.state.p_vals[y.pid.inv().idx()]) + ky;
    if lbx > uby {
        // Unsatisfiable ordering: r is forced off.
        return engine.post(!r);
    }
    let ubx = pval_inv(engine.state.p_vals[x.pid.inv().idx()]) + kx;
    let lby = engine.state.p_vals[y.pid.idx()] + ky;
    if ubx <= lby {
        // Already entailed regardless of r.
        return true;
    }
    let id = props.next_id();
    let mut prop = PredLeHr {
        r,
        x: x.pid,
        y: y.pid,
        kx,
        ky,
        state: engine.alloc_scalar(0),
        sep: engine.alloc_scalar(0),
        mode: 0,
        fwatch_gen: 0,
        attached: [false, false],
    };
    if engine.state.is_entailed_root(r) {
        engine.attach_pred(x.pid, Watch::new(id, WAKE_X).idem());
        engine.attach_pred(y.pid.inv(), Watch::new(id, WAKE_Y).idem());
        prop.attached = [true, true];
        engine.set_scalar(prop.state, S_ACTIVE);
        prop.mode = P_LU;
    } else {
        prop.attach_fail_watches(engine, id);
        engine.attach_atom(r, Watch::new(id, TAG_WAKE_R).idem());
    }
    props.register(engine, Box::new(prop));
    true
}

/// Post `r → x = y` as two half-reified orderings.
pub fn int_eq(
    engine: &mut Engine,
    props: &mut PropagatorStore,
    x: oxicp_core::IntVar,
    y: oxicp_core::IntVar,
    r: Atom,
) -> bool {
    int_le(engine, props, x, y, 0, r) && int_le(engine, props, y, x, 0, r)
}

/// Post `b ↔ x ≤ y + k`.
pub fn int_le_reif(
    engine: &mut Engine,
    props: &mut PropagatorStore,
    x: oxicp_core::IntVar,
    y: oxicp_core::IntVar,
    k: i64,
    b: Atom,
) -> bool {
    int_le(engine, props, x, y, k, b) && int_le(engine, props, y, x, -k - 1, !b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxicp_engine::{propagate, SolverConfig};

    fn fixture() -> (Engine, PropagatorStore) {
        (Engine::new(SolverConfig::default()), PropagatorStore::default())
    }

    #[test]
    fn test_le_active_propagates_bounds() {
        let (mut engine, mut props) = fixture();
        let x = engine.new_intvar(0, 10);
        let y = engine.new_intvar(0, 10);
        assert!(int_le(&mut engine, &mut props, x, y, 0, Atom::TRUE));
        assert!(propagate(&mut engine, &mut props));

        engine.push_level();
        assert!(engine.enqueue(x.ge(4), Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        assert_eq!(engine.lb(y), 4);

        engine.push_level();
        assert!(engine.enqueue(y.le(6), Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        assert_eq!(engine.ub(x), 6);

        engine.bt_to_level(0);
        assert_eq!(engine.lb(y), 0);
        assert_eq!(engine.ub(x), 10);
    }

    #[test]
    fn test_le_deactivation_forces_reif_off() {
        let (mut engine, mut props) = fixture();
        let x = engine.new_intvar(0, 10);
        let y = engine.new_intvar(0, 10);
        let b = engine.new_bool();
        assert!(int_le(&mut engine, &mut props, x, y, 0, b));
        assert!(propagate(&mut engine, &mut props));

        engine.push_level();
        assert!(engine.enqueue(x.ge(8), Reason::Decision));
        assert!(engine.enqueue(y.le(2), Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        // x ≤ y is impossible now, so b is off.
        assert!(engine.state.is_inconsistent(b));

        engine.bt_to_level(0);
        assert!(!engine.state.is_inconsistent(b));
    }

    #[test]
    fn test_le_reif_both_directions() {
        let (mut engine, mut props) = fixture();
        let x = engine.new_intvar(0, 10);
        let y = engine.new_intvar(5, 5);
        let b = engine.new_bool();
        // b ↔ x ≤ 5.
        assert!(int_le_reif(&mut engine, &mut props, x, y, 0, b));
        assert!(propagate(&mut engine, &mut props));

        engine.push_level();
        assert!(engine.enqueue(b, Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        assert_eq!(engine.ub(x), 5);
        engine.bt_to_level(0);

        engine.push_level();
        assert!(engine.enqueue(!b, Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        // ¬b → x > 5.
        assert_eq!(engine.lb(x), 6);
        engine.bt_to_level(0);
    }

    #[test]
    fn test_le_root_entailed_is_dropped() {
        let (mut engine, mut props) = fixture();
        let x = engine.new_intvar(0, 3);
        let y = engine.new_intvar(5, 10);
        let before = props.len();
        assert!(int_le(&mut engine, &mut props, x, y, 0, Atom::TRUE));
        assert_eq!(props.len(), before);
    }

    #[test]
    fn test_le_root_impossible_forces_r() {
        let (mut engine, mut props) = fixture();
        let x = engine.new_intvar(8, 10);
        let y = engine.new_intvar(0, 2);
        let b = engine.new_bool();
        assert!(int_le(&mut engine, &mut props, x, y, 0, b));
        assert!(engine.state.is_inconsistent(b));
    }
}
