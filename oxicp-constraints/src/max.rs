//! Maximum of a Variable Array.
//!
//! `z = max(xs)`. A sparse set of candidates (`maybe_max`, those whose upper
//! bound still reaches `lb(z)`) is maintained with a trailed size, so
//! backtracking restores candidacy for free. `ub(z)` follows the largest
//! candidate upper bound, `lb(z)` follows any grown lower bound, every
//! candidate inherits `ub(z)`, and when a single candidate survives it
//! inherits `lb(z)`. Explanations separate the removed candidates from the
//! support with the inference-time `lb(z)` threshold.

use tracing::trace;

use oxicp_core::{Atom, IntVar, Pval};
use oxicp_engine::{
    Engine, Event, PropId, Propagator, PropagatorStore, Reason, TrailedSlot, Watch,
};

use crate::sparse_set::SparseSet;

const EV_LB: u8 = 1;
const EV_UB: u8 = 2;

const TAG_Z_LB: u32 = 0;
const TAG_Z_UB: u32 = 1;
const TAG_X_BASE: u32 = 2;

const EX_Z_LB: u32 = 0 << 28; // + xi
const EX_Z_UB: u32 = 1 << 28;
const EX_XI_LB: u32 = 2 << 28; // + xi
const EX_XI_UB: u32 = 3 << 28; // + xi
const EX_MASK: u32 = 3 << 28;

/// Simple membership set with a change list, cleared per pass.
#[derive(Debug, Default)]
struct ChangeSet {
    mask: Vec<bool>,
    list: Vec<u32>,
}

impl ChangeSet {
    fn grow(n: usize) -> Self {
        Self {
            mask: vec![false; n],
            list: Vec::new(),
        }
    }

    fn add(&mut self, k: u32) {
        if !self.mask[k as usize] {
            self.mask[k as usize] = true;
            self.list.push(k);
        }
    }

    fn clear(&mut self) {
        for k in self.list.drain(..) {
            self.mask[k as usize] = false;
        }
    }
}

/// `z = max(xs)`.
pub struct IMax {
    z: IntVar,
    xs: Vec<IntVar>,
    /// Candidate set; size lives in `mm_size`.
    maybe_max: SparseSet,
    mm_size: TrailedSlot,
    /// Candidate currently supporting `ub(z)`.
    ub_supp: TrailedSlot,

    // Transient per-pass state.
    z_change: u8,
    supp_change: u8,
    lb_change: ChangeSet,
}

impl IMax {
    fn remove_candidate(&mut self, engine: &mut Engine, xi: u32) {
        let size = engine.scalar(self.mm_size) as usize;
        self.maybe_max.remove(size, xi);
        engine.set_scalar(self.mm_size, (size - 1) as u64);
    }

    fn propagate_z_ub(&mut self, engine: &mut Engine, me: PropId) -> bool {
        let size = engine.scalar(self.mm_size) as usize;
        let mut seen_var = engine.scalar(self.ub_supp) as u32;
        let mut seen_ub = engine.ub(self.xs[seen_var as usize]);
        for xi in self.maybe_max.iter(size) {
            let ub = engine.ub(self.xs[xi as usize]);
            if ub > seen_ub {
                seen_var = xi;
                seen_ub = ub;
            }
        }
        if seen_ub < engine.ub(self.z) {
            let r = Reason::Thunk {
                prop: me,
                tag: EX_Z_UB,
                btpred: true,
            };
            if !engine.set_ub(self.z, seen_ub, r) {
                return false;
            }
        }
        if seen_var != engine.scalar(self.ub_supp) as u32 {
            engine.set_scalar(self.ub_supp, u64::from(seen_var));
        }
        true
    }

    fn propagate_xs_lb(&mut self, engine: &mut Engine, me: PropId) -> bool {
        let z_lb = engine.lb(self.z);
        let mut i = 0;
        let supp;
        loop {
            let size = engine.scalar(self.mm_size) as usize;
            if i >= size {
                // Every candidate upper bound fell below lb(z).
                let mut confl = std::mem::take(&mut engine.confl);
                confl.clear();
                confl.push(self.z.lt(z_lb));
                for &x in &self.xs {
                    confl.push(x.ge(z_lb));
                }
                engine.confl = confl;
                return false;
            }
            let xi = self.maybe_max.at(i);
            if engine.ub(self.xs[xi as usize]) < z_lb {
                self.remove_candidate(engine, xi);
                continue;
            }
            if engine.lb(self.xs[xi as usize]) == z_lb {
                // A candidate already reaches lb(z): nothing to force.
                return true;
            }
            supp = xi;
            break;
        }
        i += 1;
        loop {
            let size = engine.scalar(self.mm_size) as usize;
            if i >= size {
                break;
            }
            let xi = self.maybe_max.at(i);
            if engine.ub(self.xs[xi as usize]) < z_lb {
                self.remove_candidate(engine, xi);
                continue;
            }
            // Two candidates remain.
            return true;
        }
        // Unique candidate: it must reach lb(z).
        let r = Reason::Thunk {
            prop: me,
            tag: EX_XI_LB | supp,
            btpred: true,
        };
        engine.set_lb(self.xs[supp as usize], z_lb, r)
    }
}

impl Propagator for IMax {
    fn wake(&mut self, engine: &mut Engine, me: PropId, tag: u32) -> oxicp_engine::WatchRes {
        match tag {
            TAG_Z_LB => {
                self.z_change |= EV_LB;
                engine.queue_prop(me);
            }
            TAG_Z_UB => {
                self.z_change |= EV_UB;
                engine.queue_prop(me);
            }
            _ => {
                let t = tag - TAG_X_BASE;
                let xi = t >> 1;
                if t & 1 == 1 {
                    // Upper-bound drop matters only for the support.
                    if xi == engine.scalar(self.ub_supp) as u32 {
                        self.supp_change = EV_UB;
                        engine.queue_prop(me);
                    }
                } else {
                    self.lb_change.add(xi);
                    engine.queue_prop(me);
                }
            }
        }
        oxicp_engine::WatchRes::Keep
    }

    fn propagate(&mut self, engine: &mut Engine, me: PropId) -> bool {
        trace!("running imax");
        if self.z_change & EV_UB != 0 {
            let z_ub = engine.ub(self.z);
            let size = engine.scalar(self.mm_size) as usize;
            for i in 0..size {
                let xi = self.maybe_max.at(i);
                if z_ub < engine.ub(self.xs[xi as usize]) {
                    let r = Reason::Thunk {
                        prop: me,
                        tag: EX_XI_UB | xi,
                        btpred: true,
                    };
                    if !engine.set_ub(self.xs[xi as usize], z_ub, r) {
                        return false;
                    }
                }
            }
        }
        let mut z_lb = engine.lb(self.z);
        let lb_changed: Vec<u32> = self.lb_change.list.clone();
        for xi in lb_changed {
            if engine.lb(self.xs[xi as usize]) > z_lb {
                z_lb = engine.lb(self.xs[xi as usize]);
                let r = Reason::Thunk {
                    prop: me,
                    tag: EX_Z_LB | xi,
                    btpred: true,
                };
                if !engine.set_lb(self.z, z_lb, r) {
                    return false;
                }
            }
        }
        if self.supp_change & EV_UB != 0 && !self.propagate_z_ub(engine, me) {
            return false;
        }
        if self.z_change & EV_LB != 0 && !self.propagate_xs_lb(engine, me) {
            return false;
        }
        true
    }

    fn cleanup(&mut self) {
        self.z_change = 0;
        self.supp_change = 0;
        self.lb_change.clear();
    }

    fn explain(&self, engine: &Engine, tag: u32, val: Pval, out: &mut Vec<Atom>) {
        let xi = (tag & !EX_MASK) as usize;
        match tag & EX_MASK {
            EX_Z_LB => {
                let v = self.z.lb_of_pval(val);
                out.push(self.xs[xi].lt(v));
            }
            EX_Z_UB => {
                let v = self.z.ub_of_pval(val);
                for &x in &self.xs {
                    out.push(x.gt(v));
                }
            }
            EX_XI_LB => {
                // Every non-support upper bound sat below lb(z) when the
                // entry was made, so the inference-time lb(z) separates.
                let v = self.xs[xi].lb_of_pval(val);
                let sep = engine.lb(self.z).max(v);
                out.push(self.z.lt(sep));
                for (j, &x) in self.xs.iter().enumerate() {
                    if j != xi {
                        out.push(x.ge(sep));
                    }
                }
            }
            _ => {
                debug_assert_eq!(tag & EX_MASK, EX_XI_UB);
                let v = self.xs[xi].ub_of_pval(val);
                out.push(self.z.gt(v));
            }
        }
    }
}

/// Post `z = max(xs)`.
pub fn int_max(
    engine: &mut Engine,
    props: &mut PropagatorStore,
    z: IntVar,
    xs: &[IntVar],
) -> bool {
    debug_assert!(!xs.is_empty());
    if !engine.ok {
        return false;
    }
    let id = props.next_id();
    engine.attach_var(z, Event::Lb, Watch::new(id, TAG_Z_LB).idem());
    engine.attach_var(z, Event::Ub, Watch::new(id, TAG_Z_UB).idem());
    let mut ub_supp = 0u32;
    for (i, &x) in xs.iter().enumerate() {
        if engine.ub(x) > engine.ub(xs[ub_supp as usize]) {
            ub_supp = i as u32;
        }
        engine.attach_var(x, Event::Lb, Watch::new(id, TAG_X_BASE + ((i as u32) << 1)).idem());
        engine.attach_var(
            x,
            Event::Ub,
            Watch::new(id, TAG_X_BASE + (((i as u32) << 1) | 1)).idem(),
        );
    }
    let n = xs.len();
    let mut lb_change = ChangeSet::grow(n);
    for i in 0..n as u32 {
        lb_change.add(i);
    }
    let prop = IMax {
        z,
        xs: xs.to_vec(),
        maybe_max: SparseSet::new(n),
        mm_size: engine.alloc_scalar(n as u64),
        ub_supp: engine.alloc_scalar(u64::from(ub_supp)),
        z_change: EV_LB | EV_UB,
        supp_change: EV_UB,
        lb_change,
    };
    props.register(engine, Box::new(prop));
    true
}
