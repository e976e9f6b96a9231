//! Boolean Linear Sums.
//!
//! `BoolLinGe` maintains `r → c_z·z ≥ k + Σ cᵢ·bᵢ`. Terms are normalized to
//! positive coefficients (negative ones flip their literal into the
//! constant) and sorted by descending weight. The accumulated lower bound of
//! the sum is a trailed scalar bumped as watched literals become true; a
//! trailed head index skips dead terms, and every tail literal whose weight
//! exceeds the remaining slack is forced off.

use tracing::trace;

use oxicp_core::{Atom, IntVar, Pval};
use oxicp_engine::{
    Engine, Event, PropId, Propagator, PropagatorStore, Reason, TrailedSlot, Watch,
};

use crate::product::iceil;

const TAG_WAKE_ZR: u32 = u32::MAX;
const EX_R: u32 = u32::MAX;
const EX_Z: u32 = u32::MAX - 1;

#[derive(Debug, Clone, Copy)]
struct BTerm {
    c: i64,
    x: Atom,
}

/// Half-reified `c_z·z ≥ k + Σ cᵢ·bᵢ`.
pub struct BoolLinGe {
    r: Atom,
    r_root: bool,
    c_z: i64,
    z: IntVar,
    /// Terms sorted by descending coefficient.
    xs: Vec<BTerm>,
    k: i64,
    /// Trailed accumulated lower bound of `k + Σ cᵢ·bᵢ`.
    low: TrailedSlot,
    /// Trailed head index past permanently false terms.
    idx: TrailedSlot,
}

impl BoolLinGe {
    fn low(&self, engine: &Engine) -> i64 {
        engine.scalar(self.low) as i64
    }
}

impl Propagator for BoolLinGe {
    fn wake(&mut self, engine: &mut Engine, me: PropId, tag: u32) -> oxicp_engine::WatchRes {
        if tag != TAG_WAKE_ZR {
            let low = self.low(engine) + self.xs[tag as usize].c;
            engine.set_scalar(self.low, low as u64);
        }
        engine.queue_prop(me);
        oxicp_engine::WatchRes::Keep
    }

    fn propagate(&mut self, engine: &mut Engine, me: PropId) -> bool {
        trace!("running bool_lin_ge");
        let low = self.low(engine);
        if self.c_z * engine.ub(self.z) < low {
            let r = Reason::Thunk {
                prop: me,
                tag: EX_R,
                btpred: true,
            };
            if !engine.enqueue(!self.r, r) {
                return false;
            }
        }
        if !engine.state.is_entailed(self.r) {
            return true;
        }
        if self.c_z * engine.lb(self.z) < low {
            let r = Reason::Thunk {
                prop: me,
                tag: EX_Z,
                btpred: true,
            };
            if !engine.set_lb(self.z, iceil(low, self.c_z), r) {
                return false;
            }
        }
        let mut i = engine.scalar(self.idx) as usize;
        let start = i;
        while i < self.xs.len() && engine.state.is_inconsistent(self.xs[i].x) {
            i += 1;
        }
        if i != start {
            engine.set_scalar(self.idx, i as u64);
        }
        let cap = self.c_z * engine.ub(self.z) - low;
        while i < self.xs.len() {
            let t = self.xs[i];
            if t.c <= cap {
                break;
            }
            if !engine.state.is_entailed(t.x) && !engine.state.is_inconsistent(t.x) {
                let r = Reason::Thunk {
                    prop: me,
                    tag: i as u32,
                    btpred: true,
                };
                if !engine.enqueue(!t.x, r) {
                    return false;
                }
            }
            i += 1;
        }
        true
    }

    fn explain(&self, engine: &Engine, tag: u32, val: Pval, out: &mut Vec<Atom>) {
        match tag {
            EX_R => {
                out.push(self.z.gt(engine.ub(self.z)));
                let mut cap = self.c_z * engine.ub(self.z) - self.k;
                if cap < 0 {
                    return;
                }
                for t in &self.xs {
                    if engine.state.is_entailed(t.x) {
                        out.push(!t.x);
                        if cap < t.c {
                            return;
                        }
                        cap -= t.c;
                    }
                }
                debug_assert!(false, "deactivation without a covering set");
            }
            EX_Z => {
                let v = self.z.lb_of_pval(val);
                if !self.r_root {
                    out.push(!self.r);
                }
                let mut cap = 1 + self.c_z * (v - 1) - self.k;
                if cap <= 0 {
                    return;
                }
                for t in &self.xs {
                    if engine.state.is_entailed(t.x) {
                        out.push(!t.x);
                        if cap <= t.c {
                            return;
                        }
                        cap -= t.c;
                    }
                }
                debug_assert!(false, "z bound without a covering set");
            }
            _ => {
                let xi = tag as usize;
                if !self.r_root {
                    out.push(!self.r);
                }
                let c_xi = self.xs[xi].c;
                if self.c_z * engine.ub(self.z) < self.k + c_xi {
                    out.push(self.z.ge(iceil(self.k + c_xi, self.c_z)));
                    return;
                }
                out.push(self.z.gt(engine.ub(self.z)));
                let cap = self.c_z * engine.ub(self.z) - self.k;
                let mut total = c_xi;
                for t in &self.xs {
                    if engine.state.is_entailed(t.x) {
                        total += t.c;
                        out.push(!t.x);
                        if total > cap {
                            return;
                        }
                    }
                }
                debug_assert!(false, "forced literal without a covering set");
            }
        }
    }
}

/// Post `r → c_z·z ≥ k + Σ terms`.
pub fn bool_lin_ge(
    engine: &mut Engine,
    props: &mut PropagatorStore,
    r: Atom,
    c_z: i64,
    z: IntVar,
    terms: &[(i64, Atom)],
    k: i64,
) -> bool {
    debug_assert!(c_z > 0);
    if !engine.ok {
        return false;
    }
    if engine.state.is_inconsistent_root(r) {
        return true;
    }
    let id = props.next_id();
    let mut k = k;
    let mut xs: Vec<BTerm> = Vec::with_capacity(terms.len());
    for &(c, b) in terms {
        if c == 0 || engine.state.is_inconsistent_root(b) {
            continue;
        }
        if engine.state.is_entailed_root(b) {
            k += c;
            continue;
        }
        let (c, b) = if c < 0 {
            k += c;
            (-c, !b)
        } else {
            (c, b)
        };
        xs.push(BTerm { c, x: b });
    }
    xs.sort_by(|a, b| b.c.cmp(&a.c));

    let z_idem = xs.iter().all(|t| t.x.pid.pair() != z.pid.pair());
    let zw = Watch::new(id, TAG_WAKE_ZR);
    engine.attach_var(z, Event::Ub, if z_idem { zw.idem() } else { zw });
    for (ti, t) in xs.iter().enumerate() {
        engine.attach_atom(t.x, Watch::new(id, ti as u32));
    }
    let r_root = engine.state.is_entailed_root(r);
    if !r_root {
        engine.attach_atom(r, Watch::new(id, TAG_WAKE_ZR));
    }
    let low = engine.alloc_scalar(k as u64);
    let idx = engine.alloc_scalar(0);
    let prop = BoolLinGe {
        r,
        r_root,
        c_z,
        z,
        xs,
        k,
        low,
        idx,
    };
    if r_root && c_z * engine.lb(z) < k && !engine.set_lb(z, iceil(k, c_z), Reason::Decision) {
        engine.ok = false;
        return false;
    }
    props.register(engine, Box::new(prop));
    true
}

/// Post `r → at most k of the atoms hold`.
pub fn atmost(
    engine: &mut Engine,
    props: &mut PropagatorStore,
    r: Atom,
    atoms: &[Atom],
    k: i64,
) -> bool {
    let z = engine.new_intvar(k, k);
    let terms: Vec<(i64, Atom)> = atoms.iter().map(|&b| (1, b)).collect();
    bool_lin_ge(engine, props, r, 1, z, &terms, 0)
}

/// Post `r → at least k of the atoms hold`.
pub fn atleast(
    engine: &mut Engine,
    props: &mut PropagatorStore,
    r: Atom,
    atoms: &[Atom],
    k: i64,
) -> bool {
    let negated: Vec<Atom> = atoms.iter().map(|&b| !b).collect();
    atmost(engine, props, r, &negated, atoms.len() as i64 - k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxicp_engine::{propagate, SolverConfig};

    fn fixture() -> (Engine, PropagatorStore) {
        (Engine::new(SolverConfig::default()), PropagatorStore::default())
    }

    #[test]
    fn test_sum_drives_z_lower_bound() {
        let (mut engine, mut props) = fixture();
        let z = engine.new_intvar(0, 10);
        let a = engine.new_bool();
        let b = engine.new_bool();
        // z ≥ 2a + 3b.
        assert!(bool_lin_ge(
            &mut engine,
            &mut props,
            Atom::TRUE,
            1,
            z,
            &[(2, a), (3, b)],
            0
        ));
        assert!(propagate(&mut engine, &mut props));
        assert_eq!(engine.lb(z), 0);

        engine.push_level();
        assert!(engine.enqueue(b, Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        assert_eq!(engine.lb(z), 3);

        engine.push_level();
        assert!(engine.enqueue(a, Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        assert_eq!(engine.lb(z), 5);

        engine.bt_to_level(0);
        assert_eq!(engine.lb(z), 0);
    }

    #[test]
    fn test_tight_cap_forces_literals_off() {
        let (mut engine, mut props) = fixture();
        let z = engine.new_intvar(0, 4);
        let a = engine.new_bool();
        let b = engine.new_bool();
        let c = engine.new_bool();
        assert!(bool_lin_ge(
            &mut engine,
            &mut props,
            Atom::TRUE,
            1,
            z,
            &[(3, a), (3, b), (1, c)],
            0
        ));
        assert!(propagate(&mut engine, &mut props));

        engine.push_level();
        assert!(engine.enqueue(a, Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        // low = 3, cap = 4 - 3 = 1: b (weight 3) is forced off, c is not.
        assert!(engine.state.is_inconsistent(b));
        assert!(!engine.state.is_inconsistent(c));
    }

    #[test]
    fn test_atmost_cardinality() {
        let (mut engine, mut props) = fixture();
        let bs: Vec<Atom> = (0..3).map(|_| engine.new_bool()).collect();
        assert!(atmost(&mut engine, &mut props, Atom::TRUE, &bs, 1));
        assert!(propagate(&mut engine, &mut props));

        engine.push_level();
        assert!(engine.enqueue(bs[0], Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        assert!(engine.state.is_inconsistent(bs[1]));
        assert!(engine.state.is_inconsistent(bs[2]));
    }

    #[test]
    fn test_atleast_cardinality() {
        let (mut engine, mut props) = fixture();
        let bs: Vec<Atom> = (0..3).map(|_| engine.new_bool()).collect();
        assert!(atleast(&mut engine, &mut props, Atom::TRUE, &bs, 2));
        assert!(propagate(&mut engine, &mut props));

        engine.push_level();
        assert!(engine.enqueue(!bs[0], Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        assert!(engine.state.is_entailed(bs[1]));
        assert!(engine.state.is_entailed(bs[2]));
    }
}
