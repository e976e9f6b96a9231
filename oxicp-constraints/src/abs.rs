//! Absolute Value.
//!
//! `z = |x|`: the feasible values of `x` are the union
//! `[-ub(z), -lb(z)] ∪ [lb(z), ub(z)]` intersected with `x`'s domain, and
//! `z` ranges over the magnitudes the surviving branches allow. Both
//! directions propagate mutually; `z ≥ 0` is posted at the root.

use tracing::trace;

use oxicp_core::{Atom, IntVar, Pval};
use oxicp_engine::{Engine, Event, PropId, Propagator, PropagatorStore, Reason, Watch};

const TAG_Z_LB_POS: u32 = 0;
const TAG_Z_LB_NEG: u32 = 1;
const TAG_Z_UB: u32 = 2;
const TAG_X_LB: u32 = 3;
const TAG_X_UB: u32 = 4;

fn merge(hull: &mut Option<(i64, i64)>, lo: i64, hi: i64) {
    *hull = Some(match *hull {
        None => (lo, hi),
        Some((l, h)) => (l.min(lo), h.max(hi)),
    });
}

/// `z = |x|`.
pub struct IAbs {
    z: IntVar,
    x: IntVar,
}

impl Propagator for IAbs {
    fn propagate(&mut self, engine: &mut Engine, me: PropId) -> bool {
        trace!("running iabs");
        let thunk = |tag: u32| Reason::Thunk {
            prop: me,
            tag,
            btpred: true,
        };
        let (zl, zu) = (engine.lb(self.z), engine.ub(self.z));
        let (xl, xu) = (engine.lb(self.x), engine.ub(self.x));

        let mut xf: Option<(i64, i64)> = None;
        let mut zf: Option<(i64, i64)> = None;
        if xl < 0 {
            // Negative branch: z = -x.
            let lo = xl.max(-zu);
            let hi = xu.min(-1).min(-zl);
            if lo <= hi {
                merge(&mut xf, lo, hi);
                merge(&mut zf, -hi, -lo);
            }
        }
        if xu >= 0 {
            // Nonnegative branch: z = x.
            let lo = xl.max(0).max(zl);
            let hi = xu.min(zu);
            if lo <= hi {
                merge(&mut xf, lo, hi);
                merge(&mut zf, lo, hi);
            }
        }
        let Some((xlo, xhi)) = xf else {
            let mut confl = std::mem::take(&mut engine.confl);
            confl.clear();
            confl.push(self.z.lt(zl));
            confl.push(self.z.gt(zu));
            confl.push(self.x.lt(xl));
            confl.push(self.x.gt(xu));
            engine.confl = confl;
            return false;
        };
        let (zlo, zhi) = zf.expect("x and z hulls are filled together");

        if zhi < zu && !engine.set_ub(self.z, zhi, thunk(TAG_Z_UB)) {
            return false;
        }
        if zlo > zl {
            let tag = if xl >= 0 { TAG_Z_LB_POS } else { TAG_Z_LB_NEG };
            if !engine.set_lb(self.z, zlo, thunk(tag)) {
                return false;
            }
        }
        if xhi < xu && !engine.set_ub(self.x, xhi, thunk(TAG_X_UB)) {
            return false;
        }
        if xlo > xl && !engine.set_lb(self.x, xlo, thunk(TAG_X_LB)) {
            return false;
        }
        true
    }

    fn explain(&self, _engine: &Engine, tag: u32, val: Pval, out: &mut Vec<Atom>) {
        match tag {
            TAG_Z_LB_POS => {
                let v = self.z.lb_of_pval(val);
                out.push(self.x.lt(v));
            }
            TAG_Z_LB_NEG => {
                let v = self.z.lb_of_pval(val);
                out.push(self.x.gt(-v));
            }
            TAG_Z_UB => {
                let v = self.z.ub_of_pval(val);
                out.push(self.x.gt(v));
                out.push(self.x.lt(-v));
            }
            TAG_X_LB => {
                let k = self.x.lb_of_pval(val);
                if k > 0 {
                    out.push(self.z.lt(k));
                    out.push(self.x.lt(1 - k));
                } else {
                    out.push(self.z.gt(-k));
                }
            }
            TAG_X_UB => {
                let k = self.x.ub_of_pval(val);
                if k >= 0 {
                    out.push(self.z.gt(k));
                } else {
                    out.push(self.z.lt(-k));
                    out.push(self.x.ge(-k));
                }
            }
            _ => debug_assert!(false, "unknown abs tag"),
        }
    }
}

/// Post `z = |x|`.
pub fn int_abs(engine: &mut Engine, props: &mut PropagatorStore, z: IntVar, x: IntVar) -> bool {
    if !engine.post(z.ge(0)) {
        return false;
    }
    let id = props.next_id();
    engine.attach_var(z, Event::LbUb, Watch::new(id, 0).idem());
    engine.attach_var(x, Event::LbUb, Watch::new(id, 1).idem());
    props.register(engine, Box::new(IAbs { z, x }));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxicp_engine::{propagate, SolverConfig};

    fn fixture() -> (Engine, PropagatorStore) {
        (Engine::new(SolverConfig::default()), PropagatorStore::default())
    }

    #[test]
    fn test_abs_initial_bounds() {
        let (mut engine, mut props) = fixture();
        let x = engine.new_intvar(-4, 4);
        let z = engine.new_intvar(-10, 10);
        assert!(int_abs(&mut engine, &mut props, z, x));
        assert!(propagate(&mut engine, &mut props));
        assert_eq!(engine.lb(z), 0);
        assert_eq!(engine.ub(z), 4);
    }

    #[test]
    fn test_abs_fix_z_prunes_x() {
        let (mut engine, mut props) = fixture();
        let x = engine.new_intvar(-4, 4);
        let z = engine.new_intvar(0, 4);
        assert!(int_abs(&mut engine, &mut props, z, x));
        assert!(propagate(&mut engine, &mut props));

        engine.push_level();
        assert!(engine.enqueue(z.ge(3), Reason::Decision));
        assert!(engine.enqueue(z.le(3), Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        // x ∈ [-3, 3]; the two-point set {-3, 3} at bounds consistency.
        assert_eq!(engine.lb(x), -3);
        assert_eq!(engine.ub(x), 3);

        // Forcing the sign fixes x.
        engine.push_level();
        assert!(engine.enqueue(x.ge(0), Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        assert_eq!(engine.lb(x), 3);
        assert_eq!(engine.ub(x), 3);

        engine.bt_to_level(0);
        assert_eq!(engine.lb(x), -4);
    }

    #[test]
    fn test_abs_negative_x_pushes_z() {
        let (mut engine, mut props) = fixture();
        let x = engine.new_intvar(-8, -2);
        let z = engine.new_intvar(0, 20);
        assert!(int_abs(&mut engine, &mut props, z, x));
        assert!(propagate(&mut engine, &mut props));
        assert_eq!(engine.lb(z), 2);
        assert_eq!(engine.ub(z), 8);
    }

    #[test]
    fn test_abs_conflict() {
        let (mut engine, mut props) = fixture();
        let x = engine.new_intvar(-1, 1);
        let z = engine.new_intvar(0, 10);
        assert!(int_abs(&mut engine, &mut props, z, x));
        assert!(propagate(&mut engine, &mut props));

        engine.push_level();
        assert!(engine.enqueue(z.ge(5), Reason::Decision));
        assert!(!propagate(&mut engine, &mut props));
    }
}
