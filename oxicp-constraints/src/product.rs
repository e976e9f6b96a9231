//! Integer Product.
//!
//! The workhorse is `IProdNonneg`, a specialization for `z = x·y` with all
//! three domains nonnegative: both bounds of `z` and of `x`, `y` are
//! tightened with ceiling division, and explanations re-derive minimal
//! sufficient bounds at analysis time. General sign combinations are posted
//! by decomposition: eager clauses for small domains, otherwise a sign
//! split through `max(±v, 0)` parts and four nonnegative products.

use tracing::trace;

use oxicp_core::{Atom, IntVar, Pval};
use oxicp_engine::{Engine, Event, PropId, Propagator, PropagatorStore, Reason, Watch};

use crate::linear::int_linear_le;
use crate::max::int_max;

const TAG_Z_LB: u32 = 0;
const TAG_Z_UB: u32 = 1;
const TAG_X_LB: u32 = 2; // +xi
const TAG_X_UB: u32 = 4; // +xi

/// Ceiling division for a positive divisor.
pub(crate) fn iceil(a: i64, b: i64) -> i64 {
    debug_assert!(b > 0);
    a.div_euclid(b) + i64::from(a.rem_euclid(b) != 0)
}

/// `z = x·y` over nonnegative domains.
pub struct IProdNonneg {
    z: IntVar,
    xs: [IntVar; 2],
}

impl Propagator for IProdNonneg {
    fn propagate(&mut self, engine: &mut Engine, me: PropId) -> bool {
        trace!("running iprod_nonneg");
        let thunk = |tag: u32| Reason::Thunk {
            prop: me,
            tag,
            btpred: true,
        };
        let z_low = engine.lb(self.xs[0]) * engine.lb(self.xs[1]);
        if z_low > engine.lb(self.z) && !engine.set_lb(self.z, z_low, thunk(TAG_Z_LB)) {
            return false;
        }
        let z_high = engine.ub(self.xs[0]) * engine.ub(self.xs[1]);
        if z_high < engine.ub(self.z) && !engine.set_ub(self.z, z_high, thunk(TAG_Z_UB)) {
            return false;
        }
        for xi in 0..2 {
            let other = self.xs[1 - xi];
            if engine.ub(other) <= 0 {
                continue;
            }
            let x_low = iceil(engine.lb(self.z), engine.ub(other));
            if x_low > engine.lb(self.xs[xi])
                && !engine.set_lb(self.xs[xi], x_low, thunk(TAG_X_LB + xi as u32))
            {
                return false;
            }
            let y_lb = engine.lb(other);
            if y_lb > 0 {
                let x_high = engine.ub(self.z) / y_lb;
                if x_high < engine.ub(self.xs[xi])
                    && !engine.set_ub(self.xs[xi], x_high, thunk(TAG_X_UB + xi as u32))
                {
                    return false;
                }
            }
        }
        true
    }

    fn explain(&self, engine: &Engine, tag: u32, val: Pval, out: &mut Vec<Atom>) {
        match tag {
            TAG_Z_LB => {
                let z_lb = self.z.lb_of_pval(val);
                if z_lb <= engine.lb_root(self.z) {
                    return;
                }
                // One atom suffices when a root bound carries the product.
                for xi in 0..2 {
                    let x_lb0 = engine.lb_root(self.xs[xi]);
                    if x_lb0 > 0 && x_lb0 * engine.lb(self.xs[1 - xi]) >= z_lb {
                        out.push(self.xs[1 - xi].lt(iceil(z_lb, x_lb0)));
                        return;
                    }
                }
                let ex = iceil(z_lb, engine.lb(self.xs[1]));
                let ey = iceil(z_lb, ex);
                out.push(self.xs[0].lt(ex));
                out.push(self.xs[1].lt(ey));
            }
            TAG_Z_UB => {
                let z_ub = self.z.ub_of_pval(val);
                if z_ub >= engine.ub_root(self.z) {
                    return;
                }
                for xi in 0..2 {
                    let x_ub0 = engine.ub_root(self.xs[xi]);
                    if x_ub0 > 0 && x_ub0 * engine.ub(self.xs[1 - xi]) <= z_ub {
                        out.push(self.xs[1 - xi].gt(z_ub / x_ub0));
                        return;
                    }
                }
                let ty = engine.ub(self.xs[1]);
                if ty == 0 {
                    out.push(self.xs[1].gt(0));
                    return;
                }
                out.push(self.xs[0].gt(z_ub / ty));
                out.push(self.xs[1].gt(ty));
            }
            _ => {
                let is_ub = tag >= TAG_X_UB;
                let base = if is_ub { TAG_X_UB } else { TAG_X_LB };
                let xi = (tag - base) as usize;
                let x = self.xs[xi];
                let y = self.xs[1 - xi];
                if !is_ub {
                    // x ≥ k from z's lower bound over y's upper bound.
                    let k = x.lb_of_pval(val);
                    if k <= engine.lb_root(x) {
                        return;
                    }
                    let y_ub0 = engine.ub_root(y);
                    if y_ub0 > 0 && (k - 1) * y_ub0 < engine.lb(self.z) {
                        out.push(self.z.le((k - 1) * y_ub0));
                        return;
                    }
                    if k == 1 {
                        out.push(self.z.lt(1));
                        return;
                    }
                    let z_lb0 = engine.lb_root(self.z);
                    if (k - 1) * engine.ub(y) < z_lb0 {
                        out.push(y.gt((z_lb0 - 1).div_euclid(k - 1)));
                        return;
                    }
                    let ey = (engine.lb(self.z) - 1).div_euclid(k - 1);
                    let ez = (k - 1) * ey + 1;
                    out.push(y.gt(ey));
                    out.push(self.z.lt(ez));
                } else {
                    // x ≤ k from z's upper bound over y's lower bound.
                    let k = x.ub_of_pval(val);
                    if k >= engine.ub_root(x) {
                        return;
                    }
                    let y_lb0 = engine.lb_root(y);
                    if y_lb0 > 0 && (k + 1) * y_lb0 > engine.ub(self.z) {
                        out.push(self.z.ge((k + 1) * y_lb0));
                        return;
                    }
                    let z_ub0 = engine.ub_root(self.z);
                    if (k + 1) * engine.lb(y) > z_ub0 {
                        out.push(y.lt(iceil(z_ub0 + 1, k + 1)));
                        return;
                    }
                    let ey = iceil(engine.ub(self.z) + 1, k + 1);
                    let ez = ey * (k + 1) - 1;
                    out.push(y.lt(ey));
                    out.push(self.z.gt(ez));
                }
            }
        }
    }
}

/// Post `z = x·y` over nonnegative root domains.
fn iprod_nonneg(engine: &mut Engine, props: &mut PropagatorStore, z: IntVar, x: IntVar, y: IntVar) {
    let id = props.next_id();
    engine.attach_var(z, Event::LbUb, Watch::new(id, 0).idem());
    engine.attach_var(x, Event::LbUb, Watch::new(id, 0).idem());
    engine.attach_var(y, Event::LbUb, Watch::new(id, 0).idem());
    props.register(engine, Box::new(IProdNonneg { z, xs: [x, y] }));
}

/// Eager clause decomposition of `z = x·y`, suitable for small domains.
fn imul_decomp(engine: &mut Engine, z: IntVar, x: IntVar, y: IntVar) -> bool {
    let (xl, xu) = (engine.lb_root(x), engine.ub_root(x));
    let (yl, yu) = (engine.lb_root(y), engine.ub_root(y));
    if xu > 0 && yu > 0 {
        for kx in xl.max(1)..=xu {
            for ky in yl.max(1)..=yu {
                if !engine.add_clause(&[x.lt(kx), y.lt(ky), z.ge(kx * ky)]) {
                    return false;
                }
                if !engine.add_clause(&[x.gt(kx), y.gt(ky), x.lt(-kx), y.lt(-ky), z.le(kx * ky)]) {
                    return false;
                }
            }
        }
    }
    if xu > 0 && yl < 0 {
        for kx in xl.max(1)..=xu {
            for ky in yl..=yu.min(-1) {
                if !engine.add_clause(&[x.lt(kx), y.gt(ky), z.le(kx * ky)]) {
                    return false;
                }
                if !engine.add_clause(&[x.gt(kx), y.lt(ky), x.lt(-kx), y.gt(-ky), z.ge(kx * ky)]) {
                    return false;
                }
            }
        }
    }
    if xl < 0 && yu > 0 {
        for kx in xl..=xu.min(-1) {
            for ky in yl.max(1)..=yu {
                if !engine.add_clause(&[x.gt(kx), y.lt(ky), z.le(kx * ky)]) {
                    return false;
                }
                if !engine.add_clause(&[x.lt(kx), y.gt(ky), x.gt(-kx), y.lt(-ky), z.ge(kx * ky)]) {
                    return false;
                }
            }
        }
    }
    if xl < 0 && yl < 0 {
        for kx in xl..=xu.min(-1) {
            for ky in yl..=yu.min(-1) {
                if !engine.add_clause(&[x.gt(kx), y.gt(ky), z.ge(kx * ky)]) {
                    return false;
                }
                if !engine.add_clause(&[x.lt(kx), y.lt(ky), x.gt(-kx), y.gt(-ky), z.le(kx * ky)]) {
                    return false;
                }
            }
        }
    }
    // Zero cases: either factor at zero pins the product.
    if xl <= 0 && xu >= 0 && !engine.add_clause(&[x.lt(0), x.gt(0), z.ge(0)]) {
        return false;
    }
    if xl <= 0 && xu >= 0 && !engine.add_clause(&[x.lt(0), x.gt(0), z.le(0)]) {
        return false;
    }
    if yl <= 0 && yu >= 0 && !engine.add_clause(&[y.lt(0), y.gt(0), z.ge(0)]) {
        return false;
    }
    if yl <= 0 && yu >= 0 && !engine.add_clause(&[y.lt(0), y.gt(0), z.le(0)]) {
        return false;
    }
    true
}

/// A fresh variable constrained to `-x`.
pub fn intvar_neg(engine: &mut Engine, props: &mut PropagatorStore, x: IntVar) -> IntVar {
    let nx = engine.new_intvar(-engine.ub(x), -engine.lb(x));
    // x + nx ≤ 0 and -(x + nx) ≤ 0.
    int_linear_le(engine, props, Atom::TRUE, &[1, 1], &[x, nx], 0);
    int_linear_le(engine, props, Atom::TRUE, &[-1, -1], &[x, nx], 0);
    nx
}

fn sign_part(
    engine: &mut Engine,
    props: &mut PropagatorStore,
    v: IntVar,
    zero: IntVar,
) -> (IntVar, IntVar) {
    let neg = intvar_neg(engine, props, v);
    let vp = engine.new_intvar(0, engine.ub(v).max(0));
    let vn = engine.new_intvar(0, (-engine.lb(v)).max(0));
    int_max(engine, props, vp, &[v, zero]);
    int_max(engine, props, vn, &[neg, zero]);
    (vp, vn)
}

fn nonneg_prod(
    engine: &mut Engine,
    props: &mut PropagatorStore,
    a: IntVar,
    b: IntVar,
) -> IntVar {
    let p = engine.new_intvar(0, engine.ub(a) * engine.ub(b));
    iprod_nonneg(engine, props, p, a, b);
    p
}

/// Post `z = x·y`.
///
/// Nonnegative root domains use the dedicated propagator. Small mixed-sign
/// domains are decomposed eagerly into clauses. Large mixed-sign domains are
/// split into nonnegative parts `max(±v, 0)` combined linearly.
pub fn int_mul(
    engine: &mut Engine,
    props: &mut PropagatorStore,
    z: IntVar,
    x: IntVar,
    y: IntVar,
) -> bool {
    if !engine.ok {
        return false;
    }
    // Interval hull of the four corners, always sound.
    let corners = [
        engine.lb(x) * engine.lb(y),
        engine.lb(x) * engine.ub(y),
        engine.ub(x) * engine.lb(y),
        engine.ub(x) * engine.ub(y),
    ];
    let lo = corners.iter().copied().min().unwrap();
    let hi = corners.iter().copied().max().unwrap();
    if !engine.post(z.ge(lo)) || !engine.post(z.le(hi)) {
        return false;
    }
    if engine.lb(x) >= 0 && engine.lb(y) >= 0 && engine.lb(z) >= 0 {
        iprod_nonneg(engine, props, z, x, y);
        return true;
    }
    let span_x = engine.ub(x) - engine.lb(x);
    let span_y = engine.ub(y) - engine.lb(y);
    if span_x.saturating_mul(span_y) <= engine.config.eager_threshold {
        return imul_decomp(engine, z, x, y);
    }
    // Sign split: v = vp - vn with vp = max(v, 0), vn = max(-v, 0), and
    // z = xp·yp - xp·yn - xn·yp + xn·yn.
    let zero = engine.new_intvar(0, 0);
    let (xp, xn) = sign_part(engine, props, x, zero);
    let (yp, yn) = sign_part(engine, props, y, zero);
    let zpp = nonneg_prod(engine, props, xp, yp);
    let zpn = nonneg_prod(engine, props, xp, yn);
    let znp = nonneg_prod(engine, props, xn, yp);
    let znn = nonneg_prod(engine, props, xn, yn);
    let vs = [z, zpp, zpn, znp, znn];
    int_linear_le(engine, props, Atom::TRUE, &[1, -1, 1, 1, -1], &vs, 0)
        && int_linear_le(engine, props, Atom::TRUE, &[-1, 1, -1, -1, 1], &vs, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxicp_engine::{propagate, SolverConfig};

    fn fixture() -> (Engine, PropagatorStore) {
        (Engine::new(SolverConfig::default()), PropagatorStore::default())
    }

    #[test]
    fn test_iceil() {
        assert_eq!(iceil(7, 2), 4);
        assert_eq!(iceil(8, 2), 4);
        assert_eq!(iceil(0, 3), 0);
        assert_eq!(iceil(-7, 2), -3);
    }

    #[test]
    fn test_nonneg_product_bounds() {
        let (mut engine, mut props) = fixture();
        let x = engine.new_intvar(2, 5);
        let y = engine.new_intvar(3, 4);
        let z = engine.new_intvar(0, 100);
        assert!(int_mul(&mut engine, &mut props, z, x, y));
        assert!(propagate(&mut engine, &mut props));
        assert_eq!(engine.lb(z), 6);
        assert_eq!(engine.ub(z), 20);
    }

    #[test]
    fn test_nonneg_product_back_propagation() {
        let (mut engine, mut props) = fixture();
        let x = engine.new_intvar(0, 10);
        let y = engine.new_intvar(0, 10);
        let z = engine.new_intvar(0, 100);
        assert!(int_mul(&mut engine, &mut props, z, x, y));
        assert!(propagate(&mut engine, &mut props));

        engine.push_level();
        assert!(engine.enqueue(z.ge(30), Reason::Decision));
        assert!(engine.enqueue(y.le(5), Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        // x ≥ ceil(30 / 5) = 6.
        assert_eq!(engine.lb(x), 6);
        engine.bt_to_level(0);
        assert_eq!(engine.lb(x), 0);
    }

    #[test]
    fn test_small_mixed_sign_decomposition() {
        let (mut engine, mut props) = fixture();
        let x = engine.new_intvar(-2, 2);
        let y = engine.new_intvar(-2, 2);
        let z = engine.new_intvar(-10, 10);
        assert!(int_mul(&mut engine, &mut props, z, x, y));
        assert!(propagate(&mut engine, &mut props));
        // Corner hull: [-4, 4].
        assert_eq!(engine.lb(z), -4);
        assert_eq!(engine.ub(z), 4);

        engine.push_level();
        assert!(engine.enqueue(x.ge(2), Reason::Decision));
        assert!(engine.enqueue(y.le(-2), Reason::Decision));
        assert!(propagate(&mut engine, &mut props));
        // x = 2, y = -2 → z = -4 via the decomposition clauses.
        assert_eq!(engine.lb(z), -4);
        assert_eq!(engine.ub(z), -4);
    }
}
