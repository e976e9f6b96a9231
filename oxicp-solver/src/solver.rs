//! The Solver Facade.
//!
//! [`Solver`] owns the engine, the propagator store and the brancher list,
//! and runs the propagate → branch → decide loop with restarts, limits and
//! assumptions. Constraint posting always happens at the root: every
//! posting entry point backtracks to level 0 first and reports root
//! inconsistency by returning `false`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use oxicp_core::{Atom, CoreError, CoreResult, IntVar};
use oxicp_engine::{
    add_learnt, analyze, analyze_final, grow_budget, over_budget, propagate, reduce_db,
    simplify_at_root, Engine, PropagatorStore, Reason, RestartStrategy, SolverConfig, Statistics,
};

use oxicp_constraints as cons;

use crate::branch::{Brancher, DefaultBrancher};
use crate::model::Model;

/// Outcome of a [`Solver::solve`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveResult {
    /// A model was found.
    Sat,
    /// No model exists (under the current assumptions).
    Unsat,
    /// A limit was hit or the solve was aborted.
    Unknown,
}

/// Resource limits for one solve call.
#[derive(Debug, Clone, Copy, Default)]
pub struct Limits {
    /// Wall-clock budget.
    pub time: Option<Duration>,
    /// Conflict budget.
    pub conflicts: Option<u64>,
}

impl Limits {
    /// No limits.
    #[must_use]
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Wall-clock budget only.
    #[must_use]
    pub fn time_limit(d: Duration) -> Self {
        Self {
            time: Some(d),
            conflicts: None,
        }
    }

    /// Conflict budget only.
    #[must_use]
    pub fn conflict_limit(n: u64) -> Self {
        Self {
            time: None,
            conflicts: Some(n),
        }
    }
}

/// A lazy-clause-generation constraint solver.
pub struct Solver {
    engine: Engine,
    props: PropagatorStore,
    branchers: Vec<Box<dyn Brancher>>,
    default_brancher: DefaultBrancher,
    assumptions: Vec<Atom>,
    core: Vec<Atom>,
    abort: Arc<AtomicBool>,
    incumbent: Model,
}

impl Default for Solver {
    fn default() -> Self {
        Self::new()
    }
}

impl Solver {
    /// Solver with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SolverConfig::default())
    }

    /// Solver with the given configuration.
    #[must_use]
    pub fn with_config(config: SolverConfig) -> Self {
        Self {
            engine: Engine::new(config),
            props: PropagatorStore::default(),
            branchers: Vec::new(),
            default_brancher: DefaultBrancher,
            assumptions: Vec::new(),
            core: Vec::new(),
            abort: Arc::new(AtomicBool::new(false)),
            incumbent: Model::default(),
        }
    }

    /// Backtrack to the root before touching solver state.
    fn reset(&mut self) {
        self.engine.bt_to_level(0);
    }

    // ---- variables and atoms ---------------------------------------------

    /// New integer variable over `[lb, ub]`.
    pub fn new_intvar(&mut self, lb: i64, ub: i64) -> CoreResult<IntVar> {
        if lb > ub {
            return Err(CoreError::EmptyDomain { lb, ub });
        }
        self.reset();
        Ok(self.engine.new_intvar(lb, ub))
    }

    /// New Boolean atom.
    pub fn new_bool(&mut self) -> Atom {
        self.reset();
        self.engine.new_bool()
    }

    /// The (cached) Boolean atom `x = k`.
    pub fn eq_atom(&mut self, x: IntVar, k: i64) -> Atom {
        self.reset();
        self.engine.eq_atom(x, k)
    }

    /// Restrict `x` to an enumerated set of values.
    pub fn make_sparse(&mut self, x: IntVar, values: &[i64]) -> CoreResult<bool> {
        if values.is_empty() {
            return Err(CoreError::EmptySparseDomain);
        }
        self.reset();
        let mut vs = values.to_vec();
        vs.sort_unstable();
        vs.dedup();
        if !self.engine.post(x.ge(vs[0])) || !self.engine.post(x.le(*vs.last().unwrap())) {
            return Ok(false);
        }
        for w in vs.windows(2) {
            if w[1] > w[0] + 1 && !self.engine.add_clause(&[x.le(w[0]), x.ge(w[1])]) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// New variable `y` channelled as `y = table[x]`, for `x` ranging over
    /// `0..table.len()`.
    pub fn permute_intvar(&mut self, x: IntVar, table: &[i64]) -> CoreResult<IntVar> {
        if table.is_empty() {
            return Err(CoreError::EmptySparseDomain);
        }
        self.reset();
        let lo = *table.iter().min().unwrap();
        let hi = *table.iter().max().unwrap();
        let y = self.engine.new_intvar(lo, hi);
        self.make_sparse(y, table)?;
        for (i, &v) in table.iter().enumerate() {
            let ex = self.engine.eq_atom(x, i as i64);
            let ey = self.engine.eq_atom(y, v);
            self.engine.add_clause(&[!ex, ey]);
        }
        Ok(y)
    }

    /// A fresh variable constrained to `-x`.
    pub fn intvar_neg(&mut self, x: IntVar) -> IntVar {
        self.reset();
        cons::intvar_neg(&mut self.engine, &mut self.props, x)
    }

    /// Boolean branching polarity hint for the default brancher.
    pub fn set_bool_polarity(&mut self, at: Atom, pol: bool) {
        let flip = at.pid.raw() & 1 == 1;
        self.engine.polarity[at.pid.pair()] = pol != flip;
    }

    // ---- posting ---------------------------------------------------------

    /// Post a unit atom.
    pub fn post(&mut self, at: Atom) -> bool {
        self.reset();
        self.engine.post(at)
    }

    /// Post a clause over atoms.
    pub fn post_clause(&mut self, atoms: &[Atom]) -> bool {
        self.reset();
        self.engine.add_clause(atoms)
    }

    /// Post `r → Σ cs·vs ≤ k`.
    pub fn linear_le(&mut self, r: Atom, cs: &[i64], vs: &[IntVar], k: i64) -> bool {
        self.reset();
        cons::int_linear_le(&mut self.engine, &mut self.props, r, cs, vs, k)
    }

    /// Post `r → Σ cs·vs ≠ k`.
    pub fn linear_ne(&mut self, r: Atom, cs: &[i64], vs: &[IntVar], k: i64) -> bool {
        self.reset();
        cons::int_linear_ne(&mut self.engine, &mut self.props, r, cs, vs, k)
    }

    /// Post `z = x·y`.
    pub fn mul(&mut self, z: IntVar, x: IntVar, y: IntVar) -> bool {
        self.reset();
        cons::int_mul(&mut self.engine, &mut self.props, z, x, y)
    }

    /// Post `z = |x|`.
    pub fn abs(&mut self, z: IntVar, x: IntVar) -> bool {
        self.reset();
        cons::int_abs(&mut self.engine, &mut self.props, z, x)
    }

    /// Post `z = max(xs)`.
    pub fn max(&mut self, z: IntVar, xs: &[IntVar]) -> bool {
        self.reset();
        cons::int_max(&mut self.engine, &mut self.props, z, xs)
    }

    /// Post `r → x ≤ y + k`.
    pub fn le(&mut self, x: IntVar, y: IntVar, k: i64, r: Atom) -> bool {
        self.reset();
        cons::int_le(&mut self.engine, &mut self.props, x, y, k, r)
    }

    /// Post `b ↔ x ≤ y + k`.
    pub fn le_reif(&mut self, x: IntVar, y: IntVar, k: i64, b: Atom) -> bool {
        self.reset();
        cons::int_le_reif(&mut self.engine, &mut self.props, x, y, k, b)
    }

    /// Post `r → x = y`.
    pub fn eq(&mut self, x: IntVar, y: IntVar, r: Atom) -> bool {
        self.reset();
        cons::int_eq(&mut self.engine, &mut self.props, x, y, r)
    }

    /// Post `r → x ≠ y`.
    pub fn ne(&mut self, x: IntVar, y: IntVar, r: Atom) -> bool {
        self.reset();
        cons::int_ne(&mut self.engine, &mut self.props, x, y, r)
    }

    /// Post `xs` pairwise distinct.
    pub fn all_different(&mut self, xs: &[IntVar]) -> bool {
        self.reset();
        cons::all_different(&mut self.engine, &mut self.props, xs)
    }

    /// Post `r → c_z·z ≥ k + Σ terms` over Boolean terms.
    pub fn bool_lin_ge(
        &mut self,
        r: Atom,
        c_z: i64,
        z: IntVar,
        terms: &[(i64, Atom)],
        k: i64,
    ) -> bool {
        self.reset();
        cons::bool_lin_ge(&mut self.engine, &mut self.props, r, c_z, z, terms, k)
    }

    /// Post `r → at most k of the atoms hold`.
    pub fn atmost(&mut self, r: Atom, atoms: &[Atom], k: i64) -> bool {
        self.reset();
        cons::atmost(&mut self.engine, &mut self.props, r, atoms, k)
    }

    /// Post `r → at least k of the atoms hold`.
    pub fn atleast(&mut self, r: Atom, atoms: &[Atom], k: i64) -> bool {
        self.reset();
        cons::atleast(&mut self.engine, &mut self.props, r, atoms, k)
    }

    // ---- assumptions -----------------------------------------------------

    /// Push an assumption; reports whether it is still consistent at the
    /// root.
    pub fn assume(&mut self, at: Atom) -> bool {
        self.reset();
        self.assumptions.push(at);
        !self.engine.state.is_inconsistent(at)
    }

    /// Pop the most recent assumption.
    pub fn retract(&mut self) {
        self.reset();
        self.assumptions.pop();
    }

    /// Drop all assumptions.
    pub fn clear_assumptions(&mut self) {
        self.reset();
        self.assumptions.clear();
    }

    /// The assumption core from the last UNSAT answer.
    #[must_use]
    pub fn get_conflict(&self) -> &[Atom] {
        &self.core
    }

    // ---- search ----------------------------------------------------------

    /// Shared abort flag; set it from any thread to stop the solve.
    #[must_use]
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Request asynchronous cancellation of a running solve.
    ///
    /// The flag stays set until [`Solver::clear_abort`] is called.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    /// Rearm after a cancelled solve.
    pub fn clear_abort(&self) {
        self.abort.store(false, Ordering::Relaxed);
    }

    /// Model from the last SAT answer.
    #[must_use]
    pub fn get_model(&self) -> Model {
        self.incumbent.clone()
    }

    /// Accumulated counters.
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        self.engine.stats.clone()
    }

    /// Add a brancher; branchers are consulted in insertion order.
    pub fn add_brancher(&mut self, b: Box<dyn Brancher>) {
        self.branchers.push(b);
    }

    fn save_model(&mut self) {
        let pairs = self.engine.state.num_preds() / 2;
        self.incumbent.vals.clear();
        for pair in 0..pairs {
            self.incumbent.vals.push(self.engine.state.p_vals[2 * pair]);
        }
    }

    fn restart_threshold(&self, restarts: u64) -> u64 {
        match self.engine.config.restart {
            RestartStrategy::Luby => self.engine.config.restart_base * luby(restarts + 1),
            RestartStrategy::Geometric => {
                let mut t = self.engine.config.restart_base as f64;
                for _ in 0..restarts {
                    t *= self.engine.config.restart_inc;
                }
                t as u64
            }
            RestartStrategy::None => u64::MAX,
        }
    }

    /// Decide satisfiability under the current constraints and assumptions.
    pub fn solve(&mut self, limits: Limits) -> SolveResult {
        self.reset();
        self.core.clear();
        if !self.engine.ok {
            return SolveResult::Unsat;
        }
        let start = Instant::now();
        let mut conflicts_here = 0u64;
        let mut conflicts_since_restart = 0u64;
        let mut restarts_here = 0u64;

        loop {
            if self.abort.load(Ordering::Relaxed) {
                self.reset();
                return SolveResult::Unknown;
            }
            if let Some(cap) = limits.conflicts {
                if conflicts_here >= cap {
                    self.reset();
                    return SolveResult::Unknown;
                }
            }
            if let Some(cap) = limits.time {
                if start.elapsed() >= cap {
                    self.reset();
                    return SolveResult::Unknown;
                }
            }

            if !propagate(&mut self.engine, &mut self.props) {
                self.engine.stats.conflicts += 1;
                conflicts_here += 1;
                conflicts_since_restart += 1;
                if self.engine.level() == 0 {
                    self.engine.ok = false;
                    return SolveResult::Unsat;
                }
                let (learnt, bt) = analyze(&mut self.engine, &self.props);
                if learnt.is_empty() {
                    self.engine.ok = false;
                    self.reset();
                    return SolveResult::Unsat;
                }
                self.engine.bt_to_level(bt);
                add_learnt(&mut self.engine, &learnt);
                self.engine.decay_activities();
                if over_budget(&self.engine) {
                    reduce_db(&mut self.engine);
                    grow_budget(&mut self.engine);
                }
                continue;
            }

            if self.engine.level() == 0 {
                if !self.engine.ok {
                    return SolveResult::Unsat;
                }
                simplify_at_root(&mut self.engine, &mut self.props);
            }

            if conflicts_since_restart >= self.restart_threshold(restarts_here) {
                debug!(restarts = restarts_here + 1, "restarting");
                conflicts_since_restart = 0;
                restarts_here += 1;
                self.engine.stats.restarts += 1;
                self.engine.bt_to_level(0);
                for b in &mut self.branchers {
                    b.on_restart();
                }
                continue;
            }

            // Assumptions consume the first decision levels.
            let lvl = self.engine.level();
            if lvl < self.assumptions.len() {
                let a = self.assumptions[lvl];
                if self.engine.state.is_entailed(a) {
                    self.engine.push_level();
                    continue;
                }
                if self.engine.state.is_inconsistent(a) {
                    self.core = analyze_final(&mut self.engine, &self.props, &self.assumptions, a);
                    self.reset();
                    return SolveResult::Unsat;
                }
                self.engine.push_level();
                self.engine.enqueue(a, Reason::Decision);
                continue;
            }

            let dec = self
                .branchers
                .iter_mut()
                .find_map(|b| b.select(&self.engine))
                .or_else(|| self.default_brancher.select(&self.engine));
            match dec {
                Some(at) => {
                    debug!(decision = %at, level = self.engine.level() + 1, "?>");
                    debug_assert!(!self.engine.state.is_entailed(at));
                    debug_assert!(!self.engine.state.is_inconsistent(at));
                    self.engine.stats.decisions += 1;
                    self.engine.push_level();
                    self.engine.enqueue(at, Reason::Decision);
                }
                None => {
                    self.engine.stats.solutions += 1;
                    self.save_model();
                    self.reset();
                    return SolveResult::Sat;
                }
            }
        }
    }
}

/// The Luby restart sequence: 1, 1, 2, 1, 1, 2, 4, ...
fn luby(mut i: u64) -> u64 {
    loop {
        let mut k = 1u64;
        while (1 << k) - 1 < i {
            k += 1;
        }
        if (1 << k) - 1 == i {
            return 1 << (k - 1);
        }
        i -= (1 << (k - 1)) - 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luby_sequence() {
        let got: Vec<u64> = (1..=15).map(luby).collect();
        assert_eq!(got, vec![1, 1, 2, 1, 1, 2, 4, 1, 1, 2, 1, 1, 2, 4, 8]);
    }

    #[test]
    fn test_trivial_sat_and_model() {
        let mut s = Solver::new();
        let x = s.new_intvar(2, 6).unwrap();
        assert!(s.post(x.ge(4)));
        assert_eq!(s.solve(Limits::unlimited()), SolveResult::Sat);
        let m = s.get_model();
        assert!(m.int_value(x) >= 4);
        assert!(m.int_value(x) <= 6);
    }

    #[test]
    fn test_empty_domain_rejected() {
        let mut s = Solver::new();
        assert_eq!(
            s.new_intvar(3, 1),
            Err(CoreError::EmptyDomain { lb: 3, ub: 1 })
        );
    }

    #[test]
    fn test_root_inconsistent_post() {
        let mut s = Solver::new();
        let x = s.new_intvar(0, 5).unwrap();
        assert!(s.post(x.ge(3)));
        assert!(!s.post(x.le(2)));
        assert_eq!(s.solve(Limits::unlimited()), SolveResult::Unsat);
    }

    #[test]
    fn test_conflict_limit_returns_unknown() {
        let mut s = Solver::new();
        // An unsatisfiable pigeonhole-ish instance that needs conflicts.
        let bs: Vec<Atom> = (0..4).map(|_| s.new_bool()).collect();
        for i in 0..4 {
            for j in i + 1..4 {
                assert!(s.post_clause(&[!bs[i], !bs[j]]));
            }
        }
        assert!(s.post_clause(&[bs[0], bs[1]]));
        assert!(s.post_clause(&[bs[2], bs[3]]));
        let r = s.solve(Limits::conflict_limit(0));
        // With a zero conflict budget the solver may only answer Unknown or
        // decide without conflicts.
        assert_ne!(r, SolveResult::Sat);
    }

    #[test]
    fn test_sparse_domain() {
        let mut s = Solver::new();
        let x = s.new_intvar(0, 10).unwrap();
        assert!(s.make_sparse(x, &[2, 5, 9]).unwrap());
        assert!(s.post(x.ge(3)));
        assert_eq!(s.solve(Limits::unlimited()), SolveResult::Sat);
        let v = s.get_model().int_value(x);
        assert!(v == 5 || v == 9);
    }
}
