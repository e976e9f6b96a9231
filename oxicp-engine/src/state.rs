//! Predicate Bound State.
//!
//! Three parallel tick vectors per predicate: the level-0 value (`p_root`),
//! the value at entry to the current decision level (`p_last`) and the
//! current value (`p_vals`). All bound updates are monotone raises of
//! `p_vals`; the other two vectors trail behind through the persistence
//! layer.

use oxicp_core::{pval_inv, Atom, PredId, Pval, PVAL_MAX};

/// Initializer for a lazily allocated predicate.
///
/// Evaluated against a tick vector, returns the pair
/// `(lower tick, inverse upper tick)` to seed both directions with.
pub struct PredInit(Box<dyn Fn(&[Pval]) -> (Pval, Pval) + Send>);

impl PredInit {
    /// Wrap an initializer function.
    pub fn new(f: impl Fn(&[Pval]) -> (Pval, Pval) + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    /// Evaluate against a tick vector.
    pub fn eval(&self, vals: &[Pval]) -> (Pval, Pval) {
        (self.0)(vals)
    }
}

impl std::fmt::Debug for PredInit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PredInit(..)")
    }
}

/// Current, previous-level and root bounds of every predicate.
#[derive(Debug, Default)]
pub struct PredState {
    /// Level-0 ticks.
    pub p_root: Vec<Pval>,
    /// Ticks at entry to the current decision level.
    pub p_last: Vec<Pval>,
    /// Current ticks.
    pub p_vals: Vec<Pval>,
    /// Initializers for lazily created predicate pairs.
    pub initializers: Vec<Option<PredInit>>,
    /// Pairs below this index have had their initializers applied.
    pub init_end: usize,
}

impl PredState {
    /// Allocate a predicate pair with the given forward ticks.
    ///
    /// `ub` is a forward tick; the inverse direction stores its reflection.
    pub fn new_pred(&mut self, lb: Pval, ub: Pval) -> PredId {
        let pid = PredId::new(self.p_vals.len() as u32);
        for v in [lb, pval_inv(ub)] {
            self.p_root.push(v);
            self.p_last.push(v);
            self.p_vals.push(v);
        }
        self.initializers.push(None);
        pid
    }

    /// Number of predicate directions (twice the number of pairs).
    #[must_use]
    pub fn num_preds(&self) -> usize {
        self.p_vals.len()
    }

    /// Is the atom currently implied?
    #[must_use]
    pub fn is_entailed(&self, at: Atom) -> bool {
        self.p_vals[at.pid.idx()] >= at.val
    }

    /// Is the atom's complement currently implied?
    #[must_use]
    pub fn is_inconsistent(&self, at: Atom) -> bool {
        self.is_entailed(!at)
    }

    /// Is the atom implied at the root level?
    #[must_use]
    pub fn is_entailed_root(&self, at: Atom) -> bool {
        self.p_root[at.pid.idx()] >= at.val
    }

    /// Is the atom's complement implied at the root level?
    #[must_use]
    pub fn is_inconsistent_root(&self, at: Atom) -> bool {
        self.is_entailed_root(!at)
    }

    /// Raise the bound claimed by `at`, or report failure leaving the state
    /// untouched.
    pub fn post(&mut self, at: Atom) -> bool {
        if self.is_inconsistent(at) {
            return false;
        }
        if self.p_vals[at.pid.idx()] < at.val {
            self.p_vals[at.pid.idx()] = at.val;
        }
        true
    }

    /// Is the pair containing `pid` fixed to a single value?
    #[must_use]
    pub fn is_fixed(&self, pid: PredId) -> bool {
        self.p_vals[pid.idx()] + self.p_vals[pid.inv().idx()] == PVAL_MAX
    }
}
