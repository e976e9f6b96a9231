//! Solution Snapshots.
//!
//! A model records the final lower-bound tick of every predicate pair at
//! the moment a solution was found; every quantity is read at that value
//! (branchers fix everything they own, auxiliaries sit at their supported
//! lower bound).

use oxicp_core::{int_of_pval, pval_inv, Atom, IntVar, Pval};

/// Snapshot of predicate values after a successful solve.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub(crate) vals: Vec<Pval>,
}

impl Model {
    /// Truth of an atom under the snapshot.
    #[must_use]
    pub fn value(&self, at: Atom) -> bool {
        let v = self.vals[at.pid.pair()];
        if at.pid.is_forward() {
            v >= at.val
        } else {
            pval_inv(at.val) >= v
        }
    }

    /// Value of an integer variable under the snapshot.
    #[must_use]
    pub fn int_value(&self, x: IntVar) -> i64 {
        int_of_pval(self.vals[x.pid.pair()]) + x.off
    }
}
