//! Trailed Persistence.
//!
//! Everything mutated above decision level 0 is either recorded here or
//! written through a slot of the trailed scalar pool. Predicate bound
//! restoration itself goes through the inference trail; this layer covers
//! every other scalar: watch-chain heads, the lazy-initializer watermark,
//! and propagator-owned cached state.

use oxicp_core::{PredId, Pval};

/// Handle of a slot in the trailed scalar pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailedSlot(pub(crate) u32);

/// Restoration target of a data-trail record.
#[derive(Debug, Clone, Copy)]
pub enum TrailLoc {
    /// A slot of the scalar pool.
    Scalar(u32),
    /// The watch-chain head of a predicate (raw pid index).
    WatchHead(u32),
    /// The lazy-initializer watermark.
    InitEnd,
}

/// Trail records and per-level bookkeeping.
#[derive(Debug, Default)]
pub struct Persistence {
    /// Trailed scalar pool.
    scalars: Vec<u64>,
    /// Generic restoration records.
    pub(crate) data_trail: Vec<(TrailLoc, u64)>,
    /// `data_trail` length at each level entry.
    pub(crate) data_lim: Vec<usize>,
    /// Saved `p_last` values, appended when a level is pushed.
    pub(crate) plast_trail: Vec<(PredId, Pval)>,
    /// `plast_trail` length at each level entry.
    pub(crate) plast_lim: Vec<usize>,
    /// Membership flags for `touched_preds`.
    pub(crate) pred_touched: Vec<bool>,
    /// Predicates whose bounds changed since the current level was entered.
    pub(crate) touched_preds: Vec<PredId>,
}

impl Persistence {
    /// Register two predicate directions.
    pub(crate) fn grow_preds(&mut self) {
        self.pred_touched.push(false);
        self.pred_touched.push(false);
    }

    /// Allocate a pool slot holding `init`.
    pub fn alloc_scalar(&mut self, init: u64) -> TrailedSlot {
        let s = TrailedSlot(self.scalars.len() as u32);
        self.scalars.push(init);
        s
    }

    /// Current value of a pool slot.
    #[must_use]
    pub fn scalar(&self, slot: TrailedSlot) -> u64 {
        self.scalars[slot.0 as usize]
    }

    /// Write a pool slot, recording the old value when above level 0.
    pub fn set_scalar(&mut self, slot: TrailedSlot, v: u64) {
        let old = self.scalars[slot.0 as usize];
        if old == v {
            return;
        }
        if !self.data_lim.is_empty() {
            self.data_trail.push((TrailLoc::Scalar(slot.0), old));
        }
        self.scalars[slot.0 as usize] = v;
    }

    /// Record a restoration for an arbitrary location when above level 0.
    pub(crate) fn trail_loc(&mut self, loc: TrailLoc, old: u64) {
        if !self.data_lim.is_empty() {
            self.data_trail.push((loc, old));
        }
    }

    /// Write a pool slot directly during backtracking.
    pub(crate) fn restore_scalar(&mut self, slot: u32, v: u64) {
        self.scalars[slot as usize] = v;
    }

    /// Mark a predicate as changed at the current level.
    pub(crate) fn touch_pred(&mut self, pid: PredId) {
        if !self.pred_touched[pid.idx()] {
            self.pred_touched[pid.idx()] = true;
            self.touched_preds.push(pid);
        }
    }

    /// Drop every record; current scalar values become the root values.
    pub(crate) fn root_simplify(&mut self) {
        debug_assert!(self.data_lim.is_empty());
        self.data_trail.clear();
        self.plast_trail.clear();
        for p in self.touched_preds.drain(..) {
            self.pred_touched[p.idx()] = false;
        }
    }
}
