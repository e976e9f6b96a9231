//! Watch Chains and the Inference Trail.
//!
//! Every predicate owns a singly-linked chain of watch nodes sorted by
//! threshold tick. A node holds the clause heads (and wake callbacks) that
//! become relevant once the predicate's bound crosses its threshold. A
//! trailed head index marks the last node the current bound has crossed;
//! propagation advances it, backtracking rewinds it.

use std::collections::BTreeMap;

use oxicp_core::{Atom, PredId, Pval};

use crate::clause::{ClauseDb, ClauseHead, ClauseRef};
use crate::propagator::{PropId, Watch};

/// Sentinel for "no node".
pub(crate) const NODE_NONE: u32 = u32::MAX;

/// Stored implicant of a trail entry.
#[derive(Debug, Clone, Copy)]
pub enum Reason {
    /// A decision or root post; no antecedent.
    Decision,
    /// Unit propagation of an inlined binary clause: the companion element.
    Atom(Atom),
    /// Unit propagation of a long clause.
    Clause(ClauseRef),
    /// Lazy reason: ask the propagator when (and if) analysis needs it.
    Thunk {
        /// Owning propagator.
        prop: PropId,
        /// Propagator-local tag identifying the deduction.
        tag: u32,
        /// Rewind the inferred predicate to its previous tick before
        /// invoking the thunk.
        btpred: bool,
    },
}

/// One inference-trail record.
#[derive(Debug, Clone, Copy)]
pub struct TrailEntry {
    /// The raised predicate.
    pub pid: PredId,
    /// Its tick before the raise.
    pub old: Pval,
    /// Why the raise happened.
    pub reason: Reason,
}

/// A watch-chain node keyed by a threshold tick.
#[derive(Debug)]
pub struct WatchNode {
    /// The atom whose entailment crosses this node.
    pub atom: Atom,
    /// Next node (strictly greater threshold), or [`NODE_NONE`].
    pub succ: u32,
    /// Clause heads to examine when this node is crossed.
    pub heads: Vec<ClauseHead>,
    /// Wake callbacks fired when this node is crossed.
    pub cbs: Vec<Watch>,
}

/// Watch infrastructure, clauses and the inference trail.
#[derive(Debug, Default)]
pub struct InferInfo {
    /// Watch-node arena.
    pub(crate) nodes: Vec<WatchNode>,
    free_nodes: Vec<u32>,
    /// Per-predicate threshold → node handle.
    pub(crate) watch_maps: Vec<BTreeMap<Pval, u32>>,
    /// Per-predicate first chain node (the sentinel until root GC).
    pub(crate) chain_start: Vec<u32>,
    /// Per-predicate last crossed node; trailed.
    pub(crate) head: Vec<u32>,
    /// Clause arena.
    pub clauses: ClauseDb,
    /// Problem clauses.
    pub clause_list: Vec<ClauseRef>,
    /// Learnt clauses.
    pub learnt_list: Vec<ClauseRef>,
    /// The inference trail.
    pub trail: Vec<TrailEntry>,
    /// Trail length at each decision-level entry.
    pub trail_lim: Vec<usize>,
}

impl InferInfo {
    fn alloc_node(&mut self, node: WatchNode) -> u32 {
        match self.free_nodes.pop() {
            Some(i) => {
                self.nodes[i as usize] = node;
                i
            }
            None => {
                self.nodes.push(node);
                (self.nodes.len() - 1) as u32
            }
        }
    }

    /// Register two predicate directions, each with a sentinel node.
    pub(crate) fn grow_preds(&mut self, pid: PredId) {
        debug_assert_eq!(self.watch_maps.len(), pid.idx());
        for i in 0..2u32 {
            let sentinel = self.alloc_node(WatchNode {
                atom: Atom::new(PredId::new(pid.raw() + i), 0),
                succ: NODE_NONE,
                heads: Vec::new(),
                cbs: Vec::new(),
            });
            self.watch_maps.push(BTreeMap::new());
            self.chain_start.push(sentinel);
            self.head.push(sentinel);
        }
    }

    /// Node watching `pid ≥ val`, created and linked in threshold order if
    /// absent.
    pub(crate) fn get_watch(&mut self, pid: PredId, val: Pval) -> u32 {
        if let Some(&n) = self.watch_maps[pid.idx()].get(&val) {
            return n;
        }
        let prev = self.watch_maps[pid.idx()]
            .range(..val)
            .next_back()
            .map(|(_, &n)| n)
            .unwrap_or(self.chain_start[pid.idx()]);
        let succ = self.nodes[prev as usize].succ;
        let node = self.alloc_node(WatchNode {
            atom: Atom::new(pid, val),
            succ,
            heads: Vec::new(),
            cbs: Vec::new(),
        });
        self.nodes[prev as usize].succ = node;
        self.watch_maps[pid.idx()].insert(val, node);
        node
    }

    /// Node watching `pid ≥ val` if it already exists.
    pub(crate) fn find_watch(&self, pid: PredId, val: Pval) -> Option<u32> {
        self.watch_maps[pid.idx()].get(&val).copied()
    }

    /// Garbage-collect crossed nodes of `pid` up to the current head.
    ///
    /// Root-level only: the heads of crossed nodes have all been processed
    /// and the bound can never retreat below root.
    pub(crate) fn gc_crossed(&mut self, pid: PredId) {
        while self.chain_start[pid.idx()] != self.head[pid.idx()] {
            let n = self.chain_start[pid.idx()];
            let succ = self.nodes[n as usize].succ;
            debug_assert_ne!(succ, NODE_NONE);
            self.watch_maps[pid.idx()].remove(&self.nodes[n as usize].atom.val);
            self.nodes[n as usize].heads.clear();
            self.nodes[n as usize].cbs.clear();
            self.nodes[n as usize].succ = NODE_NONE;
            self.free_nodes.push(n);
            self.chain_start[pid.idx()] = succ;
        }
    }

    /// Current decision level.
    #[must_use]
    pub fn level(&self) -> usize {
        self.trail_lim.len()
    }
}
