//! The Propagator Contract.
//!
//! Propagators are trait objects owned by a [`PropagatorStore`] and addressed
//! by [`PropId`]; every watch callback carries the owning id rather than a
//! pointer, so the store and the engine context borrow independently.

use oxicp_core::{Atom, Pval};

use crate::engine::Engine;

/// Index of a propagator in its store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropId(pub(crate) u32);

impl PropId {
    /// Raw index.
    #[must_use]
    pub const fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Verdict of a wake callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchRes {
    /// Keep the watch entry.
    Keep,
    /// Remove the watch entry.
    Drop,
}

/// Bound-change events an integer variable can be watched for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Lower-bound increase.
    Lb,
    /// Upper-bound decrease.
    Ub,
    /// Either bound change.
    LbUb,
    /// The variable became fixed.
    Fix,
}

/// A registered wake callback.
#[derive(Debug, Clone, Copy)]
pub struct Watch {
    /// Owning propagator.
    pub prop: PropId,
    /// Propagator-local tag passed back on wake.
    pub tag: u32,
    /// Skip the wake when the change originated from the owner itself.
    pub idem: bool,
}

impl Watch {
    /// A non-idempotent watch.
    #[must_use]
    pub const fn new(prop: PropId, tag: u32) -> Self {
        Self {
            prop,
            tag,
            idem: false,
        }
    }

    /// Mark the watch idempotent.
    #[must_use]
    pub const fn idem(mut self) -> Self {
        self.idem = true;
        self
    }
}

/// Contract every propagator obeys.
///
/// `propagate` runs to a local fixpoint and reports failure by filling the
/// engine's conflict buffer (directly, or through a failing enqueue).
/// `explain` materializes the lazy reason for a deduction identified by its
/// tag; every emitted clause element must have been false at the moment the
/// corresponding trail entry was created.
pub trait Propagator {
    /// React to a watched change. The default queues the propagator.
    fn wake(&mut self, engine: &mut Engine, me: PropId, tag: u32) -> WatchRes {
        let _ = tag;
        engine.queue_prop(me);
        WatchRes::Keep
    }

    /// Run to fixpoint; `false` on failure with the conflict filled in.
    fn propagate(&mut self, engine: &mut Engine, me: PropId) -> bool;

    /// Reset transient per-pass state.
    fn cleanup(&mut self) {}

    /// Simplify against root bounds; invoked only at level-0 fixpoints.
    fn root_simplify(&mut self, engine: &mut Engine) {
        let _ = engine;
    }

    /// Materialize the reason for the deduction `tag` at threshold `val`,
    /// appending clause elements to `out`.
    fn explain(&self, engine: &Engine, tag: u32, val: Pval, out: &mut Vec<Atom>);
}

/// Owner of all propagators, indexed by [`PropId`].
#[derive(Default)]
pub struct PropagatorStore {
    props: Vec<Box<dyn Propagator>>,
}

impl PropagatorStore {
    /// Id the next registered propagator will receive.
    #[must_use]
    pub fn next_id(&self) -> PropId {
        PropId(self.props.len() as u32)
    }

    /// Number of registered propagators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.props.len()
    }

    /// Is the store empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    /// Register a propagator and queue it for an initial run.
    pub fn register(&mut self, engine: &mut Engine, p: Box<dyn Propagator>) -> PropId {
        let id = PropId(self.props.len() as u32);
        self.props.push(p);
        engine.grow_props();
        engine.queue_prop(id);
        id
    }

    /// Dispatch a wake callback.
    pub fn run_wake(&mut self, engine: &mut Engine, w: Watch) -> WatchRes {
        self.props[w.prop.idx()].wake(engine, w.prop, w.tag)
    }

    /// Dispatch a propagation run.
    pub fn run_propagate(&mut self, engine: &mut Engine, id: PropId) -> bool {
        self.props[id.idx()].propagate(engine, id)
    }

    /// Dispatch a cleanup.
    pub fn run_cleanup(&mut self, id: PropId) {
        self.props[id.idx()].cleanup();
    }

    /// Root-simplify every propagator.
    pub fn root_simplify_all(&mut self, engine: &mut Engine) {
        for i in 0..self.props.len() {
            self.props[i].root_simplify(engine);
        }
    }

    /// Materialize a lazy reason.
    pub fn explain(&self, engine: &Engine, id: PropId, tag: u32, val: Pval, out: &mut Vec<Atom>) {
        self.props[id.idx()].explain(engine, tag, val, out);
    }
}

impl std::fmt::Debug for PropagatorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PropagatorStore({} propagators)", self.props.len())
    }
}
