//! Clause Storage.
//!
//! Clauses live in an index arena owned by the solver; watch entries refer to
//! them by [`ClauseRef`]. Binary clauses never allocate a slot: the companion
//! literal is inlined into the watch entry itself.

use oxicp_core::Atom;

/// Reference to a clause slot in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClauseRef(pub(crate) u32);

impl ClauseRef {
    /// Raw slot index.
    #[must_use]
    pub const fn idx(self) -> usize {
        self.0 as usize
    }
}

/// One element of a clause, with a cached watch-node handle for the
/// complementary atom.
#[derive(Debug, Clone, Copy)]
pub struct ClauseElt {
    /// The literal.
    pub atom: Atom,
    /// Cached watch node of `!atom`, filled on first use.
    pub watch: Option<u32>,
}

impl ClauseElt {
    /// Element with an empty watch cache.
    #[must_use]
    pub const fn new(atom: Atom) -> Self {
        Self { atom, watch: None }
    }
}

/// Entry of a watch bucket.
///
/// `cl == None` marks an inlined binary clause: `e0` is the companion
/// literal. For long clauses `e0` caches some literal that recently
/// satisfied the clause, letting the walk skip it cheaply.
#[derive(Debug, Clone, Copy)]
pub struct ClauseHead {
    /// Stop early if this atom is entailed.
    pub e0: Atom,
    /// The clause, or `None` for an inlined binary.
    pub cl: Option<ClauseRef>,
}

/// A clause of at least two elements. Positions 0 and 1 are the watched
/// literals.
#[derive(Debug)]
pub struct Clause {
    /// Elements in watch order.
    pub elts: Vec<ClauseElt>,
    /// Was this clause learnt?
    pub learnt: bool,
    /// Activity for the learnt deletion policy.
    pub activity: f64,
}

impl Clause {
    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elts.len()
    }

    /// Always false: clauses hold at least two elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elts.is_empty()
    }
}

/// Arena of clause slots with a free list.
#[derive(Debug, Default)]
pub struct ClauseDb {
    slots: Vec<Option<Clause>>,
    free: Vec<u32>,
}

impl ClauseDb {
    /// Allocate a clause over the given atoms.
    pub fn alloc(&mut self, atoms: &[Atom], learnt: bool) -> ClauseRef {
        debug_assert!(atoms.len() >= 2);
        let cl = Clause {
            elts: atoms.iter().map(|&a| ClauseElt::new(a)).collect(),
            learnt,
            activity: 0.0,
        };
        match self.free.pop() {
            Some(i) => {
                self.slots[i as usize] = Some(cl);
                ClauseRef(i)
            }
            None => {
                self.slots.push(Some(cl));
                ClauseRef((self.slots.len() - 1) as u32)
            }
        }
    }

    /// Borrow a clause.
    #[must_use]
    pub fn get(&self, c: ClauseRef) -> &Clause {
        self.slots[c.idx()].as_ref().expect("freed clause")
    }

    /// Borrow a clause mutably.
    pub fn get_mut(&mut self, c: ClauseRef) -> &mut Clause {
        self.slots[c.idx()].as_mut().expect("freed clause")
    }

    /// Release a clause slot.
    pub fn free(&mut self, c: ClauseRef) {
        debug_assert!(self.slots[c.idx()].is_some());
        self.slots[c.idx()] = None;
        self.free.push(c.0);
    }
}
