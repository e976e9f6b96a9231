//! OxiCP Constraints - Finite-Domain Propagators.
//!
//! Posting recipes over the engine's propagator contract:
//! - integer linear `≤` and `≠` ([`int_linear_le`], [`int_linear_ne`])
//! - product, absolute value and maximum ([`int_mul`], [`int_abs`],
//!   [`int_max`])
//! - orderings, equality and disequality, half- and fully reified
//!   ([`int_le`], [`int_le_reif`], [`int_eq`], [`int_ne`])
//! - Boolean linear sums and cardinality ([`bool_lin_ge`], [`atmost`],
//!   [`atleast`])
//! - all-different ([`all_different`])
//!
//! Every posting function is idempotent and returns `false` exactly when it
//! establishes a root-level inconsistency; the reification atom `r` makes a
//! constraint half-reified (pass [`Atom::TRUE`](oxicp_core::Atom::TRUE) for
//! an unconditional post).

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod abs;
pub mod alldifferent;
pub mod bool_linear;
pub mod diseq;
pub mod linear;
pub mod max;
pub mod product;
pub mod reif_le;
pub mod sparse_set;

pub use abs::int_abs;
pub use alldifferent::all_different;
pub use bool_linear::{atleast, atmost, bool_lin_ge};
pub use diseq::int_ne;
pub use linear::{int_linear_le, int_linear_ne};
pub use max::int_max;
pub use product::{int_mul, intvar_neg};
pub use reif_le::{int_eq, int_le, int_le_reif};
pub use sparse_set::SparseSet;
