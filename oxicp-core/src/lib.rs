//! OxiCP Core - Predicate and Atom Representations.
//!
//! This crate provides the atomic vocabulary shared by the OxiCP constraint
//! solver crates:
//! - the raw tick scale ([`Pval`], [`PVAL_MAX`]) all bounds live on
//! - complementary predicate pairs and threshold atoms ([`PredId`], [`Atom`])
//! - integer-variable views over predicates ([`IntVar`])
//!
//! # Examples
//!
//! ```
//! use oxicp_core::{Atom, IntVar, PredId};
//!
//! let x = IntVar::new(PredId::new(0), 0);
//! let at = x.ge(3);
//!
//! // Negation lands on the paired predicate and is an involution.
//! assert_eq!(!!at, at);
//! assert_eq!(x.le(2), !at);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod atom;
pub mod error;
pub mod intvar;
pub mod pval;

pub use atom::{Atom, PredId};
pub use error::{CoreError, CoreResult};
pub use intvar::IntVar;
pub use pval::{int_of_pval, pval_inv, pval_of_int, Pval, PVAL_MAX};
