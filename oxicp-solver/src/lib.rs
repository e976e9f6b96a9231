//! OxiCP Solver - Lazy-Clause-Generation Constraint Solving.
//!
//! The user-facing surface of OxiCP: create variables and atoms, post
//! constraints, and solve, with assumptions, unsat cores, restarts,
//! limits, branchers and models.
//!
//! # Examples
//!
//! ## Finite-domain satisfiability
//!
//! ```
//! use oxicp_solver::{Limits, SolveResult, Solver};
//!
//! let mut s = Solver::new();
//! let x = s.new_intvar(0, 10).unwrap();
//! let y = s.new_intvar(0, 10).unwrap();
//!
//! // 2x + 3y ≤ 15 together with x + y ≥ 6.
//! let t = oxicp_solver::TRUE;
//! s.linear_le(t, &[2, 3], &[x, y], 15);
//! s.linear_le(t, &[-1, -1], &[x, y], -6);
//!
//! assert_eq!(s.solve(Limits::unlimited()), SolveResult::Sat);
//! let m = s.get_model();
//! assert!(2 * m.int_value(x) + 3 * m.int_value(y) <= 15);
//! assert!(m.int_value(x) + m.int_value(y) >= 6);
//! ```
//!
//! ## Assumptions and cores
//!
//! ```
//! use oxicp_solver::{Limits, SolveResult, Solver};
//!
//! let mut s = Solver::new();
//! let a = s.new_bool();
//! let b = s.new_bool();
//! s.post_clause(&[!a, !b]);
//!
//! assert!(s.assume(a));
//! assert!(s.assume(b));
//! assert_eq!(s.solve(Limits::unlimited()), SolveResult::Unsat);
//! assert_eq!(s.get_conflict().len(), 2);
//!
//! s.clear_assumptions();
//! assert_eq!(s.solve(Limits::unlimited()), SolveResult::Sat);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod branch;
pub mod model;
pub mod solver;

pub use branch::{
    basic_brancher, limit_brancher, priority_brancher, seq_brancher, toggle_brancher,
    warmstart_brancher, Brancher, ValChoice, VarChoice,
};
pub use model::Model;
pub use solver::{Limits, SolveResult, Solver};

pub use oxicp_core::{Atom, CoreError, CoreResult, IntVar, PredId};
pub use oxicp_engine::{RestartStrategy, SolverConfig, Statistics};

/// The trivially true atom, for unconditional constraint posting.
pub const TRUE: Atom = Atom::TRUE;
