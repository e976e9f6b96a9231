//! API error type.
//!
//! Only construction-time misuse is an error. Operational outcomes (root
//! inconsistency, UNSAT, exceeded limits) are reported through success flags
//! and result enums, never through this type.

use thiserror::Error;

/// Error raised by solver construction APIs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A variable was requested with an empty initial domain.
    #[error("empty domain: [{lb}, {ub}]")]
    EmptyDomain {
        /// Requested lower bound.
        lb: i64,
        /// Requested upper bound.
        ub: i64,
    },
    /// A sparse domain was requested with no values.
    #[error("sparse domain with no values")]
    EmptySparseDomain,
    /// The predicate index space is exhausted.
    #[error("predicate space exhausted")]
    PredSpaceExhausted,
}

/// Result alias for construction APIs.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = CoreError::EmptyDomain { lb: 3, ub: 1 };
        assert_eq!(e.to_string(), "empty domain: [3, 1]");
    }
}
