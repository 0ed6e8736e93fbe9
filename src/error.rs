//! Error types for the trellis-solver library
//!
//! This module provides the main error and result types used throughout the library.
//! All errors use the `thiserror` crate for automatic trait implementations.
//!
//! Numerical indefiniteness of a damped linear system is deliberately *not* an
//! error: it is a variant of [`crate::linear::SolveOutcome`], resolved inside
//! the Levenberg-Marquardt trial loop. Everything in this enum is fatal and
//! propagates to the caller unchanged.

use thiserror::Error;

/// Main result type used throughout the trellis-solver library
pub type TrellisResult<T> = Result<T, TrellisError>;

/// Main error type for the trellis-solver library
#[derive(Debug, Clone, Error)]
pub enum TrellisError {
    /// Invalid configuration (unknown factorization/elimination selector,
    /// non-positive damping parameters). Detected before any linearization
    /// or solve attempt, never retried.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid input (malformed signatures, incomplete assignments,
    /// dimension mismatches)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Linear algebra related errors (matrix assembly, symbolic analysis)
    #[error("Linear algebra error: {0}")]
    LinearAlgebra(String),

    /// Solver related errors
    #[error("Solver error: {0}")]
    Solver(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trellis_error_display() {
        let error = TrellisError::LinearAlgebra("matrix is singular".to_string());
        assert_eq!(
            error.to_string(),
            "Linear algebra error: matrix is singular"
        );
    }

    #[test]
    fn test_invalid_config_display() {
        let error = TrellisError::InvalidConfig("unknown factorization 'ldl'".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: unknown factorization 'ldl'"
        );
    }

    #[test]
    fn test_trellis_result_ok() {
        let result: TrellisResult<i32> = Ok(42);
        assert!(result.is_ok());
    }
}
