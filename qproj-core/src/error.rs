//! Error types shared across the qproj crates.

use thiserror::Error;

/// Errors produced by term construction, evaluation and projection.
#[derive(Debug, Clone, Error)]
pub enum QprojError {
    /// A model evaluation did not produce a value of the required kind.
    ///
    /// Raised when a subterm that must evaluate to a truth value or a
    /// numeral under the guiding model fails to do so; the caller's model
    /// does not satisfy the stated contract.
    #[error("evaluation did not produce a {expected} value for `{term}`")]
    Evaluation {
        /// The kind of value that was required ("truth", "numeral", "integer").
        expected: &'static str,
        /// Rendering of the offending term.
        term: String,
    },

    /// An operation was applied to a term of the wrong sort.
    #[error("sort mismatch: {0}")]
    Sort(String),

    /// An internal invariant was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, QprojError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = QprojError::Evaluation {
            expected: "numeral",
            term: "x".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "evaluation did not produce a numeral value for `x`"
        );
    }
}
