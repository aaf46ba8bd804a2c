//! CEL-specific error types

use thiserror::Error;

/// Errors that can occur during CEL expression parsing and evaluation
#[derive(Debug, Error)]
pub enum CelError {
    /// Failed to parse the CEL expression
    #[error("failed to parse CEL expression: {message}")]
    ParseError {
        /// The expression that failed to parse
        expression: String,
        /// Description of the parse error
        message: String,
    },

    /// Failed to evaluate the CEL expression
    #[error("failed to evaluate CEL expression: {message}")]
    EvaluationError {
        /// The expression that failed to evaluate
        expression: String,
        /// Description of the evaluation error
        message: String,
    },

    /// A declared parameter has no value in the merged context
    #[error("missing required parameter '{variable}'")]
    MissingVariable { variable: String },

    /// Type mismatch during conversion or evaluation
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeError { expected: String, actual: String },
}
