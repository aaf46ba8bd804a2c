//! Domain error types for authorization operations.

use thiserror::Error;

use crate::validation::ValidationError;

/// Domain-specific errors for authorization operations.
///
/// A query never turns one of these into an allow or deny decision.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No authorization model with this identifier.
    #[error("authorization model not found: {model_id}")]
    ModelNotFound { model_id: String },

    /// Object type or relation is not defined in the model.
    #[error("relation '{relation}' not found on type '{type_name}'")]
    UnknownRelation { type_name: String, relation: String },

    /// Tuple user or object type is not permitted by the relation.
    #[error("type mismatch: {message}")]
    TypeMismatch { message: String },

    /// Authorization model failed validation.
    #[error("invalid authorization model: {}", join_errors(.errors))]
    ValidationError { errors: Vec<ValidationError> },

    /// Atomic write batch violates store invariants.
    #[error("write conflict: {message}")]
    WriteConflict { message: String },

    /// Recursion budget exhausted. The result is inconclusive.
    #[error("resolution depth exceeded (max: {max_depth})")]
    ResolutionDepthExceeded { max_depth: u32 },

    /// Caller deadline or configured timeout expired.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// A condition is missing from the model or failed to evaluate.
    #[error("condition '{condition}' failed: {message}")]
    ConditionError { condition: String, message: String },

    /// Malformed identifier or request.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Tuple store failure.
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl DomainError {
    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub(crate) fn unknown_relation(type_name: &str, relation: &str) -> Self {
        Self::UnknownRelation {
            type_name: type_name.to_string(),
            relation: relation.to_string(),
        }
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
