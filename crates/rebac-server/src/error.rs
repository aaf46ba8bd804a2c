//! Service-level error type.

use thiserror::Error;

use rebac_domain::DomainError;
use rebac_storage::StorageError;

use crate::config::ConfigLoadError;

/// Errors surfaced by [`AuthorizationService`](crate::AuthorizationService).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Model, validation or query failure.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Tuple store failure outside a query (writes and reads).
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigLoadError),
}

impl ServiceError {
    /// Returns true for atomic write batches rejected by the store.
    pub fn is_write_conflict(&self) -> bool {
        matches!(
            self,
            Self::Storage(StorageError::WriteConflict { .. })
                | Self::Domain(DomainError::WriteConflict { .. })
        )
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
