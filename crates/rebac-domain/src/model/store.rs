//! Append-only store of authorization models.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::info;
use ulid::Ulid;

use crate::error::{DomainError, DomainResult};
use crate::resolver::ModelReader;

use super::type_system::TypeSystem;
use super::types::AuthorizationModel;

/// Holds immutable authorization models addressed by ULID.
///
/// Models are never updated or deleted; a changed model is created under a
/// new identifier. Queries keep the `Arc<TypeSystem>` they resolved for as
/// long as they run. Identifiers increase in creation order.
#[derive(Debug, Default)]
pub struct ModelStore {
    models: DashMap<String, Arc<TypeSystem>>,
    /// Held for writing across id minting and insertion.
    latest: RwLock<Option<Ulid>>,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and stores a model, returning its new identifier.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ValidationError` if the model is invalid.
    pub fn create(&self, model: AuthorizationModel) -> DomainResult<String> {
        let type_count = model.type_definitions.len();
        let mut latest = self.latest.write().unwrap_or_else(|e| e.into_inner());

        let mut ulid = Ulid::new();
        if let Some(previous) = *latest {
            if ulid <= previous {
                ulid = previous.increment().unwrap_or(ulid);
            }
        }
        let id = ulid.to_string();
        let types = TypeSystem::new(id.clone(), model)?;

        self.models.insert(id.clone(), Arc::new(types));
        *latest = Some(ulid);
        drop(latest);

        info!(model_id = %id, types = type_count, "Created authorization model");
        Ok(id)
    }

    /// Returns the model with the given identifier.
    pub fn get(&self, model_id: &str) -> DomainResult<Arc<TypeSystem>> {
        self.models
            .get(model_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| DomainError::ModelNotFound {
                model_id: model_id.to_string(),
            })
    }

    /// Identifier of the most recently created model.
    pub fn latest(&self) -> DomainResult<String> {
        self.latest
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(Ulid::to_string)
            .ok_or_else(|| DomainError::ModelNotFound {
                model_id: "latest".to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[async_trait]
impl ModelReader for ModelStore {
    async fn get_model(&self, model_id: &str) -> DomainResult<Arc<TypeSystem>> {
        self.get(model_id)
    }
}
