//! Adapters that bridge the storage layer to the domain layer.
//!
//! The domain layer (rebac-domain) defines the `TupleReader` trait it
//! resolves queries against. The storage layer (rebac-storage) implements
//! `TupleStore`. [`StoreTupleReader`] connects the two and converts between
//! the flat `StoredTuple` rows and the domain's typed `Tuple`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future;
use futures::stream::StreamExt;
use tracing::warn;

use rebac_domain::error::{DomainError, DomainResult};
use rebac_domain::model::{Object, Tuple, User};
use rebac_domain::resolver::{SnapshotToken, TupleReader, TupleStream};
use rebac_storage::{Revision, StorageError, StoredTuple, TupleFilter, TupleStore};

/// Implements the domain's `TupleReader` on top of a `TupleStore`.
pub struct StoreTupleReader<S: TupleStore> {
    storage: Arc<S>,
}

impl<S: TupleStore> StoreTupleReader<S> {
    /// Creates a new adapter wrapping the given storage.
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl<S: TupleStore> TupleReader for StoreTupleReader<S> {
    async fn snapshot(&self) -> DomainResult<SnapshotToken> {
        let revision = self
            .storage
            .latest_revision()
            .await
            .map_err(storage_to_domain)?;
        Ok(SnapshotToken(revision.value()))
    }

    async fn read_tuples(
        &self,
        snapshot: SnapshotToken,
        object: &Object,
        relation: &str,
    ) -> DomainResult<TupleStream> {
        let filter = TupleFilter::for_object(&object.object_type, &object.object_id, relation);
        let stream = self
            .storage
            .read(Revision(snapshot.0), &filter)
            .await
            .map_err(storage_to_domain)?;
        Ok(into_domain_stream(stream))
    }

    async fn read_reverse(
        &self,
        snapshot: SnapshotToken,
        relation: &str,
        object_type: &str,
        user: &User,
    ) -> DomainResult<TupleStream> {
        let stream = self
            .storage
            .read_reverse(Revision(snapshot.0), relation, object_type, &user.to_string())
            .await
            .map_err(storage_to_domain)?;
        Ok(into_domain_stream(stream))
    }
}

fn into_domain_stream(stream: rebac_storage::TupleStream) -> TupleStream {
    stream
        .filter_map(|row| {
            future::ready(match row {
                Ok(stored) => match stored_to_tuple(&stored) {
                    Ok(tuple) => Some(Ok(tuple)),
                    Err(reason) => {
                        warn!(tuple = %stored, reason, "Skipping malformed stored tuple");
                        None
                    }
                },
                Err(e) => Some(Err(storage_to_domain(e))),
            })
        })
        .boxed()
}

/// Converts a stored row into a domain tuple.
pub fn stored_to_tuple(stored: &StoredTuple) -> Result<Tuple, &'static str> {
    let tuple = Tuple::parse(&stored.user(), &stored.relation, &stored.object())?;
    Ok(match &stored.condition_name {
        Some(name) => tuple.with_condition(
            name.clone(),
            stored.condition_context.clone().unwrap_or_default(),
        ),
        None => tuple,
    })
}

/// Converts a domain tuple into a storage row. An empty condition context
/// is stored as absent.
pub fn tuple_to_stored(tuple: &Tuple) -> StoredTuple {
    let (user_type, user_id, user_relation) = match &tuple.user {
        User::Object(object) => (object.object_type.clone(), object.object_id.clone(), None),
        User::Userset { object, relation } => (
            object.object_type.clone(),
            object.object_id.clone(),
            Some(relation.clone()),
        ),
        User::Wildcard { user_type } => (user_type.clone(), "*".to_string(), None),
    };

    let stored = StoredTuple::new(
        &tuple.object.object_type,
        &tuple.object.object_id,
        &tuple.relation,
        user_type,
        user_id,
        user_relation,
    );
    match &tuple.condition {
        Some(condition) => {
            let context: Option<HashMap<_, _>> =
                (!condition.context.is_empty()).then(|| condition.context.clone());
            stored.with_condition(&condition.name, context)
        }
        None => stored,
    }
}

/// Maps a storage failure onto the domain taxonomy.
pub fn storage_to_domain(err: StorageError) -> DomainError {
    match err {
        StorageError::WriteConflict { message } => DomainError::WriteConflict { message },
        StorageError::InvalidInput { message } => DomainError::InvalidInput { message },
        other => DomainError::Storage {
            message: other.to_string(),
        },
    }
}
