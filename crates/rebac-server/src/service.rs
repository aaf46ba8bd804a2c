//! Host-facing authorization service.
//!
//! Owns the model store and the tuple store and runs every query through a
//! single `GraphResolver`. Writes are validated against the named model
//! before they reach the store; queries read at one snapshot each.

use std::sync::Arc;

use futures::TryStreamExt;
use tracing::{debug, info, instrument, warn};

use rebac_domain::model::{AuthorizationModel, Tuple};
use rebac_domain::resolver::{
    BatchCheckItem, BatchCheckResult, CheckRequest, CheckResult, ExpandRequest, ExpandResult,
    ListObjectsRequest, ListObjectsResult, ListUsersRequest, ListUsersResult, SnapshotToken,
};
use rebac_domain::{GraphResolver, ModelStore, QueryContext, ResolverConfig};
use rebac_storage::{MemoryTupleStore, Revision, TupleFilter, TupleStore};

use crate::adapters::{stored_to_tuple, tuple_to_stored, StoreTupleReader};
use crate::config::RebacConfig;
use crate::error::ServiceResult;

/// Authorization service over a tuple store.
pub struct AuthorizationService<S: TupleStore = MemoryTupleStore> {
    models: Arc<ModelStore>,
    store: Arc<S>,
    resolver: GraphResolver<StoreTupleReader<S>, ModelStore>,
}

impl AuthorizationService<MemoryTupleStore> {
    /// In-memory service configured from `config`.
    pub fn in_memory(config: &RebacConfig) -> Self {
        let store = Arc::new(MemoryTupleStore::with_delete_mode(
            config.storage.delete_mode,
        ));
        Self::new(store, config.resolver_config())
    }
}

impl<S: TupleStore> AuthorizationService<S> {
    pub fn new(store: Arc<S>, resolver_config: ResolverConfig) -> Self {
        let models = Arc::new(ModelStore::new());
        let reader = Arc::new(StoreTupleReader::new(Arc::clone(&store)));
        let resolver = GraphResolver::with_config(reader, Arc::clone(&models), resolver_config);
        Self {
            models,
            store,
            resolver,
        }
    }

    /// Validates and stores an authorization model, returning its id.
    #[instrument(skip_all, fields(types = model.type_definitions.len()))]
    pub fn create_model(&self, model: AuthorizationModel) -> ServiceResult<String> {
        Ok(self.models.create(model)?)
    }

    /// Identifier of the most recently created model.
    pub fn latest_model_id(&self) -> ServiceResult<String> {
        Ok(self.models.latest()?)
    }

    /// Snapshot token of the newest committed write batch.
    pub async fn snapshot(&self) -> ServiceResult<SnapshotToken> {
        let revision = self.store.latest_revision().await?;
        Ok(SnapshotToken(revision.value()))
    }

    /// Atomically applies a batch of inserts and deletes.
    ///
    /// Every insert must be admitted by a direct clause of its relation in
    /// the given model. Deletes are only checked for well-formed identifiers.
    /// Returns the snapshot token at which the batch became visible.
    #[instrument(skip(self, inserts, deletes), fields(inserts = inserts.len(), deletes = deletes.len()))]
    pub async fn write_tuples(
        &self,
        model_id: &str,
        inserts: Vec<Tuple>,
        deletes: Vec<Tuple>,
    ) -> ServiceResult<SnapshotToken> {
        let types = self.models.get(model_id)?;
        for tuple in &inserts {
            types.validate_tuple(tuple)?;
        }

        let writes = inserts.iter().map(tuple_to_stored).collect();
        let removals = deletes.iter().map(tuple_to_stored).collect();
        let revision = self.store.write(writes, removals).await?;

        info!(
            model_id,
            revision = revision.value(),
            inserts = inserts.len(),
            deletes = deletes.len(),
            "Wrote tuples"
        );
        Ok(SnapshotToken(revision.value()))
    }

    /// Reads stored tuples matching `filter`, at `snapshot` or the latest state.
    #[instrument(skip(self))]
    pub async fn read_tuples(
        &self,
        filter: &TupleFilter,
        snapshot: Option<SnapshotToken>,
    ) -> ServiceResult<Vec<Tuple>> {
        let revision = match snapshot {
            Some(token) => Revision(token.0),
            None => self.store.latest_revision().await?,
        };
        let rows: Vec<_> = self.store.read(revision, filter).await?.try_collect().await?;

        let mut tuples = Vec::with_capacity(rows.len());
        for row in &rows {
            match stored_to_tuple(row) {
                Ok(tuple) => tuples.push(tuple),
                Err(reason) => warn!(tuple = %row, reason, "Skipping malformed stored tuple"),
            }
        }
        debug!(revision = revision.value(), count = tuples.len(), "Read tuples");
        Ok(tuples)
    }

    #[instrument(skip(self, ctx), fields(model_id = %ctx.authorization_model_id))]
    pub async fn check(&self, request: &CheckRequest, ctx: &QueryContext) -> ServiceResult<CheckResult> {
        Ok(self.resolver.check(request, ctx).await?)
    }

    /// Runs many checks concurrently; each item gets its own result or error.
    #[instrument(skip(self, items, ctx), fields(items = items.len()))]
    pub async fn batch_check(
        &self,
        items: Vec<BatchCheckItem>,
        ctx: &QueryContext,
    ) -> ServiceResult<BatchCheckResult> {
        Ok(self.resolver.batch_check(items, ctx).await?)
    }

    #[instrument(skip(self, ctx), fields(model_id = %ctx.authorization_model_id))]
    pub async fn expand(&self, request: &ExpandRequest, ctx: &QueryContext) -> ServiceResult<ExpandResult> {
        Ok(self.resolver.expand(request, ctx).await?)
    }

    #[instrument(skip(self, ctx), fields(model_id = %ctx.authorization_model_id))]
    pub async fn list_objects(
        &self,
        request: &ListObjectsRequest,
        ctx: &QueryContext,
    ) -> ServiceResult<ListObjectsResult> {
        Ok(self.resolver.list_objects(request, ctx).await?)
    }

    #[instrument(skip(self, ctx), fields(model_id = %ctx.authorization_model_id))]
    pub async fn list_users(
        &self,
        request: &ListUsersRequest,
        ctx: &QueryContext,
    ) -> ServiceResult<ListUsersResult> {
        Ok(self.resolver.list_users(request, ctx).await?)
    }
}
