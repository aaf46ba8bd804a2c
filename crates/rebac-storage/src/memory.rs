//! In-memory MVCC tuple store.
//!
//! Every tuple version records the revision that created it and the revision
//! that deleted it, so reads at any committed revision see a consistent
//! snapshot while writes continue. A write batch becomes visible all at once
//! when the revision counter is advanced after all of its versions are in
//! place.
//!
//! Deleted versions stay until [`MemoryTupleStore::compact`] drops the ones
//! no retained revision can see.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use tracing::{debug, instrument};

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    parse_user_filter, validate_tuple, DeleteMode, Revision, StoredTuple, TupleFilter, TupleKey,
    TupleStore, TupleStream,
};

/// Sentinel for "not deleted".
const LIVE: u64 = u64::MAX;

/// One version of a tuple.
#[derive(Debug)]
struct TupleVersion {
    tuple: StoredTuple,
    created: u64,
    deleted: AtomicU64,
}

impl TupleVersion {
    fn visible_at(&self, revision: u64) -> bool {
        self.created <= revision && self.deleted.load(Ordering::Acquire) > revision
    }

    fn is_live(&self) -> bool {
        self.deleted.load(Ordering::Acquire) == LIVE
    }
}

/// Forward index key: (object type, object id, relation).
type ObjectKey = (String, String, String);

/// Reverse index key: (relation, object type, user).
type ReverseKey = (String, String, String);

/// In-memory implementation of TupleStore.
///
/// # Performance Characteristics
///
/// - **Write batch**: O(B) index updates for a batch of B tuples
/// - **Read by object + relation**: O(V) over the versions of that key
/// - **Reverse read**: O(V) over the versions indexed under (relation, type, user)
/// - **Read by object type only**: O(T) over all versions of that type
///
/// Uses DashMap for concurrent access; writers are serialized by a mutex so
/// that conflict detection and publication of a batch are atomic.
#[derive(Debug, Default)]
pub struct MemoryTupleStore {
    delete_mode: DeleteMode,
    revision: AtomicU64,
    /// Oldest revision reads may still ask for.
    oldest: AtomicU64,
    write_lock: Mutex<()>,
    by_object: DashMap<ObjectKey, Vec<Arc<TupleVersion>>>,
    by_user: DashMap<ReverseKey, Vec<Arc<TupleVersion>>>,
    by_type: DashMap<String, Vec<Arc<TupleVersion>>>,
}

impl MemoryTupleStore {
    /// Creates a new in-memory store with strict delete semantics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory store with the given delete mode.
    pub fn with_delete_mode(delete_mode: DeleteMode) -> Self {
        Self {
            delete_mode,
            ..Self::default()
        }
    }

    /// Creates a new in-memory store wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn delete_mode(&self) -> DeleteMode {
        self.delete_mode
    }

    fn object_key(tuple: &StoredTuple) -> ObjectKey {
        (
            tuple.object_type.clone(),
            tuple.object_id.clone(),
            tuple.relation.clone(),
        )
    }

    fn reverse_key(tuple: &StoredTuple) -> ReverseKey {
        (
            tuple.relation.clone(),
            tuple.object_type.clone(),
            tuple.user(),
        )
    }

    /// Returns the live version of a tuple key, if any.
    fn find_live(&self, key: &TupleKey) -> Option<Arc<TupleVersion>> {
        let object_key = (
            key.object_type.clone(),
            key.object_id.clone(),
            key.relation.clone(),
        );
        self.by_object.get(&object_key).and_then(|versions| {
            versions
                .iter()
                .find(|v| v.is_live() && v.tuple.key() == *key)
                .cloned()
        })
    }

    fn check_revision(&self, revision: Revision) -> StorageResult<u64> {
        let latest = self.revision.load(Ordering::Acquire);
        if revision.0 > latest {
            return Err(StorageError::InvalidRevision {
                requested: revision.0,
                latest,
            });
        }
        let oldest = self.oldest.load(Ordering::Acquire);
        if revision.0 < oldest {
            return Err(StorageError::RevisionCompacted {
                requested: revision.0,
                oldest,
            });
        }
        Ok(revision.0)
    }

    /// Drops every version deleted at or before `retain_from`, returning how
    /// many versions were removed.
    ///
    /// Reads at `retain_from` and later are unaffected; reads at earlier
    /// revisions fail with `RevisionCompacted` from then on.
    #[instrument(skip(self))]
    pub fn compact(&self, retain_from: Revision) -> StorageResult<usize> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StorageError::InternalError {
                message: "write lock poisoned".to_string(),
            })?;

        let latest = self.revision.load(Ordering::Acquire);
        if retain_from.0 > latest {
            return Err(StorageError::InvalidRevision {
                requested: retain_from.0,
                latest,
            });
        }
        // Published before pruning so a read racing the prune fails its recheck.
        let horizon = self.oldest.fetch_max(retain_from.0, Ordering::AcqRel).max(retain_from.0);

        let removed = prune(&self.by_object, horizon);
        prune(&self.by_user, horizon);
        prune(&self.by_type, horizon);

        debug!(horizon, removed, "Compacted deleted tuple versions");
        Ok(removed)
    }

    /// Collects the versions visible at `revision` and hands them out lazily.
    fn visible_stream(
        versions: Option<Vec<Arc<TupleVersion>>>,
        revision: u64,
        predicate: impl Fn(&StoredTuple) -> bool + Send + 'static,
    ) -> TupleStream {
        let versions = versions.unwrap_or_default();
        stream::iter(versions)
            .filter_map(move |v| {
                let item = (v.visible_at(revision) && predicate(&v.tuple)).then(|| v.tuple.clone());
                futures::future::ready(item.map(Ok))
            })
            .boxed()
    }
}

/// Removes versions deleted at or before `horizon` from one index.
fn prune<K: Eq + Hash>(index: &DashMap<K, Vec<Arc<TupleVersion>>>, horizon: u64) -> usize {
    let mut removed = 0;
    index.retain(|_, versions| {
        let before = versions.len();
        versions.retain(|v| v.deleted.load(Ordering::Acquire) > horizon);
        removed += before - versions.len();
        !versions.is_empty()
    });
    removed
}

#[async_trait]
impl TupleStore for MemoryTupleStore {
    async fn latest_revision(&self) -> StorageResult<Revision> {
        Ok(Revision(self.revision.load(Ordering::Acquire)))
    }

    #[instrument(skip_all, fields(writes = writes.len(), deletes = deletes.len()))]
    async fn write(
        &self,
        writes: Vec<StoredTuple>,
        deletes: Vec<StoredTuple>,
    ) -> StorageResult<Revision> {
        for tuple in writes.iter().chain(deletes.iter()) {
            validate_tuple(tuple)?;
        }

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StorageError::InternalError {
                message: "write lock poisoned".to_string(),
            })?;

        // Phase 1: validate the whole batch against the latest state.
        let delete_keys: HashSet<TupleKey> = deletes.iter().map(StoredTuple::key).collect();
        let mut pending: HashMap<TupleKey, StoredTuple> = HashMap::new();
        for tuple in writes {
            let key = tuple.key();
            if delete_keys.contains(&key) {
                return Err(StorageError::WriteConflict {
                    message: format!("tuple {tuple} is both written and deleted in one batch"),
                });
            }
            if let Some(existing) = pending.get(&key) {
                if existing.condition_name != tuple.condition_name
                    || existing.condition_context != tuple.condition_context
                {
                    return Err(StorageError::WriteConflict {
                        message: format!("tuple {tuple} written twice with different conditions"),
                    });
                }
                continue;
            }
            if let Some(live) = self.find_live(&key) {
                if live.tuple.condition_name != tuple.condition_name
                    || live.tuple.condition_context != tuple.condition_context
                {
                    return Err(StorageError::WriteConflict {
                        message: format!(
                            "tuple {tuple} already exists with a different condition; delete it first"
                        ),
                    });
                }
                // Identical tuple already stored: idempotent no-op.
                continue;
            }
            pending.insert(key, tuple);
        }

        let mut targets = Vec::with_capacity(delete_keys.len());
        for key in &delete_keys {
            match self.find_live(key) {
                Some(version) => targets.push(version),
                None if self.delete_mode == DeleteMode::Strict => {
                    return Err(StorageError::WriteConflict {
                        message: format!(
                            "cannot delete missing tuple {}:{}#{}@{}:{}{}",
                            key.object_type,
                            key.object_id,
                            key.relation,
                            key.user_type,
                            key.user_id,
                            key.user_relation
                                .as_ref()
                                .map(|r| format!("#{r}"))
                                .unwrap_or_default()
                        ),
                    });
                }
                None => {}
            }
        }

        // Phase 2: apply. Nothing below can fail.
        let next = self.revision.load(Ordering::Acquire) + 1;
        for version in &targets {
            version.deleted.store(next, Ordering::Release);
        }
        let inserted = pending.len();
        for (_, tuple) in pending {
            let version = Arc::new(TupleVersion {
                created: next,
                deleted: AtomicU64::new(LIVE),
                tuple,
            });
            self.by_object
                .entry(Self::object_key(&version.tuple))
                .or_default()
                .push(Arc::clone(&version));
            self.by_user
                .entry(Self::reverse_key(&version.tuple))
                .or_default()
                .push(Arc::clone(&version));
            self.by_type
                .entry(version.tuple.object_type.clone())
                .or_default()
                .push(version);
        }
        self.revision.store(next, Ordering::Release);

        debug!(
            revision = next,
            inserted,
            deleted = targets.len(),
            "Committed tuple write batch"
        );
        Ok(Revision(next))
    }

    async fn read(&self, revision: Revision, filter: &TupleFilter) -> StorageResult<TupleStream> {
        let revision = self.check_revision(revision)?;

        let object_type = filter
            .object_type
            .clone()
            .ok_or_else(|| StorageError::InvalidFilter {
                message: "object_type is required for tuple reads".to_string(),
            })?;

        let user_filter = filter
            .user
            .as_deref()
            .map(parse_user_filter)
            .transpose()?;

        let object_id = filter.object_id.clone();
        let relation = filter.relation.clone();

        // Fast path: fully specified object and relation hits the forward index.
        let versions = match (&object_id, &relation) {
            (Some(id), Some(rel)) => self
                .by_object
                .get(&(object_type.clone(), id.clone(), rel.clone()))
                .map(|v| v.value().clone()),
            _ => self.by_type.get(&object_type).map(|v| v.value().clone()),
        };
        self.check_revision(Revision(revision))?;

        Ok(Self::visible_stream(versions, revision, move |t| {
            object_id.as_ref().map_or(true, |id| &t.object_id == id)
                && relation.as_ref().map_or(true, |r| &t.relation == r)
                && user_filter.as_ref().map_or(true, |(ut, ui, ur)| {
                    &t.user_type == ut && &t.user_id == ui && &t.user_relation == ur
                })
        }))
    }

    async fn read_reverse(
        &self,
        revision: Revision,
        relation: &str,
        object_type: &str,
        user: &str,
    ) -> StorageResult<TupleStream> {
        let revision = self.check_revision(revision)?;
        // Validates the user format; the index key is the rendered user string.
        parse_user_filter(user)?;

        let key = (relation.to_string(), object_type.to_string(), user.to_string());
        let versions = self.by_user.get(&key).map(|v| v.value().clone());
        self.check_revision(Revision(revision))?;
        Ok(Self::visible_stream(versions, revision, |_| true))
    }
}
