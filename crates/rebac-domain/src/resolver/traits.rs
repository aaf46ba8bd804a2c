//! Traits for storage operations needed by the resolver.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::DomainResult;
use crate::model::{Object, Tuple, TypeSystem, User};

/// Identifies the consistent view of the tuple store a query reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotToken(pub u64);

impl fmt::Display for SnapshotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lazy sequence of tuples returned by a read.
pub type TupleStream = BoxStream<'static, DomainResult<Tuple>>;

/// Trait for tuple storage operations needed by the resolver.
///
/// Every read names the snapshot it observes, so one query sees the same
/// facts from start to finish regardless of concurrent writes.
#[async_trait]
pub trait TupleReader: Send + Sync {
    /// Snapshot of the newest committed state.
    async fn snapshot(&self) -> DomainResult<SnapshotToken>;

    /// Reads the tuples `(*, relation, object)`.
    async fn read_tuples(
        &self,
        snapshot: SnapshotToken,
        object: &Object,
        relation: &str,
    ) -> DomainResult<TupleStream>;

    /// Reads the tuples `(user, relation, object_type:*)` through the reverse index.
    async fn read_reverse(
        &self,
        snapshot: SnapshotToken,
        relation: &str,
        object_type: &str,
        user: &User,
    ) -> DomainResult<TupleStream>;
}

/// Trait for authorization model operations needed by the resolver.
#[async_trait]
pub trait ModelReader: Send + Sync {
    /// Gets the authorization model with the given id.
    async fn get_model(&self, model_id: &str) -> DomainResult<Arc<TypeSystem>>;
}
