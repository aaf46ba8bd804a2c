//! TupleStore trait definition.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// Monotonically increasing identifier of a committed write batch.
///
/// A read at revision `r` observes exactly the tuples written by batches
/// `<= r` and not deleted by any batch `<= r`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Revision(pub u64);

impl Revision {
    /// Revision of an empty store.
    pub const INITIAL: Revision = Revision(0);

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What to do with a delete whose target tuple does not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeleteMode {
    /// Fail the whole batch with `WriteConflict`.
    #[default]
    Strict,
    /// Skip the missing tuple.
    Lenient,
}

/// Filter for reading tuples.
///
/// `object_type` is required so that reads are always bounded by a type;
/// `object_id` is only meaningful together with `object_type`.
#[derive(Debug, Clone, Default)]
pub struct TupleFilter {
    /// Filter by object type.
    pub object_type: Option<String>,
    /// Filter by object ID.
    pub object_id: Option<String>,
    /// Filter by relation.
    pub relation: Option<String>,
    /// Filter by user (`type:id`, `type:id#relation` or `type:*`).
    pub user: Option<String>,
}

impl TupleFilter {
    /// Filter matching all tuples of one object and relation.
    pub fn for_object(
        object_type: impl Into<String>,
        object_id: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            object_type: Some(object_type.into()),
            object_id: Some(object_id.into()),
            relation: Some(relation.into()),
            user: None,
        }
    }
}

/// A stored tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTuple {
    pub object_type: String,
    pub object_id: String,
    pub relation: String,
    pub user_type: String,
    pub user_id: String,
    pub user_relation: Option<String>,
    /// Optional condition name that must be satisfied for this tuple.
    #[serde(default)]
    pub condition_name: Option<String>,
    /// Optional condition parameters bound by the writer.
    #[serde(default)]
    pub condition_context: Option<HashMap<String, serde_json::Value>>,
}

impl StoredTuple {
    /// Creates a new StoredTuple without a condition.
    pub fn new(
        object_type: impl Into<String>,
        object_id: impl Into<String>,
        relation: impl Into<String>,
        user_type: impl Into<String>,
        user_id: impl Into<String>,
        user_relation: Option<String>,
    ) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
            relation: relation.into(),
            user_type: user_type.into(),
            user_id: user_id.into(),
            user_relation,
            condition_name: None,
            condition_context: None,
        }
    }

    /// Attaches a condition to the tuple.
    pub fn with_condition(
        mut self,
        condition_name: impl Into<String>,
        condition_context: Option<HashMap<String, serde_json::Value>>,
    ) -> Self {
        self.condition_name = Some(condition_name.into());
        self.condition_context = condition_context;
        self
    }

    /// The natural key `(user, relation, object)` of this tuple.
    pub fn key(&self) -> TupleKey {
        TupleKey {
            object_type: self.object_type.clone(),
            object_id: self.object_id.clone(),
            relation: self.relation.clone(),
            user_type: self.user_type.clone(),
            user_id: self.user_id.clone(),
            user_relation: self.user_relation.clone(),
        }
    }

    /// The user rendered as `type:id` or `type:id#relation`.
    pub fn user(&self) -> String {
        match &self.user_relation {
            Some(rel) => format!("{}:{}#{}", self.user_type, self.user_id, rel),
            None => format!("{}:{}", self.user_type, self.user_id),
        }
    }

    /// The object rendered as `type:id`.
    pub fn object(&self) -> String {
        format!("{}:{}", self.object_type, self.object_id)
    }
}

impl fmt::Display for StoredTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.object(), self.relation, self.user())
    }
}

/// Natural key of a tuple. Conditions are not part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TupleKey {
    pub object_type: String,
    pub object_id: String,
    pub relation: String,
    pub user_type: String,
    pub user_id: String,
    pub user_relation: Option<String>,
}

/// Lazy sequence of tuples produced by a read.
pub type TupleStream = BoxStream<'static, StorageResult<StoredTuple>>;

/// Abstract storage interface for relationship tuples.
///
/// Implementations must be thread-safe (Send + Sync) and must give every
/// read a consistent view of the store as of the requested revision, even
/// while writes are being committed.
#[async_trait]
pub trait TupleStore: Send + Sync + 'static {
    /// Returns the revision of the newest committed write batch.
    async fn latest_revision(&self) -> StorageResult<Revision>;

    /// Atomically applies a batch of inserts and deletes.
    ///
    /// Either every tuple in the batch is applied or none is. Returns the
    /// revision at which the batch became visible.
    async fn write(
        &self,
        writes: Vec<StoredTuple>,
        deletes: Vec<StoredTuple>,
    ) -> StorageResult<Revision>;

    /// Reads tuples matching the filter as of `revision`.
    async fn read(&self, revision: Revision, filter: &TupleFilter) -> StorageResult<TupleStream>;

    /// Reads tuples with the given relation, object type and user as of
    /// `revision`, served from the reverse index. The matching objects are
    /// the returned tuples' object ids.
    async fn read_reverse(
        &self,
        revision: Revision,
        relation: &str,
        object_type: &str,
        user: &str,
    ) -> StorageResult<TupleStream>;
}

/// Maximum length of a single identifier segment.
const MAX_SEGMENT_LEN: usize = 256;

fn validate_segment(kind: &str, value: &str, allow_wildcard: bool) -> StorageResult<()> {
    if value.is_empty() {
        return Err(StorageError::InvalidInput {
            message: format!("{kind} cannot be empty"),
        });
    }
    if value.len() > MAX_SEGMENT_LEN {
        return Err(StorageError::InvalidInput {
            message: format!("{kind} exceeds {MAX_SEGMENT_LEN} bytes"),
        });
    }
    if value.contains([':', '#', ' ']) || (!allow_wildcard && value == "*") {
        return Err(StorageError::InvalidInput {
            message: format!("{kind} contains invalid characters: {value}"),
        });
    }
    Ok(())
}

/// Validates that every identifier segment of a tuple is well-formed.
pub fn validate_tuple(tuple: &StoredTuple) -> StorageResult<()> {
    validate_segment("object_type", &tuple.object_type, false)?;
    validate_segment("object_id", &tuple.object_id, false)?;
    validate_segment("relation", &tuple.relation, false)?;
    validate_segment("user_type", &tuple.user_type, false)?;
    validate_segment("user_id", &tuple.user_id, true)?;
    if let Some(rel) = &tuple.user_relation {
        validate_segment("user_relation", rel, false)?;
        if tuple.user_id == "*" {
            return Err(StorageError::InvalidInput {
                message: format!("wildcard user cannot carry a relation: {}", tuple.user()),
            });
        }
    }
    if let Some(name) = &tuple.condition_name {
        if name.is_empty() {
            return Err(StorageError::InvalidInput {
                message: "condition_name cannot be empty".to_string(),
            });
        }
    }
    Ok(())
}

/// Parses a user filter string into `(user_type, user_id, user_relation)`.
///
/// Accepts `type:id`, `type:id#relation` and `type:*`.
pub fn parse_user_filter(user: &str) -> StorageResult<(String, String, Option<String>)> {
    let invalid = || StorageError::InvalidFilter {
        message: format!("user must be in 'type:id' or 'type:id#relation' format: {user}"),
    };
    let (object_part, relation) = match user.split_once('#') {
        Some((obj, rel)) if !rel.is_empty() => (obj, Some(rel.to_string())),
        Some(_) => return Err(invalid()),
        None => (user, None),
    };
    let (user_type, user_id) = object_part.split_once(':').ok_or_else(invalid)?;
    if user_type.is_empty() || user_id.is_empty() {
        return Err(invalid());
    }
    Ok((user_type.to_string(), user_id.to_string(), relation))
}
