//! Types for the graph resolver.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::DomainResult;
use crate::model::{Tuple, User};

use super::traits::SnapshotToken;

/// Per-query inputs shared by all four operations.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    /// The authorization model to evaluate against.
    pub authorization_model_id: String,
    /// Snapshot to read at. Defaults to the latest snapshot at query start.
    pub snapshot: Option<SnapshotToken>,
    /// Tuples added for this query only. They take precedence over stored
    /// tuples with the same (user, relation, object).
    /// Wrapped in Arc for cheap cloning during graph traversal.
    pub contextual_tuples: Arc<Vec<Tuple>>,
    /// Values bound to condition parameters.
    pub context: Arc<HashMap<String, serde_json::Value>>,
    /// Overrides the configured maximum resolution depth.
    pub max_depth: Option<u32>,
    /// Overrides the configured timeout.
    pub deadline: Option<Instant>,
}

impl QueryContext {
    pub fn new(authorization_model_id: impl Into<String>) -> Self {
        Self {
            authorization_model_id: authorization_model_id.into(),
            ..Self::default()
        }
    }

    pub fn with_snapshot(mut self, snapshot: SnapshotToken) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn with_contextual_tuples(mut self, tuples: Vec<Tuple>) -> Self {
        self.contextual_tuples = Arc::new(tuples);
        self
    }

    pub fn with_context(mut self, context: HashMap<String, serde_json::Value>) -> Self {
        self.context = Arc::new(context);
        self
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }
}

// ============================================================
// Check API Types
// ============================================================

/// Request for a permission check.
#[derive(Debug, Clone)]
pub struct CheckRequest {
    /// The user identifier (e.g., "user:alice" or "group:eng#member").
    pub user: String,
    /// The relation to check (e.g., "viewer").
    pub relation: String,
    /// The object identifier (e.g., "document:readme").
    pub object: String,
}

impl CheckRequest {
    pub fn new(
        user: impl Into<String>,
        relation: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            relation: relation.into(),
            object: object.into(),
        }
    }
}

/// Result of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckResult {
    /// Whether the check is allowed.
    pub allowed: bool,
}

/// One entry of a batch check.
#[derive(Debug, Clone)]
pub struct BatchCheckItem {
    /// Caller-chosen identifier used to key the result.
    pub correlation_id: String,
    pub request: CheckRequest,
}

impl BatchCheckItem {
    pub fn new(correlation_id: impl Into<String>, request: CheckRequest) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            request,
        }
    }
}

/// Results of a batch check, one per correlation id.
#[derive(Debug)]
pub struct BatchCheckResult {
    pub results: HashMap<String, DomainResult<CheckResult>>,
}

// ============================================================
// Expand API Types
// ============================================================

/// Request for expanding a relation tree.
#[derive(Debug, Clone)]
pub struct ExpandRequest {
    /// The relation to expand (e.g., "viewer").
    pub relation: String,
    /// The object to expand (e.g., "document:readme").
    pub object: String,
}

impl ExpandRequest {
    pub fn new(relation: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            relation: relation.into(),
            object: object.into(),
        }
    }
}

/// Result of expanding a relation tree.
#[derive(Debug, Clone)]
pub struct ExpandResult {
    /// The expansion tree showing how users relate to the object.
    pub tree: UsersetTree,
}

/// A tree structure representing the expansion of a relation.
#[derive(Debug, Clone)]
pub struct UsersetTree {
    /// The root node of the expansion tree.
    pub root: ExpandNode,
}

/// A node in the expansion tree. Every node is named `type:id#relation`.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpandNode {
    /// A leaf node containing direct users or a reference.
    Leaf(ExpandLeaf),
    /// A union of child nodes (any child grants access).
    Union {
        name: String,
        nodes: Vec<ExpandNode>,
    },
    /// An intersection of child nodes (all children must grant access).
    Intersection {
        name: String,
        nodes: Vec<ExpandNode>,
    },
    /// A difference (exclusion) of nodes (base minus subtract).
    Difference {
        name: String,
        base: Box<ExpandNode>,
        subtract: Box<ExpandNode>,
    },
}

impl ExpandNode {
    /// Returns the name of this node.
    pub fn name(&self) -> &str {
        match self {
            ExpandNode::Leaf(leaf) => &leaf.name,
            ExpandNode::Union { name, .. } => name,
            ExpandNode::Intersection { name, .. } => name,
            ExpandNode::Difference { name, .. } => name,
        }
    }
}

/// A leaf node in the expansion tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandLeaf {
    pub name: String,
    pub value: ExpandLeafValue,
}

/// The value of a leaf node.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpandLeafValue {
    /// Users written directly to the relation, including usersets and wildcards.
    Users(Vec<String>),
    /// Reference to another relation on the same object (`type:id#relation`).
    Computed { userset: String },
    /// The usersets reached through the tupleset (`parent:id#relation` each).
    TupleToUserset {
        tupleset: String,
        computed: Vec<String>,
    },
}

// ============================================================
// ListObjects API Types
// ============================================================

/// Request for listing objects accessible to a user.
#[derive(Debug, Clone)]
pub struct ListObjectsRequest {
    /// The user to list objects for.
    pub user: String,
    /// The relation to check (e.g., "viewer").
    pub relation: String,
    /// The object type to list (e.g., "document").
    pub object_type: String,
    /// Maximum number of results. Defaults to the configured cap.
    pub limit: Option<usize>,
}

impl ListObjectsRequest {
    pub fn new(
        user: impl Into<String>,
        relation: impl Into<String>,
        object_type: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            relation: relation.into(),
            object_type: object_type.into(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Result of listing objects accessible to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListObjectsResult {
    /// Sorted object identifiers in "type:id" format.
    pub objects: Vec<String>,
    /// Whether more objects qualified than were returned.
    pub truncated: bool,
}

// ============================================================
// ListUsers API Types
// ============================================================

/// Request for listing users with a specific relation to an object.
/// This is the inverse of ListObjects.
#[derive(Debug, Clone)]
pub struct ListUsersRequest {
    /// The object to list users for (type:id format).
    pub object: String,
    /// The relation to check (e.g., "viewer").
    pub relation: String,
    /// User types to return. Empty returns every type.
    pub user_filters: Vec<UserFilter>,
    /// Maximum number of results. Defaults to the configured cap.
    pub limit: Option<usize>,
}

impl ListUsersRequest {
    pub fn new(object: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            relation: relation.into(),
            user_filters: Vec::new(),
            limit: None,
        }
    }

    pub fn with_filter(mut self, filter: UserFilter) -> Self {
        self.user_filters.push(filter);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Filter for user types in ListUsers requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserFilter {
    /// The type to filter for (e.g., "user", "group").
    pub type_name: String,
    /// Optional relation for userset filters (e.g., "member" for "group#member").
    pub relation: Option<String>,
}

impl UserFilter {
    /// Creates a new UserFilter for a direct type.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            relation: None,
        }
    }

    /// Creates a new UserFilter for a userset type (e.g., group#member).
    pub fn with_relation(type_name: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            relation: Some(relation.into()),
        }
    }

    /// Returns true if the user passes this filter.
    pub fn matches(&self, user: &User) -> bool {
        if user.user_type() != self.type_name {
            return false;
        }
        match user {
            User::Userset { relation, .. } => self.relation.as_deref() == Some(relation.as_str()),
            User::Object(_) | User::Wildcard { .. } => self.relation.is_none(),
        }
    }
}

/// Result of listing users with relation to an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListUsersResult {
    /// Sorted users (concrete, usersets and wildcards) holding the relation.
    pub users: Vec<User>,
    /// Users carved out of a wildcard by an exclusion.
    pub excluded_users: Vec<User>,
    /// Whether more users qualified than were returned.
    pub truncated: bool,
}
