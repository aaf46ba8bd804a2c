//! Internal per-query state for the graph resolver.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{DomainError, DomainResult};
use crate::model::{Tuple, TypeSystem};

use super::traits::SnapshotToken;

/// Everything a query resolves once at its start and then reads while it
/// traverses the graph.
#[derive(Debug, Clone)]
pub(crate) struct QueryScope {
    pub(crate) types: Arc<TypeSystem>,
    pub(crate) snapshot: SnapshotToken,
    pub(crate) contextual_tuples: Arc<Vec<Tuple>>,
    pub(crate) context: Arc<HashMap<String, serde_json::Value>>,
    pub(crate) max_depth: u32,
}

impl QueryScope {
    /// Fails once `depth` has used up the budget.
    pub(crate) fn check_depth(&self, depth: u32) -> DomainResult<()> {
        if depth >= self.max_depth {
            return Err(DomainError::ResolutionDepthExceeded {
                max_depth: self.max_depth,
            });
        }
        Ok(())
    }
}

/// Internal context for graph traversal.
///
/// The visited set is scoped to the current resolution path: siblings do not
/// see each other's entries, so a node reachable by two routes is evaluated
/// on both.
#[derive(Debug, Clone)]
pub(crate) struct TraversalContext {
    /// Current traversal depth.
    pub(crate) depth: u32,
    /// Nodes on the current path. Wrapped in Arc for cheap cloning when not mutating.
    pub(crate) visited: Arc<HashSet<String>>,
}

impl TraversalContext {
    pub(crate) fn new() -> Self {
        Self {
            depth: 0,
            visited: Arc::new(HashSet::new()),
        }
    }

    pub(crate) fn increment_depth(&self) -> Self {
        Self {
            depth: self.depth + 1,
            visited: Arc::clone(&self.visited),
        }
    }

    pub(crate) fn with_visited(&self, key: &str) -> Self {
        // Clone the inner HashSet only when adding new entries (copy-on-write)
        let mut new_visited = (*self.visited).clone();
        new_visited.insert(key.to_string());
        Self {
            depth: self.depth,
            visited: Arc::new(new_visited),
        }
    }

    pub(crate) fn has_visited(&self, key: &str) -> bool {
        self.visited.contains(key)
    }
}
