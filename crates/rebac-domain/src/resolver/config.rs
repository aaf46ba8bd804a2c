//! Configuration for the graph resolver.

use std::time::Duration;

/// Configuration for the graph resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Maximum depth for graph traversal (matches OpenFGA default of 25).
    pub max_depth: u32,
    /// Default timeout for queries that carry no deadline.
    pub timeout: Duration,
    /// Default cap on ListObjects results.
    pub list_objects_max_results: usize,
    /// Default cap on ListUsers results.
    pub list_users_max_results: usize,
    /// Checks evaluated concurrently by one BatchCheck.
    pub max_concurrent_checks: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: 25,
            timeout: Duration::from_secs(30),
            list_objects_max_results: 1000,
            list_users_max_results: 1000,
            max_concurrent_checks: 50,
        }
    }
}

impl ResolverConfig {
    /// Creates a new configuration with the specified max depth.
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Creates a new configuration with the specified timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_list_objects_max_results(mut self, limit: usize) -> Self {
        self.list_objects_max_results = limit;
        self
    }

    pub fn with_list_users_max_results(mut self, limit: usize) -> Self {
        self.list_users_max_results = limit;
        self
    }

    pub fn with_max_concurrent_checks(mut self, max: usize) -> Self {
        self.max_concurrent_checks = max;
        self
    }
}
