//! Relationship resolution: Check, BatchCheck, Expand, ListObjects and ListUsers.
//!
//! Every query evaluates one authorization model against one snapshot of
//! the tuple store, plus any contextual tuples supplied with the request.
//! See [`GraphResolver`] for the evaluation rules.

mod condition;
mod config;
mod context;
mod graph_resolver;
mod list_objects;
mod list_users;
mod traits;
mod types;

#[cfg(test)]
mod tests;

pub use config::ResolverConfig;
pub use graph_resolver::GraphResolver;
pub use traits::{ModelReader, SnapshotToken, TupleReader, TupleStream};
pub use types::*;
