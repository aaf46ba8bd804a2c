//! rebac-server: Host-facing authorization service
//!
//! Wires the model store, the tuple store and the graph resolver together
//! behind [`AuthorizationService`], and carries the ambient pieces the
//! `rebac` binary needs: layered configuration and logging setup.

pub mod adapters;
pub mod config;
pub mod error;
pub mod observability;
pub mod service;

pub use config::{ConfigLoadError, RebacConfig};
pub use error::{ServiceError, ServiceResult};
pub use service::AuthorizationService;
