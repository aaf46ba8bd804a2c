//! rebac-domain: Core authorization domain logic
//!
//! This crate contains the core authorization logic including:
//! - Authorization model types, type system and model store
//! - Graph resolver for Check, Expand, ListObjects and ListUsers
//! - CEL condition evaluation
//! - Model validation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                rebac-domain                  │
//! ├─────────────────────────────────────────────┤
//! │  model/      - Types, type system, store    │
//! │  resolver/   - Graph resolution engine      │
//! │  cel/        - Condition expressions        │
//! │  validation/ - Model validation             │
//! └─────────────────────────────────────────────┘
//! ```

pub mod cel;
pub mod error;
pub mod model;
pub mod resolver;
pub mod validation;

// Re-export commonly used types at the crate root
pub use error::{DomainError, DomainResult};
pub use model::{ModelStore, TypeSystem};
pub use resolver::{GraphResolver, QueryContext, ResolverConfig};
