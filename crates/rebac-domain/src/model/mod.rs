//! Authorization model types, type system and model store.
//!
//! This module contains:
//! - Core type definitions (User, Object, Tuple, Userset)
//! - The validated, indexed `TypeSystem` for one model
//! - The append-only `ModelStore`

mod store;
mod type_system;
mod types;
#[cfg(test)]
mod types_proptest;

pub use store::ModelStore;
pub use type_system::{CompiledCondition, TypeSystem};
pub use types::*;
