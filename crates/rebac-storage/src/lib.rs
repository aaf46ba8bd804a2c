//! rebac-storage: Tuple store abstraction layer
//!
//! This crate provides the storage abstraction for relationship tuples:
//! - `TupleStore` trait with snapshot-token reads and atomic batch writes
//! - Forward and reverse tuple indices
//! - In-memory MVCC implementation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               rebac-storage                  │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs   - TupleStore trait definition  │
//! │  memory.rs   - In-memory MVCC store         │
//! │  error.rs    - Storage errors               │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use memory::MemoryTupleStore;
pub use traits::{
    parse_user_filter, validate_tuple, DeleteMode, Revision, StoredTuple, TupleFilter, TupleKey,
    TupleStore, TupleStream,
};
