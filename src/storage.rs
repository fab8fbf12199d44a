//! Storage Layer
//!
//! Persistence of profiling records, keyed by token.
//!
//! # Components
//!
//! - [`CollectionRecord`]: One profiled request with every collector's snapshot
//! - [`RecordStore`]: Async store facade with atomic `save`
//! - [`MemoryRecordStore`] / [`SqliteRecordStore`]: Backends
//! - [`StorageBuilder`] / [`StorageHandles`]: Initialization and lifecycle management

mod builder;
pub mod db;
mod error;
mod schema;
mod store;
mod types;

pub use builder::{StorageBuilder, StorageHandles};
pub use db::{SqlitePool, SqliteRecordStore};
pub use error::StorageError;
pub use store::{DEFAULT_LIST_LIMIT, MemoryRecordStore, RecordStore};
pub use types::{CollectionRecord, NewRecord, generate_token};
