//! Database backends.
//!
//! Currently supports SQLite through sqlx.
//!
//! # Example
//!
//! ```ignore
//! let pool = SqlitePool::connect("sqlite:data/webprofiler.db?mode=rwc", 5).await?;
//! let store = SqliteRecordStore::new(pool);
//! ```

mod sqlite;

pub use sqlite::{DEFAULT_MAX_CONNECTIONS, SqlitePool, SqliteRecordStore};
