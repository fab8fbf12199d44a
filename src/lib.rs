//! webprofiler - In-process Web Request Profiler
//!
//! This crate profiles HTTP exchanges from inside the application serving
//! them. It can be used as a library wrapping an existing axum router, or run
//! as a standalone demo with the `webprofiler` executable.
//!
//! # Architecture
//!
//! - **Collectors**: Pluggable units extracting one category of data per request
//! - **Engine**: Runs the collectors, persists a record, tags and rewrites the response
//! - **Storage**: SQLite (sqlx) or in-memory persistence of records, keyed by token
//! - **Presentation**: Injected toolbar, profiler pages and a JSON API
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use axum::{Router, response::Html, routing::get};
//! use webprofiler::{
//!     collector::{CollectorRegistry, builtin},
//!     engine::ProfilerEngine,
//!     router::ToolbarRouter,
//!     server::{AppState, create_router},
//!     storage::StorageBuilder,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let handles = StorageBuilder::memory().build().await?;
//!
//!     let mut registry = CollectorRegistry::builder();
//!     builtin::register_all(&mut registry)?;
//!
//!     let engine = ProfilerEngine::new(
//!         registry.build(),
//!         handles.records.clone(),
//!         ToolbarRouter::default(),
//!     );
//!     let app = Router::new().route("/", get(|| async { Html("<body>hello</body>") }));
//!     let router = create_router(AppState::new(engine), app);
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     axum::serve(listener, router).await?;
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod config;
pub mod engine;
pub mod http;
pub mod router;
pub mod server;
pub mod storage;
pub mod view;

pub use collector::{
    CollectionContext, CollectionSnapshot, Collector, CollectorDefinition, CollectorError,
    CollectorRegistry, DefinitionBuilder, DefinitionError, Status,
};
pub use engine::{ProfilerEngine, RequestProcessor, TOKEN_HEADER, URL_HEADER};
pub use http::{ProfiledRequest, ProfiledResponse, ResponseBody};
pub use router::ToolbarRouter;
pub use storage::{CollectionRecord, RecordStore, StorageBuilder, StorageError, StorageHandles};
