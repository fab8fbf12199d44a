//! Collector Layer
//!
//! Pluggable collectors that each extract one category of diagnostic data
//! from a request/response pair.
//!
//! # Architecture
//!
//! - [`Collector`]: Trait implemented by collector types
//! - [`CollectorDefinition`]: Immutable metadata plus collection routine
//! - [`CollectionContext`]: Per-request scratch space a routine writes into
//! - [`CollectorRegistry`]: Ordered set of definitions, frozen after startup
//!
//! # Example
//!
//! ```rust
//! use webprofiler::collector::{CollectorRegistry, DefinitionBuilder};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let user_agent = DefinitionBuilder::new("user_agent")
//!     .label("User agent")
//!     .position(10)
//!     .collect(|request, _response, ctx| {
//!         let agent = request
//!             .headers()
//!             .get("user-agent")
//!             .and_then(|v| v.to_str().ok())
//!             .unwrap_or("-");
//!         ctx.store("agent", agent);
//!         Ok(())
//!     })
//!     .build()?;
//!
//! let mut builder = CollectorRegistry::builder();
//! builder.register_definition(user_agent)?;
//! let registry = builder.build();
//! assert_eq!(registry.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod builtin;
mod context;
mod definition;
mod registry;
mod traits;

pub use context::{CollectionContext, CollectionSnapshot, Status, canonical_key};
pub use definition::{
    CollectFn, CollectorDefinition, DEFAULT_POSITION, DefinitionBuilder, Enablement, Template,
    identifier_from_type_name,
};
pub use registry::{CollectorRegistry, RegistryBuilder};
pub use traits::{Collector, CollectorError, DefinitionError};
