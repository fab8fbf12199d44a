//! Core collector traits and error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::collector::{CollectionContext, DefinitionBuilder};
use crate::http::{ProfiledRequest, ProfiledResponse};

/// Errors raised by a collection routine.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// The routine reported a failure.
    #[error("collection failed: {0}")]
    Failed(String),

    /// A value could not be converted to JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The routine panicked.
    #[error("collector panicked: {0}")]
    Panicked(String),
}

impl CollectorError {
    /// Shorthand for [`CollectorError::Failed`].
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Errors detected while declaring or registering a collector.
///
/// These surface at startup, never while serving a request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DefinitionError {
    /// Identifier is empty after trimming.
    #[error("collector identifier must not be empty")]
    EmptyIdentifier,

    /// Identifier contains characters outside `[A-Za-z0-9_.-]`.
    #[error("invalid collector identifier '{0}'")]
    InvalidIdentifier(String),

    /// Position could not be coerced to an integer.
    #[error("collector '{identifier}': invalid position {value}")]
    InvalidPosition {
        /// Offending collector.
        identifier: String,
        /// Rejected value.
        value: String,
    },

    /// No collection routine was set.
    #[error("collector '{0}' has no collection routine")]
    MissingCollect(String),

    /// A file template points at a missing file.
    #[error("collector '{identifier}': template file not found: {}", path.display())]
    TemplateNotFound {
        /// Offending collector.
        identifier: String,
        /// Missing file.
        path: PathBuf,
    },

    /// Another collector already uses this identifier.
    #[error("duplicate collector identifier '{0}'")]
    DuplicateIdentifier(String),

    /// An identifier named in configuration matches no collector.
    #[error("unknown collector '{0}'")]
    UnknownCollector(String),
}

/// A collector type.
///
/// Implementors declare their metadata once in [`Collector::declare`] and
/// extract data per request in [`Collector::collect`]. The definition is
/// built through [`crate::collector::CollectorDefinition::of`].
///
/// # Error Handling
///
/// Returning `Err` from `collect` does not abort the request: the engine
/// records a failure marker for this collector and moves on to the next one.
pub trait Collector: 'static {
    /// Set icon, label, position, template and enablement.
    ///
    /// The builder arrives with the identifier derived from the type name.
    fn declare(definition: DefinitionBuilder) -> DefinitionBuilder {
        definition
    }

    /// Extract data from the request/response pair into `ctx`.
    fn collect(
        request: &ProfiledRequest,
        response: &ProfiledResponse,
        ctx: &mut CollectionContext,
    ) -> Result<(), CollectorError>;
}
