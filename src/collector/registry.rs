//! Collector registry.
//!
//! Populated once at startup through [`RegistryBuilder`], then frozen into an
//! immutable [`CollectorRegistry`] shared behind an `Arc`. Request handling
//! only reads it, so no locking is needed on the hot path.

use std::collections::HashMap;
use std::sync::Arc;

use crate::collector::{Collector, CollectorDefinition, DefinitionBuilder, DefinitionError};

/// Ordered, read-only set of collector definitions.
#[derive(Debug, Default)]
pub struct CollectorRegistry {
    definitions: Vec<Arc<CollectorDefinition>>,
    index: HashMap<String, usize>,
}

impl CollectorRegistry {
    /// Start an empty registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// All definitions in registration order.
    pub fn all(&self) -> impl Iterator<Item = &Arc<CollectorDefinition>> {
        self.definitions.iter()
    }

    /// Definitions whose enablement rule currently holds, in registration order.
    pub fn enabled(&self) -> impl Iterator<Item = &Arc<CollectorDefinition>> {
        self.definitions.iter().filter(|d| d.is_enabled())
    }

    /// Definitions ordered for display: by position, ties in registration order.
    pub fn by_position(&self) -> Vec<Arc<CollectorDefinition>> {
        let mut sorted = self.definitions.clone();
        sorted.sort_by_key(|d| d.position());
        sorted
    }

    /// Look up a definition by identifier.
    pub fn get(&self, identifier: &str) -> Option<&Arc<CollectorDefinition>> {
        self.index.get(identifier).map(|&i| &self.definitions[i])
    }

    /// Number of registered collectors.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether no collector is registered.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Mutable registry under construction.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    registry: CollectorRegistry,
}

impl RegistryBuilder {
    /// Register collector type `C`.
    pub fn register<C: Collector>(&mut self) -> Result<&mut Self, DefinitionError> {
        self.register_with::<C>(|definition| definition)
    }

    /// Register collector type `C`, adjusting its declaration first.
    ///
    /// Useful for overriding enablement from configuration.
    pub fn register_with<C: Collector>(
        &mut self,
        adjust: impl FnOnce(DefinitionBuilder) -> DefinitionBuilder,
    ) -> Result<&mut Self, DefinitionError> {
        let definition = adjust(DefinitionBuilder::of::<C>()).build()?;
        self.register_definition(definition)
    }

    /// Register a prebuilt definition.
    ///
    /// # Errors
    /// Returns [`DefinitionError::DuplicateIdentifier`] if the identifier is taken.
    pub fn register_definition(
        &mut self,
        definition: CollectorDefinition,
    ) -> Result<&mut Self, DefinitionError> {
        let identifier = definition.identifier().to_owned();
        if self.registry.index.contains_key(&identifier) {
            tracing::error!(collector = %identifier, "Duplicate collector identifier");
            return Err(DefinitionError::DuplicateIdentifier(identifier));
        }

        self.registry
            .index
            .insert(identifier.clone(), self.registry.definitions.len());
        self.registry.definitions.push(Arc::new(definition));

        tracing::debug!(collector = %identifier, "Collector registered");
        Ok(self)
    }

    /// Freeze the registry.
    pub fn build(self) -> Arc<CollectorRegistry> {
        tracing::info!(count = self.registry.len(), "Collector registry ready");
        Arc::new(self.registry)
    }
}
