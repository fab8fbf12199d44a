//! Collector definitions and the builder used to declare them.

use std::borrow::Cow;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::collector::{CollectionContext, Collector, CollectorError, DefinitionError};
use crate::http::{ProfiledRequest, ProfiledResponse};

/// Default UI position.
pub const DEFAULT_POSITION: i32 = 1;

/// Collection routine stored in a definition.
pub type CollectFn = Arc<
    dyn Fn(&ProfiledRequest, &ProfiledResponse, &mut CollectionContext) -> Result<(), CollectorError>
        + Send
        + Sync,
>;

/// Enablement rule: a fixed flag or a predicate evaluated on every request.
#[derive(Clone)]
pub enum Enablement {
    /// Always on or always off.
    Fixed(bool),
    /// Evaluated each time the registry is consulted.
    Predicate(Arc<dyn Fn() -> bool + Send + Sync>),
}

impl Enablement {
    /// Evaluate the rule now.
    pub fn evaluate(&self) -> bool {
        match self {
            Self::Fixed(enabled) => *enabled,
            Self::Predicate(predicate) => predicate(),
        }
    }
}

impl Default for Enablement {
    fn default() -> Self {
        Self::Fixed(true)
    }
}

impl From<bool> for Enablement {
    fn from(enabled: bool) -> Self {
        Self::Fixed(enabled)
    }
}

impl fmt::Debug for Enablement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(enabled) => f.debug_tuple("Fixed").field(enabled).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Markup used to render a collector's tab and panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    /// Template source given literally.
    Inline(String),
    /// Template read from disk at render time.
    File(PathBuf),
    /// Template compiled into the binary (`include_str!`).
    Embedded(&'static str),
}

impl Template {
    /// A file template when `value` names an existing file, inline source otherwise.
    pub fn from_path_or_inline(value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() && Path::new(&value).is_file() {
            Self::File(PathBuf::from(value))
        } else {
            Self::Inline(value)
        }
    }

    /// Template source text.
    pub fn source(&self) -> std::io::Result<Cow<'_, str>> {
        match self {
            Self::Inline(source) => Ok(Cow::Borrowed(source.as_str())),
            Self::Embedded(source) => Ok(Cow::Borrowed(source)),
            Self::File(path) => std::fs::read_to_string(path).map(Cow::Owned),
        }
    }
}

/// Static metadata and collection routine of one collector type.
///
/// Built once at startup through [`DefinitionBuilder`] and immutable after.
#[derive(Clone)]
pub struct CollectorDefinition {
    identifier: String,
    label: String,
    icon: Option<String>,
    position: i32,
    enabled: Enablement,
    template: Option<Template>,
    collect: CollectFn,
}

impl fmt::Debug for CollectorDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectorDefinition")
            .field("identifier", &self.identifier)
            .field("label", &self.label)
            .field("position", &self.position)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl CollectorDefinition {
    /// Build the definition declared by collector type `C`.
    pub fn of<C: Collector>() -> Result<Self, DefinitionError> {
        DefinitionBuilder::of::<C>().build()
    }

    /// Unique identifier, used as the key in records.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Display label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Icon (opaque string, typically a data URI).
    pub fn icon(&self) -> Option<&str> {
        self.icon.as_deref()
    }

    /// UI ordering position.
    pub fn position(&self) -> i32 {
        self.position
    }

    /// Tab/panel template.
    pub fn template(&self) -> Option<&Template> {
        self.template.as_ref()
    }

    /// Evaluate the enablement rule. Predicates run on every call.
    pub fn is_enabled(&self) -> bool {
        self.enabled.evaluate()
    }

    /// Run the collection routine against a fresh context.
    ///
    /// Panics inside the routine are caught and reported as
    /// [`CollectorError::Panicked`].
    pub fn collect(
        &self,
        request: &ProfiledRequest,
        response: &ProfiledResponse,
    ) -> Result<CollectionContext, CollectorError> {
        let mut ctx = CollectionContext::new();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            (self.collect)(request, response, &mut ctx)
        }));

        match outcome {
            Ok(Ok(())) => Ok(ctx),
            Ok(Err(e)) => Err(e),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_owned());
                Err(CollectorError::Panicked(message))
            }
        }
    }
}

/// Declaration surface for a collector. Setters may be called in any order.
#[must_use]
pub struct DefinitionBuilder {
    identifier: String,
    label: Option<String>,
    icon: Option<String>,
    position: Result<i32, String>,
    enabled: Enablement,
    template: Option<Template>,
    collect: Option<CollectFn>,
}

impl DefinitionBuilder {
    /// Start a definition with an explicit identifier.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            label: None,
            icon: None,
            position: Ok(DEFAULT_POSITION),
            enabled: Enablement::default(),
            template: None,
            collect: None,
        }
    }

    /// Start a definition whose identifier is derived from `T`'s name.
    pub fn for_type<T: ?Sized>() -> Self {
        Self::new(identifier_from_type_name(std::any::type_name::<T>()))
    }

    /// Start from collector type `C`: derived identifier, `C::declare`, `C::collect`.
    pub fn of<C: Collector>() -> Self {
        C::declare(Self::for_type::<C>()).collect(C::collect)
    }

    /// Set the identifier.
    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self
    }

    /// Set the display label. Defaults to the identifier.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the icon.
    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Set the UI position, coerced to `i32`.
    ///
    /// Values out of range are rejected by [`DefinitionBuilder::build`].
    pub fn position<P>(mut self, position: P) -> Self
    where
        P: TryInto<i32> + ToString,
    {
        let repr = position.to_string();
        self.position = position.try_into().map_err(|_| repr);
        self
    }

    /// Fixed enablement flag.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Enablement::Fixed(enabled);
        self
    }

    /// Enablement predicate evaluated on every request.
    pub fn enabled_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.enabled = Enablement::Predicate(Arc::new(predicate));
        self
    }

    /// Set the template.
    pub fn template(mut self, template: Template) -> Self {
        self.template = Some(template);
        self
    }

    /// Template read from a file.
    pub fn template_file(self, path: impl Into<PathBuf>) -> Self {
        self.template(Template::File(path.into()))
    }

    /// Template compiled into the binary.
    pub fn template_embedded(self, source: &'static str) -> Self {
        self.template(Template::Embedded(source))
    }

    /// Set the collection routine.
    pub fn collect<F>(mut self, routine: F) -> Self
    where
        F: Fn(&ProfiledRequest, &ProfiledResponse, &mut CollectionContext) -> Result<(), CollectorError>
            + Send
            + Sync
            + 'static,
    {
        self.collect = Some(Arc::new(routine));
        self
    }

    /// Validate and freeze the definition.
    pub fn build(self) -> Result<CollectorDefinition, DefinitionError> {
        let identifier = self.identifier.trim().to_owned();
        if identifier.is_empty() {
            return Err(DefinitionError::EmptyIdentifier);
        }
        if !identifier
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(DefinitionError::InvalidIdentifier(identifier));
        }

        let position = self
            .position
            .map_err(|value| DefinitionError::InvalidPosition {
                identifier: identifier.clone(),
                value,
            })?;

        if let Some(Template::File(path)) = &self.template
            && !path.is_file()
        {
            return Err(DefinitionError::TemplateNotFound {
                identifier,
                path: path.clone(),
            });
        }

        let collect = self
            .collect
            .ok_or_else(|| DefinitionError::MissingCollect(identifier.clone()))?;

        Ok(CollectorDefinition {
            label: self.label.unwrap_or_else(|| identifier.clone()),
            identifier,
            icon: self.icon,
            position,
            enabled: self.enabled,
            template: self.template,
            collect,
        })
    }
}

/// Derive an identifier from a type path: `crate::x::RequestCollector` -> `request`.
pub fn identifier_from_type_name(type_name: &str) -> String {
    let base = type_name.split('<').next().unwrap_or(type_name);
    let name = base.rsplit("::").next().unwrap_or(base);
    let name = match name.strip_suffix("Collector") {
        Some(stripped) if !stripped.is_empty() => stripped,
        _ => name,
    };

    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
