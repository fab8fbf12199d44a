//! Profiler URL builder.
//!
//! Pure string building: every URL is derived from the base path and a token.

/// Default mount point of the profiler routes.
pub const DEFAULT_BASE_PATH: &str = "/_profiler";

/// Builds the URLs under which records are exposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolbarRouter {
    base_path: String,
}

impl Default for ToolbarRouter {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_PATH)
    }
}

impl ToolbarRouter {
    /// Create a router mounted at `base_path` (trailing slashes are dropped).
    pub fn new(base_path: impl AsRef<str>) -> Self {
        let trimmed = base_path.as_ref().trim().trim_end_matches('/');
        let base_path = if trimmed.starts_with('/') {
            trimmed.to_owned()
        } else {
            format!("/{trimmed}")
        };
        Self { base_path }
    }

    /// Mount point, e.g. `/_profiler`.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Index of recent records.
    pub fn url_for_index(&self) -> String {
        self.base_path.clone()
    }

    /// Full profiler page of a record.
    pub fn url_for_profiler(&self, token: &str) -> String {
        format!("{}/{}", self.base_path, token)
    }

    /// Toolbar fragment of a record.
    pub fn url_for_toolbar(&self, token: &str) -> String {
        format!("{}/toolbar/{}", self.base_path, token)
    }

    /// JSON view of a record.
    pub fn url_for_api(&self, token: &str) -> String {
        format!("{}/api/{}", self.base_path, token)
    }

    /// Whether `path` belongs to the profiler itself.
    pub fn is_profiler_path(&self, path: &str) -> bool {
        path == self.base_path
            || path
                .strip_prefix(self.base_path.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }
}
