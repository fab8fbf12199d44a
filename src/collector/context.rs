//! Per-invocation scratch space filled by a collection routine.
//!
//! A [`CollectionContext`] is created fresh for every (request, collector)
//! pair, mutated only inside the routine, then frozen into a
//! [`CollectionSnapshot`] that is embedded in the persisted record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{AsRefStr, Display, EnumString};

/// Severity reported by a collector for the profiled request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Status {
    /// Nothing worth flagging.
    Success,
    /// Worth a look (slow request, client error).
    Warning,
    /// Something went wrong (server error, collector failure).
    Danger,
}

/// Canonical form of a data key.
///
/// Borrowed and owned spellings of the same text address the same slot.
/// Whitespace is significant.
pub fn canonical_key(key: impl AsRef<str>) -> String {
    key.as_ref().to_owned()
}

/// Mutable accumulator handed to a collection routine.
#[derive(Debug, Clone)]
pub struct CollectionContext {
    datas: BTreeMap<String, Value>,
    status: Option<Status>,
    show_tab: bool,
    show_panel: bool,
}

impl Default for CollectionContext {
    fn default() -> Self {
        Self {
            datas: BTreeMap::new(),
            status: None,
            show_tab: true,
            show_panel: true,
        }
    }
}

impl CollectionContext {
    /// Create an empty context with default visibility.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, overwriting any previous value under the same key.
    pub fn store(&mut self, key: impl AsRef<str>, value: impl Into<Value>) -> &mut Self {
        self.datas.insert(canonical_key(key), value.into());
        self
    }

    /// Store any serializable value.
    ///
    /// Values that cannot be represented as JSON are logged and stored as
    /// `null` so the record stays persistable.
    pub fn store_serialized<T: Serialize + ?Sized>(
        &mut self,
        key: impl AsRef<str>,
        value: &T,
    ) -> &mut Self {
        let key = canonical_key(key);
        let value = serde_json::to_value(value).unwrap_or_else(|e| {
            tracing::warn!(key = %key, error = %e, "Collected value is not serializable");
            Value::Null
        });
        self.datas.insert(key, value);
        self
    }

    /// Read back a stored value.
    pub fn get(&self, key: impl AsRef<str>) -> Option<&Value> {
        self.datas.get(&canonical_key(key))
    }

    /// All stored values.
    pub fn datas(&self) -> &BTreeMap<String, Value> {
        &self.datas
    }

    /// Current status, `None` until set.
    pub fn status(&self) -> Option<Status> {
        self.status
    }

    /// Set the status and return it.
    pub fn set_status(&mut self, status: Status) -> Status {
        self.status = Some(status);
        status
    }

    /// Set the status from its textual form (`"warning"`, `"DANGER"`, ...).
    ///
    /// Unknown names leave the status untouched and return `None`.
    pub fn set_status_str(&mut self, status: &str) -> Option<Status> {
        match status.trim().parse::<Status>() {
            Ok(status) => Some(self.set_status(status)),
            Err(_) => {
                tracing::warn!(status, "Ignoring unknown collector status");
                None
            }
        }
    }

    /// Whether the collector's tab is shown in the toolbar.
    pub fn show_tab(&self) -> bool {
        self.show_tab
    }

    /// Toggle the toolbar tab and return the new value.
    pub fn set_show_tab(&mut self, show: bool) -> bool {
        self.show_tab = show;
        show
    }

    /// Whether the collector's panel is shown on the profiler page.
    pub fn show_panel(&self) -> bool {
        self.show_panel
    }

    /// Toggle the profiler panel and return the new value.
    pub fn set_show_panel(&mut self, show: bool) -> bool {
        self.show_panel = show;
        show
    }

    /// Structural copy suitable for persistence.
    pub fn snapshot(&self) -> CollectionSnapshot {
        self.clone().into_snapshot()
    }

    /// Freeze the context into its persisted form.
    pub fn into_snapshot(self) -> CollectionSnapshot {
        CollectionSnapshot {
            datas: self.datas,
            status: self.status,
            show_panel: self.show_panel,
            show_tab: self.show_tab,
            failed: false,
        }
    }
}

/// Frozen output of one collector for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSnapshot {
    /// Collected key/value data.
    pub datas: BTreeMap<String, Value>,
    /// Reported severity.
    pub status: Option<Status>,
    /// Panel visibility.
    pub show_panel: bool,
    /// Tab visibility.
    pub show_tab: bool,
    /// Set only on snapshots standing in for a collector that failed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub failed: bool,
}

impl CollectionSnapshot {
    /// Snapshot recorded in place of a collector that failed.
    pub fn failed(error: impl std::fmt::Display) -> Self {
        let mut ctx = CollectionContext::new();
        ctx.store("error", error.to_string());
        ctx.set_status(Status::Danger);
        CollectionSnapshot {
            failed: true,
            ..ctx.into_snapshot()
        }
    }

    /// Whether this snapshot marks a failed collection.
    pub fn is_failure(&self) -> bool {
        self.failed
    }
}
