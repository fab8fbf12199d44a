//! Markup rendering.
//!
//! [`TemplateRenderer`] is the seam to the template engine; the default
//! implementation is backed by minijinja. [`ProfilerView`] renders the
//! injected loader, the toolbar, the profiler page and the record index.

use std::sync::Arc;

use minijinja::{AutoEscape, Environment};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use crate::collector::{CollectionSnapshot, CollectorDefinition, CollectorRegistry, Status};
use crate::router::ToolbarRouter;
use crate::storage::CollectionRecord;

const ASYNC_TEMPLATE: &str = include_str!("../templates/async.html");
const TOOLBAR_TEMPLATE: &str = include_str!("../templates/toolbar.html");
const PROFILER_TEMPLATE: &str = include_str!("../templates/profiler.html");
const INDEX_TEMPLATE: &str = include_str!("../templates/index.html");

/// Fallback for collectors that declare no template.
const DEFAULT_COLLECTOR_TEMPLATE: &str = r#"{% if slot == "tab" %}{{ collector.label }}{% else %}<h2>{{ collector.label }}</h2>
<pre>{{ data|tojson(indent=2) }}</pre>{% endif %}"#;

/// Shown in place of a collector whose routine failed.
const FAILED_COLLECTOR_TEMPLATE: &str = r#"{% if slot == "tab" %}{{ collector.label }} !{% else %}<h2>{{ collector.label }}</h2>
<p class="wp-error">Collection failed: {{ data.error }}</p>{% endif %}"#;

/// Rendering errors.
#[derive(Debug, Error)]
pub enum ViewError {
    /// Template failed to compile or render.
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    /// Template file could not be read.
    #[error("template io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Template engine seam: render `source` with `context` bound.
pub trait TemplateRenderer: Send + Sync + 'static {
    /// Render template source text.
    fn render(&self, source: &str, context: &Value) -> Result<String, ViewError>;
}

/// minijinja-backed renderer with HTML auto-escaping.
pub struct MiniJinjaRenderer {
    env: Environment<'static>,
}

impl Default for MiniJinjaRenderer {
    fn default() -> Self {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        Self { env }
    }
}

impl MiniJinjaRenderer {
    /// Create a renderer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for MiniJinjaRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiniJinjaRenderer").finish_non_exhaustive()
    }
}

impl TemplateRenderer for MiniJinjaRenderer {
    fn render(&self, source: &str, context: &Value) -> Result<String, ViewError> {
        Ok(self.env.render_str(source, context)?)
    }
}

/// Slot a collector template is rendered into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Compact summary shown in the toolbar.
    Tab,
    /// Detailed section on the profiler page.
    Panel,
}

impl Slot {
    fn as_str(self) -> &'static str {
        match self {
            Self::Tab => "tab",
            Self::Panel => "panel",
        }
    }
}

#[derive(Debug, Serialize)]
struct RenderedCollector {
    identifier: String,
    label: String,
    icon: Option<String>,
    status: Option<Status>,
    html: String,
}

/// Renders profiler markup from records and collector templates.
#[derive(Clone)]
pub struct ProfilerView {
    renderer: Arc<dyn TemplateRenderer>,
    registry: Arc<CollectorRegistry>,
    router: ToolbarRouter,
}

impl ProfilerView {
    /// Create a view.
    pub fn new(
        renderer: Arc<dyn TemplateRenderer>,
        registry: Arc<CollectorRegistry>,
        router: ToolbarRouter,
    ) -> Self {
        Self {
            renderer,
            registry,
            router,
        }
    }

    /// Loader fragment injected before `</body>`.
    pub fn render_injection(&self, token: &str) -> Result<String, ViewError> {
        self.renderer.render(
            ASYNC_TEMPLATE,
            &json!({
                "token": token,
                "toolbar_url": self.router.url_for_toolbar(token),
                "profiler_url": self.router.url_for_profiler(token),
            }),
        )
    }

    /// Toolbar fragment with one tab per visible collector.
    pub fn render_toolbar(&self, record: &CollectionRecord) -> Result<String, ViewError> {
        let tabs = self.render_slots(record, Slot::Tab);
        self.renderer.render(
            TOOLBAR_TEMPLATE,
            &json!({
                "token": record.token,
                "profiler_url": self.router.url_for_profiler(&record.token),
                "tabs": tabs,
            }),
        )
    }

    /// Full profiler page with one panel per visible collector.
    pub fn render_profiler(&self, record: &CollectionRecord) -> Result<String, ViewError> {
        let panels = self.render_slots(record, Slot::Panel);
        self.renderer.render(
            PROFILER_TEMPLATE,
            &json!({
                "record": record,
                "index_url": self.router.url_for_index(),
                "panels": panels,
            }),
        )
    }

    /// Index of recent records.
    pub fn render_index(&self, records: &[CollectionRecord]) -> Result<String, ViewError> {
        let rows: Vec<Value> = records
            .iter()
            .map(|r| {
                json!({
                    "token": r.token,
                    "http_method": r.http_method,
                    "url": r.url,
                    "http_status": r.http_status,
                    "ip": r.ip,
                    "created_at": r.created_at.to_rfc3339(),
                    "profiler_url": self.router.url_for_profiler(&r.token),
                })
            })
            .collect();
        self.renderer
            .render(INDEX_TEMPLATE, &json!({ "records": rows }))
    }

    /// Render one collector's snapshot into a slot.
    pub fn render_collector(
        &self,
        definition: &CollectorDefinition,
        snapshot: &CollectionSnapshot,
        slot: Slot,
        token: &str,
    ) -> Result<String, ViewError> {
        let source = if snapshot.is_failure() {
            FAILED_COLLECTOR_TEMPLATE.into()
        } else {
            match definition.template() {
                Some(template) => template.source()?,
                None => DEFAULT_COLLECTOR_TEMPLATE.into(),
            }
        };

        self.renderer.render(
            &source,
            &json!({
                "slot": slot.as_str(),
                "token": token,
                "collector": {
                    "identifier": definition.identifier(),
                    "label": definition.label(),
                    "icon": definition.icon(),
                    "position": definition.position(),
                },
                "status": snapshot.status,
                "data": snapshot.datas,
            }),
        )
    }

    /// Render every visible collector of a record, in display order.
    ///
    /// A collector whose template fails is shown with an error note instead.
    fn render_slots(&self, record: &CollectionRecord, slot: Slot) -> Vec<RenderedCollector> {
        let mut rendered = Vec::new();
        for definition in self.registry.by_position() {
            let Some(snapshot) = record.data(definition.identifier()) else {
                continue;
            };
            let visible = match slot {
                Slot::Tab => snapshot.show_tab,
                Slot::Panel => snapshot.show_panel,
            };
            if !visible {
                continue;
            }

            let html = self
                .render_collector(&definition, snapshot, slot, &record.token)
                .unwrap_or_else(|e| {
                    tracing::warn!(
                        collector = definition.identifier(),
                        error = %e,
                        "Collector template render failed"
                    );
                    format!(
                        "<span class=\"wp-error\">{} unavailable</span>",
                        definition.label()
                    )
                });

            rendered.push(RenderedCollector {
                identifier: definition.identifier().to_owned(),
                label: definition.label().to_owned(),
                icon: definition.icon().map(str::to_owned),
                status: snapshot.status,
                html,
            });
        }
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{CollectionContext, DefinitionBuilder, builtin};
    use crate::storage::NewRecord;

    fn registry() -> Arc<CollectorRegistry> {
        let mut builder = CollectorRegistry::builder();
        builtin::register_all(&mut builder).unwrap();
        builder
            .register_definition(
                DefinitionBuilder::new("custom")
                    .label("Custom")
                    .position(0)
                    .collect(|_, _, _| Ok(()))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        builder
            .register_definition(
                DefinitionBuilder::new("broken_template")
                    .template(crate::collector::Template::Inline("{% if %}".into()))
                    .collect(|_, _, _| Ok(()))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        builder.build()
    }

    fn view() -> ProfilerView {
        ProfilerView::new(
            Arc::new(MiniJinjaRenderer::new()),
            registry(),
            ToolbarRouter::default(),
        )
    }

    fn record() -> CollectionRecord {
        let mut record = CollectionRecord::new(NewRecord {
            url: "http://localhost/".into(),
            ip: "127.0.0.1".into(),
            http_method: "GET".into(),
            http_status: 200,
            content_type: Some("text/html".into()),
        });

        let mut custom = CollectionContext::new();
        custom.store("answer", 42);
        record.datas.insert("custom".into(), custom.into_snapshot());

        let mut hidden = CollectionContext::new();
        hidden.store("duration_ms", 1.5);
        hidden.set_show_tab(false);
        record.datas.insert("time".into(), hidden.into_snapshot());

        record
            .datas
            .insert("response".into(), CollectionSnapshot::failed("kaput"));
        record.datas.insert(
            "broken_template".into(),
            CollectionContext::new().into_snapshot(),
        );
        record
    }

    #[test]
    fn test_minijinja_escapes_html() {
        let renderer = MiniJinjaRenderer::new();
        let html = renderer
            .render("<p>{{ v }}</p>", &json!({"v": "<script>"}))
            .unwrap();
        assert_eq!(html, "<p>&lt;script&gt;</p>");
    }

    #[test]
    fn test_render_injection_contains_urls() {
        let html = view().render_injection("abc123").unwrap();
        assert!(html.contains("/_profiler/toolbar/abc123"));
        assert!(html.contains("webprofiler-abc123"));
    }

    #[test]
    fn test_render_toolbar_respects_show_tab() {
        let html = view().render_toolbar(&record()).unwrap();
        assert!(html.contains("Custom"));
        assert!(html.contains("#custom"));
        assert!(!html.contains("#time"));
        assert!(html.contains("Response !"));
        assert!(html.contains("broken_template unavailable"));
    }

    #[test]
    fn test_render_profiler_panels_in_position_order() {
        let html = view().render_profiler(&record()).unwrap();
        let custom = html.find("id=\"custom\"").unwrap();
        let time = html.find("id=\"time\"").unwrap();
        assert!(custom < time);
        assert!(html.contains("&quot;answer&quot;: 42") || html.contains("\"answer\": 42"));
        assert!(html.contains("Collection failed: kaput"));
        assert!(!html.contains("id=\"request\""));
    }

    #[test]
    fn test_render_index() {
        let view = view();
        let html = view.render_index(&[]).unwrap();
        assert!(html.contains("No requests profiled yet."));

        let record = record();
        let html = view.render_index(std::slice::from_ref(&record)).unwrap();
        assert!(html.contains(&format!("/_profiler/{}", record.token)));
    }
}
