//! Profiler Engine
//!
//! Ties collection, persistence and body rewriting together.
//!
//! For every response handed to [`ProfilerEngine::process`]:
//!
//! 1. a [`RequestProcessor`] runs the enabled collectors against copies of the
//!    request and response and saves one record,
//! 2. the token and profiler URL are attached as response headers,
//! 3. HTML responses get the toolbar loader inserted before `</body>`.
//!
//! Profiling never turns a response into an error. When the record cannot be
//! saved the response goes out untouched; when the toolbar cannot be rendered
//! the body goes out unmodified.

mod inject;
mod processor;

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode, header};

use crate::collector::CollectorRegistry;
use crate::http::{ProfiledRequest, ProfiledResponse, ResponseBody};
use crate::router::ToolbarRouter;
use crate::storage::RecordStore;
use crate::view::{MiniJinjaRenderer, ProfilerView};

pub use inject::{CLOSING_BODY_TAG, ToolbarInjector};
pub use processor::RequestProcessor;

/// Response header carrying the record token.
pub const TOKEN_HEADER: &str = "x-webprofiler-token";

/// Response header carrying the profiler page URL.
pub const URL_HEADER: &str = "x-webprofiler-url";

/// Top-level profiler.
#[derive(Clone)]
pub struct ProfilerEngine {
    registry: Arc<CollectorRegistry>,
    store: Arc<dyn RecordStore>,
    router: ToolbarRouter,
    view: ProfilerView,
    inject_toolbar: bool,
}

impl ProfilerEngine {
    /// Create an engine rendering with minijinja.
    pub fn new(
        registry: Arc<CollectorRegistry>,
        store: Arc<dyn RecordStore>,
        router: ToolbarRouter,
    ) -> Self {
        let view = ProfilerView::new(
            Arc::new(MiniJinjaRenderer::new()),
            registry.clone(),
            router.clone(),
        );
        Self {
            registry,
            store,
            router,
            view,
            inject_toolbar: true,
        }
    }

    /// Replace the view used for rendering.
    pub fn with_view(mut self, view: ProfilerView) -> Self {
        self.view = view;
        self
    }

    /// Turn toolbar injection on or off. Headers are attached either way.
    pub fn with_inject_toolbar(mut self, inject: bool) -> Self {
        self.inject_toolbar = inject;
        self
    }

    pub fn registry(&self) -> &Arc<CollectorRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn router(&self) -> &ToolbarRouter {
        &self.router
    }

    pub fn view(&self) -> &ProfilerView {
        &self.view
    }

    /// Profile one exchange and return the response to send.
    pub async fn process(
        &self,
        request: &ProfiledRequest,
        body: impl Into<ResponseBody>,
        status: StatusCode,
        headers: HeaderMap,
    ) -> ProfiledResponse {
        let mut response = ProfiledResponse::new(body, status, headers);

        let record = match RequestProcessor::new(request, &response)
            .save(&self.registry, self.store.as_ref())
            .await
        {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(
                    method = request.method(),
                    path = request.path(),
                    error = %e,
                    "Failed to save profiling record"
                );
                return response;
            }
        };
        let token = record.token;

        response.set_header(TOKEN_HEADER, &token);
        response.set_header(URL_HEADER, &self.router.url_for_profiler(&token));

        if !self.inject_toolbar || !response.is_html() {
            return response;
        }

        let mut injector = ToolbarInjector::new(|| self.view.render_injection(&token));
        response.body = match &response.body {
            ResponseBody::Full(bytes) => ResponseBody::Full(injector.inject(bytes)),
            ResponseBody::Chunks(chunks) => {
                ResponseBody::Chunks(chunks.iter().map(|c| injector.inject(c)).collect())
            }
        };
        if injector.injections() > 0 {
            response.headers.remove(header::CONTENT_LENGTH);
        }

        tracing::trace!(token = %token, injections = injector.injections(), "Toolbar injected");
        response
    }

    /// Profile a request whose handler failed: empty body, status 500, no headers.
    pub async fn process_exception(&self, request: &ProfiledRequest) -> ProfiledResponse {
        self.process(
            request,
            ResponseBody::empty(),
            StatusCode::INTERNAL_SERVER_ERROR,
            HeaderMap::new(),
        )
        .await
    }
}
