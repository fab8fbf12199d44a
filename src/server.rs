//! Web server module.
//!
//! Provides the `profile` middleware that feeds responses through the
//! [`ProfilerEngine`], and the routes that expose stored records.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::{Body, HttpBody},
    extract::{ConnectInfo, Path, Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{delete, get},
};
use serde::Serialize;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::config::DEFAULT_MAX_BODY_BYTES;
use crate::engine::ProfilerEngine;
use crate::http::ProfiledRequest;
use crate::storage::DEFAULT_LIST_LIMIT;
use crate::view::ViewError;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: ProfilerEngine,
    pub enabled: bool,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(engine: ProfilerEngine) -> Self {
        Self {
            engine,
            enabled: true,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    records: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct PurgeResponse {
    purged: u64,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create the router: `app` wrapped by the profiler, plus the profiler's own routes.
pub fn create_router(state: AppState, app: Router) -> Router {
    let app_state = Arc::new(state);
    let base = app_state.engine.router().base_path().to_owned();

    let profiled = app.layer(middleware::from_fn_with_state(app_state.clone(), profile));

    Router::new()
        .route("/healthz", get(healthz_handler))
        .route(&base, get(index_handler))
        .route(&format!("{base}/{{token}}"), get(profiler_handler))
        .route(&format!("{base}/toolbar/{{token}}"), get(toolbar_handler))
        .route(&format!("{base}/api/{{token}}"), get(record_handler))
        .route(&format!("{base}/api"), delete(purge_handler))
        .with_state(app_state)
        .merge(profiled)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}

/// Middleware profiling every response that passes through it.
///
/// Profiler routes, event streams and bodies that are not known to fit in
/// `max_body_bytes` pass through untouched.
pub async fn profile(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let engine = &state.engine;
    if !state.enabled || engine.router().is_profiler_path(request.uri().path()) {
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();
    let mut profiled = ProfiledRequest::from_parts(&parts);
    if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        profiled = profiled.with_ip(addr.ip().to_string());
    }

    let response = next.run(Request::from_parts(parts, body)).await;
    if !is_bufferable(&response, state.max_body_bytes) {
        tracing::debug!(path = profiled.path(), "Response not bufferable, skipping profiler");
        return response;
    }

    let (parts, body) = response.into_parts();
    let (version, extensions) = (parts.version, parts.extensions);
    let mut processed = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => engine
            .process(&profiled, bytes, parts.status, parts.headers)
            .await
            .into_response(),
        Err(e) => {
            tracing::warn!(path = profiled.path(), error = %e, "Failed to read response body");
            engine.process_exception(&profiled).await.into_response()
        }
    };

    // Extensions set by the handler or inner layers travel with the response.
    *processed.version_mut() = version;
    processed.extensions_mut().extend(extensions);
    processed
}

fn is_bufferable(response: &Response, max_body_bytes: usize) -> bool {
    let streaming = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("text/event-stream"));
    let bounded = response
        .body()
        .size_hint()
        .upper()
        .is_some_and(|len| len <= max_body_bytes as u64);
    !streaming && bounded
}

/// Render a view into an HTML response.
fn html(rendered: Result<String, ViewError>) -> Response {
    match rendered {
        Ok(body) => Html(body).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Template render failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn internal_error(err: impl std::fmt::Display) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}

fn not_found(token: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("no profile for token '{token}'"),
        }),
    )
        .into_response()
}

/// Liveness probe that also checks the record store.
async fn healthz_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.engine.store().count().await {
        Ok(records) => Json(HealthResponse {
            status: "ok".to_string(),
            records: Some(records),
            error: None,
        })
        .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "not_ready".to_string(),
                    records: None,
                    error: Some(err.to_string()),
                }),
            )
                .into_response()
        }
    }
}

/// Recent records.
async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.engine.store().list_recent(DEFAULT_LIST_LIMIT).await {
        Ok(records) => html(state.engine.view().render_index(&records)),
        Err(e) => internal_error(e),
    }
}

/// Full profiler page.
async fn profiler_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Response {
    match state.engine.store().find_by_token(&token).await {
        Ok(Some(record)) => html(state.engine.view().render_profiler(&record)),
        Ok(None) => not_found(&token),
        Err(e) => internal_error(e),
    }
}

/// Toolbar fragment fetched by the injected loader.
async fn toolbar_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Response {
    match state.engine.store().find_by_token(&token).await {
        Ok(Some(record)) => html(state.engine.view().render_toolbar(&record)),
        Ok(None) => not_found(&token),
        Err(e) => internal_error(e),
    }
}

/// Record as JSON.
async fn record_handler(State(state): State<Arc<AppState>>, Path(token): Path<String>) -> Response {
    match state.engine.store().find_by_token(&token).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => not_found(&token),
        Err(e) => internal_error(e),
    }
}

/// Delete every stored record.
async fn purge_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.engine.store().purge(None).await {
        Ok(purged) => {
            tracing::info!(purged, "Profiling records purged");
            Json(PurgeResponse { purged }).into_response()
        }
        Err(e) => internal_error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{CollectorRegistry, builtin};
    use crate::engine::TOKEN_HEADER;
    use crate::router::ToolbarRouter;
    use crate::storage::{MemoryRecordStore, RecordStore};
    use axum::http::{HeaderValue, Request};
    use tower::ServiceExt;

    fn create_test_state() -> (AppState, Arc<MemoryRecordStore>) {
        let mut builder = CollectorRegistry::builder();
        builtin::register_all(&mut builder).unwrap();
        let store = Arc::new(MemoryRecordStore::new());
        let engine = ProfilerEngine::new(builder.build(), store.clone(), ToolbarRouter::default());
        (AppState::new(engine), store)
    }

    fn app() -> Router {
        Router::new()
            .route("/", get(|| async { Html("<html><body>home</body></html>") }))
            .route(
                "/big",
                get(|| async {
                    (
                        [(header::CONTENT_TYPE, HeaderValue::from_static("text/html"))],
                        "<body>".repeat(64),
                    )
                }),
            )
    }

    #[derive(Clone, Debug, PartialEq)]
    struct RouteTag(&'static str);

    fn tagged_app() -> Router {
        Router::new().route(
            "/tagged",
            get(|| async {
                let mut response = Json(serde_json::json!({ "ok": true })).into_response();
                response.extensions_mut().insert(RouteTag("orders"));
                response
            }),
        )
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_healthz_reports_record_count() {
        let (state, _store) = create_test_state();
        let router = create_router(state, app());

        let response = router.oneshot(get_request("/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_profiled_route_records_client_ip() {
        let (state, store) = create_test_state();
        let router = create_router(state, app());

        let mut request = get_request("/");
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 168, 1, 7], 5555))));
        let response = router.oneshot(request).await.unwrap();

        let token = response.headers()[TOKEN_HEADER].to_str().unwrap().to_owned();
        let record = store.find_by_token(&token).await.unwrap().unwrap();
        assert_eq!(record.ip, "192.168.1.7");
        assert_eq!(record.url, "/");
    }

    #[tokio::test]
    async fn test_profiler_routes_are_not_profiled() {
        let (state, store) = create_test_state();
        let router = create_router(state, app());

        let response = router.oneshot(get_request("/_profiler")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(TOKEN_HEADER));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_disabled_profiler_passes_through() {
        let (state, store) = create_test_state();
        let router = create_router(state.with_enabled(false), app());

        let response = router.oneshot(get_request("/")).await.unwrap();
        assert!(!response.headers().contains_key(TOKEN_HEADER));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_oversized_body_passes_through() {
        let (state, store) = create_test_state();
        let router = create_router(state.with_max_body_bytes(16), app());

        let response = router.oneshot(get_request("/big")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(TOKEN_HEADER));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_response_extensions_survive_profiling() {
        let (state, store) = create_test_state();
        let router = create_router(state, tagged_app());

        let response = router.oneshot(get_request("/tagged")).await.unwrap();
        assert!(response.headers().contains_key(TOKEN_HEADER));
        assert_eq!(
            response.extensions().get::<RouteTag>(),
            Some(&RouteTag("orders"))
        );
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_response_extensions_survive_when_disabled() {
        let (state, _store) = create_test_state();
        let router = create_router(state.with_enabled(false), tagged_app());

        let response = router.oneshot(get_request("/tagged")).await.unwrap();
        assert!(!response.headers().contains_key(TOKEN_HEADER));
        assert_eq!(
            response.extensions().get::<RouteTag>(),
            Some(&RouteTag("orders"))
        );
    }

    #[test]
    fn test_is_bufferable() {
        let response = (
            [(header::CONTENT_TYPE, "text/event-stream")],
            "data: 1\n\n",
        )
            .into_response();
        assert!(!is_bufferable(&response, 1024));

        let response = Html("<body></body>").into_response();
        assert!(is_bufferable(&response, 1024));
        assert!(!is_bufferable(&response, 4));
    }
}
