//! Built-in collectors.
//!
//! - [`RequestCollector`] (`request`): method, URL, query, headers, client address
//! - [`ResponseCollector`] (`response`): status, content type, headers, body size
//! - [`TimeCollector`] (`time`): start timestamp and elapsed time
//! - [`EnvironmentCollector`] (`environment`): package, platform, process

use std::collections::BTreeMap;

use axum::http::HeaderMap;
use chrono::Utc;

use crate::collector::{
    CollectionContext, Collector, CollectorError, DefinitionBuilder, DefinitionError,
    RegistryBuilder, Status,
};
use crate::http::{ProfiledRequest, ProfiledResponse};

/// Requests slower than this are flagged as warnings.
pub const SLOW_REQUEST_MS: f64 = 500.0;

/// Requests slower than this are flagged as dangerous.
pub const VERY_SLOW_REQUEST_MS: f64 = 2_000.0;

/// Identifiers of the built-in collectors, in registration order.
pub const BUILTIN_IDENTIFIERS: [&str; 4] = ["request", "response", "time", "environment"];

/// Register every built-in collector, skipping none.
pub fn register_all(builder: &mut RegistryBuilder) -> Result<(), DefinitionError> {
    register_all_except(builder, &[])
}

/// Register the built-in collectors, forcing the listed identifiers off.
///
/// Fails with [`DefinitionError::UnknownCollector`] if a listed identifier
/// names no built-in collector.
pub fn register_all_except(
    builder: &mut RegistryBuilder,
    disabled: &[String],
) -> Result<(), DefinitionError> {
    if let Some(unknown) = disabled
        .iter()
        .find(|id| !BUILTIN_IDENTIFIERS.contains(&id.as_str()))
    {
        return Err(DefinitionError::UnknownCollector(unknown.clone()));
    }

    let adjust = |definition: DefinitionBuilder, identifier: &str| {
        if disabled.iter().any(|d| d == identifier) {
            tracing::info!(collector = identifier, "Collector disabled by configuration");
            definition.enabled(false)
        } else {
            definition
        }
    };

    builder
        .register_with::<RequestCollector>(|d| adjust(d, "request"))?
        .register_with::<ResponseCollector>(|d| adjust(d, "response"))?
        .register_with::<TimeCollector>(|d| adjust(d, "time"))?
        .register_with::<EnvironmentCollector>(|d| adjust(d, "environment"))?;
    Ok(())
}

fn headers_to_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_owned(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// Request line, query parameters and headers.
pub struct RequestCollector;

impl Collector for RequestCollector {
    fn declare(definition: DefinitionBuilder) -> DefinitionBuilder {
        definition
            .label("Request")
            .icon("request")
            .position(1)
            .template_embedded(include_str!("../../templates/collectors/request.html"))
    }

    fn collect(
        request: &ProfiledRequest,
        _response: &ProfiledResponse,
        ctx: &mut CollectionContext,
    ) -> Result<(), CollectorError> {
        ctx.store("method", request.method())
            .store("url", request.url())
            .store("path", request.path())
            .store("ip", request.ip())
            .store("version", request.version())
            .store_serialized("query", &request.query_params())
            .store_serialized("headers", &headers_to_map(request.headers()));
        Ok(())
    }
}

/// Status line, content type and headers of the outgoing response.
pub struct ResponseCollector;

impl Collector for ResponseCollector {
    fn declare(definition: DefinitionBuilder) -> DefinitionBuilder {
        definition
            .label("Response")
            .icon("response")
            .position(2)
            .template_embedded(include_str!("../../templates/collectors/response.html"))
    }

    fn collect(
        _request: &ProfiledRequest,
        response: &ProfiledResponse,
        ctx: &mut CollectionContext,
    ) -> Result<(), CollectorError> {
        let status = response.status;
        ctx.store("status", status.as_u16())
            .store("reason", status.canonical_reason().unwrap_or_default())
            .store("content_type", response.content_type())
            .store("body_size", response.body.len())
            .store_serialized("headers", &headers_to_map(&response.headers));

        ctx.set_status(if status.is_server_error() {
            Status::Danger
        } else if status.is_client_error() {
            Status::Warning
        } else {
            Status::Success
        });
        Ok(())
    }
}

/// Wall-clock time between request capture and collection.
pub struct TimeCollector;

impl Collector for TimeCollector {
    fn declare(definition: DefinitionBuilder) -> DefinitionBuilder {
        definition
            .label("Time")
            .icon("clock")
            .position(3)
            .template_embedded(include_str!("../../templates/collectors/time.html"))
    }

    fn collect(
        request: &ProfiledRequest,
        _response: &ProfiledResponse,
        ctx: &mut CollectionContext,
    ) -> Result<(), CollectorError> {
        let started_at = request.started_at();
        let elapsed = Utc::now().signed_duration_since(started_at);
        let duration_ms = elapsed.num_microseconds().unwrap_or(i64::MAX) as f64 / 1_000.0;

        ctx.store("started_at", started_at.to_rfc3339())
            .store("duration_ms", duration_ms);

        ctx.set_status(if duration_ms > VERY_SLOW_REQUEST_MS {
            Status::Danger
        } else if duration_ms > SLOW_REQUEST_MS {
            Status::Warning
        } else {
            Status::Success
        });
        Ok(())
    }
}

/// Package and platform the profiled application runs on.
pub struct EnvironmentCollector;

impl Collector for EnvironmentCollector {
    fn declare(definition: DefinitionBuilder) -> DefinitionBuilder {
        definition
            .label("Environment")
            .icon("gear")
            .position(10)
            .template_embedded(include_str!("../../templates/collectors/environment.html"))
    }

    fn collect(
        _request: &ProfiledRequest,
        _response: &ProfiledResponse,
        ctx: &mut CollectionContext,
    ) -> Result<(), CollectorError> {
        ctx.store("package", env!("CARGO_PKG_NAME"))
            .store("version", env!("CARGO_PKG_VERSION"))
            .store("os", std::env::consts::OS)
            .store("arch", std::env::consts::ARCH)
            .store("pid", std::process::id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectorRegistry;
    use axum::http::{HeaderValue, Method, StatusCode, Uri, header};
    use chrono::Duration;
    use serde_json::json;

    fn request() -> ProfiledRequest {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("localhost:8080"));
        ProfiledRequest::new(Method::POST, Uri::from_static("/orders?id=7"))
            .with_headers(headers)
            .with_ip("127.0.0.1")
    }

    fn response(status: StatusCode) -> ProfiledResponse {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        ProfiledResponse::new("<html></html>", status, headers)
    }

    #[test]
    fn test_register_all() {
        let mut builder = CollectorRegistry::builder();
        register_all(&mut builder).unwrap();
        let registry = builder.build();

        let ids: Vec<_> = registry.all().map(|d| d.identifier().to_owned()).collect();
        assert_eq!(ids, BUILTIN_IDENTIFIERS);
        assert!(registry.all().all(|d| d.template().is_some()));
    }

    #[test]
    fn test_register_all_twice_is_duplicate() {
        let mut builder = CollectorRegistry::builder();
        register_all(&mut builder).unwrap();
        let err = register_all(&mut builder).unwrap_err();
        assert_eq!(err, DefinitionError::DuplicateIdentifier("request".into()));
    }

    #[test]
    fn test_register_all_except() {
        let mut builder = CollectorRegistry::builder();
        register_all_except(&mut builder, &["time".to_owned()]).unwrap();
        let registry = builder.build();
        assert!(!registry.get("time").unwrap().is_enabled());
        assert!(registry.get("request").unwrap().is_enabled());
    }

    #[test]
    fn test_register_all_except_rejects_unknown_identifier() {
        let mut builder = CollectorRegistry::builder();
        let err = register_all_except(&mut builder, &["enviroment".to_owned()]).unwrap_err();
        assert_eq!(err, DefinitionError::UnknownCollector("enviroment".into()));
        assert!(builder.build().is_empty());
    }

    #[test]
    fn test_request_collector() {
        let mut ctx = CollectionContext::new();
        RequestCollector::collect(&request(), &response(StatusCode::OK), &mut ctx).unwrap();

        assert_eq!(ctx.get("method"), Some(&json!("POST")));
        assert_eq!(ctx.get("url"), Some(&json!("http://localhost:8080/orders?id=7")));
        assert_eq!(ctx.get("query"), Some(&json!({"id": "7"})));
        assert_eq!(ctx.get("ip"), Some(&json!("127.0.0.1")));
        assert_eq!(ctx.get("headers").unwrap()["host"], json!("localhost:8080"));
    }

    #[test]
    fn test_response_collector_status() {
        let mut ctx = CollectionContext::new();
        ResponseCollector::collect(&request(), &response(StatusCode::OK), &mut ctx).unwrap();
        assert_eq!(ctx.status(), Some(Status::Success));
        assert_eq!(ctx.get("status"), Some(&json!(200)));
        assert_eq!(ctx.get("content_type"), Some(&json!("text/html")));
        assert_eq!(ctx.get("body_size"), Some(&json!(13)));

        let mut ctx = CollectionContext::new();
        ResponseCollector::collect(&request(), &response(StatusCode::NOT_FOUND), &mut ctx)
            .unwrap();
        assert_eq!(ctx.status(), Some(Status::Warning));

        let mut ctx = CollectionContext::new();
        ResponseCollector::collect(
            &request(),
            &response(StatusCode::INTERNAL_SERVER_ERROR),
            &mut ctx,
        )
        .unwrap();
        assert_eq!(ctx.status(), Some(Status::Danger));
    }

    #[test]
    fn test_time_collector_flags_slow_requests() {
        let slow = request().with_started_at(Utc::now() - Duration::seconds(1));
        let mut ctx = CollectionContext::new();
        TimeCollector::collect(&slow, &response(StatusCode::OK), &mut ctx).unwrap();
        assert_eq!(ctx.status(), Some(Status::Warning));
        assert!(ctx.get("duration_ms").unwrap().as_f64().unwrap() >= 1_000.0);

        let very_slow = request().with_started_at(Utc::now() - Duration::seconds(5));
        let mut ctx = CollectionContext::new();
        TimeCollector::collect(&very_slow, &response(StatusCode::OK), &mut ctx).unwrap();
        assert_eq!(ctx.status(), Some(Status::Danger));
    }

    #[test]
    fn test_environment_collector() {
        let mut ctx = CollectionContext::new();
        EnvironmentCollector::collect(&request(), &response(StatusCode::OK), &mut ctx).unwrap();
        assert_eq!(ctx.get("package"), Some(&json!("webprofiler")));
        assert_eq!(ctx.get("pid"), Some(&json!(std::process::id())));
    }
}
