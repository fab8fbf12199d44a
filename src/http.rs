//! Request and response values seen by collectors.
//!
//! These are owned copies of the HTTP exchange. The engine clones them once
//! before any collector runs, so collectors only ever read immutable data.

use std::collections::BTreeMap;

use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, Version, header, request};
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};

/// An inbound request as captured by the profiler.
#[derive(Debug, Clone)]
pub struct ProfiledRequest {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    ip: Option<String>,
    started_at: DateTime<Utc>,
}

impl ProfiledRequest {
    /// Capture a request with the given method and URI, starting now.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            ip: None,
            started_at: Utc::now(),
        }
    }

    /// Capture the request head of an incoming HTTP request.
    pub fn from_parts(parts: &request::Parts) -> Self {
        Self {
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            version: parts.version,
            headers: parts.headers.clone(),
            ip: None,
            started_at: Utc::now(),
        }
    }

    /// Set the client address.
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Replace the request headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Override the time the request started.
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// HTTP method name.
    pub fn method(&self) -> &str {
        self.method.as_str()
    }

    /// Request URI as received.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// URI path.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// HTTP version, e.g. `HTTP/1.1`.
    pub fn version(&self) -> String {
        format!("{:?}", self.version)
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Client address, `X-Forwarded-For` first, then the socket peer.
    pub fn ip(&self) -> String {
        self.headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
            .or_else(|| self.ip.clone())
            .unwrap_or_else(|| "unknown".to_owned())
    }

    /// When the request entered the profiler.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Absolute URL, rebuilt from the `Host` header for origin-form URIs.
    pub fn url(&self) -> String {
        if self.uri.scheme().is_some() {
            return self.uri.to_string();
        }
        let path = self
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        match self.headers.get(header::HOST).and_then(|h| h.to_str().ok()) {
            Some(host) => format!("http://{host}{path}"),
            None => path.to_owned(),
        }
    }

    /// Query string parameters. Later duplicates win.
    pub fn query_params(&self) -> BTreeMap<String, String> {
        self.uri
            .query()
            .unwrap_or_default()
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (k.to_owned(), v.to_owned()),
                None => (pair.to_owned(), String::new()),
            })
            .collect()
    }
}

/// Response payload, either one buffer or a sequence of chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// Whole body in one buffer.
    Full(Bytes),
    /// Body split into fragments, written in order.
    Chunks(Vec<Bytes>),
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self::Chunks(Vec::new())
    }
}

impl ResponseBody {
    /// An empty body.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Iterate over the body fragments.
    pub fn chunks(&self) -> impl Iterator<Item = &Bytes> {
        let chunks: &[Bytes] = match self {
            Self::Full(bytes) => std::slice::from_ref(bytes),
            Self::Chunks(chunks) => chunks,
        };
        chunks.iter()
    }

    /// Total size in bytes.
    pub fn len(&self) -> usize {
        self.chunks().map(Bytes::len).sum()
    }

    /// Whether the body has no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenate all fragments.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Full(bytes) => bytes.clone(),
            Self::Chunks(chunks) => {
                let mut buf = BytesMut::with_capacity(self.len());
                for chunk in chunks {
                    buf.extend_from_slice(chunk);
                }
                buf.freeze()
            }
        }
    }
}

impl From<String> for ResponseBody {
    fn from(s: String) -> Self {
        Self::Full(Bytes::from(s))
    }
}

impl From<&'static str> for ResponseBody {
    fn from(s: &'static str) -> Self {
        Self::Full(Bytes::from_static(s.as_bytes()))
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        Self::Full(bytes)
    }
}

impl From<Vec<Bytes>> for ResponseBody {
    fn from(chunks: Vec<Bytes>) -> Self {
        Self::Chunks(chunks)
    }
}

/// An outgoing response as seen and rewritten by the profiler.
#[derive(Debug, Clone)]
pub struct ProfiledResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response payload.
    pub body: ResponseBody,
}

impl ProfiledResponse {
    /// Build a response from its parts.
    pub fn new(body: impl Into<ResponseBody>, status: StatusCode, headers: HeaderMap) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// The `Content-Type` header, if present and valid text.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Whether the body may be rewritten: absent content type or one naming `text/html`.
    pub fn is_html(&self) -> bool {
        match self.headers.get(header::CONTENT_TYPE) {
            None => true,
            Some(value) => value
                .to_str()
                .is_ok_and(|content_type| content_type.contains("text/html")),
        }
    }

    /// Set a header, ignoring values that are not valid header text.
    pub fn set_header(&mut self, name: &'static str, value: &str) {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(e) => tracing::warn!(header = name, error = %e, "Invalid header value"),
        }
    }
}

impl IntoResponse for ProfiledResponse {
    fn into_response(self) -> Response {
        let body = self.body.to_bytes();
        let mut headers = self.headers;
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));

        let mut response = Response::new(axum::body::Body::from(body));
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        response
    }
}
