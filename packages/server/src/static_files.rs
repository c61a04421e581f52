//! Static file routes.
//!
//! A static route serves the contents of a directory under a URI prefix.
//! Directory listings are never produced, and the baseline security headers
//! are applied to every response before any caller-supplied middleware runs.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::Request;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tower::util::ServiceExt;
use tower_http::services::ServeDir;

use crate::middleware::security::apply_security_headers;
use crate::routes::RouteHandler;

/// Serves files from a directory at a URI prefix.
pub struct StaticFilesHandler {
    prefix: String,
    serve: ServeDir,
}

impl StaticFilesHandler {
    pub(crate) fn new(prefix: impl Into<String>, dir: impl AsRef<Path>) -> Self {
        Self {
            prefix: prefix.into(),
            serve: ServeDir::new(dir).append_index_html_on_directories(false),
        }
    }

    /// Rewrite the request URI with the route prefix stripped, so `ServeDir`
    /// resolves paths relative to its root.
    fn strip_prefix(&self, req: Request) -> Option<Request> {
        let path = req.uri().path();
        let stripped = path.strip_prefix(&self.prefix).unwrap_or(path);
        let rooted = if stripped.starts_with('/') {
            stripped.to_string()
        } else {
            format!("/{stripped}")
        };

        let rewritten = match req.uri().query() {
            Some(q) => format!("{rooted}?{q}"),
            None => rooted,
        };

        let (mut parts, body) = req.into_parts();
        parts.uri = rewritten.parse::<Uri>().ok()?;
        Some(Request::from_parts(parts, body))
    }
}

#[async_trait]
impl RouteHandler for StaticFilesHandler {
    async fn handle(&self, req: Request) -> Response {
        let Some(req) = self.strip_prefix(req) else {
            return StatusCode::NOT_FOUND.into_response();
        };

        let mut resp = match self.serve.clone().oneshot(req).await {
            Ok(resp) => resp.map(Body::new).into_response(),
            Err(never) => match never {},
        };
        apply_security_headers(resp.headers_mut());
        resp
    }
}
