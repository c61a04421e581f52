//! Proxy-header middleware.
//!
//! When the server sits behind a reverse proxy, the peer address of the TCP
//! connection is the proxy, not the client. This middleware recovers the
//! original client from `X-Forwarded-For` → `X-Real-IP` (in that order) and
//! stashes it as a request extension for handlers that care.

use axum::body::Body;
use axum::extract::Request;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

/// The client address recovered from proxy headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedClient(pub String);

/// Axum `from_fn` middleware that resolves proxy headers.
pub async fn proxy_headers(mut req: Request<Body>, next: Next) -> Response {
    if let Some(client) = forwarded_client(req.headers()) {
        req.extensions_mut().insert(ForwardedClient(client));
    }
    next.run(req).await
}

/// Extract the original client from common proxy headers.
fn forwarded_client(headers: &HeaderMap) -> Option<String> {
    // X-Forwarded-For: client, proxy1, proxy2 — leftmost is the real client.
    if let Some(xff) = headers.get("x-forwarded-for") {
        if let Ok(s) = xff.to_str() {
            if let Some(client) = s.split(',').next().map(str::trim) {
                if !client.is_empty() {
                    return Some(client.to_string());
                }
            }
        }
    }

    if let Some(xri) = headers.get("x-real-ip") {
        if let Ok(s) = xri.to_str() {
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }

    None
}
