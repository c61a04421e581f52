//! Basic security response headers.
//!
//! Applied unconditionally to every static-file response.

use axum::http::header::{HeaderMap, HeaderValue};

/// Add the baseline security headers to a response header map.
pub fn apply_security_headers(headers: &mut HeaderMap) {
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
    headers.insert(
        "referrer-policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
}
