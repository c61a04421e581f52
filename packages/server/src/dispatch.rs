//! Request dispatcher: the single axum handler behind which the mutable
//! route table lives.
//!
//! Routes change while the server is serving (bridges attach and detach),
//! and axum's router is not built for that. Instead the app is one fallback
//! handler that snapshots the current [`RouteTable`] per request and walks
//! it; publishing a new table never disturbs requests in flight.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tracing::debug;

use crate::middleware::proxy::{proxy_headers, ForwardedClient};
use crate::routes::RouteHost;

/// Assemble the served application: the dispatcher wrapped in proxy-header,
/// compression, and recovery middleware (innermost to outermost).
pub(crate) fn build_app(routes: Arc<RouteHost>) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(routes)
        .layer(middleware::from_fn(proxy_headers))
        .layer(CompressionLayer::new())
        .layer(CatchPanicLayer::new())
}

async fn dispatch(State(routes): State<Arc<RouteHost>>, req: Request) -> Response {
    // The proxy-header middleware resolves the real client behind a reverse
    // proxy; the access log reports it instead of the proxy's address.
    let client = req
        .extensions()
        .get::<ForwardedClient>()
        .map_or_else(|| "-".to_string(), |c| c.0.clone());
    debug!(
        method = %req.method(),
        path = %req.uri().path(),
        client = %client,
        "dispatching request"
    );

    let table = routes.snapshot();
    let handler = table
        .find_match(req.method(), req.uri().path())
        .map(|entry| entry.handler());

    match handler {
        Some(handler) => handler.handle(req).await,
        None => (StatusCode::NOT_FOUND, "no route matches the request\n").into_response(),
    }
}
