//! HTTP middleware applied around the dispatcher and static routes.

pub mod proxy;
pub mod security;

pub use proxy::{proxy_headers, ForwardedClient};
pub use security::apply_security_headers;
