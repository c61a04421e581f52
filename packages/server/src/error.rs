//! Server error taxonomy.
//!
//! Construction and caller-initiated reconfiguration errors are returned to
//! the caller. Runtime failures inside bridge handlers never appear here —
//! they are translated to HTTP status codes (504 timeout, 502 bus error,
//! 500 panic) at the handler boundary. Background subsystem failures are
//! logged and do not take the process down.

/// Errors returned by platform-server construction and façade operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The configuration file is missing or its JSON is malformed. Fatal to
    /// server construction.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subsystem (listener, TLS material, broker) failed to initialize.
    #[error("server initialization failed: {0}")]
    Init(String),

    /// TLS reconfiguration was attempted while the server is serving.
    #[error("TLS configuration can only be changed while the server is not running")]
    AlreadyRunning,

    /// A service is already registered on the requested channel.
    #[error("a service is already registered on channel {0}")]
    ServiceConflict(String),

    /// No REST bridge route exists for the requested uri/method pair.
    #[error("no route exists at {uri} ({method})")]
    RouteNotFound { uri: String, method: String },

    /// The injected fabric broker reported a failure.
    #[error("fabric endpoint error: {0}")]
    Fabric(String),
}
