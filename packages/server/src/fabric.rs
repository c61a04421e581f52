//! STOMP broker seam.
//!
//! The broker itself is an external collaborator: the platform server only
//! computes where it should bind, drives its start/stop lifecycle, and
//! reports its availability. Embedders inject an implementation at
//! construction; the server runs fine without one.

use async_trait::async_trait;

use crate::config::PlatformConfig;
use crate::error::ServerError;

/// Where the broker should accept connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FabricBinding {
    /// A dedicated TCP listener; no HTTP endpoint path.
    Tcp { host: String, port: u16 },

    /// Share the HTTP port, upgrading connections at `endpoint`.
    WebSocket {
        host: String,
        port: u16,
        endpoint: String,
    },
}

impl FabricBinding {
    /// Compute the binding from configuration: TCP when `useTCP` is set
    /// (the endpoint path is ignored), otherwise the HTTP port at the
    /// configured endpoint path. `None` when no fabric is configured.
    pub fn from_config(config: &PlatformConfig) -> Option<Self> {
        let fabric = config.fabric_config.as_ref()?;
        Some(if fabric.use_tcp {
            FabricBinding::Tcp {
                host: config.host.clone(),
                port: fabric.tcp_port,
            }
        } else {
            FabricBinding::WebSocket {
                host: config.host.clone(),
                port: config.port,
                endpoint: fabric.fabric_endpoint.clone(),
            }
        })
    }

    /// Human-readable location for logs.
    pub fn location(&self) -> String {
        match self {
            FabricBinding::Tcp { host, port } => format!("{host}:{port}"),
            FabricBinding::WebSocket { host, port, endpoint } => {
                format!("{host}:{port}{endpoint}")
            }
        }
    }
}

/// Lifecycle contract for an injected broker endpoint.
#[async_trait]
pub trait FabricEndpoint: Send + Sync + 'static {
    /// Start accepting connections at `binding`. Resolves once the broker
    /// is actually accepting, so the caller can flip its availability flag.
    async fn start(&self, binding: FabricBinding) -> Result<(), ServerError>;

    /// Stop accepting connections and drop existing ones.
    async fn stop(&self) -> Result<(), ServerError>;
}
