//! Platform server configuration, loaded from a JSON file.
//!
//! Keys are camelCase. Duration values are expressed in **minutes** in the
//! file and resolved to [`Duration`]s at load time; non-positive values fall
//! back to their defaults (5 minutes for `shutdownTimeout`, 1 minute for
//! `restBridgeTimeout`). Embedders that construct a [`PlatformConfig`]
//! directly may use any `Duration`.
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `host` | `127.0.0.1` | HTTP listener bind host |
//! | `port` | `8080` | HTTP listener bind port (`0` = OS-assigned) |
//! | `rootDir` | `.` | Base directory for relative TLS paths |
//! | `tlsCertConfig` | (absent) | Serve HTTPS with this cert/key pair |
//! | `shutdownTimeout` | `5` | Graceful-shutdown deadline, minutes |
//! | `restBridgeTimeout` | `1` | REST bridge response wait, minutes |
//! | `fabricConfig` | (absent) | STOMP broker binding |
//! | `staticDir` | `[]` | `"<path>:<uri-prefix>"` mounts served at startup |

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::ServerError;

const DEFAULT_SHUTDOWN_TIMEOUT_MINUTES: u64 = 5;
const DEFAULT_REST_BRIDGE_TIMEOUT_MINUTES: u64 = 1;

/// TLS certificate material. Relative paths are resolved against `rootDir`
/// and lexically cleaned; absolute paths pass through untouched.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsCertConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

/// STOMP broker binding. With `useTCP` the broker binds its own listener on
/// `tcpPort` and `fabricEndpoint` is ignored; otherwise the broker shares
/// the HTTP port at the `fabricEndpoint` path.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FabricConfig {
    #[serde(default)]
    pub fabric_endpoint: String,

    #[serde(default, rename = "useTCP")]
    pub use_tcp: bool,

    #[serde(default)]
    pub tcp_port: u16,

    /// Opaque endpoint settings handed to the broker implementation.
    #[serde(default)]
    pub endpoint_config: Option<serde_json::Value>,
}

/// Runtime configuration for the platform server.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    #[serde(default)]
    pub tls_cert_config: Option<TlsCertConfig>,

    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "shutdown_timeout_minutes"
    )]
    pub shutdown_timeout: Duration,

    #[serde(
        default = "default_rest_bridge_timeout",
        deserialize_with = "rest_bridge_timeout_minutes"
    )]
    pub rest_bridge_timeout: Duration,

    #[serde(default)]
    pub fabric_config: Option<FabricConfig>,

    /// Static mounts of the form `"<directory>:<uri-prefix>"`, installed
    /// before the listener starts.
    #[serde(default)]
    pub static_dir: Vec<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            root_dir: default_root_dir(),
            tls_cert_config: None,
            shutdown_timeout: default_shutdown_timeout(),
            rest_bridge_timeout: default_rest_bridge_timeout(),
            fabric_config: None,
            static_dir: Vec::new(),
        }
    }
}

impl PlatformConfig {
    /// Load and sanitize a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut config: PlatformConfig = serde_json::from_str(&raw)
            .map_err(|e| ServerError::Config(format!("malformed JSON in {}: {e}", path.display())))?;
        config.resolve_tls_paths();
        Ok(config)
    }

    /// The `host:port` string the HTTP listener binds.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Join relative TLS paths against `rootDir` and clean them.
    fn resolve_tls_paths(&mut self) {
        if let Some(tls) = &mut self.tls_cert_config {
            for file in [&mut tls.cert_file, &mut tls.key_file] {
                if file.is_relative() {
                    *file = clean_path(&self.root_dir.join(&*file));
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_MINUTES * 60)
}

fn default_rest_bridge_timeout() -> Duration {
    Duration::from_secs(DEFAULT_REST_BRIDGE_TIMEOUT_MINUTES * 60)
}

fn minutes_or_default<'de, D>(deserializer: D, default: Duration) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = i64::deserialize(deserializer)?;
    if raw <= 0 {
        Ok(default)
    } else {
        Ok(Duration::from_secs(raw as u64 * 60))
    }
}

fn shutdown_timeout_minutes<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    minutes_or_default(deserializer, default_shutdown_timeout())
}

fn rest_bridge_timeout_minutes<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    minutes_or_default(deserializer, default_rest_bridge_timeout())
}

/// Lexically normalize a path: resolve `.` and `..` components without
/// touching the filesystem.
fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() {
                    cleaned.push(Component::ParentDir);
                }
            }
            other => cleaned.push(other),
        }
    }
    cleaned
}
