//! Shared helpers for the Lattice conformance suite.
//!
//! Provides [`spawn_platform`] — a function that starts a full in-process
//! platform server (real TCP listener, OS-assigned port) on a private
//! [`MemoryBus`], waits for the readiness notification on the server-online
//! channel, and returns a handle with the base URL, the server, the bus,
//! and the stop signal so tests can drive the whole lifecycle.

use std::sync::Arc;

use lattice_bus::{EventBus, MemoryBus};
use lattice_server::{PlatformConfig, PlatformServer};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A running in-process platform server.
pub struct TestPlatform {
    /// `http://127.0.0.1:<port>` of the live listener.
    pub base_url: String,
    pub server: Arc<PlatformServer>,
    pub bus: Arc<MemoryBus>,
    /// Sending `()` here triggers the server's stop path, as an OS signal
    /// would.
    pub stop_tx: mpsc::Sender<()>,
    /// Resolves once `start` has returned (i.e. shutdown finished).
    pub task: JoinHandle<()>,
}

impl TestPlatform {
    /// Signal the server to stop and wait for `start` to return.
    pub async fn shut_down(self) {
        let _ = self.stop_tx.send(()).await;
        let _ = self.task.await;
    }
}

/// Start a platform server with default test configuration.
pub async fn spawn_platform() -> TestPlatform {
    spawn_platform_with(test_config()).await
}

/// Default test configuration: loopback host, OS-assigned port.
pub fn test_config() -> PlatformConfig {
    PlatformConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..PlatformConfig::default()
    }
}

/// Start a platform server with the given configuration and wait until it
/// announces readiness.
///
/// # Panics
///
/// Panics if the server does not come online.
pub async fn spawn_platform_with(config: PlatformConfig) -> TestPlatform {
    let bus = Arc::new(MemoryBus::new());
    let server = Arc::new(PlatformServer::new(
        config,
        Arc::clone(&bus) as Arc<dyn EventBus>,
        None,
    ));

    // Subscribe before starting so the readiness notification cannot be
    // missed.
    let mut online = bus.listen_stream(lattice_server::SERVER_ONLINE_CHANNEL);

    let (stop_tx, stop_rx) = mpsc::channel(1);
    let task = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.start(stop_rx).await })
    };

    loop {
        let msg = tokio::time::timeout(std::time::Duration::from_secs(5), online.recv())
            .await
            .expect("server did not come online")
            .expect("online channel closed");
        if msg.payload == Value::Bool(true) {
            break;
        }
    }

    let base_url = format!("http://127.0.0.1:{}", server.local_port());
    TestPlatform {
        base_url,
        server,
        bus,
        stop_tx,
        task,
    }
}
