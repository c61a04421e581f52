//! `lattice-server` — run a platform server from a JSON config file.
//!
//! ```sh
//! # Default config path (./config.json):
//! lattice-server
//!
//! # Explicit config path:
//! lattice-server /etc/lattice/config.json
//! ```
//!
//! Logging is controlled with `RUST_LOG` (default `lattice_server=info`).
//! The server stops on SIGINT/SIGTERM.

use std::sync::Arc;

use lattice_bus::MemoryBus;
use lattice_server::{PlatformConfig, PlatformServer};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lattice_server=info".into()),
        )
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.json".into());
    let config = match PlatformConfig::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let server = PlatformServer::new(config, Arc::new(MemoryBus::new()), None);

    // OS signals are handled inside start(); the channel is for embedders.
    let (_stop, signal) = tokio::sync::mpsc::channel(1);
    server.start(signal).await;
}
