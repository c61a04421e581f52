//! The platform server façade and its lifecycle.
//!
//! A [`PlatformServer`] co-hosts the HTTP(S) surface and an optional STOMP
//! broker over one event bus. Bridging operations may be called before or
//! while the server is serving; TLS customization only before.
//!
//! Startup order: port pre-check, broker (background), HTTP listener
//! (background), readiness probe, then a `true` on the readiness channel.
//! Shutdown: a `false` on the readiness channel, service teardown hooks in
//! parallel, HTTP drain, broker stop — all bounded by one deadline.

use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::Method;
use lattice_bus::{EventBus, Message};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::bridge::registry::RestBridgeHost;
use crate::bridge::BridgeConfig;
use crate::config::PlatformConfig;
use crate::dispatch;
use crate::error::ServerError;
use crate::fabric::{FabricBinding, FabricEndpoint};
use crate::http;
use crate::routes::{exact_route_name, HandlerMiddleware, RouteEntry, RouteHandler, RouteHost};
use crate::service::{FabricService, ServiceRegistry};
use crate::static_files::StaticFilesHandler;

/// Reserved channel carrying server online/offline transitions: `true` is
/// published once the listener accepts connections, `false` when shutdown
/// begins.
pub const SERVER_ONLINE_CHANNEL: &str = "#lattice-server-online-notify";

/// Observable per-subsystem serving state.
pub struct ServerAvailability {
    http: AtomicBool,
    fabric: AtomicBool,
}

impl ServerAvailability {
    fn new() -> Self {
        Self {
            http: AtomicBool::new(false),
            fabric: AtomicBool::new(false),
        }
    }

    pub fn http(&self) -> bool {
        self.http.load(Ordering::Acquire)
    }

    pub fn fabric(&self) -> bool {
        self.fabric.load(Ordering::Acquire)
    }

    pub(crate) fn set_http(&self, serving: bool) {
        self.http.store(serving, Ordering::Release);
    }

    pub(crate) fn set_fabric(&self, serving: bool) {
        self.fabric.store(serving, Ordering::Release);
    }
}

/// The platform server.
pub struct PlatformServer {
    config: PlatformConfig,
    bus: Arc<dyn EventBus>,
    registry: ServiceRegistry,
    routes: Arc<RouteHost>,
    bridges: RestBridgeHost,
    availability: Arc<ServerAvailability>,
    fabric: Option<Arc<dyn FabricEndpoint>>,
    tls_override: Mutex<Option<Arc<rustls::ServerConfig>>>,
    shutdown_tx: watch::Sender<bool>,
    http_task: Mutex<Option<JoinHandle<()>>>,
    bound_port: AtomicU16,
    stopped: AtomicBool,
}

impl PlatformServer {
    pub fn new(
        config: PlatformConfig,
        bus: Arc<dyn EventBus>,
        fabric: Option<Arc<dyn FabricEndpoint>>,
    ) -> Self {
        let routes = Arc::new(RouteHost::new());
        let bridges = RestBridgeHost::new(
            Arc::clone(&bus),
            Arc::clone(&routes),
            config.rest_bridge_timeout,
        );
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            registry: ServiceRegistry::new(Arc::clone(&bus)),
            bridges,
            routes,
            bus,
            config,
            availability: Arc::new(ServerAvailability::new()),
            fabric,
            tls_override: Mutex::new(None),
            shutdown_tx,
            http_task: Mutex::new(None),
            bound_port: AtomicU16::new(0),
            stopped: AtomicBool::new(false),
        }
    }

    /// Build a server from a JSON configuration file.
    pub fn from_config_file(
        path: impl AsRef<std::path::Path>,
        bus: Arc<dyn EventBus>,
        fabric: Option<Arc<dyn FabricEndpoint>>,
    ) -> Result<Self, ServerError> {
        Ok(Self::new(PlatformConfig::from_file(path)?, bus, fabric))
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    pub fn availability(&self) -> &ServerAvailability {
        &self.availability
    }

    /// The injected broker endpoint, for embedders that drive it manually.
    pub fn fabric_connection_listener(&self) -> Option<Arc<dyn FabricEndpoint>> {
        self.fabric.clone()
    }

    /// The port the HTTP listener actually bound (resolves `port: 0`).
    /// Zero until the listener is up.
    pub fn local_port(&self) -> u16 {
        self.bound_port.load(Ordering::Acquire)
    }

    /// Register a fabric service on `channel`. Hookless services are marked
    /// ready in the service-ready store immediately.
    pub fn register_service(
        &self,
        service: Arc<dyn FabricService>,
        channel: &str,
    ) -> Result<(), ServerError> {
        self.registry.register_service(service, channel)
    }

    /// Serve the contents of `dir` under `prefix/`. Security headers are
    /// always applied; `middleware` wraps the handler in the given order,
    /// outermost last.
    pub fn set_static_route(
        &self,
        prefix: &str,
        dir: impl AsRef<std::path::Path>,
        middleware: Vec<HandlerMiddleware>,
    ) {
        let mut handler: Arc<dyn RouteHandler> = Arc::new(StaticFilesHandler::new(prefix, dir));
        for wrap in middleware {
            handler = wrap(handler);
        }
        self.bridges.register_route(RouteEntry::static_prefix(prefix, handler));
    }

    /// Install a fallback handler for every path no other route claims
    /// (single-page-application entry point). Longest-prefix matching makes
    /// the `/` prefix lose to every other route.
    pub fn set_spa_fallback(&self, handler: Arc<dyn RouteHandler>) {
        self.bridges.register_route(RouteEntry::prefix("/", handler));
    }

    /// Bridge an exact path and method set to a service channel.
    pub fn set_http_channel_bridge(&self, config: BridgeConfig) {
        self.bridges.attach_bridge(config);
    }

    /// Bridge every method and sub-path under a prefix to a service channel.
    pub fn set_http_path_prefix_channel_bridge(&self, config: BridgeConfig) {
        self.bridges.attach_prefix_bridge(config);
    }

    /// Remove every REST bridge of `channel`. The prescribed replacement
    /// protocol is clear, then attach.
    pub fn clear_http_channel_bridges(&self, channel: &str) {
        self.bridges.clear_bridges_for_channel(channel);
    }

    /// Look up the bridge route registered for `uri`/`method`.
    pub fn get_rest_bridge_sub_route(
        &self,
        uri: &str,
        method: &Method,
    ) -> Result<RouteEntry, ServerError> {
        self.routes
            .snapshot()
            .lookup_by_name(&exact_route_name(uri, method))
            .cloned()
            .ok_or_else(|| ServerError::RouteNotFound {
                uri: uri.to_string(),
                method: method.to_string(),
            })
    }

    /// Replace the TLS configuration used by the next start. Fails with
    /// [`ServerError::AlreadyRunning`] while either subsystem is serving.
    pub fn customize_tls_config(&self, tls: Arc<rustls::ServerConfig>) -> Result<(), ServerError> {
        if self.availability.http() || self.availability.fabric() {
            return Err(ServerError::AlreadyRunning);
        }
        let mut tls_override = self.tls_override.lock().unwrap_or_else(|p| p.into_inner());
        *tls_override = Some(tls);
        Ok(())
    }

    /// Start serving and block until `signal` fires (or the process receives
    /// SIGINT/SIGTERM), then run [`stop`](Self::stop).
    ///
    /// Subsystem startup failures are logged, leave the corresponding
    /// availability flag unset, and do not abort the other subsystems.
    pub async fn start(&self, mut signal: mpsc::Receiver<()>) {
        self.probe_configured_port().await;

        // Static mounts from configuration: "<directory>:<uri-prefix>".
        for mount in &self.config.static_dir {
            match mount.split_once(':') {
                Some((dir, prefix)) if !prefix.is_empty() => {
                    self.set_static_route(prefix, dir, Vec::new());
                }
                _ => warn!(mount = %mount, "ignoring malformed static mount"),
            }
        }

        let app = dispatch::build_app(Arc::clone(&self.routes));

        if let Some(endpoint) = self.fabric.clone() {
            if let Some(binding) = FabricBinding::from_config(&self.config) {
                let availability = Arc::clone(&self.availability);
                tokio::spawn(async move {
                    info!(location = %binding.location(), "starting fabric broker");
                    match endpoint.start(binding).await {
                        Ok(()) => availability.set_fabric(true),
                        Err(e) => error!(error = %e, "fabric broker failed to start"),
                    }
                });
            }
        }

        let http_started = self.start_http_listener(app).await;

        if http_started {
            // Probe until the listener answers, then announce readiness.
            // Startup blocks here for as long as it takes.
            let port = self.local_port();
            let host = self.probe_host();
            loop {
                if TcpStream::connect((host.as_str(), port)).await.is_ok() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            let online = Message::response(SERVER_ONLINE_CHANNEL, Uuid::new_v4(), json!(true));
            let _ = self.bus.send_response(online).await;
            info!(host = %self.config.host, port, "server online");
        }

        tokio::select! {
            _ = signal.recv() => info!("stop signal received"),
            _ = tokio::signal::ctrl_c() => info!("interrupt received"),
            _ = terminate_signal() => info!("terminate received"),
        }

        self.stop().await;
    }

    /// Gracefully stop the HTTP surface, the broker, and every service.
    ///
    /// Idempotent: a second call on an already-stopped server is a no-op.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("server shutting down");

        let offline = Message::response(SERVER_ONLINE_CHANNEL, Uuid::new_v4(), json!(false));
        let _ = self.bus.send_response(offline).await;
        self.availability.set_http(false);

        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;

        // Every service teardown hook runs in parallel, bounded by the
        // shared deadline.
        let hooks: Vec<JoinHandle<()>> = self
            .registry
            .services()
            .into_iter()
            .map(|(channel, service)| {
                tokio::spawn(async move {
                    info!(channel = %channel, "teardown in progress for service");
                    service.on_server_shutdown().await;
                    info!(channel = %channel, "teardown completed for service");
                })
            })
            .collect();
        if tokio::time::timeout_at(deadline, futures::future::join_all(hooks))
            .await
            .is_err()
        {
            error!(
                timeout = ?self.config.shutdown_timeout,
                "service teardown hooks did not finish before the shutdown deadline"
            );
        }

        // Drain the HTTP listener with the same deadline.
        let _ = self.shutdown_tx.send(true);
        let http_task = {
            let mut task = self.http_task.lock().unwrap_or_else(|p| p.into_inner());
            task.take()
        };
        if let Some(task) = http_task {
            match tokio::time::timeout_at(deadline, task).await {
                Err(_) => error!(
                    timeout = ?self.config.shutdown_timeout,
                    "server failed to drain connections before the shutdown deadline"
                ),
                Ok(Err(e)) => error!(error = %e, "HTTP serve task failed"),
                Ok(Ok(())) => {}
            }
        }

        if let Some(endpoint) = &self.fabric {
            if let Err(e) = endpoint.stop().await {
                error!(error = %e, "failed to stop fabric broker");
            }
            self.availability.set_fabric(false);
        }

        self.bridges.shutdown();
        self.registry.shutdown();
        info!("server stopped");
    }

    /// Bind the listener and spawn the accept loop. Returns whether the
    /// HTTP subsystem came up.
    async fn start_http_listener(&self, app: axum::Router) -> bool {
        let tls = match self.resolve_tls() {
            Ok(tls) => tls,
            Err(e) => {
                error!(error = %e, "failed to load TLS configuration; HTTP listener not started");
                return false;
            }
        };

        let addr = self.config.bind_addr();
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(addr = %addr, error = %e, "failed to bind HTTP listener");
                return false;
            }
        };

        if let Ok(local) = listener.local_addr() {
            self.bound_port.store(local.port(), Ordering::Release);
        }
        self.availability.set_http(true);
        info!(addr = %addr, tls = tls.is_some(), "HTTP listener bound");

        let shutdown_rx = self.shutdown_tx.subscribe();
        let task = tokio::spawn(http::serve(listener, app, tls, shutdown_rx));
        let mut http_task = self.http_task.lock().unwrap_or_else(|p| p.into_inner());
        *http_task = Some(task);
        true
    }

    /// TLS for the next listener: an explicit override wins, otherwise the
    /// configured cert/key files, otherwise plaintext.
    fn resolve_tls(&self) -> Result<Option<TlsAcceptor>, ServerError> {
        let tls_override = {
            let guard = self.tls_override.lock().unwrap_or_else(|p| p.into_inner());
            guard.clone()
        };
        if let Some(config) = tls_override {
            return Ok(Some(TlsAcceptor::from(config)));
        }
        match &self.config.tls_cert_config {
            Some(tls) => Ok(Some(TlsAcceptor::from(http::load_tls_config(tls)?))),
            None => Ok(None),
        }
    }

    /// Pre-flight dial of the configured port. A successful connect means
    /// someone else is listening; that is logged loudly but startup
    /// proceeds regardless.
    async fn probe_configured_port(&self) {
        if self.config.port == 0 {
            return;
        }
        let host = self.probe_host();
        if TcpStream::connect((host.as_str(), self.config.port)).await.is_ok() {
            error!(
                host = %self.config.host,
                port = self.config.port,
                "another process is already listening on the configured port - try another"
            );
        }
    }

    fn probe_host(&self) -> String {
        match self.config.host.as_str() {
            "0.0.0.0" | "::" | "" => "127.0.0.1".to_string(),
            host => host.to_string(),
        }
    }
}

async fn terminate_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    std::future::pending::<()>().await;
}
