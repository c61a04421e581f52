//! Fabric services and the service registry.
//!
//! A fabric service owns one bus channel: the registry subscribes to the
//! channel's request stream and feeds each request to the service, which
//! answers by publishing correlated responses back on the same channel.
//!
//! The registry is an explicit dependency of the platform server (never a
//! process-wide singleton) so tests can run against a private bus.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use lattice_bus::{EventBus, Message, SERVICE_READY_STORE};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::ServerError;

/// A service reachable over the bus (and, once bridged, over REST).
#[async_trait]
pub trait FabricService: Send + Sync + 'static {
    /// Handle one request published on the service's channel. Responses are
    /// sent back through `bus` with the request's correlation id.
    async fn handle_service_request(&self, request: Message, bus: Arc<dyn EventBus>);

    /// Services that perform their own warm-up return `true` and mark the
    /// ready store themselves; everyone else is marked ready immediately
    /// upon registration.
    fn manages_own_readiness(&self) -> bool {
        false
    }

    /// Teardown hook run (in parallel with other services) during server
    /// shutdown, bounded by the configured shutdown deadline.
    async fn on_server_shutdown(&self) {}
}

struct RegisteredService {
    service: Arc<dyn FabricService>,
    listener: JoinHandle<()>,
}

/// Tracks registered services and their channel listeners.
pub struct ServiceRegistry {
    bus: Arc<dyn EventBus>,
    services: RwLock<HashMap<String, RegisteredService>>,
}

impl ServiceRegistry {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self {
            bus,
            services: RwLock::new(HashMap::new()),
        }
    }

    /// Register `service` on `channel` and start feeding it requests.
    ///
    /// Must be called from within a tokio runtime. Errors if the channel
    /// already has a service.
    pub fn register_service(
        &self,
        service: Arc<dyn FabricService>,
        channel: &str,
    ) -> Result<(), ServerError> {
        let mut services = self.services.write().unwrap_or_else(|p| p.into_inner());
        if services.contains_key(channel) {
            return Err(ServerError::ServiceConflict(channel.to_string()));
        }

        let mut subscription = self.bus.listen_request_stream(channel);
        let bus = Arc::clone(&self.bus);
        let svc = Arc::clone(&service);
        let listener = tokio::spawn(async move {
            while let Ok(msg) = subscription.recv().await {
                svc.handle_service_request(msg, Arc::clone(&bus)).await;
            }
        });

        services.insert(
            channel.to_string(),
            RegisteredService { service: Arc::clone(&service), listener },
        );
        info!(channel, "service registered");

        if !service.manages_own_readiness() {
            self.bus
                .stores()
                .store(SERVICE_READY_STORE)
                .put(channel, Value::Bool(true));
            info!(channel, "service marked ready");
        }

        Ok(())
    }

    /// Channels with a registered service, in no particular order.
    pub fn service_channels(&self) -> Vec<String> {
        let services = self.services.read().unwrap_or_else(|p| p.into_inner());
        services.keys().cloned().collect()
    }

    /// Snapshot of `(channel, service)` pairs, for running shutdown hooks.
    pub(crate) fn services(&self) -> Vec<(String, Arc<dyn FabricService>)> {
        let services = self.services.read().unwrap_or_else(|p| p.into_inner());
        services
            .iter()
            .map(|(channel, entry)| (channel.clone(), Arc::clone(&entry.service)))
            .collect()
    }

    /// Stop every channel listener. Called at server shutdown.
    pub(crate) fn shutdown(&self) {
        let services = self.services.read().unwrap_or_else(|p| p.into_inner());
        for entry in services.values() {
            entry.listener.abort();
        }
    }
}
