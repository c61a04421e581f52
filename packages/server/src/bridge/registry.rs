//! Bridge registry: the single writer behind all route mutation.
//!
//! Keeps the endpoint-handler map, the channel→endpoints index, and the
//! per-channel message bridges consistent under concurrent attach and clear
//! calls. One mutex guards all three plus route publication, so the table
//! observed by any request is always one of the published snapshots.
//!
//! Re-binding an occupied endpoint name is a warn-and-ignore no-op; the
//! prescribed replacement protocol is `clear_bridges_for_channel` followed
//! by a fresh attach. Clearing a channel keeps its message bridge alive so
//! re-attachment is cheap — bridges die only at server shutdown.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::Method;
use lattice_bus::EventBus;
use tracing::{info, warn};

use crate::bridge::handler::RestBusHandler;
use crate::bridge::message_bridge::MessageBridge;
use crate::bridge::BridgeConfig;
use crate::routes::{exact_route_name, prefix_route_name, RouteEntry, RouteHandler, RouteHost};

#[derive(Default)]
struct RegistryInner {
    endpoint_handlers: HashMap<String, Arc<dyn RouteHandler>>,
    channel_to_endpoints: HashMap<String, Vec<String>>,
    message_bridges: HashMap<String, Arc<MessageBridge>>,
}

pub(crate) struct RestBridgeHost {
    bus: Arc<dyn EventBus>,
    routes: Arc<RouteHost>,
    bridge_timeout: Duration,
    inner: Mutex<RegistryInner>,
}

impl RestBridgeHost {
    pub(crate) fn new(bus: Arc<dyn EventBus>, routes: Arc<RouteHost>, bridge_timeout: Duration) -> Self {
        Self {
            bus,
            routes,
            bridge_timeout,
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Bridge `cfg.uri` (exact path, method-restricted) to `cfg.service_channel`.
    pub(crate) fn attach_bridge(&self, cfg: BridgeConfig) {
        let name = exact_route_name(&cfg.uri, &cfg.method);

        let mut methods = HashSet::from([cfg.method.clone()]);
        if cfg.allow_head {
            methods.insert(Method::HEAD);
        }
        if cfg.allow_options {
            methods.insert(Method::OPTIONS);
        }

        self.attach(cfg, name.clone(), move |uri, handler| {
            RouteEntry::exact(uri, methods, handler, name)
        });
    }

    /// Bridge every method and sub-path under `cfg.uri` to `cfg.service_channel`.
    pub(crate) fn attach_prefix_bridge(&self, cfg: BridgeConfig) {
        let name = prefix_route_name(&cfg.uri);
        self.attach(cfg, name, |uri, handler| RouteEntry::prefix(uri, handler));
    }

    fn attach(
        &self,
        cfg: BridgeConfig,
        name: String,
        make_entry: impl FnOnce(String, Arc<dyn RouteHandler>) -> RouteEntry,
    ) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());

        if inner.endpoint_handlers.contains_key(&name) {
            warn!(
                uri = %cfg.uri,
                method = %cfg.method,
                "endpoint is already associated with a handler; clear the channel's bridges before re-binding"
            );
            return;
        }

        let bridge = match inner.message_bridges.get(&cfg.service_channel) {
            Some(bridge) => Arc::clone(bridge),
            None => {
                let bridge = MessageBridge::open(&self.bus, &cfg.service_channel);
                inner
                    .message_bridges
                    .insert(cfg.service_channel.clone(), Arc::clone(&bridge));
                bridge
            }
        };

        let handler: Arc<dyn RouteHandler> = Arc::new(RestBusHandler::new(
            cfg.service_channel.clone(),
            Arc::clone(&cfg.request_builder),
            self.bridge_timeout,
            bridge,
            Arc::clone(&self.bus),
        ));

        inner.endpoint_handlers.insert(name.clone(), Arc::clone(&handler));
        inner
            .channel_to_endpoints
            .entry(cfg.service_channel.clone())
            .or_default()
            .push(name.clone());

        let table = self
            .routes
            .snapshot()
            .with_entry(make_entry(cfg.uri.clone(), handler));
        self.routes.publish(table);

        info!(
            channel = %cfg.service_channel,
            url = %cfg.uri,
            endpoint = %name,
            "service channel is bridged to a REST endpoint"
        );
    }

    /// Remove every endpoint bridged to `channel` and republish the table.
    /// The channel's message bridge is retained for cheap re-attachment.
    pub(crate) fn clear_bridges_for_channel(&self, channel: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());

        let victims = match inner.channel_to_endpoints.get_mut(channel) {
            Some(endpoints) => std::mem::take(endpoints),
            None => return,
        };

        let victim_set: HashSet<String> = victims.iter().cloned().collect();
        let table = self.routes.snapshot().retain_except(&victim_set);
        self.routes.publish(table);

        for name in victims {
            inner.endpoint_handlers.remove(&name);
            info!(endpoint = %name, channel = %channel, "removed service - REST mapping");
        }
    }

    /// Install a non-bridge route (static files, SPA fallback) through the
    /// same writer lock and occupied-name check the bridges use.
    pub(crate) fn register_route(&self, entry: RouteEntry) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());

        let name = entry.name().to_string();
        if inner.endpoint_handlers.contains_key(&name) {
            warn!(
                endpoint = %name,
                "route name is already taken; remove the existing route before re-binding"
            );
            return;
        }

        inner.endpoint_handlers.insert(name, entry.handler());
        let table = self.routes.snapshot().with_entry(entry);
        self.routes.publish(table);
    }

    /// Tear down every message bridge. Called once, at server shutdown.
    pub(crate) fn shutdown(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        for bridge in inner.message_bridges.values() {
            bridge.shutdown();
        }
        inner.message_bridges.clear();
    }

    #[cfg(test)]
    fn has_endpoint(&self, name: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.endpoint_handlers.contains_key(name)
    }

    #[cfg(test)]
    fn endpoints_of(&self, channel: &str) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .channel_to_endpoints
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }

    #[cfg(test)]
    fn has_bridge(&self, channel: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.message_bridges.contains_key(channel)
    }

    #[cfg(test)]
    fn invariants_hold(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        // Every indexed endpoint has a handler, and a channel has a bridge
        // iff it has endpoints (bridges survive clears, so only the forward
        // direction is checked after the first attach).
        inner.channel_to_endpoints.values().flatten().all(|name| {
            inner.endpoint_handlers.contains_key(name)
        }) && inner
            .channel_to_endpoints
            .iter()
            .filter(|(_, endpoints)| !endpoints.is_empty())
            .all(|(channel, _)| inner.message_bridges.contains_key(channel))
    }
}
