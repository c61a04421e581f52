//! Shared named stores.
//!
//! A store is a flat key → JSON value map shared across the process. The
//! platform uses one well-known store ([`SERVICE_READY_STORE`]) to record
//! which service channels have finished initializing; embedders may create
//! as many others as they like.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

/// Name of the store that tracks per-channel service readiness. A `true`
/// value under a channel key means the service on that channel is ready.
pub const SERVICE_READY_STORE: &str = "service-ready-notification";

/// A single named key/value store.
pub struct Store {
    entries: RwLock<HashMap<String, Value>>,
}

impl Store {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace the value under `key`.
    pub fn put(&self, key: impl Into<String>, value: Value) {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.insert(key.into(), value);
    }

    /// Fetch the value under `key`, if any.
    pub fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        entries.get(key).cloned()
    }
}

/// Registry of named stores, created on first access.
pub struct StoreManager {
    stores: RwLock<HashMap<String, Arc<Store>>>,
}

impl StoreManager {
    pub fn new() -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the store named `name`, creating it if it does not exist yet.
    pub fn store(&self, name: &str) -> Arc<Store> {
        {
            let stores = self.stores.read().unwrap_or_else(|p| p.into_inner());
            if let Some(store) = stores.get(name) {
                return Arc::clone(store);
            }
        }
        let mut stores = self.stores.write().unwrap_or_else(|p| p.into_inner());
        Arc::clone(stores.entry(name.to_string()).or_insert_with(|| Arc::new(Store::new())))
    }
}

impl Default for StoreManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_then_get_round_trips() {
        let manager = StoreManager::new();
        let store = manager.store("test");
        store.put("key", json!(42));
        assert_eq!(store.get("key"), Some(json!(42)));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn same_name_yields_the_same_store() {
        let manager = StoreManager::new();
        manager.store(SERVICE_READY_STORE).put("chan", json!(true));
        assert_eq!(
            manager.store(SERVICE_READY_STORE).get("chan"),
            Some(json!(true))
        );
    }

    #[test]
    fn stores_are_isolated_by_name() {
        let manager = StoreManager::new();
        manager.store("a").put("key", json!(1));
        assert_eq!(manager.store("b").get("key"), None);
    }
}
