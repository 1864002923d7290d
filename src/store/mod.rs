//! Channel endpoint storage.
//!
//! The pairing registry is backed by a store of `ChannelEndpoint` rows. The
//! trait is the seam to a persistent database; the in-memory implementation
//! is loaded from configuration at startup and enforces the same uniqueness
//! constraint a database schema would.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::common::error::StoreError;
use crate::common::{ChannelEndpoint, Platform};

/// Read access plus setup-time registration for channel endpoints.
///
/// (platform, channel_id) is globally unique; `insert_endpoint` rejects
/// duplicates rather than silently overwriting, since a channel belonging to
/// two bridges would duplicate delivery.
pub trait ChannelStore: Send + Sync {
    /// Register an endpoint. Fails on a (platform, channel_id) collision.
    fn insert_endpoint(&self, endpoint: ChannelEndpoint) -> Result<(), StoreError>;

    /// Look up the endpoint for a native channel, if registered.
    fn find_endpoint(&self, platform: Platform, channel_id: &str) -> Option<ChannelEndpoint>;

    /// All endpoints belonging to a bridge.
    fn endpoints_for_bridge(&self, bridge_id: &str) -> Vec<ChannelEndpoint>;

    /// Remove a whole bridge and its endpoints.
    fn remove_bridge(&self, bridge_id: &str);
}

/// In-memory channel store.
#[derive(Debug, Default)]
pub struct MemoryChannelStore {
    endpoints: RwLock<HashMap<(Platform, String), ChannelEndpoint>>,
}

impl MemoryChannelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChannelStore for MemoryChannelStore {
    fn insert_endpoint(&self, endpoint: ChannelEndpoint) -> Result<(), StoreError> {
        let key = (endpoint.platform, endpoint.channel_id.clone());
        let mut endpoints = self.endpoints.write().expect("endpoint lock poisoned");
        if endpoints.contains_key(&key) {
            return Err(StoreError::DuplicateEndpoint {
                platform: endpoint.platform,
                channel_id: endpoint.channel_id,
            });
        }
        endpoints.insert(key, endpoint);
        Ok(())
    }

    fn find_endpoint(&self, platform: Platform, channel_id: &str) -> Option<ChannelEndpoint> {
        self.endpoints
            .read()
            .expect("endpoint lock poisoned")
            .get(&(platform, channel_id.to_string()))
            .cloned()
    }

    fn endpoints_for_bridge(&self, bridge_id: &str) -> Vec<ChannelEndpoint> {
        self.endpoints
            .read()
            .expect("endpoint lock poisoned")
            .values()
            .filter(|e| e.bridge_id == bridge_id)
            .cloned()
            .collect()
    }

    fn remove_bridge(&self, bridge_id: &str) {
        self.endpoints
            .write()
            .expect("endpoint lock poisoned")
            .retain(|_, e| e.bridge_id != bridge_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(platform: Platform, channel_id: &str, bridge_id: &str) -> ChannelEndpoint {
        ChannelEndpoint {
            platform,
            channel_id: channel_id.to_string(),
            bridge_id: bridge_id.to_string(),
            name: format!("{}-{}", platform, channel_id),
        }
    }

    #[test]
    fn test_insert_and_find() {
        let store = MemoryChannelStore::new();
        store
            .insert_endpoint(endpoint(Platform::Discord, "c1", "b1"))
            .unwrap();

        let found = store.find_endpoint(Platform::Discord, "c1").unwrap();
        assert_eq!(found.bridge_id, "b1");

        assert!(store.find_endpoint(Platform::Telegram, "c1").is_none());
        assert!(store.find_endpoint(Platform::Discord, "c2").is_none());
    }

    #[test]
    fn test_duplicate_endpoint_rejected() {
        let store = MemoryChannelStore::new();
        store
            .insert_endpoint(endpoint(Platform::Discord, "c1", "b1"))
            .unwrap();

        let err = store
            .insert_endpoint(endpoint(Platform::Discord, "c1", "b2"))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEndpoint { .. }));

        // Original row is untouched
        let found = store.find_endpoint(Platform::Discord, "c1").unwrap();
        assert_eq!(found.bridge_id, "b1");
    }

    #[test]
    fn test_endpoints_for_bridge() {
        let store = MemoryChannelStore::new();
        store
            .insert_endpoint(endpoint(Platform::Discord, "c1", "b1"))
            .unwrap();
        store
            .insert_endpoint(endpoint(Platform::Telegram, "t1", "b1"))
            .unwrap();
        store
            .insert_endpoint(endpoint(Platform::Discord, "c2", "b2"))
            .unwrap();

        let members = store.endpoints_for_bridge("b1");
        assert_eq!(members.len(), 2);
    }

    #[test]
    fn test_remove_bridge() {
        let store = MemoryChannelStore::new();
        store
            .insert_endpoint(endpoint(Platform::Discord, "c1", "b1"))
            .unwrap();
        store
            .insert_endpoint(endpoint(Platform::Telegram, "t1", "b1"))
            .unwrap();

        store.remove_bridge("b1");
        assert!(store.find_endpoint(Platform::Discord, "c1").is_none());
        assert!(store.endpoints_for_bridge("b1").is_empty());
    }
}
