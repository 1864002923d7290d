//! Channel pairing registry.
//!
//! Resolves which destination channel a canonical message should be delivered
//! to: given a (platform, channel_id), find the counterpart endpoint on the
//! other platform within the same bridge.

use std::sync::Arc;

use tracing::debug;

use crate::common::error::ConfigError;
use crate::common::{ChannelEndpoint, Platform};
use crate::store::ChannelStore;

/// Pure lookup over the channel store; no side effects.
pub struct PairingRegistry {
    store: Arc<dyn ChannelStore>,
}

impl PairingRegistry {
    pub fn new(store: Arc<dyn ChannelStore>) -> Self {
        Self { store }
    }

    /// Resolve the counterpart endpoint for a native channel.
    ///
    /// Returns `Ok(None)` when the channel is unregistered or its bridge has
    /// no endpoint on the other platform. Fails with `AmbiguousPairing` if
    /// more than one counterpart exists; picking one arbitrarily would
    /// duplicate message delivery.
    pub fn resolve_pair(
        &self,
        platform: Platform,
        channel_id: &str,
    ) -> Result<Option<ChannelEndpoint>, ConfigError> {
        let local = match self.store.find_endpoint(platform, channel_id) {
            Some(endpoint) => endpoint,
            None => {
                debug!(%platform, channel_id, "Channel not registered in any bridge");
                return Ok(None);
            }
        };

        let mut counterparts: Vec<ChannelEndpoint> = self
            .store
            .endpoints_for_bridge(&local.bridge_id)
            .into_iter()
            .filter(|e| e.platform != platform)
            .collect();

        match counterparts.len() {
            0 => Ok(None),
            1 => Ok(Some(counterparts.remove(0))),
            count => Err(ConfigError::AmbiguousPairing {
                platform,
                channel_id: channel_id.to_string(),
                count,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryChannelStore;

    fn endpoint(platform: Platform, channel_id: &str, bridge_id: &str) -> ChannelEndpoint {
        ChannelEndpoint {
            platform,
            channel_id: channel_id.to_string(),
            bridge_id: bridge_id.to_string(),
            name: format!("{}-{}", platform, channel_id),
        }
    }

    fn registry_with(endpoints: Vec<ChannelEndpoint>) -> PairingRegistry {
        let store = MemoryChannelStore::new();
        for e in endpoints {
            store.insert_endpoint(e).unwrap();
        }
        PairingRegistry::new(Arc::new(store))
    }

    #[test]
    fn test_resolve_pair_counterpart() {
        let registry = registry_with(vec![
            endpoint(Platform::Discord, "c1", "b1"),
            endpoint(Platform::Telegram, "t1", "b1"),
        ]);

        let dest = registry
            .resolve_pair(Platform::Discord, "c1")
            .unwrap()
            .unwrap();
        assert_eq!(dest.platform, Platform::Telegram);
        assert_eq!(dest.channel_id, "t1");
    }

    #[test]
    fn test_resolve_pair_is_its_own_inverse() {
        let registry = registry_with(vec![
            endpoint(Platform::Discord, "c1", "b1"),
            endpoint(Platform::Telegram, "t1", "b1"),
        ]);

        let dest = registry
            .resolve_pair(Platform::Discord, "c1")
            .unwrap()
            .unwrap();
        let back = registry
            .resolve_pair(dest.platform, &dest.channel_id)
            .unwrap()
            .unwrap();
        assert_eq!(back.platform, Platform::Discord);
        assert_eq!(back.channel_id, "c1");
    }

    #[test]
    fn test_unregistered_channel_resolves_none() {
        let registry = registry_with(vec![
            endpoint(Platform::Discord, "c1", "b1"),
            endpoint(Platform::Telegram, "t1", "b1"),
        ]);

        assert!(registry
            .resolve_pair(Platform::Discord, "unknown")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_unpaired_channel_resolves_none() {
        let registry = registry_with(vec![endpoint(Platform::Discord, "c1", "b1")]);

        assert!(registry
            .resolve_pair(Platform::Discord, "c1")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_ambiguous_pairing_fails_fast() {
        // Two Telegram endpoints in the same bridge is a data-integrity
        // violation; the registry must not pick one arbitrarily.
        let registry = registry_with(vec![
            endpoint(Platform::Discord, "c1", "b1"),
            endpoint(Platform::Telegram, "t1", "b1"),
            endpoint(Platform::Telegram, "t2", "b1"),
        ]);

        let err = registry.resolve_pair(Platform::Discord, "c1").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::AmbiguousPairing { count: 2, .. }
        ));
    }
}
