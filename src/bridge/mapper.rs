//! Identity mapping between source and destination message ids.
//!
//! After a `Create` is delivered, the adapter records which native message it
//! produced on the destination platform. Later `Edit`/`Delete` events for the
//! same source message use the mapping to target the correct counterpart, and
//! replies use it to attach a native reply reference.
//!
//! The mapper exclusively owns this state; adapters never mutate it directly.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;

use tracing::debug;

use crate::common::Platform;

/// Mapping key: one source message within one bridge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MappingKey {
    pub bridge_id: String,
    pub source_platform: Platform,
    pub source_message_id: String,
}

impl MappingKey {
    pub fn new(
        bridge_id: impl Into<String>,
        source_platform: Platform,
        source_message_id: impl Into<String>,
    ) -> Self {
        Self {
            bridge_id: bridge_id.into(),
            source_platform,
            source_message_id: source_message_id.into(),
        }
    }
}

/// The stored counterpart of a delivered source message.
///
/// Even when delivery fanned out over several physical sends (media plus
/// caption), only the primary reply-able message id is recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRecord {
    pub dest_platform: Platform,
    pub dest_message_id: String,
    pub dest_channel_id: String,
}

/// How many removed keys are remembered to fence out late re-records.
const TOMBSTONE_CAPACITY: usize = 4096;

/// In-memory identity mapper.
///
/// `record` is idempotent for the same key (a retried delivery overwrites).
/// A `remove` fences the key: a late-arriving `record` for a key that was
/// already removed is discarded, so a propagated delete is never silently
/// undone. The tombstone set is bounded; oldest entries are evicted first.
#[derive(Default)]
pub struct IdentityMapper {
    inner: RwLock<MapperInner>,
}

#[derive(Default)]
struct MapperInner {
    records: HashMap<MappingKey, DeliveryRecord>,
    tombstones: HashSet<MappingKey>,
    tombstone_order: VecDeque<MappingKey>,
}

impl IdentityMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or overwrite) the destination counterpart for a source message.
    ///
    /// Returns `false` when the key is fenced by an earlier `remove`.
    pub fn record(&self, key: MappingKey, record: DeliveryRecord) -> bool {
        let mut inner = self.inner.write().expect("mapper lock poisoned");
        if inner.tombstones.contains(&key) {
            debug!(?key, "Ignoring record for removed mapping");
            return false;
        }
        inner.records.insert(key, record);
        true
    }

    /// Look up the destination counterpart of a source message.
    pub fn lookup(&self, key: &MappingKey) -> Option<DeliveryRecord> {
        self.inner
            .read()
            .expect("mapper lock poisoned")
            .records
            .get(key)
            .cloned()
    }

    /// Remove a mapping after a successful delete propagation.
    ///
    /// The key is tombstoned so a racing `record` cannot resurrect it.
    pub fn remove(&self, key: &MappingKey) -> Option<DeliveryRecord> {
        let mut inner = self.inner.write().expect("mapper lock poisoned");
        let removed = inner.records.remove(key);

        if inner.tombstones.insert(key.clone()) {
            inner.tombstone_order.push_back(key.clone());
            while inner.tombstone_order.len() > TOMBSTONE_CAPACITY {
                if let Some(old) = inner.tombstone_order.pop_front() {
                    inner.tombstones.remove(&old);
                }
            }
        }

        removed
    }

    /// Number of live mappings (for tests and diagnostics).
    pub fn len(&self) -> usize {
        self.inner.read().expect("mapper lock poisoned").records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
