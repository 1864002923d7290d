//! In-process message broker.
//!
//! A single publish/subscribe hub decouples the platform adapters from each
//! other. Each subscriber gets its own FIFO channel, so a slow or failing
//! consumer never blocks publication or delivery to the other platform.
//! The broker does not retry and does not persist.

use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::common::{CanonicalMessage, Platform};

/// Opaque handle identifying a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// A live subscription: drain `rx` to observe published messages in publish
/// order. Dropping the receiver ends delivery; the dead entry is pruned on
/// the next publish.
pub struct Subscription {
    pub id: SubscriptionId,
    pub platform: Platform,
    pub rx: mpsc::UnboundedReceiver<CanonicalMessage>,
}

struct Subscriber {
    id: SubscriptionId,
    platform: Platform,
    tx: mpsc::UnboundedSender<CanonicalMessage>,
}

/// Publish/subscribe hub for canonical messages.
///
/// Constructed once at startup and passed by `Arc` to each adapter; there is
/// no ambient global instance.
#[derive(Default)]
pub struct MessageBroker {
    inner: Mutex<BrokerInner>,
}

#[derive(Default)]
struct BrokerInner {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

impl MessageBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for the given platform.
    ///
    /// By convention `publish` skips subscribers whose platform equals the
    /// message's source platform, so an adapter never re-delivers its own
    /// events back to its own platform.
    pub fn subscribe(&self, platform: Platform) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().expect("broker lock poisoned");
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.subscribers.push(Subscriber { id, platform, tx });
        debug!(%platform, ?id, "Broker subscription registered");
        Subscription { id, platform, rx }
    }

    /// Stop delivery to a subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut inner = self.inner.lock().expect("broker lock poisoned");
        inner.subscribers.retain(|s| s.id != id);
    }

    /// Fire-and-forget delivery to every subscriber on the other platform.
    ///
    /// Messages arrive at each subscriber in publish order. Subscribers whose
    /// receiver has been dropped are pruned here.
    pub fn publish(&self, msg: &CanonicalMessage) {
        let mut inner = self.inner.lock().expect("broker lock poisoned");
        inner.subscribers.retain(|sub| {
            if sub.platform == msg.source_platform {
                return true;
            }
            match sub.tx.send(msg.clone()) {
                Ok(()) => true,
                Err(_) => {
                    warn!(
                        platform = %sub.platform,
                        "Dropping dead broker subscription"
                    );
                    false
                }
            }
        });
    }

    /// Number of live subscriptions (for startup logging).
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().expect("broker lock poisoned").subscribers.len()
    }
}
