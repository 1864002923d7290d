//! Outbound delivery: the consume half of a platform adapter.
//!
//! Drains a broker subscription, resolves the destination channel for each
//! canonical message, renders it into platform ops, and executes them against
//! the native client. Sends are serialized per destination channel (one
//! worker task per channel) so a bursty source is never visibly reordered,
//! while distinct channels proceed concurrently.
//!
//! All failures are contained per message: a failed delivery is logged and
//! the message dropped, never requeued, and never allowed to stall the
//! subscription.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::bridge::translator::degrade_media;
use crate::bridge::{
    DeliveryRecord, DeliveryTranslator, IdentityMapper, MappingKey, PairingRegistry, PlatformOp,
    Subscription,
};
use crate::common::{CanonicalMessage, ChannelEndpoint, MessageAction};
use crate::platform::NativeClient;

struct DeliveryJob {
    msg: CanonicalMessage,
    dest: ChannelEndpoint,
}

/// The outbound consume loop for one platform adapter.
pub struct OutboundDelivery<C> {
    client: Arc<C>,
    registry: Arc<PairingRegistry>,
    mapper: Arc<IdentityMapper>,
    translator: Arc<DeliveryTranslator>,
}

impl<C: NativeClient> OutboundDelivery<C> {
    pub fn new(
        client: Arc<C>,
        registry: Arc<PairingRegistry>,
        mapper: Arc<IdentityMapper>,
        translator: Arc<DeliveryTranslator>,
    ) -> Self {
        Self {
            client,
            registry,
            mapper,
            translator,
        }
    }

    /// Drain the subscription until shutdown or broker close.
    ///
    /// In-flight worker sends are allowed to finish; the workers exit when
    /// their queues drop.
    pub async fn run(
        self: Arc<Self>,
        mut subscription: Subscription,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let platform = self.client.platform();
        info!(%platform, "Outbound delivery loop started");

        // Single-flight queue per destination channel id.
        let mut workers: HashMap<String, mpsc::UnboundedSender<DeliveryJob>> = HashMap::new();

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!(%platform, "Outbound delivery loop shutting down");
                        break;
                    }
                }
                maybe = subscription.rx.recv() => {
                    match maybe {
                        Some(msg) => self.dispatch(&mut workers, msg),
                        None => {
                            warn!(%platform, "Broker subscription closed");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Resolve the destination and hand the message to its channel worker.
    fn dispatch(
        self: &Arc<Self>,
        workers: &mut HashMap<String, mpsc::UnboundedSender<DeliveryJob>>,
        msg: CanonicalMessage,
    ) {
        // The broker already filters same-platform messages; this guards
        // against a mis-registered subscription.
        if msg.source_platform == self.client.platform() {
            return;
        }

        let dest = match self
            .registry
            .resolve_pair(msg.source_platform, &msg.source_channel_id)
        {
            Ok(Some(dest)) => dest,
            Ok(None) => {
                debug!(
                    source_platform = %msg.source_platform,
                    source_channel_id = %msg.source_channel_id,
                    "No paired channel, dropping message"
                );
                return;
            }
            Err(e) => {
                error!("Pairing resolution failed: {}", e);
                return;
            }
        };
        if dest.platform != self.client.platform() {
            return;
        }

        let worker_tx = workers.entry(dest.channel_id.clone()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(Arc::clone(self).channel_worker(dest.channel_id.clone(), rx));
            tx
        });

        if worker_tx.send(DeliveryJob { msg, dest }).is_err() {
            error!("Delivery worker queue closed unexpectedly");
        }
    }

    /// Process jobs for one destination channel, strictly in order.
    async fn channel_worker(
        self: Arc<Self>,
        channel_id: String,
        mut rx: mpsc::UnboundedReceiver<DeliveryJob>,
    ) {
        debug!(channel_id, "Delivery worker started");
        while let Some(job) = rx.recv().await {
            self.deliver(job.msg, job.dest).await;
        }
        debug!(channel_id, "Delivery worker ended");
    }

    /// Render and execute one canonical message against the destination.
    async fn deliver(&self, msg: CanonicalMessage, dest: ChannelEndpoint) {
        let ops = self.translator.render(&msg, &dest);
        if ops.is_empty() {
            return;
        }

        let key = MappingKey::new(
            dest.bridge_id.clone(),
            msg.source_platform,
            msg.source_message_id.clone(),
        );

        // The first successful send becomes the reply-able counterpart id.
        let mut primary_id: Option<String> = None;

        for op in &ops {
            if let Some(native_id) = self.execute_op(op, &dest, &key).await {
                if primary_id.is_none() {
                    primary_id = Some(native_id);
                }
            }
        }

        if msg.action == MessageAction::Create {
            if let Some(dest_message_id) = primary_id {
                info!(
                    "{} -> {} [{}]: {}",
                    msg.source_platform, dest.platform, dest.name, msg.text_content
                );
                self.mapper.record(
                    key,
                    DeliveryRecord {
                        dest_platform: dest.platform,
                        dest_message_id,
                        dest_channel_id: dest.channel_id.clone(),
                    },
                );
            }
        }
    }

    /// Execute one op; returns the created native message id for sends.
    async fn execute_op(
        &self,
        op: &PlatformOp,
        dest: &ChannelEndpoint,
        key: &MappingKey,
    ) -> Option<String> {
        match op {
            PlatformOp::SendText { content, reply_to } => {
                match self
                    .client
                    .send_text(&dest.channel_id, content, reply_to.as_deref())
                    .await
                {
                    Ok(id) => Some(id),
                    Err(e) => {
                        error!("Text send failed: {}", e);
                        None
                    }
                }
            }
            PlatformOp::SendMedia {
                content,
                item,
                reply_to,
            } => {
                match self.client.fetch_bytes(&item.url).await {
                    Ok(data) => {
                        match self
                            .client
                            .send_media(&dest.channel_id, content, item, data, reply_to.as_deref())
                            .await
                        {
                            Ok(id) => Some(id),
                            Err(e) => {
                                error!("Media send failed: {}", e);
                                None
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Media fetch failed, degrading to text: {}", e);
                        self.execute_degraded(op, dest).await
                    }
                }
            }
            PlatformOp::SendSticker { item } => match self.client.fetch_bytes(&item.url).await {
                Ok(data) => match self.client.send_sticker(&dest.channel_id, item, data).await {
                    Ok(id) => Some(id),
                    Err(e) => {
                        error!("Sticker send failed: {}", e);
                        None
                    }
                },
                Err(e) => {
                    warn!("Sticker fetch failed, degrading to text: {}", e);
                    self.execute_degraded(op, dest).await
                }
            },
            PlatformOp::EditText {
                dest_message_id,
                content,
            } => {
                if let Err(e) = self
                    .client
                    .edit_message(&dest.channel_id, dest_message_id, content)
                    .await
                {
                    error!("Edit failed: {}", e);
                }
                None
            }
            PlatformOp::DeleteMessage { dest_message_id } => {
                match self
                    .client
                    .delete_message(&dest.channel_id, dest_message_id)
                    .await
                {
                    Ok(()) => {
                        self.mapper.remove(key);
                    }
                    Err(e) => error!("Delete failed: {}", e),
                }
                None
            }
        }
    }

    /// Fall back to the text notice for a media op whose fetch failed.
    async fn execute_degraded(&self, op: &PlatformOp, dest: &ChannelEndpoint) -> Option<String> {
        let degraded = degrade_media(op)?;
        if let PlatformOp::SendText { content, reply_to } = degraded {
            match self
                .client
                .send_text(&dest.channel_id, &content, reply_to.as_deref())
                .await
            {
                Ok(id) => return Some(id),
                Err(e) => error!("Fallback text send failed: {}", e),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;

    use crate::common::error::{DeliveryError, DeliveryResult};
    use crate::common::{MediaItem, Platform};
    use crate::store::{ChannelStore, MemoryChannelStore};

    /// Records native calls instead of performing them.
    struct MockClient {
        platform: Platform,
        calls: Mutex<Vec<String>>,
        fail_fetch: bool,
    }

    impl MockClient {
        fn new(platform: Platform) -> Self {
            Self {
                platform,
                calls: Mutex::new(Vec::new()),
                fail_fetch: false,
            }
        }

        fn failing_fetch(platform: Platform) -> Self {
            Self {
                fail_fetch: true,
                ..Self::new(platform)
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn push(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl NativeClient for MockClient {
        fn platform(&self) -> Platform {
            self.platform
        }

        async fn send_text(
            &self,
            channel_id: &str,
            content: &str,
            reply_to: Option<&str>,
        ) -> DeliveryResult<String> {
            self.push(format!(
                "text:{}:{}:{}",
                channel_id,
                content,
                reply_to.unwrap_or("-")
            ));
            Ok(format!("native-{}", self.calls.lock().unwrap().len()))
        }

        async fn send_media(
            &self,
            channel_id: &str,
            content: &str,
            item: &MediaItem,
            _data: Bytes,
            _reply_to: Option<&str>,
        ) -> DeliveryResult<String> {
            self.push(format!("media:{}:{}:{}", channel_id, content, item.url));
            Ok(format!("native-{}", self.calls.lock().unwrap().len()))
        }

        async fn send_sticker(
            &self,
            channel_id: &str,
            item: &MediaItem,
            _data: Bytes,
        ) -> DeliveryResult<String> {
            self.push(format!("sticker:{}:{}", channel_id, item.url));
            Ok(format!("native-{}", self.calls.lock().unwrap().len()))
        }

        async fn edit_message(
            &self,
            channel_id: &str,
            message_id: &str,
            content: &str,
        ) -> DeliveryResult<()> {
            self.push(format!("edit:{}:{}:{}", channel_id, message_id, content));
            Ok(())
        }

        async fn delete_message(&self, channel_id: &str, message_id: &str) -> DeliveryResult<()> {
            self.push(format!("delete:{}:{}", channel_id, message_id));
            Ok(())
        }

        async fn fetch_bytes(&self, url: &str) -> DeliveryResult<Bytes> {
            if self.fail_fetch {
                return Err(DeliveryError::FetchFailed {
                    url: url.to_string(),
                    message: "mock failure".to_string(),
                });
            }
            self.push(format!("fetch:{}", url));
            Ok(Bytes::from_static(b"bytes"))
        }
    }

    fn setup(client: MockClient) -> (Arc<OutboundDelivery<MockClient>>, Arc<MockClient>, Arc<IdentityMapper>) {
        let store = MemoryChannelStore::new();
        store
            .insert_endpoint(crate::common::ChannelEndpoint {
                platform: Platform::Discord,
                channel_id: "c1".to_string(),
                bridge_id: "b1".to_string(),
                name: "discord-c1".to_string(),
            })
            .unwrap();
        store
            .insert_endpoint(crate::common::ChannelEndpoint {
                platform: Platform::Telegram,
                channel_id: "t1".to_string(),
                bridge_id: "b1".to_string(),
                name: "telegram-t1".to_string(),
            })
            .unwrap();

        let registry = Arc::new(PairingRegistry::new(Arc::new(store)));
        let mapper = Arc::new(IdentityMapper::new());
        let translator = Arc::new(DeliveryTranslator::new(mapper.clone()));
        let client = Arc::new(client);
        let outbound = Arc::new(OutboundDelivery::new(
            client.clone(),
            registry,
            mapper.clone(),
            translator,
        ));
        (outbound, client, mapper)
    }

    fn telegram_dest() -> ChannelEndpoint {
        ChannelEndpoint {
            platform: Platform::Telegram,
            channel_id: "t1".to_string(),
            bridge_id: "b1".to_string(),
            name: "telegram-t1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_records_mapping_with_first_native_id() {
        let (outbound, client, mapper) = setup(MockClient::new(Platform::Telegram));
        let msg = CanonicalMessage::create(Platform::Discord, "c1", "m1", "alice", "hi");

        outbound.deliver(msg, telegram_dest()).await;

        assert_eq!(client.calls(), vec!["text:t1:alice: hi:-"]);
        let record = mapper
            .lookup(&MappingKey::new("b1", Platform::Discord, "m1"))
            .unwrap();
        assert_eq!(record.dest_message_id, "native-1");
        assert_eq!(record.dest_channel_id, "t1");
    }

    #[tokio::test]
    async fn test_delete_without_mapping_issues_no_native_calls() {
        let (outbound, client, _) = setup(MockClient::new(Platform::Telegram));
        let msg = CanonicalMessage::delete(Platform::Discord, "c1", "never-seen");

        outbound.deliver(msg, telegram_dest()).await;

        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_with_mapping_removes_record() {
        let (outbound, client, mapper) = setup(MockClient::new(Platform::Telegram));
        let key = MappingKey::new("b1", Platform::Discord, "m1");
        mapper.record(
            key.clone(),
            DeliveryRecord {
                dest_platform: Platform::Telegram,
                dest_message_id: "d1".to_string(),
                dest_channel_id: "t1".to_string(),
            },
        );

        let msg = CanonicalMessage::delete(Platform::Discord, "c1", "m1");
        outbound.deliver(msg, telegram_dest()).await;

        assert_eq!(client.calls(), vec!["delete:t1:d1"]);
        assert!(mapper.lookup(&key).is_none());
    }

    #[tokio::test]
    async fn test_edit_targets_recorded_counterpart() {
        let (outbound, client, mapper) = setup(MockClient::new(Platform::Telegram));
        mapper.record(
            MappingKey::new("b1", Platform::Discord, "m1"),
            DeliveryRecord {
                dest_platform: Platform::Telegram,
                dest_message_id: "d1".to_string(),
                dest_channel_id: "t1".to_string(),
            },
        );

        let msg = CanonicalMessage::edit(Platform::Discord, "c1", "m1", "alice", "updated");
        outbound.deliver(msg, telegram_dest()).await;

        assert_eq!(client.calls(), vec!["edit:t1:d1:alice: updated"]);
    }

    #[tokio::test]
    async fn test_media_fetch_failure_degrades_to_text_notice() {
        let (outbound, client, _) = setup(MockClient::failing_fetch(Platform::Telegram));
        let msg = CanonicalMessage::create(Platform::Discord, "c1", "m1", "alice", "look")
            .with_attachments(vec![MediaItem::attachment("https://x/p.png", "image/png")]);

        outbound.deliver(msg, telegram_dest()).await;

        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("text:t1:alice: look\n[media unavailable"));
    }

    #[tokio::test]
    async fn test_media_send_fetches_then_uploads() {
        let (outbound, client, _) = setup(MockClient::new(Platform::Telegram));
        let msg = CanonicalMessage::create(Platform::Discord, "c1", "m1", "alice", "look")
            .with_attachments(vec![MediaItem::attachment("https://x/p.png", "image/png")]);

        outbound.deliver(msg, telegram_dest()).await;

        assert_eq!(
            client.calls(),
            vec![
                "fetch:https://x/p.png",
                "media:t1:alice: look:https://x/p.png"
            ]
        );
    }

    #[tokio::test]
    async fn test_run_dispatches_via_registry() {
        let (outbound, client, _) = setup(MockClient::new(Platform::Telegram));
        let broker = crate::bridge::MessageBroker::new();
        let subscription = broker.subscribe(Platform::Telegram);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(Arc::clone(&outbound).run(subscription, shutdown_rx));

        broker.publish(&CanonicalMessage::create(
            Platform::Discord,
            "c1",
            "m1",
            "alice",
            "hi",
        ));
        // Unregistered channel: resolved to nothing, silently dropped.
        broker.publish(&CanonicalMessage::create(
            Platform::Discord,
            "unknown",
            "m2",
            "alice",
            "lost",
        ));

        // Give the worker a chance to drain.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(client.calls(), vec!["text:t1:alice: hi:-"]);
    }
}
