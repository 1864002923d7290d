//! Platform adapters.
//!
//! Each adapter has an inbound half (native events normalized into canonical
//! messages and published to the broker) and an outbound half (canonical
//! messages from the other platform executed against the native API). The
//! outbound half is generic over [`NativeClient`]; the per-platform modules
//! provide the client implementations and the inbound event wiring.

pub mod discord;
pub mod outbound;
pub mod telegram;

use async_trait::async_trait;
use bytes::Bytes;

use crate::common::error::DeliveryResult;
use crate::common::{MediaItem, Platform};

pub use outbound::OutboundDelivery;

/// The native send surface of one platform.
///
/// All ids are platform-native message ids as strings. Send operations return
/// the id of the created message so the identity mapper can correlate later
/// edits and deletes.
#[async_trait]
pub trait NativeClient: Send + Sync + 'static {
    fn platform(&self) -> Platform;

    async fn send_text(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> DeliveryResult<String>;

    /// Re-upload fetched media bytes with a caption.
    async fn send_media(
        &self,
        channel_id: &str,
        content: &str,
        item: &MediaItem,
        data: Bytes,
        reply_to: Option<&str>,
    ) -> DeliveryResult<String>;

    /// Send a sticker natively. Only called for platforms with native
    /// sticker support; others receive stickers as ordinary media.
    async fn send_sticker(
        &self,
        channel_id: &str,
        item: &MediaItem,
        data: Bytes,
    ) -> DeliveryResult<String>;

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> DeliveryResult<()>;

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> DeliveryResult<()>;

    /// Fetch media bytes for the re-publish round trip.
    async fn fetch_bytes(&self, url: &str) -> DeliveryResult<Bytes>;
}
