//! Discord adapter.
//!
//! Inbound: serenity gateway events are normalized into canonical messages
//! and published to the broker. Outbound: [`DiscordClient`] implements the
//! native send surface over serenity's HTTP client. On Discord, media and
//! stickers from the other platform are re-uploaded as file attachments with
//! the caption as message content.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serenity::all::{CreateAttachment, CreateMessage, EditMessage, MessageReference};
use serenity::model::channel::Message;
use serenity::model::event::MessageUpdateEvent;
use serenity::model::gateway::Ready;
use serenity::model::id::{ChannelId, GuildId, MessageId};
use serenity::model::sticker::StickerFormatType;
use serenity::prelude::*;
use tracing::{debug, error, info};

use crate::common::error::{DeliveryError, DeliveryResult};
use crate::common::{CanonicalMessage, MediaItem, Platform, ReplySnapshot};
use crate::bridge::MessageBroker;
use crate::platform::NativeClient;
use crate::store::ChannelStore;

/// Native send operations against the Discord HTTP API.
pub struct DiscordClient {
    http: Arc<serenity::http::Http>,
    fetcher: reqwest::Client,
}

impl DiscordClient {
    pub fn new(http: Arc<serenity::http::Http>) -> Self {
        Self {
            http,
            fetcher: reqwest::Client::new(),
        }
    }

    fn parse_channel(&self, channel_id: &str) -> DeliveryResult<ChannelId> {
        channel_id
            .parse::<u64>()
            .map(ChannelId::new)
            .map_err(|_| DeliveryError::InvalidChannelId {
                platform: Platform::Discord,
                channel_id: channel_id.to_string(),
            })
    }

    fn parse_message(&self, message_id: &str) -> DeliveryResult<MessageId> {
        message_id
            .parse::<u64>()
            .map(MessageId::new)
            .map_err(|_| DeliveryError::EditFailed {
                message_id: message_id.to_string(),
                message: "not a valid Discord message id".to_string(),
            })
    }
}

#[async_trait]
impl NativeClient for DiscordClient {
    fn platform(&self) -> Platform {
        Platform::Discord
    }

    async fn send_text(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> DeliveryResult<String> {
        let channel = self.parse_channel(channel_id)?;
        let mut builder = CreateMessage::new().content(content);
        if let Some(reply_id) = reply_to {
            if let Ok(message_id) = reply_id.parse::<u64>() {
                builder = builder
                    .reference_message(MessageReference::from((channel, MessageId::new(message_id))));
            }
        }

        let sent = channel
            .send_message(&self.http, builder)
            .await
            .map_err(|e| DeliveryError::SendFailed {
                platform: Platform::Discord,
                channel_id: channel_id.to_string(),
                message: e.to_string(),
            })?;
        Ok(sent.id.to_string())
    }

    async fn send_media(
        &self,
        channel_id: &str,
        content: &str,
        item: &MediaItem,
        data: Bytes,
        reply_to: Option<&str>,
    ) -> DeliveryResult<String> {
        let channel = self.parse_channel(channel_id)?;
        let attachment = CreateAttachment::bytes(data.to_vec(), item.upload_name());
        let mut builder = CreateMessage::new().add_file(attachment);
        if !content.is_empty() {
            builder = builder.content(content);
        }
        if let Some(reply_id) = reply_to {
            if let Ok(message_id) = reply_id.parse::<u64>() {
                builder = builder
                    .reference_message(MessageReference::from((channel, MessageId::new(message_id))));
            }
        }

        let sent = channel
            .send_message(&self.http, builder)
            .await
            .map_err(|e| DeliveryError::SendFailed {
                platform: Platform::Discord,
                channel_id: channel_id.to_string(),
                message: e.to_string(),
            })?;
        Ok(sent.id.to_string())
    }

    async fn send_sticker(
        &self,
        channel_id: &str,
        item: &MediaItem,
        data: Bytes,
    ) -> DeliveryResult<String> {
        // Discord has no API for sending third-party stickers; they arrive
        // as ordinary image uploads.
        self.send_media(channel_id, "", item, data, None).await
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> DeliveryResult<()> {
        let channel = self.parse_channel(channel_id)?;
        let message = self.parse_message(message_id)?;
        channel
            .edit_message(&self.http, message, EditMessage::new().content(content))
            .await
            .map_err(|e| DeliveryError::EditFailed {
                message_id: message_id.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> DeliveryResult<()> {
        let channel = self.parse_channel(channel_id)?;
        let message = self.parse_message(message_id)?;
        channel
            .delete_message(&self.http, message)
            .await
            .map_err(|e| DeliveryError::DeleteFailed {
                message_id: message_id.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn fetch_bytes(&self, url: &str) -> DeliveryResult<Bytes> {
        let response = self
            .fetcher
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DeliveryError::FetchFailed {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        response.bytes().await.map_err(|e| DeliveryError::FetchFailed {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

/// Gateway event handler normalizing Discord events into canonical messages.
pub struct DiscordEventHandler {
    broker: Arc<MessageBroker>,
    store: Arc<dyn ChannelStore>,
}

impl DiscordEventHandler {
    pub fn new(broker: Arc<MessageBroker>, store: Arc<dyn ChannelStore>) -> Self {
        Self { broker, store }
    }

    fn is_bridged(&self, channel_id: ChannelId) -> bool {
        self.store
            .find_endpoint(Platform::Discord, &channel_id.to_string())
            .is_some()
    }
}

#[serenity::async_trait]
impl EventHandler for DiscordEventHandler {
    async fn message(&self, ctx: Context, msg: Message) {
        // Never relay our own or other bots' messages back into the bridge.
        if msg.author.bot || msg.author.id == ctx.cache.current_user().id {
            return;
        }
        if !self.is_bridged(msg.channel_id) {
            return;
        }

        let author_name = msg
            .member
            .as_ref()
            .and_then(|m| m.nick.clone())
            .unwrap_or_else(|| msg.author.name.clone());

        let mut attachments: Vec<MediaItem> = msg
            .attachments
            .iter()
            .map(|a| MediaItem {
                url: a.url.clone(),
                content_type: a
                    .content_type
                    .clone()
                    .unwrap_or_else(|| content_type_for_name(&a.filename)),
                name: Some(a.filename.clone()),
                is_sticker: false,
                is_animated: false,
                width: a.width,
                height: a.height,
            })
            .collect();

        for sticker in &msg.sticker_items {
            let Some(url) = sticker.image_url() else {
                debug!(sticker = %sticker.name, "Sticker has no image URL, skipping");
                continue;
            };
            let animated = matches!(
                sticker.format_type,
                StickerFormatType::Apng | StickerFormatType::Gif
            );
            let mut item = MediaItem::sticker(
                url,
                if animated { "image/gif" } else { "image/png" },
                animated,
            );
            item.name = Some(sticker.name.clone());
            attachments.push(item);
        }

        let reply_to = msg.referenced_message.as_ref().map(|replied| ReplySnapshot {
            source_message_id: replied.id.to_string(),
            author_name: replied.author.name.clone(),
            content: replied.content.clone(),
        });

        let mut canonical = CanonicalMessage::create(
            Platform::Discord,
            msg.channel_id.to_string(),
            msg.id.to_string(),
            author_name,
            msg.content.clone(),
        )
        .with_attachments(attachments)
        .with_avatar(msg.author.face());
        if let Some(reply) = reply_to {
            canonical = canonical.with_reply(reply);
        }

        self.broker.publish(&canonical);
    }

    async fn message_update(
        &self,
        _ctx: Context,
        _old_if_available: Option<Message>,
        _new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        if !self.is_bridged(event.channel_id) {
            return;
        }
        // Non-text updates (embed unfurls, pin changes) carry no content.
        let Some(content) = event.content else {
            return;
        };
        if event.author.as_ref().is_some_and(|a| a.bot) {
            return;
        }
        let author_name = event
            .author
            .as_ref()
            .map(|a| a.name.clone())
            .unwrap_or_default();

        self.broker.publish(&CanonicalMessage::edit(
            Platform::Discord,
            event.channel_id.to_string(),
            event.id.to_string(),
            author_name,
            content,
        ));
    }

    async fn message_delete(
        &self,
        _ctx: Context,
        channel_id: ChannelId,
        deleted_message_id: MessageId,
        _guild_id: Option<GuildId>,
    ) {
        if !self.is_bridged(channel_id) {
            return;
        }

        self.broker.publish(&CanonicalMessage::delete(
            Platform::Discord,
            channel_id.to_string(),
            deleted_message_id.to_string(),
        ));
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("Discord bot connected as {}", ready.user.name);
    }
}

/// Build the serenity client with the intents the bridge needs.
pub async fn build_discord_client(
    token: &str,
    broker: Arc<MessageBroker>,
    store: Arc<dyn ChannelStore>,
) -> Result<Client, serenity::Error> {
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    Client::builder(token, intents)
        .event_handler(DiscordEventHandler::new(broker, store))
        .await
}

/// Run the gateway connection until it exits.
pub async fn run_discord_bot(mut client: Client) {
    if let Err(e) = client.start().await {
        error!("Discord client error: {}", e);
    }
}

/// Guess a MIME type from a file name, for attachments Discord reports
/// without one.
fn content_type_for_name(name: &str) -> String {
    let ext = name.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for_name() {
        assert_eq!(content_type_for_name("photo.PNG"), "image/png");
        assert_eq!(content_type_for_name("clip.mp4"), "video/mp4");
        assert_eq!(content_type_for_name("archive.zip"), "application/octet-stream");
        assert_eq!(content_type_for_name("noextension"), "application/octet-stream");
    }
}
