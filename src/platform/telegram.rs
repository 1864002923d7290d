//! Telegram adapter.
//!
//! Inbound: a teloxide dispatcher normalizes new and edited messages into
//! canonical messages and publishes them to the broker. Outbound:
//! [`TelegramClient`] implements the native send surface, dispatching media
//! by content type (animation, video, photo, document) and sending stickers
//! natively. The Bot API delivers no deletion events, so deletes only flow
//! out of this adapter, never in.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use teloxide::payloads::{
    SendAnimationSetters, SendDocumentSetters, SendMessageSetters, SendPhotoSetters,
    SendVideoSetters,
};
use teloxide::prelude::*;
use teloxide::types::{InputFile, ReplyParameters, StickerFormat, MessageId as TgMessageId};
use tracing::{info, warn};

use crate::common::error::{DeliveryError, DeliveryResult};
use crate::common::{CanonicalMessage, MediaItem, Platform, ReplySnapshot};
use crate::bridge::MessageBroker;
use crate::platform::NativeClient;
use crate::store::ChannelStore;

/// Telegram message length limit, with headroom for the author prefix.
const MAX_MESSAGE_LEN: usize = 4000;

/// Native send operations against the Telegram Bot API.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn parse_chat(&self, channel_id: &str) -> DeliveryResult<ChatId> {
        channel_id
            .trim()
            .parse::<i64>()
            .map(ChatId)
            .map_err(|_| DeliveryError::InvalidChannelId {
                platform: Platform::Telegram,
                channel_id: channel_id.to_string(),
            })
    }
}

#[async_trait]
impl NativeClient for TelegramClient {
    fn platform(&self) -> Platform {
        Platform::Telegram
    }

    async fn send_text(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> DeliveryResult<String> {
        let chat = self.parse_chat(channel_id)?;
        let reply = reply_to.and_then(|id| id.parse::<i32>().ok());

        let mut first_id = None;
        for chunk in split_message(content, MAX_MESSAGE_LEN) {
            let mut request = self.bot.send_message(chat, chunk);
            if first_id.is_none() {
                if let Some(reply_id) = reply {
                    request = request.reply_parameters(ReplyParameters::new(TgMessageId(reply_id)));
                }
            }
            let sent = request.await.map_err(|e| DeliveryError::SendFailed {
                platform: Platform::Telegram,
                channel_id: channel_id.to_string(),
                message: e.to_string(),
            })?;
            first_id.get_or_insert(sent.id.0.to_string());
        }

        // split_message never returns an empty list for the content the
        // translator emits, but don't panic if it ever does.
        first_id.ok_or_else(|| DeliveryError::SendFailed {
            platform: Platform::Telegram,
            channel_id: channel_id.to_string(),
            message: "empty message".to_string(),
        })
    }

    async fn send_media(
        &self,
        channel_id: &str,
        content: &str,
        item: &MediaItem,
        data: Bytes,
        reply_to: Option<&str>,
    ) -> DeliveryResult<String> {
        let chat = self.parse_chat(channel_id)?;
        let file = InputFile::memory(data).file_name(item.upload_name());
        let reply = reply_to
            .and_then(|id| id.parse::<i32>().ok())
            .map(|id| ReplyParameters::new(TgMessageId(id)));
        let caption = (!content.is_empty()).then(|| content.to_string());

        let send_failed = |e: teloxide::RequestError| DeliveryError::SendFailed {
            platform: Platform::Telegram,
            channel_id: channel_id.to_string(),
            message: e.to_string(),
        };

        // Content-type dispatch mirrors how each kind renders best in a chat:
        // gifs as animations, videos inline, images as photos, the rest as
        // plain documents.
        let sent = if item.content_type == "image/gif" {
            let mut request = self.bot.send_animation(chat, file);
            if let Some(c) = caption {
                request = request.caption(c);
            }
            if let Some(r) = reply {
                request = request.reply_parameters(r);
            }
            request.await.map_err(send_failed)?
        } else if item.content_type.starts_with("video/") {
            let mut request = self.bot.send_video(chat, file);
            if let Some(c) = caption {
                request = request.caption(c);
            }
            if let Some(r) = reply {
                request = request.reply_parameters(r);
            }
            request.await.map_err(send_failed)?
        } else if item.content_type.starts_with("image/") {
            let mut request = self.bot.send_photo(chat, file);
            if let Some(c) = caption {
                request = request.caption(c);
            }
            if let Some(r) = reply {
                request = request.reply_parameters(r);
            }
            request.await.map_err(send_failed)?
        } else {
            let mut request = self.bot.send_document(chat, file);
            if let Some(c) = caption {
                request = request.caption(c);
            }
            if let Some(r) = reply {
                request = request.reply_parameters(r);
            }
            request.await.map_err(send_failed)?
        };

        Ok(sent.id.0.to_string())
    }

    async fn send_sticker(
        &self,
        channel_id: &str,
        _item: &MediaItem,
        data: Bytes,
    ) -> DeliveryResult<String> {
        let chat = self.parse_chat(channel_id)?;
        let sent = self
            .bot
            .send_sticker(chat, InputFile::memory(data))
            .await
            .map_err(|e| DeliveryError::SendFailed {
                platform: Platform::Telegram,
                channel_id: channel_id.to_string(),
                message: e.to_string(),
            })?;
        Ok(sent.id.0.to_string())
    }

    async fn edit_message(
        &self,
        channel_id: &str,
        message_id: &str,
        content: &str,
    ) -> DeliveryResult<()> {
        let chat = self.parse_chat(channel_id)?;
        let message = parse_message_id(message_id, "edit")?;
        self.bot
            .edit_message_text(chat, message, content)
            .await
            .map_err(|e| DeliveryError::EditFailed {
                message_id: message_id.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> DeliveryResult<()> {
        let chat = self.parse_chat(channel_id)?;
        let message = parse_message_id(message_id, "delete")?;
        self.bot
            .delete_message(chat, message)
            .await
            .map_err(|e| DeliveryError::DeleteFailed {
                message_id: message_id.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn fetch_bytes(&self, url: &str) -> DeliveryResult<Bytes> {
        let response = reqwest::get(url)
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

fn parse_message_id(message_id: &str, action: &str) -> DeliveryResult<TgMessageId> {
    message_id
        .parse::<i32>()
        .map(TgMessageId)
        .map_err(|_| match action {
            "delete" => DeliveryError::DeleteFailed {
                message_id: message_id.to_string(),
                message: "not a valid Telegram message id".to_string(),
            },
            _ => DeliveryError::EditFailed {
                message_id: message_id.to_string(),
                message: "not a valid Telegram message id".to_string(),
            },
        })
}

/// Split long messages for Telegram's 4096 char limit, preferring newline
/// then space boundaries, never splitting inside a UTF-8 character.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }
        let actual_end = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .or_else(|| text[start..end].rfind(' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(end)
        } else {
            end
        };

        chunks.push(text[start..actual_end].to_string());
        start = actual_end;
    }

    chunks
}

/// Shared state for the inbound update handlers.
pub struct TelegramInbound {
    broker: Arc<MessageBroker>,
    store: Arc<dyn ChannelStore>,
    token: String,
}

impl TelegramInbound {
    pub fn new(broker: Arc<MessageBroker>, store: Arc<dyn ChannelStore>, token: String) -> Self {
        Self {
            broker,
            store,
            token,
        }
    }

    fn is_bridged(&self, chat_id: ChatId) -> bool {
        self.store
            .find_endpoint(Platform::Telegram, &chat_id.0.to_string())
            .is_some()
    }

    /// Resolve a Telegram file into a directly fetchable URL.
    async fn file_url(&self, bot: &Bot, file: &teloxide::types::FileMeta) -> Option<String> {
        match bot.get_file(file.id.clone()).await {
            Ok(file) => Some(format!(
                "https://api.telegram.org/file/bot{}/{}",
                self.token, file.path
            )),
            Err(e) => {
                warn!("Failed to resolve Telegram file: {}", e);
                None
            }
        }
    }

    async fn collect_attachments(&self, bot: &Bot, msg: &Message) -> Vec<MediaItem> {
        let mut items = Vec::new();

        if let Some(sizes) = msg.photo() {
            // Telegram sends several downscaled sizes; the last is the
            // original resolution.
            if let Some(photo) = sizes.last() {
                if let Some(url) = self.file_url(bot, &photo.file).await {
                    items.push(MediaItem {
                        url,
                        content_type: "image/jpeg".to_string(),
                        name: None,
                        is_sticker: false,
                        is_animated: false,
                        width: Some(photo.width),
                        height: Some(photo.height),
                    });
                }
            }
        }

        if let Some(animation) = msg.animation() {
            if let Some(url) = self.file_url(bot, &animation.file).await {
                items.push(MediaItem {
                    url,
                    content_type: "image/gif".to_string(),
                    name: animation.file_name.clone(),
                    is_sticker: false,
                    is_animated: true,
                    width: Some(animation.width),
                    height: Some(animation.height),
                });
            }
        } else if let Some(video) = msg.video() {
            if let Some(url) = self.file_url(bot, &video.file).await {
                items.push(MediaItem {
                    url,
                    content_type: video
                        .mime_type
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "video/mp4".to_string()),
                    name: video.file_name.clone(),
                    is_sticker: false,
                    is_animated: false,
                    width: Some(video.width),
                    height: Some(video.height),
                });
            }
        } else if let Some(document) = msg.document() {
            if let Some(url) = self.file_url(bot, &document.file).await {
                items.push(MediaItem {
                    url,
                    content_type: document
                        .mime_type
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "application/octet-stream".to_string()),
                    name: document.file_name.clone(),
                    is_sticker: false,
                    is_animated: false,
                    width: None,
                    height: None,
                });
            }
        }

        if let Some(sticker) = msg.sticker() {
            if let Some(url) = self.file_url(bot, &sticker.file).await {
                let (content_type, animated) = match sticker.format() {
                    StickerFormat::Static => ("image/webp", false),
                    StickerFormat::Animated => ("application/x-tgsticker", true),
                    StickerFormat::Video => ("video/webm", true),
                };
                let mut item = MediaItem::sticker(url, content_type, animated);
                item.name = sticker
                    .set_name
                    .as_ref()
                    .map(|set| format!("{set}.{}", if animated { "webm" } else { "webp" }));
                items.push(item);
            }
        }

        items
    }
}

fn author_name(msg: &Message) -> String {
    msg.from
        .as_ref()
        .map(|user| {
            user.username
                .clone()
                .unwrap_or_else(|| user.full_name())
        })
        .unwrap_or_else(|| msg.chat.title().unwrap_or("Telegram").to_string())
}

fn body_text(msg: &Message) -> String {
    msg.text()
        .or_else(|| msg.caption())
        .unwrap_or_default()
        .to_string()
}

async fn handle_message(
    bot: Bot,
    msg: Message,
    inbound: Arc<TelegramInbound>,
) -> ResponseResult<()> {
    if msg.from.as_ref().is_some_and(|u| u.is_bot) {
        return Ok(());
    }
    if !inbound.is_bridged(msg.chat.id) {
        return Ok(());
    }

    let mut body = body_text(&msg);
    let attachments = inbound.collect_attachments(&bot, &msg).await;

    // A bare sticker carries its emoji as the readable fallback text.
    if body.is_empty() {
        if let Some(emoji) = msg.sticker().and_then(|s| s.emoji.clone()) {
            body = emoji;
        }
    }

    if body.is_empty() && attachments.is_empty() {
        return Ok(());
    }

    let reply_to = msg.reply_to_message().map(|replied| ReplySnapshot {
        source_message_id: replied.id.0.to_string(),
        author_name: author_name(replied),
        content: body_text(replied),
    });

    let mut canonical = CanonicalMessage::create(
        Platform::Telegram,
        msg.chat.id.0.to_string(),
        msg.id.0.to_string(),
        author_name(&msg),
        body,
    )
    .with_attachments(attachments);
    if let Some(reply) = reply_to {
        canonical = canonical.with_reply(reply);
    }

    inbound.broker.publish(&canonical);
    Ok(())
}

async fn handle_edited_message(
    _bot: Bot,
    msg: Message,
    inbound: Arc<TelegramInbound>,
) -> ResponseResult<()> {
    if msg.from.as_ref().is_some_and(|u| u.is_bot) {
        return Ok(());
    }
    if !inbound.is_bridged(msg.chat.id) {
        return Ok(());
    }

    let body = body_text(&msg);
    if body.is_empty() {
        return Ok(());
    }

    inbound.broker.publish(&CanonicalMessage::edit(
        Platform::Telegram,
        msg.chat.id.0.to_string(),
        msg.id.0.to_string(),
        author_name(&msg),
        body,
    ));
    Ok(())
}

/// Run the Telegram dispatcher until shutdown.
pub async fn run_telegram_bot(bot: Bot, inbound: Arc<TelegramInbound>) {
    info!("Starting Telegram dispatcher");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handle_message))
        .branch(Update::filter_edited_message().endpoint(handle_edited_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![inbound])
        .default_handler(|_| async {})
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .build()
        .dispatch()
        .await;
}
