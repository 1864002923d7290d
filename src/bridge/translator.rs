//! Delivery translation.
//!
//! Turns a canonical message into the ordered sequence of platform send
//! operations that re-materialize it on the destination, using that
//! platform's idioms: captions vs. separate caption messages, native reply
//! references vs. inline quotes, sticker re-upload vs. native sticker send.
//!
//! The Create/Edit/Delete branches of the adapter state machine are unified
//! here so every adapter consumes the same op sequence.

use std::sync::Arc;

use chrono::Local;
use tracing::debug;

use crate::bridge::mapper::{IdentityMapper, MappingKey};
use crate::common::{CanonicalMessage, ChannelEndpoint, MediaItem, MessageAction, Platform};

/// Default author prefix for messages rendered into Discord.
pub const DEFAULT_DISCORD_FORMAT: &str = "**%user**: %message";

/// Default author prefix for messages rendered into Telegram.
pub const DEFAULT_TELEGRAM_FORMAT: &str = "%user: %message";

/// Longest inline quote carried when a native reply reference is unavailable.
const QUOTE_PREVIEW_LEN: usize = 80;

/// One platform-level operation the adapter must execute natively.
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformOp {
    /// Send a plain text message.
    SendText {
        content: String,
        /// Native message id on the destination to reply to.
        reply_to: Option<String>,
    },
    /// Fetch and re-upload one media item with a caption.
    SendMedia {
        content: String,
        item: MediaItem,
        reply_to: Option<String>,
    },
    /// Send a sticker natively (no caption possible).
    SendSticker { item: MediaItem },
    /// Replace the text of an earlier delivered message.
    EditText {
        dest_message_id: String,
        content: String,
    },
    /// Delete an earlier delivered message.
    DeleteMessage { dest_message_id: String },
}

/// Presentation policy for one destination platform.
///
/// Author prefixing is presentation, not protocol, so it is configurable per
/// destination. `native_stickers` says whether the platform has a dedicated
/// sticker send; if not, stickers are re-uploaded as ordinary media and can
/// carry the caption directly.
#[derive(Debug, Clone)]
pub struct PresentationProfile {
    /// Format string with `%user`, `%message` and `%time` placeholders.
    pub author_format: String,
    pub native_stickers: bool,
}

impl PresentationProfile {
    /// Discord renders the author in bold and re-uploads stickers as images.
    pub fn discord_default() -> Self {
        Self {
            author_format: DEFAULT_DISCORD_FORMAT.to_string(),
            native_stickers: false,
        }
    }

    /// Telegram uses a plain prefix and sends stickers natively; Telegram
    /// stickers cannot carry captions, so captions go in a companion message.
    pub fn telegram_default() -> Self {
        Self {
            author_format: DEFAULT_TELEGRAM_FORMAT.to_string(),
            native_stickers: true,
        }
    }

    /// Apply the author format to a message body.
    fn format(&self, user: &str, message: &str) -> String {
        self.author_format
            .replace("%time", &Local::now().format("%H:%M:%S").to_string())
            .replace("%user", user)
            .replace("%message", message)
            .trim_end()
            .to_string()
    }
}

/// Per-destination-platform rendering rules.
pub struct DeliveryTranslator {
    mapper: Arc<IdentityMapper>,
    discord_profile: PresentationProfile,
    telegram_profile: PresentationProfile,
}

impl DeliveryTranslator {
    pub fn new(mapper: Arc<IdentityMapper>) -> Self {
        Self {
            mapper,
            discord_profile: PresentationProfile::discord_default(),
            telegram_profile: PresentationProfile::telegram_default(),
        }
    }

    /// Override the presentation profile for one destination platform.
    pub fn with_profile(mut self, platform: Platform, profile: PresentationProfile) -> Self {
        match platform {
            Platform::Discord => self.discord_profile = profile,
            Platform::Telegram => self.telegram_profile = profile,
        }
        self
    }

    fn profile_for(&self, platform: Platform) -> &PresentationProfile {
        match platform {
            Platform::Discord => &self.discord_profile,
            Platform::Telegram => &self.telegram_profile,
        }
    }

    /// Render a canonical message into the ops to execute against `dest`.
    ///
    /// An empty result means the message is dropped for this destination
    /// (nothing to send, or an edit/delete whose counterpart is unknown).
    pub fn render(&self, msg: &CanonicalMessage, dest: &ChannelEndpoint) -> Vec<PlatformOp> {
        match msg.action {
            MessageAction::Create => self.render_create(msg, dest),
            MessageAction::Edit => self.render_edit(msg, dest),
            MessageAction::Delete => self.render_delete(msg, dest),
        }
    }

    fn render_create(&self, msg: &CanonicalMessage, dest: &ChannelEndpoint) -> Vec<PlatformOp> {
        let profile = self.profile_for(dest.platform);

        // Rule 1: native reply reference when the replied-to message has a
        // known counterpart on this destination; otherwise degrade to an
        // inline quote. Never a hard failure.
        let mut reply_to = None;
        let mut quote = None;
        if let Some(reply) = &msg.reply_to {
            let key = MappingKey::new(
                dest.bridge_id.clone(),
                msg.source_platform,
                reply.source_message_id.clone(),
            );
            match self.mapper.lookup(&key) {
                Some(record) if record.dest_platform == dest.platform => {
                    reply_to = Some(record.dest_message_id);
                }
                _ => {
                    debug!(
                        source_message_id = %reply.source_message_id,
                        "No delivery record for replied-to message, quoting inline"
                    );
                    quote = Some(format!(
                        "> {}: {}",
                        reply.author_name,
                        quote_preview(&reply.content)
                    ));
                }
            }
        }

        let body = msg.text_content.trim();
        let mut caption = profile.format(&msg.author_name, body);
        if let Some(quote) = quote {
            caption = format!("{}\n{}", quote, caption);
        }

        // Rule 2: one send op per attachment, each carrying the caption.
        if !msg.attachments.is_empty() {
            let mut ops = Vec::new();
            let mut caption_carried = false;
            for item in &msg.attachments {
                if item.is_sticker && profile.native_stickers {
                    ops.push(PlatformOp::SendSticker { item: item.clone() });
                } else {
                    ops.push(PlatformOp::SendMedia {
                        content: caption.clone(),
                        item: item.clone(),
                        reply_to: reply_to.clone(),
                    });
                    caption_carried = true;
                }
            }
            // Stickers cannot carry captions; send the caption alongside.
            if !caption_carried && !body.is_empty() {
                ops.push(PlatformOp::SendText {
                    content: caption,
                    reply_to,
                });
            }
            return ops;
        }

        // Rule 3: plain text, skipped entirely when there is nothing to say.
        if body.is_empty() && msg.reply_to.is_none() {
            return Vec::new();
        }
        vec![PlatformOp::SendText {
            content: caption,
            reply_to,
        }]
    }

    fn render_edit(&self, msg: &CanonicalMessage, dest: &ChannelEndpoint) -> Vec<PlatformOp> {
        let key = MappingKey::new(
            dest.bridge_id.clone(),
            msg.source_platform,
            msg.source_message_id.clone(),
        );
        let Some(record) = self.mapper.lookup(&key) else {
            // Nothing was ever delivered for this source message.
            debug!(
                source_message_id = %msg.source_message_id,
                "Edit for unmapped message, dropping"
            );
            return Vec::new();
        };

        let profile = self.profile_for(dest.platform);
        let body = msg.text_content.trim();
        let content = if msg.author_name.is_empty() {
            body.to_string()
        } else {
            profile.format(&msg.author_name, body)
        };

        vec![PlatformOp::EditText {
            dest_message_id: record.dest_message_id,
            content,
        }]
    }

    fn render_delete(&self, msg: &CanonicalMessage, dest: &ChannelEndpoint) -> Vec<PlatformOp> {
        let key = MappingKey::new(
            dest.bridge_id.clone(),
            msg.source_platform,
            msg.source_message_id.clone(),
        );
        match self.mapper.lookup(&key) {
            Some(record) => vec![PlatformOp::DeleteMessage {
                dest_message_id: record.dest_message_id,
            }],
            None => {
                debug!(
                    source_message_id = %msg.source_message_id,
                    "Delete for unmapped message, dropping"
                );
                Vec::new()
            }
        }
    }
}

/// Degrade a failed media op to a text notice carrying the caption.
///
/// A failed fetch must surface as a text-only notice on the destination,
/// never as silence and never as a garbled partial message.
pub fn degrade_media(op: &PlatformOp) -> Option<PlatformOp> {
    match op {
        PlatformOp::SendMedia {
            content,
            item,
            reply_to,
        } => {
            let notice = format!("[media unavailable: {}]", item.upload_name());
            let content = if content.is_empty() {
                notice
            } else {
                format!("{}\n{}", content, notice)
            };
            Some(PlatformOp::SendText {
                content,
                reply_to: reply_to.clone(),
            })
        }
        PlatformOp::SendSticker { item } => Some(PlatformOp::SendText {
            content: format!("[sticker unavailable: {}]", item.upload_name()),
            reply_to: None,
        }),
        _ => None,
    }
}

/// First `QUOTE_PREVIEW_LEN` characters of quoted content, on one line.
fn quote_preview(content: &str) -> String {
    let one_line = content.replace('\n', " ");
    let mut preview: String = one_line.chars().take(QUOTE_PREVIEW_LEN).collect();
    if one_line.chars().count() > QUOTE_PREVIEW_LEN {
        preview.push('…');
    }
    preview
}
