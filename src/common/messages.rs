//! Canonical message types for bridge communication.
//!
//! This module defines the single source of truth for the platform-neutral
//! message shape that adapters produce and consume. A `CanonicalMessage` is
//! built once per native event, published through the broker, and never
//! mutated afterwards.

use std::fmt;

/// The chat platforms the bridge connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Discord,
    Telegram,
}

impl Platform {
    /// The counterpart platform within a bridge.
    pub fn other(self) -> Platform {
        match self {
            Platform::Discord => Platform::Telegram,
            Platform::Telegram => Platform::Discord,
        }
    }

    /// Stable lowercase identifier, used in logs and store keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Discord => "discord",
            Platform::Telegram => "telegram",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of chat event a canonical message represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageAction {
    Create,
    Edit,
    Delete,
}

/// One attachment carried by a message.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    /// Platform-hosted URL the bytes can be fetched from.
    pub url: String,
    /// MIME type ("image/png", "video/mp4", ...).
    pub content_type: String,
    /// Original file name, when the platform provides one.
    pub name: Option<String>,
    /// Whether this item is a sticker rather than a regular attachment.
    pub is_sticker: bool,
    /// Whether a sticker is animated (gif rather than a still image).
    pub is_animated: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl MediaItem {
    /// A plain (non-sticker) attachment.
    pub fn attachment(url: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content_type: content_type.into(),
            name: None,
            is_sticker: false,
            is_animated: false,
            width: None,
            height: None,
        }
    }

    /// A sticker item.
    pub fn sticker(
        url: impl Into<String>,
        content_type: impl Into<String>,
        animated: bool,
    ) -> Self {
        Self {
            url: url.into(),
            content_type: content_type.into(),
            name: None,
            is_sticker: true,
            is_animated: animated,
            width: None,
            height: None,
        }
    }

    /// File name to use when re-uploading, falling back to one derived
    /// from the content type.
    pub fn upload_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        format!("file.{}", extension_for(&self.content_type))
    }
}

/// Map a MIME type to a file extension for re-upload names.
fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        _ => "bin",
    }
}

/// Snapshot of the message a reply points at.
///
/// A snapshot rather than a live reference: the replied-to message may be
/// edited or deleted later without invalidating the reply context.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplySnapshot {
    /// Native id of the replied-to message on the source platform.
    pub source_message_id: String,
    pub author_name: String,
    pub content: String,
}

/// The adapter-agnostic representation of one chat event.
#[derive(Debug, Clone)]
pub struct CanonicalMessage {
    pub source_platform: Platform,
    /// Native channel id on the source platform.
    pub source_channel_id: String,
    /// Native message id on the source platform.
    pub source_message_id: String,
    pub author_name: String,
    pub author_avatar_url: Option<String>,
    /// Message text; empty string when the message carries only media.
    pub text_content: String,
    /// Ordered attachments; empty when none.
    pub attachments: Vec<MediaItem>,
    pub reply_to: Option<ReplySnapshot>,
    pub action: MessageAction,
}

impl CanonicalMessage {
    /// A new `Create` message with no media or reply context.
    pub fn create(
        source_platform: Platform,
        source_channel_id: impl Into<String>,
        source_message_id: impl Into<String>,
        author_name: impl Into<String>,
        text_content: impl Into<String>,
    ) -> Self {
        Self {
            source_platform,
            source_channel_id: source_channel_id.into(),
            source_message_id: source_message_id.into(),
            author_name: author_name.into(),
            author_avatar_url: None,
            text_content: text_content.into(),
            attachments: Vec::new(),
            reply_to: None,
            action: MessageAction::Create,
        }
    }

    /// An `Edit` carrying the new text for an earlier message.
    ///
    /// The author is kept so the destination re-renders the same prefixed
    /// form the original delivery had.
    pub fn edit(
        source_platform: Platform,
        source_channel_id: impl Into<String>,
        source_message_id: impl Into<String>,
        author_name: impl Into<String>,
        new_text: impl Into<String>,
    ) -> Self {
        Self {
            action: MessageAction::Edit,
            ..Self::create(
                source_platform,
                source_channel_id,
                source_message_id,
                author_name,
                new_text,
            )
        }
    }

    /// A `Delete` for an earlier message.
    pub fn delete(
        source_platform: Platform,
        source_channel_id: impl Into<String>,
        source_message_id: impl Into<String>,
    ) -> Self {
        Self {
            action: MessageAction::Delete,
            ..Self::create(source_platform, source_channel_id, source_message_id, "", "")
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<MediaItem>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_reply(mut self, reply: ReplySnapshot) -> Self {
        self.reply_to = Some(reply);
        self
    }

    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.author_avatar_url = Some(url.into());
        self
    }
}

/// One channel's membership in a bridge.
///
/// Created once during setup, never mutated; (platform, channel_id) is
/// globally unique across all bridges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEndpoint {
    pub platform: Platform,
    /// Native channel id, as a string (Telegram chat ids are negative i64s,
    /// Discord channel ids are u64s; strings keep both exact).
    pub channel_id: String,
    /// The bridge this channel belongs to.
    pub bridge_id: String,
    /// Display name for logs.
    pub name: String,
}
