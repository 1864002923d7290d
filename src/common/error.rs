//! Error types for the application.

use thiserror::Error;

use crate::common::messages::Platform;

/// Top-level application error.
#[derive(Debug, Error)]
#[allow(dead_code)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration-related errors.
///
/// Ambiguous pairings are fatal for the triggering event: picking one
/// counterpart arbitrarily would duplicate message delivery.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },

    #[error("Ambiguous pairing for {platform} channel {channel_id}: {count} counterparts")]
    AmbiguousPairing {
        platform: Platform,
        channel_id: String,
        count: usize,
    },
}

/// Translation errors: malformed or unsupported message content.
///
/// These degrade per the translator's fallback rules and never crash an
/// adapter loop.
#[derive(Debug, Error)]
#[allow(dead_code)]
pub enum TranslationError {
    #[error("Attachment has no usable URL: {name}")]
    MissingUrl { name: String },

    #[error("Unsupported content type: {content_type}")]
    UnsupportedContentType { content_type: String },
}

/// Delivery errors: a native send/edit/delete call failed.
///
/// Logged and dropped at this layer; retries belong to the native client.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Failed to send to {platform} channel {channel_id}: {message}")]
    SendFailed {
        platform: Platform,
        channel_id: String,
        message: String,
    },

    #[error("Failed to edit message {message_id}: {message}")]
    EditFailed { message_id: String, message: String },

    #[error("Failed to delete message {message_id}: {message}")]
    DeleteFailed { message_id: String, message: String },

    #[error("Failed to fetch media from {url}: {message}")]
    FetchFailed { url: String, message: String },

    #[error("Invalid channel id '{channel_id}' for {platform}")]
    InvalidChannelId {
        platform: Platform,
        channel_id: String,
    },
}

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Endpoint already registered: {platform} channel {channel_id}")]
    DuplicateEndpoint {
        platform: Platform,
        channel_id: String,
    },
}

/// Result type alias using BridgeError.
#[allow(dead_code)]
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Result type alias for delivery operations.
pub type DeliveryResult<T> = std::result::Result<T, DeliveryError>;
