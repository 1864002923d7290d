//! Configuration type definitions.

use serde::Deserialize;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub discord: DiscordConfig,
    pub telegram: TelegramConfig,
    /// Channel pairs to bridge.
    pub bridges: Vec<BridgePairConfig>,
    pub presentation: Option<PresentationConfig>,
}

/// Discord bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordConfig {
    pub token: String,
}

/// Telegram bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub token: String,
}

/// One configured channel pair.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgePairConfig {
    /// Discord channel ID.
    pub discord: String,
    /// Telegram chat ID (negative for supergroups/channels).
    pub telegram: String,
    /// Display name for logs; defaults to the Discord channel id.
    pub name: Option<String>,
}

/// Presentation policy overrides per destination platform.
#[derive(Debug, Clone, Deserialize)]
pub struct PresentationConfig {
    /// Format for messages rendered into Discord ("%user", "%message", "%time").
    pub discord_format: Option<String>,
    /// Format for messages rendered into Telegram.
    pub telegram_format: Option<String>,
}
