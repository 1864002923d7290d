//! Environment variable overrides for configuration.
//!
//! Supports overriding config values with environment variables:
//! - `FERRYMAN_DISCORD_TOKEN` - Discord bot token
//! - `FERRYMAN_TELEGRAM_TOKEN` - Telegram bot token
//! - `FERRYMAN_CONFIG` - config file path

use std::env;

use crate::config::types::Config;

/// Environment variable prefix for all config overrides.
const ENV_PREFIX: &str = "FERRYMAN";

/// Apply environment variable overrides to a config.
///
/// This allows tokens to be provided via environment variables instead of
/// the config file.
pub fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(token) = env::var(format!("{}_DISCORD_TOKEN", ENV_PREFIX)) {
        config.discord.token = token;
    }
    if let Ok(token) = env::var(format!("{}_TELEGRAM_TOKEN", ENV_PREFIX)) {
        config.telegram.token = token;
    }
    config
}

/// Get the config file path from environment or use default.
///
/// Checks `FERRYMAN_CONFIG`, otherwise returns "ferryman.conf".
pub fn get_config_path() -> String {
    env::var(format!("{}_CONFIG", ENV_PREFIX)).unwrap_or_else(|_| "ferryman.conf".to_string())
}
