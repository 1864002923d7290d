//! Semantic validation of loaded configuration.

use std::collections::HashSet;

use crate::common::error::ConfigError;
use crate::config::types::Config;

/// Validate a loaded config.
///
/// Checks the invariants the bridge relies on: tokens present, at least one
/// pair configured, and no channel appearing in more than one bridge.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.discord.token.trim().is_empty() {
        return Err(validation_error("discord.token is empty"));
    }
    if config.telegram.token.trim().is_empty() {
        return Err(validation_error("telegram.token is empty"));
    }
    if config.bridges.is_empty() {
        return Err(validation_error("no bridges configured"));
    }

    let mut discord_seen = HashSet::new();
    let mut telegram_seen = HashSet::new();
    for pair in &config.bridges {
        if pair.discord.trim().is_empty() || pair.telegram.trim().is_empty() {
            return Err(validation_error("bridge entry with empty channel id"));
        }
        if pair.discord.parse::<u64>().is_err() {
            return Err(validation_error(&format!(
                "'{}' is not a valid Discord channel id",
                pair.discord
            )));
        }
        if pair.telegram.trim().parse::<i64>().is_err() {
            return Err(validation_error(&format!(
                "'{}' is not a valid Telegram chat id",
                pair.telegram
            )));
        }
        if !discord_seen.insert(pair.discord.clone()) {
            return Err(validation_error(&format!(
                "Discord channel {} appears in more than one bridge",
                pair.discord
            )));
        }
        if !telegram_seen.insert(pair.telegram.trim().to_string()) {
            return Err(validation_error(&format!(
                "Telegram chat {} appears in more than one bridge",
                pair.telegram
            )));
        }
    }

    Ok(())
}

fn validation_error(message: &str) -> ConfigError {
    ConfigError::ValidationError {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{BridgePairConfig, DiscordConfig, TelegramConfig};

    fn make_config(bridges: Vec<BridgePairConfig>) -> Config {
        Config {
            discord: DiscordConfig {
                token: "d-token".to_string(),
            },
            telegram: TelegramConfig {
                token: "t-token".to_string(),
            },
            bridges,
            presentation: None,
        }
    }

    fn pair(discord: &str, telegram: &str) -> BridgePairConfig {
        BridgePairConfig {
            discord: discord.to_string(),
            telegram: telegram.to_string(),
            name: None,
        }
    }

    #[test]
    fn test_valid_config() {
        let config = make_config(vec![
            pair("1237942279570722830", "-1002083228885"),
            pair("1283993745699901460", "-1002232075230"),
        ]);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_empty_token_rejected() {
        let mut config = make_config(vec![pair("1", "-1")]);
        config.telegram.token = "  ".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_no_bridges_rejected() {
        let config = make_config(Vec::new());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_discord_channel_rejected() {
        let config = make_config(vec![pair("1", "-1"), pair("1", "-2")]);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_telegram_chat_rejected() {
        // Trailing whitespace still counts as the same chat.
        let config = make_config(vec![pair("1", "-1"), pair("2", "-1 ")]);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_non_numeric_ids_rejected() {
        let config = make_config(vec![pair("general", "-1")]);
        assert!(validate(&config).is_err());

        let config = make_config(vec![pair("1", "team-chat")]);
        assert!(validate(&config).is_err());
    }
}
