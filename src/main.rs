//! Ferryman - Discord-Telegram chat bridge
//!
//! Relays messages between paired Discord channels and Telegram chats,
//! propagating edits and deletes to the delivered counterparts.

mod bridge;
mod common;
mod config;
mod platform;
mod store;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use bridge::{DeliveryTranslator, IdentityMapper, MessageBroker, PairingRegistry};
use common::{ChannelEndpoint, Platform};
use config::{env::get_config_path, load_and_validate};
use platform::discord::{build_discord_client, run_discord_bot, DiscordClient};
use platform::telegram::{run_telegram_bot, TelegramClient, TelegramInbound};
use platform::OutboundDelivery;
use store::{ChannelStore, MemoryChannelStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Ferryman v{} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = get_config_path();
    info!("Loading configuration from {}...", config_path);

    let config = load_and_validate(&config_path).inspect_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        tracing::error!("Please ensure {} exists and is properly formatted.", config_path);
    })?;

    info!("Configuration loaded successfully");
    info!("  Bridges: {}", config.bridges.len());

    // ============================================================
    // Build the pairing registry from the configured bridges
    // ============================================================
    let store = MemoryChannelStore::new();
    for (index, pair) in config.bridges.iter().enumerate() {
        let bridge_id = format!("bridge-{}", index + 1);
        let display_name = pair.name.clone().unwrap_or_else(|| pair.discord.clone());

        store
            .insert_endpoint(ChannelEndpoint {
                platform: Platform::Discord,
                channel_id: pair.discord.clone(),
                bridge_id: bridge_id.clone(),
                name: display_name.clone(),
            })
            .with_context(|| format!("registering Discord channel {}", pair.discord))?;
        store
            .insert_endpoint(ChannelEndpoint {
                platform: Platform::Telegram,
                channel_id: pair.telegram.trim().to_string(),
                bridge_id: bridge_id.clone(),
                name: display_name.clone(),
            })
            .with_context(|| format!("registering Telegram chat {}", pair.telegram))?;

        info!("  {} <-> {} [{}]", pair.discord, pair.telegram.trim(), display_name);
    }
    let store: Arc<dyn ChannelStore> = Arc::new(store);

    // ============================================================
    // Bridge core
    // ============================================================
    let registry = Arc::new(PairingRegistry::new(store.clone()));
    let broker = Arc::new(MessageBroker::new());
    let mapper = Arc::new(IdentityMapper::new());

    let mut discord_profile = bridge::PresentationProfile::discord_default();
    let mut telegram_profile = bridge::PresentationProfile::telegram_default();
    if let Some(presentation) = &config.presentation {
        if let Some(format) = &presentation.discord_format {
            discord_profile.author_format = format.clone();
        }
        if let Some(format) = &presentation.telegram_format {
            telegram_profile.author_format = format.clone();
        }
    }
    let translator = Arc::new(
        DeliveryTranslator::new(mapper.clone())
            .with_profile(Platform::Discord, discord_profile)
            .with_profile(Platform::Telegram, telegram_profile),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ============================================================
    // Discord: gateway events in, native sends out
    // ============================================================
    info!("Starting Discord bot...");
    let discord_gateway = build_discord_client(&config.discord.token, broker.clone(), store.clone())
        .await
        .context("building Discord client")?;
    let discord_client = Arc::new(DiscordClient::new(discord_gateway.http.clone()));

    let discord_outbound = Arc::new(OutboundDelivery::new(
        discord_client,
        registry.clone(),
        mapper.clone(),
        translator.clone(),
    ));
    let discord_outbound_task = tokio::spawn(
        discord_outbound.run(broker.subscribe(Platform::Discord), shutdown_rx.clone()),
    );
    let discord_task = tokio::spawn(run_discord_bot(discord_gateway));

    // ============================================================
    // Telegram: dispatcher in, native sends out
    // ============================================================
    info!("Starting Telegram bot...");
    let bot = teloxide::Bot::new(config.telegram.token.clone());
    let telegram_client = Arc::new(TelegramClient::new(bot.clone()));
    let telegram_inbound = Arc::new(TelegramInbound::new(
        broker.clone(),
        store.clone(),
        config.telegram.token.clone(),
    ));

    let telegram_outbound = Arc::new(OutboundDelivery::new(
        telegram_client,
        registry.clone(),
        mapper.clone(),
        translator.clone(),
    ));
    let telegram_outbound_task = tokio::spawn(
        telegram_outbound.run(broker.subscribe(Platform::Telegram), shutdown_rx.clone()),
    );
    let telegram_task = tokio::spawn(run_telegram_bot(bot, telegram_inbound));

    info!(
        "Bridge online: {} delivery loops subscribed",
        broker.subscriber_count()
    );

    // ============================================================
    // Run until a client exits or a shutdown signal arrives
    // ============================================================
    tokio::select! {
        biased;
        _ = shutdown_signal() => {
            info!("Shutdown signal received - stopping delivery loops...");
        }
        _ = discord_task => warn!("Discord client exited"),
        _ = telegram_task => warn!("Telegram dispatcher exited"),
    }

    // Let in-flight deliveries finish before exiting.
    if shutdown_tx.send(true).is_err() {
        warn!("Delivery loops already stopped");
    }
    let drain = async {
        let _ = discord_outbound_task.await;
        let _ = telegram_outbound_task.await;
    };
    if tokio::time::timeout(tokio::time::Duration::from_secs(5), drain)
        .await
        .is_err()
    {
        warn!("Timed out waiting for delivery loops to drain");
    }

    info!("Exiting...");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
