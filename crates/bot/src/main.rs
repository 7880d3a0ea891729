//! scandesk bot daemon
//!
//! Shares a network scanner through a chat interface. Scanners are found
//! via DNS-SD, driven over eSCL, and arbitrated by the engine so exactly
//! one chat session uses the device at a time; finished scans are
//! assembled into a PDF and optionally sent back into the chat.

mod chat;
mod config;
mod discovery;
mod escl;
mod pdf;

use anyhow::{Context, Result};
use clap::Parser;
use common::{create_discovery_bridge, setup_logging};
use engine::{DeviceRegistry, SessionStore, spawn_reaper};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "scandesk-bot")]
#[command(
    author,
    version,
    about = "Share a network scanner through a chat bot"
)]
#[command(long_about = "
Shares an eSCL (AirScan) network scanner through a Telegram bot.
Authorized users start a session, scan pages one by one, and receive the
assembled PDF in the chat.

EXAMPLES:
    # Run with default config
    scandesk-bot

    # Run with custom config
    scandesk-bot --config /path/to/bot.toml

    # Browse for scanners without starting the bot
    scandesk-bot --list-devices

    # Run with debug logging
    scandesk-bot --log-level debug

CONFIGURATION:
    The daemon looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/scandesk/bot.toml
    3. /etc/scandesk/bot.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to the default location and exit
    #[arg(long)]
    save_config: bool,

    /// Browse for scanners, print what answers, and exit
    #[arg(long)]
    list_devices: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = config::BotConfig::default();
        let path = config::BotConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        config::BotConfig::load(Some(config::expand_path(path)))
            .context("Failed to load configuration")?
    } else {
        config::BotConfig::load_or_default()
    };

    let log_level = args.log_level.as_deref().unwrap_or(&config.server.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("scandesk-bot v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    // Scanner registry, fed by the mDNS browse thread through the bridge.
    let registry = DeviceRegistry::new();
    let (bridge, worker) = create_discovery_bridge();
    let _daemon = discovery::spawn_discovery(worker).context("Failed to start scanner discovery")?;
    let feed_registry = registry.clone();
    tokio::spawn(async move {
        discovery::apply_events(bridge, feed_registry).await;
    });

    if args.list_devices {
        return list_devices_mode(&registry).await;
    }

    // Anything wrong with the configuration is fatal here, before any
    // session state exists.
    config.validate().context("Invalid configuration")?;

    fs::create_dir_all(&config.storage.tmp_dir).with_context(|| {
        format!(
            "Failed to create spool directory: {}",
            config.storage.tmp_dir.display()
        )
    })?;
    fs::create_dir_all(&config.storage.output_dir).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            config.storage.output_dir.display()
        )
    })?;

    let store = SessionStore::new(
        config.storage.tmp_dir.clone(),
        config.storage.output_dir.clone(),
        config.session.max_active,
        Arc::new(pdf::JpegPdfAssembler::a4()),
    );

    let (reaper_handle, expiry_rx) = spawn_reaper(
        store.clone(),
        config.session.idle_timeout(),
        config.session.reap_interval(),
    );

    let api = chat::ChatApi::new(&config.chat.api_key);

    // Expiry notifications go straight to the owning chat.
    let notifier = api.clone();
    tokio::spawn(async move {
        chat::notify_expiries(notifier, expiry_rx).await;
    });

    let capture = Arc::new(escl::EsclClient::new().context("Failed to build the scan transport")?);
    let runtime = chat::BotRuntime::new(api, registry, store, capture, &config);

    tokio::select! {
        result = runtime.run() => {
            if let Err(e) = result {
                error!("Chat runtime error: {:#}", e);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    reaper_handle.abort();
    info!("Shutdown complete");
    Ok(())
}

/// Browse for a few seconds and print every scanner that answered.
async fn list_devices_mode(registry: &DeviceRegistry) -> Result<()> {
    info!("Browsing for scanners...");
    tokio::time::sleep(Duration::from_secs(3)).await;

    let devices = registry.list_idle();
    if devices.is_empty() {
        println!("No scanners found.");
    } else {
        println!("Found {} scanner(s):\n", devices.len());
        for device in devices {
            println!("  {} ({})", device.name, device.base_url);
        }
    }

    Ok(())
}
