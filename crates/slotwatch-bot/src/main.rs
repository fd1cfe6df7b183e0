mod channel;
mod commands;
mod telegram;

use anyhow::{Context, Result};
use clap::Parser;
use commands::Dispatcher;
use futures::StreamExt;
use slotwatch_browser::ChromiumProvider;
use slotwatch_core::{Collector, Config, SessionManager};
use std::path::PathBuf;
use std::sync::Arc;
use telegram::{TelegramChannel, TelegramConfig};
use tracing::info;

#[derive(Parser)]
#[command(name = "slotwatch", about = "Court reservation page watcher", version)]
struct Cli {
    /// Telegram bot token
    #[arg(long, env = "SLOTWATCH_BOT_TOKEN", hide_env_values = true)]
    token: String,

    /// Path to a TOML config file; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Arc::new(match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    });

    let provider = Arc::new(ChromiumProvider::new(config.headless));
    let manager = Arc::new(SessionManager::new(provider, config.clone()));
    let collector = Arc::new(Collector::new());
    let channel = Arc::new(TelegramChannel::new(TelegramConfig::new(cli.token)));
    let dispatcher = Dispatcher::new(collector, manager.clone(), channel.clone());

    let mut inbound = channel
        .start_receiving()
        .context("Telegram channel is not configured")?;

    info!("slotwatch bot running");
    loop {
        tokio::select! {
            message = inbound.next() => match message {
                Some(message) => dispatcher.handle(message).await,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    manager.shutdown().await;
    Ok(())
}
