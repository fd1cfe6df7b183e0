//! Telegram transport.
//!
//! Text in, text out over the Bot API: long-polling `getUpdates` on a
//! background task feeding a stream, `sendMessage` for replies. Media,
//! threads and group metadata are ignored; the bot only deals in plain text
//! from private chats.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures::Stream;
use reqwest::Client;
use serde::Deserialize;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::channel::{InboundText, Outbound};
use slotwatch_core::UserId;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org/bot";
/// Default timeout for Telegram API calls (seconds)
const API_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token from @BotFather
    pub bot_token: String,
    /// Long-polling timeout in seconds (default: 30)
    pub polling_timeout: u32,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            polling_timeout: 30,
        }
    }
}

pub struct TelegramChannel {
    config: TelegramConfig,
    client: Client,
    /// Whether polling is active
    polling_active: Arc<AtomicBool>,
    /// Last update ID for long-polling
    last_update_id: Arc<AtomicI64>,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: Client::new(),
            polling_active: Arc::new(AtomicBool::new(false)),
            last_update_id: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn with_token(bot_token: impl Into<String>) -> Self {
        Self::new(TelegramConfig::new(bot_token))
    }

    pub fn is_configured(&self) -> bool {
        !self.config.bot_token.is_empty()
    }

    /// Get the API URL for a method
    fn api_url(&self, method: &str) -> String {
        format!("{}{}/{}", TELEGRAM_API_BASE, self.config.bot_token, method)
    }

    /// Send a plain text message via the Bot API.
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let url = self.api_url("sendMessage");
        let params = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });

        let response = self
            .client
            .post(&url)
            .json(&params)
            .timeout(std::time::Duration::from_secs(API_TIMEOUT_SECS))
            .send()
            .await?;

        if !response.status().is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(anyhow!("Telegram HTTP error: {}", error));
        }

        let body: TelegramResponse<serde_json::Value> = response.json().await?;
        if !body.ok {
            return Err(anyhow!(
                "Telegram API error: {}",
                body.description.unwrap_or_default()
            ));
        }
        Ok(())
    }

    /// Poll for updates using long-polling
    async fn poll_updates(&self) -> Result<Vec<TelegramUpdate>> {
        let url = self.api_url("getUpdates");

        let offset = self.last_update_id.load(Ordering::SeqCst);
        let params = serde_json::json!({
            "offset": if offset > 0 { offset + 1 } else { 0 },
            "timeout": self.config.polling_timeout,
            "allowed_updates": ["message"],
        });

        let response = self
            .client
            .post(&url)
            .json(&params)
            .timeout(std::time::Duration::from_secs(
                self.config.polling_timeout as u64 + 10,
            ))
            .send()
            .await?;

        let body: TelegramResponse<Vec<TelegramUpdate>> = response.json().await?;
        if !body.ok {
            return Err(anyhow!(
                "Telegram API error: {}",
                body.description.unwrap_or_default()
            ));
        }

        let updates = body.result.unwrap_or_default();
        if let Some(last) = updates.last() {
            self.last_update_id.store(last.update_id, Ordering::SeqCst);
        }

        Ok(updates)
    }

    /// Convert a Telegram update into an inbound text, dropping everything
    /// that is not plain text from a human.
    fn convert_update(update: TelegramUpdate) -> Option<InboundText> {
        let message = update.message?;
        let from = message.from?;
        if from.is_bot {
            return None;
        }
        let text = message.text?;
        Some(InboundText {
            user: message.chat.id,
            text,
        })
    }

    /// Start the long-polling task and return the inbound message stream.
    pub fn start_receiving(&self) -> Option<Pin<Box<dyn Stream<Item = InboundText> + Send>>> {
        if !self.is_configured() {
            return None;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let polling_active = self.polling_active.clone();
        let last_update_id = self.last_update_id.clone();
        let config = self.config.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            polling_active.store(true, Ordering::SeqCst);
            info!("starting Telegram polling");

            let channel = TelegramChannel {
                config,
                client,
                polling_active: polling_active.clone(),
                last_update_id,
            };

            while polling_active.load(Ordering::SeqCst) {
                match channel.poll_updates().await {
                    Ok(updates) => {
                        for update in updates {
                            if let Some(inbound) = Self::convert_update(update) {
                                debug!(user = inbound.user, "received Telegram message");
                                if tx.send(inbound).is_err() {
                                    warn!("message receiver dropped, stopping polling");
                                    polling_active.store(false, Ordering::SeqCst);
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        error!("Telegram polling error: {}", e);
                        // back off on error
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    }
                }
            }

            info!("Telegram polling stopped");
        });

        Some(Box::pin(
            tokio_stream::wrappers::UnboundedReceiverStream::new(rx),
        ))
    }
}

#[async_trait]
impl Outbound for TelegramChannel {
    async fn send_text(&self, user: UserId, text: &str) -> Result<()> {
        self.send_message(user, text).await
    }
}

// ============================================================================
// Telegram API Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    from: Option<TelegramUser>,
    chat: TelegramChat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    #[allow(dead_code)]
    id: i64,
    is_bot: bool,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_update(chat_id: i64, text: Option<&str>, is_bot: bool) -> TelegramUpdate {
        TelegramUpdate {
            update_id: 1,
            message: Some(TelegramMessage {
                from: Some(TelegramUser { id: 42, is_bot }),
                chat: TelegramChat { id: chat_id },
                text: text.map(str::to_string),
            }),
        }
    }

    #[test]
    fn api_url_embeds_token_and_method() {
        let channel = TelegramChannel::with_token("123:ABC");
        assert_eq!(
            channel.api_url("sendMessage"),
            "https://api.telegram.org/bot123:ABC/sendMessage"
        );
    }

    #[test]
    fn empty_token_is_not_configured() {
        assert!(TelegramChannel::with_token("t").is_configured());
        assert!(!TelegramChannel::with_token("").is_configured());
    }

    #[test]
    fn convert_update_keeps_plain_text() {
        let inbound = TelegramChannel::convert_update(text_update(999, Some("hello"), false))
            .expect("text message converts");
        assert_eq!(inbound.user, 999);
        assert_eq!(inbound.text, "hello");
    }

    #[test]
    fn convert_update_drops_bots_and_non_text() {
        assert!(TelegramChannel::convert_update(text_update(1, Some("hi"), true)).is_none());
        assert!(TelegramChannel::convert_update(text_update(1, None, false)).is_none());
        assert!(
            TelegramChannel::convert_update(TelegramUpdate {
                update_id: 2,
                message: None,
            })
            .is_none()
        );
    }
}
