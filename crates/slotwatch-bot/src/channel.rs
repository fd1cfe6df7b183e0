//! Messaging channel boundary.
//!
//! The dispatcher talks to users through this trait so command handling can
//! be tested without a live Telegram connection.

use anyhow::Result;
use async_trait::async_trait;
use slotwatch_core::UserId;

/// One text message received from a user.
#[derive(Debug, Clone)]
pub struct InboundText {
    pub user: UserId,
    pub text: String,
}

/// Sends replies back to users.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send_text(&self, user: UserId, text: &str) -> Result<()>;
}
