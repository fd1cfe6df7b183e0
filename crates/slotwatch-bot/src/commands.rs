//! Command handler.
//!
//! Routes inbound text: slash commands (/book, /abort, /stop, /status,
//! /help) act immediately, everything else is fed to the user's open
//! parameter conversation.

use crate::channel::{InboundText, Outbound};
use anyhow::Result;
use slotwatch_core::{
    CancelOutcome, CollectError, CollectState, Collector, SessionManager, SessionStatus,
    StepOutcome, UserId,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct Dispatcher {
    collector: Arc<Collector>,
    manager: Arc<SessionManager>,
    channel: Arc<dyn Outbound>,
}

impl Dispatcher {
    pub fn new(
        collector: Arc<Collector>,
        manager: Arc<SessionManager>,
        channel: Arc<dyn Outbound>,
    ) -> Self {
        Self {
            collector,
            manager,
            channel,
        }
    }

    /// Handle one inbound message end to end, replying over the channel.
    pub async fn handle(&self, message: InboundText) {
        let user = message.user;
        let text = message.text.trim();

        let reply = if text.starts_with('/') {
            self.handle_command(user, text).await
        } else {
            self.handle_answer(user, text).await
        };

        match reply {
            Ok(reply) => {
                if let Err(e) = self.channel.send_text(user, &reply).await {
                    warn!(user, error = %e, "failed to send reply");
                }
            }
            Err(e) => warn!(user, error = %e, "command handling failed"),
        }
    }

    async fn handle_command(&self, user: UserId, text: &str) -> Result<String> {
        let parts: Vec<&str> = text.split_whitespace().collect();
        // commands may arrive as "/book@BotName" in group chats
        let command = parts
            .first()
            .map(|s| s.split('@').next().unwrap_or(s).to_lowercase())
            .unwrap_or_default();

        debug!(user, %command, "handling command");

        match command.as_str() {
            "/book" => Ok(self.cmd_book(user).await),
            "/abort" => Ok(self.cmd_abort(user).await),
            "/stop" => Ok(self.cmd_stop(user, parts.get(1).copied()).await),
            "/status" => Ok(self.cmd_status().await),
            "/start" | "/help" => Ok(help_text()),
            _ => Ok(format!("Unknown command {}.\n\n{}", command, help_text())),
        }
    }

    async fn handle_answer(&self, user: UserId, text: &str) -> Result<String> {
        match self.collector.submit(user, text).await {
            Ok(StepOutcome::Prompt(state)) => Ok(prompt_for(state)),
            Ok(StepOutcome::Complete(params)) => {
                let info = params.display_info();
                let session_id = self.manager.launch(user, params).await;
                Ok(format!(
                    "Session {} started: {}.\nThe page will be kept fresh until shortly before the slot opens. Use /stop {} to end it early.",
                    session_id, info, session_id
                ))
            }
            Err(CollectError::NoConversation) => {
                Ok("No booking in progress. Send /book to begin.".to_string())
            }
            Err(e) => Ok(format!("{}\nPlease try again.", e)),
        }
    }

    async fn cmd_book(&self, user: UserId) -> String {
        let state = self.collector.start(user).await;
        format!("Let's set up a booking watch.\n{}", prompt_for(state))
    }

    async fn cmd_abort(&self, user: UserId) -> String {
        if self.collector.cancel(user).await {
            "Booking setup discarded.".to_string()
        } else {
            "Nothing to abort.".to_string()
        }
    }

    async fn cmd_stop(&self, user: UserId, argument: Option<&str>) -> String {
        let Some(id) = argument.and_then(|raw| raw.parse::<u64>().ok()) else {
            return "Usage: /stop <session id>".to_string();
        };

        debug!(user, session_id = id, "stop requested");
        match self.manager.cancel(id).await {
            CancelOutcome::Stopped => format!("Session {} stopped.", id),
            CancelOutcome::AlreadyStopped => format!("Session {} was not running.", id),
        }
    }

    async fn cmd_status(&self) -> String {
        let sessions = self.manager.status().await;
        if sessions.is_empty() {
            return "No active sessions.".to_string();
        }

        let mut text = String::from("Active sessions:\n");
        for session in sessions {
            text.push_str(&format_status_line(&session));
            text.push('\n');
        }
        text
    }
}

fn prompt_for(state: CollectState) -> String {
    match state {
        CollectState::AwaitingCourt => "Which court? (1-4)".to_string(),
        CollectState::AwaitingDate => "Which date? (DD/MM/YYYY)".to_string(),
        CollectState::AwaitingStartTime => {
            "What start time? (HH:MM, on the half hour, 08:00-22:00)".to_string()
        }
        CollectState::AwaitingDuration => "How long? (60, 90 or 120 minutes)".to_string(),
    }
}

fn format_status_line(session: &SessionStatus) -> String {
    format!(
        "#{} {} | next refresh in {} | ends in {}",
        session.session_id,
        session.display_info,
        format_countdown(session.time_until_next_refresh),
        format_countdown(session.time_until_cutoff),
    )
}

fn format_countdown(duration: Duration) -> String {
    let total = duration.as_secs();
    let minutes = total / 60;
    let seconds = total % 60;
    if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

fn help_text() -> String {
    r#"Slotwatch keeps a court reservation page fresh so you can grab the slot the moment it opens.

Commands:
/book - set up a new booking watch
/abort - discard the setup in progress
/status - show active sessions
/stop <id> - stop a session
/help - show this help"#
        .to_string()
}
