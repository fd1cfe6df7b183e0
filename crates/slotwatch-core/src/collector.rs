//! Parameter collector
//!
//! A per-user sequential state machine gathering the four booking fields.
//! Rejected input never advances the state; the user simply answers again.
//! Conversations live until they complete, are cancelled, or the process
//! exits; there is no timeout.

use crate::booking::{self, BookingParameters, Court, SlotDuration};
use crate::error::CollectError;
use chrono::{NaiveDate, NaiveTime};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// Identifies the requesting user across conversation steps.
pub type UserId = i64;

/// Date input format shown to the user (e.g. 14/09/2026).
pub const DATE_FORMAT: &str = "%d/%m/%Y";
/// Time input format shown to the user (e.g. 14:30).
pub const TIME_FORMAT: &str = "%H:%M";

/// Which field the conversation is currently waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectState {
    AwaitingCourt,
    AwaitingDate,
    AwaitingStartTime,
    AwaitingDuration,
}

/// Result of feeding one user input into the machine.
#[derive(Debug)]
pub enum StepOutcome {
    /// Input accepted; ask for the named field next.
    Prompt(CollectState),
    /// All four fields collected; the conversation is gone and the
    /// parameters are the caller's to launch with.
    Complete(BookingParameters),
}

#[derive(Debug, Default)]
struct Draft {
    court: Option<Court>,
    date: Option<NaiveDate>,
    start_time: Option<NaiveTime>,
}

#[derive(Debug)]
struct Conversation {
    state: CollectState,
    draft: Draft,
}

impl Conversation {
    fn new() -> Self {
        Self {
            state: CollectState::AwaitingCourt,
            draft: Draft::default(),
        }
    }
}

/// All in-flight parameter conversations, keyed by user.
pub struct Collector {
    conversations: Mutex<HashMap<UserId, Conversation>>,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector {
    pub fn new() -> Self {
        Self {
            conversations: Mutex::new(HashMap::new()),
        }
    }

    /// Begin (or restart) a conversation for the user.
    pub async fn start(&self, user: UserId) -> CollectState {
        let mut conversations = self.conversations.lock().await;
        conversations.insert(user, Conversation::new());
        debug!(user, "booking conversation started");
        CollectState::AwaitingCourt
    }

    /// Discard the user's conversation. Returns false if none existed.
    pub async fn cancel(&self, user: UserId) -> bool {
        let removed = self.conversations.lock().await.remove(&user).is_some();
        if removed {
            debug!(user, "booking conversation discarded");
        }
        removed
    }

    /// Whether the user currently has a conversation open.
    pub async fn is_active(&self, user: UserId) -> bool {
        self.conversations.lock().await.contains_key(&user)
    }

    /// Feed one line of user input into the machine.
    ///
    /// On error the conversation stays exactly where it was.
    pub async fn submit(&self, user: UserId, input: &str) -> Result<StepOutcome, CollectError> {
        let mut conversations = self.conversations.lock().await;
        let conversation = conversations
            .get_mut(&user)
            .ok_or(CollectError::NoConversation)?;

        match conversation.state {
            CollectState::AwaitingCourt => {
                let court = Court::parse(input)?;
                conversation.draft.court = Some(court);
                conversation.state = CollectState::AwaitingDate;
                Ok(StepOutcome::Prompt(CollectState::AwaitingDate))
            }
            CollectState::AwaitingDate => {
                let date = parse_date(input)?;
                conversation.draft.date = Some(date);
                conversation.state = CollectState::AwaitingStartTime;
                Ok(StepOutcome::Prompt(CollectState::AwaitingStartTime))
            }
            CollectState::AwaitingStartTime => {
                let time = parse_time(input)?;
                booking::validate_start_time(time)?;
                conversation.draft.start_time = Some(time);
                conversation.state = CollectState::AwaitingDuration;
                Ok(StepOutcome::Prompt(CollectState::AwaitingDuration))
            }
            CollectState::AwaitingDuration => {
                let duration = SlotDuration::parse(input)?;
                let params = Self::finish(&conversation.draft, duration)?;
                conversations.remove(&user);
                debug!(user, info = %params.display_info(), "booking parameters complete");
                Ok(StepOutcome::Complete(params))
            }
        }
    }

    fn finish(draft: &Draft, duration: SlotDuration) -> Result<BookingParameters, CollectError> {
        // Earlier states guarantee these fields; a hole here is a logic bug,
        // surfaced as a validation error rather than a panic.
        let (Some(court), Some(date), Some(start_time)) =
            (draft.court, draft.date, draft.start_time)
        else {
            return Err(CollectError::Validation(
                "conversation is missing earlier answers, start over with a new booking"
                    .to_string(),
            ));
        };
        BookingParameters::validate_fit(start_time, duration)?;
        Ok(BookingParameters {
            court,
            date,
            start_time,
            duration,
        })
    }
}

fn parse_date(input: &str) -> Result<NaiveDate, CollectError> {
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT)
        .map_err(|_| CollectError::InputFormat(format!("'{}' is not a DD/MM/YYYY date", input.trim())))
}

fn parse_time(input: &str) -> Result<NaiveTime, CollectError> {
    NaiveTime::parse_from_str(input.trim(), TIME_FORMAT)
        .map_err(|_| CollectError::InputFormat(format!("'{}' is not a HH:MM time", input.trim())))
}
