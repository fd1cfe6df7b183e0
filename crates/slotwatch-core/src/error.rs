//! Error types shared across the core crate

use thiserror::Error;

/// Errors produced while collecting booking parameters from a user.
///
/// All variants are recoverable: the conversation stays in its current step
/// and the user simply supplies new input.
#[derive(Error, Debug, PartialEq)]
pub enum CollectError {
    /// Input could not be parsed at all (bad date string, not a time, ...).
    #[error("could not read that input: {0}")]
    InputFormat(String),

    /// Input parsed but is outside the allowed range or grid.
    #[error("{0}")]
    Validation(String),

    /// The user has no booking conversation in progress.
    #[error("no booking conversation in progress")]
    NoConversation,
}

/// Errors surfaced by the automation collaborator.
#[derive(Error, Debug)]
pub enum AutomationError {
    /// No browser instance could be obtained. Fatal to the one session.
    #[error("failed to acquire automation handle: {0}")]
    Acquisition(String),

    /// A navigation attempt failed. Non-fatal; the refresh loop continues.
    #[error("navigation failed: {0}")]
    Navigation(String),
}
