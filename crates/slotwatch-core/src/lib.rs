//! Core engine for slotwatch: booking parameter collection, session
//! lifecycle management and the automation boundary the browser backend
//! implements.

pub mod automation;
pub mod booking;
pub mod collector;
pub mod config;
pub mod error;
pub mod session;

pub use automation::{AutomationHandle, HandleProvider};
pub use booking::BookingParameters;
pub use collector::{CollectState, Collector, StepOutcome, UserId};
pub use config::Config;
pub use error::{AutomationError, CollectError};
pub use session::{CancelOutcome, SessionManager, SessionStatus};
