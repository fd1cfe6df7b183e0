//! Session lifecycle management
//!
//! One session is one time-boxed, repeatedly-refreshing attempt to claim a
//! reservation slot. The registry is the single shared table of active
//! sessions and the sole authority a worker consults on whether to keep
//! running: presence means "keep going", absence means "stop and clean up".

mod manager;
mod registry;
mod worker;

pub use manager::{CancelOutcome, SessionManager, SessionStatus};
pub use registry::{SessionRecord, SessionRegistry};
