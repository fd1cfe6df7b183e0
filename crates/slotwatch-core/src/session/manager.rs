//! Session manager
//!
//! The launch/cancel/status surface over the registry. Each launch spawns
//! one worker task; cancellation is cooperative for the worker but releases
//! the browser resource synchronously so its real-world lifetime is bounded
//! by the caller, not by the worker's next poll.

use crate::automation::HandleProvider;
use crate::booking::BookingParameters;
use crate::config::Config;
use crate::session::registry::{SessionRecord, SessionRegistry};
use crate::session::worker::SessionWorker;
use chrono::{DateTime, Local, LocalResult, TimeZone, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Result of a cancellation request. Cancelling a session that already
/// stopped (or never existed) is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Stopped,
    AlreadyStopped,
}

/// Read-only view of one active session for display.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub session_id: u64,
    pub owner_id: i64,
    pub display_info: String,
    /// Time left until the session gives up; zero means ending imminently.
    pub time_until_cutoff: Duration,
    /// Time until the next refresh pass; zero means due now.
    pub time_until_next_refresh: Duration,
}

pub struct SessionManager {
    registry: Arc<SessionRegistry>,
    provider: Arc<dyn HandleProvider>,
    config: Arc<Config>,
    next_id: AtomicU64,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn HandleProvider>, config: Arc<Config>) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            provider,
            config,
            next_id: AtomicU64::new(1),
        }
    }

    /// Start a refresh session for the given parameters.
    ///
    /// Allocates the next session id (strictly increasing, never reused
    /// within the process), inserts the record and spawns the worker as one
    /// unit, and returns the id for display.
    pub async fn launch(&self, owner_id: i64, params: BookingParameters) -> u64 {
        let session_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let cutoff = self.compute_cutoff(target_instant(&params), now);
        let cancel = CancellationToken::new();

        self.registry
            .insert(SessionRecord {
                session_id,
                owner_id,
                display_info: params.display_info(),
                cutoff,
                last_refresh_at: now,
                created_at: now,
                cancel: cancel.clone(),
                handle: None,
            })
            .await;

        let worker = SessionWorker {
            registry: self.registry.clone(),
            provider: self.provider.clone(),
            config: self.config.clone(),
            session_id,
            params,
            cutoff,
            cancel,
        };
        tokio::spawn(worker.run());

        info!(session_id, owner_id, %cutoff, "refresh session launched");
        session_id
    }

    /// Stop a session. Removing the record claims cleanup ownership, so the
    /// handle found there is released before this returns and the worker's
    /// next poll observes the absence and exits without touching it.
    pub async fn cancel(&self, session_id: u64) -> CancelOutcome {
        let Some(record) = self.registry.remove(session_id).await else {
            return CancelOutcome::AlreadyStopped;
        };

        record.cancel.cancel();
        if let Some(handle) = record.handle {
            handle.release().await;
        }

        info!(session_id, "refresh session cancelled");
        CancelOutcome::Stopped
    }

    /// Point-in-time view of all active sessions, ordered by id.
    pub async fn status(&self) -> Vec<SessionStatus> {
        let now = Utc::now();
        let interval = self.config.refresh_interval();
        self.registry
            .snapshot()
            .await
            .into_iter()
            .map(|record| {
                let next_refresh = record.last_refresh_at
                    + chrono::Duration::from_std(interval)
                        .unwrap_or_else(|_| chrono::Duration::zero());
                SessionStatus {
                    session_id: record.session_id,
                    owner_id: record.owner_id,
                    display_info: record.display_info,
                    time_until_cutoff: clamp_to_std(record.cutoff - now),
                    time_until_next_refresh: clamp_to_std(next_refresh - now),
                }
            })
            .collect()
    }

    /// Cancel every active session. Used at shutdown.
    pub async fn shutdown(&self) {
        for record in self.registry.snapshot().await {
            self.cancel(record.session_id).await;
        }
    }

    fn compute_cutoff(&self, target: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        let cutoff = target - self.config.cutoff_lead();
        if cutoff <= now {
            // deadline already passed: grant a grace window so the worker
            // still performs at least one pass
            now + self.config.min_grace()
        } else {
            cutoff
        }
    }
}

/// Interpret the booked slot's wall-clock start as an absolute instant.
fn target_instant(params: &BookingParameters) -> DateTime<Utc> {
    let naive = params.target_datetime();
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        // a start time skipped by a DST jump: treat the naive value as UTC
        LocalResult::None => Utc.from_utc_datetime(&naive),
    }
}

fn clamp_to_std(duration: chrono::Duration) -> Duration {
    duration.to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::mock::MockProvider;
    use crate::booking::{Court, SlotDuration};
    use chrono::Timelike;
    use std::sync::atomic::Ordering as AtomicOrdering;

    fn fast_config() -> Arc<Config> {
        Arc::new(Config {
            refresh_interval_secs: 3600,
            poll_interval_millis: 10,
            ..Config::default()
        })
    }

    /// Parameters whose slot starts at the given offset from now, local time.
    fn params_starting_in(offset: chrono::Duration) -> BookingParameters {
        let target = Local::now() + offset;
        BookingParameters {
            court: Court::Court1,
            date: target.date_naive(),
            start_time: target.time().with_nanosecond(0).unwrap(),
            duration: SlotDuration::Min60,
        }
    }

    #[tokio::test]
    async fn session_ids_are_strictly_increasing() {
        let manager = SessionManager::new(Arc::new(MockProvider::new()), fast_config());

        let mut last = 0;
        for _ in 0..5 {
            let id = manager
                .launch(1, params_starting_in(chrono::Duration::hours(2)))
                .await;
            assert!(id > last);
            last = id;
        }
    }

    #[tokio::test]
    async fn cancel_twice_yields_stopped_then_already_stopped() {
        let provider = Arc::new(MockProvider::new());
        let handle = provider.handle.clone();
        let manager = SessionManager::new(provider, fast_config());

        let id = manager
            .launch(1, params_starting_in(chrono::Duration::hours(2)))
            .await;

        // give the worker time to acquire and publish its handle
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(manager.cancel(id).await, CancelOutcome::Stopped);
        assert_eq!(manager.cancel(id).await, CancelOutcome::AlreadyStopped);

        // the worker observes the cancellation without a second release
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(handle.releases.load(AtomicOrdering::SeqCst), 1);
        assert!(manager.status().await.is_empty());
    }

    #[tokio::test]
    async fn cancel_of_unknown_session_is_benign() {
        let manager = SessionManager::new(Arc::new(MockProvider::new()), fast_config());
        assert_eq!(manager.cancel(999).await, CancelOutcome::AlreadyStopped);
    }

    #[tokio::test]
    async fn snapshot_after_launch_shows_full_interval_and_lead_window() {
        let config = Arc::new(Config {
            refresh_interval_secs: 610,
            poll_interval_millis: 10,
            cutoff_lead_secs: 300,
            ..Config::default()
        });
        let manager = SessionManager::new(Arc::new(MockProvider::new()), config);

        // target = now + 2 * lead, so cutoff = target - lead = now + lead
        let id = manager
            .launch(1, params_starting_in(chrono::Duration::seconds(600)))
            .await;

        let status = manager.status().await;
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].session_id, id);

        let cutoff = status[0].time_until_cutoff.as_secs();
        assert!((290..=300).contains(&cutoff), "cutoff in {cutoff}s");

        let refresh = status[0].time_until_next_refresh.as_secs();
        assert!((600..=610).contains(&refresh), "next refresh in {refresh}s");

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn past_target_gets_grace_instead_of_instant_cutoff() {
        let config = Arc::new(Config {
            min_grace_secs: 120,
            poll_interval_millis: 10,
            ..Config::default()
        });
        let manager = SessionManager::new(Arc::new(MockProvider::new()), config);

        let id = manager
            .launch(1, params_starting_in(-chrono::Duration::hours(1)))
            .await;

        let status = manager.status().await;
        let cutoff = status[0].time_until_cutoff.as_secs();
        assert!((110..=120).contains(&cutoff), "grace cutoff in {cutoff}s");

        manager.cancel(id).await;
    }

    #[tokio::test]
    async fn shutdown_stops_every_session() {
        let provider = Arc::new(MockProvider::new());
        let handle = provider.handle.clone();
        let manager = SessionManager::new(provider, fast_config());

        for _ in 0..3 {
            manager
                .launch(1, params_starting_in(chrono::Duration::hours(2)))
                .await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        manager.shutdown().await;

        assert!(manager.status().await.is_empty());
        assert_eq!(handle.releases.load(AtomicOrdering::SeqCst), 3);
    }
}
