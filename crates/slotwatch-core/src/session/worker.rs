//! Session worker
//!
//! One spawned task per active session. The loop is refresh-first: even a
//! session whose cutoff is already past performs one full pass before the
//! wait phase notices the deadline. The wait sleeps in short sub-intervals,
//! checking the cancellation token, registry presence and the cutoff at each
//! step, so external cancellation is observed within one sub-interval
//! instead of one refresh interval.

use crate::automation::{AutomationHandle, HandleProvider};
use crate::booking::{BookingParameters, build_target_url};
use crate::config::Config;
use crate::session::registry::SessionRegistry;
use chrono::{DateTime, Utc};
use rand::RngExt;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Client identities rotated across refresh passes, uniform random choice.
const AGENT_POOL: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/139.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/139.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:141.0) Gecko/20100101 Firefox/141.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) Version/18.5 Safari/605.1.15",
];

fn pick_identity() -> &'static str {
    let index = rand::rng().random_range(0..AGENT_POOL.len());
    AGENT_POOL[index]
}

/// Why the wait phase ended.
enum Wait {
    RefreshDue,
    Deadline,
    Cancelled,
}

pub(crate) struct SessionWorker {
    pub registry: Arc<SessionRegistry>,
    pub provider: Arc<dyn HandleProvider>,
    pub config: Arc<Config>,
    pub session_id: u64,
    pub params: BookingParameters,
    pub cutoff: DateTime<Utc>,
    pub cancel: CancellationToken,
}

/// Backstop for abnormal worker exits.
///
/// Every normal terminal path disarms this guard after doing its own
/// cleanup. If the worker task unwinds instead (a panic inside a handle
/// implementation, say), the drop spawns the same remove-then-release
/// sequence so the session cannot stay registered with a live browser
/// behind it. The remove-first ownership rule still applies, so a racing
/// cancellation never causes a second release.
struct CleanupGuard {
    registry: Arc<SessionRegistry>,
    session_id: u64,
    handle: Option<Arc<dyn AutomationHandle>>,
    armed: bool,
}

impl CleanupGuard {
    fn new(registry: Arc<SessionRegistry>, session_id: u64) -> Self {
        Self {
            registry,
            session_id,
            handle: None,
            armed: true,
        }
    }

    fn arm_handle(&mut self, handle: Arc<dyn AutomationHandle>) {
        self.handle = Some(handle);
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let registry = self.registry.clone();
        let session_id = self.session_id;
        let handle = self.handle.take();
        error!(session_id, "worker terminated abnormally, cleaning up");
        tokio::spawn(async move {
            let owned = registry.remove(session_id).await.is_some();
            if owned && let Some(handle) = handle {
                handle.release().await;
            }
        });
    }
}

impl SessionWorker {
    /// Run the session to one of its terminal states.
    ///
    /// Whatever path ends the loop, the automation handle is released
    /// exactly once and the registry ends with no entry for this session:
    /// the cancellation path removes the record first and releases what it
    /// found there, the worker releases only when its own removal won.
    pub(crate) async fn run(self) {
        let session_id = self.session_id;
        let mut guard = CleanupGuard::new(self.registry.clone(), session_id);

        let handle = match self.provider.acquire().await {
            Ok(handle) => handle,
            Err(e) => {
                error!(session_id, error = %e, "could not acquire automation handle");
                self.registry.remove(session_id).await;
                guard.disarm();
                return;
            }
        };
        guard.arm_handle(handle.clone());

        if !self.registry.attach_handle(session_id, handle.clone()).await {
            // Cancelled before the release reference was published; the
            // canceller had nothing to free, so the handle is still ours.
            debug!(session_id, "cancelled during startup");
            handle.release().await;
            guard.disarm();
            return;
        }

        loop {
            self.refresh(handle.as_ref()).await;

            match self.wait().await {
                Wait::RefreshDue => continue,
                Wait::Cancelled => {
                    // The canceller removed the record and released the
                    // handle; nothing left to touch.
                    debug!(session_id, "stop signal observed, worker exiting");
                    guard.disarm();
                    return;
                }
                Wait::Deadline => break,
            }
        }

        info!(session_id, "cutoff reached, stopping refresh session");
        if self.registry.remove(session_id).await.is_some() {
            handle.release().await;
        }
        guard.disarm();
    }

    /// One refresh pass: rotate identity, build the URL once, navigate,
    /// stamp the record. Navigation failures are transient target-site
    /// trouble and never end the session.
    async fn refresh(&self, handle: &dyn AutomationHandle) {
        handle.set_identity(pick_identity()).await;

        let url = build_target_url(
            self.params.date,
            self.params.start_time,
            self.params.duration,
            self.params.court,
        );
        match handle.navigate(&url).await {
            Ok(()) => debug!(session_id = self.session_id, %url, "page refreshed"),
            Err(e) => warn!(
                session_id = self.session_id,
                error = %e,
                "navigation failed, retrying next interval"
            ),
        }

        self.registry.touch(self.session_id).await;
    }

    async fn wait(&self) -> Wait {
        let poll = self.config.poll_interval();
        let wake = Instant::now() + self.config.refresh_interval();

        loop {
            let step = poll.min(wake.saturating_duration_since(Instant::now()));
            tokio::select! {
                _ = self.cancel.cancelled() => return Wait::Cancelled,
                _ = tokio::time::sleep(step) => {}
            }

            if !self.registry.contains(self.session_id).await {
                return Wait::Cancelled;
            }
            if Utc::now() >= self.cutoff {
                return Wait::Deadline;
            }
            if Instant::now() >= wake {
                return Wait::RefreshDue;
            }
        }
    }
}
