//! Session registry
//!
//! The one concurrently-accessed table of active sessions. Only the
//! operations below are exposed, never the map itself, so the
//! "presence = alive" contract stays enforceable: insertion happens exactly
//! once at launch, deletion exactly once by whichever party claims cleanup
//! first, and a worker that finds its id gone must terminate.

use crate::automation::AutomationHandle;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Shared state describing one in-flight attempt.
///
/// `last_refresh_at` is written only by the owning worker (via
/// [`SessionRegistry::touch`]); everything else is immutable after creation
/// apart from the handle reference attached once acquisition succeeds.
#[derive(Clone)]
pub struct SessionRecord {
    pub session_id: u64,
    pub owner_id: i64,
    pub display_info: String,
    pub cutoff: DateTime<Utc>,
    pub last_refresh_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Cooperative stop signal delivered by the cancellation path.
    pub cancel: CancellationToken,
    /// Release reference only; the worker owns the handle's lifetime.
    pub handle: Option<Arc<dyn AutomationHandle>>,
}

/// Mapping session id -> record, internally synchronized.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<u64, SessionRecord>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Insert the record for a freshly launched session.
    pub async fn insert(&self, record: SessionRecord) {
        self.sessions.write().await.insert(record.session_id, record);
    }

    /// Remove and return the record, or `None` if it was already gone.
    ///
    /// Whichever caller gets `Some` back has claimed cleanup ownership of
    /// the session's handle.
    pub async fn remove(&self, session_id: u64) -> Option<SessionRecord> {
        self.sessions.write().await.remove(&session_id)
    }

    /// Whether the session is still alive.
    pub async fn contains(&self, session_id: u64) -> bool {
        self.sessions.read().await.contains_key(&session_id)
    }

    /// Stamp the record's last-refresh time. Owning worker only.
    pub async fn touch(&self, session_id: u64) {
        if let Some(record) = self.sessions.write().await.get_mut(&session_id) {
            record.last_refresh_at = Utc::now();
        }
    }

    /// Publish the release reference once the worker has acquired its
    /// handle. Returns false when the record is already gone, in which case
    /// the handle never became visible to anyone else and the caller still
    /// owns it.
    pub async fn attach_handle(
        &self,
        session_id: u64,
        handle: Arc<dyn AutomationHandle>,
    ) -> bool {
        match self.sessions.write().await.get_mut(&session_id) {
            Some(record) => {
                record.handle = Some(handle);
                true
            }
            None => false,
        }
    }

    /// Point-in-time copy of all records, ordered by session id. May be
    /// slightly stale by the time the caller reads it, but never torn.
    pub async fn snapshot(&self) -> Vec<SessionRecord> {
        let sessions = self.sessions.read().await;
        let mut records: Vec<SessionRecord> = sessions.values().cloned().collect();
        records.sort_by_key(|record| record.session_id);
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::mock::MockHandle;

    fn record(id: u64) -> SessionRecord {
        let now = Utc::now();
        SessionRecord {
            session_id: id,
            owner_id: 7,
            display_info: format!("session {}", id),
            cutoff: now + chrono::Duration::minutes(5),
            last_refresh_at: now,
            created_at: now,
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    #[tokio::test]
    async fn remove_twice_yields_some_then_none() {
        let registry = SessionRegistry::new();
        registry.insert(record(1)).await;

        assert!(registry.remove(1).await.is_some());
        assert!(registry.remove(1).await.is_none());
    }

    #[tokio::test]
    async fn contains_tracks_presence() {
        let registry = SessionRegistry::new();
        assert!(!registry.contains(9).await);
        registry.insert(record(9)).await;
        assert!(registry.contains(9).await);
        registry.remove(9).await;
        assert!(!registry.contains(9).await);
    }

    #[tokio::test]
    async fn touch_updates_last_refresh() {
        let registry = SessionRegistry::new();
        let mut r = record(3);
        r.last_refresh_at = Utc::now() - chrono::Duration::minutes(10);
        let stale = r.last_refresh_at;
        registry.insert(r).await;

        registry.touch(3).await;

        let snapshot = registry.snapshot().await;
        assert!(snapshot[0].last_refresh_at > stale);
    }

    #[tokio::test]
    async fn touch_on_absent_record_is_a_no_op() {
        let registry = SessionRegistry::new();
        registry.touch(404).await;
        assert!(registry.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn attach_handle_fails_after_removal() {
        let registry = SessionRegistry::new();
        registry.insert(record(5)).await;

        let handle = Arc::new(MockHandle::default());
        assert!(registry.attach_handle(5, handle.clone()).await);

        registry.remove(5).await;
        assert!(!registry.attach_handle(5, handle).await);
    }

    #[tokio::test]
    async fn snapshot_is_ordered_by_id() {
        let registry = SessionRegistry::new();
        registry.insert(record(4)).await;
        registry.insert(record(2)).await;
        registry.insert(record(8)).await;

        let ids: Vec<u64> = registry
            .snapshot()
            .await
            .iter()
            .map(|r| r.session_id)
            .collect();
        assert_eq!(ids, vec![2, 4, 8]);
    }
}
