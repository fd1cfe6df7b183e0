//! Automation collaborator boundary
//!
//! The session worker drives an opaque browser-like resource through this
//! trait pair. The real Chromium implementation lives in the
//! `slotwatch-browser` crate; tests substitute mocks.

use crate::error::AutomationError;
use async_trait::async_trait;
use std::sync::Arc;

/// One controllable browser instance.
///
/// `release` must be idempotent: the cancellation path and the worker's own
/// cleanup may race, and the underlying resource must be torn down exactly
/// once regardless of which caller gets there first.
#[async_trait]
pub trait AutomationHandle: Send + Sync {
    /// Navigate the instance to the given URL.
    async fn navigate(&self, url: &str) -> Result<(), AutomationError>;

    /// Override the client identity presented to the target site.
    async fn set_identity(&self, agent: &str);

    /// Tear the instance down. Safe to call more than once.
    async fn release(&self);
}

/// Source of automation handles, one per session.
#[async_trait]
pub trait HandleProvider: Send + Sync {
    async fn acquire(&self) -> Result<Arc<dyn AutomationHandle>, AutomationError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Records every interaction so tests can assert on release counts.
    #[derive(Default)]
    pub struct MockHandle {
        pub navigations: AtomicUsize,
        pub identity_changes: AtomicUsize,
        pub releases: AtomicUsize,
        pub fail_navigation: AtomicBool,
    }

    #[async_trait]
    impl AutomationHandle for MockHandle {
        async fn navigate(&self, _url: &str) -> Result<(), AutomationError> {
            self.navigations.fetch_add(1, Ordering::SeqCst);
            if self.fail_navigation.load(Ordering::SeqCst) {
                return Err(AutomationError::Navigation("mock failure".to_string()));
            }
            Ok(())
        }

        async fn set_identity(&self, _agent: &str) {
            self.identity_changes.fetch_add(1, Ordering::SeqCst);
        }

        async fn release(&self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Hands out a fixed handle, or fails acquisition on demand.
    pub struct MockProvider {
        pub handle: Arc<MockHandle>,
        pub fail_acquire: AtomicBool,
    }

    impl MockProvider {
        pub fn new() -> Self {
            Self {
                handle: Arc::new(MockHandle::default()),
                fail_acquire: AtomicBool::new(false),
            }
        }

        pub fn failing() -> Self {
            let provider = Self::new();
            provider.fail_acquire.store(true, Ordering::SeqCst);
            provider
        }
    }

    #[async_trait]
    impl HandleProvider for MockProvider {
        async fn acquire(&self) -> Result<Arc<dyn AutomationHandle>, AutomationError> {
            if self.fail_acquire.load(Ordering::SeqCst) {
                return Err(AutomationError::Acquisition("mock outage".to_string()));
            }
            Ok(self.handle.clone())
        }
    }
}
