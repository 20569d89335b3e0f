// External Flag Store Port
// Used solely for maintenance-window gating: a present key means "do not poll"

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum FlagStoreError {
    #[error("Flag store unavailable: {0}")]
    Unavailable(String),

    #[error("Flag store query failed: {0}")]
    Query(String),
}

#[async_trait]
pub trait FlagStore: Send + Sync {
    /// Check whether a flag key is present
    async fn is_set(&self, key: &str) -> Result<bool, FlagStoreError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory flag store
    #[derive(Default)]
    pub struct InMemoryFlagStore {
        flags: Mutex<HashSet<String>>,
        reads: AtomicUsize,
        unavailable: AtomicBool,
    }

    impl InMemoryFlagStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set(&self, key: impl Into<String>) {
            self.flags.lock().unwrap().insert(key.into());
        }

        pub fn clear(&self, key: &str) {
            self.flags.lock().unwrap().remove(key);
        }

        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        pub fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FlagStore for InMemoryFlagStore {
        async fn is_set(&self, key: &str) -> Result<bool, FlagStoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(FlagStoreError::Unavailable("simulated outage".into()));
            }
            Ok(self.flags.lock().unwrap().contains(key))
        }
    }
}
