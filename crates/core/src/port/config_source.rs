// Configuration Source Port
// File- or store-backed; reloaded on every refresh cycle

use crate::domain::PollerConfig;
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Load (or reload) the complete configuration document
    ///
    /// # Errors
    /// - AppError::Config if the document is missing or malformed
    async fn load(&self) -> Result<PollerConfig>;

    /// Human-readable location, for logs
    fn describe(&self) -> String;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Configuration source backed by a replaceable in-memory document
    pub struct StaticConfigSource {
        config: Mutex<PollerConfig>,
        loads: AtomicUsize,
        unavailable: AtomicBool,
    }

    impl StaticConfigSource {
        pub fn new(config: PollerConfig) -> Self {
            Self {
                config: Mutex::new(config),
                loads: AtomicUsize::new(0),
                unavailable: AtomicBool::new(false),
            }
        }

        pub fn replace(&self, config: PollerConfig) {
            *self.config.lock().unwrap() = config;
        }

        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        pub fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ConfigSource for StaticConfigSource {
        async fn load(&self) -> Result<PollerConfig> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(AppError::Config("configuration store unavailable".into()));
            }
            Ok(self.config.lock().unwrap().clone())
        }

        fn describe(&self) -> String {
            "static".to_string()
        }
    }
}
