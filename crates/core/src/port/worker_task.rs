// Worker Task Port
// The pluggable delivery capability invoked once per message by the pool

use async_trait::async_trait;

pub use crate::domain::outcome::DeliveryError;

/// Worker Task trait
///
/// Implementations:
/// - HttpForwarder: forwards the body to an HTTP endpoint (infra-http)
/// - SnsForwarder: publishes the body to an SNS topic (infra-aws)
///
/// Implementations should bound their own execution time; the pool does not
/// cancel in-flight work.
#[async_trait]
pub trait WorkerTask: Send + Sync {
    /// Deliver one message
    ///
    /// # Errors
    /// Any error leaves the source message on the queue for redelivery.
    async fn process(&self, body: &str, message_id: &str) -> Result<(), DeliveryError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::Semaphore;

    /// Mock task behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always succeed
        Success,
        /// Always fail with the given error
        Fail(DeliveryError),
        /// Panic with message (for panic isolation testing)
        Panic(String),
        /// Fail only for bodies equal to the given value, succeed otherwise
        FailBody(String),
    }

    /// Mock Worker Task for testing
    ///
    /// With `gated()`, every invocation blocks until `release(n)` hands it a
    /// permit, which lets tests hold work "in the pool" deterministically.
    pub struct MockWorkerTask {
        behavior: Mutex<MockBehavior>,
        gate: Option<Arc<Semaphore>>,
        calls: Mutex<Vec<String>>,
        running: AtomicUsize,
        max_running: AtomicUsize,
        completed: AtomicUsize,
    }

    impl MockWorkerTask {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Mutex::new(behavior),
                gate: None,
                calls: Mutex::new(Vec::new()),
                running: AtomicUsize::new(0),
                max_running: AtomicUsize::new(0),
                completed: AtomicUsize::new(0),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }

        pub fn new_fail(error: DeliveryError) -> Self {
            Self::new(MockBehavior::Fail(error))
        }

        pub fn new_panic_inducing(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Panic(message.into()))
        }

        /// Successful task that blocks until released
        pub fn gated() -> Self {
            let mut task = Self::new_success();
            task.gate = Some(Arc::new(Semaphore::new(0)));
            task
        }

        pub fn set_behavior(&self, behavior: MockBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }

        /// Let `n` blocked invocations proceed
        pub fn release(&self, n: usize) {
            if let Some(gate) = &self.gate {
                gate.add_permits(n);
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        /// Message ids in invocation order
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn running(&self) -> usize {
            self.running.load(Ordering::SeqCst)
        }

        /// Highest number of invocations observed executing at once
        pub fn max_running(&self) -> usize {
            self.max_running.load(Ordering::SeqCst)
        }

        pub fn completed(&self) -> usize {
            self.completed.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WorkerTask for MockWorkerTask {
        async fn process(&self, body: &str, message_id: &str) -> Result<(), DeliveryError> {
            self.calls.lock().unwrap().push(message_id.to_string());
            let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now_running, Ordering::SeqCst);

            if let Some(gate) = &self.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }

            let behavior = self.behavior.lock().unwrap().clone();
            self.running.fetch_sub(1, Ordering::SeqCst);
            self.completed.fetch_add(1, Ordering::SeqCst);

            match behavior {
                MockBehavior::Success => Ok(()),
                MockBehavior::Fail(e) => Err(e),
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg); // Actually panic for panic isolation testing
                }
                MockBehavior::FailBody(bad) if bad == body => {
                    Err(DeliveryError::Status(500))
                }
                MockBehavior::FailBody(_) => Ok(()),
            }
        }
    }
}
