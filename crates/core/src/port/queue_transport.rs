// Queue Transport Port
// Abstraction over the queue SDK: resolve, long-poll receive, delete

use crate::domain::{Message, QueueRef, ReceiptHandle};
use async_trait::async_trait;
use thiserror::Error;

/// Transport errors (all treated as transient by the polling loop)
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Delete failed: {0}")]
    Delete(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Queue Transport trait
///
/// Implementations:
/// - SqsTransport: AWS SQS (infra-aws)
/// - InMemoryQueueTransport: tests
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Resolve a queue name into a transport address
    ///
    /// # Errors
    /// - TransportError::QueueNotFound if the queue does not exist
    async fn resolve(&self, queue_name: &str) -> Result<QueueRef, TransportError>;

    /// Long-poll for a batch of messages (may be empty)
    async fn receive(&self, queue: &QueueRef) -> Result<Vec<Message>, TransportError>;

    /// Delete a processed message using its receipt handle
    async fn delete(&self, queue: &QueueRef, receipt: &ReceiptHandle)
        -> Result<(), TransportError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Simulated long-poll wait when a queue is empty
    const EMPTY_POLL_WAIT: Duration = Duration::from_millis(10);

    /// In-memory queue transport
    ///
    /// Messages stay "in flight" after receive; `delete` records the receipt.
    /// Queues must be declared (via `create_queue` or `push`) to resolve.
    pub struct InMemoryQueueTransport {
        queues: Mutex<HashMap<String, VecDeque<Message>>>,
        deleted: Mutex<Vec<(String, ReceiptHandle)>>,
        missing: Mutex<HashSet<String>>,
        receive_calls: AtomicUsize,
        delete_calls: AtomicUsize,
        fail_receive: AtomicBool,
        fail_delete: AtomicBool,
        panic_on_receive: AtomicBool,
        batch_size: AtomicUsize,
    }

    impl InMemoryQueueTransport {
        pub fn new() -> Self {
            Self {
                queues: Mutex::new(HashMap::new()),
                deleted: Mutex::new(Vec::new()),
                missing: Mutex::new(HashSet::new()),
                receive_calls: AtomicUsize::new(0),
                delete_calls: AtomicUsize::new(0),
                fail_receive: AtomicBool::new(false),
                fail_delete: AtomicBool::new(false),
                panic_on_receive: AtomicBool::new(false),
                batch_size: AtomicUsize::new(10),
            }
        }

        pub fn create_queue(&self, queue_name: &str) {
            self.queues
                .lock()
                .unwrap()
                .entry(queue_name.to_string())
                .or_default();
        }

        /// Enqueue a message body, returning its id
        pub fn push(&self, queue_name: &str, body: impl Into<String>) -> String {
            let id = uuid::Uuid::new_v4().to_string();
            let receipt = ReceiptHandle::new(format!("receipt-{}", id));
            self.queues
                .lock()
                .unwrap()
                .entry(queue_name.to_string())
                .or_default()
                .push_back(Message::new(id.clone(), body, receipt));
            id
        }

        /// Make `resolve` fail for a queue
        pub fn mark_missing(&self, queue_name: &str) {
            self.missing.lock().unwrap().insert(queue_name.to_string());
        }

        pub fn mark_present(&self, queue_name: &str) {
            self.missing.lock().unwrap().remove(queue_name);
        }

        pub fn set_fail_receive(&self, fail: bool) {
            self.fail_receive.store(fail, Ordering::SeqCst);
        }

        pub fn set_fail_delete(&self, fail: bool) {
            self.fail_delete.store(fail, Ordering::SeqCst);
        }

        /// Make the next receive panic (kills the calling polling loop)
        pub fn set_panic_on_receive(&self, panic: bool) {
            self.panic_on_receive.store(panic, Ordering::SeqCst);
        }

        pub fn set_batch_size(&self, size: usize) {
            self.batch_size.store(size.max(1), Ordering::SeqCst);
        }

        pub fn receive_calls(&self) -> usize {
            self.receive_calls.load(Ordering::SeqCst)
        }

        /// Delete attempts, including failed ones
        pub fn delete_calls(&self) -> usize {
            self.delete_calls.load(Ordering::SeqCst)
        }

        pub fn pending(&self, queue_name: &str) -> usize {
            self.queues
                .lock()
                .unwrap()
                .get(queue_name)
                .map(|q| q.len())
                .unwrap_or(0)
        }

        pub fn deleted(&self) -> Vec<(String, ReceiptHandle)> {
            self.deleted.lock().unwrap().clone()
        }

        pub fn deleted_count(&self) -> usize {
            self.deleted.lock().unwrap().len()
        }
    }

    impl Default for InMemoryQueueTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl QueueTransport for InMemoryQueueTransport {
        async fn resolve(&self, queue_name: &str) -> Result<QueueRef, TransportError> {
            if self.missing.lock().unwrap().contains(queue_name)
                || !self.queues.lock().unwrap().contains_key(queue_name)
            {
                return Err(TransportError::QueueNotFound(queue_name.to_string()));
            }
            Ok(QueueRef::new(
                queue_name,
                format!("memory://queues/{}", queue_name),
            ))
        }

        async fn receive(&self, queue: &QueueRef) -> Result<Vec<Message>, TransportError> {
            self.receive_calls.fetch_add(1, Ordering::SeqCst);

            if self.panic_on_receive.swap(false, Ordering::SeqCst) {
                panic!("simulated transport panic for {}", queue.name);
            }
            if self.fail_receive.load(Ordering::SeqCst) {
                tokio::time::sleep(EMPTY_POLL_WAIT).await;
                return Err(TransportError::Receive("simulated receive failure".into()));
            }

            let batch: Vec<Message> = {
                let mut queues = self.queues.lock().unwrap();
                let pending = queues.entry(queue.name.clone()).or_default();
                let n = self.batch_size.load(Ordering::SeqCst).min(pending.len());
                pending.drain(..n).collect()
            };

            if batch.is_empty() {
                tokio::time::sleep(EMPTY_POLL_WAIT).await;
            }
            Ok(batch)
        }

        async fn delete(
            &self,
            queue: &QueueRef,
            receipt: &ReceiptHandle,
        ) -> Result<(), TransportError> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(TransportError::Delete("simulated delete failure".into()));
            }
            self.deleted
                .lock()
                .unwrap()
                .push((queue.name.clone(), receipt.clone()));
            Ok(())
        }
    }
}
