//! MessageDelegator - bounded worker pool with admission control
//!
//! One delegator is shared by every queue controller in the process. It owns
//! `max_workers` pool workers fed by a bounded queue of `max_queue_depth`
//! pending units of work.
//!
//! Admission is a semaphore holding `max_workers + max_queue_depth` permits.
//! A caller acquires a permit before dispatch (blocking, without spinning,
//! while the pool is full) and the permit travels with the unit of work until
//! a pool worker finishes it. Saturation therefore turns into caller
//! backpressure or an explicit `Rejected` outcome, never unbounded buffering.

mod panic_guard;

pub use panic_guard::{execute_guarded_async, PanicGuardResult};

use crate::application::constants::DISPATCH_GRACE;
use crate::domain::{
    DeliveryOutcome, DomainError, FailureReason, Message, MessageId, RejectReason,
};
use crate::error::Result;
use crate::port::WorkerTask;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Admission slot held by a unit of work from admission until it is dropped
///
/// Dropping it (job finished, rejected at dispatch, or cancelled with the
/// submitting future) releases the semaphore permit and the in-flight count.
struct Admission {
    _permit: OwnedSemaphorePermit,
    in_flight: Arc<AtomicUsize>,
}

impl Admission {
    fn new(permit: OwnedSemaphorePermit, in_flight: Arc<AtomicUsize>) -> Self {
        in_flight.fetch_add(1, Ordering::SeqCst);
        Self {
            _permit: permit,
            in_flight,
        }
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Unit of work queued inside the pool
struct DelegatedJob {
    message: Message,
    reply: oneshot::Sender<DeliveryOutcome>,
    admission: Admission,
}

/// Snapshot of the pool state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub max_workers: usize,
    pub max_queue_depth: usize,
    /// Units of work waiting in the pool queue (not yet picked by a worker)
    pub queued: usize,
    /// Admitted units of work that have not finished yet
    pub in_flight: usize,
    pub workers_alive: usize,
}

/// An accepted submission whose outcome is still pending
pub struct PendingDelivery {
    message_id: MessageId,
    reply: oneshot::Receiver<DeliveryOutcome>,
}

impl PendingDelivery {
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Wait for the pool worker to report
    pub async fn outcome(self) -> DeliveryOutcome {
        self.reply
            .await
            .unwrap_or(DeliveryOutcome::Failed(FailureReason::Abandoned))
    }
}

/// Result of `submit`
pub enum Submission {
    Accepted(PendingDelivery),
    Rejected(RejectReason),
}

impl Submission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Submission::Accepted(_))
    }

    /// Final outcome; a rejection resolves immediately
    pub async fn outcome(self) -> DeliveryOutcome {
        match self {
            Submission::Accepted(pending) => pending.outcome().await,
            Submission::Rejected(reason) => DeliveryOutcome::Rejected(reason),
        }
    }
}

/// Bounded worker pool shared by all queue controllers
pub struct MessageDelegator {
    max_workers: usize,
    max_queue_depth: usize,
    admission: Arc<Semaphore>,
    sender: mpsc::Sender<DelegatedJob>,
    in_flight: Arc<AtomicUsize>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl MessageDelegator {
    /// Create the pool and spawn its workers
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Arguments
    /// * `worker_count` - Number of concurrently executing workers (> 0)
    /// * `waiting_tasks_ratio` - Queued-but-not-running tasks tolerated per worker (> 0)
    /// * `task` - Delivery capability invoked once per message
    ///
    /// # Errors
    /// - DomainError::InvalidWorkerCount if `worker_count` is 0
    /// - DomainError::InvalidWaitingTasksRatio if the ratio is not a positive number
    pub fn new(
        worker_count: usize,
        waiting_tasks_ratio: f64,
        task: Arc<dyn WorkerTask>,
    ) -> Result<Self> {
        if worker_count == 0 {
            return Err(DomainError::InvalidWorkerCount.into());
        }
        if !waiting_tasks_ratio.is_finite() || waiting_tasks_ratio <= 0.0 {
            return Err(DomainError::InvalidWaitingTasksRatio(waiting_tasks_ratio).into());
        }

        let max_queue_depth = ((waiting_tasks_ratio * worker_count as f64).ceil() as usize).max(1);
        let total_permits = worker_count.saturating_add(max_queue_depth);
        if total_permits > u32::MAX as usize {
            return Err(DomainError::ValidationError(format!(
                "worker pool too large: {} workers with queue depth {}",
                worker_count, max_queue_depth
            ))
            .into());
        }

        let (sender, receiver) = mpsc::channel(max_queue_depth);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let in_flight = Arc::new(AtomicUsize::new(0));

        let workers = (0..worker_count)
            .map(|index| {
                tokio::spawn(pool_worker(
                    index,
                    Arc::clone(&receiver),
                    Arc::clone(&task),
                ))
            })
            .collect();

        info!(
            max_workers = worker_count,
            max_queue_depth = max_queue_depth,
            "Worker pool started"
        );

        Ok(Self {
            max_workers: worker_count,
            max_queue_depth,
            admission: Arc::new(Semaphore::new(total_permits)),
            sender,
            in_flight,
            workers: Mutex::new(workers),
        })
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn max_queue_depth(&self) -> usize {
        self.max_queue_depth
    }

    /// Hand a message to the pool
    ///
    /// Waits for admission while the pool is full. Once admitted, the message
    /// is enqueued; if the queue stays full for longer than the dispatch grace
    /// interval the submission is rejected without invoking the worker task.
    pub async fn submit(&self, message: Message) -> Submission {
        let permit = match Arc::clone(&self.admission).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!(message_id = %message.id, "Worker pool closed, rejecting message");
                return Submission::Rejected(RejectReason::PoolClosed);
            }
        };
        let admission = Admission::new(permit, Arc::clone(&self.in_flight));

        let message_id = message.id.clone();
        let (reply, reply_rx) = oneshot::channel();
        let job = DelegatedJob {
            message,
            reply,
            admission,
        };

        debug!(message_id = %message_id, "Scheduling worker task");

        match self.sender.send_timeout(job, DISPATCH_GRACE).await {
            Ok(()) => Submission::Accepted(PendingDelivery {
                message_id,
                reply: reply_rx,
            }),
            Err(SendTimeoutError::Timeout(_job)) => {
                warn!(
                    message_id = %message_id,
                    max_queue_depth = self.max_queue_depth,
                    "Worker pool queue full, rejecting message"
                );
                Submission::Rejected(RejectReason::PoolSaturated)
            }
            Err(SendTimeoutError::Closed(_job)) => {
                warn!(message_id = %message_id, "Worker pool closed, rejecting message");
                Submission::Rejected(RejectReason::PoolClosed)
            }
        }
    }

    /// Submit and wait for the final outcome
    pub async fn delegate(&self, message: Message) -> DeliveryOutcome {
        self.submit(message).await.outcome().await
    }

    pub fn stats(&self) -> PoolStats {
        let workers_alive = self
            .workers
            .lock()
            .map(|workers| workers.iter().filter(|w| !w.is_finished()).count())
            .unwrap_or(0);

        PoolStats {
            max_workers: self.max_workers,
            max_queue_depth: self.max_queue_depth,
            queued: self.sender.max_capacity() - self.sender.capacity(),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            workers_alive,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.admission.is_closed()
    }

    /// Stop admitting work and tear the pool down
    ///
    /// Waits up to `timeout` for in-flight work to finish (permits are handed
    /// out in FIFO order, so this queues behind already waiting submitters).
    /// Returns false if work was still running when the timeout expired; that
    /// work is abandoned.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let total = (self.max_workers + self.max_queue_depth) as u32;

        let drained = match tokio::time::timeout(timeout, self.admission.acquire_many(total)).await
        {
            Ok(Ok(_all_permits)) => true,
            Ok(Err(_closed)) => true,
            Err(_elapsed) => false,
        };
        self.admission.close();

        let workers = self
            .workers
            .lock()
            .map(|mut workers| std::mem::take(&mut *workers))
            .unwrap_or_default();
        for worker in workers {
            worker.abort();
        }

        if drained {
            info!("Worker pool drained and stopped");
        } else {
            warn!(
                in_flight = self.in_flight.load(Ordering::SeqCst),
                "Worker pool stopped with work still in flight"
            );
        }
        drained
    }
}

async fn pool_worker(
    index: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<DelegatedJob>>>,
    task: Arc<dyn WorkerTask>,
) {
    debug!(worker = index, "Pool worker started");
    loop {
        let job = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };
        let Some(job) = job else {
            break;
        };
        run_job(task.as_ref(), job).await;
    }
    debug!(worker = index, "Pool worker stopped");
}

async fn run_job(task: &dyn WorkerTask, job: DelegatedJob) {
    let DelegatedJob {
        message,
        reply,
        admission,
    } = job;

    debug!(message_id = %message.id, "Starting worker task");

    let outcome = match execute_guarded_async(task.process(&message.body, &message.id)).await {
        PanicGuardResult::Success(Ok(())) => DeliveryOutcome::Delivered,
        PanicGuardResult::Success(Err(e)) => {
            warn!(message_id = %message.id, error = %e, "Worker task failed");
            DeliveryOutcome::Failed(FailureReason::Task(e))
        }
        PanicGuardResult::Panicked(msg) => DeliveryOutcome::Failed(FailureReason::Panicked(msg)),
    };

    info!(
        message_id = %message.id,
        outcome = outcome.as_str(),
        "Finished worker task"
    );

    // Free the slot before reporting so the submitter can immediately reuse it
    drop(admission);
    // The submitter may have gone away; the outcome is then only logged
    let _ = reply.send(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DeliveryError, ReceiptHandle};
    use crate::port::worker_task::mocks::{MockBehavior, MockWorkerTask};
    use std::time::Instant;

    fn message(n: usize) -> Message {
        Message::new(
            format!("msg-{}", n),
            format!("{{\"n\":{}}}", n),
            ReceiptHandle::new(format!("receipt-{}", n)),
        )
    }

    async fn wait_until(what: &str, condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_queue_depth_is_ratio_times_workers() {
        let task = Arc::new(MockWorkerTask::new_success());

        let delegator = MessageDelegator::new(3, 1.5, task.clone()).unwrap();
        assert_eq!(delegator.max_workers(), 3);
        assert_eq!(delegator.max_queue_depth(), 5); // ceil(4.5)

        let delegator = MessageDelegator::new(4, 1.0, task).unwrap();
        assert_eq!(delegator.max_queue_depth(), 4);
        assert_eq!(delegator.stats().workers_alive, 4);
    }

    #[tokio::test]
    async fn test_invalid_pool_parameters() {
        let task: Arc<dyn WorkerTask> = Arc::new(MockWorkerTask::new_success());

        assert!(MessageDelegator::new(0, 1.0, task.clone()).is_err());
        assert!(MessageDelegator::new(2, 0.0, task.clone()).is_err());
        assert!(MessageDelegator::new(2, -1.0, task.clone()).is_err());
        assert!(MessageDelegator::new(2, f64::NAN, task).is_err());
    }

    #[tokio::test]
    async fn test_successful_task_is_delivered() {
        let task = Arc::new(MockWorkerTask::new_success());
        let delegator = MessageDelegator::new(2, 1.0, task.clone()).unwrap();

        let Submission::Accepted(pending) = delegator.submit(message(1)).await else {
            panic!("idle pool must accept");
        };
        assert_eq!(pending.message_id(), "msg-1");
        let outcome = pending.outcome().await;

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert_eq!(task.calls(), vec!["msg-1".to_string()]);
        assert_eq!(delegator.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_failed_task_is_not_deletable() {
        let task = Arc::new(MockWorkerTask::new_fail(DeliveryError::Status(502)));
        let delegator = MessageDelegator::new(1, 1.0, task).unwrap();

        let outcome = delegator.delegate(message(1)).await;

        assert_eq!(
            outcome,
            DeliveryOutcome::Failed(FailureReason::Task(DeliveryError::Status(502)))
        );
        assert!(!outcome.should_delete());
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_kill_worker() {
        let task = Arc::new(MockWorkerTask::new_panic_inducing("sink exploded"));
        let delegator = MessageDelegator::new(1, 1.0, task.clone()).unwrap();

        let outcome = delegator.delegate(message(1)).await;
        assert_eq!(
            outcome,
            DeliveryOutcome::Failed(FailureReason::Panicked("sink exploded".into()))
        );

        // The single worker must still be serving
        task.set_behavior(MockBehavior::Success);
        let outcome = delegator.delegate(message(2)).await;
        assert_eq!(outcome, DeliveryOutcome::Delivered);
        assert_eq!(delegator.stats().workers_alive, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_admission_blocks_beyond_workers_plus_queue() {
        // 2 workers, depth 2: 2 running + 2 queued admitted, the 5th waits
        let task = Arc::new(MockWorkerTask::gated());
        let delegator = Arc::new(MessageDelegator::new(2, 1.0, task.clone()).unwrap());
        let admitted = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for n in 0..5 {
            let delegator = Arc::clone(&delegator);
            let admitted = Arc::clone(&admitted);
            handles.push(tokio::spawn(async move {
                let submission = delegator.submit(message(n)).await;
                assert!(submission.is_accepted(), "submission {} was rejected", n);
                admitted.fetch_add(1, Ordering::SeqCst);
                submission.outcome().await
            }));
        }

        wait_until("two running tasks", || task.running() == 2).await;
        wait_until("four admissions", || admitted.load(Ordering::SeqCst) == 4).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(admitted.load(Ordering::SeqCst), 4, "fifth submission must block");
        assert_eq!(task.max_running(), 2);
        let stats = delegator.stats();
        assert!(stats.queued <= stats.max_queue_depth);
        assert_eq!(stats.in_flight, 4);

        task.release(5);
        for handle in handles {
            assert_eq!(handle.await.unwrap(), DeliveryOutcome::Delivered);
        }
        assert_eq!(task.call_count(), 5);
        assert_eq!(task.max_running(), 2);
        assert_eq!(delegator.stats().in_flight, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_queue_depth_never_exceeds_limit() {
        let task = Arc::new(MockWorkerTask::new_success());
        let delegator = Arc::new(MessageDelegator::new(3, 1.0, task.clone()).unwrap());
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let sampler = {
            let delegator = Arc::clone(&delegator);
            let done = Arc::clone(&done);
            tokio::spawn(async move {
                let mut max_seen = 0;
                while !done.load(Ordering::SeqCst) {
                    let stats = delegator.stats();
                    assert!(stats.queued <= stats.max_queue_depth);
                    max_seen = max_seen.max(stats.queued);
                    tokio::task::yield_now().await;
                }
                max_seen
            })
        };

        let mut handles = Vec::new();
        for n in 0..200 {
            let delegator = Arc::clone(&delegator);
            handles.push(tokio::spawn(async move { delegator.delegate(message(n)).await }));
        }
        for handle in handles {
            let outcome = handle.await.unwrap();
            assert!(matches!(
                outcome,
                DeliveryOutcome::Delivered | DeliveryOutcome::Rejected(RejectReason::PoolSaturated)
            ));
        }
        done.store(true, Ordering::SeqCst);

        let max_seen = sampler.await.unwrap();
        assert!(max_seen <= 3);
        assert_eq!(delegator.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_closed_pool_rejects() {
        let task = Arc::new(MockWorkerTask::new_success());
        let delegator = MessageDelegator::new(2, 1.0, task.clone()).unwrap();

        assert!(delegator.shutdown(Duration::from_secs(1)).await);
        assert!(delegator.is_closed());

        let outcome = delegator.delegate(message(1)).await;
        assert_eq!(outcome, DeliveryOutcome::Rejected(RejectReason::PoolClosed));
        assert_eq!(task.call_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_timeout_abandons_running_work() {
        let task = Arc::new(MockWorkerTask::gated());
        let delegator = MessageDelegator::new(1, 1.0, task.clone()).unwrap();

        let Submission::Accepted(pending) = delegator.submit(message(1)).await else {
            panic!("expected admission");
        };
        wait_until("task running", || task.running() == 1).await;

        assert!(!delegator.shutdown(Duration::from_millis(50)).await);
        assert_eq!(
            pending.outcome().await,
            DeliveryOutcome::Failed(FailureReason::Abandoned)
        );
    }
}
