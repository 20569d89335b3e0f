//! QueueController - polling loops for one queue
//!
//! Each polling loop: gate on the maintenance window, long-poll the queue,
//! submit every received message to the shared delegator. A message is
//! deleted only once its delivery outcome is `Delivered`; anything else is
//! left on the queue for redelivery after the visibility timeout.

use crate::application::constants::{
    CONTROLLER_STOP_TIMEOUT, FLAG_STORE_RETRY_INTERVAL, MAINTENANCE_RECHECK_INTERVAL,
    RECEIVE_ERROR_BACKOFF,
};
use crate::application::delegator::{MessageDelegator, Submission};
use crate::application::shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
use crate::domain::{
    DeliveryOutcome, MaintenanceWindowSpec, Message, QueueDescriptor, QueueRef, ReceiptHandle,
};
use crate::error::{AppError, Result};
use crate::port::{FlagStore, QueueTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Timing knobs for polling loops
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Sleep between flag checks while the maintenance window is open
    pub maintenance_recheck_interval: Duration,
    /// Sleep before re-checking when the flag store fails
    pub flag_store_retry_interval: Duration,
    /// Sleep after a failed receive (zero retries immediately)
    pub receive_error_backoff: Duration,
    /// How long `stop` waits before aborting polling loops
    pub stop_timeout: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            maintenance_recheck_interval: MAINTENANCE_RECHECK_INTERVAL,
            flag_store_retry_interval: FLAG_STORE_RETRY_INTERVAL,
            receive_error_backoff: RECEIVE_ERROR_BACKOFF,
            stop_timeout: CONTROLLER_STOP_TIMEOUT,
        }
    }
}

#[derive(Clone)]
struct MaintenanceGate {
    spec: MaintenanceWindowSpec,
    store: Arc<dyn FlagStore>,
}

/// State shared by the polling loops of one controller
struct PollingContext {
    queue: QueueRef,
    transport: Arc<dyn QueueTransport>,
    delegator: Arc<MessageDelegator>,
    gate: Option<MaintenanceGate>,
    settings: ControllerSettings,
    acknowledgements: TaskTracker,
}

/// Owns the polling loops bound to one queue
pub struct QueueController {
    descriptor: QueueDescriptor,
    transport: Arc<dyn QueueTransport>,
    delegator: Arc<MessageDelegator>,
    maintenance_window: Option<MaintenanceWindowSpec>,
    gate: Option<MaintenanceGate>,
    settings: ControllerSettings,
    context: Option<Arc<PollingContext>>,
    handles: Vec<JoinHandle<()>>,
    shutdown: ShutdownSender,
}

impl QueueController {
    /// Create a controller (not started)
    ///
    /// Maintenance gating applies when the queue name matches the maintenance
    /// window pattern and a flag store is available.
    pub fn new(
        descriptor: QueueDescriptor,
        transport: Arc<dyn QueueTransport>,
        delegator: Arc<MessageDelegator>,
        flag_store: Option<Arc<dyn FlagStore>>,
        settings: ControllerSettings,
    ) -> Self {
        let maintenance_window = MaintenanceWindowSpec::from_queue_name(&descriptor.name);
        let gate = match (&maintenance_window, flag_store) {
            (Some(spec), Some(store)) => Some(MaintenanceGate {
                spec: spec.clone(),
                store,
            }),
            (Some(spec), None) => {
                warn!(
                    queue = %descriptor.name,
                    flag_key = %spec.flag_key,
                    "Queue has a maintenance window but no flag store is configured, gating disabled"
                );
                None
            }
            (None, _) => None,
        };
        let (shutdown, _token) = shutdown_channel();

        Self {
            descriptor,
            transport,
            delegator,
            maintenance_window,
            gate,
            settings,
            context: None,
            handles: Vec::new(),
            shutdown,
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &QueueDescriptor {
        &self.descriptor
    }

    pub fn maintenance_window(&self) -> Option<&MaintenanceWindowSpec> {
        self.maintenance_window.as_ref()
    }

    pub fn is_gated(&self) -> bool {
        self.gate.is_some()
    }

    /// Resolve the queue and launch the polling loops
    ///
    /// Non-blocking: returns once the loops are spawned.
    ///
    /// # Errors
    /// - AppError::Transport if the queue cannot be resolved
    /// - AppError::Validation if the controller was already started
    pub async fn start(&mut self) -> Result<()> {
        if self.context.is_some() {
            return Err(AppError::Validation(format!(
                "controller for {} already started",
                self.descriptor.name
            )));
        }

        let queue = self.transport.resolve(&self.descriptor.name).await?;
        info!(
            queue = %queue.name,
            url = %queue.url,
            polling_threads = self.descriptor.polling_threads,
            gated = self.gate.is_some(),
            "Starting polling loops"
        );

        let context = Arc::new(PollingContext {
            queue,
            transport: Arc::clone(&self.transport),
            delegator: Arc::clone(&self.delegator),
            gate: self.gate.clone(),
            settings: self.settings.clone(),
            acknowledgements: TaskTracker::new(),
        });

        self.handles = (0..self.descriptor.polling_threads)
            .map(|index| {
                tokio::spawn(poll_loop(
                    Arc::clone(&context),
                    index,
                    self.shutdown.subscribe(),
                ))
            })
            .collect();
        self.context = Some(context);

        Ok(())
    }

    /// True iff the controller was started and every polling loop is still running
    pub fn all_threads_alive(&self) -> bool {
        !self.handles.is_empty() && self.handles.iter().all(|h| !h.is_finished())
    }

    /// Wait until every polling loop has exited
    ///
    /// Cancel-safe: a handle is only removed once it has resolved, so `stop`
    /// can still abort the remaining loops after an interrupted join.
    pub async fn join(&mut self) {
        while let Some(handle) = self.handles.last_mut() {
            let result = handle.await;
            self.handles.pop();
            if let Err(e) = result {
                error!(queue = %self.descriptor.name, error = %e, "Polling loop terminated abnormally");
            }
        }
    }

    /// Request shutdown and wait for the polling loops
    ///
    /// Loops still running after the stop timeout are aborted. Deliveries that
    /// are already in the pool keep running; their acknowledgements are
    /// awaited within the same deadline.
    pub async fn stop(&mut self) {
        self.shutdown.shutdown();
        let deadline = Instant::now() + self.settings.stop_timeout;

        for handle in self.handles.drain(..) {
            let abort = handle.abort_handle();
            if tokio::time::timeout_at(deadline, handle).await.is_err() {
                warn!(queue = %self.descriptor.name, "Polling loop did not stop in time, aborting");
                abort.abort();
            }
        }

        if let Some(context) = &self.context {
            context.acknowledgements.close();
            if tokio::time::timeout_at(deadline, context.acknowledgements.wait())
                .await
                .is_err()
            {
                warn!(
                    queue = %self.descriptor.name,
                    pending = context.acknowledgements.len(),
                    "Stopped with acknowledgements still pending"
                );
            }
        }

        info!(queue = %self.descriptor.name, "Controller stopped");
    }
}

impl PollingContext {
    /// Block while the maintenance window is open
    ///
    /// Returns false if shutdown was requested while waiting.
    async fn wait_for_maintenance_window(&self, shutdown: &mut ShutdownToken) -> bool {
        let Some(gate) = &self.gate else {
            return true;
        };

        loop {
            let pause = match gate.store.is_set(&gate.spec.flag_key).await {
                Ok(false) => return true,
                Ok(true) => {
                    info!(
                        queue = %self.queue.name,
                        window = %gate.spec.window_identifier,
                        recheck_secs = self.settings.maintenance_recheck_interval.as_secs(),
                        "Maintenance window is open, sleeping"
                    );
                    self.settings.maintenance_recheck_interval
                }
                // Fail closed: polling during an unknown window state is not allowed
                Err(e) => {
                    warn!(
                        queue = %self.queue.name,
                        flag_key = %gate.spec.flag_key,
                        error = %e,
                        "Cannot read maintenance flag, treating window as open"
                    );
                    self.settings.flag_store_retry_interval
                }
            };

            tokio::select! {
                _ = sleep(pause) => {}
                _ = shutdown.wait() => return false,
            }
        }
    }

    /// Submit one message; returns false if shutdown interrupted admission
    async fn dispatch(self: &Arc<Self>, message: Message, shutdown: &mut ShutdownToken) -> bool {
        let message_id = message.id.clone();
        let receipt = message.receipt_handle.clone();
        info!(queue = %self.queue.name, message_id = %message_id, "Received message");

        let submission = tokio::select! {
            submission = self.delegator.submit(message) => submission,
            _ = shutdown.wait() => {
                info!(
                    queue = %self.queue.name,
                    message_id = %message_id,
                    "Shutdown while waiting for admission, message left for redelivery"
                );
                return false;
            }
        };

        match submission {
            Submission::Rejected(reason) => {
                warn!(
                    queue = %self.queue.name,
                    message_id = %message_id,
                    reason = %reason,
                    "Message rejected by worker pool, left for redelivery"
                );
            }
            Submission::Accepted(pending) => {
                let context = Arc::clone(self);
                self.acknowledgements.spawn(async move {
                    let outcome = pending.outcome().await;
                    context.acknowledge(&message_id, &receipt, outcome).await;
                });
            }
        }
        true
    }

    async fn acknowledge(&self, message_id: &str, receipt: &ReceiptHandle, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Delivered => match self.transport.delete(&self.queue, receipt).await {
                Ok(()) => debug!(queue = %self.queue.name, message_id = %message_id, "Deleted message"),
                Err(e) => warn!(
                    queue = %self.queue.name,
                    message_id = %message_id,
                    error = %e,
                    "Failed to delete delivered message, it will be redelivered"
                ),
            },
            DeliveryOutcome::Failed(reason) => warn!(
                queue = %self.queue.name,
                message_id = %message_id,
                failure_kind = reason.kind(),
                reason = %reason,
                "Delivery failed, message left for redelivery"
            ),
            DeliveryOutcome::Rejected(reason) => warn!(
                queue = %self.queue.name,
                message_id = %message_id,
                reason = %reason,
                "Message rejected by worker pool, left for redelivery"
            ),
        }
    }
}

async fn poll_loop(context: Arc<PollingContext>, index: usize, mut shutdown: ShutdownToken) {
    info!(queue = %context.queue.name, worker = index, "Polling loop started");

    'polling: loop {
        if shutdown.is_shutdown() {
            break;
        }
        if !context.wait_for_maintenance_window(&mut shutdown).await {
            break;
        }

        debug!(queue = %context.queue.name, worker = index, "Polling queue for messages");
        let received = tokio::select! {
            received = context.transport.receive(&context.queue) => received,
            _ = shutdown.wait() => break,
        };

        let messages = match received {
            Ok(messages) => messages,
            Err(e) => {
                warn!(
                    queue = %context.queue.name,
                    worker = index,
                    error = %e,
                    "Error receiving messages"
                );
                if !context.settings.receive_error_backoff.is_zero() {
                    tokio::select! {
                        _ = sleep(context.settings.receive_error_backoff) => {}
                        _ = shutdown.wait() => break,
                    }
                }
                continue;
            }
        };

        for message in messages {
            if !context.dispatch(message, &mut shutdown).await {
                break 'polling;
            }
        }
    }

    info!(queue = %context.queue.name, worker = index, "Polling loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DeliveryError;
    use crate::port::flag_store::mocks::InMemoryFlagStore;
    use crate::port::queue_transport::mocks::InMemoryQueueTransport;
    use crate::port::worker_task::mocks::MockWorkerTask;

    fn fast_settings() -> ControllerSettings {
        ControllerSettings {
            maintenance_recheck_interval: Duration::from_millis(20),
            flag_store_retry_interval: Duration::from_millis(20),
            receive_error_backoff: Duration::from_millis(10),
            stop_timeout: Duration::from_secs(1),
        }
    }

    async fn wait_until(what: &str, condition: impl Fn() -> bool) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(std::time::Instant::now() < deadline, "timed out waiting for {}", what);
            sleep(Duration::from_millis(5)).await;
        }
    }

    struct Fixture {
        transport: Arc<InMemoryQueueTransport>,
        task: Arc<MockWorkerTask>,
        flags: Arc<InMemoryFlagStore>,
        delegator: Arc<MessageDelegator>,
    }

    impl Fixture {
        fn new(task: MockWorkerTask) -> Self {
            let task = Arc::new(task);
            Self {
                transport: Arc::new(InMemoryQueueTransport::new()),
                flags: Arc::new(InMemoryFlagStore::new()),
                delegator: Arc::new(MessageDelegator::new(2, 1.0, task.clone()).unwrap()),
                task,
            }
        }

        fn controller(&self, queue: &str, threads: usize) -> QueueController {
            self.transport.create_queue(queue);
            QueueController::new(
                QueueDescriptor::new(queue, threads),
                self.transport.clone(),
                self.delegator.clone(),
                Some(self.flags.clone()),
                fast_settings(),
            )
        }
    }

    #[tokio::test]
    async fn test_delivered_message_is_deleted_once() {
        let fx = Fixture::new(MockWorkerTask::new_success());
        let mut controller = fx.controller("internal-batch-jobs", 1);
        let id = fx.transport.push("internal-batch-jobs", "{\"hello\":1}");

        controller.start().await.unwrap();
        wait_until("delete", || fx.transport.deleted_count() == 1).await;
        sleep(Duration::from_millis(30)).await;
        controller.stop().await;

        let deleted = fx.transport.deleted();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].0, "internal-batch-jobs");
        assert_eq!(deleted[0].1, ReceiptHandle::new(format!("receipt-{}", id)));
        assert_eq!(fx.task.calls(), vec![id]);
    }

    #[tokio::test]
    async fn test_failed_message_is_not_deleted() {
        let fx = Fixture::new(MockWorkerTask::new_fail(DeliveryError::Status(500)));
        let mut controller = fx.controller("internal-batch-jobs", 1);
        fx.transport.push("internal-batch-jobs", "{}");

        controller.start().await.unwrap();
        wait_until("task invocation", || fx.task.completed() == 1).await;
        controller.stop().await;

        assert_eq!(fx.transport.deleted_count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_message_is_not_deleted() {
        let fx = Fixture::new(MockWorkerTask::new_success());
        assert!(fx.delegator.shutdown(Duration::from_secs(1)).await);
        let mut controller = fx.controller("internal-batch-jobs", 1);
        fx.transport.push("internal-batch-jobs", "{}");

        controller.start().await.unwrap();
        wait_until("message taken", || fx.transport.pending("internal-batch-jobs") == 0).await;
        sleep(Duration::from_millis(30)).await;
        controller.stop().await;

        assert_eq!(fx.task.call_count(), 0);
        assert_eq!(fx.transport.deleted_count(), 0);
    }

    #[tokio::test]
    async fn test_open_maintenance_window_blocks_polling() {
        let fx = Fixture::new(MockWorkerTask::new_success());
        let mut controller = fx.controller("prod-outbound-messages-acme", 2);
        assert!(controller.is_gated());
        assert_eq!(
            controller.maintenance_window().unwrap().flag_key,
            "prod::OutboundMessages::MaintenanceWindowOpen::acme"
        );

        fx.flags.set("prod::OutboundMessages::MaintenanceWindowOpen::acme");
        controller.start().await.unwrap();
        wait_until("flag re-checks", || fx.flags.reads() >= 4).await;
        assert_eq!(fx.transport.receive_calls(), 0);
        assert!(controller.all_threads_alive());

        fx.flags.clear("prod::OutboundMessages::MaintenanceWindowOpen::acme");
        wait_until("polling resumes", || fx.transport.receive_calls() > 0).await;
        controller.stop().await;
    }

    #[tokio::test]
    async fn test_flag_store_outage_keeps_queue_gated() {
        let fx = Fixture::new(MockWorkerTask::new_success());
        let mut controller = fx.controller("prod-outbound-messages-acme", 1);
        fx.flags.set_unavailable(true);

        controller.start().await.unwrap();
        wait_until("flag retries", || fx.flags.reads() >= 3).await;
        assert_eq!(fx.transport.receive_calls(), 0);

        fx.flags.set_unavailable(false);
        wait_until("polling resumes", || fx.transport.receive_calls() > 0).await;
        controller.stop().await;
    }

    #[tokio::test]
    async fn test_ungated_queue_ignores_flag_store() {
        let fx = Fixture::new(MockWorkerTask::new_success());
        let mut controller = fx.controller("internal-batch-jobs", 1);
        assert!(!controller.is_gated());
        assert!(controller.maintenance_window().is_none());
        fx.flags.set("internal::OutboundMessages::MaintenanceWindowOpen::batch-jobs");

        controller.start().await.unwrap();
        wait_until("polling", || fx.transport.receive_calls() > 0).await;
        controller.stop().await;

        assert_eq!(fx.flags.reads(), 0);
    }

    #[tokio::test]
    async fn test_receive_errors_do_not_kill_loops() {
        let fx = Fixture::new(MockWorkerTask::new_success());
        let mut controller = fx.controller("internal-batch-jobs", 2);
        fx.transport.set_fail_receive(true);

        controller.start().await.unwrap();
        wait_until("failed receives", || fx.transport.receive_calls() >= 4).await;
        assert!(controller.all_threads_alive());

        fx.transport.set_fail_receive(false);
        fx.transport.push("internal-batch-jobs", "{}");
        wait_until("delete", || fx.transport.deleted_count() == 1).await;
        controller.stop().await;
    }

    #[tokio::test]
    async fn test_receive_errors_retry_without_backoff_by_default() {
        let settings = ControllerSettings::default();
        assert_eq!(settings.receive_error_backoff, Duration::ZERO);

        let fx = Fixture::new(MockWorkerTask::new_success());
        fx.transport.create_queue("internal-batch-jobs");
        let mut controller = QueueController::new(
            QueueDescriptor::new("internal-batch-jobs", 1),
            fx.transport.clone(),
            fx.delegator.clone(),
            None,
            settings,
        );
        fx.transport.set_fail_receive(true);

        controller.start().await.unwrap();
        sleep(Duration::from_millis(500)).await;

        // each failed receive takes ~10ms in the mock, so no extra pause was added
        let calls = fx.transport.receive_calls();
        assert!(calls >= 10, "only {} receive attempts in 500ms", calls);
        assert!(controller.all_threads_alive());
        controller.stop().await;
    }

    #[tokio::test]
    async fn test_delete_failure_is_not_retried() {
        let fx = Fixture::new(MockWorkerTask::new_success());
        let mut controller = fx.controller("internal-batch-jobs", 2);
        fx.transport.set_fail_delete(true);
        let id = fx.transport.push("internal-batch-jobs", "{}");

        controller.start().await.unwrap();
        wait_until("delete attempt", || fx.transport.delete_calls() == 1).await;
        sleep(Duration::from_millis(80)).await;

        assert_eq!(fx.task.calls(), vec![id]);
        assert_eq!(fx.transport.delete_calls(), 1);
        assert_eq!(fx.transport.deleted_count(), 0);
        assert!(controller.all_threads_alive());
        controller.stop().await;
    }

    #[tokio::test]
    async fn test_every_message_of_a_batch_is_acknowledged() {
        let fx = Fixture::new(MockWorkerTask::new_success());
        let mut controller = fx.controller("internal-batch-jobs", 1);
        fx.transport.set_batch_size(2);
        for n in 0..5 {
            fx.transport.push("internal-batch-jobs", format!("{{\"n\":{}}}", n));
        }

        controller.start().await.unwrap();
        wait_until("all deletes", || fx.transport.deleted_count() == 5).await;
        controller.stop().await;

        assert!(fx.transport.receive_calls() >= 3);
        assert_eq!(fx.task.completed(), 5);
    }

    #[tokio::test]
    async fn test_dead_loop_marks_controller_unhealthy() {
        let fx = Fixture::new(MockWorkerTask::new_success());
        let mut controller = fx.controller("internal-batch-jobs", 2);
        assert!(!controller.all_threads_alive(), "not started yet");

        controller.start().await.unwrap();
        assert!(controller.all_threads_alive());

        fx.transport.set_panic_on_receive(true);
        wait_until("a loop to die", || !controller.all_threads_alive()).await;
        controller.stop().await;
    }

    #[tokio::test]
    async fn test_stop_ends_polling() {
        let fx = Fixture::new(MockWorkerTask::new_success());
        let mut controller = fx.controller("internal-batch-jobs", 3);

        controller.start().await.unwrap();
        wait_until("polling", || fx.transport.receive_calls() > 0).await;
        controller.stop().await;
        assert!(!controller.all_threads_alive());

        let calls = fx.transport.receive_calls();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(fx.transport.receive_calls(), calls);
    }

    #[tokio::test]
    async fn test_unknown_queue_fails_to_start() {
        let fx = Fixture::new(MockWorkerTask::new_success());
        let mut controller = QueueController::new(
            QueueDescriptor::new("missing-queue", 1),
            fx.transport.clone(),
            fx.delegator.clone(),
            None,
            fast_settings(),
        );

        assert_eq!(controller.descriptor(), &QueueDescriptor::new("missing-queue", 1));
        let result = controller.start().await;
        assert!(matches!(result, Err(AppError::Transport(_))));
        assert!(!controller.all_threads_alive());
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let fx = Fixture::new(MockWorkerTask::new_success());
        let mut controller = fx.controller("internal-batch-jobs", 1);

        controller.start().await.unwrap();
        assert!(matches!(controller.start().await, Err(AppError::Validation(_))));
        controller.stop().await;
    }
}
