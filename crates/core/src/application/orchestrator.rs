//! Orchestrator - turns configuration into a running fleet of queue controllers
//!
//! Static mode starts every enabled queue once and blocks until the
//! controllers exit or shutdown is requested. Refresh mode reloads the
//! configuration on an interval, starts controllers for new queues, and
//! replaces controllers whose polling loops died.

use crate::application::constants::{DEFAULT_WAITING_TASKS_RATIO, POOL_DRAIN_TIMEOUT};
use crate::application::controller::{ControllerSettings, QueueController};
use crate::application::delegator::MessageDelegator;
use crate::application::registry::WorkerTaskRegistry;
use crate::application::shutdown::ShutdownToken;
use crate::domain::{PollerConfig, QueueDescriptor, WorkerConfig};
use crate::error::Result;
use crate::port::{ConfigSource, FlagStore, QueueTransport};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Health of a queue's controller as seen by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerHealth {
    /// No controller registered for the queue
    Absent,
    Running,
    /// At least one polling loop has exited
    Unhealthy,
}

/// Counters for one refresh cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    /// Controllers created for queues that had none
    pub started: usize,
    /// Unhealthy controllers replaced by a new one
    pub restarted: usize,
    /// Controllers left untouched
    pub healthy: usize,
    /// Queues configured with zero polling threads
    pub disabled: usize,
    /// Controllers that could not be started (retried next cycle)
    pub failed: usize,
}

/// Sum of polling threads across enabled queues
pub fn total_polling_threads(queues: &[QueueDescriptor]) -> usize {
    queues.iter().map(|q| q.polling_threads).sum()
}

pub struct Orchestrator {
    transport: Arc<dyn QueueTransport>,
    flag_store: Option<Arc<dyn FlagStore>>,
    registry: WorkerTaskRegistry,
    settings: ControllerSettings,
    /// Queue name -> current controller (entries are replaced, never merged)
    controllers: HashMap<String, QueueController>,
    delegator: Option<Arc<MessageDelegator>>,
}

impl Orchestrator {
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        flag_store: Option<Arc<dyn FlagStore>>,
        registry: WorkerTaskRegistry,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            transport,
            flag_store,
            registry,
            settings,
            controllers: HashMap::new(),
            delegator: None,
        }
    }

    /// Build the shared worker pool
    ///
    /// Concurrency is `worker_config.concurrency` when set, otherwise the
    /// total number of polling threads.
    ///
    /// # Errors
    /// - AppError::Config if `worker_class` is unknown or its settings are invalid
    /// - AppError::Domain if the resolved concurrency is 0 or the ratio is not positive
    pub fn initialize_worker_pool(
        &mut self,
        worker_config: &WorkerConfig,
        total_polling_threads: usize,
    ) -> Result<Arc<MessageDelegator>> {
        let concurrency = worker_config.concurrency.unwrap_or(total_polling_threads);
        let ratio = worker_config
            .waiting_tasks_ratio
            .unwrap_or(DEFAULT_WAITING_TASKS_RATIO);
        let task = self.registry.build(worker_config)?;

        let delegator = Arc::new(MessageDelegator::new(concurrency, ratio, task)?);
        info!(
            worker_class = %worker_config.worker_class,
            concurrency = concurrency,
            waiting_tasks_ratio = ratio,
            max_queue_depth = delegator.max_queue_depth(),
            "Worker pool initialized"
        );

        self.delegator = Some(Arc::clone(&delegator));
        Ok(delegator)
    }

    /// Start a controller for every enabled queue
    ///
    /// Returns the number of controllers started.
    ///
    /// # Errors
    /// - AppError::Transport if a queue cannot be resolved (nothing is rolled back)
    pub async fn start_all(
        &mut self,
        queues: &[QueueDescriptor],
        delegator: &Arc<MessageDelegator>,
    ) -> Result<usize> {
        let mut started = 0;
        for descriptor in queues {
            if !descriptor.is_enabled() {
                info!(queue = %descriptor.name, "Queue disabled (0 polling threads), skipping");
                continue;
            }
            let mut controller = self.build_controller(descriptor, delegator);
            controller.start().await?;
            self.controllers.insert(descriptor.name.clone(), controller);
            started += 1;
        }
        Ok(started)
    }

    /// Converge the running controllers with `queues`
    ///
    /// Healthy controllers are left alone, missing ones are started and
    /// unhealthy ones are stopped and replaced. Controllers of queues absent
    /// from `queues` are not touched.
    pub async fn refresh_cycle(
        &mut self,
        queues: &[QueueDescriptor],
        delegator: &Arc<MessageDelegator>,
    ) -> RefreshReport {
        let mut report = RefreshReport::default();

        for descriptor in queues {
            if !descriptor.is_enabled() {
                report.disabled += 1;
                continue;
            }

            let restarting = match self.health(&descriptor.name) {
                ControllerHealth::Running => {
                    report.healthy += 1;
                    continue;
                }
                ControllerHealth::Absent => false,
                ControllerHealth::Unhealthy => {
                    warn!(queue = %descriptor.name, "Controller unhealthy, replacing");
                    if let Some(mut stale) = self.controllers.remove(&descriptor.name) {
                        stale.stop().await;
                    }
                    true
                }
            };

            let mut controller = self.build_controller(descriptor, delegator);
            match controller.start().await {
                Ok(()) => {
                    self.controllers.insert(descriptor.name.clone(), controller);
                    if restarting {
                        report.restarted += 1;
                    } else {
                        report.started += 1;
                    }
                }
                Err(e) => {
                    error!(queue = %descriptor.name, error = %e, "Failed to start controller, will retry");
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Start every queue of `group` once and block until the controllers exit
    /// or shutdown is requested
    ///
    /// # Errors
    /// - AppError::Domain if the group is missing or the pool cannot be sized
    /// - AppError::Config if the worker class is unknown
    /// - AppError::Transport if a queue cannot be resolved
    pub async fn run_static(
        &mut self,
        config: &PollerConfig,
        group: &str,
        mut shutdown: ShutdownToken,
    ) -> Result<()> {
        let queues = config.queue_group(group)?;
        let delegator = self.initialize_worker_pool(
            &config.worker_configuration,
            total_polling_threads(&queues),
        )?;

        let started = match self.start_all(&queues, &delegator).await {
            Ok(started) => started,
            Err(e) => {
                self.shutdown(POOL_DRAIN_TIMEOUT).await;
                return Err(e);
            }
        };
        info!(group = %group, controllers = started, "All controllers started");

        let interrupted = {
            let all_joined = futures::future::join_all(
                self.controllers.values_mut().map(|controller| controller.join()),
            );
            tokio::select! {
                _ = all_joined => false,
                _ = shutdown.wait() => true,
            }
        };
        if interrupted {
            info!("Shutdown requested");
        } else {
            warn!("All polling loops exited");
        }

        self.shutdown(POOL_DRAIN_TIMEOUT).await;
        Ok(())
    }

    /// Start `group` from `source` and keep it converged until shutdown
    ///
    /// The initial load is fatal on error. A failed reload is logged and the
    /// previous queue set is kept. The worker pool is sized once; later
    /// changes to `worker_configuration` are ignored.
    pub async fn start_all_with_refresh(
        &mut self,
        source: &dyn ConfigSource,
        group: &str,
        refresh_interval: Duration,
        mut shutdown: ShutdownToken,
    ) -> Result<()> {
        let config = source.load().await?;
        let mut queues = config.queue_group(group)?;
        let worker_config = config.worker_configuration;
        let delegator =
            self.initialize_worker_pool(&worker_config, total_polling_threads(&queues))?;

        info!(
            source = %source.describe(),
            group = %group,
            refresh_secs = refresh_interval.as_secs(),
            "Starting controllers with periodic refresh"
        );

        loop {
            let report = self.refresh_cycle(&queues, &delegator).await;
            info!(
                started = report.started,
                restarted = report.restarted,
                healthy = report.healthy,
                disabled = report.disabled,
                failed = report.failed,
                "Refresh cycle complete"
            );

            tokio::select! {
                _ = tokio::time::sleep(refresh_interval) => {}
                _ = shutdown.wait() => break,
            }

            match source.load().await {
                Ok(config) => match config.queue_group(group) {
                    Ok(reloaded) => {
                        if config.worker_configuration != worker_config {
                            warn!("worker_configuration changed, restart required to apply it");
                        }
                        queues = reloaded;
                    }
                    Err(e) => warn!(error = %e, "Reloaded configuration unusable, keeping previous queues"),
                },
                Err(e) => warn!(error = %e, "Configuration reload failed, keeping previous queues"),
            }
        }

        info!("Shutdown requested");
        self.shutdown(POOL_DRAIN_TIMEOUT).await;
        Ok(())
    }

    pub fn health(&self, queue: &str) -> ControllerHealth {
        match self.controllers.get(queue) {
            None => ControllerHealth::Absent,
            Some(controller) if controller.all_threads_alive() => ControllerHealth::Running,
            Some(_) => ControllerHealth::Unhealthy,
        }
    }

    pub fn controller_count(&self) -> usize {
        self.controllers.len()
    }

    /// Registered queue names, sorted
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.controllers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Stop every controller, then drain the worker pool
    pub async fn shutdown(&mut self, timeout: Duration) {
        futures::future::join_all(
            self.controllers
                .values_mut()
                .map(|controller| controller.stop()),
        )
        .await;
        self.controllers.clear();

        if let Some(delegator) = self.delegator.take() {
            delegator.shutdown(timeout).await;
        }
    }

    fn build_controller(
        &self,
        descriptor: &QueueDescriptor,
        delegator: &Arc<MessageDelegator>,
    ) -> QueueController {
        QueueController::new(
            descriptor.clone(),
            Arc::clone(&self.transport),
            Arc::clone(delegator),
            self.flag_store.clone(),
            self.settings.clone(),
        )
    }
}
