//! Task worker: claims queued tasks and runs them on registered handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, Notify, RwLock};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use tuneflow_core::defaults::{
    EVENT_BUS_CAPACITY, TASK_MAX_CONCURRENT, TASK_POLL_INTERVAL_MS, TASK_TIMEOUT_SECS,
};
use tuneflow_core::{QueuedTask, Result, TaskKind, TaskQueue};

use crate::handler::{TaskContext, TaskHandler, TaskResult};

/// Configuration for the task worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds when the queue is empty.
    pub poll_interval_ms: u64,
    /// Maximum number of concurrent tasks.
    pub max_concurrent_tasks: usize,
    /// Per-task execution timeout in seconds.
    pub task_timeout_secs: u64,
    /// Whether to process tasks at all.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: TASK_POLL_INTERVAL_MS,
            max_concurrent_tasks: TASK_MAX_CONCURRENT,
            task_timeout_secs: TASK_TIMEOUT_SECS,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `TASK_WORKER_ENABLED` | `true` | Enable/disable task processing |
    /// | `TASK_MAX_CONCURRENT` | `4` | Max concurrent tasks |
    /// | `TASK_POLL_INTERVAL_MS` | `1000` | Polling interval when queue is empty |
    /// | `TASK_TIMEOUT_SECS` | `1800` | Per-task timeout |
    pub fn from_env() -> Self {
        let enabled = std::env::var("TASK_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent_tasks = std::env::var("TASK_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(TASK_MAX_CONCURRENT)
            .max(1);

        let poll_interval_ms = std::env::var("TASK_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(TASK_POLL_INTERVAL_MS);

        let task_timeout_secs = std::env::var("TASK_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(TASK_TIMEOUT_SECS);

        Self {
            poll_interval_ms,
            max_concurrent_tasks,
            task_timeout_secs,
            enabled,
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_tasks = max.max(1);
        self
    }

    pub fn with_task_timeout(mut self, secs: u64) -> Self {
        self.task_timeout_secs = secs;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the task worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    TaskStarted { task_id: Uuid, kind: TaskKind },
    TaskCompleted { task_id: Uuid, kind: TaskKind },
    /// The task failed and went back to the queue.
    TaskRetrying {
        task_id: Uuid,
        kind: TaskKind,
        error: String,
    },
    /// The task failed terminally.
    TaskFailed {
        task_id: Uuid,
        kind: TaskKind,
        error: String,
    },
    WorkerStarted,
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
    join: tokio::task::JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal shutdown and wait until in-flight tasks have finished.
    pub async fn stop(self) -> Result<()> {
        // The loop may already have exited (disabled worker).
        let _ = self.shutdown_tx.send(()).await;
        self.join
            .await
            .map_err(|e| tuneflow_core::Error::Internal(format!("Worker task failed: {}", e)))
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

type HandlerMap = Arc<RwLock<HashMap<TaskKind, Arc<dyn TaskHandler>>>>;

/// Worker that processes tasks from the queue.
pub struct TaskWorker {
    queue: Arc<dyn TaskQueue>,
    config: WorkerConfig,
    handlers: HandlerMap,
    event_tx: broadcast::Sender<WorkerEvent>,
    wake: Option<Arc<Notify>>,
}

impl TaskWorker {
    pub fn new(queue: Arc<dyn TaskQueue>, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            queue,
            config,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            wake: None,
        }
    }

    /// Wake the idle loop early when this notifier fires.
    pub fn with_wake(mut self, wake: Arc<Notify>) -> Self {
        self.wake = Some(wake);
        self
    }

    /// Register a handler for every kind it reports.
    pub async fn register_handler(&self, handler: Arc<dyn TaskHandler>) {
        let mut handlers = self.handlers.write().await;
        for kind in handler.task_kinds() {
            handlers.insert(kind, handler.clone());
            debug!(task_type = %kind, "Registered task handler");
        }
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        let join = tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
            join,
        }
    }

    /// Claim up to `max_concurrent_tasks` tasks, run them concurrently, and
    /// only sleep when the queue is empty.
    #[instrument(skip(self, shutdown_rx), fields(subsystem = "worker", component = "task_worker"))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Task worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_tasks,
            "Task worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let wake = self.wake.clone().unwrap_or_else(|| Arc::new(Notify::new()));

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Task worker received shutdown signal");
                break;
            }

            let mut claimed = 0;
            let mut running = tokio::task::JoinSet::new();

            for _ in 0..self.config.max_concurrent_tasks {
                match self.claim_task().await {
                    Some(task) => {
                        claimed += 1;
                        let runner = self.runner();
                        running.spawn(async move {
                            runner.execute_task(task).await;
                        });
                    }
                    None => break,
                }
            }

            if claimed == 0 {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Task worker received shutdown signal");
                        break;
                    }
                    _ = wake.notified() => {}
                    _ = sleep(poll_interval) => {}
                }
            } else {
                debug!(claimed, "Processing concurrent task batch");
                while let Some(result) = running.join_next().await {
                    if let Err(e) = result {
                        error!(error = ?e, "Task panicked");
                    }
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Task worker stopped");
    }

    async fn claim_task(&self) -> Option<QueuedTask> {
        let kinds: Vec<TaskKind> = {
            let handlers = self.handlers.read().await;
            handlers.keys().copied().collect()
        };
        if kinds.is_empty() {
            return None;
        }

        match self.queue.claim_next(&kinds).await {
            Ok(task) => task,
            Err(e) => {
                error!(error = %e, "Failed to claim task");
                None
            }
        }
    }

    fn runner(&self) -> TaskRunner {
        TaskRunner {
            queue: self.queue.clone(),
            handlers: self.handlers.clone(),
            event_tx: self.event_tx.clone(),
            timeout: Duration::from_secs(self.config.task_timeout_secs),
        }
    }

    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }
}

/// Everything a spawned task needs, detached from the worker.
struct TaskRunner {
    queue: Arc<dyn TaskQueue>,
    handlers: HandlerMap,
    event_tx: broadcast::Sender<WorkerEvent>,
    timeout: Duration,
}

impl TaskRunner {
    async fn execute_task(self, task: QueuedTask) {
        let start = Instant::now();
        let task_id = task.id;
        let kind = task.kind();

        info!(task_id = %task_id, task_type = %kind, retry = task.retry_count, "Processing task");
        let _ = self.event_tx.send(WorkerEvent::TaskStarted { task_id, kind });

        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(&kind).cloned()
        };

        let result = match handler {
            Some(handler) => {
                let snapshot = task.clone();
                match tokio::time::timeout(self.timeout, handler.execute(TaskContext::new(task)))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            task_id = %task_id,
                            task_type = %kind,
                            "Task exceeded timeout of {}s",
                            self.timeout.as_secs()
                        );
                        handler.on_timeout(&snapshot).await;
                        TaskResult::Failed(format!(
                            "Task exceeded timeout of {}s",
                            self.timeout.as_secs()
                        ))
                    }
                }
            }
            None => {
                warn!(task_type = %kind, "No handler registered for task type");
                TaskResult::Failed(format!("No handler for task type: {}", kind))
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match result {
            TaskResult::Success => {
                if let Err(e) = self.queue.complete(task_id).await {
                    error!(error = %e, task_id = %task_id, "Failed to mark task completed");
                    return;
                }
                info!(task_id = %task_id, task_type = %kind, duration_ms, "Task completed");
                let _ = self
                    .event_tx
                    .send(WorkerEvent::TaskCompleted { task_id, kind });
            }
            TaskResult::Retry(error) => {
                self.record_failure(task_id, kind, error, true, duration_ms)
                    .await
            }
            TaskResult::Failed(error) => {
                self.record_failure(task_id, kind, error, false, duration_ms)
                    .await
            }
        }
    }

    async fn record_failure(
        &self,
        task_id: Uuid,
        kind: TaskKind,
        error: String,
        retryable: bool,
        duration_ms: u64,
    ) {
        if let Err(e) = self.queue.fail(task_id, &error, retryable).await {
            error!(error = %e, task_id = %task_id, "Failed to record task failure");
            return;
        }

        let requeued = match self.queue.get(task_id).await {
            Ok(Some(t)) => t.status == tuneflow_core::TaskStatus::Pending,
            _ => false,
        };

        warn!(task_id = %task_id, task_type = %kind, %error, requeued, duration_ms, "Task failed");
        let event = if requeued {
            WorkerEvent::TaskRetrying {
                task_id,
                kind,
                error,
            }
        } else {
            WorkerEvent::TaskFailed {
                task_id,
                kind,
                error,
            }
        };
        let _ = self.event_tx.send(event);
    }
}
