//! Task handlers: route queued tasks to the engines.

use async_trait::async_trait;
use tracing::warn;

use tuneflow_core::{Error, QueuedTask, Task, TaskKind};

use crate::catalog::CatalogSyncEngine;
use crate::intake::MusicJobIntake;
use crate::music::MusicJobEngine;

/// Context provided to task handlers.
pub struct TaskContext {
    /// The claimed task.
    pub task: QueuedTask,
}

impl TaskContext {
    pub fn new(task: QueuedTask) -> Self {
        Self { task }
    }

    pub fn kind(&self) -> TaskKind {
        self.task.kind()
    }

    /// Whether this delivery is a retry of an earlier failed attempt.
    pub fn is_retry(&self) -> bool {
        self.task.retry_count > 0
    }
}

/// Result of task execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    Success,
    /// Terminal failure; the task is not redelivered.
    Failed(String),
    /// The task is redelivered while its retry budget lasts.
    Retry(String),
}

impl TaskResult {
    /// Map an engine result onto a queue outcome.
    pub fn from_result(result: tuneflow_core::Result<impl Sized>) -> Self {
        match result {
            Ok(_) => TaskResult::Success,
            Err(e) => Self::from_error(&e),
        }
    }

    pub fn from_error(error: &Error) -> Self {
        if error.is_retryable() {
            TaskResult::Retry(error.to_string())
        } else {
            TaskResult::Failed(error.to_string())
        }
    }
}

/// Trait for task handlers.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// The task kinds this handler processes.
    fn task_kinds(&self) -> Vec<TaskKind>;

    /// Execute the task.
    async fn execute(&self, ctx: TaskContext) -> TaskResult;

    /// Called when the worker abandoned a task after its timeout.
    async fn on_timeout(&self, _task: &QueuedTask) {}
}

/// Runs and cleans up music jobs.
pub struct MusicTaskHandler {
    engine: MusicJobEngine,
    intake: MusicJobIntake,
}

impl MusicTaskHandler {
    pub fn new(engine: MusicJobEngine, intake: MusicJobIntake) -> Self {
        Self { engine, intake }
    }
}

#[async_trait]
impl TaskHandler for MusicTaskHandler {
    fn task_kinds(&self) -> Vec<TaskKind> {
        vec![TaskKind::RunMusicJob, TaskKind::CleanupMusicJob]
    }

    async fn execute(&self, ctx: TaskContext) -> TaskResult {
        match ctx.task.task {
            Task::RunMusicJob { job_id } => TaskResult::from_result(self.engine.execute(job_id).await),
            Task::CleanupMusicJob { job_id } => {
                TaskResult::from_result(self.intake.cleanup_music_job(job_id).await)
            }
            other => unsupported(&other),
        }
    }

    /// An abandoned run never reached its own failure handler.
    async fn on_timeout(&self, task: &QueuedTask) {
        if let Task::RunMusicJob { job_id } = task.task {
            self.engine.record_failure(job_id).await;
        }
    }
}

/// Runs the catalog sync procedures.
pub struct CatalogTaskHandler {
    engine: CatalogSyncEngine,
}

impl CatalogTaskHandler {
    pub fn new(engine: CatalogSyncEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskHandler for CatalogTaskHandler {
    fn task_kinds(&self) -> Vec<TaskKind> {
        vec![
            TaskKind::AddChannelVideos,
            TaskKind::UpdateChannelVideos,
            TaskKind::UpdateUserSubscriptions,
            TaskKind::UpdateSubscriptions,
            TaskKind::UpdateVideoCategories,
        ]
    }

    async fn execute(&self, ctx: TaskContext) -> TaskResult {
        match ctx.task.task {
            Task::AddChannelVideos {
                channel_id,
                date_after,
            } => TaskResult::from_result(
                self.engine
                    .add_channel_videos(&channel_id, date_after)
                    .await,
            ),
            Task::UpdateChannelVideos { date_after } => {
                TaskResult::from_result(self.engine.update_channel_videos(date_after).await)
            }
            Task::UpdateUserSubscriptions { email } => {
                TaskResult::from_result(self.engine.update_user_subscriptions(&email).await)
            }
            Task::UpdateSubscriptions => {
                TaskResult::from_result(self.engine.update_subscriptions().await)
            }
            Task::UpdateVideoCategories => {
                TaskResult::from_result(self.engine.update_video_categories().await)
            }
            other => unsupported(&other),
        }
    }
}

fn unsupported(task: &Task) -> TaskResult {
    warn!(task_type = %task.kind(), "Task routed to the wrong handler");
    TaskResult::Failed(format!("Unsupported task type: {}", task.kind()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_retryable_errors_map_to_retry() {
        let result = TaskResult::from_error(&Error::Request("connection reset".into()));
        assert!(matches!(result, TaskResult::Retry(_)));
    }

    #[test]
    fn test_fatal_errors_map_to_failed() {
        let result = TaskResult::from_error(&Error::JobNotFound(Uuid::nil()));
        assert_eq!(
            result,
            TaskResult::Failed(format!("Music job not found: {}", Uuid::nil()))
        );
        let result = TaskResult::from_error(&Error::MirrorFailed("HTTP 401".into()));
        assert!(matches!(result, TaskResult::Failed(_)));
    }

    #[test]
    fn test_ok_maps_to_success() {
        assert_eq!(TaskResult::from_result(Ok(3usize)), TaskResult::Success);
    }
}
