//! Units of work dispatched onto the task queue.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults::TASK_MAX_RETRIES;
use crate::Error;

/// A dispatchable task and its arguments.
///
/// `date_after` is a calendar date; a video published before midnight UTC of
/// that date is outside the sync window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    RunMusicJob {
        job_id: Uuid,
    },
    CleanupMusicJob {
        job_id: Uuid,
    },
    AddChannelVideos {
        channel_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        date_after: Option<NaiveDate>,
    },
    UpdateChannelVideos {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        date_after: Option<NaiveDate>,
    },
    UpdateUserSubscriptions {
        email: String,
    },
    UpdateSubscriptions,
    UpdateVideoCategories,
}

impl Task {
    pub fn kind(&self) -> TaskKind {
        match self {
            Task::RunMusicJob { .. } => TaskKind::RunMusicJob,
            Task::CleanupMusicJob { .. } => TaskKind::CleanupMusicJob,
            Task::AddChannelVideos { .. } => TaskKind::AddChannelVideos,
            Task::UpdateChannelVideos { .. } => TaskKind::UpdateChannelVideos,
            Task::UpdateUserSubscriptions { .. } => TaskKind::UpdateUserSubscriptions,
            Task::UpdateSubscriptions => TaskKind::UpdateSubscriptions,
            Task::UpdateVideoCategories => TaskKind::UpdateVideoCategories,
        }
    }

    /// Redelivery budget. A music job records its own terminal failure, so
    /// it is never redelivered.
    pub fn max_retries(&self) -> i32 {
        match self {
            Task::RunMusicJob { .. } => 0,
            _ => TASK_MAX_RETRIES,
        }
    }
}

/// Discriminant of [`Task`], stored alongside the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    RunMusicJob,
    CleanupMusicJob,
    AddChannelVideos,
    UpdateChannelVideos,
    UpdateUserSubscriptions,
    UpdateSubscriptions,
    UpdateVideoCategories,
}

impl TaskKind {
    pub const ALL: [TaskKind; 7] = [
        TaskKind::RunMusicJob,
        TaskKind::CleanupMusicJob,
        TaskKind::AddChannelVideos,
        TaskKind::UpdateChannelVideos,
        TaskKind::UpdateUserSubscriptions,
        TaskKind::UpdateSubscriptions,
        TaskKind::UpdateVideoCategories,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::RunMusicJob => "run_music_job",
            TaskKind::CleanupMusicJob => "cleanup_music_job",
            TaskKind::AddChannelVideos => "add_channel_videos",
            TaskKind::UpdateChannelVideos => "update_channel_videos",
            TaskKind::UpdateUserSubscriptions => "update_user_subscriptions",
            TaskKind::UpdateSubscriptions => "update_subscriptions",
            TaskKind::UpdateVideoCategories => "update_video_categories",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown task type: {}", s)))
    }
}

/// Queue state of a task row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(Error::InvalidInput(format!("Unknown task status: {}", other))),
        }
    }
}

/// A task as stored in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub id: Uuid,
    pub task: Task,
    pub status: TaskStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueuedTask {
    pub fn kind(&self) -> TaskKind {
        self.task.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_wire_format_is_tagged() {
        let task = Task::AddChannelVideos {
            channel_id: "UC1".into(),
            date_after: NaiveDate::from_ymd_opt(2024, 3, 9),
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["type"], "add_channel_videos");
        assert_eq!(json["channel_id"], "UC1");
        assert_eq!(json["date_after"], "2024-03-09");

        let back: Task = serde_json::from_value(json).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn test_unit_task_deserializes_from_type_only() {
        let task: Task = serde_json::from_str(r#"{"type":"update_subscriptions"}"#).unwrap();
        assert_eq!(task, Task::UpdateSubscriptions);
    }

    #[test]
    fn test_missing_date_after_defaults_to_none() {
        let task: Task =
            serde_json::from_str(r#"{"type":"add_channel_videos","channel_id":"UC1"}"#).unwrap();
        assert_eq!(
            task,
            Task::AddChannelVideos {
                channel_id: "UC1".into(),
                date_after: None
            }
        );
    }

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in TaskKind::ALL {
            assert_eq!(kind.as_str().parse::<TaskKind>().unwrap(), kind);
        }
        assert!("bogus".parse::<TaskKind>().is_err());
    }

    #[test]
    fn test_music_jobs_are_not_redelivered() {
        let run = Task::RunMusicJob { job_id: Uuid::nil() };
        assert_eq!(run.max_retries(), 0);
        assert_eq!(Task::UpdateVideoCategories.max_retries(), TASK_MAX_RETRIES);
    }
}
