//! Periodic triggers for the catalog sync tasks.
//!
//! Schedules are evaluated in UTC. A trigger only dispatches onto the task
//! queue; the worker does the actual work.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use tuneflow_core::{Result, Task, TaskDispatcher};

/// When a periodic task fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Every hour at the given minute.
    Hourly { minute: u32 },
    /// Every day at the given time.
    Daily { hour: u32, minute: u32 },
}

impl Schedule {
    /// First firing time strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let now = now.with_nanosecond(0).unwrap_or(now);
        match *self {
            Schedule::Hourly { minute } => {
                let candidate = now
                    .with_minute(minute.min(59))
                    .and_then(|t| t.with_second(0))
                    .unwrap_or(now);
                if candidate > now {
                    candidate
                } else {
                    candidate + chrono::Duration::hours(1)
                }
            }
            Schedule::Daily { hour, minute } => {
                let time = NaiveTime::from_hms_opt(hour.min(23), minute.min(59), 0)
                    .unwrap_or(NaiveTime::MIN);
                let candidate = now.date_naive().and_time(time).and_utc();
                if candidate > now {
                    candidate
                } else {
                    candidate + chrono::Duration::days(1)
                }
            }
        }
    }
}

/// A task dispatched on a schedule.
#[derive(Debug, Clone)]
pub struct PeriodicTask {
    pub name: &'static str,
    pub schedule: Schedule,
    pub task: Task,
}

/// The catalog refresh schedule.
pub fn default_schedule() -> Vec<PeriodicTask> {
    vec![
        PeriodicTask {
            name: "update_channel_videos",
            schedule: Schedule::Hourly { minute: 0 },
            task: Task::UpdateChannelVideos { date_after: None },
        },
        PeriodicTask {
            name: "update_subscriptions",
            schedule: Schedule::Daily {
                hour: 12,
                minute: 30,
            },
            task: Task::UpdateSubscriptions,
        },
        PeriodicTask {
            name: "update_video_categories",
            schedule: Schedule::Daily { hour: 0, minute: 0 },
            task: Task::UpdateVideoCategories,
        },
    ]
}

/// Handle for stopping a running scheduler.
pub struct SchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: tokio::task::JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the scheduler and wait for its loop to exit.
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown_tx.send(()).await;
        self.join.await.map_err(|e| {
            tuneflow_core::Error::Internal(format!("Scheduler task failed: {}", e))
        })
    }
}

/// Dispatches periodic tasks onto the queue.
pub struct Scheduler {
    tasks: Arc<dyn TaskDispatcher>,
    entries: Vec<PeriodicTask>,
}

impl Scheduler {
    pub fn new(tasks: Arc<dyn TaskDispatcher>, entries: Vec<PeriodicTask>) -> Self {
        Self { tasks, entries }
    }

    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let join = tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });
        SchedulerHandle { shutdown_tx, join }
    }

    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if self.entries.is_empty() {
            info!(subsystem = "worker", component = "scheduler", "No periodic tasks, not starting");
            return;
        }
        info!(
            subsystem = "worker",
            component = "scheduler",
            item_count = self.entries.len(),
            "Scheduler started"
        );

        let mut next: Vec<DateTime<Utc>> = {
            let now = Utc::now();
            self.entries.iter().map(|e| e.schedule.next_after(now)).collect()
        };

        loop {
            let due_at = next.iter().min().copied().unwrap_or_else(Utc::now);
            let wait = (due_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            debug!(?wait, "Scheduler sleeping until next trigger");

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(subsystem = "worker", component = "scheduler", "Scheduler received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(wait) => {
                    let now = Utc::now();
                    for (entry, at) in self.entries.iter().zip(next.iter_mut()) {
                        if *at <= now {
                            self.fire(entry).await;
                            *at = entry.schedule.next_after(now);
                        }
                    }
                }
            }
        }

        info!(subsystem = "worker", component = "scheduler", "Scheduler stopped");
    }

    async fn fire(&self, entry: &PeriodicTask) {
        match self.tasks.dispatch(entry.task.clone()).await {
            Ok(id) => info!(
                subsystem = "worker",
                component = "scheduler",
                task_id = %id,
                task_type = %entry.task.kind(),
                "Periodic task {} dispatched",
                entry.name
            ),
            Err(e) => error!(
                subsystem = "worker",
                component = "scheduler",
                error = %e,
                "Failed to dispatch periodic task {}",
                entry.name
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, h, m, s).unwrap()
    }

    #[test]
    fn test_hourly_fires_at_top_of_next_hour() {
        let schedule = Schedule::Hourly { minute: 0 };
        assert_eq!(schedule.next_after(at(10, 15, 3)), at(11, 0, 0));
        assert_eq!(schedule.next_after(at(10, 0, 0)), at(11, 0, 0));
        assert_eq!(schedule.next_after(at(23, 59, 59)), Utc.with_ymd_and_hms(2024, 5, 11, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_daily_fires_later_today_or_tomorrow() {
        let schedule = Schedule::Daily {
            hour: 12,
            minute: 30,
        };
        assert_eq!(schedule.next_after(at(9, 0, 0)), at(12, 30, 0));
        assert_eq!(
            schedule.next_after(at(12, 30, 0)),
            Utc.with_ymd_and_hms(2024, 5, 11, 12, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_default_schedule_covers_catalog_tasks() {
        let entries = default_schedule();
        let tasks: Vec<_> = entries.iter().map(|e| e.task.clone()).collect();
        assert_eq!(
            tasks,
            vec![
                Task::UpdateChannelVideos { date_after: None },
                Task::UpdateSubscriptions,
                Task::UpdateVideoCategories,
            ]
        );
        assert_eq!(entries[0].schedule, Schedule::Hourly { minute: 0 });
        assert_eq!(entries[2].schedule, Schedule::Daily { hour: 0, minute: 0 });
    }
}
