//! Durable task queue on PostgreSQL.
//!
//! Workers claim with `FOR UPDATE SKIP LOCKED`, so any number of worker
//! processes can share one queue without double delivery of a claim.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

use tuneflow_core::{
    Error, QueuedTask, Result, Task, TaskDispatcher, TaskKind, TaskQueue, TaskStatus,
};

/// PostgreSQL implementation of TaskQueue.
#[derive(Clone)]
pub struct PgTaskQueue {
    pool: Pool<Postgres>,
    notify: Arc<Notify>,
}

impl PgTaskQueue {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            pool,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Notified whenever this process enqueues a task, so a local worker can
    /// wake before its poll interval elapses.
    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> Result<QueuedTask> {
        let payload: serde_json::Value = row.get("payload");
        let status: String = row.get("status");
        Ok(QueuedTask {
            id: row.get("id"),
            task: serde_json::from_value(payload)?,
            status: TaskStatus::from_str(&status)?,
            retry_count: row.get("retry_count"),
            max_retries: row.get("max_retries"),
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        })
    }
}

#[async_trait]
impl TaskDispatcher for PgTaskQueue {
    async fn dispatch(&self, task: Task) -> Result<Uuid> {
        let id = Uuid::now_v7();
        let kind = task.kind();
        let payload = serde_json::to_value(&task)?;

        sqlx::query(
            "INSERT INTO task_queue (id, task_type, payload, status, max_retries, created_at)
             VALUES ($1, $2, $3, 'pending', $4, $5)",
        )
        .bind(id)
        .bind(kind.as_str())
        .bind(&payload)
        .bind(task.max_retries())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "task_queue",
            op = "dispatch",
            task_id = %id,
            task_type = %kind,
            "Task queued"
        );
        self.notify.notify_waiters();
        Ok(id)
    }
}

#[async_trait]
impl TaskQueue for PgTaskQueue {
    async fn claim_next(&self, kinds: &[TaskKind]) -> Result<Option<QueuedTask>> {
        let kind_strings: Vec<String> = kinds.iter().map(|k| k.as_str().to_string()).collect();

        // Filter by type before locking; empty array claims any type.
        let row = sqlx::query(
            "UPDATE task_queue
             SET status = 'running', started_at = $1
             WHERE id = (
                 SELECT id FROM task_queue
                 WHERE status = 'pending'
                   AND (cardinality($2::text[]) = 0 OR task_type = ANY($2))
                 ORDER BY created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, payload, status, retry_count, max_retries, error_message,
                       created_at, started_at, completed_at",
        )
        .bind(Utc::now())
        .bind(&kind_strings)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_row).transpose()
    }

    async fn complete(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE task_queue SET status = 'completed', completed_at = $1, error_message = NULL
             WHERE id = $2",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn fail(&self, id: Uuid, error: &str, retryable: bool) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let (retry_count, max_retries): (i32, i32) =
            sqlx::query_as("SELECT retry_count, max_retries FROM task_queue WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .map_err(Error::Database)?;

        if retryable && retry_count < max_retries {
            sqlx::query(
                "UPDATE task_queue
                 SET status = 'pending', retry_count = $1, error_message = $2, started_at = NULL
                 WHERE id = $3",
            )
            .bind(retry_count + 1)
            .bind(error)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        } else {
            sqlx::query(
                "UPDATE task_queue SET status = 'failed', completed_at = $1, error_message = $2
                 WHERE id = $3",
            )
            .bind(Utc::now())
            .bind(error)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<QueuedTask>> {
        let row = sqlx::query(
            "SELECT id, payload, status, retry_count, max_retries, error_message,
                    created_at, started_at, completed_at
             FROM task_queue WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_row).transpose()
    }

    async fn pending_count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM task_queue WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)
    }
}
