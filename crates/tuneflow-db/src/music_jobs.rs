//! Music job repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use tuneflow_core::{
    Error, JobCompletion, MusicJob, MusicJobRepository, NewMusicJob, Page, PageRequest, Result,
};

const JOB_COLUMNS: &str = "id, owner, title, artist, album, grouping, artwork_url, artwork_filename,
     original_filename, video_url, download_filename, download_url,
     created_at, completed_at, failed_at, deleted_at";

/// PostgreSQL implementation of MusicJobRepository.
#[derive(Clone)]
pub struct PgMusicJobRepository {
    pool: Pool<Postgres>,
}

impl PgMusicJobRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> MusicJob {
        MusicJob {
            id: row.get("id"),
            owner: row.get("owner"),
            title: row.get("title"),
            artist: row.get("artist"),
            album: row.get("album"),
            grouping: row.get("grouping"),
            artwork_url: row.get("artwork_url"),
            artwork_filename: row.get("artwork_filename"),
            original_filename: row.get("original_filename"),
            video_url: row.get("video_url"),
            download_filename: row.get("download_filename"),
            download_url: row.get("download_url"),
            created_at: row.get("created_at"),
            completed_at: row.get("completed_at"),
            failed_at: row.get("failed_at"),
            deleted_at: row.get("deleted_at"),
        }
    }
}

#[async_trait]
impl MusicJobRepository for PgMusicJobRepository {
    async fn insert(&self, job: NewMusicJob) -> Result<MusicJob> {
        job.validate()?;

        let row = sqlx::query(&format!(
            "INSERT INTO music_jobs (id, owner, title, artist, album, grouping, artwork_url,
                                     artwork_filename, original_filename, video_url, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(job.id)
        .bind(&job.owner)
        .bind(&job.title)
        .bind(&job.artist)
        .bind(&job.album)
        .bind(&job.grouping)
        .bind(&job.artwork_url)
        .bind(&job.artwork_filename)
        .bind(&job.original_filename)
        .bind(&job.video_url)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Self::parse_row(row))
    }

    async fn get(&self, id: Uuid) -> Result<Option<MusicJob>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM music_jobs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    async fn list_for_owner(&self, owner: &str, page: PageRequest) -> Result<Page<MusicJob>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM music_jobs WHERE owner = $1 AND deleted_at IS NULL",
        )
        .bind(owner)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM music_jobs
             WHERE owner = $1 AND deleted_at IS NULL
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3"
        ))
        .bind(owner)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(Page::new(
            rows.into_iter().map(Self::parse_row).collect(),
            total,
            page,
        ))
    }

    async fn mark_completed(
        &self,
        id: Uuid,
        completion: &JobCompletion,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE music_jobs
             SET download_filename = $1, download_url = $2, completed_at = $3
             WHERE id = $4 AND completed_at IS NULL AND failed_at IS NULL
               AND deleted_at IS NULL",
        )
        .bind(&completion.download_filename)
        .bind(&completion.download_url)
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE music_jobs SET failed_at = $1
             WHERE id = $2 AND completed_at IS NULL AND failed_at IS NULL",
        )
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn soft_delete(&self, id: Uuid, owner: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE music_jobs SET deleted_at = $1
             WHERE id = $2 AND owner = $3 AND deleted_at IS NULL",
        )
        .bind(at)
        .bind(id)
        .bind(owner)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }
}
