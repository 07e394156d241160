//! Mirrored YouTube channel repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};

use tuneflow_core::{ChannelRepository, Error, Result, YoutubeChannel};

/// PostgreSQL implementation of ChannelRepository.
#[derive(Clone)]
pub struct PgChannelRepository {
    pool: Pool<Postgres>,
}

impl PgChannelRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub(crate) fn parse_row(row: &sqlx::postgres::PgRow) -> YoutubeChannel {
        YoutubeChannel {
            id: row.get("id"),
            title: row.get("title"),
            thumbnail: row.get("thumbnail"),
            updating: row.get("updating"),
            last_videos_updated: row.get("last_videos_updated"),
        }
    }

    fn ensure_found(id: &str, result: sqlx::postgres::PgQueryResult) -> Result<()> {
        if result.rows_affected() == 0 {
            return Err(Error::ChannelNotFound(id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelRepository for PgChannelRepository {
    async fn get(&self, id: &str) -> Result<Option<YoutubeChannel>> {
        let row = sqlx::query(
            "SELECT id, title, thumbnail, updating, last_videos_updated
             FROM youtube_channels WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(Self::parse_row))
    }

    async fn insert(&self, channel: &YoutubeChannel) -> Result<()> {
        sqlx::query(
            "INSERT INTO youtube_channels (id, title, thumbnail, updating, last_videos_updated)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&channel.id)
        .bind(&channel.title)
        .bind(&channel.thumbnail)
        .bind(channel.updating)
        .bind(channel.last_videos_updated)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn update_metadata(&self, id: &str, title: &str, thumbnail: &str) -> Result<()> {
        let result =
            sqlx::query("UPDATE youtube_channels SET title = $1, thumbnail = $2 WHERE id = $3")
                .bind(title)
                .bind(thumbnail)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;
        Self::ensure_found(id, result)
    }

    async fn set_updating(&self, id: &str, updating: bool) -> Result<()> {
        let result = sqlx::query("UPDATE youtube_channels SET updating = $1 WHERE id = $2")
            .bind(updating)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Self::ensure_found(id, result)
    }

    async fn finish_update(&self, id: &str, last_videos_updated: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE youtube_channels SET updating = FALSE, last_videos_updated = $1 WHERE id = $2",
        )
        .bind(last_videos_updated)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Self::ensure_found(id, result)
    }

    async fn list_subscribed(&self) -> Result<Vec<YoutubeChannel>> {
        let rows = sqlx::query(
            "SELECT c.id, c.title, c.thumbnail, c.updating, c.last_videos_updated
             FROM youtube_channels c
             WHERE EXISTS (
                 SELECT 1 FROM youtube_subscriptions s
                 WHERE s.channel_id = c.id AND s.deleted_at IS NULL
             )
             ORDER BY c.id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.iter().map(Self::parse_row).collect())
    }
}
