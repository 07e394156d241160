//! Mirrored video repository and per-user library state (likes, watches, queue).

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use tuneflow_core::{
    Error, Page, PageRequest, Result, VideoListing, VideoOrder, VideoQuery, VideoRepository,
    YoutubeVideo,
};

/// Shared FROM/WHERE of the listing and its count. `$1` is the viewing user.
const LISTING_FROM: &str = "FROM youtube_videos v
     JOIN youtube_channels c ON c.id = v.channel_id
     LEFT JOIN youtube_video_likes l ON l.video_id = v.id AND l.email = $1
     LEFT JOIN youtube_video_watches w ON w.video_id = v.id AND w.email = $1
     LEFT JOIN youtube_video_queues q ON q.video_id = v.id AND q.email = $1
     WHERE ($2::text IS NULL OR v.channel_id = $2)
       AND (NOT $3 OR EXISTS (
             SELECT 1 FROM youtube_subscriptions s
             WHERE s.email = $1 AND s.channel_id = v.channel_id AND s.deleted_at IS NULL))
       AND (cardinality($4::text[]) = 0 OR v.category_id = ANY($4))
       AND (NOT $5 OR l.created_at IS NOT NULL)
       AND (NOT $6 OR q.created_at IS NOT NULL)";

/// PostgreSQL implementation of VideoRepository.
#[derive(Clone)]
pub struct PgVideoRepository {
    pool: Pool<Postgres>,
}

impl PgVideoRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_video(row: &sqlx::postgres::PgRow) -> YoutubeVideo {
        YoutubeVideo {
            id: row.get("id"),
            title: row.get("title"),
            thumbnail: row.get("thumbnail"),
            description: row.get("description"),
            channel_id: row.get("channel_id"),
            category_id: row.get("category_id"),
            published_at: row.get("published_at"),
        }
    }

    fn order_clause(order: VideoOrder) -> &'static str {
        match order {
            VideoOrder::LikedDesc => "l.created_at DESC, v.id",
            VideoOrder::QueuedAsc => "q.created_at ASC, v.id",
            VideoOrder::PublishedDesc => "v.published_at DESC, v.title DESC",
        }
    }

    async fn delete_state(&self, table: &str, email: &str, video_id: &str) -> Result<bool> {
        let result = sqlx::query(&format!(
            "DELETE FROM {table} WHERE email = $1 AND video_id = $2"
        ))
        .bind(email)
        .bind(video_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_state(&self, table: &str, email: &str, video_id: &str) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO {table} (email, video_id, created_at) VALUES ($1, $2, now())
             ON CONFLICT (email, video_id) DO NOTHING"
        ))
        .bind(email)
        .bind(video_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }
}

#[async_trait]
impl VideoRepository for PgVideoRepository {
    async fn get(&self, id: &str) -> Result<Option<YoutubeVideo>> {
        let row = sqlx::query(
            "SELECT id, title, thumbnail, description, channel_id, category_id, published_at
             FROM youtube_videos WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(Self::parse_video))
    }

    async fn insert(&self, video: &YoutubeVideo) -> Result<()> {
        sqlx::query(
            "INSERT INTO youtube_videos (id, title, thumbnail, description, channel_id, category_id, published_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&video.id)
        .bind(&video.title)
        .bind(&video.thumbnail)
        .bind(&video.description)
        .bind(&video.channel_id)
        .bind(&video.category_id)
        .bind(video.published_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn update(&self, video: &YoutubeVideo) -> Result<()> {
        let result = sqlx::query(
            "UPDATE youtube_videos
             SET title = $1, thumbnail = $2, description = $3, published_at = $4
             WHERE id = $5",
        )
        .bind(&video.title)
        .bind(&video.thumbnail)
        .bind(&video.description)
        .bind(video.published_at)
        .bind(&video.id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Video {}", video.id)));
        }
        Ok(())
    }

    async fn list(
        &self,
        email: &str,
        query: &VideoQuery,
        page: PageRequest,
    ) -> Result<Page<VideoListing>> {
        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) {LISTING_FROM}"))
            .bind(email)
            .bind(&query.channel_id)
            .bind(query.subscribed_only)
            .bind(&query.category_ids)
            .bind(query.liked_only)
            .bind(query.queued_only)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        let rows = sqlx::query(&format!(
            "SELECT v.id, v.title, v.thumbnail, v.description, v.channel_id, v.category_id,
                    v.published_at, c.title AS channel_title,
                    l.created_at AS liked_at, w.created_at AS watched_at, q.created_at AS queued_at
             {LISTING_FROM}
             ORDER BY {}
             LIMIT $7 OFFSET $8",
            Self::order_clause(query.order())
        ))
        .bind(email)
        .bind(&query.channel_id)
        .bind(query.subscribed_only)
        .bind(&query.category_ids)
        .bind(query.liked_only)
        .bind(query.queued_only)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let items = rows
            .iter()
            .map(|row| VideoListing {
                video: Self::parse_video(row),
                channel_title: row.get("channel_title"),
                liked_at: row.get("liked_at"),
                watched_at: row.get("watched_at"),
                queued_at: row.get("queued_at"),
            })
            .collect();

        Ok(Page::new(items, total, page))
    }

    async fn like(&self, email: &str, video_id: &str) -> Result<()> {
        self.insert_state("youtube_video_likes", email, video_id).await
    }

    async fn unlike(&self, email: &str, video_id: &str) -> Result<bool> {
        self.delete_state("youtube_video_likes", email, video_id).await
    }

    async fn mark_watched(&self, email: &str, video_id: &str) -> Result<()> {
        self.insert_state("youtube_video_watches", email, video_id)
            .await
    }

    async fn enqueue(&self, email: &str, video_id: &str) -> Result<()> {
        self.insert_state("youtube_video_queues", email, video_id).await
    }

    async fn dequeue(&self, email: &str, video_id: &str) -> Result<bool> {
        self.delete_state("youtube_video_queues", email, video_id).await
    }
}
