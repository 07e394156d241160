//! Subscription repository, including the seen-markers used while
//! reconciling a user's mirrored subscriptions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};

use tuneflow_core::{
    Error, Page, PageRequest, Result, SubscriptionListing, SubscriptionRepository,
    YoutubeSubscription,
};

use crate::channels::PgChannelRepository;

/// PostgreSQL implementation of SubscriptionRepository.
#[derive(Clone)]
pub struct PgSubscriptionRepository {
    pool: Pool<Postgres>,
}

impl PgSubscriptionRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionRepository for PgSubscriptionRepository {
    async fn get(&self, email: &str, channel_id: &str) -> Result<Option<YoutubeSubscription>> {
        let row = sqlx::query(
            "SELECT email, channel_id, user_submitted, created_at, deleted_at
             FROM youtube_subscriptions WHERE email = $1 AND channel_id = $2",
        )
        .bind(email)
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|row| YoutubeSubscription {
            email: row.get("email"),
            channel_id: row.get("channel_id"),
            user_submitted: row.get("user_submitted"),
            created_at: row.get("created_at"),
            deleted_at: row.get("deleted_at"),
        }))
    }

    async fn insert(&self, subscription: &YoutubeSubscription) -> Result<()> {
        sqlx::query(
            "INSERT INTO youtube_subscriptions (email, channel_id, user_submitted, created_at, deleted_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&subscription.email)
        .bind(&subscription.channel_id)
        .bind(subscription.user_submitted)
        .bind(subscription.created_at)
        .bind(subscription.deleted_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn restore(&self, email: &str, channel_id: &str, user_submitted: bool) -> Result<()> {
        let result = sqlx::query(
            "UPDATE youtube_subscriptions SET deleted_at = NULL, user_submitted = $1
             WHERE email = $2 AND channel_id = $3",
        )
        .bind(user_submitted)
        .bind(email)
        .bind(channel_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!(
                "Subscription {} -> {}",
                email, channel_id
            )));
        }
        Ok(())
    }

    async fn soft_delete(&self, email: &str, channel_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE youtube_subscriptions SET deleted_at = $1
             WHERE email = $2 AND channel_id = $3 AND deleted_at IS NULL",
        )
        .bind(at)
        .bind(email)
        .bind(channel_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_for_user(
        &self,
        email: &str,
        page: PageRequest,
    ) -> Result<Page<SubscriptionListing>> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM youtube_subscriptions WHERE email = $1 AND deleted_at IS NULL",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        let rows = sqlx::query(
            "SELECT c.id, c.title, c.thumbnail, c.updating, c.last_videos_updated,
                    s.user_submitted, s.created_at AS subscribed_at
             FROM youtube_subscriptions s
             JOIN youtube_channels c ON c.id = s.channel_id
             WHERE s.email = $1 AND s.deleted_at IS NULL
             ORDER BY c.title ASC, c.id ASC
             LIMIT $2 OFFSET $3",
        )
        .bind(email)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let items = rows
            .iter()
            .map(|row| SubscriptionListing {
                channel: PgChannelRepository::parse_row(row),
                user_submitted: row.get("user_submitted"),
                subscribed_at: row.get("subscribed_at"),
            })
            .collect();

        Ok(Page::new(items, total, page))
    }

    async fn mark_seen(&self, email: &str, channel_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO youtube_new_subscriptions (email, channel_id) VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(email)
        .bind(channel_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn soft_delete_unseen(&self, email: &str, at: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE youtube_subscriptions s SET deleted_at = $1
             WHERE s.email = $2
               AND s.deleted_at IS NULL
               AND s.user_submitted = FALSE
               AND NOT EXISTS (
                   SELECT 1 FROM youtube_new_subscriptions n
                   WHERE n.email = s.email AND n.channel_id = s.channel_id
               )",
        )
        .bind(at)
        .bind(email)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    async fn clear_seen(&self, email: &str) -> Result<()> {
        sqlx::query("DELETE FROM youtube_new_subscriptions WHERE email = $1")
            .bind(email)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }
}
