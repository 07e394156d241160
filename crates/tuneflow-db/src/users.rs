//! User identity repository.
//!
//! Accounts are managed by the API layer; this side only needs the list of
//! users and the YouTube channel each one linked.

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use tuneflow_core::{Error, Result, UserRepository};

/// PostgreSQL implementation of UserRepository.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: Pool<Postgres>,
}

impl PgUserRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn upsert(&self, email: &str) -> Result<()> {
        sqlx::query("INSERT INTO users (email) VALUES ($1) ON CONFLICT (email) DO NOTHING")
            .bind(email)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn list_emails(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT email FROM users ORDER BY email")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn link_channel(&self, email: &str, channel_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO youtube_user_channels (email, channel_id) VALUES ($1, $2)
             ON CONFLICT (email) DO UPDATE SET channel_id = EXCLUDED.channel_id",
        )
        .bind(email)
        .bind(channel_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn linked_channel(&self, email: &str) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT channel_id FROM youtube_user_channels WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)
    }
}
