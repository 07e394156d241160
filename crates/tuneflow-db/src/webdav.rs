//! WebDAV mirror configuration repository.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use tuneflow_core::{Error, Result, WebDavConfig, WebDavRepository};

/// PostgreSQL implementation of WebDavRepository.
#[derive(Clone)]
pub struct PgWebDavRepository {
    pool: Pool<Postgres>,
}

impl PgWebDavRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebDavRepository for PgWebDavRepository {
    async fn get(&self, owner: &str) -> Result<Option<WebDavConfig>> {
        let row = sqlx::query(
            "SELECT owner, url, sealed_username, sealed_password
             FROM webdav_configs WHERE owner = $1",
        )
        .bind(owner)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|row| WebDavConfig {
            owner: row.get("owner"),
            url: row.get("url"),
            sealed_username: row.get("sealed_username"),
            sealed_password: row.get("sealed_password"),
        }))
    }

    async fn upsert(&self, config: &WebDavConfig) -> Result<()> {
        sqlx::query(
            "INSERT INTO webdav_configs (owner, url, sealed_username, sealed_password, updated_at)
             VALUES ($1, $2, $3, $4, now())
             ON CONFLICT (owner) DO UPDATE
             SET url = EXCLUDED.url,
                 sealed_username = EXCLUDED.sealed_username,
                 sealed_password = EXCLUDED.sealed_password,
                 updated_at = now()",
        )
        .bind(&config.owner)
        .bind(&config.url)
        .bind(&config.sealed_username)
        .bind(&config.sealed_password)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn delete(&self, owner: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM webdav_configs WHERE owner = $1")
            .bind(owner)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
