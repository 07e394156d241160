//! Video category repository.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use tuneflow_core::{CategoryRepository, Error, RemoteCategory, Result, YoutubeVideoCategory};

/// PostgreSQL implementation of CategoryRepository.
#[derive(Clone)]
pub struct PgCategoryRepository {
    pool: Pool<Postgres>,
}

impl PgCategoryRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CategoryRepository for PgCategoryRepository {
    async fn upsert_page(&self, categories: &[RemoteCategory]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        for category in categories {
            sqlx::query(
                "INSERT INTO youtube_video_categories (id, name) VALUES ($1, $2)
                 ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name",
            )
            .bind(&category.id)
            .bind(&category.name)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<YoutubeVideoCategory>> {
        let rows = sqlx::query("SELECT id, name FROM youtube_video_categories ORDER BY name, id")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| YoutubeVideoCategory {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect())
    }
}
