//! # tuneflow-db
//!
//! PostgreSQL record store for tuneflow.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for music jobs, WebDAV targets, users and the
//!   mirrored YouTube catalog
//! - The durable task queue (`FOR UPDATE SKIP LOCKED`)
//! - Redis notification channels
//! - In-memory implementations for engine tests (`memory` feature)
//!
//! ## Example
//!
//! ```rust,ignore
//! use tuneflow_db::{Database, MusicJobRepository};
//!
//! let db = Database::connect("postgres://localhost/tuneflow").await?;
//! db.migrate().await?;
//! let job = db.music_jobs.get(job_id).await?;
//! ```

pub mod categories;
pub mod channels;
#[cfg(any(test, feature = "memory"))]
pub mod memory;
pub mod music_jobs;
pub mod pool;
pub mod pubsub;
pub mod subscriptions;
pub mod tasks;
pub mod users;
pub mod videos;
pub mod webdav;

// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use tuneflow_core::*;

pub use categories::PgCategoryRepository;
pub use channels::PgChannelRepository;
#[cfg(any(test, feature = "memory"))]
pub use memory::{MemoryStore, MemoryTaskQueue};
pub use music_jobs::PgMusicJobRepository;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use pubsub::RedisPubSub;
pub use subscriptions::PgSubscriptionRepository;
pub use tasks::PgTaskQueue;
pub use users::PgUserRepository;
pub use videos::PgVideoRepository;
pub use webdav::PgWebDavRepository;

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    pub music_jobs: PgMusicJobRepository,
    pub webdav: PgWebDavRepository,
    pub users: PgUserRepository,
    pub channels: PgChannelRepository,
    pub subscriptions: PgSubscriptionRepository,
    pub videos: PgVideoRepository,
    pub categories: PgCategoryRepository,
    /// Task queue for background processing.
    pub tasks: PgTaskQueue,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            music_jobs: PgMusicJobRepository::new(pool.clone()),
            webdav: PgWebDavRepository::new(pool.clone()),
            users: PgUserRepository::new(pool.clone()),
            channels: PgChannelRepository::new(pool.clone()),
            subscriptions: PgSubscriptionRepository::new(pool.clone()),
            videos: PgVideoRepository::new(pool.clone()),
            categories: PgCategoryRepository::new(pool.clone()),
            tasks: PgTaskQueue::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
