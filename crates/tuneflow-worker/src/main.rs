//! tuneflow background worker.
//!
//! Runs the task worker (music jobs and catalog sync) and the periodic
//! catalog scheduler against the PostgreSQL queue until interrupted.

mod config;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tuneflow_core::{EventBus, PubSub};
use tuneflow_crypto::CredentialSealer;
use tuneflow_db::{Database, RedisPubSub};
use tuneflow_jobs::{
    default_schedule, CatalogDeps, CatalogSyncEngine, CatalogTaskHandler, MusicJobDeps,
    MusicJobEngine, MusicJobIntake, MusicTaskHandler, Scheduler, TaskWorker,
};
use tuneflow_media::{
    storage_from_env, FfmpegTranscoder, HttpImageFetcher, HttpWebDavMirror, Id3TagEditor,
    YtDlpDownloader,
};
use tuneflow_youtube::YoutubeClient;

use crate::config::{LogSettings, WorkerSettings};

fn init_logging(settings: &LogSettings) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tuneflow=debug,tuneflow_worker=debug,tuneflow_jobs=debug".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    if let Some(ref path) = settings.file {
        let path = Path::new(path);
        let dir = path.parent().unwrap_or(Path::new("."));
        let name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("tuneflow-worker.log");
        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));

        if settings.json {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(settings.ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if settings.json {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = settings.ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let log_settings = LogSettings::from_env();
    let _log_guard = init_logging(&log_settings);
    info!(
        json = log_settings.json,
        log_file = log_settings.file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let settings = WorkerSettings::from_env();

    info!("Connecting to database...");
    let db = Database::connect_with_config(&settings.database_url, settings.pool.clone())
        .await
        .context("connecting to the database")?;
    if settings.run_migrations {
        db.migrate().await.context("running migrations")?;
        info!("Database migrations complete");
    }

    let pubsub: Arc<dyn PubSub> = match settings.redis_url.as_deref() {
        Some(url) => Arc::new(
            RedisPubSub::connect(url)
                .await
                .context("connecting to Redis")?,
        ),
        None => {
            warn!("REDIS_URL not set, notifications stay in process");
            Arc::new(EventBus::default())
        }
    };

    let storage = storage_from_env()
        .await
        .context("configuring object storage")?;
    let sealer = CredentialSealer::from_env().context("loading CREDENTIALS_KEY")?;
    let youtube = YoutubeClient::from_env().context("configuring the YouTube client")?;

    let music_deps = MusicJobDeps {
        jobs: Arc::new(db.music_jobs.clone()),
        webdav: Arc::new(db.webdav.clone()),
        storage,
        pubsub: pubsub.clone(),
        downloader: Arc::new(YtDlpDownloader::from_env()),
        transcoder: Arc::new(FfmpegTranscoder::from_env()),
        tags: Arc::new(Id3TagEditor::new()),
        images: Arc::new(HttpImageFetcher::new()),
        mirror: Arc::new(HttpWebDavMirror::new()),
        credentials: Arc::new(sealer),
    };
    let tasks = Arc::new(db.tasks.clone());

    let engine = MusicJobEngine::new(music_deps.clone(), settings.music.clone());
    let intake = MusicJobIntake::new(&music_deps, tasks.clone(), settings.music.clone());
    let catalog = CatalogSyncEngine::new(CatalogDeps {
        users: Arc::new(db.users.clone()),
        channels: Arc::new(db.channels.clone()),
        subscriptions: Arc::new(db.subscriptions.clone()),
        videos: Arc::new(db.videos.clone()),
        categories: Arc::new(db.categories.clone()),
        provider: Arc::new(youtube),
        pubsub,
        tasks: tasks.clone(),
    });

    let worker =
        TaskWorker::new(tasks.clone(), settings.worker.clone()).with_wake(db.tasks.notifier());
    worker
        .register_handler(Arc::new(MusicTaskHandler::new(engine, intake)))
        .await;
    worker
        .register_handler(Arc::new(CatalogTaskHandler::new(catalog)))
        .await;
    let worker_handle = worker.start();
    info!(
        max_concurrent = settings.worker.max_concurrent_tasks,
        "Task worker started"
    );

    let scheduler_handle = if settings.scheduler_enabled {
        let handle = Scheduler::new(tasks, default_schedule()).start();
        info!("Scheduler started");
        Some(handle)
    } else {
        info!("Scheduler disabled");
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutdown signal received, draining in-flight tasks");

    if let Some(handle) = scheduler_handle {
        handle.stop().await?;
    }
    worker_handle.stop().await?;
    info!("tuneflow worker stopped");
    Ok(())
}
