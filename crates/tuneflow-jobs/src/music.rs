//! Music job engine: acquire source audio, tag it, store it, mirror it.
//!
//! One job moves `CREATED -> STARTED -> (COMPLETED | FAILED)`. `STARTED` is
//! only published; the terminal states are persisted through `completed_at`
//! and `failed_at`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use tuneflow_core::defaults::{ARTWORK_FOLDER, AUDIO_CONTENT_TYPE, JOB_WORK_DIR, MUSIC_FOLDER};
use tuneflow_core::{
    destination_filename, publish_json, Artwork, AudioDownloader, AudioTranscoder,
    CredentialOpener, Error, ImageFetcher, JobCompletion, JobSource, JobStatus, MusicJob,
    MusicJobRepository, MusicJobUpdate, NotificationChannel, ObjectStorage, PubSub, Result,
    TagEditor, TrackTags, WebDavMirror, WebDavRepository,
};

/// Stem of the audio file produced by the downloader.
const DOWNLOAD_STEM: &str = "audio";

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct MusicJobSettings {
    /// Storage prefix of produced files and original uploads.
    pub music_folder: String,
    /// Storage prefix of uploaded inline artwork.
    pub artwork_folder: String,
    /// Parent of the per-job scratch directories.
    pub work_dir: PathBuf,
    /// Status literal published when a job fails.
    pub failure_status: JobStatus,
}

impl Default for MusicJobSettings {
    fn default() -> Self {
        Self {
            music_folder: MUSIC_FOLDER.to_string(),
            artwork_folder: ARTWORK_FOLDER.to_string(),
            work_dir: std::env::temp_dir(),
            failure_status: JobStatus::Completed,
        }
    }
}

impl MusicJobSettings {
    /// Load settings from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `MUSIC_FOLDER` | `music` | Storage prefix for produced files |
    /// | `ARTWORK_FOLDER` | `artwork` | Storage prefix for inline artwork |
    /// | `MUSIC_WORK_DIR` | system temp | Parent of per-job scratch dirs |
    /// | `MUSIC_JOB_FAILED_STATUS` | `completed` | `failed` publishes `FAILED` on failure |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let failure_status = match std::env::var("MUSIC_JOB_FAILED_STATUS")
            .map(|v| v.to_ascii_lowercase())
            .as_deref()
        {
            Ok("failed") => JobStatus::Failed,
            _ => JobStatus::Completed,
        };

        Self {
            music_folder: std::env::var("MUSIC_FOLDER").unwrap_or(defaults.music_folder),
            artwork_folder: std::env::var("ARTWORK_FOLDER").unwrap_or(defaults.artwork_folder),
            work_dir: std::env::var("MUSIC_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            failure_status,
        }
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn with_failure_status(mut self, status: JobStatus) -> Self {
        self.failure_status = status;
        self
    }

    pub fn with_music_folder(mut self, folder: impl Into<String>) -> Self {
        self.music_folder = folder.into();
        self
    }

    /// Storage key of the produced file of a job.
    pub fn download_key(&self, job_id: Uuid, filename: &str) -> String {
        format!("{}/{}/{}", self.music_folder, job_id, filename)
    }
}

/// Collaborators used by the music job engine and job intake.
#[derive(Clone)]
pub struct MusicJobDeps {
    pub jobs: Arc<dyn MusicJobRepository>,
    pub webdav: Arc<dyn WebDavRepository>,
    pub storage: Arc<dyn ObjectStorage>,
    pub pubsub: Arc<dyn PubSub>,
    pub downloader: Arc<dyn AudioDownloader>,
    pub transcoder: Arc<dyn AudioTranscoder>,
    pub tags: Arc<dyn TagEditor>,
    pub images: Arc<dyn ImageFetcher>,
    pub mirror: Arc<dyn WebDavMirror>,
    pub credentials: Arc<dyn CredentialOpener>,
}

/// Runs music jobs.
#[derive(Clone)]
pub struct MusicJobEngine {
    deps: MusicJobDeps,
    settings: MusicJobSettings,
}

impl MusicJobEngine {
    pub fn new(deps: MusicJobDeps, settings: MusicJobSettings) -> Self {
        Self { deps, settings }
    }

    pub fn settings(&self) -> &MusicJobSettings {
        &self.settings
    }

    /// Run a job and record its failure if it does not complete.
    ///
    /// A missing job is returned as is; every other error first persists
    /// `failed_at` and publishes the failure status.
    pub async fn execute(&self, job_id: Uuid) -> Result<()> {
        match self.run(job_id).await {
            Ok(()) => Ok(()),
            Err(Error::JobNotFound(id)) => Err(Error::JobNotFound(id)),
            Err(e) => {
                error!(
                    subsystem = "jobs",
                    component = "music_engine",
                    job_id = %job_id,
                    error = %e,
                    "Music job failed"
                );
                self.record_failure(job_id).await;
                Err(e)
            }
        }
    }

    /// Run one job to completion. Errors are returned without touching the
    /// job record; see [`MusicJobEngine::execute`].
    #[instrument(
        skip(self),
        fields(subsystem = "jobs", component = "music_engine", op = "run_music_job")
    )]
    pub async fn run(&self, job_id: Uuid) -> Result<()> {
        let start = Instant::now();
        let job = self
            .deps
            .jobs
            .get(job_id)
            .await?
            .ok_or(Error::JobNotFound(job_id))?;

        if job.is_finished() {
            info!(status = ?job.status(), "Music job already finished, skipping");
            return Ok(());
        }
        if job.is_deleted() {
            info!("Music job was deleted before it ran, skipping");
            return Ok(());
        }

        self.notify(job_id, JobStatus::Started).await;

        let jobs_root = self.settings.work_dir.join(JOB_WORK_DIR);
        tokio::fs::create_dir_all(&jobs_root).await?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("{}-", job_id))
            .tempdir_in(&jobs_root)?;

        let audio = self.acquire_source(&job, scratch.path()).await?;
        let artwork = self.resolve_artwork(&job).await;
        self.write_tags(&job, &audio, artwork).await?;

        let filename = destination_filename(&job.title, &job.artist);
        let key = self.settings.download_key(job.id, &filename);
        let data = tokio::fs::read(&audio).await?;
        let size = data.len();

        self.deps
            .storage
            .upload(&key, data.clone(), AUDIO_CONTENT_TYPE)
            .await?;
        self.mirror(&job, &filename, data).await?;

        let completion = JobCompletion {
            download_url: self.deps.storage.resolve_url(&key),
            download_filename: key,
        };
        if !self
            .deps
            .jobs
            .mark_completed(job_id, &completion, Utc::now())
            .await?
        {
            // Cleanup only knows the keys recorded on the job, so an
            // unrecorded upload would never be reclaimed.
            warn!("Music job was finished or deleted concurrently, discarding upload");
            if let Err(e) = self.deps.storage.delete(&completion.download_filename).await {
                warn!(key = %completion.download_filename, error = %e, "Failed to discard upload");
            }
            return Ok(());
        }

        self.notify(job_id, JobStatus::Completed).await;
        info!(
            bytes = size,
            duration_ms = start.elapsed().as_millis() as u64,
            "Music job completed"
        );
        Ok(())
    }

    /// Persist `failed_at` and publish the configured failure status.
    pub async fn record_failure(&self, job_id: Uuid) {
        match self.deps.jobs.mark_failed(job_id, Utc::now()).await {
            Ok(true) => {}
            Ok(false) => debug!(job_id = %job_id, "Music job already had a terminal state"),
            Err(e) => error!(job_id = %job_id, error = %e, "Failed to persist job failure"),
        }
        self.notify(job_id, self.settings.failure_status).await;
    }

    async fn acquire_source(&self, job: &MusicJob, dir: &Path) -> Result<PathBuf> {
        match job.source() {
            Some(JobSource::Upload(key)) => {
                let data = self.deps.storage.download(key).await.map_err(|e| {
                    if e.is_not_found() {
                        Error::SourceUnavailable(format!("Uploaded file {} is missing", key))
                    } else {
                        e
                    }
                })?;
                let ext = Path::new(key)
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("bin");
                let src = dir.join(format!("source.{}", ext));
                tokio::fs::write(&src, data).await?;
                debug!(key, "Transcoding uploaded source");
                self.deps.transcoder.transcode(&src).await
            }
            Some(JobSource::Video(url)) => {
                debug!(url, "Downloading audio from video");
                self.deps
                    .downloader
                    .download_audio(url, dir, DOWNLOAD_STEM)
                    .await?
                    .ok_or_else(|| {
                        Error::SourceUnavailable(format!("No audio produced for {}", url))
                    })
            }
            None => Err(Error::SourceUnavailable(
                "Job has neither an uploaded file nor a video URL".to_string(),
            )),
        }
    }

    /// Artwork is optional: any failure drops it.
    async fn resolve_artwork(&self, job: &MusicJob) -> Option<Artwork> {
        let url = job.artwork_url.as_deref().filter(|u| !u.is_empty())?;
        match self.deps.images.fetch_image(url).await {
            Ok(artwork) => Some(artwork),
            Err(e) => {
                warn!(error = %e, "Artwork unavailable, continuing without it");
                None
            }
        }
    }

    async fn write_tags(&self, job: &MusicJob, audio: &Path, artwork: Option<Artwork>) -> Result<()> {
        let editor = self.deps.tags.clone();
        let tags = TrackTags::from(job);
        let path = audio.to_path_buf();
        tokio::task::spawn_blocking(move || editor.write_tags(&path, &tags, artwork.as_ref()))
            .await
            .map_err(|e| Error::Internal(format!("Tag writer task failed: {}", e)))?
    }

    async fn mirror(&self, job: &MusicJob, filename: &str, data: Vec<u8>) -> Result<()> {
        let Some(config) = self.deps.webdav.get(&job.owner).await? else {
            return Ok(());
        };
        let credentials = self
            .deps
            .credentials
            .open(&config)
            .map_err(|e| Error::MirrorFailed(format!("Cannot unseal credentials: {}", e)))?;
        self.deps.mirror.put(&credentials, filename, data).await?;
        debug!(url = %credentials.url, filename, "Mirrored to WebDAV");
        Ok(())
    }

    async fn notify(&self, job_id: Uuid, status: JobStatus) {
        let update = MusicJobUpdate {
            id: job_id.to_string(),
            status,
        };
        if let Err(e) = publish_json(
            self.deps.pubsub.as_ref(),
            NotificationChannel::MusicJobUpdate,
            &update,
        )
        .await
        {
            warn!(job_id = %job_id, error = %e, "Failed to publish job update");
        }
    }
}
