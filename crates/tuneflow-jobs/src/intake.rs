//! Job intake, deletion and read-back for the collaborating API layer.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use tuneflow_core::defaults::ORIGINAL_UPLOAD_FOLDER;
use tuneflow_core::{
    detect_content_type, sanitize_filename, AudioTags, Error, ImageFetcher, MusicJob,
    MusicJobRepository, NewMusicJob, ObjectStorage, Page, PageRequest, Result, TagEditor, Task,
    TaskDispatcher,
};
use tuneflow_media::parse_inline_image;

use crate::music::{MusicJobDeps, MusicJobSettings};

/// A file uploaded with a job request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub data: Vec<u8>,
}

/// A job request from an authenticated user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMusicJob {
    pub owner: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub grouping: Option<String>,
    /// Remote URL, bare base64 image, or `data:image/<ext>;base64,` URI.
    pub artwork: Option<String>,
    #[serde(skip)]
    pub upload: Option<UploadedFile>,
    pub video_url: Option<String>,
}

impl CreateMusicJob {
    fn has_upload(&self) -> bool {
        self.upload.as_ref().is_some_and(|f| !f.data.is_empty())
    }

    fn has_video(&self) -> bool {
        self.video_url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }
}

/// Creates, lists and deletes music jobs.
#[derive(Clone)]
pub struct MusicJobIntake {
    jobs: Arc<dyn MusicJobRepository>,
    storage: Arc<dyn ObjectStorage>,
    images: Arc<dyn ImageFetcher>,
    tags: Arc<dyn TagEditor>,
    tasks: Arc<dyn TaskDispatcher>,
    settings: MusicJobSettings,
}

impl MusicJobIntake {
    pub fn new(
        deps: &MusicJobDeps,
        tasks: Arc<dyn TaskDispatcher>,
        settings: MusicJobSettings,
    ) -> Self {
        Self {
            jobs: deps.jobs.clone(),
            storage: deps.storage.clone(),
            images: deps.images.clone(),
            tags: deps.tags.clone(),
            tasks,
            settings,
        }
    }

    /// Validate and store a job request, then schedule it.
    pub async fn create_music_job(&self, request: CreateMusicJob) -> Result<MusicJob> {
        match (request.has_upload(), request.has_video()) {
            (true, false) | (false, true) => {}
            (true, true) => {
                return Err(Error::InvalidInput(
                    "Provide either an uploaded file or a video URL, not both".to_string(),
                ))
            }
            (false, false) => {
                return Err(Error::InvalidInput(
                    "Provide an uploaded file or a video URL".to_string(),
                ))
            }
        }

        let id = Uuid::now_v7();

        let original_filename = match &request.upload {
            Some(file) if !file.data.is_empty() => Some(self.store_upload(id, file).await?),
            _ => None,
        };

        let (artwork_url, artwork_filename) = match request.artwork.as_deref() {
            Some(value) if !value.trim().is_empty() => self.store_artwork(id, value.trim()).await?,
            _ => (None, None),
        };

        let job = self
            .jobs
            .insert(NewMusicJob {
                id,
                owner: request.owner,
                title: request.title,
                artist: request.artist,
                album: request.album,
                grouping: request.grouping.filter(|g| !g.is_empty()),
                artwork_url,
                artwork_filename,
                original_filename,
                video_url: request.video_url.filter(|u| !u.trim().is_empty()),
            })
            .await?;

        self.tasks.dispatch(Task::RunMusicJob { job_id: job.id }).await?;
        info!(
            subsystem = "jobs",
            component = "intake",
            job_id = %job.id,
            user = %job.owner,
            "Music job created"
        );
        Ok(job)
    }

    /// Soft-delete a job and schedule reclamation of its storage objects.
    pub async fn delete_music_job(&self, owner: &str, job_id: Uuid) -> Result<()> {
        let not_found = || Error::NotFound(format!("Music job {}", job_id));
        let job = self.jobs.get(job_id).await?.ok_or_else(not_found)?;
        if job.owner != owner || job.is_deleted() {
            return Err(not_found());
        }

        if !self.jobs.soft_delete(job_id, owner, Utc::now()).await? {
            return Err(not_found());
        }
        self.tasks.dispatch(Task::CleanupMusicJob { job_id }).await?;
        debug!(job_id = %job_id, "Music job deleted, cleanup scheduled");
        Ok(())
    }

    /// Delete every storage object a job owns. Missing objects are fine.
    pub async fn cleanup_music_job(&self, job_id: Uuid) -> Result<()> {
        let job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or(Error::JobNotFound(job_id))?;

        let keys = job.storage_keys();
        for key in &keys {
            self.storage.delete(key).await?;
        }
        info!(
            subsystem = "jobs",
            component = "intake",
            job_id = %job_id,
            item_count = keys.len(),
            "Music job storage reclaimed"
        );
        Ok(())
    }

    pub async fn list_music_jobs(&self, owner: &str, page: PageRequest) -> Result<Page<MusicJob>> {
        self.jobs.list_for_owner(owner, page).await
    }

    /// Read the tags of an uploaded file to pre-fill a job form.
    pub async fn read_tags(&self, data: Vec<u8>, filename: &str) -> Result<AudioTags> {
        let editor = self.tags.clone();
        let filename = filename.to_string();
        tokio::task::spawn_blocking(move || editor.read_tags(&data, &filename))
            .await
            .map_err(|e| Error::Internal(format!("Tag reader task failed: {}", e)))?
    }

    async fn store_upload(&self, job_id: Uuid, file: &UploadedFile) -> Result<String> {
        let key = format!(
            "{}/{}/{}/{}",
            self.settings.music_folder,
            job_id,
            ORIGINAL_UPLOAD_FOLDER,
            sanitize_filename(&file.filename)
        );
        let content_type = detect_content_type(&file.data, "application/octet-stream");
        self.storage
            .upload(&key, file.data.clone(), &content_type)
            .await?;
        Ok(key)
    }

    /// Returns `(artwork_url, artwork_filename)`.
    async fn store_artwork(
        &self,
        job_id: Uuid,
        value: &str,
    ) -> Result<(Option<String>, Option<String>)> {
        if let Some(artwork) = parse_inline_image(value) {
            let key = format!(
                "{}/{}/artwork.{}",
                self.settings.artwork_folder, job_id, artwork.extension
            );
            let mime = artwork.mime_type();
            self.storage.upload(&key, artwork.data, &mime).await?;
            return Ok((Some(self.storage.resolve_url(&key)), Some(key)));
        }

        if value.starts_with("http://") || value.starts_with("https://") {
            return match self.images.resolve_primary_image(value).await {
                Ok(url) => Ok((Some(url), None)),
                Err(e) => {
                    warn!(url = value, error = %e, "Artwork could not be resolved, dropping it");
                    Ok((None, None))
                }
            };
        }

        warn!("Artwork is neither an image nor a URL, dropping it");
        Ok((None, None))
    }
}
