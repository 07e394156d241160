//! Core traits for repository and external collaborator abstractions.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::models::*;
use crate::pagination::{Page, PageRequest};
use crate::task::{QueuedTask, Task, TaskKind};
use crate::Result;

// =============================================================================
// RECORD STORE
// =============================================================================

/// Repository for music job records.
#[async_trait]
pub trait MusicJobRepository: Send + Sync {
    /// Insert a validated job in a single commit.
    async fn insert(&self, job: NewMusicJob) -> Result<MusicJob>;

    /// Fetch a job by id, including soft-deleted jobs.
    async fn get(&self, id: Uuid) -> Result<Option<MusicJob>>;

    /// Non-deleted jobs of one owner, newest first.
    async fn list_for_owner(&self, owner: &str, page: PageRequest) -> Result<Page<MusicJob>>;

    /// Persist `download_filename`, `download_url` and `completed_at` together.
    ///
    /// Returns false when the job already had a terminal state or was deleted.
    async fn mark_completed(
        &self,
        id: Uuid,
        completion: &JobCompletion,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Persist `failed_at`. Returns false when the job already had a terminal state.
    async fn mark_failed(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    /// Soft-delete a job owned by `owner`.
    ///
    /// Returns true only for the call that set `deleted_at`.
    async fn soft_delete(&self, id: Uuid, owner: &str, at: DateTime<Utc>) -> Result<bool>;
}

/// Repository for per-user WebDAV mirror targets.
#[async_trait]
pub trait WebDavRepository: Send + Sync {
    async fn get(&self, owner: &str) -> Result<Option<WebDavConfig>>;

    async fn upsert(&self, config: &WebDavConfig) -> Result<()>;

    async fn delete(&self, owner: &str) -> Result<bool>;
}

/// Repository for user identities and their linked YouTube channel.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn upsert(&self, email: &str) -> Result<()>;

    async fn list_emails(&self) -> Result<Vec<String>>;

    /// Link a user to their own YouTube channel (whose subscriptions are mirrored).
    async fn link_channel(&self, email: &str, channel_id: &str) -> Result<()>;

    async fn linked_channel(&self, email: &str) -> Result<Option<String>>;
}

/// Repository for mirrored channels.
#[async_trait]
pub trait ChannelRepository: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<YoutubeChannel>>;

    async fn insert(&self, channel: &YoutubeChannel) -> Result<()>;

    async fn update_metadata(&self, id: &str, title: &str, thumbnail: &str) -> Result<()>;

    /// Set the `updating` flag.
    async fn set_updating(&self, id: &str, updating: bool) -> Result<()>;

    /// Clear `updating` and advance the high-water mark, in one commit.
    async fn finish_update(&self, id: &str, last_videos_updated: DateTime<Utc>) -> Result<()>;

    /// Distinct channels with at least one non-deleted subscription.
    async fn list_subscribed(&self) -> Result<Vec<YoutubeChannel>>;
}

/// Repository for (user, channel) subscriptions and the reconciliation markers.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn get(&self, email: &str, channel_id: &str) -> Result<Option<YoutubeSubscription>>;

    async fn insert(&self, subscription: &YoutubeSubscription) -> Result<()>;

    /// Clear `deleted_at` and set the `user_submitted` flag.
    async fn restore(&self, email: &str, channel_id: &str, user_submitted: bool) -> Result<()>;

    /// Set `deleted_at` on an active subscription. Returns false if none was active.
    async fn soft_delete(&self, email: &str, channel_id: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Active subscriptions of one user, ordered by channel title.
    async fn list_for_user(
        &self,
        email: &str,
        page: PageRequest,
    ) -> Result<Page<SubscriptionListing>>;

    /// Record that `channel_id` was seen in the current remote pass for `email`.
    async fn mark_seen(&self, email: &str, channel_id: &str) -> Result<()>;

    /// Soft-delete every active, mirrored (not user-submitted) subscription of
    /// `email` whose channel was not marked seen. Returns the number deleted.
    async fn soft_delete_unseen(&self, email: &str, at: DateTime<Utc>) -> Result<u64>;

    /// Remove all seen-markers of `email`.
    async fn clear_seen(&self, email: &str) -> Result<()>;
}

/// Repository for mirrored videos and per-user library state.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<YoutubeVideo>>;

    async fn insert(&self, video: &YoutubeVideo) -> Result<()>;

    /// Overwrite the mutable fields of an existing video.
    async fn update(&self, video: &YoutubeVideo) -> Result<()>;

    async fn list(
        &self,
        email: &str,
        query: &VideoQuery,
        page: PageRequest,
    ) -> Result<Page<VideoListing>>;

    async fn like(&self, email: &str, video_id: &str) -> Result<()>;

    async fn unlike(&self, email: &str, video_id: &str) -> Result<bool>;

    async fn mark_watched(&self, email: &str, video_id: &str) -> Result<()>;

    async fn enqueue(&self, email: &str, video_id: &str) -> Result<()>;

    async fn dequeue(&self, email: &str, video_id: &str) -> Result<bool>;
}

/// Repository for video categories.
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Insert or rename every category in one commit.
    async fn upsert_page(&self, categories: &[RemoteCategory]) -> Result<()>;

    /// All categories ordered by name.
    async fn list(&self) -> Result<Vec<YoutubeVideoCategory>>;
}

// =============================================================================
// TASK QUEUE
// =============================================================================

/// Schedules a task for asynchronous execution.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    async fn dispatch(&self, task: Task) -> Result<Uuid>;
}

/// Durable task queue consumed by the worker.
#[async_trait]
pub trait TaskQueue: TaskDispatcher {
    /// Claim the oldest pending task of one of `kinds` (any kind if empty).
    async fn claim_next(&self, kinds: &[TaskKind]) -> Result<Option<QueuedTask>>;

    async fn complete(&self, id: Uuid) -> Result<()>;

    /// Record a failure; the task goes back to pending while retries remain
    /// and `retryable` is set, otherwise it is marked failed.
    async fn fail(&self, id: Uuid, error: &str, retryable: bool) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<QueuedTask>>;

    async fn pending_count(&self) -> Result<i64>;
}

// =============================================================================
// OBJECT STORAGE
// =============================================================================

/// Blob storage addressed by namespaced string keys.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()>;

    async fn download(&self, key: &str) -> Result<Vec<u8>>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Absolute URL at which the object can be fetched.
    fn resolve_url(&self, key: &str) -> String;
}

/// Mirror target for produced files.
#[async_trait]
pub trait WebDavMirror: Send + Sync {
    /// PUT `data` to `{credentials.url}/{filename}`. Any non-2xx is an error.
    async fn put(&self, credentials: &WebDavCredentials, filename: &str, data: Vec<u8>)
        -> Result<()>;
}

/// Unseals stored WebDAV credentials.
pub trait CredentialOpener: Send + Sync {
    fn open(&self, config: &WebDavConfig) -> Result<WebDavCredentials>;
}

// =============================================================================
// EXTERNAL TOOLS
// =============================================================================

/// Downloads and extracts audio from a remote video.
#[async_trait]
pub trait AudioDownloader: Send + Sync {
    /// Fetch `source_url` into `dest_dir` with file stem `stem`.
    ///
    /// Returns the produced audio file, or `None` if nothing was produced.
    async fn download_audio(
        &self,
        source_url: &str,
        dest_dir: &Path,
        stem: &str,
    ) -> Result<Option<PathBuf>>;
}

/// Converts an audio file to the target codec/container (mp3).
#[async_trait]
pub trait AudioTranscoder: Send + Sync {
    async fn transcode(&self, src: &Path) -> Result<PathBuf>;
}

/// Reads and writes audio tags. Blocking; callers offload it.
pub trait TagEditor: Send + Sync {
    fn read_tags(&self, data: &[u8], filename: &str) -> Result<AudioTags>;

    fn write_tags(&self, path: &Path, tags: &TrackTags, artwork: Option<&Artwork>) -> Result<()>;
}

/// Finds and fetches artwork images.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Turn a candidate URL (an image, or a page referencing one) into a
    /// confirmed image URL.
    async fn resolve_primary_image(&self, candidate_url: &str) -> Result<String>;

    async fn fetch_image(&self, url: &str) -> Result<Artwork>;
}

// =============================================================================
// REMOTE CATALOG
// =============================================================================

/// Remote video platform, read as lazily fetched pages.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Channels the given channel subscribes to.
    fn stream_channel_subscriptions<'a>(
        &'a self,
        channel_id: &'a str,
    ) -> BoxStream<'a, Result<Vec<RemoteChannel>>>;

    /// Uploads of a channel, newest first.
    fn stream_channel_latest_videos<'a>(
        &'a self,
        channel_id: &'a str,
    ) -> BoxStream<'a, Result<Vec<RemoteVideo>>>;

    fn stream_video_categories(&self) -> BoxStream<'_, Result<Vec<RemoteCategory>>>;

    async fn get_channel_info(&self, channel_id: &str) -> Result<Option<RemoteChannel>>;
}
