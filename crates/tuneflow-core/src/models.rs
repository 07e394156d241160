//! Domain models for music jobs and the mirrored YouTube catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// =============================================================================
// MUSIC JOBS
// =============================================================================

/// One conversion request: source audio in, tagged mp3 out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicJob {
    pub id: Uuid,
    /// Owning user identity (email).
    pub owner: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub grouping: Option<String>,
    /// Resolved artwork URL, either a remote image or an uploaded inline image.
    pub artwork_url: Option<String>,
    /// Storage key of uploaded inline artwork.
    pub artwork_filename: Option<String>,
    /// Storage key of the uploaded source file.
    pub original_filename: Option<String>,
    pub video_url: Option<String>,
    /// Storage key of the produced file.
    pub download_filename: Option<String>,
    pub download_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Where a job's audio comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSource<'a> {
    /// Storage key of an uploaded file.
    Upload(&'a str),
    /// Remote video URL handed to the downloader.
    Video(&'a str),
}

impl MusicJob {
    /// The job's audio source; an uploaded file wins over a video URL.
    pub fn source(&self) -> Option<JobSource<'_>> {
        if let Some(key) = self.original_filename.as_deref().filter(|k| !k.is_empty()) {
            return Some(JobSource::Upload(key));
        }
        self.video_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .map(JobSource::Video)
    }

    /// The persisted terminal state, if the engine has finished with this job.
    pub fn status(&self) -> Option<JobStatus> {
        match (self.completed_at, self.failed_at) {
            (Some(_), _) => Some(JobStatus::Completed),
            (None, Some(_)) => Some(JobStatus::Failed),
            (None, None) => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status().is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Storage keys owned by this job, reclaimed on deletion.
    pub fn storage_keys(&self) -> Vec<&str> {
        [
            self.artwork_filename.as_deref(),
            self.download_filename.as_deref(),
            self.original_filename.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|k| !k.is_empty())
        .collect()
    }
}

/// Music job state machine: `Started` is notify-only, the other two are
/// persisted through `completed_at` / `failed_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Started,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Started => "STARTED",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

/// Insert payload for a new music job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMusicJob {
    pub id: Uuid,
    pub owner: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub grouping: Option<String>,
    pub artwork_url: Option<String>,
    pub artwork_filename: Option<String>,
    pub original_filename: Option<String>,
    pub video_url: Option<String>,
}

impl NewMusicJob {
    /// Exactly one of an uploaded file and a video URL must be present.
    pub fn validate(&self) -> Result<()> {
        let has_upload = self
            .original_filename
            .as_deref()
            .is_some_and(|v| !v.is_empty());
        let has_video = self.video_url.as_deref().is_some_and(|v| !v.is_empty());

        match (has_upload, has_video) {
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

        if self.owner.trim().is_empty() {
            return Err(Error::InvalidInput("Job owner is required".to_string()));
        }
        Ok(())
    }
}

/// Terminal fields written together when a job completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCompletion {
    pub download_filename: String,
    pub download_url: String,
}

// =============================================================================
// WEBDAV
// =============================================================================

/// A user's WebDAV mirror target. Credentials are stored sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebDavConfig {
    pub owner: String,
    pub url: String,
    pub sealed_username: String,
    pub sealed_password: String,
}

/// Unsealed WebDAV credentials, only held for the duration of a PUT.
#[derive(Clone, PartialEq, Eq)]
pub struct WebDavCredentials {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for WebDavCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebDavCredentials")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// YOUTUBE CATALOG
// =============================================================================

/// Mirrored channel metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YoutubeChannel {
    pub id: String,
    pub title: String,
    pub thumbnail: String,
    /// Non-authoritative progress indicator for an ingestion pass.
    pub updating: bool,
    /// High-water mark for incremental video sync.
    pub last_videos_updated: DateTime<Utc>,
}

/// A (user, channel) subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YoutubeSubscription {
    pub email: String,
    pub channel_id: String,
    /// Explicit user subscription, as opposed to one mirrored from YouTube.
    pub user_submitted: bool,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl YoutubeSubscription {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Subscription joined with its channel, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionListing {
    pub channel: YoutubeChannel,
    pub user_submitted: bool,
    pub subscribed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YoutubeVideo {
    pub id: String,
    pub title: String,
    pub thumbnail: String,
    pub description: String,
    pub channel_id: String,
    pub category_id: Option<String>,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YoutubeVideoCategory {
    pub id: String,
    pub name: String,
}

/// Video row with the viewing user's library state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoListing {
    pub video: YoutubeVideo,
    pub channel_title: String,
    pub liked_at: Option<DateTime<Utc>>,
    pub watched_at: Option<DateTime<Utc>>,
    pub queued_at: Option<DateTime<Utc>>,
}

/// Filters for browsing the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoQuery {
    pub channel_id: Option<String>,
    /// Only channels the user has an active subscription to.
    #[serde(default)]
    pub subscribed_only: bool,
    #[serde(default)]
    pub category_ids: Vec<String>,
    /// Only liked videos, most recently liked first.
    #[serde(default)]
    pub liked_only: bool,
    /// Only queued videos, oldest queue entry first.
    #[serde(default)]
    pub queued_only: bool,
}

/// Ordering applied by a catalog listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoOrder {
    LikedDesc,
    QueuedAsc,
    PublishedDesc,
}

impl VideoQuery {
    pub fn order(&self) -> VideoOrder {
        if self.liked_only {
            VideoOrder::LikedDesc
        } else if self.queued_only {
            VideoOrder::QueuedAsc
        } else {
            VideoOrder::PublishedDesc
        }
    }
}

// =============================================================================
// REMOTE PAYLOADS
// =============================================================================

/// Channel entry as returned by the catalog provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteChannel {
    pub id: String,
    pub title: String,
    pub thumbnail: String,
}

/// Video entry as returned by the catalog provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVideo {
    pub id: String,
    pub title: String,
    pub thumbnail: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
    pub category_id: Option<String>,
}

/// Category entry as returned by the catalog provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCategory {
    pub id: String,
    pub name: String,
}

// =============================================================================
// MEDIA
// =============================================================================

/// Tag values written into a produced file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackTags {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub grouping: Option<String>,
}

impl From<&MusicJob> for TrackTags {
    fn from(job: &MusicJob) -> Self {
        Self {
            title: job.title.clone(),
            artist: job.artist.clone(),
            album: job.album.clone(),
            grouping: job.grouping.clone().filter(|g| !g.is_empty()),
        }
    }
}

/// Tag values read back from an uploaded file; any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTags {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub grouping: Option<String>,
    /// Embedded front cover as standard base64.
    pub artwork_base64: Option<String>,
}

/// Image bytes with their file extension (`png`, `jpeg`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artwork {
    pub data: Vec<u8>,
    pub extension: String,
}

impl Artwork {
    pub fn mime_type(&self) -> String {
        format!("image/{}", self.extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> MusicJob {
        MusicJob {
            id: Uuid::nil(),
            owner: "user@example.com".into(),
            title: "Song".into(),
            artist: "Artist".into(),
            album: "Album".into(),
            grouping: None,
            artwork_url: None,
            artwork_filename: None,
            original_filename: None,
            video_url: None,
            download_filename: None,
            download_url: None,
            created_at: Utc::now(),
            completed_at: None,
            failed_at: None,
            deleted_at: None,
        }
    }

    fn new_job() -> NewMusicJob {
        NewMusicJob {
            id: Uuid::nil(),
            owner: "user@example.com".into(),
            title: "Song".into(),
            artist: "Artist".into(),
            album: "Album".into(),
            grouping: None,
            artwork_url: None,
            artwork_filename: None,
            original_filename: None,
            video_url: None,
        }
    }

    #[test]
    fn test_source_prefers_upload() {
        let mut j = job();
        assert_eq!(j.source(), None);
        j.video_url = Some("https://youtu.be/x".into());
        assert_eq!(j.source(), Some(JobSource::Video("https://youtu.be/x")));
        j.original_filename = Some("music/1/old/a.wav".into());
        assert_eq!(j.source(), Some(JobSource::Upload("music/1/old/a.wav")));
    }

    #[test]
    fn test_empty_source_strings_are_ignored() {
        let mut j = job();
        j.original_filename = Some(String::new());
        j.video_url = Some(String::new());
        assert_eq!(j.source(), None);
    }

    #[test]
    fn test_status_from_terminal_timestamps() {
        let mut j = job();
        assert_eq!(j.status(), None);
        assert!(!j.is_finished());
        j.failed_at = Some(Utc::now());
        assert_eq!(j.status(), Some(JobStatus::Failed));
        j.failed_at = None;
        j.completed_at = Some(Utc::now());
        assert_eq!(j.status(), Some(JobStatus::Completed));
    }

    #[test]
    fn test_storage_keys_lists_only_set_objects() {
        let mut j = job();
        assert!(j.storage_keys().is_empty());
        j.artwork_filename = Some("artwork/1/artwork.png".into());
        j.download_filename = Some("music/1/song artist.mp3".into());
        assert_eq!(
            j.storage_keys(),
            vec!["artwork/1/artwork.png", "music/1/song artist.mp3"]
        );
    }

    #[test]
    fn test_new_job_requires_exactly_one_source() {
        let mut j = new_job();
        assert!(matches!(j.validate(), Err(Error::InvalidInput(_))));

        j.video_url = Some("https://youtu.be/x".into());
        assert!(j.validate().is_ok());

        j.original_filename = Some("music/1/old/a.wav".into());
        assert!(matches!(j.validate(), Err(Error::InvalidInput(_))));

        j.video_url = None;
        assert!(j.validate().is_ok());
    }

    #[test]
    fn test_job_status_serializes_upper_case() {
        let json = serde_json::to_string(&JobStatus::Started).unwrap();
        assert_eq!(json, "\"STARTED\"");
        assert_eq!(JobStatus::Completed.as_str(), "COMPLETED");
    }

    #[test]
    fn test_track_tags_drop_empty_grouping() {
        let mut j = job();
        j.grouping = Some(String::new());
        assert_eq!(TrackTags::from(&j).grouping, None);
        j.grouping = Some("Live".into());
        assert_eq!(TrackTags::from(&j).grouping.as_deref(), Some("Live"));
    }

    #[test]
    fn test_video_query_order() {
        let mut q = VideoQuery::default();
        assert_eq!(q.order(), VideoOrder::PublishedDesc);
        q.queued_only = true;
        assert_eq!(q.order(), VideoOrder::QueuedAsc);
        q.liked_only = true;
        assert_eq!(q.order(), VideoOrder::LikedDesc);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = WebDavCredentials {
            url: "https://dav.example.com".into(),
            username: "me".into(),
            password: "hunter2".into(),
        };
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}
