//! Centralized default constants for tuneflow.
//!
//! Crates reference these instead of defining their own magic numbers.
//! Organized by domain area.

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for listing endpoints.
pub const PAGE_SIZE: u32 = 20;

/// Upper bound on a requested page size.
pub const MAX_PAGE_SIZE: u32 = 50;

// =============================================================================
// STORAGE
// =============================================================================

/// Storage prefix for produced audio files and original uploads.
pub const MUSIC_FOLDER: &str = "music";

/// Storage prefix for uploaded inline artwork.
pub const ARTWORK_FOLDER: &str = "artwork";

/// Sub-folder (below the job folder) holding the uploaded source file.
pub const ORIGINAL_UPLOAD_FOLDER: &str = "old";

/// Content type of every produced audio file.
pub const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

/// Extension of every produced audio file.
pub const AUDIO_EXTENSION: &str = "mp3";

/// Name of the per-job scratch directory root.
pub const JOB_WORK_DIR: &str = "music_jobs";

// =============================================================================
// EXTERNAL TOOLS
// =============================================================================

/// yt-dlp executable.
pub const YTDLP_PATH: &str = "yt-dlp";

/// ffmpeg executable.
pub const FFMPEG_PATH: &str = "ffmpeg";

/// Timeout for a single external tool invocation (seconds).
pub const TOOL_TIMEOUT_SECS: u64 = 600;

/// Timeout for HTTP requests made by adapters (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 60;

/// Browser user agent used when scraping artwork pages.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

// =============================================================================
// CATALOG
// =============================================================================

/// YouTube Data API base URL.
pub const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Maximum page size accepted by the YouTube Data API.
pub const YOUTUBE_PAGE_SIZE: u32 = 50;

/// Region used for video category lookups.
pub const YOUTUBE_REGION_CODE: &str = "US";

/// How far back a brand-new mirrored channel is backfilled (days).
pub const NEW_CHANNEL_BACKFILL_DAYS: i64 = 365;

/// Upper bound on how far back a periodic channel refresh looks (days).
pub const CHANNEL_REFRESH_WINDOW_DAYS: i64 = 1;

// =============================================================================
// TASK QUEUE
// =============================================================================

/// Maximum concurrent tasks per worker.
pub const TASK_MAX_CONCURRENT: usize = 4;

/// Worker polling interval when the queue is empty (milliseconds).
pub const TASK_POLL_INTERVAL_MS: u64 = 1000;

/// Per-task execution timeout (seconds).
pub const TASK_TIMEOUT_SECS: u64 = 1800;

/// Default retry budget for catalog and cleanup tasks.
pub const TASK_MAX_RETRIES: i32 = 2;

/// Capacity of broadcast channels (event bus, worker events).
pub const EVENT_BUS_CAPACITY: usize = 256;
