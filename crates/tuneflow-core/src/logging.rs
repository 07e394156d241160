//! Structured logging field name constants.
//!
//! All crates use these names for structured `tracing` fields so log
//! aggregation can query the same keys across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration (individual videos, subscriptions) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "jobs", "catalog", "db", "media", "youtube", "worker"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "music_engine", "ytdlp", "s3", "task_queue", "scheduler"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "run_music_job", "add_channel_videos", "claim_next"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Music job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// Catalog channel id.
pub const CHANNEL_ID: &str = "channel_id";

/// Owning user identity (email).
pub const USER: &str = "user";

/// Queue task UUID.
pub const TASK_ID: &str = "task_id";

/// Queue task kind.
pub const TASK_TYPE: &str = "task_type";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of items processed (videos, subscriptions, categories).
pub const ITEM_COUNT: &str = "item_count";

/// Page number of a paginated remote fetch.
pub const PAGE: &str = "page";

/// Byte length of a blob (upload, download).
pub const BYTES: &str = "bytes";
