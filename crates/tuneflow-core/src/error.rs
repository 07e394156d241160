//! Error types for tuneflow.

use thiserror::Error;

/// Result type alias using tuneflow's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for tuneflow operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Music job not found
    #[error("Music job not found: {0}")]
    JobNotFound(uuid::Uuid),

    /// Catalog channel not found (locally or at the provider)
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    /// No usable audio could be acquired for a job
    #[error("Source not found: {0}")]
    SourceUnavailable(String),

    /// Mirroring the produced file to WebDAV failed
    #[error("WebDAV mirror failed: {0}")]
    MirrorFailed(String),

    /// Object storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// External tool (yt-dlp, ffmpeg) failed
    #[error("Tool error: {0}")]
    Tool(String),

    /// Reading or writing audio tags failed
    #[error("Tag error: {0}")]
    Tags(String),

    /// Notification channel failure
    #[error("Pub/sub error: {0}")]
    PubSub(String),

    /// Credential sealing/unsealing failed
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a task failing with this error may succeed on redelivery.
    ///
    /// Network, storage and database hiccups are transient; missing records,
    /// missing sources and mirror rejections are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Database(_)
                | Error::Io(_)
                | Error::Request(_)
                | Error::Storage(_)
                | Error::PubSub(_)
        )
    }

    /// Whether this error means a record or remote entity does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::JobNotFound(_) | Error::ChannelNotFound(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("test resource".to_string());
        assert_eq!(err.to_string(), "Not found: test resource");
    }

    #[test]
    fn test_error_display_job_not_found() {
        let id = Uuid::nil();
        let err = Error::JobNotFound(id);
        assert_eq!(err.to_string(), format!("Music job not found: {}", id));
    }

    #[test]
    fn test_error_display_source_unavailable() {
        let err = Error::SourceUnavailable("File not found".to_string());
        assert_eq!(err.to_string(), "Source not found: File not found");
    }

    #[test]
    fn test_error_display_mirror_failed() {
        let err = Error::MirrorFailed("HTTP 507".to_string());
        assert_eq!(err.to_string(), "WebDAV mirror failed: HTTP 507");
    }

    #[test]
    fn test_error_display_channel_not_found() {
        let err = Error::ChannelNotFound("UC123".to_string());
        assert_eq!(err.to_string(), "Channel not found: UC123");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Request("reset".into()).is_retryable());
        assert!(Error::Storage("503".into()).is_retryable());
        assert!(Error::Io(std::io::Error::new(std::io::ErrorKind::Other, "x")).is_retryable());

        assert!(!Error::JobNotFound(Uuid::nil()).is_retryable());
        assert!(!Error::SourceUnavailable("none".into()).is_retryable());
        assert!(!Error::MirrorFailed("401".into()).is_retryable());
        assert!(!Error::ChannelNotFound("UC".into()).is_retryable());
        assert!(!Error::InvalidInput("bad".into()).is_retryable());
    }

    #[test]
    fn test_not_found_classification() {
        assert!(Error::JobNotFound(Uuid::nil()).is_not_found());
        assert!(Error::ChannelNotFound("UC".into()).is_not_found());
        assert!(Error::NotFound("x".into()).is_not_found());
        assert!(!Error::Internal("x".into()).is_not_found());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(msg) => {
                assert!(!msg.is_empty());
            }
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        match err {
            Error::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
