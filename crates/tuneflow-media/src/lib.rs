//! # tuneflow-media
//!
//! Adapters behind the tool, storage and mirror traits of `tuneflow-core`:
//!
//! - [`YtDlpDownloader`]: audio extraction from video URLs
//! - [`FfmpegTranscoder`]: normalization to mp3
//! - [`Id3TagEditor`]: tag read-back and tag/artwork writing
//! - [`HttpImageFetcher`]: artwork discovery and download
//! - [`S3Storage`] / [`FilesystemStorage`]: object storage gateways
//! - [`HttpWebDavMirror`]: WebDAV PUT of produced files

pub mod artwork;
pub mod ffmpeg;
pub mod process;
pub mod storage;
pub mod tags;
pub mod webdav;
pub mod ytdlp;

pub use artwork::{extract_image_links, parse_inline_image, HttpImageFetcher};
pub use ffmpeg::FfmpegTranscoder;
pub use process::run_cmd_with_timeout;
pub use storage::{
    join_url, storage_from_env, FilesystemStorage, S3Config, S3Storage, StorageBackendKind,
};
pub use tags::Id3TagEditor;
pub use webdav::HttpWebDavMirror;
pub use ytdlp::YtDlpDownloader;
