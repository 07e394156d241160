//! Object storage gateways.
//!
//! Keys are `/`-separated, e.g. `music/{job_id}/song artist.mp3`. Public URLs
//! are built by percent-encoding each key segment below a base URL.
//!
//! Environment variables (see [`storage_from_env`]):
//! - `STORAGE_BACKEND`: `s3` (default) or `filesystem`
//! - `S3_BUCKET`, `S3_REGION`, `S3_ACCESS_KEY_ID`, `S3_SECRET_ACCESS_KEY`
//! - `S3_ENDPOINT`: S3-compatible endpoint (MinIO, R2, ...)
//! - `S3_PUBLIC_URL`: public base URL for resolved object links
//! - `STORAGE_PATH`, `STORAGE_PUBLIC_URL`: filesystem backend root and base URL

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::Client;
use reqwest::Url;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use tuneflow_core::{Error, ObjectStorage, Result};

/// Join a storage key onto a base URL, percent-encoding each key segment.
pub fn join_url(base: &str, key: &str) -> String {
    let fallback = || format!("{}/{}", base.trim_end_matches('/'), key);
    let Ok(mut url) = Url::parse(base) else {
        return fallback();
    };
    match url.path_segments_mut() {
        Ok(mut segments) => {
            segments.pop_if_empty().extend(key.split('/'));
        }
        Err(()) => return fallback(),
    }
    url.to_string()
}

// =============================================================================
// S3
// =============================================================================

/// Connection settings for an S3 or S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket_name: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// For MinIO/S3-compatible services.
    pub endpoint_url: Option<String>,
    /// Base URL objects are publicly served from.
    pub public_url: Option<String>,
}

impl S3Config {
    pub fn from_env() -> Result<Self> {
        let required = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::Config(format!("{} must be set", name)))
        };
        let optional = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        Ok(Self {
            bucket_name: required("S3_BUCKET")?,
            region: optional("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            access_key_id: required("S3_ACCESS_KEY_ID")?,
            secret_access_key: required("S3_SECRET_ACCESS_KEY")?,
            endpoint_url: optional("S3_ENDPOINT"),
            public_url: optional("S3_PUBLIC_URL"),
        })
    }

    /// Base URL for [`ObjectStorage::resolve_url`].
    fn url_base(&self) -> String {
        if let Some(public) = &self.public_url {
            return public.clone();
        }
        match &self.endpoint_url {
            Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), self.bucket_name),
            None => format!(
                "https://{}.s3.{}.amazonaws.com",
                self.bucket_name, self.region
            ),
        }
    }
}

/// [`ObjectStorage`] on an S3 bucket.
pub struct S3Storage {
    client: Client,
    bucket_name: String,
    url_base: String,
}

impl S3Storage {
    pub async fn new(config: S3Config) -> Result<Self> {
        let url_base = config.url_base();
        let credentials = Credentials::new(
            config.access_key_id,
            config.secret_access_key,
            None, // session_token
            None, // expiration
            "tuneflow-s3-config",
        );

        let mut aws_config_builder = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .credentials_provider(credentials);

        let path_style = config.endpoint_url.is_some();
        if let Some(endpoint) = config.endpoint_url {
            aws_config_builder = aws_config_builder.endpoint_url(endpoint);
        }

        let aws_config = aws_config_builder.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
            .force_path_style(path_style)
            .build();

        info!(
            subsystem = "storage",
            component = "s3",
            bucket = %config.bucket_name,
            "S3 storage configured"
        );

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket_name: config.bucket_name,
            url_base,
        })
    }
}

/// A missing key is `NotFound`, like on the filesystem backend.
fn get_object_error(key: &str, err: SdkError<GetObjectError>) -> Error {
    let err = err.into_service_error();
    if err.is_no_such_key() {
        Error::NotFound(format!("Object {}", key))
    } else {
        Error::Storage(format!(
            "Get object {} failed: {}",
            key,
            DisplayErrorContext(&err)
        ))
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        let size = data.len();
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(data.into())
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| Error::Storage(format!("Put object {} failed: {}", key, e)))?;

        debug!(subsystem = "storage", component = "s3", key, bytes = size, "Object uploaded");
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| get_object_error(key, e))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Storage(format!("Read object {} failed: {}", key, e)))?
            .into_bytes()
            .to_vec();
        Ok(data)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        // S3 reports success for missing keys.
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::Storage(format!("Delete object {} failed: {}", key, e)))?;
        debug!(subsystem = "storage", component = "s3", key, "Object deleted");
        Ok(())
    }

    fn resolve_url(&self, key: &str) -> String {
        join_url(&self.url_base, key)
    }
}

// =============================================================================
// FILESYSTEM
// =============================================================================

/// [`ObjectStorage`] in a local directory, served by some static file server
/// at `public_url`.
pub struct FilesystemStorage {
    base_path: PathBuf,
    public_url: String,
}

impl FilesystemStorage {
    pub fn new(base_path: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            public_url: public_url.into(),
        }
    }

    /// Keys may not escape the base directory.
    fn full_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(Error::InvalidInput(format!("Invalid storage key: {}", key)));
        }
        Ok(self.base_path.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for FilesystemStorage {
    async fn upload(&self, key: &str, data: Vec<u8>, _content_type: &str) -> Result<()> {
        let full_path = self.full_path(key)?;
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "storage: create_dir_all failed");
                e
            })?;
        }

        // Atomic write: temp file + rename
        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, &full_path).await?;

        debug!(subsystem = "storage", component = "filesystem", key, bytes = data.len(), "Object written");
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(key)?;
        match fs::read(&full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Object {}", key)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let full_path = self.full_path(key)?;
        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn resolve_url(&self, key: &str) -> String {
        join_url(&self.public_url, key)
    }
}

// =============================================================================
// SELECTION
// =============================================================================

/// Which storage gateway to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackendKind {
    S3,
    Filesystem,
}

impl std::str::FromStr for StorageBackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "s3" => Ok(Self::S3),
            "filesystem" | "fs" => Ok(Self::Filesystem),
            other => Err(Error::Config(format!("Unknown STORAGE_BACKEND: {}", other))),
        }
    }
}

/// Build the storage gateway selected by `STORAGE_BACKEND`.
pub async fn storage_from_env() -> Result<Arc<dyn ObjectStorage>> {
    let kind: StorageBackendKind = std::env::var("STORAGE_BACKEND")
        .unwrap_or_else(|_| "s3".to_string())
        .parse()?;

    match kind {
        StorageBackendKind::S3 => Ok(Arc::new(S3Storage::new(S3Config::from_env()?).await?)),
        StorageBackendKind::Filesystem => {
            let path = std::env::var("STORAGE_PATH").unwrap_or_else(|_| "./data".to_string());
            let public_url = std::env::var("STORAGE_PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:8080/files".to_string());
            info!(subsystem = "storage", component = "filesystem", path = %path, "Filesystem storage configured");
            Ok(Arc::new(FilesystemStorage::new(path, public_url)))
        }
    }
}
