//! WebDAV mirroring of produced files.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, instrument};

use tuneflow_core::defaults::HTTP_TIMEOUT_SECS;
use tuneflow_core::{Error, Result, WebDavCredentials, WebDavMirror};

/// [`WebDavMirror`] issuing a single authenticated PUT per file.
#[derive(Clone)]
pub struct HttpWebDavMirror {
    client: Client,
}

impl Default for HttpWebDavMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpWebDavMirror {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

/// `{base}/{filename}` with exactly one separating slash.
pub(crate) fn target_url(base: &str, filename: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), filename)
}

#[async_trait]
impl WebDavMirror for HttpWebDavMirror {
    #[instrument(skip(self, credentials, data), fields(subsystem = "webdav", bytes = data.len()))]
    async fn put(
        &self,
        credentials: &WebDavCredentials,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        let url = target_url(&credentials.url, filename);
        let response = self
            .client
            .put(&url)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .body(data)
            .send()
            .await
            .map_err(|e| Error::MirrorFailed(format!("PUT {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::MirrorFailed(format!("PUT {} returned {}", url, status)));
        }

        info!(url = %url, status = status.as_u16(), "File mirrored to WebDAV");
        Ok(())
    }
}
