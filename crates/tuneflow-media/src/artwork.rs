//! Artwork discovery and download.
//!
//! A submitted artwork link is either a direct image or a page that embeds
//! one (a SoundCloud track page, a shop listing, ...). Pages are scanned for
//! quoted image paths and the first plausible one is taken; SoundCloud pages
//! prefer the 500x500 artwork rendition.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Response, Url};
use tracing::{debug, instrument};

use tuneflow_core::defaults::{BROWSER_USER_AGENT, HTTP_TIMEOUT_SECS};
use tuneflow_core::{
    detect_image_extension, image_extension_from_content_type, Artwork, Error, ImageFetcher,
    Result,
};

/// Quoted path ending in an image extension.
const IMAGE_LINK_PATTERN: &str = r#""([^"]+\.(?:jpg|png|ico|jpeg))""#;

/// [`ImageFetcher`] over plain HTTP with a browser user agent.
#[derive(Clone)]
pub struct HttpImageFetcher {
    client: Client,
    user_agent: String,
    link_pattern: Regex,
}

impl Default for HttpImageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpImageFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self::with_client(client)
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            user_agent: BROWSER_USER_AGENT.to_string(),
            link_pattern: Regex::new(IMAGE_LINK_PATTERN).expect("image link pattern is valid"),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    async fn get(&self, url: &str) -> Result<Response> {
        Ok(self
            .client
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await?)
    }
}

/// The image extension announced by a response, if it is an image at all.
fn response_image_extension(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(image_extension_from_content_type)
}

/// Absolute http(s) image links quoted in `html`, in page order, deduplicated.
pub fn extract_image_links(pattern: &Regex, base: &Url, html: &str) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();
    for capture in pattern.captures_iter(html) {
        let raw = capture[1].replace('\\', "");
        let resolved = if raw.starts_with("http") {
            Url::parse(&raw)
        } else {
            base.join(&raw)
        };
        let Ok(url) = resolved else { continue };
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            continue;
        }
        let url = url.to_string();
        if !links.contains(&url) {
            links.push(url);
        }
    }
    links
}

/// Decode inline artwork: a `data:image/<ext>;base64,` URI, or bare base64
/// whose bytes carry a recognized image signature.
pub fn parse_inline_image(value: &str) -> Option<Artwork> {
    let value = value.trim();
    if let Some(rest) = value.strip_prefix("data:") {
        let (meta, payload) = rest.split_once(',')?;
        let mime = meta.strip_suffix(";base64")?;
        let extension = image_extension_from_content_type(mime)?;
        let data = STANDARD.decode(payload.trim()).ok()?;
        return Some(Artwork { data, extension });
    }
    if value.starts_with("http://") || value.starts_with("https://") {
        return None;
    }
    let data = STANDARD.decode(value).ok()?;
    let extension = detect_image_extension(&data)?;
    Some(Artwork { data, extension })
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    #[instrument(skip(self), fields(subsystem = "media", component = "artwork"))]
    async fn resolve_primary_image(&self, candidate_url: &str) -> Result<String> {
        let response = self.get(candidate_url).await?;
        if !response.status().is_success() {
            return Err(Error::Request(format!(
                "Cannot resolve artwork: {} returned {}",
                candidate_url,
                response.status()
            )));
        }
        if response_image_extension(&response).is_some() {
            return Ok(candidate_url.to_string());
        }

        let base = response.url().clone();
        let html = response.text().await?;
        let links = extract_image_links(&self.link_pattern, &base, &html);
        debug!(candidates = links.len(), "Scanned page for artwork");

        let chosen = if candidate_url.contains("soundcloud.com") {
            links
                .into_iter()
                .find(|l| l.contains("artworks") && l.contains("500x500"))
        } else {
            links.into_iter().next()
        };

        chosen.ok_or_else(|| Error::NotFound(format!("Cannot resolve artwork: {}", candidate_url)))
    }

    async fn fetch_image(&self, url: &str) -> Result<Artwork> {
        let response = self.get(url).await?;
        if !response.status().is_success() {
            return Err(Error::Request(format!(
                "Artwork fetch failed: {} returned {}",
                url,
                response.status()
            )));
        }
        let extension = response_image_extension(&response)
            .ok_or_else(|| Error::InvalidInput(format!("Not an image: {}", url)))?;
        let data = response.bytes().await?.to_vec();
        Ok(Artwork { data, extension })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    fn pattern() -> Regex {
        Regex::new(IMAGE_LINK_PATTERN).unwrap()
    }

    #[test]
    fn test_extract_links_resolves_relative_and_dedups() {
        let base = Url::parse("https://shop.example.com/albums/42").unwrap();
        let html = r#"
            <img src="/covers/front.jpg">
            <meta content="https://cdn.example.com/a.png">
            <img src="/covers/front.jpg">
            <a href="ftp://files.example.com/x.jpg">
        "#;

        let links = extract_image_links(&pattern(), &base, html);
        assert_eq!(
            links,
            vec![
                "https://shop.example.com/covers/front.jpg".to_string(),
                "https://cdn.example.com/a.png".to_string(),
            ]
        );
    }

    #[test]
    fn test_extract_links_strips_json_escapes() {
        let base = Url::parse("https://example.com/").unwrap();
        let html = r#"{"artwork_url":"https:\/\/i1.sndcdn.com\/artworks-1-500x500.jpg"}"#;

        let links = extract_image_links(&pattern(), &base, html);
        assert_eq!(links, vec!["https://i1.sndcdn.com/artworks-1-500x500.jpg"]);
    }

    #[test]
    fn test_parse_data_uri() {
        let uri = format!("data:image/png;base64,{}", STANDARD.encode(PNG));
        let artwork = parse_inline_image(&uri).unwrap();
        assert_eq!(artwork.extension, "png");
        assert_eq!(artwork.data, PNG);
    }

    #[test]
    fn test_parse_bare_base64_requires_image_signature() {
        let artwork = parse_inline_image(&STANDARD.encode(PNG)).unwrap();
        assert_eq!(artwork.extension, "png");

        assert!(parse_inline_image(&STANDARD.encode(b"plain text")).is_none());
        assert!(parse_inline_image("https://example.com/a.png").is_none());
    }
}
