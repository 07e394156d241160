//! YouTube Data API v3 client.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use tuneflow_core::defaults::{HTTP_TIMEOUT_SECS, YOUTUBE_PAGE_SIZE, YOUTUBE_REGION_CODE};
use tuneflow_core::{
    CatalogProvider, Error, RemoteCategory, RemoteChannel, RemoteVideo, Result,
};

use crate::wire::{
    CategoryItem, ChannelItem, ListResponse, PlaylistItem, SubscriptionItem, VideoItem,
};

/// Default YouTube Data API endpoint.
pub const DEFAULT_YOUTUBE_API_BASE: &str = tuneflow_core::defaults::YOUTUBE_API_BASE;

/// Pagination cursor of a listing stream.
enum Cursor {
    Start,
    Next(String),
    Done,
}

impl Cursor {
    fn after(next_page_token: Option<String>) -> Self {
        match next_page_token {
            Some(token) if !token.is_empty() => Cursor::Next(token),
            _ => Cursor::Done,
        }
    }
}

/// [`CatalogProvider`] backed by the YouTube Data API with an API key.
#[derive(Clone)]
pub struct YoutubeClient {
    client: Client,
    base_url: String,
    api_key: String,
    region_code: String,
}

impl YoutubeClient {
    /// Create a client against the given API base URL.
    pub fn with_config(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        let base_url = base_url.into().trim_end_matches('/').to_string();

        info!(
            subsystem = "youtube",
            base_url = %base_url,
            "Initializing YouTube catalog client"
        );

        Self {
            client,
            base_url,
            api_key: api_key.into(),
            region_code: YOUTUBE_REGION_CODE.to_string(),
        }
    }

    /// Create from environment variables.
    ///
    /// Reads `YOUTUBE_API_KEY` (required), `YOUTUBE_API_BASE` and
    /// `YOUTUBE_REGION_CODE`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("YOUTUBE_API_KEY")
            .map_err(|_| Error::Config("YOUTUBE_API_KEY must be set".to_string()))?;
        let base_url = std::env::var("YOUTUBE_API_BASE")
            .unwrap_or_else(|_| DEFAULT_YOUTUBE_API_BASE.to_string());
        let mut client = Self::with_config(base_url, api_key);
        if let Ok(region) = std::env::var("YOUTUBE_REGION_CODE") {
            client.region_code = region;
        }
        Ok(client)
    }

    pub fn with_region_code(mut self, region_code: impl Into<String>) -> Self {
        self.region_code = region_code.into();
        self
    }

    /// GET `{base}/{endpoint}` with the API key; `None` on 404.
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<Option<T>> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(subsystem = "youtube", endpoint, status = status.as_u16(), "YouTube API error");
            return Err(Error::Request(format!(
                "YouTube {} returned {}: {}",
                endpoint,
                status,
                body.trim()
            )));
        }

        Ok(Some(response.json::<T>().await?))
    }

    async fn list<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<ListResponse<T>> {
        Ok(self
            .get_json::<ListResponse<T>>(endpoint, params)
            .await?
            .unwrap_or(ListResponse {
                items: Vec::new(),
                next_page_token: None,
            }))
    }

    async fn channel(&self, channel_id: &str) -> Result<Option<ChannelItem>> {
        let page: ListResponse<ChannelItem> = self
            .list(
                "channels",
                &[("part", "snippet,contentDetails"), ("id", channel_id)],
            )
            .await?;
        Ok(page.items.into_iter().next())
    }

    async fn subscriptions_page(
        &self,
        channel_id: &str,
        page_token: &str,
    ) -> Result<ListResponse<SubscriptionItem>> {
        let page_size = YOUTUBE_PAGE_SIZE.to_string();
        self.list(
            "subscriptions",
            &[
                ("part", "snippet"),
                ("channelId", channel_id),
                ("maxResults", page_size.as_str()),
                ("pageToken", page_token),
            ],
        )
        .await
    }

    /// One page of the uploads playlist, resolved to full video records.
    async fn uploads_page(
        &self,
        playlist_id: &str,
        page_token: &str,
    ) -> Result<(Vec<RemoteVideo>, Option<String>)> {
        let page_size = YOUTUBE_PAGE_SIZE.to_string();
        let page: ListResponse<PlaylistItem> = self
            .list(
                "playlistItems",
                &[
                    ("part", "contentDetails"),
                    ("playlistId", playlist_id),
                    ("maxResults", page_size.as_str()),
                    ("pageToken", page_token),
                ],
            )
            .await?;

        if page.items.is_empty() {
            return Ok((Vec::new(), page.next_page_token));
        }

        let ids = page
            .items
            .iter()
            .map(|i| i.content_details.video_id.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let videos: ListResponse<VideoItem> = self
            .list("videos", &[("part", "snippet"), ("id", ids.as_str())])
            .await?;

        let mut videos: Vec<RemoteVideo> = videos.items.into_iter().map(Into::into).collect();
        videos.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Ok((videos, page.next_page_token))
    }
}

#[async_trait]
impl CatalogProvider for YoutubeClient {
    fn stream_channel_subscriptions<'a>(
        &'a self,
        channel_id: &'a str,
    ) -> BoxStream<'a, Result<Vec<RemoteChannel>>> {
        stream::try_unfold(Cursor::Start, move |cursor| async move {
            let token = match cursor {
                Cursor::Done => return Ok::<_, Error>(None),
                Cursor::Start => String::new(),
                Cursor::Next(token) => token,
            };
            let page = self.subscriptions_page(channel_id, &token).await?;
            debug!(
                subsystem = "youtube",
                channel_id,
                item_count = page.items.len(),
                "Fetched subscriptions page"
            );
            let channels = page.items.into_iter().map(Into::into).collect();
            Ok(Some((channels, Cursor::after(page.next_page_token))))
        })
        .boxed()
    }

    fn stream_channel_latest_videos<'a>(
        &'a self,
        channel_id: &'a str,
    ) -> BoxStream<'a, Result<Vec<RemoteVideo>>> {
        // State: (uploads playlist once resolved, cursor)
        stream::try_unfold(
            (None::<String>, Cursor::Start),
            move |(playlist, cursor)| async move {
                let token = match cursor {
                    Cursor::Done => return Ok::<_, Error>(None),
                    Cursor::Start => String::new(),
                    Cursor::Next(token) => token,
                };
                let playlist = match playlist {
                    Some(p) => p,
                    None => self
                        .channel(channel_id)
                        .await?
                        .and_then(|c| c.uploads_playlist())
                        .ok_or_else(|| Error::ChannelNotFound(channel_id.to_string()))?,
                };

                let (videos, next) = self.uploads_page(&playlist, &token).await?;
                debug!(
                    subsystem = "youtube",
                    channel_id,
                    item_count = videos.len(),
                    "Fetched uploads page"
                );
                Ok(Some((videos, (Some(playlist), Cursor::after(next)))))
            },
        )
        .boxed()
    }

    fn stream_video_categories(&self) -> BoxStream<'_, Result<Vec<RemoteCategory>>> {
        stream::try_unfold(Cursor::Start, move |cursor| async move {
            let token = match cursor {
                Cursor::Done => return Ok::<_, Error>(None),
                Cursor::Start => String::new(),
                Cursor::Next(token) => token,
            };
            let page: ListResponse<CategoryItem> = self
                .list(
                    "videoCategories",
                    &[
                        ("part", "snippet"),
                        ("regionCode", self.region_code.as_str()),
                        ("pageToken", token.as_str()),
                    ],
                )
                .await?;
            let categories = page.items.into_iter().map(Into::into).collect();
            Ok(Some((categories, Cursor::after(page.next_page_token))))
        })
        .boxed()
    }

    async fn get_channel_info(&self, channel_id: &str) -> Result<Option<RemoteChannel>> {
        Ok(self.channel(channel_id).await?.and_then(ChannelItem::into_remote))
    }
}
