//! Response payloads of the YouTube Data API v3 (only the fields we read).

use chrono::{DateTime, Utc};
use serde::Deserialize;

use tuneflow_core::{RemoteCategory, RemoteChannel, RemoteVideo};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Thumbnail {
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Thumbnails {
    pub high: Option<Thumbnail>,
    pub medium: Option<Thumbnail>,
    pub default: Option<Thumbnail>,
}

impl Thumbnails {
    /// Largest available rendition, or empty.
    pub fn best(self) -> String {
        self.high
            .or(self.medium)
            .or(self.default)
            .map(|t| t.url)
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResourceId {
    pub channel_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SubscriptionSnippet {
    pub title: String,
    pub resource_id: ResourceId,
    #[serde(default)]
    pub thumbnails: Thumbnails,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionItem {
    pub snippet: SubscriptionSnippet,
}

impl From<SubscriptionItem> for RemoteChannel {
    fn from(item: SubscriptionItem) -> Self {
        Self {
            id: item.snippet.resource_id.channel_id,
            title: item.snippet.title,
            thumbnail: item.snippet.thumbnails.best(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelSnippet {
    pub title: String,
    #[serde(default)]
    pub thumbnails: Thumbnails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RelatedPlaylists {
    pub uploads: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChannelContentDetails {
    pub related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChannelItem {
    pub id: String,
    pub snippet: Option<ChannelSnippet>,
    pub content_details: Option<ChannelContentDetails>,
}

impl ChannelItem {
    pub fn uploads_playlist(&self) -> Option<String> {
        self.content_details
            .as_ref()
            .and_then(|d| d.related_playlists.uploads.clone())
    }

    pub fn into_remote(self) -> Option<RemoteChannel> {
        let snippet = self.snippet?;
        Some(RemoteChannel {
            id: self.id,
            title: snippet.title,
            thumbnail: snippet.thumbnails.best(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlaylistItemDetails {
    pub video_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlaylistItem {
    pub content_details: PlaylistItemDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VideoSnippet {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub thumbnails: Thumbnails,
    pub category_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VideoItem {
    pub id: String,
    pub snippet: VideoSnippet,
}

impl From<VideoItem> for RemoteVideo {
    fn from(item: VideoItem) -> Self {
        Self {
            id: item.id,
            title: item.snippet.title,
            thumbnail: item.snippet.thumbnails.best(),
            description: item.snippet.description,
            published_at: item.snippet.published_at,
            category_id: item.snippet.category_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CategorySnippet {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CategoryItem {
    pub id: String,
    pub snippet: CategorySnippet,
}

impl From<CategoryItem> for RemoteCategory {
    fn from(item: CategoryItem) -> Self {
        Self {
            id: item.id,
            name: item.snippet.title,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thumbnail_preference() {
        let thumbs: Thumbnails = serde_json::from_value(serde_json::json!({
            "default": {"url": "d"},
            "medium": {"url": "m"}
        }))
        .unwrap();
        assert_eq!(thumbs.best(), "m");
        assert_eq!(Thumbnails::default().best(), "");
    }

    #[test]
    fn test_video_item_maps_to_remote() {
        let item: VideoItem = serde_json::from_value(serde_json::json!({
            "id": "v1",
            "snippet": {
                "title": "T",
                "publishedAt": "2024-03-09T10:00:00Z",
                "thumbnails": {"high": {"url": "h"}},
                "categoryId": "10"
            }
        }))
        .unwrap();
        let video = RemoteVideo::from(item);
        assert_eq!(video.thumbnail, "h");
        assert_eq!(video.description, "");
        assert_eq!(video.category_id.as_deref(), Some("10"));
        assert_eq!(video.published_at.to_rfc3339(), "2024-03-09T10:00:00+00:00");
    }
}
