//! Notification channel contract, payload schemas, and the in-process bus.
//!
//! Notifications are best-effort: publishing never waits for subscribers,
//! delivery is at-most-once, and a subscriber that is not connected at
//! publish time misses the message. Listeners reconcile by re-reading
//! persisted state.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::models::JobStatus;
use crate::{Error, Result};

/// Named broadcast channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    MusicJobUpdate,
    YoutubeChannelUpdate,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::MusicJobUpdate => "music_job_update",
            NotificationChannel::YoutubeChannelUpdate => "youtube_channel_update",
        }
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationChannel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "music_job_update" => Ok(NotificationChannel::MusicJobUpdate),
            "youtube_channel_update" => Ok(NotificationChannel::YoutubeChannelUpdate),
            other => Err(Error::InvalidInput(format!(
                "Unknown notification channel: {}",
                other
            ))),
        }
    }
}

/// A message received from a channel; the payload is raw JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: NotificationChannel,
    pub payload: String,
}

impl Notification {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}

/// `{"id": <job id>, "status": "STARTED"|"COMPLETED"|"FAILED"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicJobUpdate {
    pub id: String,
    pub status: JobStatus,
}

/// `{"id": <channel id>, "updating": true|false}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelUpdate {
    pub id: String,
    pub updating: bool,
}

/// Publish/subscribe broadcast of small JSON messages.
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Publish a JSON payload. Succeeds whether or not anyone is listening.
    async fn publish(&self, channel: NotificationChannel, payload: String) -> Result<()>;

    /// Subscribe to one or more channels. The stream is infinite; dropping it
    /// unsubscribes, and resubscribing restarts it.
    async fn subscribe(
        &self,
        channels: &[NotificationChannel],
    ) -> Result<BoxStream<'static, Notification>>;
}

/// Serialize `message` and publish it on `channel`.
pub async fn publish_json<P, T>(
    pubsub: &P,
    channel: NotificationChannel,
    message: &T,
) -> Result<()>
where
    P: PubSub + ?Sized,
    T: Serialize + Sync,
{
    let payload = serde_json::to_string(message)?;
    pubsub.publish(channel, payload).await
}

/// In-process notification bus on a tokio broadcast channel.
///
/// Lagging subscribers silently lose the oldest messages.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Notification>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    ///
    /// Recommended: 256 for production, 32 for tests.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}

#[async_trait]
impl PubSub for EventBus {
    async fn publish(&self, channel: NotificationChannel, payload: String) -> Result<()> {
        tracing::debug!(
            channel = %channel,
            subscriber_count = self.tx.receiver_count(),
            "EventBus publish"
        );
        // No receivers is not an error.
        let _ = self.tx.send(Notification { channel, payload });
        Ok(())
    }

    async fn subscribe(
        &self,
        channels: &[NotificationChannel],
    ) -> Result<BoxStream<'static, Notification>> {
        let wanted = channels.to_vec();
        let stream = BroadcastStream::new(self.tx.subscribe()).filter_map(move |item| {
            let keep = match item {
                Ok(n) if wanted.contains(&n.channel) => Some(n),
                Ok(_) => None,
                Err(e) => {
                    tracing::debug!(error = %e, "EventBus subscriber lagged");
                    None
                }
            };
            futures::future::ready(keep)
        });
        Ok(stream.boxed())
    }
}
