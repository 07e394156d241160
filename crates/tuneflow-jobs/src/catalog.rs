//! Catalog sync engine: mirrors YouTube subscriptions, channel uploads and
//! video categories into the local catalog, and manages per-user library
//! state on top of it.
//!
//! Every sync procedure is idempotent and safe to re-run. Remote data is
//! consumed page by page; nothing holds a transaction across a remote fetch.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use futures::TryStreamExt;
use tracing::{debug, info, instrument, trace, warn};

use tuneflow_core::defaults::{CHANNEL_REFRESH_WINDOW_DAYS, NEW_CHANNEL_BACKFILL_DAYS};
use tuneflow_core::{
    publish_json, CatalogProvider, CategoryRepository, ChannelRepository, ChannelUpdate, Error,
    NotificationChannel, Page, PageRequest, PubSub, RemoteChannel, RemoteVideo, Result,
    SubscriptionListing, SubscriptionRepository, Task, TaskDispatcher, UserRepository,
    VideoListing, VideoQuery, VideoRepository, YoutubeChannel, YoutubeSubscription, YoutubeVideo,
    YoutubeVideoCategory,
};

/// Collaborators used by the catalog sync engine.
#[derive(Clone)]
pub struct CatalogDeps {
    pub users: Arc<dyn UserRepository>,
    pub channels: Arc<dyn ChannelRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub videos: Arc<dyn VideoRepository>,
    pub categories: Arc<dyn CategoryRepository>,
    pub provider: Arc<dyn CatalogProvider>,
    pub pubsub: Arc<dyn PubSub>,
    pub tasks: Arc<dyn TaskDispatcher>,
}

/// Start of the sync window for a `date_after` day (midnight UTC).
pub fn window_start(date_after: NaiveDate) -> DateTime<Utc> {
    date_after.and_time(NaiveTime::MIN).and_utc()
}

/// Mirrors the remote catalog.
#[derive(Clone)]
pub struct CatalogSyncEngine {
    deps: CatalogDeps,
}

impl CatalogSyncEngine {
    pub fn new(deps: CatalogDeps) -> Self {
        Self { deps }
    }

    // =========================================================================
    // SYNC
    // =========================================================================

    /// Ingest one channel's uploads, newest first, stopping at the first
    /// video published before `date_after`.
    ///
    /// Publishes `updating: true` before and `updating: false` after the
    /// scan. Returns the number of videos upserted.
    #[instrument(
        skip(self),
        fields(subsystem = "catalog", component = "sync_engine", op = "add_channel_videos")
    )]
    pub async fn add_channel_videos(
        &self,
        channel_id: &str,
        date_after: Option<NaiveDate>,
    ) -> Result<usize> {
        let start = Instant::now();
        if self.deps.channels.get(channel_id).await?.is_none() {
            return Err(Error::ChannelNotFound(channel_id.to_string()));
        }

        self.deps.channels.set_updating(channel_id, true).await?;
        self.notify_channel(channel_id, true).await;

        let cutoff = date_after.map(window_start);
        let mut pages = self.deps.provider.stream_channel_latest_videos(channel_id);
        let mut upserted = 0usize;
        let mut page_no = 0u32;

        'pages: while let Some(page) = pages.try_next().await? {
            page_no += 1;
            trace!(page = page_no, item_count = page.len(), "Processing video page");
            for remote in page {
                if cutoff.is_some_and(|c| remote.published_at < c) {
                    debug!(
                        page = page_no,
                        video_id = %remote.id,
                        "Reached videos older than the sync window"
                    );
                    break 'pages;
                }
                self.upsert_video(channel_id, remote).await?;
                upserted += 1;
            }
        }
        drop(pages);

        self.deps
            .channels
            .finish_update(channel_id, Utc::now())
            .await?;
        self.notify_channel(channel_id, false).await;

        info!(
            item_count = upserted,
            duration_ms = start.elapsed().as_millis() as u64,
            "Channel videos synced"
        );
        Ok(upserted)
    }

    /// Schedule [`CatalogSyncEngine::add_channel_videos`] for every channel
    /// with an active subscription.
    ///
    /// Without an override each channel is scanned back to
    /// `min(now - 1 day, last_videos_updated)`. Returns the number of
    /// channels scheduled.
    #[instrument(
        skip(self),
        fields(subsystem = "catalog", component = "sync_engine", op = "update_channel_videos")
    )]
    pub async fn update_channel_videos(&self, date_after: Option<NaiveDate>) -> Result<usize> {
        let channels = self.deps.channels.list_subscribed().await?;
        let refresh_floor = Utc::now() - Duration::days(CHANNEL_REFRESH_WINDOW_DAYS);

        for channel in &channels {
            let date = date_after.unwrap_or_else(|| {
                refresh_floor
                    .min(channel.last_videos_updated)
                    .date_naive()
            });
            self.deps
                .tasks
                .dispatch(Task::AddChannelVideos {
                    channel_id: channel.id.clone(),
                    date_after: Some(date),
                })
                .await?;
        }

        info!(item_count = channels.len(), "Channel refreshes scheduled");
        Ok(channels.len())
    }

    /// Reconcile a user's mirrored subscriptions with their live YouTube
    /// subscription list.
    ///
    /// Channels seen in the remote list are marked; once the list is
    /// exhausted every mirrored subscription that was not marked is
    /// soft-deleted. Marks only live for one pass: they are cleared before
    /// streaming and again when the pass ends, whether or not it succeeded.
    #[instrument(
        skip(self),
        fields(subsystem = "catalog", component = "sync_engine", op = "update_user_subscriptions")
    )]
    pub async fn update_user_subscriptions(&self, email: &str) -> Result<()> {
        let Some(remote_channel_id) = self.deps.users.linked_channel(email).await? else {
            debug!("User has no linked channel, nothing to mirror");
            return Ok(());
        };

        self.deps.subscriptions.clear_seen(email).await?;
        let outcome = self.reconcile_subscriptions(email, &remote_channel_id).await;
        let cleared = self.deps.subscriptions.clear_seen(email).await;

        let (seen, removed) = match outcome {
            Ok(counts) => counts,
            Err(e) => {
                if let Err(clear_err) = cleared {
                    warn!(error = %clear_err, "Failed to clear seen markers after aborted pass");
                }
                return Err(e);
            }
        };
        cleared?;

        info!(item_count = seen, removed, "User subscriptions reconciled");
        Ok(())
    }

    /// Mark every remotely listed channel, then soft-delete the rest.
    /// Returns `(seen, removed)`.
    async fn reconcile_subscriptions(
        &self,
        email: &str,
        remote_channel_id: &str,
    ) -> Result<(usize, u64)> {
        let mut pages = self
            .deps
            .provider
            .stream_channel_subscriptions(remote_channel_id);
        let mut seen = 0usize;

        while let Some(page) = pages.try_next().await? {
            for remote in page {
                self.ensure_channel(&remote).await?;
                self.ensure_mirrored_subscription(email, &remote.id).await?;
                self.deps.subscriptions.mark_seen(email, &remote.id).await?;
                seen += 1;
            }
        }
        drop(pages);

        let removed = self
            .deps
            .subscriptions
            .soft_delete_unseen(email, Utc::now())
            .await?;
        Ok((seen, removed))
    }

    /// Schedule a subscription reconciliation for every known user.
    pub async fn update_subscriptions(&self) -> Result<usize> {
        let emails = self.deps.users.list_emails().await?;
        for email in &emails {
            self.deps
                .tasks
                .dispatch(Task::UpdateUserSubscriptions {
                    email: email.clone(),
                })
                .await?;
        }
        info!(
            subsystem = "catalog",
            op = "update_subscriptions",
            item_count = emails.len(),
            "Subscription reconciliations scheduled"
        );
        Ok(emails.len())
    }

    /// Upsert every remote category, one commit per page.
    pub async fn update_video_categories(&self) -> Result<usize> {
        let mut pages = self.deps.provider.stream_video_categories();
        let mut total = 0usize;
        while let Some(page) = pages.try_next().await? {
            self.deps.categories.upsert_page(&page).await?;
            total += page.len();
        }
        info!(
            subsystem = "catalog",
            op = "update_video_categories",
            item_count = total,
            "Video categories synced"
        );
        Ok(total)
    }

    // =========================================================================
    // USER SUBSCRIPTIONS
    // =========================================================================

    /// Subscribe a user to a channel explicitly.
    pub async fn add_user_subscription(&self, email: &str, channel_id: &str) -> Result<()> {
        if self.deps.channels.get(channel_id).await?.is_none() {
            let remote = self
                .deps
                .provider
                .get_channel_info(channel_id)
                .await?
                .ok_or_else(|| Error::ChannelNotFound(channel_id.to_string()))?;
            self.deps
                .channels
                .insert(&YoutubeChannel {
                    id: remote.id,
                    title: remote.title,
                    thumbnail: remote.thumbnail,
                    updating: false,
                    last_videos_updated: Utc::now(),
                })
                .await?;
        }

        match self.deps.subscriptions.get(email, channel_id).await? {
            Some(sub) if sub.is_active() => {
                return Err(Error::InvalidInput(format!(
                    "Already subscribed to {}",
                    channel_id
                )))
            }
            Some(_) => {
                self.deps
                    .subscriptions
                    .restore(email, channel_id, true)
                    .await?
            }
            None => {
                self.deps
                    .subscriptions
                    .insert(&YoutubeSubscription {
                        email: email.to_string(),
                        channel_id: channel_id.to_string(),
                        user_submitted: true,
                        created_at: Utc::now(),
                        deleted_at: None,
                    })
                    .await?
            }
        }

        self.deps
            .tasks
            .dispatch(Task::AddChannelVideos {
                channel_id: channel_id.to_string(),
                date_after: None,
            })
            .await?;
        info!(user = email, channel_id, "User subscribed to channel");
        Ok(())
    }

    pub async fn remove_user_subscription(&self, email: &str, channel_id: &str) -> Result<()> {
        if !self
            .deps
            .subscriptions
            .soft_delete(email, channel_id, Utc::now())
            .await?
        {
            return Err(Error::NotFound(format!(
                "Subscription to {}",
                channel_id
            )));
        }
        Ok(())
    }

    pub async fn list_user_subscriptions(
        &self,
        email: &str,
        page: PageRequest,
    ) -> Result<Page<SubscriptionListing>> {
        self.deps.subscriptions.list_for_user(email, page).await
    }

    // =========================================================================
    // LIBRARY STATE
    // =========================================================================

    pub async fn like_video(&self, email: &str, video_id: &str) -> Result<()> {
        self.require_video(video_id).await?;
        self.deps.videos.like(email, video_id).await
    }

    /// Returns whether the video was liked.
    pub async fn unlike_video(&self, email: &str, video_id: &str) -> Result<bool> {
        self.deps.videos.unlike(email, video_id).await
    }

    pub async fn mark_video_watched(&self, email: &str, video_id: &str) -> Result<()> {
        self.require_video(video_id).await?;
        self.deps.videos.mark_watched(email, video_id).await
    }

    pub async fn queue_video(&self, email: &str, video_id: &str) -> Result<()> {
        self.require_video(video_id).await?;
        self.deps.videos.enqueue(email, video_id).await
    }

    /// Returns whether the video was queued.
    pub async fn dequeue_video(&self, email: &str, video_id: &str) -> Result<bool> {
        self.deps.videos.dequeue(email, video_id).await
    }

    pub async fn list_videos(
        &self,
        email: &str,
        query: &VideoQuery,
        page: PageRequest,
    ) -> Result<Page<VideoListing>> {
        self.deps.videos.list(email, query, page).await
    }

    pub async fn list_video_categories(&self) -> Result<Vec<YoutubeVideoCategory>> {
        self.deps.categories.list().await
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    async fn require_video(&self, video_id: &str) -> Result<()> {
        match self.deps.videos.get(video_id).await? {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("Video {}", video_id))),
        }
    }

    /// `published_at` only moves when the title or thumbnail changed.
    async fn upsert_video(&self, channel_id: &str, remote: RemoteVideo) -> Result<()> {
        match self.deps.videos.get(&remote.id).await? {
            Some(mut video) => {
                let republished =
                    video.title != remote.title || video.thumbnail != remote.thumbnail;
                video.description = remote.description;
                if republished {
                    trace!(video_id = %video.id, "Video changed, moving publish date");
                    video.title = remote.title;
                    video.thumbnail = remote.thumbnail;
                    video.published_at = remote.published_at;
                }
                self.deps.videos.update(&video).await
            }
            None => {
                trace!(video_id = %remote.id, "New video");
                self.deps
                    .videos
                    .insert(&YoutubeVideo {
                        id: remote.id,
                        title: remote.title,
                        thumbnail: remote.thumbnail,
                        description: remote.description,
                        channel_id: channel_id.to_string(),
                        category_id: remote.category_id,
                        published_at: remote.published_at,
                    })
                    .await
            }
        }
    }

    /// Refresh a known channel's metadata, or create it and schedule its
    /// backfill.
    async fn ensure_channel(&self, remote: &RemoteChannel) -> Result<()> {
        match self.deps.channels.get(&remote.id).await? {
            Some(channel) => {
                if channel.title != remote.title || channel.thumbnail != remote.thumbnail {
                    self.deps
                        .channels
                        .update_metadata(&remote.id, &remote.title, &remote.thumbnail)
                        .await?;
                }
            }
            None => {
                self.deps
                    .channels
                    .insert(&YoutubeChannel {
                        id: remote.id.clone(),
                        title: remote.title.clone(),
                        thumbnail: remote.thumbnail.clone(),
                        updating: false,
                        last_videos_updated: Utc::now()
                            - Duration::days(NEW_CHANNEL_BACKFILL_DAYS),
                    })
                    .await?;
                self.deps
                    .tasks
                    .dispatch(Task::AddChannelVideos {
                        channel_id: remote.id.clone(),
                        date_after: None,
                    })
                    .await?;
                debug!(channel_id = %remote.id, "New channel, backfill scheduled");
            }
        }
        Ok(())
    }

    /// A dropped mirrored subscription comes back; a dropped explicit one
    /// stays dropped.
    async fn ensure_mirrored_subscription(&self, email: &str, channel_id: &str) -> Result<()> {
        match self.deps.subscriptions.get(email, channel_id).await? {
            None => {
                self.deps
                    .subscriptions
                    .insert(&YoutubeSubscription {
                        email: email.to_string(),
                        channel_id: channel_id.to_string(),
                        user_submitted: false,
                        created_at: Utc::now(),
                        deleted_at: None,
                    })
                    .await
            }
            Some(sub) if !sub.is_active() && !sub.user_submitted => {
                self.deps
                    .subscriptions
                    .restore(email, channel_id, false)
                    .await
            }
            Some(_) => Ok(()),
        }
    }

    async fn notify_channel(&self, channel_id: &str, updating: bool) {
        let update = ChannelUpdate {
            id: channel_id.to_string(),
            updating,
        };
        if let Err(e) = publish_json(
            self.deps.pubsub.as_ref(),
            NotificationChannel::YoutubeChannelUpdate,
            &update,
        )
        .await
        {
            warn!(channel_id, error = %e, "Failed to publish channel update");
        }
    }
}
