//! In-memory implementations of the repositories and the task queue.
//!
//! Semantics follow the PostgreSQL implementations closely enough for engine
//! tests; nothing is persisted.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use tuneflow_core::{
    CategoryRepository, ChannelRepository, Error, JobCompletion, MusicJob, MusicJobRepository,
    NewMusicJob, Page, PageRequest, QueuedTask, RemoteCategory, Result, SubscriptionListing,
    SubscriptionRepository, Task, TaskDispatcher, TaskKind, TaskQueue, TaskStatus,
    UserRepository, VideoListing, VideoOrder, VideoQuery, VideoRepository, WebDavConfig,
    WebDavRepository, YoutubeChannel, YoutubeSubscription, YoutubeVideo, YoutubeVideoCategory,
};

type UserKey = (String, String);

#[derive(Default)]
struct State {
    jobs: HashMap<Uuid, MusicJob>,
    webdav: HashMap<String, WebDavConfig>,
    users: BTreeSet<String>,
    user_channels: HashMap<String, String>,
    channels: HashMap<String, YoutubeChannel>,
    subscriptions: HashMap<UserKey, YoutubeSubscription>,
    seen: HashSet<UserKey>,
    videos: HashMap<String, YoutubeVideo>,
    likes: HashMap<UserKey, DateTime<Utc>>,
    watches: HashMap<UserKey, DateTime<Utc>>,
    queues: HashMap<UserKey, DateTime<Utc>>,
    categories: BTreeMap<String, String>,
}

fn key(email: &str, id: &str) -> UserKey {
    (email.to_string(), id.to_string())
}

/// Record store held in process memory.
///
/// Implements every repository trait; clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of a job, for assertions.
    pub fn job(&self, id: Uuid) -> Option<MusicJob> {
        self.lock().jobs.get(&id).cloned()
    }

    /// Snapshot of a channel, for assertions.
    pub fn channel(&self, id: &str) -> Option<YoutubeChannel> {
        self.lock().channels.get(id).cloned()
    }

    /// Snapshot of a subscription, for assertions.
    pub fn subscription(&self, email: &str, channel_id: &str) -> Option<YoutubeSubscription> {
        self.lock().subscriptions.get(&key(email, channel_id)).cloned()
    }

    /// Snapshot of a video, for assertions.
    pub fn video(&self, id: &str) -> Option<YoutubeVideo> {
        self.lock().videos.get(id).cloned()
    }

    pub fn video_count(&self) -> usize {
        self.lock().videos.len()
    }

    pub fn seen_count(&self) -> usize {
        self.lock().seen.len()
    }
}

#[async_trait]
impl MusicJobRepository for MemoryStore {
    async fn insert(&self, job: NewMusicJob) -> Result<MusicJob> {
        job.validate()?;
        let record = MusicJob {
            id: job.id,
            owner: job.owner,
            title: job.title,
            artist: job.artist,
            album: job.album,
            grouping: job.grouping,
            artwork_url: job.artwork_url,
            artwork_filename: job.artwork_filename,
            original_filename: job.original_filename,
            video_url: job.video_url,
            download_filename: None,
            download_url: None,
            created_at: Utc::now(),
            completed_at: None,
            failed_at: None,
            deleted_at: None,
        };
        let mut state = self.lock();
        if state.jobs.contains_key(&record.id) {
            return Err(Error::InvalidInput(format!("Duplicate job id {}", record.id)));
        }
        state.jobs.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: Uuid) -> Result<Option<MusicJob>> {
        Ok(self.job(id))
    }

    async fn list_for_owner(&self, owner: &str, page: PageRequest) -> Result<Page<MusicJob>> {
        let mut jobs: Vec<MusicJob> = self
            .lock()
            .jobs
            .values()
            .filter(|j| j.owner == owner && !j.is_deleted())
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page.slice(&jobs))
    }

    async fn mark_completed(
        &self,
        id: Uuid,
        completion: &JobCompletion,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.lock();
        match state.jobs.get_mut(&id) {
            Some(job) if !job.is_finished() && !job.is_deleted() => {
                job.download_filename = Some(completion.download_filename.clone());
                job.download_url = Some(completion.download_url.clone());
                job.completed_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_failed(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.lock();
        match state.jobs.get_mut(&id) {
            Some(job) if !job.is_finished() => {
                job.failed_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn soft_delete(&self, id: Uuid, owner: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.lock();
        match state.jobs.get_mut(&id) {
            Some(job) if job.owner == owner && !job.is_deleted() => {
                job.deleted_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl WebDavRepository for MemoryStore {
    async fn get(&self, owner: &str) -> Result<Option<WebDavConfig>> {
        Ok(self.lock().webdav.get(owner).cloned())
    }

    async fn upsert(&self, config: &WebDavConfig) -> Result<()> {
        self.lock()
            .webdav
            .insert(config.owner.clone(), config.clone());
        Ok(())
    }

    async fn delete(&self, owner: &str) -> Result<bool> {
        Ok(self.lock().webdav.remove(owner).is_some())
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn upsert(&self, email: &str) -> Result<()> {
        self.lock().users.insert(email.to_string());
        Ok(())
    }

    async fn list_emails(&self) -> Result<Vec<String>> {
        Ok(self.lock().users.iter().cloned().collect())
    }

    async fn link_channel(&self, email: &str, channel_id: &str) -> Result<()> {
        let mut state = self.lock();
        state.users.insert(email.to_string());
        state
            .user_channels
            .insert(email.to_string(), channel_id.to_string());
        Ok(())
    }

    async fn linked_channel(&self, email: &str) -> Result<Option<String>> {
        Ok(self.lock().user_channels.get(email).cloned())
    }
}

#[async_trait]
impl ChannelRepository for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<YoutubeChannel>> {
        Ok(self.channel(id))
    }

    async fn insert(&self, channel: &YoutubeChannel) -> Result<()> {
        let mut state = self.lock();
        if state.channels.contains_key(&channel.id) {
            return Err(Error::InvalidInput(format!(
                "Duplicate channel id {}",
                channel.id
            )));
        }
        state.channels.insert(channel.id.clone(), channel.clone());
        Ok(())
    }

    async fn update_metadata(&self, id: &str, title: &str, thumbnail: &str) -> Result<()> {
        let mut state = self.lock();
        let channel = state
            .channels
            .get_mut(id)
            .ok_or_else(|| Error::ChannelNotFound(id.to_string()))?;
        channel.title = title.to_string();
        channel.thumbnail = thumbnail.to_string();
        Ok(())
    }

    async fn set_updating(&self, id: &str, updating: bool) -> Result<()> {
        let mut state = self.lock();
        let channel = state
            .channels
            .get_mut(id)
            .ok_or_else(|| Error::ChannelNotFound(id.to_string()))?;
        channel.updating = updating;
        Ok(())
    }

    async fn finish_update(&self, id: &str, last_videos_updated: DateTime<Utc>) -> Result<()> {
        let mut state = self.lock();
        let channel = state
            .channels
            .get_mut(id)
            .ok_or_else(|| Error::ChannelNotFound(id.to_string()))?;
        channel.updating = false;
        channel.last_videos_updated = last_videos_updated;
        Ok(())
    }

    async fn list_subscribed(&self) -> Result<Vec<YoutubeChannel>> {
        let state = self.lock();
        let active: BTreeSet<&str> = state
            .subscriptions
            .values()
            .filter(|s| s.is_active())
            .map(|s| s.channel_id.as_str())
            .collect();
        Ok(active
            .into_iter()
            .filter_map(|id| state.channels.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl SubscriptionRepository for MemoryStore {
    async fn get(&self, email: &str, channel_id: &str) -> Result<Option<YoutubeSubscription>> {
        Ok(self.subscription(email, channel_id))
    }

    async fn insert(&self, subscription: &YoutubeSubscription) -> Result<()> {
        let mut state = self.lock();
        let k = key(&subscription.email, &subscription.channel_id);
        if !state.channels.contains_key(&subscription.channel_id) {
            return Err(Error::ChannelNotFound(subscription.channel_id.clone()));
        }
        if state.subscriptions.contains_key(&k) {
            return Err(Error::InvalidInput(format!(
                "Duplicate subscription {}/{}",
                k.0, k.1
            )));
        }
        state.subscriptions.insert(k, subscription.clone());
        Ok(())
    }

    async fn restore(&self, email: &str, channel_id: &str, user_submitted: bool) -> Result<()> {
        let mut state = self.lock();
        let sub = state
            .subscriptions
            .get_mut(&key(email, channel_id))
            .ok_or_else(|| Error::NotFound(format!("Subscription {}/{}", email, channel_id)))?;
        sub.deleted_at = None;
        sub.user_submitted = user_submitted;
        Ok(())
    }

    async fn soft_delete(&self, email: &str, channel_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.lock();
        match state.subscriptions.get_mut(&key(email, channel_id)) {
            Some(sub) if sub.is_active() => {
                sub.deleted_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_for_user(
        &self,
        email: &str,
        page: PageRequest,
    ) -> Result<Page<SubscriptionListing>> {
        let state = self.lock();
        let mut listings: Vec<SubscriptionListing> = state
            .subscriptions
            .values()
            .filter(|s| s.email == email && s.is_active())
            .filter_map(|s| {
                state.channels.get(&s.channel_id).map(|c| SubscriptionListing {
                    channel: c.clone(),
                    user_submitted: s.user_submitted,
                    subscribed_at: s.created_at,
                })
            })
            .collect();
        listings.sort_by(|a, b| {
            a.channel
                .title
                .cmp(&b.channel.title)
                .then(a.channel.id.cmp(&b.channel.id))
        });
        Ok(page.slice(&listings))
    }

    async fn mark_seen(&self, email: &str, channel_id: &str) -> Result<()> {
        self.lock().seen.insert(key(email, channel_id));
        Ok(())
    }

    async fn soft_delete_unseen(&self, email: &str, at: DateTime<Utc>) -> Result<u64> {
        let mut state = self.lock();
        let State {
            subscriptions,
            seen,
            ..
        } = &mut *state;

        let mut deleted = 0;
        for (k, sub) in subscriptions.iter_mut() {
            if sub.email == email && sub.is_active() && !sub.user_submitted && !seen.contains(k) {
                sub.deleted_at = Some(at);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn clear_seen(&self, email: &str) -> Result<()> {
        self.lock().seen.retain(|(e, _)| e != email);
        Ok(())
    }
}

#[async_trait]
impl VideoRepository for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<YoutubeVideo>> {
        Ok(self.video(id))
    }

    async fn insert(&self, video: &YoutubeVideo) -> Result<()> {
        let mut state = self.lock();
        if !state.channels.contains_key(&video.channel_id) {
            return Err(Error::ChannelNotFound(video.channel_id.clone()));
        }
        if state.videos.contains_key(&video.id) {
            return Err(Error::InvalidInput(format!("Duplicate video id {}", video.id)));
        }
        state.videos.insert(video.id.clone(), video.clone());
        Ok(())
    }

    async fn update(&self, video: &YoutubeVideo) -> Result<()> {
        let mut state = self.lock();
        let existing = state
            .videos
            .get_mut(&video.id)
            .ok_or_else(|| Error::NotFound(format!("Video {}", video.id)))?;
        existing.title = video.title.clone();
        existing.thumbnail = video.thumbnail.clone();
        existing.description = video.description.clone();
        existing.published_at = video.published_at;
        Ok(())
    }

    async fn list(
        &self,
        email: &str,
        query: &VideoQuery,
        page: PageRequest,
    ) -> Result<Page<VideoListing>> {
        let state = self.lock();
        let subscribed = |channel_id: &str| {
            state
                .subscriptions
                .get(&key(email, channel_id))
                .is_some_and(|s| s.is_active())
        };

        let mut listings: Vec<VideoListing> = state
            .videos
            .values()
            .filter(|v| query.channel_id.as_deref().map_or(true, |c| v.channel_id == c))
            .filter(|v| !query.subscribed_only || subscribed(&v.channel_id))
            .filter(|v| {
                query.category_ids.is_empty()
                    || v
                        .category_id
                        .as_ref()
                        .is_some_and(|c| query.category_ids.contains(c))
            })
            .filter_map(|v| {
                let k = key(email, &v.id);
                let listing = VideoListing {
                    video: v.clone(),
                    channel_title: state.channels.get(&v.channel_id)?.title.clone(),
                    liked_at: state.likes.get(&k).copied(),
                    watched_at: state.watches.get(&k).copied(),
                    queued_at: state.queues.get(&k).copied(),
                };
                Some(listing)
            })
            .filter(|l| !query.liked_only || l.liked_at.is_some())
            .filter(|l| !query.queued_only || l.queued_at.is_some())
            .collect();

        match query.order() {
            VideoOrder::LikedDesc => listings.sort_by(|a, b| {
                b.liked_at
                    .cmp(&a.liked_at)
                    .then(a.video.id.cmp(&b.video.id))
            }),
            VideoOrder::QueuedAsc => listings.sort_by(|a, b| {
                a.queued_at
                    .cmp(&b.queued_at)
                    .then(a.video.id.cmp(&b.video.id))
            }),
            VideoOrder::PublishedDesc => listings.sort_by(|a, b| {
                b.video
                    .published_at
                    .cmp(&a.video.published_at)
                    .then(b.video.title.cmp(&a.video.title))
            }),
        }

        Ok(page.slice(&listings))
    }

    async fn like(&self, email: &str, video_id: &str) -> Result<()> {
        self.lock()
            .likes
            .entry(key(email, video_id))
            .or_insert_with(Utc::now);
        Ok(())
    }

    async fn unlike(&self, email: &str, video_id: &str) -> Result<bool> {
        Ok(self.lock().likes.remove(&key(email, video_id)).is_some())
    }

    async fn mark_watched(&self, email: &str, video_id: &str) -> Result<()> {
        self.lock()
            .watches
            .entry(key(email, video_id))
            .or_insert_with(Utc::now);
        Ok(())
    }

    async fn enqueue(&self, email: &str, video_id: &str) -> Result<()> {
        self.lock()
            .queues
            .entry(key(email, video_id))
            .or_insert_with(Utc::now);
        Ok(())
    }

    async fn dequeue(&self, email: &str, video_id: &str) -> Result<bool> {
        Ok(self.lock().queues.remove(&key(email, video_id)).is_some())
    }
}

#[async_trait]
impl CategoryRepository for MemoryStore {
    async fn upsert_page(&self, categories: &[RemoteCategory]) -> Result<()> {
        let mut state = self.lock();
        for category in categories {
            state
                .categories
                .insert(category.id.clone(), category.name.clone());
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<YoutubeVideoCategory>> {
        let mut categories: Vec<YoutubeVideoCategory> = self
            .lock()
            .categories
            .iter()
            .map(|(id, name)| YoutubeVideoCategory {
                id: id.clone(),
                name: name.clone(),
            })
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(categories)
    }
}

/// Task queue held in process memory, claimed in dispatch order.
#[derive(Clone, Default)]
pub struct MemoryTaskQueue {
    tasks: Arc<Mutex<Vec<QueuedTask>>>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<QueuedTask>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every task ever dispatched, in dispatch order.
    pub fn dispatched(&self) -> Vec<Task> {
        self.lock().iter().map(|t| t.task.clone()).collect()
    }

    /// Dispatched tasks still waiting to be claimed.
    pub fn pending(&self) -> Vec<Task> {
        self.lock()
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .map(|t| t.task.clone())
            .collect()
    }
}

#[async_trait]
impl TaskDispatcher for MemoryTaskQueue {
    async fn dispatch(&self, task: Task) -> Result<Uuid> {
        let id = Uuid::now_v7();
        self.lock().push(QueuedTask {
            id,
            max_retries: task.max_retries(),
            task,
            status: TaskStatus::Pending,
            retry_count: 0,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        });
        Ok(id)
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn claim_next(&self, kinds: &[TaskKind]) -> Result<Option<QueuedTask>> {
        let mut tasks = self.lock();
        let next = tasks.iter_mut().find(|t| {
            t.status == TaskStatus::Pending && (kinds.is_empty() || kinds.contains(&t.kind()))
        });
        Ok(next.map(|t| {
            t.status = TaskStatus::Running;
            t.started_at = Some(Utc::now());
            t.clone()
        }))
    }

    async fn complete(&self, id: Uuid) -> Result<()> {
        let mut tasks = self.lock();
        if let Some(t) = tasks.iter_mut().find(|t| t.id == id) {
            t.status = TaskStatus::Completed;
            t.completed_at = Some(Utc::now());
            t.error_message = None;
        }
        Ok(())
    }

    async fn fail(&self, id: Uuid, error: &str, retryable: bool) -> Result<()> {
        let mut tasks = self.lock();
        let t = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::NotFound(format!("Task {}", id)))?;

        t.error_message = Some(error.to_string());
        if retryable && t.retry_count < t.max_retries {
            t.retry_count += 1;
            t.status = TaskStatus::Pending;
            t.started_at = None;
        } else {
            t.status = TaskStatus::Failed;
            t.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<QueuedTask>> {
        Ok(self.lock().iter().find(|t| t.id == id).cloned())
    }

    async fn pending_count(&self) -> Result<i64> {
        Ok(self
            .lock()
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .count() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(id: &str, title: &str) -> YoutubeChannel {
        YoutubeChannel {
            id: id.into(),
            title: title.into(),
            thumbnail: String::new(),
            updating: false,
            last_videos_updated: Utc::now(),
        }
    }

    fn subscription(email: &str, channel_id: &str, user_submitted: bool) -> YoutubeSubscription {
        YoutubeSubscription {
            email: email.into(),
            channel_id: channel_id.into(),
            user_submitted,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn test_soft_delete_unseen_spares_seen_and_user_submitted() {
        let store = MemoryStore::new();
        for id in ["a", "b", "c"] {
            ChannelRepository::insert(&store, &channel(id, id)).await.unwrap();
        }
        SubscriptionRepository::insert(&store, &subscription("u", "a", false))
            .await
            .unwrap();
        SubscriptionRepository::insert(&store, &subscription("u", "b", false))
            .await
            .unwrap();
        SubscriptionRepository::insert(&store, &subscription("u", "c", true))
            .await
            .unwrap();

        store.mark_seen("u", "a").await.unwrap();
        let deleted = store.soft_delete_unseen("u", Utc::now()).await.unwrap();

        assert_eq!(deleted, 1);
        assert!(store.subscription("u", "a").unwrap().is_active());
        assert!(!store.subscription("u", "b").unwrap().is_active());
        assert!(store.subscription("u", "c").unwrap().is_active());
    }

    #[tokio::test]
    async fn test_task_queue_retries_until_budget_spent() {
        let queue = MemoryTaskQueue::new();
        let id = queue.dispatch(Task::UpdateVideoCategories).await.unwrap();

        for _ in 0..Task::UpdateVideoCategories.max_retries() {
            let claimed = queue.claim_next(&[]).await.unwrap().unwrap();
            assert_eq!(claimed.id, id);
            queue.fail(id, "boom", true).await.unwrap();
        }
        queue.claim_next(&[]).await.unwrap().unwrap();
        queue.fail(id, "boom", true).await.unwrap();

        let task = TaskQueue::get(&queue, id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(queue.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_claim_filters_by_kind() {
        let queue = MemoryTaskQueue::new();
        queue.dispatch(Task::UpdateSubscriptions).await.unwrap();
        queue.dispatch(Task::UpdateVideoCategories).await.unwrap();

        let claimed = queue
            .claim_next(&[TaskKind::UpdateVideoCategories])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(claimed.task, Task::UpdateVideoCategories);
        assert_eq!(queue.pending(), vec![Task::UpdateSubscriptions]);
    }
}
