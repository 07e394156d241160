//! In-process fakes for the engine tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use futures::FutureExt;

use tuneflow_core::{
    Artwork, AudioDownloader, AudioTranscoder, CatalogProvider, CredentialOpener, Error,
    EventBus, ImageFetcher, Notification, ObjectStorage, RemoteCategory, RemoteChannel,
    RemoteVideo, Result, WebDavConfig, WebDavCredentials, WebDavMirror,
};
use tuneflow_db::{MemoryStore, MemoryTaskQueue};
use tuneflow_jobs::{CatalogDeps, MusicJobDeps};
use tuneflow_media::Id3TagEditor;

/// Smallest byte sequence the tag editor accepts as an mp3.
pub fn fake_mp3() -> Vec<u8> {
    let mut data = vec![0xFF, 0xFB, 0x90, 0x64];
    data.resize(417, 0);
    data
}

/// Drain everything already delivered on a subscription.
pub fn drain(stream: &mut BoxStream<'static, Notification>) -> Vec<String> {
    let mut out = Vec::new();
    while let Some(Some(n)) = stream.next().now_or_never() {
        out.push(n.payload);
    }
    out
}

// =============================================================================
// STORAGE
// =============================================================================

#[derive(Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<Mutex<HashMap<String, (Vec<u8>, String)>>>,
}

impl MemoryStorage {
    pub fn object(&self, key: &str) -> Option<(Vec<u8>, String)> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn put(&self, key: &str, data: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data, "application/octet-stream".into()));
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>> {
        self.object(key)
            .map(|(data, _)| data)
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn resolve_url(&self, key: &str) -> String {
        format!("https://files.example.com/{}", key)
    }
}

// =============================================================================
// TOOLS
// =============================================================================

/// Writes a fake mp3 for every URL, or nothing when `produce` is false.
pub struct FakeDownloader {
    pub produce: bool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeDownloader {
    pub fn new(produce: bool) -> Self {
        Self {
            produce,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AudioDownloader for FakeDownloader {
    async fn download_audio(
        &self,
        source_url: &str,
        dest_dir: &Path,
        stem: &str,
    ) -> Result<Option<PathBuf>> {
        self.calls.lock().unwrap().push(source_url.to_string());
        if !self.produce {
            return Ok(None);
        }
        let path = dest_dir.join(format!("{}.mp3", stem));
        tokio::fs::write(&path, fake_mp3()).await?;
        Ok(Some(path))
    }
}

/// "Transcodes" by replacing the file with a fake mp3.
#[derive(Default)]
pub struct FakeTranscoder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl AudioTranscoder for FakeTranscoder {
    async fn transcode(&self, src: &Path) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let dst = src.with_file_name("transcoded.mp3");
        tokio::fs::write(&dst, fake_mp3()).await?;
        Ok(dst)
    }
}

pub struct FakeImages {
    pub artwork: Option<Artwork>,
    pub resolved: Option<String>,
}

impl FakeImages {
    pub fn none() -> Self {
        Self {
            artwork: None,
            resolved: None,
        }
    }
}

#[async_trait]
impl ImageFetcher for FakeImages {
    async fn resolve_primary_image(&self, _candidate_url: &str) -> Result<String> {
        self.resolved
            .clone()
            .ok_or_else(|| Error::NotFound("Cannot resolve artwork".into()))
    }

    async fn fetch_image(&self, _url: &str) -> Result<Artwork> {
        self.artwork
            .clone()
            .ok_or_else(|| Error::Request("HTTP 404".into()))
    }
}

#[derive(Default)]
pub struct FakeMirror {
    pub fail: bool,
    pub puts: Mutex<Vec<(String, String, usize)>>,
}

#[async_trait]
impl WebDavMirror for FakeMirror {
    async fn put(
        &self,
        credentials: &WebDavCredentials,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        if self.fail {
            return Err(Error::MirrorFailed("HTTP 507".into()));
        }
        self.puts.lock().unwrap().push((
            credentials.username.clone(),
            format!("{}/{}", credentials.url, filename),
            data.len(),
        ));
        Ok(())
    }
}

/// Treats the stored values as already unsealed.
pub struct PlainOpener;

impl CredentialOpener for PlainOpener {
    fn open(&self, config: &WebDavConfig) -> Result<WebDavCredentials> {
        Ok(WebDavCredentials {
            url: config.url.clone(),
            username: config.sealed_username.clone(),
            password: config.sealed_password.clone(),
        })
    }
}

pub struct MusicHarness {
    pub store: MemoryStore,
    pub storage: MemoryStorage,
    pub bus: EventBus,
    pub downloader: Arc<FakeDownloader>,
    pub transcoder: Arc<FakeTranscoder>,
    pub mirror: Arc<FakeMirror>,
    pub deps: MusicJobDeps,
}

pub fn music_harness(produce: bool, images: FakeImages, mirror: FakeMirror) -> MusicHarness {
    let store = MemoryStore::new();
    let storage = MemoryStorage::default();
    let bus = EventBus::new(32);
    let downloader = Arc::new(FakeDownloader::new(produce));
    let transcoder = Arc::new(FakeTranscoder::default());
    let mirror = Arc::new(mirror);

    let deps = MusicJobDeps {
        jobs: Arc::new(store.clone()),
        webdav: Arc::new(store.clone()),
        storage: Arc::new(storage.clone()),
        pubsub: Arc::new(bus.clone()),
        downloader: downloader.clone(),
        transcoder: transcoder.clone(),
        tags: Arc::new(Id3TagEditor::new()),
        images: Arc::new(images),
        mirror: mirror.clone(),
        credentials: Arc::new(PlainOpener),
    };

    MusicHarness {
        store,
        storage,
        bus,
        downloader,
        transcoder,
        mirror,
        deps,
    }
}

// =============================================================================
// CATALOG
// =============================================================================

/// Remote catalog serving fixed pages.
#[derive(Default)]
pub struct FakeProvider {
    pub video_pages: HashMap<String, Vec<Vec<RemoteVideo>>>,
    pub subscription_pages: HashMap<String, Vec<Vec<RemoteChannel>>>,
    /// Channels whose subscription listing errors after its last page.
    pub failing_subscriptions: HashSet<String>,
    pub category_pages: Vec<Vec<RemoteCategory>>,
    pub channels: HashMap<String, RemoteChannel>,
    /// Number of video pages actually pulled from the stream.
    pub video_pages_polled: Arc<AtomicUsize>,
}

#[async_trait]
impl CatalogProvider for FakeProvider {
    fn stream_channel_subscriptions<'a>(
        &'a self,
        channel_id: &'a str,
    ) -> BoxStream<'a, Result<Vec<RemoteChannel>>> {
        let pages = self
            .subscription_pages
            .get(channel_id)
            .cloned()
            .unwrap_or_default();
        let tail = self
            .failing_subscriptions
            .contains(channel_id)
            .then(|| Err(Error::Request("subscriptions page failed".into())));
        stream::iter(pages.into_iter().map(Ok).chain(tail)).boxed()
    }

    fn stream_channel_latest_videos<'a>(
        &'a self,
        channel_id: &'a str,
    ) -> BoxStream<'a, Result<Vec<RemoteVideo>>> {
        let pages = self.video_pages.get(channel_id).cloned().unwrap_or_default();
        let polled = self.video_pages_polled.clone();
        stream::iter(pages)
            .map(move |page| {
                polled.fetch_add(1, Ordering::SeqCst);
                Ok(page)
            })
            .boxed()
    }

    fn stream_video_categories(&self) -> BoxStream<'_, Result<Vec<RemoteCategory>>> {
        stream::iter(self.category_pages.clone().into_iter().map(Ok)).boxed()
    }

    async fn get_channel_info(&self, channel_id: &str) -> Result<Option<RemoteChannel>> {
        Ok(self.channels.get(channel_id).cloned())
    }
}

pub struct CatalogHarness {
    pub store: MemoryStore,
    pub queue: MemoryTaskQueue,
    pub bus: EventBus,
    pub deps: CatalogDeps,
}

pub fn catalog_harness(provider: FakeProvider) -> CatalogHarness {
    let store = MemoryStore::new();
    let queue = MemoryTaskQueue::new();
    let bus = EventBus::new(64);
    let deps = CatalogDeps {
        users: Arc::new(store.clone()),
        channels: Arc::new(store.clone()),
        subscriptions: Arc::new(store.clone()),
        videos: Arc::new(store.clone()),
        categories: Arc::new(store.clone()),
        provider: Arc::new(provider),
        pubsub: Arc::new(bus.clone()),
        tasks: Arc::new(queue.clone()),
    };
    CatalogHarness {
        store,
        queue,
        bus,
        deps,
    }
}
