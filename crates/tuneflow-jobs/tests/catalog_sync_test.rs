//! Catalog sync engine against the in-memory store and a scripted provider.

mod common;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use common::{catalog_harness, drain, FakeProvider};
use tuneflow_core::{
    ChannelRepository, ChannelUpdate, Error, NotificationChannel, PageRequest, PubSub,
    RemoteCategory, RemoteChannel, RemoteVideo, SubscriptionRepository, Task, UserRepository,
    VideoQuery, YoutubeChannel, YoutubeSubscription,
};
use tuneflow_jobs::{window_start, CatalogSyncEngine};

const USER: &str = "viewer@example.com";

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

fn noon(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap()
}

fn remote_video(id: &str, title: &str, published_at: DateTime<Utc>) -> RemoteVideo {
    RemoteVideo {
        id: id.into(),
        title: title.into(),
        thumbnail: format!("https://i.ytimg.com/{}.jpg", id),
        description: format!("about {}", id),
        published_at,
        category_id: Some("10".into()),
    }
}

fn remote_channel(id: &str, title: &str) -> RemoteChannel {
    RemoteChannel {
        id: id.into(),
        title: title.into(),
        thumbnail: format!("https://yt3.ggpht.com/{}.jpg", id),
    }
}

fn local_channel(id: &str, last_videos_updated: DateTime<Utc>) -> YoutubeChannel {
    YoutubeChannel {
        id: id.into(),
        title: id.to_uppercase(),
        thumbnail: format!("https://yt3.ggpht.com/{}.jpg", id),
        updating: false,
        last_videos_updated,
    }
}

fn subscription(channel_id: &str, user_submitted: bool) -> YoutubeSubscription {
    YoutubeSubscription {
        email: USER.into(),
        channel_id: channel_id.into(),
        user_submitted,
        created_at: Utc::now(),
        deleted_at: None,
    }
}

fn channel_updates(payloads: &[String]) -> Vec<ChannelUpdate> {
    payloads
        .iter()
        .map(|p| serde_json::from_str(p).unwrap())
        .collect()
}

/// Ten daily uploads on 2024-03-01..=10, newest first, five per page.
fn ten_days_of_uploads() -> Vec<Vec<RemoteVideo>> {
    let videos: Vec<RemoteVideo> = (1..=10)
        .rev()
        .map(|d| remote_video(&format!("v{:02}", d), &format!("Day {}", d), noon(d)))
        .collect();
    videos.chunks(5).map(|c| c.to_vec()).collect()
}

// =============================================================================
// CHANNEL VIDEOS
// =============================================================================

#[test]
fn test_window_starts_at_midnight_utc() {
    assert_eq!(
        window_start(day(4)),
        Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn test_add_channel_videos_stops_at_window() {
    let polled = {
        let provider = FakeProvider {
            video_pages: HashMap::from([("ch".to_string(), ten_days_of_uploads())]),
            ..Default::default()
        };
        let polled = provider.video_pages_polled.clone();
        let h = catalog_harness(provider);
        ChannelRepository::insert(&h.store, &local_channel("ch", noon(1)))
            .await
            .unwrap();
        let engine = CatalogSyncEngine::new(h.deps.clone());

        let upserted = engine.add_channel_videos("ch", Some(day(4))).await.unwrap();

        assert_eq!(upserted, 7);
        for d in 4..=10 {
            assert!(h.store.video(&format!("v{:02}", d)).is_some(), "day {}", d);
        }
        for d in 1..=3 {
            assert!(h.store.video(&format!("v{:02}", d)).is_none(), "day {}", d);
        }
        let channel = h.store.channel("ch").unwrap();
        assert!(!channel.updating);
        assert!(channel.last_videos_updated > noon(10));
        polled
    };

    // The second page holds the cutoff; no third page exists to pull.
    assert_eq!(polled.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_add_channel_videos_without_bound_takes_everything() {
    let provider = FakeProvider {
        video_pages: HashMap::from([("ch".to_string(), ten_days_of_uploads())]),
        ..Default::default()
    };
    let h = catalog_harness(provider);
    ChannelRepository::insert(&h.store, &local_channel("ch", noon(1)))
        .await
        .unwrap();
    let engine = CatalogSyncEngine::new(h.deps.clone());

    assert_eq!(engine.add_channel_videos("ch", None).await.unwrap(), 10);
    assert_eq!(h.store.video_count(), 10);
}

#[tokio::test]
async fn test_early_page_stop_skips_remaining_pages() {
    let mut pages = ten_days_of_uploads();
    pages.push(vec![remote_video("ancient", "Old", noon(1) - Duration::days(30))]);
    let provider = FakeProvider {
        video_pages: HashMap::from([("ch".to_string(), pages)]),
        ..Default::default()
    };
    let polled = provider.video_pages_polled.clone();
    let h = catalog_harness(provider);
    ChannelRepository::insert(&h.store, &local_channel("ch", noon(1)))
        .await
        .unwrap();
    let engine = CatalogSyncEngine::new(h.deps.clone());

    assert_eq!(engine.add_channel_videos("ch", Some(day(8))).await.unwrap(), 3);
    assert_eq!(polled.load(Ordering::SeqCst), 1);
    assert!(h.store.video("ancient").is_none());
}

#[tokio::test]
async fn test_channel_update_brackets_the_scan() {
    let provider = FakeProvider {
        video_pages: HashMap::from([("ch".to_string(), ten_days_of_uploads())]),
        ..Default::default()
    };
    let h = catalog_harness(provider);
    ChannelRepository::insert(&h.store, &local_channel("ch", noon(1)))
        .await
        .unwrap();
    ChannelRepository::insert(&h.store, &local_channel("quiet", noon(1)))
        .await
        .unwrap();
    let mut updates = h
        .bus
        .subscribe(&[NotificationChannel::YoutubeChannelUpdate])
        .await
        .unwrap();
    let engine = CatalogSyncEngine::new(h.deps.clone());

    engine.add_channel_videos("ch", Some(day(4))).await.unwrap();
    engine.add_channel_videos("quiet", None).await.unwrap();

    let updates = channel_updates(&drain(&mut updates));
    let expected: Vec<(&str, bool)> = vec![
        ("ch", true),
        ("ch", false),
        ("quiet", true),
        ("quiet", false),
    ];
    let got: Vec<(&str, bool)> = updates
        .iter()
        .map(|u| (u.id.as_str(), u.updating))
        .collect();
    assert_eq!(got, expected);
}

#[tokio::test]
async fn test_unknown_channel_is_rejected_silently() {
    let h = catalog_harness(FakeProvider::default());
    let mut updates = h
        .bus
        .subscribe(&[NotificationChannel::YoutubeChannelUpdate])
        .await
        .unwrap();
    let engine = CatalogSyncEngine::new(h.deps.clone());

    let err = engine.add_channel_videos("nope", None).await.unwrap_err();

    assert!(matches!(err, Error::ChannelNotFound(id) if id == "nope"));
    assert!(drain(&mut updates).is_empty());
}

#[tokio::test]
async fn test_publish_date_moves_only_when_video_changed() {
    let original = noon(5);
    let provider = FakeProvider {
        video_pages: HashMap::from([(
            "ch".to_string(),
            vec![vec![remote_video("v", "Title", original)]],
        )]),
        ..Default::default()
    };
    let h = catalog_harness(provider);
    ChannelRepository::insert(&h.store, &local_channel("ch", noon(1)))
        .await
        .unwrap();
    CatalogSyncEngine::new(h.deps.clone())
        .add_channel_videos("ch", None)
        .await
        .unwrap();

    // Same title and thumbnail, new description and date.
    let mut unchanged = remote_video("v", "Title", noon(9));
    unchanged.description = "edited".into();
    let mut deps = h.deps.clone();
    deps.provider = std::sync::Arc::new(FakeProvider {
        video_pages: HashMap::from([("ch".to_string(), vec![vec![unchanged]])]),
        ..Default::default()
    });
    CatalogSyncEngine::new(deps.clone())
        .add_channel_videos("ch", None)
        .await
        .unwrap();
    let video = h.store.video("v").unwrap();
    assert_eq!(video.published_at, original);
    assert_eq!(video.description, "edited");
    assert_eq!(h.store.video_count(), 1);

    // Retitled.
    deps.provider = std::sync::Arc::new(FakeProvider {
        video_pages: HashMap::from([(
            "ch".to_string(),
            vec![vec![remote_video("v", "Title (Remastered)", noon(9))]],
        )]),
        ..Default::default()
    });
    CatalogSyncEngine::new(deps)
        .add_channel_videos("ch", None)
        .await
        .unwrap();
    let video = h.store.video("v").unwrap();
    assert_eq!(video.title, "Title (Remastered)");
    assert_eq!(video.published_at, noon(9));
    assert_eq!(h.store.video_count(), 1);
}

#[tokio::test]
async fn test_update_channel_videos_picks_window_per_channel() {
    let h = catalog_harness(FakeProvider::default());
    let now = Utc::now();
    let stale = now - Duration::days(10);
    ChannelRepository::insert(&h.store, &local_channel("fresh", now))
        .await
        .unwrap();
    ChannelRepository::insert(&h.store, &local_channel("stale", stale))
        .await
        .unwrap();
    ChannelRepository::insert(&h.store, &local_channel("orphan", stale))
        .await
        .unwrap();
    SubscriptionRepository::insert(&h.store, &subscription("fresh", false))
        .await
        .unwrap();
    SubscriptionRepository::insert(&h.store, &subscription("stale", true))
        .await
        .unwrap();
    let engine = CatalogSyncEngine::new(h.deps.clone());

    assert_eq!(engine.update_channel_videos(None).await.unwrap(), 2);

    let mut dispatched = h.queue.dispatched();
    dispatched.sort_by_key(|t| format!("{:?}", t));
    assert_eq!(
        dispatched,
        vec![
            Task::AddChannelVideos {
                channel_id: "fresh".into(),
                date_after: Some((now - Duration::days(1)).date_naive()),
            },
            Task::AddChannelVideos {
                channel_id: "stale".into(),
                date_after: Some(stale.date_naive()),
            },
        ]
    );
}

#[tokio::test]
async fn test_update_channel_videos_override_applies_to_all() {
    let h = catalog_harness(FakeProvider::default());
    for id in ["a", "b"] {
        ChannelRepository::insert(&h.store, &local_channel(id, Utc::now()))
            .await
            .unwrap();
        SubscriptionRepository::insert(&h.store, &subscription(id, false))
            .await
            .unwrap();
    }
    let engine = CatalogSyncEngine::new(h.deps.clone());

    engine.update_channel_videos(Some(day(2))).await.unwrap();

    assert!(h.queue.dispatched().iter().all(|t| matches!(
        t,
        Task::AddChannelVideos { date_after: Some(d), .. } if *d == day(2)
    )));
    assert_eq!(h.queue.dispatched().len(), 2);
}

// =============================================================================
// SUBSCRIPTIONS
// =============================================================================

#[tokio::test]
async fn test_reconcile_mirrors_remote_subscriptions() {
    let provider = FakeProvider {
        subscription_pages: HashMap::from([(
            "UCme".to_string(),
            vec![
                vec![remote_channel("kept", "Kept (renamed)")],
                vec![remote_channel("brand-new", "Brand New")],
            ],
        )]),
        ..Default::default()
    };
    let h = catalog_harness(provider);
    h.store.link_channel(USER, "UCme").await.unwrap();
    for id in ["kept", "dropped", "mine"] {
        ChannelRepository::insert(&h.store, &local_channel(id, Utc::now()))
            .await
            .unwrap();
    }
    SubscriptionRepository::insert(&h.store, &subscription("kept", false))
        .await
        .unwrap();
    SubscriptionRepository::insert(&h.store, &subscription("dropped", false))
        .await
        .unwrap();
    SubscriptionRepository::insert(&h.store, &subscription("mine", true))
        .await
        .unwrap();
    let engine = CatalogSyncEngine::new(h.deps.clone());

    engine.update_user_subscriptions(USER).await.unwrap();

    assert!(h.store.subscription(USER, "kept").unwrap().is_active());
    assert!(h.store.subscription(USER, "mine").unwrap().is_active());
    assert!(h.store.subscription(USER, "brand-new").unwrap().is_active());
    assert!(!h.store.subscription(USER, "dropped").unwrap().is_active());
    assert_eq!(h.store.seen_count(), 0);

    assert_eq!(h.store.channel("kept").unwrap().title, "Kept (renamed)");
    let fresh = h.store.channel("brand-new").unwrap();
    assert!(fresh.last_videos_updated < Utc::now() - Duration::days(364));
    assert_eq!(
        h.queue.dispatched(),
        vec![Task::AddChannelVideos {
            channel_id: "brand-new".into(),
            date_after: None,
        }]
    );

    // Running again changes nothing and schedules nothing new.
    engine.update_user_subscriptions(USER).await.unwrap();
    assert_eq!(h.queue.dispatched().len(), 1);
    assert!(!h.store.subscription(USER, "dropped").unwrap().is_active());
}

#[tokio::test]
async fn test_reconcile_restores_resubscribed_channel() {
    let provider = FakeProvider {
        subscription_pages: HashMap::from([(
            "UCme".to_string(),
            vec![vec![remote_channel("back", "BACK")]],
        )]),
        ..Default::default()
    };
    let h = catalog_harness(provider);
    h.store.link_channel(USER, "UCme").await.unwrap();
    ChannelRepository::insert(&h.store, &local_channel("back", Utc::now()))
        .await
        .unwrap();
    let mut sub = subscription("back", false);
    sub.deleted_at = Some(Utc::now() - Duration::days(3));
    SubscriptionRepository::insert(&h.store, &sub).await.unwrap();

    CatalogSyncEngine::new(h.deps.clone())
        .update_user_subscriptions(USER)
        .await
        .unwrap();

    assert!(h.store.subscription(USER, "back").unwrap().is_active());
    assert!(h.queue.dispatched().is_empty());
}

#[tokio::test]
async fn test_aborted_reconcile_leaves_no_seen_markers() {
    let provider = FakeProvider {
        subscription_pages: HashMap::from([(
            "UCme".to_string(),
            vec![vec![remote_channel("gone", "Gone")]],
        )]),
        failing_subscriptions: HashSet::from(["UCme".to_string()]),
        ..Default::default()
    };
    let h = catalog_harness(provider);
    h.store.link_channel(USER, "UCme").await.unwrap();
    ChannelRepository::insert(&h.store, &local_channel("gone", Utc::now()))
        .await
        .unwrap();
    SubscriptionRepository::insert(&h.store, &subscription("gone", false))
        .await
        .unwrap();

    let err = CatalogSyncEngine::new(h.deps.clone())
        .update_user_subscriptions(USER)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Request(_)));
    assert_eq!(h.store.seen_count(), 0);
    assert!(h.store.subscription(USER, "gone").unwrap().is_active());

    // The user has since unsubscribed everywhere.
    let mut deps = h.deps.clone();
    deps.provider = std::sync::Arc::new(FakeProvider::default());
    CatalogSyncEngine::new(deps)
        .update_user_subscriptions(USER)
        .await
        .unwrap();

    assert!(!h.store.subscription(USER, "gone").unwrap().is_active());
    assert_eq!(h.store.seen_count(), 0);
}

#[tokio::test]
async fn test_user_without_linked_channel_is_skipped() {
    let h = catalog_harness(FakeProvider::default());
    h.store.upsert(USER).await.unwrap();

    CatalogSyncEngine::new(h.deps.clone())
        .update_user_subscriptions(USER)
        .await
        .unwrap();
    assert!(h.queue.dispatched().is_empty());
}

#[tokio::test]
async fn test_update_subscriptions_fans_out_per_user() {
    let h = catalog_harness(FakeProvider::default());
    h.store.upsert("a@example.com").await.unwrap();
    h.store.upsert("b@example.com").await.unwrap();

    let n = CatalogSyncEngine::new(h.deps.clone())
        .update_subscriptions()
        .await
        .unwrap();

    assert_eq!(n, 2);
    let mut emails: Vec<String> = h
        .queue
        .dispatched()
        .into_iter()
        .filter_map(|t| match t {
            Task::UpdateUserSubscriptions { email } => Some(email),
            _ => None,
        })
        .collect();
    emails.sort();
    assert_eq!(emails, vec!["a@example.com", "b@example.com"]);
}

#[tokio::test]
async fn test_add_user_subscription_fetches_unknown_channel() {
    let provider = FakeProvider {
        channels: HashMap::from([("UCnew".to_string(), remote_channel("UCnew", "New"))]),
        ..Default::default()
    };
    let h = catalog_harness(provider);
    let engine = CatalogSyncEngine::new(h.deps.clone());

    engine.add_user_subscription(USER, "UCnew").await.unwrap();

    let sub = h.store.subscription(USER, "UCnew").unwrap();
    assert!(sub.is_active());
    assert!(sub.user_submitted);
    assert_eq!(h.store.channel("UCnew").unwrap().title, "New");
    assert_eq!(
        h.queue.dispatched(),
        vec![Task::AddChannelVideos {
            channel_id: "UCnew".into(),
            date_after: None,
        }]
    );

    let err = engine.add_user_subscription(USER, "UCnew").await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let err = engine.add_user_subscription(USER, "UCghost").await.unwrap_err();
    assert!(matches!(err, Error::ChannelNotFound(_)));
}

#[tokio::test]
async fn test_removed_subscription_can_be_re_added() {
    let h = catalog_harness(FakeProvider::default());
    ChannelRepository::insert(&h.store, &local_channel("ch", Utc::now()))
        .await
        .unwrap();
    let engine = CatalogSyncEngine::new(h.deps.clone());

    engine.add_user_subscription(USER, "ch").await.unwrap();
    engine.remove_user_subscription(USER, "ch").await.unwrap();
    assert!(engine
        .remove_user_subscription(USER, "ch")
        .await
        .unwrap_err()
        .is_not_found());
    let listed = engine
        .list_user_subscriptions(USER, PageRequest::default())
        .await
        .unwrap();
    assert!(listed.items.is_empty());

    engine.add_user_subscription(USER, "ch").await.unwrap();
    let listed = engine
        .list_user_subscriptions(USER, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(listed.items.len(), 1);
    assert!(listed.items[0].user_submitted);
}

// =============================================================================
// CATEGORIES AND LIBRARY
// =============================================================================

#[tokio::test]
async fn test_categories_are_upserted_page_by_page() {
    let category = |id: &str, name: &str| RemoteCategory {
        id: id.into(),
        name: name.into(),
    };
    let provider = FakeProvider {
        category_pages: vec![
            vec![category("10", "Music"), category("1", "Film & Animation")],
            vec![category("20", "Gaming")],
        ],
        ..Default::default()
    };
    let h = catalog_harness(provider);
    let engine = CatalogSyncEngine::new(h.deps.clone());

    assert_eq!(engine.update_video_categories().await.unwrap(), 3);
    assert_eq!(engine.update_video_categories().await.unwrap(), 3);

    let names: Vec<String> = engine
        .list_video_categories()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["Film & Animation", "Gaming", "Music"]);
}

#[tokio::test]
async fn test_library_state_per_user() {
    let provider = FakeProvider {
        video_pages: HashMap::from([(
            "ch".to_string(),
            vec![vec![
                remote_video("b", "Second", noon(2)),
                remote_video("a", "First", noon(1)),
            ]],
        )]),
        ..Default::default()
    };
    let h = catalog_harness(provider);
    ChannelRepository::insert(&h.store, &local_channel("ch", noon(1)))
        .await
        .unwrap();
    let engine = CatalogSyncEngine::new(h.deps.clone());
    engine.add_channel_videos("ch", None).await.unwrap();

    assert!(engine
        .like_video(USER, "missing")
        .await
        .unwrap_err()
        .is_not_found());

    engine.like_video(USER, "a").await.unwrap();
    engine.queue_video(USER, "b").await.unwrap();
    engine.mark_video_watched(USER, "b").await.unwrap();

    let all = engine
        .list_videos(USER, &VideoQuery::default(), PageRequest::default())
        .await
        .unwrap();
    let ids: Vec<&str> = all.items.iter().map(|l| l.video.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "a"]);
    assert_eq!(all.items[0].channel_title, "CH");
    assert!(all.items[0].watched_at.is_some());

    let liked = engine
        .list_videos(
            USER,
            &VideoQuery {
                liked_only: true,
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(liked.items.len(), 1);
    assert_eq!(liked.items[0].video.id, "a");

    let other = engine
        .list_videos(
            "someone@example.com",
            &VideoQuery {
                queued_only: true,
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert!(other.items.is_empty());

    assert!(engine.unlike_video(USER, "a").await.unwrap());
    assert!(!engine.unlike_video(USER, "a").await.unwrap());
    assert!(engine.dequeue_video(USER, "b").await.unwrap());
    assert!(!engine.dequeue_video(USER, "b").await.unwrap());
}
