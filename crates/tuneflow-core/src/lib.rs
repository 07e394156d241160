//! # tuneflow-core
//!
//! Core types, traits, and abstractions for tuneflow.
//!
//! This crate provides the domain models (music jobs, the mirrored YouTube
//! catalog), the error type, the notification channel contract, and the
//! trait seams implemented by the storage, media and catalog crates.

pub mod defaults;
pub mod error;
pub mod events;
pub mod file_safety;
pub mod logging;
pub mod models;
pub mod pagination;
pub mod task;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{
    publish_json, ChannelUpdate, EventBus, MusicJobUpdate, Notification, NotificationChannel,
    PubSub,
};
pub use file_safety::{
    destination_filename, detect_content_type, detect_image_extension,
    image_extension_from_content_type, sanitize_component, sanitize_filename,
};
pub use models::*;
pub use pagination::{total_pages, Page, PageRequest};
pub use task::{QueuedTask, Task, TaskKind, TaskStatus};
pub use traits::*;
