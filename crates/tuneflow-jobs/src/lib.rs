//! # tuneflow-jobs
//!
//! Background processing for tuneflow.
//!
//! This crate provides:
//! - The music job engine (source acquisition, tagging, storage, WebDAV mirror)
//! - Music job intake, deletion and storage cleanup
//! - The catalog sync engine (channel uploads, subscription reconciliation,
//!   video categories) and per-user library state
//! - A task worker running queued tasks on registered handlers
//! - A scheduler dispatching the periodic catalog tasks
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tuneflow_jobs::{CatalogTaskHandler, TaskWorker, WorkerConfig};
//!
//! let worker = TaskWorker::new(queue.clone(), WorkerConfig::from_env());
//! worker.register_handler(Arc::new(CatalogTaskHandler::new(catalog))).await;
//! let handle = worker.start();
//!
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//!
//! handle.stop().await?;
//! ```

pub mod catalog;
pub mod handler;
pub mod intake;
pub mod music;
pub mod scheduler;
pub mod worker;

pub use tuneflow_core::*;

pub use catalog::{window_start, CatalogDeps, CatalogSyncEngine};
pub use handler::{CatalogTaskHandler, MusicTaskHandler, TaskContext, TaskHandler, TaskResult};
pub use intake::{CreateMusicJob, MusicJobIntake, UploadedFile};
pub use music::{MusicJobDeps, MusicJobEngine, MusicJobSettings};
pub use scheduler::{default_schedule, PeriodicTask, Schedule, Scheduler, SchedulerHandle};
pub use worker::{TaskWorker, WorkerConfig, WorkerEvent, WorkerHandle};
