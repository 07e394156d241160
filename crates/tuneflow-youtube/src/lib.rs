//! # tuneflow-youtube
//!
//! Remote catalog provider over the YouTube Data API v3.
//!
//! Listings are exposed as lazily fetched pages: a page is requested only
//! when the consumer polls the stream for it, so an early stop on the
//! consumer side saves the remaining API quota.

pub mod client;
mod wire;

pub use client::{YoutubeClient, DEFAULT_YOUTUBE_API_BASE};
