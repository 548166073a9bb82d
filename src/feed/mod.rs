//! Feed polling and subscriber fan-out.
//!
//! A [`Feed`] watches one URL. It polls on a timer, asks its
//! [`ChangePolicy`] whether the content is new, and on change hands the
//! parsed feed to every subscriber:
//!
//! - [`fetcher`] - the fetch+parse collaborator ([`FeedSource`], [`HttpSource`])
//! - [`change`] - content-digest and declared-timestamp change detection
//! - `poller` - the background loop driving each tick
//! - `broadcast` - the subscriber registry and per-subscriber delivery tasks
//!
//! # Example
//!
//! ```ignore
//! use courtfeed::feed::{Feed, FeedOptions, HttpSource};
//!
//! let cancel = CancellationToken::new();
//! let source = Arc::new(HttpSource::new(reqwest::Client::new()));
//! let feed = Feed::new(&cancel, url, source, FeedOptions::default());
//!
//! let mut rx = feed.subscribe()?;
//! while let Some(snapshot) = rx.recv().await {
//!     println!("{} entries", snapshot.entries.len());
//! }
//! ```

mod broadcast;
pub mod change;
pub mod fetcher;
mod poller;
mod subscription;

pub use broadcast::Snapshot;
pub use change::{ChangePolicy, Fingerprint};
pub use fetcher::{FeedSource, FetchError, Fetched, HttpSource, TranslateError, Translator};
pub use subscription::{
    Feed, FeedError, FeedOptions, DEFAULT_FETCH_TIMEOUT, DEFAULT_REFRESH_INTERVAL,
};
