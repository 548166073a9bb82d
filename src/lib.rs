//! Court decision feed watcher.
//!
//! [`feed`] polls a remote feed and fans every change out to subscribers.
//! [`bverfg`] holds the court-specific parsing, [`notify`] the consumers that
//! turn emissions into messages.

pub mod bverfg;
pub mod config;
pub mod feed;
pub mod notify;
