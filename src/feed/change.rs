//! Change detection between two observations of the same feed.

use super::fetcher::Fetched;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// How a [`Feed`](super::Feed) decides that fetched content is new.
///
/// The two policies trade false positives for false negatives: digests fire
/// on any byte-level difference (whitespace, rotating ads), declared
/// timestamps ignore noise but miss edits that don't bump the timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangePolicy {
    /// SHA-256 of the raw response body.
    #[default]
    Digest,
    /// The feed's own published timestamp, which must strictly increase.
    Timestamp,
}

/// Comparable summary of one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fingerprint {
    Digest([u8; 32]),
    Published(DateTime<Utc>),
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fingerprint::Digest(bytes) => {
                for b in bytes.iter().take(8) {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
            Fingerprint::Published(ts) => write!(f, "{}", ts.to_rfc2822()),
        }
    }
}

impl ChangePolicy {
    /// Computes the fingerprint of a fetch under this policy.
    ///
    /// Returns `None` when the timestamp policy finds no usable published
    /// date. feed-rs drops dates it cannot parse, so a malformed `pubDate`
    /// ends up here too.
    pub fn fingerprint(self, fetched: &Fetched) -> Option<Fingerprint> {
        match self {
            ChangePolicy::Digest => Some(Fingerprint::Digest(Sha256::digest(&fetched.raw).into())),
            ChangePolicy::Timestamp => fetched.feed.published.map(Fingerprint::Published),
        }
    }

    /// Whether `next` is a change relative to the stored baseline.
    ///
    /// With no baseline every observation is a change (cold start).
    pub fn is_change(self, previous: Option<&Fingerprint>, next: &Fingerprint) -> bool {
        match (previous, next) {
            (None, _) => true,
            (Some(Fingerprint::Digest(old)), Fingerprint::Digest(new)) => old != new,
            (Some(Fingerprint::Published(old)), Fingerprint::Published(new)) => new > old,
            // Baseline from another policy carries no information
            (Some(_), _) => true,
        }
    }
}
