use crate::feed::{TranslateError, Translator};
use feed_rs::model::{Feed, FeedType};
use std::cmp::Reverse;

/// Fixes up the court's RSS feeds after parsing.
///
/// The site builder behind them never updates the channel `pubDate`, so
/// entries are sorted newest-first and the newest entry's date becomes the
/// feed's published timestamp. That keeps the timestamp change policy usable.
#[derive(Debug, Default, Clone, Copy)]
pub struct DecisionFeedTranslator;

impl Translator for DecisionFeedTranslator {
    fn translate(&self, mut feed: Feed) -> Result<Feed, TranslateError> {
        if !matches!(feed.feed_type, FeedType::RSS2) {
            return Err(TranslateError(format!(
                "feed didn't match expected RSS format: {:?}",
                feed.feed_type
            )));
        }

        // Stable: entries without a date keep their order, after dated ones
        feed.entries.sort_by_key(|entry| Reverse(entry.published));

        if let Some(latest) = feed.entries.first().and_then(|entry| entry.published) {
            feed.published = Some(latest);
        }

        Ok(feed)
    }
}
