//! Consumers of feed emissions and scraped announcements.
//!
//! Delivery to actual users is behind the [`Notifier`] trait. The crate
//! ships [`LogNotifier`], which writes every message to the log.

mod messages;
mod tasks;

pub use messages::Messages;
pub use tasks::{run_daily_outlook, run_decision_notifier, until_hour_of_day, OutlookSettings};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Sends a rendered message to every recipient.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), NotifyError>;
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) -> Result<(), NotifyError> {
        tracing::info!(message = %message, "Notification");
        Ok(())
    }
}
