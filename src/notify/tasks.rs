use super::{Messages, Notifier};
use crate::bverfg::fetch_upcoming_decisions;
use crate::feed::Snapshot;
use chrono::{DateTime, Local, TimeZone};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Time from `now` until the next full `hour` in `now`'s time zone.
///
/// Returns `None` for hours outside `0..=23`. A local time skipped by a DST
/// transition moves on to the following day.
pub fn until_hour_of_day<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32) -> Option<Duration> {
    let target = next_hour_of_day(now, hour)?;
    target.signed_duration_since(now.clone()).to_std().ok()
}

/// The first full `hour` strictly after `now`.
fn next_hour_of_day<Tz: TimeZone>(now: &DateTime<Tz>, hour: u32) -> Option<DateTime<Tz>> {
    if hour > 23 {
        return None;
    }

    let tz = now.timezone();
    let mut day = now.date_naive();
    for _ in 0..3 {
        let target = day
            .and_hms_opt(hour, 0, 0)
            .and_then(|naive| tz.from_local_datetime(&naive).earliest());
        if let Some(target) = target {
            if target > *now {
                return Some(target);
            }
        }
        day = day.succ_opt()?;
    }
    None
}

/// Next outlook time after `now` that is also later than the previous run.
///
/// The sleep runs on the monotonic clock, so the wall clock may still read
/// just before the previous target when it fires.
fn next_outlook_run<Tz: TimeZone>(
    now: &DateTime<Tz>,
    previous: Option<&DateTime<Tz>>,
    hour: u32,
) -> Option<DateTime<Tz>> {
    let from = match previous {
        Some(previous) if previous > now => previous,
        _ => now,
    };
    next_hour_of_day(from, hour)
}

/// Announces every feed entry that wasn't in the previous snapshot.
///
/// The first snapshot only sets the baseline. Returns the number of
/// messages sent once the subscription channel closes.
pub async fn run_decision_notifier(
    mut rx: mpsc::Receiver<Snapshot>,
    messages: Arc<Messages>,
    notifier: Arc<dyn Notifier>,
) -> usize {
    let Some(baseline) = rx.recv().await else {
        return 0;
    };
    tracing::info!(entries = baseline.entries.len(), "Received initial decision feed");

    let mut seen: HashSet<String> = baseline.entries.iter().map(|e| e.id.clone()).collect();
    let mut sent = 0;

    while let Some(snapshot) = rx.recv().await {
        // Entries arrive newest-first; announce oldest first
        let fresh: Vec<_> = snapshot
            .entries
            .iter()
            .filter(|entry| !seen.contains(&entry.id))
            .collect();
        if fresh.is_empty() {
            tracing::debug!("Feed changed without new entries");
        }

        for entry in fresh.into_iter().rev() {
            tracing::info!(id = %entry.id, "New decision published");
            match notifier.notify(&messages.decision(entry)).await {
                Ok(()) => sent += 1,
                Err(e) => tracing::warn!(id = %entry.id, error = %e, "Failed to send decision notification"),
            }
        }

        seen = snapshot.entries.iter().map(|e| e.id.clone()).collect();
    }

    tracing::info!(sent, "Decision feed closed");
    sent
}

#[derive(Debug, Clone)]
pub struct OutlookSettings {
    pub url: String,
    /// Local hour of day at which the outlook goes out
    pub hour: u32,
}

/// Once a day, announces the senate decisions due that day.
pub async fn run_daily_outlook(
    client: reqwest::Client,
    settings: OutlookSettings,
    messages: Arc<Messages>,
    notifier: Arc<dyn Notifier>,
    cancel: CancellationToken,
) {
    let mut previous: Option<DateTime<Local>> = None;
    loop {
        let now = Local::now();
        let Some(run_at) = next_outlook_run(&now, previous.as_ref(), settings.hour) else {
            tracing::warn!(hour = settings.hour, "Invalid outlook hour, daily outlook disabled");
            return;
        };
        let delay = run_at.signed_duration_since(now).to_std().unwrap_or_default();
        tracing::info!(delay_secs = delay.as_secs(), "Daily outlook scheduled");

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        let today = run_at.date_naive();
        previous = Some(run_at);
        let decisions = match fetch_upcoming_decisions(&client, &settings.url).await {
            Ok(decisions) => decisions,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to scrape announced decisions");
                continue;
            }
        };

        for decision in decisions.iter().filter(|d| d.is_due_on(today)) {
            tracing::info!(reference = %decision.reference, "Decision due today");
            if let Err(e) = notifier.notify(&messages.upcoming(decision)).await {
                tracing::warn!(reference = %decision.reference, error = %e, "Failed to send outlook");
            }
        }
    }

    tracing::info!("Daily outlook stopped");
}
