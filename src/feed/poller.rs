//! The background poll loop: wait, fetch, compare, emit.

use super::fetcher::{FetchError, Fetched};
use super::subscription::Shared;
use std::sync::Arc;

/// Runs until the feed's shutdown token fires, then closes the feed.
///
/// Errors from a single cycle are logged and the loop carries on at the
/// next tick. The refresh interval is read before every wait, so changes
/// apply from the next wait onward.
pub(super) async fn run(shared: Arc<Shared>) {
    tracing::info!(url = %shared.url, policy = ?shared.policy, "Starting poll loop");

    loop {
        let interval = shared.refresh_interval();
        tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let fetch = tokio::time::timeout(shared.fetch_timeout, shared.source.fetch(&shared.url));
        let result = tokio::select! {
            biased;
            _ = shared.shutdown.cancelled() => break,
            result = fetch => result.unwrap_or(Err(FetchError::Timeout)),
        };

        match result {
            Ok(fetched) => observe(&shared, fetched),
            Err(e) => {
                tracing::warn!(url = %shared.url, error = %e, "Feed fetch failed, retrying next tick");
            }
        }
    }

    if shared.close() {
        tracing::info!(url = %shared.url, "Feed shut down");
    }
}

/// Compares one successful fetch against the baseline and emits on change.
fn observe(shared: &Arc<Shared>, fetched: Fetched) {
    let Some(fingerprint) = shared.policy.fingerprint(&fetched) else {
        tracing::warn!(
            url = %shared.url,
            "Feed has no usable published timestamp, treating as unchanged"
        );
        return;
    };

    {
        let mut state = shared.write();
        if state.closed {
            return;
        }
        if !shared
            .policy
            .is_change(state.last_observation.as_ref(), &fingerprint)
        {
            tracing::debug!(url = %shared.url, fingerprint = %fingerprint, "Feed unchanged");
            return;
        }
        tracing::debug!(
            url = %shared.url,
            previous = ?state.last_observation.as_ref().map(ToString::to_string),
            fingerprint = %fingerprint,
            "Feed changed"
        );
        state.last_observation = Some(fingerprint);
    }

    shared.publish(Arc::new(fetched.feed));
}
