use super::broadcast::{Registry, Snapshot};
use super::change::{ChangePolicy, Fingerprint};
use super::fetcher::FeedSource;
use super::poller;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedError {
    /// The feed was closed or its owning token was cancelled.
    #[error("feed is closed")]
    Closed,
    /// The poll loop has to be spawned but no Tokio runtime is running.
    #[error("subscribe requires a running Tokio runtime")]
    NoRuntime,
}

/// Tunables for a [`Feed`]. All of them have sensible defaults.
#[derive(Debug, Clone, Copy)]
pub struct FeedOptions {
    pub refresh_interval: Duration,
    /// Upper bound for one fetch+parse call
    pub fetch_timeout: Duration,
    pub policy: ChangePolicy,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            policy: ChangePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum PollLoop {
    Idle,
    Started,
}

pub(super) struct State {
    pub(super) closed: bool,
    pub(super) poll_loop: PollLoop,
    pub(super) last_observation: Option<Fingerprint>,
    pub(super) registry: Registry,
}

/// Everything the poll loop and delivery tasks share with the [`Feed`] handle.
pub(super) struct Shared {
    pub(super) url: String,
    pub(super) policy: ChangePolicy,
    pub(super) fetch_timeout: Duration,
    pub(super) source: Arc<dyn FeedSource>,
    /// Child of the owner's token; also cancelled by an explicit close.
    pub(super) shutdown: CancellationToken,
    refresh_interval_nanos: AtomicU64,
    state: RwLock<State>,
}

impl Shared {
    pub(super) fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn refresh_interval(&self) -> Duration {
        Duration::from_nanos(self.refresh_interval_nanos.load(Ordering::Acquire))
    }

    fn set_refresh_interval(&self, interval: Duration) {
        let nanos = u64::try_from(interval.as_nanos()).unwrap_or(u64::MAX);
        self.refresh_interval_nanos.store(nanos, Ordering::Release);
    }

    /// The one-time close sequence. Returns `true` for the call that closed.
    pub(super) fn close(&self) -> bool {
        let mut state = self.write();
        Self::close_locked(&mut state, &self.shutdown)
    }

    fn close_locked(state: &mut State, shutdown: &CancellationToken) -> bool {
        if state.closed {
            return false;
        }
        state.closed = true;
        let dropped = state.registry.close();
        shutdown.cancel();
        tracing::debug!(subscribers = dropped, "Closed all subscriber channels");
        true
    }

    pub(super) fn publish(self: &Arc<Self>, snapshot: Snapshot) {
        let state = self.read();
        if state.closed {
            return;
        }
        let dispatched = state.registry.publish(self, &snapshot);
        tracing::info!(
            url = %self.url,
            subscribers = dispatched,
            entries = snapshot.entries.len(),
            "Publishing feed update"
        );
    }
}

/// A polled feed with any number of subscribers.
///
/// Nothing happens until the first [`subscribe`](Feed::subscribe): that call
/// spawns the poll loop, which runs until the owner's token is cancelled or
/// the feed is closed. The first successful fetch is always emitted; after
/// that only fetches the configured [`ChangePolicy`] considers new.
///
/// Dropping the handle closes the feed.
pub struct Feed {
    shared: Arc<Shared>,
}

impl Feed {
    pub fn new(
        cancel: &CancellationToken,
        url: impl Into<String>,
        source: Arc<dyn FeedSource>,
        options: FeedOptions,
    ) -> Self {
        let shared = Arc::new(Shared {
            url: url.into(),
            policy: options.policy,
            fetch_timeout: options.fetch_timeout,
            source,
            shutdown: cancel.child_token(),
            refresh_interval_nanos: AtomicU64::new(0),
            state: RwLock::new(State {
                closed: false,
                poll_loop: PollLoop::Idle,
                last_observation: None,
                registry: Registry::default(),
            }),
        });
        shared.set_refresh_interval(options.refresh_interval);
        Self { shared }
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn policy(&self) -> ChangePolicy {
        self.shared.policy
    }

    pub fn refresh_interval(&self) -> Duration {
        self.shared.refresh_interval()
    }

    /// Takes effect from the next wait; a wait already in progress keeps its length.
    pub fn set_refresh_interval(&self, interval: Duration) {
        self.shared.set_refresh_interval(interval);
    }

    /// Registers a new subscriber and returns its channel.
    ///
    /// The channel yields every future emission and ends when the feed
    /// shuts down. There is no replay: a late subscriber waits for the next
    /// change.
    ///
    /// # Errors
    ///
    /// - [`FeedError::Closed`] if the feed was closed or its token cancelled
    /// - [`FeedError::NoRuntime`] if this is the first subscriber and no Tokio
    ///   runtime is available to run the poll loop
    pub fn subscribe(&self) -> Result<mpsc::Receiver<Snapshot>, FeedError> {
        let mut state = self.shared.write();

        if state.closed {
            return Err(FeedError::Closed);
        }
        if self.shared.shutdown.is_cancelled() {
            // Owner cancelled before the loop ever ran
            Shared::close_locked(&mut state, &self.shared.shutdown);
            return Err(FeedError::Closed);
        }

        if state.poll_loop == PollLoop::Idle {
            let runtime =
                tokio::runtime::Handle::try_current().map_err(|_| FeedError::NoRuntime)?;
            state.poll_loop = PollLoop::Started;
            runtime.spawn(poller::run(Arc::clone(&self.shared)));
        }

        let rx = state.registry.add();
        tracing::debug!(url = %self.shared.url, subscribers = state.registry.len(), "Subscribed");
        Ok(rx)
    }

    /// Closes the feed: stops the poll loop and ends every subscriber channel.
    ///
    /// Idempotent and safe to call from several tasks at once.
    pub fn close(&self) {
        if self.shared.close() {
            tracing::info!(url = %self.shared.url, "Feed closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.read().closed
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.read().registry.len()
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        self.shared.close();
    }
}

impl std::fmt::Debug for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feed")
            .field("url", &self.shared.url)
            .field("policy", &self.shared.policy)
            .field("refresh_interval", &self.refresh_interval())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::fetcher::{FetchError, Fetched};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[derive(Clone)]
    enum Step {
        Body(String),
        Fail,
        Hang,
    }

    /// Plays back a script of responses; the last step repeats forever.
    struct ScriptedSource {
        script: Vec<Step>,
        fetched_at: Mutex<Vec<Instant>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                script,
                fetched_at: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.fetched_at.lock().unwrap().len()
        }

        fn fetched_at(&self) -> Vec<Instant> {
            self.fetched_at.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FeedSource for ScriptedSource {
        async fn fetch(&self, _url: &str) -> Result<Fetched, FetchError> {
            let step = {
                let mut fetched_at = self.fetched_at.lock().unwrap();
                let index = fetched_at.len().min(self.script.len() - 1);
                fetched_at.push(Instant::now());
                self.script[index].clone()
            };
            match step {
                Step::Body(body) => {
                    let feed = feed_rs::parser::parse(body.as_bytes())
                        .map_err(|e| FetchError::Parse(e.to_string()))?;
                    Ok(Fetched {
                        raw: body.into_bytes(),
                        feed,
                    })
                }
                Step::Fail => Err(FetchError::HttpStatus(503)),
                Step::Hang => std::future::pending().await,
            }
        }
    }

    /// Produces a unique body on every call.
    struct CountingSource {
        calls: AtomicU64,
    }

    #[async_trait]
    impl FeedSource for CountingSource {
        async fn fetch(&self, _url: &str) -> Result<Fetched, FetchError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let body = rss(&n.to_string(), None);
            let feed = feed_rs::parser::parse(body.as_bytes()).unwrap();
            Ok(Fetched {
                raw: body.into_bytes(),
                feed,
            })
        }
    }

    fn rss(title: &str, pub_date: Option<&str>) -> String {
        let pub_date = pub_date
            .map(|d| format!("<pubDate>{}</pubDate>", d))
            .unwrap_or_default();
        format!(
            r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>{title}</title>{pub_date}
    <item><guid>{title}</guid><title>{title}</title></item>
</channel></rss>"#
        )
    }

    fn body(title: &str) -> Step {
        Step::Body(rss(title, None))
    }

    fn title(snapshot: &Snapshot) -> &str {
        snapshot
            .title
            .as_ref()
            .map(|t| t.content.as_str())
            .unwrap_or_default()
    }

    fn options(refresh_secs: u64) -> FeedOptions {
        FeedOptions {
            refresh_interval: Duration::from_secs(refresh_secs),
            ..FeedOptions::default()
        }
    }

    fn feed(source: Arc<dyn FeedSource>, opts: FeedOptions) -> (CancellationToken, Feed) {
        let cancel = CancellationToken::new();
        let feed = Feed::new(&cancel, "https://example.com/feed.xml", source, opts);
        (cancel, feed)
    }

    /// Waits long enough for several ticks and asserts nothing arrived.
    async fn assert_silent(rx: &mut mpsc::Receiver<Snapshot>) {
        let result = tokio::time::timeout(Duration::from_secs(60), rx.recv()).await;
        assert!(result.is_err(), "unexpected emission");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_start_emits_exactly_once() {
        let source = ScriptedSource::new(vec![body("A")]);
        let (_cancel, feed) = feed(source.clone(), options(5));

        let mut rx = feed.subscribe().unwrap();
        let first = rx.recv().await.unwrap();
        assert_eq!(title(&first), "A");

        assert_silent(&mut rx).await;
        assert!(source.calls() > 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_fetches_then_change_emit_once_more() {
        let source = ScriptedSource::new(vec![body("A"), body("A"), body("B")]);
        let (_cancel, feed) = feed(source.clone(), options(5));
        let mut rx = feed.subscribe().unwrap();

        assert_eq!(title(&rx.recv().await.unwrap()), "A");
        assert_eq!(title(&rx.recv().await.unwrap()), "B");
        assert_eq!(source.calls(), 3);

        assert_silent(&mut rx).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_and_timed_out_fetches_do_not_stop_the_loop() {
        let source = ScriptedSource::new(vec![Step::Fail, Step::Hang, body("A")]);
        let (_cancel, feed) = feed(source.clone(), options(5));
        let mut rx = feed.subscribe().unwrap();

        let started = Instant::now();
        assert_eq!(title(&rx.recv().await.unwrap()), "A");
        assert_eq!(source.calls(), 3);
        // Three waits plus one full fetch timeout
        assert_eq!(started.elapsed(), Duration::from_secs(15) + DEFAULT_FETCH_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_reaches_every_subscriber_once_per_change() {
        let source = ScriptedSource::new(vec![body("A"), body("A"), body("B")]);
        let (_cancel, feed) = feed(source.clone(), options(5));

        let mut receivers = vec![feed.subscribe().unwrap()];
        tokio::time::sleep(Duration::from_secs(1)).await;
        receivers.push(feed.subscribe().unwrap());
        tokio::time::sleep(Duration::from_secs(2)).await;
        receivers.push(feed.subscribe().unwrap());

        // Every subscriber holds a change before the following fetch runs
        for rx in &mut receivers {
            assert_eq!(title(&rx.recv().await.unwrap()), "A");
        }
        assert_eq!(source.calls(), 1);
        for rx in &mut receivers {
            assert_eq!(title(&rx.recv().await.unwrap()), "B");
        }
        assert_eq!(source.calls(), 3);
        for rx in &mut receivers {
            assert!(rx.try_recv().is_err());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_subscriber_gets_no_replay() {
        let source = ScriptedSource::new(vec![body("A")]);
        let (_cancel, feed) = feed(source, options(5));

        let mut early = feed.subscribe().unwrap();
        early.recv().await.unwrap();

        let mut late = feed.subscribe().unwrap();
        assert_silent(&mut late).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_consumer_does_not_block_others() {
        let source = Arc::new(CountingSource {
            calls: AtomicU64::new(0),
        });
        let (_cancel, feed) = feed(source, options(1));

        let _stalled = feed.subscribe().unwrap();
        let mut active = feed.subscribe().unwrap();

        for expected in 0..6 {
            let snapshot = active.recv().await.unwrap();
            assert_eq!(title(&snapshot), expected.to_string());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_consumer_receives_in_order_once_drained() {
        let source = Arc::new(CountingSource {
            calls: AtomicU64::new(0),
        });
        let (_cancel, feed) = feed(source, options(1));
        let mut slow = feed.subscribe().unwrap();

        tokio::time::sleep(Duration::from_millis(4500)).await;

        for expected in 0..4 {
            assert_eq!(title(&slow.recv().await.unwrap()), expected.to_string());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_change_applies_from_next_wait() {
        let source = ScriptedSource::new(vec![body("A")]);
        let (_cancel, feed) = feed(source.clone(), options(10));
        let started = Instant::now();
        let _rx = feed.subscribe().unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        feed.set_refresh_interval(Duration::from_secs(2));
        assert_eq!(feed.refresh_interval(), Duration::from_secs(2));

        tokio::time::sleep(Duration::from_secs(14)).await;
        let offsets: Vec<Duration> = source
            .fetched_at()
            .into_iter()
            .map(|t| t - started)
            .collect();
        assert_eq!(
            offsets,
            vec![
                Duration::from_secs(10),
                Duration::from_secs(12),
                Duration::from_secs(14)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent() {
        let source = ScriptedSource::new(vec![body("A")]);
        let (_cancel, feed) = feed(source, options(5));
        let mut rx = feed.subscribe().unwrap();

        feed.close();
        feed.close();

        assert!(feed.is_closed());
        assert!(rx.recv().await.is_none());
        assert_eq!(feed.subscribe().unwrap_err(), FeedError::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_close_converges() {
        let source = ScriptedSource::new(vec![body("A")]);
        let (_cancel, feed) = feed(source, options(5));
        let feed = Arc::new(feed);
        let mut rx = feed.subscribe().unwrap();

        let closers: Vec<_> = (0..8)
            .map(|_| {
                let feed = Arc::clone(&feed);
                tokio::spawn(async move { feed.close() })
            })
            .collect();
        for closer in closers {
            closer.await.unwrap();
        }

        assert!(rx.recv().await.is_none());
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_closes_subscribers() {
        let source = ScriptedSource::new(vec![body("A")]);
        let (cancel, feed) = feed(source.clone(), options(5));
        let mut rx = feed.subscribe().unwrap();
        rx.recv().await.unwrap();

        cancel.cancel();

        assert!(rx.recv().await.is_none());
        assert!(feed.is_closed());
        let calls = source.calls();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_drops_pending_delivery() {
        let source = Arc::new(CountingSource {
            calls: AtomicU64::new(0),
        });
        let (_cancel, feed) = feed(source, options(1));
        let mut rx = feed.subscribe().unwrap();

        // Two emissions: one buffered, one waiting in its delivery task
        tokio::time::sleep(Duration::from_millis(2500)).await;
        feed.close();

        assert_eq!(title(&rx.recv().await.unwrap()), "0");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_subscribe_after_cancel_is_rejected() {
        let source = ScriptedSource::new(vec![body("A")]);
        let (cancel, feed) = feed(source, options(5));

        cancel.cancel();

        assert_eq!(feed.subscribe().unwrap_err(), FeedError::Closed);
        assert!(feed.is_closed());
    }

    #[tokio::test]
    async fn test_dropped_subscribers_are_pruned() {
        let source = ScriptedSource::new(vec![body("A")]);
        let (_cancel, feed) = feed(source, options(5));

        drop(feed.subscribe().unwrap());
        let _rx = feed.subscribe().unwrap();

        assert_eq!(feed.subscriber_count(), 1);
    }

    #[test]
    fn test_subscribe_without_runtime() {
        let source = ScriptedSource::new(vec![body("A")]);
        let (_cancel, feed) = feed(source, options(5));

        assert_eq!(feed.subscribe().unwrap_err(), FeedError::NoRuntime);
        assert!(!feed.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timestamp_policy_skips_stale_and_undated() {
        let source = ScriptedSource::new(vec![
            Step::Body(rss("A", Some("Tue, 12 Mar 2024 09:00:00 +0100"))),
            Step::Body(rss("A2", Some("Tue, 12 Mar 2024 09:00:00 +0100"))),
            Step::Body(rss("old", Some("Mon, 11 Mar 2024 09:00:00 +0100"))),
            Step::Body(rss("undated", None)),
            Step::Body(rss("B", Some("Wed, 13 Mar 2024 09:00:00 +0100"))),
        ]);
        let opts = FeedOptions {
            policy: ChangePolicy::Timestamp,
            ..options(5)
        };
        let (_cancel, feed) = feed(source.clone(), opts);
        let mut rx = feed.subscribe().unwrap();

        assert_eq!(title(&rx.recv().await.unwrap()), "A");
        assert_eq!(title(&rx.recv().await.unwrap()), "B");
        assert_eq!(source.calls(), 5);
    }
}
