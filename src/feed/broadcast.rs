//! Subscriber registry and fan-out delivery.
//!
//! Every emission is delivered to each subscriber by its own short-lived
//! task. The poll loop never waits for these tasks, so a consumer that stops
//! draining only builds up back-pressure on itself. Deliveries to the same
//! subscriber are chained: a task waits for its predecessor before sending,
//! which keeps one subscriber's values in tick order.

use super::subscription::Shared;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A parsed feed as handed to subscribers. Shared, never copied per subscriber.
pub type Snapshot = Arc<feed_rs::model::Feed>;

/// Buffer per subscriber. One undrained value is enough to decouple the
/// broadcaster; further values wait in their delivery tasks.
const SUBSCRIBER_BUFFER: usize = 1;

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Snapshot>,
    /// Most recent delivery task for this subscriber
    in_flight: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
pub(super) struct Registry {
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

impl Registry {
    /// Registers a new delivery channel and returns its receiving half.
    ///
    /// Subscribers whose receiver has been dropped are pruned here, since
    /// this is the only place the registry is mutated while open.
    pub(super) fn add(&mut self) -> mpsc::Receiver<Snapshot> {
        self.subscribers.retain(|sub| {
            let alive = !sub.tx.is_closed();
            if !alive {
                tracing::debug!(subscriber = sub.id, "Pruning dropped subscriber");
            }
            alive
        });

        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.subscribers.push(Subscriber {
            id: self.next_id,
            tx,
            in_flight: Mutex::new(None),
        });
        self.next_id += 1;
        rx
    }

    pub(super) fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Spawns one delivery task per live subscriber. Does not wait for any of them.
    pub(super) fn publish(&self, shared: &Arc<Shared>, snapshot: &Snapshot) -> usize {
        let mut dispatched = 0;
        for sub in &self.subscribers {
            if sub.tx.is_closed() {
                continue;
            }

            let mut in_flight = sub.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            let previous = in_flight.take().filter(|handle| !handle.is_finished());
            let handle = tokio::spawn(deliver(
                Arc::clone(shared),
                sub.id,
                sub.tx.clone(),
                Arc::clone(snapshot),
                previous,
            ));
            *in_flight = Some(handle);
            dispatched += 1;
        }
        dispatched
    }

    /// Drops every sender held by the registry.
    ///
    /// Receivers observe closure once the registry's sender and any
    /// in-flight delivery task for them are gone; delivery tasks exit on the
    /// feed's shutdown token.
    pub(super) fn close(&mut self) -> usize {
        let count = self.subscribers.len();
        self.subscribers.clear();
        count
    }
}

async fn deliver(
    shared: Arc<Shared>,
    subscriber: u64,
    tx: mpsc::Sender<Snapshot>,
    snapshot: Snapshot,
    previous: Option<JoinHandle<()>>,
) {
    let shutdown = shared.shutdown.clone();
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => {}
        _ = send_in_order(&shared, subscriber, &tx, snapshot, previous) => {}
    }
}

async fn send_in_order(
    shared: &Shared,
    subscriber: u64,
    tx: &mpsc::Sender<Snapshot>,
    snapshot: Snapshot,
    previous: Option<JoinHandle<()>>,
) {
    if let Some(previous) = previous {
        let _ = previous.await;
    }

    let permit = match tx.reserve().await {
        Ok(permit) => permit,
        Err(_) => {
            tracing::debug!(subscriber, "Subscriber dropped before delivery");
            return;
        }
    };

    // Close takes the write lock, so holding the read lock here orders this
    // send strictly before or after it.
    let state = shared.read();
    if state.closed {
        return;
    }
    permit.send(snapshot);
}
