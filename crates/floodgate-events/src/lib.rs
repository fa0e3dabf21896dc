//! Per-session event bus fanning gateway state out to viewer streams.
//!
//! The bus provides a typed event enum, sequential identifiers, and support
//! for replaying recent events when subscribers reconnect (e.g. streaming
//! clients that supply `Last-Event-ID`). Internally it uses
//! `tokio::broadcast` with a bounded buffer; when the channel overflows, the
//! oldest events are dropped.
//!
//! Listener registrations are handed back as [`Subscription`] disposers so a
//! disconnecting viewer structurally cannot leak handlers on the bus.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use floodgate_gateway::model::{
    DiskUsage, Patch, Taxonomy, TorrentListSnapshot, TransferHistory, TransferSummary,
};
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, Sender};
use tokio::task::JoinHandle;

/// Identifier assigned to each event emitted on a bus.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed events pushed to connected viewers.
///
/// `*Full` variants carry complete state for subscribers without prior
/// context; `*Patch` variants carry the minimal diff against the immediately
/// prior emission.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Event {
    /// Backend connectivity flag flipped.
    ConnectivityChanged {
        /// Whether the backend is currently reachable.
        connected: bool,
    },
    /// Disk usage readings changed; always full form.
    DiskUsageChanged {
        /// Current per-mount readings.
        disks: Vec<DiskUsage>,
    },
    /// Complete torrent list for newly connected subscribers.
    TorrentListFull {
        /// The full snapshot.
        snapshot: TorrentListSnapshot,
    },
    /// Incremental torrent-list update.
    TorrentListPatch {
        /// Operations transforming the prior snapshot into the next.
        patch: Patch,
    },
    /// Complete taxonomy for newly connected subscribers.
    TaxonomyFull {
        /// The full taxonomy.
        taxonomy: Taxonomy,
    },
    /// Incremental taxonomy update.
    TaxonomyPatch {
        /// Operations transforming the prior taxonomy into the next.
        patch: Patch,
    },
    /// Whole-backend transfer aggregate; always full form.
    TransferSummaryFull {
        /// The current aggregate.
        summary: TransferSummary,
    },
    /// Transfer-rate history; always full form (no diffable snapshot).
    TransferHistoryFull {
        /// The current history window.
        history: TransferHistory,
    },
    /// Notification counters changed.
    NotificationCountChanged {
        /// Total stored notifications.
        total: u64,
        /// Notifications not yet seen by the viewer.
        unread: u64,
    },
}

impl Event {
    /// Machine-friendly discriminator matching the stream wire contract.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ConnectivityChanged { .. } => "connectivity-changed",
            Self::DiskUsageChanged { .. } => "disk-usage-changed",
            Self::TorrentListFull { .. } => "torrent-list-full",
            Self::TorrentListPatch { .. } => "torrent-list-patch",
            Self::TaxonomyFull { .. } => "taxonomy-full",
            Self::TaxonomyPatch { .. } => "taxonomy-patch",
            Self::TransferSummaryFull { .. } => "transfer-summary-full",
            Self::TransferHistoryFull { .. } => "transfer-history-full",
            Self::NotificationCountChanged { .. } => "notification-count-changed",
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct EventEnvelope {
    /// Monotonic identifier assigned to the wrapped event.
    pub id: EventId,
    /// Timestamp recording when the envelope was produced.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event payload.
    pub event: Event,
}

/// Per-session event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<std::sync::atomic::AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Construct a new bus with the provided broadcast capacity.
    ///
    /// The broadcast channel uses the same capacity as the in-memory replay
    /// buffer, ensuring dropped events impact both structures consistently.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "event bus capacity must be positive");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(std::sync::atomic::AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default in-memory buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish a new event to the bus, assigning it a sequential identifier.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    pub fn publish(&self, event: Event) -> EventId {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.buffer.lock().expect("event buffer mutex poisoned");
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to the bus, replaying any buffered events newer than `since_id`.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let mut backlog = VecDeque::new();
        if let Some(since) = since_id {
            let buffer = self.buffer.lock().expect("event buffer mutex poisoned");
            for item in buffer.iter() {
                if item.id > since {
                    backlog.push_back(item.clone());
                }
            }
        }

        let receiver = self.sender.subscribe();
        EventStream { backlog, receiver }
    }

    /// Attach a listener invoked for every subsequent emission.
    ///
    /// The listener stays registered until the returned [`Subscription`] is
    /// disposed or dropped; there is no other way to detach it, which makes
    /// the deregister-on-disconnect contract structural.
    #[must_use]
    pub fn attach<F>(&self, listener: F) -> Subscription
    where
        F: Fn(EventEnvelope) + Send + 'static,
    {
        let mut stream = self.subscribe(None);
        let handle = tokio::spawn(async move {
            while let Some(envelope) = stream.next().await {
                listener(envelope);
            }
        });
        Subscription {
            handle: Some(handle),
        }
    }

    /// Returns the last assigned identifier, if any events have been published.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        let buffer = self.buffer.lock().expect("event buffer mutex poisoned");
        buffer.back().map(|event| event.id)
    }

    /// Number of live receivers, used to pick the poll cadence.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper that yields events either from the replay backlog or from
/// the live broadcast channel.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event, respecting the replay backlog first.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        match self.receiver.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(_)) => self.receiver.recv().await.ok(),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

/// Disposer handle for a listener attached with [`EventBus::attach`].
///
/// Dropping the handle detaches the listener; [`Subscription::dispose`] does
/// the same explicitly.
pub struct Subscription {
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Detach the listener immediately.
    pub fn dispose(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    fn sample_event(tick: u64) -> Event {
        Event::NotificationCountChanged {
            total: tick,
            unread: tick,
        }
    }

    #[tokio::test]
    async fn sequential_ids_and_replay() {
        let bus = EventBus::with_capacity(16);

        let mut last_id = 0;
        for tick in 0..5 {
            last_id = bus.publish(sample_event(tick));
        }
        assert_eq!(last_id, 5);

        let mut stream = bus.subscribe(Some(2));
        let mut received = Vec::new();
        for _ in 0..3 {
            if let Some(event) = stream.next().await {
                received.push(event);
            }
        }

        assert_eq!(received.len(), 3);
        assert_eq!(received.first().unwrap().id, 3);
        assert_eq!(received.last().unwrap().id, 5);
    }

    #[tokio::test]
    async fn disposed_listeners_receive_nothing_further() {
        let bus = EventBus::with_capacity(16);
        let calls = Arc::new(AtomicUsize::new(0));

        let subscription = bus.attach({
            let calls = Arc::clone(&calls);
            move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });

        // Give the listener task a chance to register its receiver.
        sleep(Duration::from_millis(10)).await;
        bus.publish(sample_event(1));
        bus.publish(sample_event(2));
        sleep(Duration::from_millis(50)).await;
        let before = calls.load(Ordering::SeqCst);
        assert_eq!(before, 2);

        subscription.dispose();
        sleep(Duration::from_millis(10)).await;
        bus.publish(sample_event(3));
        sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn dropping_a_subscription_detaches_it() {
        let bus = EventBus::with_capacity(16);
        let calls = Arc::new(AtomicUsize::new(0));

        {
            let _subscription = bus.attach({
                let calls = Arc::clone(&calls);
                move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                }
            });
            sleep(Duration::from_millis(10)).await;
        }

        bus.publish(sample_event(1));
        sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn event_kind_matches_wire_contract() {
        let cases: Vec<(Event, &str)> = vec![
            (
                Event::ConnectivityChanged { connected: false },
                "connectivity-changed",
            ),
            (Event::DiskUsageChanged { disks: vec![] }, "disk-usage-changed"),
            (
                Event::TorrentListFull {
                    snapshot: TorrentListSnapshot::default(),
                },
                "torrent-list-full",
            ),
            (Event::TorrentListPatch { patch: vec![] }, "torrent-list-patch"),
            (
                Event::TaxonomyFull {
                    taxonomy: Taxonomy::default(),
                },
                "taxonomy-full",
            ),
            (Event::TaxonomyPatch { patch: vec![] }, "taxonomy-patch"),
            (
                Event::TransferSummaryFull {
                    summary: TransferSummary::default(),
                },
                "transfer-summary-full",
            ),
            (
                Event::TransferHistoryFull {
                    history: TransferHistory::default(),
                },
                "transfer-history-full",
            ),
            (
                Event::NotificationCountChanged {
                    total: 1,
                    unread: 0,
                },
                "notification-count-changed",
            ),
        ];
        for (event, expected) in cases {
            assert_eq!(event.kind(), expected);
            let serialized = serde_json::to_value(&event).expect("serialize");
            assert_eq!(serialized["type"], expected);
        }
    }
}
