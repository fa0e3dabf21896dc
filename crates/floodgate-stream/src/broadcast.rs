//! Per-viewer push streams with SSE framing.
//!
//! A stream opens with the full current state (the viewer has no prior
//! context), then forwards bus events as they arrive. Dropping the stream
//! disposes the bus subscription and stops the heartbeat, so a disconnected
//! viewer cannot leak listeners on the long-lived emitters.

use std::time::Duration;

use chrono::Utc;
use floodgate_events::{Event, EventBus, EventEnvelope, Subscription};
use floodgate_gateway::model::{
    DiskUsage, Taxonomy, TorrentListSnapshot, TransferHistory, TransferSummary,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// Cadence of the comment heartbeat keeping proxies from closing the stream.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(500);

/// Comment line emitted between events; ignored by SSE parsers.
pub const HEARTBEAT_FRAME: &str = ": keep-alive\n\n";

/// Buffered frames per viewer before events are shed.
const STREAM_BUFFER: usize = 256;

/// Render one event envelope as an SSE frame.
#[must_use]
pub fn sse_frame(envelope: &EventEnvelope) -> String {
    let payload = serde_json::to_string(&envelope.event).unwrap_or_else(|_| "{}".to_owned());
    format!(
        "id: {}\nevent: {}\ndata: {}\n\n",
        envelope.id,
        envelope.event.kind(),
        payload
    )
}

/// Full state pushed to a viewer that just connected.
#[derive(Debug, Clone, Default)]
pub struct ConnectState {
    /// Current backend connectivity flag.
    pub connected: bool,
    /// Current disk usage readings.
    pub disks: Vec<DiskUsage>,
    /// Latest torrent-list snapshot.
    pub snapshot: TorrentListSnapshot,
    /// Latest taxonomy.
    pub taxonomy: Taxonomy,
    /// Latest transfer summary.
    pub summary: TransferSummary,
    /// Current transfer-history window.
    pub history: TransferHistory,
    /// Current `(total, unread)` notification counters.
    pub notifications: (u64, u64),
}

/// One viewer's long-lived, unidirectional frame stream.
pub struct ViewerStream {
    receiver: mpsc::Receiver<String>,
    _subscription: Subscription,
    heartbeat: JoinHandle<()>,
}

impl ViewerStream {
    /// Receive the next SSE frame, or `None` once the session is gone.
    pub async fn next_frame(&mut self) -> Option<String> {
        self.receiver.recv().await
    }
}

impl Drop for ViewerStream {
    fn drop(&mut self) {
        self.heartbeat.abort();
    }
}

/// Open a stream against `bus`, seeding it with `initial` full state.
#[must_use]
pub fn open_stream(bus: &EventBus, initial: ConnectState) -> ViewerStream {
    let (tx, receiver) = mpsc::channel(STREAM_BUFFER);

    // Connect-time fulls carry the bus's current high-water id; everything
    // published afterwards is strictly larger.
    let base_id = bus.last_event_id().unwrap_or(0);
    let now = Utc::now();
    let connect_events = [
        Event::ConnectivityChanged {
            connected: initial.connected,
        },
        Event::DiskUsageChanged {
            disks: initial.disks,
        },
        Event::TorrentListFull {
            snapshot: initial.snapshot,
        },
        Event::TaxonomyFull {
            taxonomy: initial.taxonomy,
        },
        Event::TransferSummaryFull {
            summary: initial.summary,
        },
        Event::TransferHistoryFull {
            history: initial.history,
        },
        Event::NotificationCountChanged {
            total: initial.notifications.0,
            unread: initial.notifications.1,
        },
    ];
    for event in connect_events {
        let envelope = EventEnvelope {
            id: base_id,
            timestamp: now,
            event,
        };
        let _ = tx.try_send(sse_frame(&envelope));
    }

    let forward = tx.clone();
    let subscription = bus.attach(move |envelope| {
        // A viewer that stopped reading sheds events rather than stalling
        // the bus; it reconnects with a fresh full state.
        if forward.try_send(sse_frame(&envelope)).is_err() {
            trace!(event_id = envelope.id, "viewer buffer full, frame dropped");
        }
    });

    let heartbeat = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if tx.send(HEARTBEAT_FRAME.to_owned()).await.is_err() {
                break;
            }
        }
    });

    ViewerStream {
        receiver,
        _subscription: subscription,
        heartbeat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout};

    fn non_heartbeat(frame: &str) -> bool {
        !frame.starts_with(':')
    }

    async fn next_event_frame(stream: &mut ViewerStream) -> String {
        loop {
            let frame = timeout(Duration::from_secs(1), stream.next_frame())
                .await
                .expect("frame arrives")
                .expect("stream open");
            if non_heartbeat(&frame) {
                return frame;
            }
        }
    }

    #[tokio::test]
    async fn connect_emits_every_full_form_in_order() {
        let bus = EventBus::with_capacity(16);
        let mut stream = open_stream(&bus, ConnectState::default());

        let expected = [
            "connectivity-changed",
            "disk-usage-changed",
            "torrent-list-full",
            "taxonomy-full",
            "transfer-summary-full",
            "transfer-history-full",
            "notification-count-changed",
        ];
        for kind in expected {
            let frame = next_event_frame(&mut stream).await;
            assert!(
                frame.contains(&format!("event: {kind}\n")),
                "expected {kind} in frame {frame:?}"
            );
        }
    }

    #[tokio::test]
    async fn bus_events_are_framed_with_id_and_type() {
        let bus = EventBus::with_capacity(16);
        let mut stream = open_stream(&bus, ConnectState::default());
        for _ in 0..7 {
            next_event_frame(&mut stream).await;
        }

        sleep(Duration::from_millis(10)).await;
        let id = bus.publish(Event::NotificationCountChanged {
            total: 3,
            unread: 1,
        });

        let frame = next_event_frame(&mut stream).await;
        assert!(frame.starts_with(&format!("id: {id}\n")));
        assert!(frame.contains("event: notification-count-changed\n"));
        assert!(frame.contains("\"total\":3"));
        assert!(frame.ends_with("\n\n"));
    }

    #[tokio::test]
    async fn heartbeats_flow_while_idle() {
        let bus = EventBus::with_capacity(16);
        let mut stream = open_stream(&bus, ConnectState::default());
        for _ in 0..7 {
            next_event_frame(&mut stream).await;
        }

        let frame = timeout(Duration::from_secs(2), stream.next_frame())
            .await
            .expect("heartbeat arrives")
            .expect("stream open");
        assert_eq!(frame, HEARTBEAT_FRAME);
    }

    #[tokio::test]
    async fn dropping_the_stream_detaches_its_listener() {
        let bus = EventBus::with_capacity(16);
        {
            let _stream = open_stream(&bus, ConnectState::default());
            sleep(Duration::from_millis(20)).await;
            assert!(bus.subscriber_count() > 0);
        }
        // The disposed subscription's receiver disappears from the bus.
        sleep(Duration::from_millis(20)).await;
        assert_eq!(bus.subscriber_count(), 0);
    }
}
