//! The diff engine: turns poll results into full or patch events.

use floodgate_events::{Event, EventBus};
use floodgate_gateway::model::{Taxonomy, TorrentListSnapshot, TransferSummary};
use tracing::debug;

use crate::diff::{diff_taxonomy, diff_torrents};
use crate::taxonomy;

/// Holds the immediately prior snapshot forms and publishes the minimal
/// event for each new poll result.
///
/// The first observation publishes `*Full`; every later one publishes a
/// `*Patch` scoped to the changed keys, and nothing at all when the poll
/// produced an identical snapshot. Only adjacent generations are compared.
pub struct SnapshotPublisher {
    bus: EventBus,
    prev_list: Option<TorrentListSnapshot>,
    prev_taxonomy: Option<Taxonomy>,
    prev_summary: Option<TransferSummary>,
}

impl SnapshotPublisher {
    /// Construct a publisher emitting onto `bus`.
    #[must_use]
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            prev_list: None,
            prev_taxonomy: None,
            prev_summary: None,
        }
    }

    /// Ingest a new torrent-list snapshot, publishing list and taxonomy
    /// events as needed.
    pub fn publish_list(&mut self, snapshot: TorrentListSnapshot) {
        let next_taxonomy = taxonomy::derive(&snapshot);

        match self.prev_list.take() {
            None => {
                let _ = self.bus.publish(Event::TorrentListFull {
                    snapshot: snapshot.clone(),
                });
                let _ = self.bus.publish(Event::TaxonomyFull {
                    taxonomy: next_taxonomy.clone(),
                });
            }
            Some(prev) => {
                let patch = diff_torrents(&prev, &snapshot);
                if patch.is_empty() {
                    debug!(snapshot_id = snapshot.id, "poll produced no list changes");
                } else {
                    let _ = self.bus.publish(Event::TorrentListPatch { patch });
                }
                let prev_taxonomy = self
                    .prev_taxonomy
                    .take()
                    .unwrap_or_default();
                let taxonomy_patch = diff_taxonomy(&prev_taxonomy, &next_taxonomy);
                if !taxonomy_patch.is_empty() {
                    let _ = self.bus.publish(Event::TaxonomyPatch {
                        patch: taxonomy_patch,
                    });
                }
            }
        }

        self.prev_list = Some(snapshot);
        self.prev_taxonomy = Some(next_taxonomy);
    }

    /// Ingest a new transfer summary; summaries have no patch form and are
    /// re-emitted in full when they change.
    pub fn publish_summary(&mut self, summary: TransferSummary) {
        if self.prev_summary != Some(summary) {
            let _ = self.bus.publish(Event::TransferSummaryFull { summary });
        }
        self.prev_summary = Some(summary);
    }

    /// Latest ingested snapshot, for subscribers with no prior state.
    #[must_use]
    pub fn latest_list(&self) -> TorrentListSnapshot {
        self.prev_list.clone().unwrap_or_default()
    }

    /// Latest derived taxonomy.
    #[must_use]
    pub fn latest_taxonomy(&self) -> Taxonomy {
        self.prev_taxonomy.clone().unwrap_or_default()
    }

    /// Latest ingested transfer summary.
    #[must_use]
    pub fn latest_summary(&self) -> TransferSummary {
        self.prev_summary.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floodgate_gateway::model::TorrentRecord;

    fn snapshot(id: i64, names: &[(&str, &str)]) -> TorrentListSnapshot {
        TorrentListSnapshot {
            id,
            torrents: names
                .iter()
                .map(|(hash, name)| {
                    (
                        (*hash).to_owned(),
                        TorrentRecord {
                            hash: (*hash).to_owned(),
                            name: (*name).to_owned(),
                            ..TorrentRecord::default()
                        },
                    )
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn first_poll_publishes_fulls_then_patches() {
        let bus = EventBus::with_capacity(16);
        let mut stream = bus.subscribe(None);
        let mut publisher = SnapshotPublisher::new(bus);

        publisher.publish_list(snapshot(1, &[("aaa", "one")]));
        let first = stream.next().await.expect("event");
        assert!(matches!(first.event, Event::TorrentListFull { .. }));
        let second = stream.next().await.expect("event");
        assert!(matches!(second.event, Event::TaxonomyFull { .. }));

        publisher.publish_list(snapshot(2, &[("aaa", "one"), ("bbb", "two")]));
        let third = stream.next().await.expect("event");
        match &third.event {
            Event::TorrentListPatch { patch } => {
                assert_eq!(patch.len(), 1);
                assert_eq!(patch[0].path, "/bbb");
            }
            other => panic!("expected list patch, got {other:?}"),
        }
        assert!(third.id > second.id, "event ids must be monotonic");
    }

    #[tokio::test]
    async fn unchanged_polls_publish_nothing() {
        let bus = EventBus::with_capacity(16);
        let mut publisher = SnapshotPublisher::new(bus.clone());

        publisher.publish_list(snapshot(1, &[("aaa", "one")]));
        let after_first = bus.last_event_id();
        // The snapshot id differs but no record changed.
        publisher.publish_list(snapshot(2, &[("aaa", "one")]));
        assert_eq!(bus.last_event_id(), after_first);
    }

    #[tokio::test]
    async fn summaries_only_emit_on_change() {
        let bus = EventBus::with_capacity(16);
        let mut publisher = SnapshotPublisher::new(bus.clone());

        let summary = TransferSummary {
            down_rate: 100,
            ..TransferSummary::default()
        };
        publisher.publish_summary(summary);
        let first = bus.last_event_id();
        assert!(first.is_some());

        publisher.publish_summary(summary);
        assert_eq!(bus.last_event_id(), first);

        publisher.publish_summary(TransferSummary {
            down_rate: 200,
            ..TransferSummary::default()
        });
        assert!(bus.last_event_id() > first);
    }
}
