//! Deterministic taxonomy derivation from a torrent-list snapshot.

use floodgate_gateway::model::{Taxonomy, TorrentListSnapshot};

/// Label used for torrents carrying no tags at all.
const UNTAGGED: &str = "untagged";
/// Label carrying the total torrent count in the status breakdown.
const ALL: &str = "all";

/// Derive status, tag, and tracker counts from a snapshot.
///
/// The result depends only on the snapshot contents, so recomputing after an
/// unchanged poll yields an identical value and diffs to nothing.
#[must_use]
pub fn derive(snapshot: &TorrentListSnapshot) -> Taxonomy {
    let mut taxonomy = Taxonomy::default();
    taxonomy
        .status_counts
        .insert(ALL.to_owned(), snapshot.torrents.len());

    for record in snapshot.torrents.values() {
        for flag in &record.status {
            *taxonomy
                .status_counts
                .entry(flag.label().to_owned())
                .or_default() += 1;
        }
        if record.tags.is_empty() {
            *taxonomy.tag_counts.entry(UNTAGGED.to_owned()).or_default() += 1;
        } else {
            for tag in &record.tags {
                *taxonomy.tag_counts.entry(tag.clone()).or_default() += 1;
            }
        }
        for domain in &record.tracker_domains {
            *taxonomy.tracker_counts.entry(domain.clone()).or_default() += 1;
        }
    }
    taxonomy
}

#[cfg(test)]
mod tests {
    use super::*;
    use floodgate_gateway::model::{TorrentRecord, TorrentStatus};

    fn snapshot_with(records: Vec<TorrentRecord>) -> TorrentListSnapshot {
        TorrentListSnapshot {
            id: 1,
            torrents: records
                .into_iter()
                .map(|record| (record.hash.clone(), record))
                .collect(),
        }
    }

    #[test]
    fn counts_cover_status_tags_and_trackers() {
        let snapshot = snapshot_with(vec![
            TorrentRecord {
                hash: "a".into(),
                status: vec![TorrentStatus::Downloading, TorrentStatus::Active],
                tags: vec!["linux".into()],
                tracker_domains: vec!["example.com".into()],
                ..TorrentRecord::default()
            },
            TorrentRecord {
                hash: "b".into(),
                status: vec![TorrentStatus::Seeding, TorrentStatus::Complete],
                tags: Vec::new(),
                tracker_domains: vec!["example.com".into(), "example.org".into()],
                ..TorrentRecord::default()
            },
        ]);

        let taxonomy = derive(&snapshot);
        assert_eq!(taxonomy.status_counts["all"], 2);
        assert_eq!(taxonomy.status_counts["downloading"], 1);
        assert_eq!(taxonomy.status_counts["seeding"], 1);
        assert_eq!(taxonomy.tag_counts["linux"], 1);
        assert_eq!(taxonomy.tag_counts["untagged"], 1);
        assert_eq!(taxonomy.tracker_counts["example.com"], 2);
        assert_eq!(taxonomy.tracker_counts["example.org"], 1);
    }

    #[test]
    fn derivation_is_deterministic() {
        let snapshot = snapshot_with(vec![TorrentRecord {
            hash: "a".into(),
            tags: vec!["linux".into(), "iso".into()],
            ..TorrentRecord::default()
        }]);
        assert_eq!(derive(&snapshot), derive(&snapshot));
    }
}
