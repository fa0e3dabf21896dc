//! Backend-agnostic torrent domain types shared across the workspace.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Stable content hash identifying one torrent within a backend session.
pub type TorrentHash = String;

/// High-level status flags attached to a torrent record.
///
/// Backends report wildly different state vocabularies; adapters normalize
/// them into this closed set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TorrentStatus {
    /// Payload data is being fetched from peers.
    Downloading,
    /// Download is complete and the torrent uploads to peers.
    Seeding,
    /// On-disk data is being hash-checked.
    Checking,
    /// Torrent is not started.
    Stopped,
    /// All wanted payload bytes are present.
    Complete,
    /// Transfer activity was observed in the last poll window.
    Active,
    /// No transfer activity in the last poll window.
    Inactive,
    /// The backend reported an error for this torrent.
    Error,
}

impl TorrentStatus {
    /// Machine-friendly label used in taxonomy counts.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::Seeding => "seeding",
            Self::Checking => "checking",
            Self::Stopped => "stopped",
            Self::Complete => "complete",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Error => "error",
        }
    }
}

/// Estimated time remaining for a transfer.
///
/// Serialized as `-1` for the infinite sentinel and as whole seconds
/// otherwise, matching the viewer contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eta {
    /// No forward progress; completion time is unknown.
    Infinite,
    /// Estimated seconds until completion.
    Seconds(u64),
}

impl Serialize for Eta {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Infinite => serializer.serialize_i64(-1),
            Self::Seconds(secs) => serializer.serialize_i64(i64::try_from(*secs).unwrap_or(i64::MAX)),
        }
    }
}

impl<'de> Deserialize<'de> for Eta {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        if raw < 0 {
            Ok(Self::Infinite)
        } else {
            #[allow(clippy::cast_sign_loss)]
            Ok(Self::Seconds(raw as u64))
        }
    }
}

impl Default for Eta {
    fn default() -> Self {
        Self::Infinite
    }
}

/// Normalized view of one torrent, independent of the backend that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TorrentRecord {
    /// Stable content hash; immutable for the lifetime of the backend session.
    pub hash: TorrentHash,
    /// Display name reported by the backend.
    pub name: String,
    /// Total payload size in bytes.
    pub size_bytes: u64,
    /// Bytes of wanted payload already present on disk.
    pub bytes_done: u64,
    /// Completion percentage in the range `0.0..=100.0`.
    pub percent_complete: f64,
    /// Cumulative bytes uploaded this session.
    pub up_total: u64,
    /// Cumulative bytes downloaded this session.
    pub down_total: u64,
    /// Instantaneous upload rate in bytes per second.
    pub up_rate: u64,
    /// Instantaneous download rate in bytes per second.
    pub down_rate: u64,
    /// Estimated completion time.
    #[serde(default)]
    pub eta: Eta,
    /// Upload/download ratio.
    pub ratio: f64,
    /// Normalized status flags.
    #[serde(default)]
    pub status: Vec<TorrentStatus>,
    /// User-assigned labels.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Deduplicated registrable tracker domains.
    #[serde(default)]
    pub tracker_domains: Vec<String>,
    /// Directory holding the payload data.
    pub directory: String,
    /// Whether the torrent is flagged private.
    pub is_private: bool,
    /// Peers currently connected.
    pub peers_connected: u32,
    /// Peers known to the swarm.
    pub peers_total: u32,
    /// Seeds currently connected.
    pub seeds_connected: u32,
    /// Seeds known to the swarm.
    pub seeds_total: u32,
    /// Unix seconds the torrent was added; `0` when unknown.
    pub date_added: i64,
    /// Unix seconds the metainfo was created; `0` when unknown.
    pub date_created: i64,
    /// Unix seconds the download finished; `0` when unknown.
    pub date_finished: i64,
    /// Unix seconds of last transfer activity; `0` when unknown.
    pub date_active: i64,
    /// Most recent tracker or client message for this torrent.
    #[serde(default)]
    pub message: String,
}

/// Complete torrent list at one point in time.
///
/// A new snapshot fully supersedes the prior one; it is transmitted in full
/// only to subscribers with no prior state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TorrentListSnapshot {
    /// Monotonic snapshot identifier (unix milliseconds of the poll).
    pub id: i64,
    /// Records keyed by content hash.
    pub torrents: BTreeMap<TorrentHash, TorrentRecord>,
}

/// Deterministic breakdown of a snapshot by status, tag, and tracker domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Taxonomy {
    /// Count of torrents per status label, plus an `"all"` total.
    pub status_counts: BTreeMap<String, usize>,
    /// Count of torrents per tag; untagged torrents count under `"untagged"`.
    pub tag_counts: BTreeMap<String, usize>,
    /// Count of torrents per registrable tracker domain.
    pub tracker_counts: BTreeMap<String, usize>,
}

/// Whole-backend transfer aggregate, independent of any single torrent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TransferSummary {
    /// Instantaneous download rate in bytes per second.
    pub down_rate: u64,
    /// Cumulative bytes downloaded this session.
    pub down_total: u64,
    /// Configured download throttle in bytes per second; `0` = unlimited.
    pub down_throttle: u64,
    /// Instantaneous upload rate in bytes per second.
    pub up_rate: u64,
    /// Cumulative bytes uploaded this session.
    pub up_total: u64,
    /// Configured upload throttle in bytes per second; `0` = unlimited.
    pub up_throttle: u64,
}

/// One point in the transfer-history series.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferSample {
    /// Unix milliseconds of the sample.
    pub timestamp: i64,
    /// Download rate in bytes per second at the sample time.
    pub down_rate: u64,
    /// Upload rate in bytes per second at the sample time.
    pub up_rate: u64,
}

/// Bounded series of transfer-rate samples, emitted only in full form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TransferHistory {
    /// Samples ordered oldest first.
    pub samples: Vec<TransferSample>,
}

/// Disk usage for one mount visible to the backend host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiskUsage {
    /// Mount path.
    pub path: String,
    /// Bytes in use.
    pub used_bytes: u64,
    /// Total capacity in bytes.
    pub total_bytes: u64,
}

/// Priority applied to individual files within a torrent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContentPriority {
    /// Do not download this file.
    Skip,
    /// Default priority.
    Normal,
    /// Prefer this file over normal-priority files.
    High,
}

/// One file inside a torrent's payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TorrentContent {
    /// Position of the file within the metainfo listing.
    pub index: u32,
    /// Path relative to the torrent root.
    pub path: String,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Bytes already downloaded for this file.
    pub bytes_done: u64,
    /// Current download priority.
    pub priority: ContentPriority,
}

/// One peer connected to a torrent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TorrentPeer {
    /// Remote address in `host:port` form.
    pub address: String,
    /// Peer client identification string.
    pub client: String,
    /// Download rate from this peer in bytes per second.
    pub down_rate: u64,
    /// Upload rate to this peer in bytes per second.
    pub up_rate: u64,
    /// Peer's reported completion percentage.
    pub percent_complete: f64,
    /// Whether the connection is encrypted.
    pub is_encrypted: bool,
    /// Whether the peer initiated the connection.
    pub is_incoming: bool,
}

/// Tracker transport kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrackerKind {
    /// HTTP or HTTPS announce.
    Http,
    /// UDP announce.
    Udp,
    /// Distributed hash table pseudo-tracker.
    Dht,
}

/// One tracker attached to a torrent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TorrentTracker {
    /// Announce URL.
    pub url: String,
    /// Transport kind derived from the URL scheme.
    pub kind: TrackerKind,
    /// Whether announces to this tracker are enabled.
    pub is_enabled: bool,
}

/// Backend-level settings surfaced to viewers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ClientSettings {
    /// Default download directory.
    pub download_dir: String,
    /// Global download throttle in bytes per second; `0` = unlimited.
    pub down_throttle: u64,
    /// Global upload throttle in bytes per second; `0` = unlimited.
    pub up_throttle: u64,
    /// Global peer connection cap; `0` = backend default.
    pub peer_limit_global: u32,
    /// Per-torrent peer connection cap; `0` = backend default.
    pub peer_limit_per_torrent: u32,
}

/// Partial settings update; `None` fields are left untouched.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientSettingsPatch {
    /// New default download directory.
    pub download_dir: Option<String>,
    /// New global download throttle.
    pub down_throttle: Option<u64>,
    /// New global upload throttle.
    pub up_throttle: Option<u64>,
    /// New global peer cap.
    pub peer_limit_global: Option<u32>,
    /// New per-torrent peer cap.
    pub peer_limit_per_torrent: Option<u32>,
}

impl ClientSettingsPatch {
    /// Whether the patch carries no changes at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.download_dir.is_none()
            && self.down_throttle.is_none()
            && self.up_throttle.is_none()
            && self.peer_limit_global.is_none()
            && self.peer_limit_per_torrent.is_none()
    }
}

/// Request payload for adding torrents from metainfo files.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AddTorrentByFileOptions {
    /// Base64-encoded `.torrent` metainfo payloads.
    pub files: Vec<String>,
    /// Optional download directory override.
    pub destination: Option<String>,
    /// Tags applied on admission.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether the torrents should start immediately.
    #[serde(default)]
    pub start_on_add: bool,
}

/// Request payload for adding torrents from magnet or HTTP URLs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AddTorrentByUrlOptions {
    /// Magnet URIs or `.torrent` URLs.
    pub urls: Vec<String>,
    /// Cookie header forwarded when the backend fetches the URL.
    pub cookies: Option<String>,
    /// Optional download directory override.
    pub destination: Option<String>,
    /// Tags applied on admission.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether the torrents should start immediately.
    #[serde(default)]
    pub start_on_add: bool,
}

/// Request payload for relocating torrent data.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MoveTorrentsOptions {
    /// Torrents to relocate.
    pub hashes: Vec<TorrentHash>,
    /// New data directory.
    pub destination: String,
    /// Whether on-disk data is moved alongside the registration.
    #[serde(default)]
    pub move_files: bool,
    /// Whether data should be hash-checked after the move.
    #[serde(default)]
    pub verify_hashes: bool,
}

/// Transfer priority applied to whole torrents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferPriority {
    /// Do not schedule transfers.
    Off,
    /// Below-normal scheduling weight.
    Low,
    /// Default scheduling weight.
    Normal,
    /// Above-normal scheduling weight.
    High,
}

/// Connection parameters for one backend, as a closed variant set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectionSettings {
    /// Multicall-style JSON-RPC daemon reached over HTTP.
    Multicall {
        /// RPC endpoint URL.
        url: String,
        /// Optional basic-auth username.
        username: Option<String>,
        /// Optional basic-auth password.
        password: Option<String>,
    },
    /// REST daemon with cookie-session authentication.
    Rest {
        /// API base URL.
        base_url: String,
        /// Login username.
        username: String,
        /// Login password.
        password: String,
    },
    /// Binary-RPC daemon reached over a raw TCP socket.
    BinaryRpc {
        /// Daemon host.
        host: String,
        /// Daemon port.
        port: u16,
        /// Login username.
        username: String,
        /// Login password.
        password: String,
    },
    /// Websocket-command daemon.
    WsCommand {
        /// Websocket URL.
        url: String,
        /// Optional authentication password.
        password: Option<String>,
    },
}

/// Poll cadence consumed (not validated) by the gateway.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Poll interval while at least one viewer is connected, in seconds.
    pub interval_secs: u64,
    /// Poll interval while no viewers are connected, in seconds.
    pub idle_interval_secs: u64,
}

impl PollingConfig {
    /// Active poll interval as a [`Duration`].
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Idle poll interval as a [`Duration`].
    #[must_use]
    pub const fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 2,
            idle_interval_secs: 30,
        }
    }
}

/// Single patch operation transforming one serialized snapshot into the next.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatchOp {
    /// Operation discriminator.
    pub op: PatchOpKind,
    /// Slash-prefixed key path into the serialized form.
    pub path: String,
    /// Replacement or inserted value; absent for removals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

/// Patch operation kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PatchOpKind {
    /// Insert a key that did not exist before.
    Add,
    /// Replace the value at an existing key.
    Replace,
    /// Remove an existing key.
    Remove,
}

/// Ordered sequence of operations; applying it to the previous snapshot must
/// reproduce the next snapshot exactly.
pub type Patch = Vec<PatchOp>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eta_serializes_sentinel_as_negative_one() {
        let infinite = serde_json::to_value(Eta::Infinite).expect("serialize");
        assert_eq!(infinite, serde_json::json!(-1));

        let finite = serde_json::to_value(Eta::Seconds(90)).expect("serialize");
        assert_eq!(finite, serde_json::json!(90));
    }

    #[test]
    fn eta_roundtrips_through_json() {
        for eta in [Eta::Infinite, Eta::Seconds(0), Eta::Seconds(86_400)] {
            let json = serde_json::to_string(&eta).expect("serialize");
            let back: Eta = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(back, eta);
        }
    }

    #[test]
    fn settings_patch_reports_emptiness() {
        assert!(ClientSettingsPatch::default().is_empty());
        let patch = ClientSettingsPatch {
            down_throttle: Some(1_024),
            ..ClientSettingsPatch::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn connection_settings_tagged_form() {
        let settings = ConnectionSettings::Rest {
            base_url: "http://localhost:8080".into(),
            username: "admin".into(),
            password: "secret".into(),
        };
        let value = serde_json::to_value(&settings).expect("serialize");
        assert_eq!(value["kind"], "rest");
        assert_eq!(value["base_url"], "http://localhost:8080");
    }
}
