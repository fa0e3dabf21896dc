//! Backend-agnostic gateway interfaces and DTOs for torrent daemons.
//!
//! This crate defines the uniform domain model, the [`ClientGateway`]
//! capability trait every backend adapter satisfies, the connection-health
//! monitor that decorates adapters, and the rate/ETA computer adapters use to
//! derive instantaneous throughput from cumulative counters.

pub mod error;
pub mod health;
pub mod model;
pub mod rates;
pub mod service;

pub use error::{GatewayError, GatewayResult};
pub use health::{GatewayMonitor, RetryPolicy};
pub use model::{
    AddTorrentByFileOptions, AddTorrentByUrlOptions, ClientSettings, ClientSettingsPatch,
    ConnectionSettings, ContentPriority, DiskUsage, Eta, MoveTorrentsOptions, Patch, PatchOp,
    PatchOpKind, PollingConfig, Taxonomy, TorrentContent, TorrentHash, TorrentListSnapshot,
    TorrentPeer, TorrentRecord, TorrentStatus, TorrentTracker, TrackerKind, TransferHistory,
    TransferPriority, TransferSample, TransferSummary,
};
pub use rates::{RateComputer, eta};
pub use service::{ClientGateway, require_hashes};
