//! Snapshot/diff engine and event broadcasting for gateway sessions.
//!
//! Turns each poll cycle's full state into minimal patch events, derives the
//! taxonomy, maintains the transfer history, and serves one long-lived SSE
//! frame stream per connected viewer. Sessions are isolated: the registry
//! builds one adapter, monitor, bus, and diff engine per session id.

pub mod broadcast;
pub mod diff;
pub mod history;
mod poller;
pub mod publisher;
pub mod session;
pub mod taxonomy;

pub use broadcast::{
    ConnectState, HEARTBEAT_FRAME, HEARTBEAT_INTERVAL, ViewerStream, sse_frame,
};
pub use diff::{apply_patch, diff_taxonomy, diff_torrents};
pub use history::{DEFAULT_HISTORY_CAPACITY, TransferHistoryRing};
pub use publisher::SnapshotPublisher;
pub use session::{SessionHandle, SessionRegistry};
