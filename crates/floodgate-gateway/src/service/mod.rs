//! The capability trait every backend adapter must satisfy.

use async_trait::async_trait;

use crate::error::{GatewayError, GatewayResult};
use crate::model::{
    AddTorrentByFileOptions, AddTorrentByUrlOptions, ClientSettings, ClientSettingsPatch,
    ContentPriority, MoveTorrentsOptions, TorrentContent, TorrentHash, TorrentListSnapshot,
    TorrentPeer, TorrentTracker, TransferPriority, TransferSummary,
};

/// Uniform capability interface over heterogeneous torrent daemons.
///
/// Every method resolves with a normalized result or fails with a
/// [`GatewayError`]. Bulk operations are all-or-nothing per batch: the first
/// failing item aborts the call and the whole batch returns that error, so
/// callers should retry idempotently rather than assume partial application.
#[async_trait]
pub trait ClientGateway: Send + Sync {
    /// Add torrents from base64-encoded metainfo payloads.
    async fn add_torrents_by_file(&self, options: AddTorrentByFileOptions) -> GatewayResult<()>;

    /// Add torrents from magnet URIs or metainfo URLs.
    async fn add_torrents_by_url(&self, options: AddTorrentByUrlOptions) -> GatewayResult<()>;

    /// Remove torrents, optionally deleting their on-disk data.
    async fn remove_torrents(&self, hashes: Vec<TorrentHash>, delete_data: bool)
    -> GatewayResult<()>;

    /// Start the given torrents.
    async fn start_torrents(&self, hashes: Vec<TorrentHash>) -> GatewayResult<()>;

    /// Stop the given torrents.
    async fn stop_torrents(&self, hashes: Vec<TorrentHash>) -> GatewayResult<()>;

    /// Relocate torrent data, optionally moving files and re-verifying hashes.
    async fn move_torrents(&self, options: MoveTorrentsOptions) -> GatewayResult<()>;

    /// Hash-check the given torrents against on-disk data.
    async fn check_torrents(&self, hashes: Vec<TorrentHash>) -> GatewayResult<()>;

    /// Set the transfer priority for whole torrents.
    async fn set_torrents_priority(
        &self,
        hashes: Vec<TorrentHash>,
        priority: TransferPriority,
    ) -> GatewayResult<()>;

    /// Replace the tag set on the given torrents.
    async fn set_torrents_tags(
        &self,
        hashes: Vec<TorrentHash>,
        tags: Vec<String>,
    ) -> GatewayResult<()>;

    /// Replace the tracker list on the given torrents; default reports lack
    /// of support.
    async fn set_torrents_trackers(
        &self,
        hashes: Vec<TorrentHash>,
        trackers: Vec<String>,
    ) -> GatewayResult<()> {
        let _ = (hashes, trackers);
        Err(GatewayError::Unsupported {
            operation: "set_torrents_trackers",
        })
    }

    /// Set the download priority of individual files within a torrent.
    async fn set_torrent_contents_priority(
        &self,
        hash: TorrentHash,
        indices: Vec<u32>,
        priority: ContentPriority,
    ) -> GatewayResult<()>;

    /// Retrieve the file listing for a torrent.
    async fn get_torrent_contents(&self, hash: TorrentHash) -> GatewayResult<Vec<TorrentContent>>;

    /// Retrieve connected peers for a torrent; default reports lack of
    /// support.
    async fn get_torrent_peers(&self, hash: TorrentHash) -> GatewayResult<Vec<TorrentPeer>> {
        let _ = hash;
        Err(GatewayError::Unsupported {
            operation: "get_torrent_peers",
        })
    }

    /// Retrieve the tracker list for a torrent.
    async fn get_torrent_trackers(&self, hash: TorrentHash) -> GatewayResult<Vec<TorrentTracker>>;

    /// Fetch the full normalized torrent list.
    async fn fetch_torrent_list(&self) -> GatewayResult<TorrentListSnapshot>;

    /// Fetch the whole-backend transfer aggregate.
    async fn fetch_transfer_summary(&self) -> GatewayResult<TransferSummary>;

    /// Retrieve backend-level settings.
    async fn get_client_settings(&self) -> GatewayResult<ClientSettings>;

    /// Apply a partial backend-settings update.
    async fn set_client_settings(&self, patch: ClientSettingsPatch) -> GatewayResult<()>;

    /// Cheap health probe used by the connection-health retry timer.
    async fn test_gateway(&self) -> GatewayResult<()>;
}

/// Reject an empty hash set before any network call is attempted.
pub fn require_hashes(hashes: &[TorrentHash]) -> GatewayResult<()> {
    if hashes.is_empty() {
        return Err(GatewayError::validation("at least one hash is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubGateway;

    #[async_trait]
    impl ClientGateway for StubGateway {
        async fn add_torrents_by_file(
            &self,
            _options: AddTorrentByFileOptions,
        ) -> GatewayResult<()> {
            Ok(())
        }

        async fn add_torrents_by_url(&self, _options: AddTorrentByUrlOptions) -> GatewayResult<()> {
            Ok(())
        }

        async fn remove_torrents(
            &self,
            _hashes: Vec<TorrentHash>,
            _delete_data: bool,
        ) -> GatewayResult<()> {
            Ok(())
        }

        async fn start_torrents(&self, _hashes: Vec<TorrentHash>) -> GatewayResult<()> {
            Ok(())
        }

        async fn stop_torrents(&self, _hashes: Vec<TorrentHash>) -> GatewayResult<()> {
            Ok(())
        }

        async fn move_torrents(&self, _options: MoveTorrentsOptions) -> GatewayResult<()> {
            Ok(())
        }

        async fn check_torrents(&self, _hashes: Vec<TorrentHash>) -> GatewayResult<()> {
            Ok(())
        }

        async fn set_torrents_priority(
            &self,
            _hashes: Vec<TorrentHash>,
            _priority: TransferPriority,
        ) -> GatewayResult<()> {
            Ok(())
        }

        async fn set_torrents_tags(
            &self,
            _hashes: Vec<TorrentHash>,
            _tags: Vec<String>,
        ) -> GatewayResult<()> {
            Ok(())
        }

        async fn set_torrent_contents_priority(
            &self,
            _hash: TorrentHash,
            _indices: Vec<u32>,
            _priority: ContentPriority,
        ) -> GatewayResult<()> {
            Ok(())
        }

        async fn get_torrent_contents(
            &self,
            _hash: TorrentHash,
        ) -> GatewayResult<Vec<TorrentContent>> {
            Ok(Vec::new())
        }

        async fn get_torrent_trackers(
            &self,
            _hash: TorrentHash,
        ) -> GatewayResult<Vec<TorrentTracker>> {
            Ok(Vec::new())
        }

        async fn fetch_torrent_list(&self) -> GatewayResult<TorrentListSnapshot> {
            Ok(TorrentListSnapshot::default())
        }

        async fn fetch_transfer_summary(&self) -> GatewayResult<TransferSummary> {
            Ok(TransferSummary::default())
        }

        async fn get_client_settings(&self) -> GatewayResult<ClientSettings> {
            Ok(ClientSettings::default())
        }

        async fn set_client_settings(&self, _patch: ClientSettingsPatch) -> GatewayResult<()> {
            Ok(())
        }

        async fn test_gateway(&self) -> GatewayResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn default_methods_report_unsupported() {
        let gateway = StubGateway;
        let peers = gateway.get_torrent_peers("abc".into()).await;
        assert!(matches!(
            peers,
            Err(GatewayError::Unsupported {
                operation: "get_torrent_peers"
            })
        ));

        let trackers = gateway
            .set_torrents_trackers(vec!["abc".into()], vec!["http://t.example/ann".into()])
            .await;
        assert!(matches!(trackers, Err(GatewayError::Unsupported { .. })));
    }

    #[test]
    fn empty_hash_sets_are_rejected_synchronously() {
        assert!(matches!(
            require_hashes(&[]),
            Err(GatewayError::Validation { .. })
        ));
        assert!(require_hashes(&["abc".to_string()]).is_ok());
    }
}
