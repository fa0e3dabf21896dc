//! Backend adapters implementing the gateway capability interface.
//!
//! Backends form a closed variant set behind the single [`ClientGateway`]
//! trait rather than an inheritance hierarchy: the interface contract stays
//! centralized and each adapter only translates its daemon's idiom.

pub mod binrpc;
pub mod multicall;
pub mod rest;
pub mod tracker;
pub mod wscommand;

use async_trait::async_trait;

use floodgate_gateway::error::GatewayResult;
use floodgate_gateway::model::{
    AddTorrentByFileOptions, AddTorrentByUrlOptions, ClientSettings, ClientSettingsPatch,
    ConnectionSettings, ContentPriority, MoveTorrentsOptions, TorrentContent, TorrentHash,
    TorrentListSnapshot, TorrentPeer, TorrentTracker, TransferPriority, TransferSummary,
};
use floodgate_gateway::service::ClientGateway;

pub use binrpc::BinRpcClient;
pub use multicall::MulticallClient;
pub use rest::RestClient;
pub use tracker::extract_tracker_domains;
pub use wscommand::WsCommandClient;

/// The closed set of supported backends.
pub enum BackendClient {
    /// Multicall-style JSON-RPC daemon.
    Multicall(MulticallClient),
    /// REST daemon with server-side sync deltas.
    Rest(RestClient),
    /// Binary-RPC daemon speaking the wire codec.
    BinaryRpc(BinRpcClient),
    /// Websocket-command daemon.
    WsCommand(WsCommandClient),
}

impl BackendClient {
    /// Construct the adapter matching the supplied connection settings.
    pub fn from_settings(settings: &ConnectionSettings) -> GatewayResult<Self> {
        match settings {
            ConnectionSettings::Multicall {
                url,
                username,
                password,
            } => Ok(Self::Multicall(MulticallClient::new(
                url,
                username.clone(),
                password.clone(),
            )?)),
            ConnectionSettings::Rest {
                base_url,
                username,
                password,
            } => Ok(Self::Rest(RestClient::new(
                base_url,
                username.clone(),
                password.clone(),
            )?)),
            ConnectionSettings::BinaryRpc {
                host,
                port,
                username,
                password,
            } => Ok(Self::BinaryRpc(BinRpcClient::new(
                host.clone(),
                *port,
                username.clone(),
                password.clone(),
            ))),
            ConnectionSettings::WsCommand { url, password } => Ok(Self::WsCommand(
                WsCommandClient::new(url.clone(), password.clone()),
            )),
        }
    }
}

macro_rules! delegate {
    ($self:ident, $method:ident($($arg:expr),*)) => {
        match $self {
            Self::Multicall(client) => client.$method($($arg),*).await,
            Self::Rest(client) => client.$method($($arg),*).await,
            Self::BinaryRpc(client) => client.$method($($arg),*).await,
            Self::WsCommand(client) => client.$method($($arg),*).await,
        }
    };
}

#[async_trait]
impl ClientGateway for BackendClient {
    async fn add_torrents_by_file(&self, options: AddTorrentByFileOptions) -> GatewayResult<()> {
        delegate!(self, add_torrents_by_file(options))
    }

    async fn add_torrents_by_url(&self, options: AddTorrentByUrlOptions) -> GatewayResult<()> {
        delegate!(self, add_torrents_by_url(options))
    }

    async fn remove_torrents(
        &self,
        hashes: Vec<TorrentHash>,
        delete_data: bool,
    ) -> GatewayResult<()> {
        delegate!(self, remove_torrents(hashes, delete_data))
    }

    async fn start_torrents(&self, hashes: Vec<TorrentHash>) -> GatewayResult<()> {
        delegate!(self, start_torrents(hashes))
    }

    async fn stop_torrents(&self, hashes: Vec<TorrentHash>) -> GatewayResult<()> {
        delegate!(self, stop_torrents(hashes))
    }

    async fn move_torrents(&self, options: MoveTorrentsOptions) -> GatewayResult<()> {
        delegate!(self, move_torrents(options))
    }

    async fn check_torrents(&self, hashes: Vec<TorrentHash>) -> GatewayResult<()> {
        delegate!(self, check_torrents(hashes))
    }

    async fn set_torrents_priority(
        &self,
        hashes: Vec<TorrentHash>,
        priority: TransferPriority,
    ) -> GatewayResult<()> {
        delegate!(self, set_torrents_priority(hashes, priority))
    }

    async fn set_torrents_tags(
        &self,
        hashes: Vec<TorrentHash>,
        tags: Vec<String>,
    ) -> GatewayResult<()> {
        delegate!(self, set_torrents_tags(hashes, tags))
    }

    async fn set_torrents_trackers(
        &self,
        hashes: Vec<TorrentHash>,
        trackers: Vec<String>,
    ) -> GatewayResult<()> {
        delegate!(self, set_torrents_trackers(hashes, trackers))
    }

    async fn set_torrent_contents_priority(
        &self,
        hash: TorrentHash,
        indices: Vec<u32>,
        priority: ContentPriority,
    ) -> GatewayResult<()> {
        delegate!(self, set_torrent_contents_priority(hash, indices, priority))
    }

    async fn get_torrent_contents(&self, hash: TorrentHash) -> GatewayResult<Vec<TorrentContent>> {
        delegate!(self, get_torrent_contents(hash))
    }

    async fn get_torrent_peers(&self, hash: TorrentHash) -> GatewayResult<Vec<TorrentPeer>> {
        delegate!(self, get_torrent_peers(hash))
    }

    async fn get_torrent_trackers(&self, hash: TorrentHash) -> GatewayResult<Vec<TorrentTracker>> {
        delegate!(self, get_torrent_trackers(hash))
    }

    async fn fetch_torrent_list(&self) -> GatewayResult<TorrentListSnapshot> {
        delegate!(self, fetch_torrent_list())
    }

    async fn fetch_transfer_summary(&self) -> GatewayResult<TransferSummary> {
        delegate!(self, fetch_transfer_summary())
    }

    async fn get_client_settings(&self) -> GatewayResult<ClientSettings> {
        delegate!(self, get_client_settings())
    }

    async fn set_client_settings(&self, patch: ClientSettingsPatch) -> GatewayResult<()> {
        delegate!(self, set_client_settings(patch))
    }

    async fn test_gateway(&self) -> GatewayResult<()> {
        delegate!(self, test_gateway())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_select_the_matching_variant() {
        let multicall = BackendClient::from_settings(&ConnectionSettings::Multicall {
            url: "http://localhost:5000/rpc".into(),
            username: None,
            password: None,
        })
        .expect("multicall builds");
        assert!(matches!(multicall, BackendClient::Multicall(_)));

        let rest = BackendClient::from_settings(&ConnectionSettings::Rest {
            base_url: "http://localhost:8080".into(),
            username: "admin".into(),
            password: "secret".into(),
        })
        .expect("rest builds");
        assert!(matches!(rest, BackendClient::Rest(_)));

        let binrpc = BackendClient::from_settings(&ConnectionSettings::BinaryRpc {
            host: "localhost".into(),
            port: 58_846,
            username: "admin".into(),
            password: "secret".into(),
        })
        .expect("binrpc builds");
        assert!(matches!(binrpc, BackendClient::BinaryRpc(_)));

        let ws = BackendClient::from_settings(&ConnectionSettings::WsCommand {
            url: "ws://localhost:8412".into(),
            password: None,
        })
        .expect("ws builds");
        assert!(matches!(ws, BackendClient::WsCommand(_)));
    }

    #[test]
    fn invalid_urls_are_validation_errors() {
        let result = BackendClient::from_settings(&ConnectionSettings::Multicall {
            url: "not a url".into(),
            username: None,
            password: None,
        });
        assert!(matches!(
            result,
            Err(floodgate_gateway::GatewayError::Validation { .. })
        ));
    }
}
