//! Adapter for the REST daemon with server-side sync deltas.
//!
//! The daemon diffs its own state: each `sync/maindata` response carries only
//! the fields that changed since the response id (`rid`) the adapter last
//! acknowledged. The adapter reshapes those deltas into its cached full
//! snapshot rather than re-deriving diffs; the shared diff engine downstream
//! produces the uniform patch representation from the snapshot like it does
//! for every other backend.

use std::collections::BTreeMap;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use floodgate_gateway::error::{GatewayError, GatewayResult};
use floodgate_gateway::model::{
    AddTorrentByFileOptions, AddTorrentByUrlOptions, ClientSettings, ClientSettingsPatch,
    ContentPriority, Eta, MoveTorrentsOptions, TorrentContent, TorrentHash, TorrentListSnapshot,
    TorrentPeer, TorrentRecord, TorrentStatus, TorrentTracker, TrackerKind, TransferPriority,
    TransferSummary,
};
use floodgate_gateway::service::{ClientGateway, require_hashes};

use crate::tracker::extract_tracker_domains;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the REST daemon.
pub struct RestClient {
    http: Client,
    base: Url,
    username: String,
    password: String,
    state: Mutex<SyncState>,
}

#[derive(Default)]
struct SyncState {
    authed: bool,
    rid: u64,
    torrents: BTreeMap<String, CachedTorrent>,
}

#[derive(Clone, Default)]
struct CachedTorrent {
    record: TorrentRecord,
    raw_state: String,
}

/// Server-side delta response for the torrent list.
#[derive(Debug, Default, Deserialize)]
struct MainData {
    #[serde(default)]
    rid: u64,
    #[serde(default)]
    full_update: bool,
    #[serde(default)]
    torrents: BTreeMap<String, TorrentDelta>,
    #[serde(default)]
    torrents_removed: Vec<String>,
}

/// Per-torrent delta; absent fields are unchanged.
#[derive(Debug, Default, Deserialize)]
struct TorrentDelta {
    name: Option<String>,
    size: Option<u64>,
    progress: Option<f64>,
    dlspeed: Option<u64>,
    upspeed: Option<u64>,
    downloaded: Option<u64>,
    uploaded: Option<u64>,
    eta: Option<i64>,
    state: Option<String>,
    tags: Option<String>,
    tracker: Option<String>,
    save_path: Option<String>,
    ratio: Option<f64>,
    num_leechs: Option<u32>,
    num_incomplete: Option<u32>,
    num_seeds: Option<u32>,
    num_complete: Option<u32>,
    added_on: Option<i64>,
    completion_on: Option<i64>,
    last_activity: Option<i64>,
    private: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct TransferInfo {
    #[serde(default)]
    dl_info_speed: u64,
    #[serde(default)]
    dl_info_data: u64,
    #[serde(default)]
    dl_rate_limit: i64,
    #[serde(default)]
    up_info_speed: u64,
    #[serde(default)]
    up_info_data: u64,
    #[serde(default)]
    up_rate_limit: i64,
}

#[derive(Debug, Deserialize)]
struct Preferences {
    #[serde(default)]
    save_path: String,
    #[serde(default)]
    dl_limit: i64,
    #[serde(default)]
    up_limit: i64,
    #[serde(default)]
    max_connec: i64,
    #[serde(default)]
    max_connec_per_torrent: i64,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    #[serde(default)]
    index: Option<u32>,
    name: String,
    size: u64,
    #[serde(default)]
    progress: f64,
    #[serde(default)]
    priority: i64,
}

#[derive(Debug, Deserialize)]
struct PeerList {
    #[serde(default)]
    peers: BTreeMap<String, PeerEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct PeerEntry {
    #[serde(default)]
    client: String,
    #[serde(default)]
    dl_speed: u64,
    #[serde(default)]
    up_speed: u64,
    #[serde(default)]
    progress: f64,
    #[serde(default)]
    flags: String,
}

#[derive(Debug, Deserialize)]
struct TrackerEntry {
    url: String,
    #[serde(default)]
    status: i64,
}

impl RestClient {
    /// Construct a client for the given base URL and credentials.
    pub fn new(base_url: &str, username: String, password: String) -> GatewayResult<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|err| GatewayError::validation(format!("invalid REST base URL: {err}")))?;
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .cookie_store(true)
            .build()
            .map_err(|err| GatewayError::connectivity("client_init", err))?;
        Ok(Self {
            http,
            base,
            username,
            password,
            state: Mutex::new(SyncState::default()),
        })
    }

    fn api_url(&self, operation: &'static str, path: &str) -> GatewayResult<Url> {
        self.base
            .join(&format!("api/v2/{path}"))
            .map_err(|err| GatewayError::decode(operation, err.to_string()))
    }

    async fn login(&self, operation: &'static str) -> GatewayResult<()> {
        let url = self.api_url(operation, "auth/login")?;
        let response = self
            .http
            .post(url)
            .form(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await
            .map_err(|err| GatewayError::connectivity(operation, err))?;
        let body = response
            .text()
            .await
            .map_err(|err| GatewayError::connectivity(operation, err))?;
        if !body.starts_with("Ok") {
            return Err(GatewayError::connectivity(
                operation,
                io::Error::other("authentication rejected"),
            ));
        }
        debug!(operation, "REST session established");
        Ok(())
    }

    async fn ensure_auth(&self, operation: &'static str) -> GatewayResult<()> {
        let mut state = self.state.lock().await;
        if !state.authed {
            self.login(operation).await?;
            state.authed = true;
        }
        Ok(())
    }

    /// Issue a request, re-authenticating once if the session cookie lapsed.
    async fn request<F>(&self, operation: &'static str, build: F) -> GatewayResult<reqwest::Response>
    where
        F: Fn(&Client) -> reqwest::RequestBuilder + Send + Sync,
    {
        self.ensure_auth(operation).await?;
        let mut response = build(&self.http)
            .send()
            .await
            .map_err(|err| GatewayError::connectivity(operation, err))?;
        if response.status() == StatusCode::FORBIDDEN {
            self.login(operation).await?;
            response = build(&self.http)
                .send()
                .await
                .map_err(|err| GatewayError::connectivity(operation, err))?;
        }
        let status = response.status();
        if status.is_server_error() {
            return Err(GatewayError::connectivity(
                operation,
                io::Error::other(format!("HTTP {status}")),
            ));
        }
        if !status.is_success() {
            return Err(GatewayError::rejected(operation, format!("HTTP {status}")));
        }
        Ok(response)
    }

    async fn post_form(
        &self,
        operation: &'static str,
        path: &str,
        form: Vec<(&'static str, String)>,
    ) -> GatewayResult<()> {
        let url = self.api_url(operation, path)?;
        self.request(operation, move |client| {
            client.post(url.clone()).form(&form)
        })
        .await
        .map(|_| ())
    }
}

fn merge_delta(cached: &mut CachedTorrent, hash: &str, delta: TorrentDelta) {
    if let Some(state) = delta.state {
        cached.raw_state = state;
    }
    let record = &mut cached.record;
    record.hash = hash.to_owned();
    if let Some(name) = delta.name {
        record.name = name;
    }
    if let Some(size) = delta.size {
        record.size_bytes = size;
    }
    if let Some(progress) = delta.progress {
        record.percent_complete = progress * 100.0;
    }
    if let Some(rate) = delta.dlspeed {
        record.down_rate = rate;
    }
    if let Some(rate) = delta.upspeed {
        record.up_rate = rate;
    }
    if let Some(total) = delta.downloaded {
        record.down_total = total;
    }
    if let Some(total) = delta.uploaded {
        record.up_total = total;
    }
    if let Some(eta) = delta.eta {
        // The daemon reports an 8,640,000-second ceiling as "unknown".
        record.eta = match u64::try_from(eta) {
            Ok(secs) if secs < 8_640_000 => Eta::Seconds(secs),
            _ => Eta::Infinite,
        };
    }
    if let Some(tags) = delta.tags {
        record.tags = tags
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_owned)
            .collect();
    }
    if let Some(tracker) = delta.tracker {
        record.tracker_domains = extract_tracker_domains([tracker.as_str()]);
    }
    if let Some(path) = delta.save_path {
        record.directory = path;
    }
    if let Some(ratio) = delta.ratio {
        record.ratio = ratio;
    }
    if let Some(count) = delta.num_leechs {
        record.peers_connected = count;
    }
    if let Some(count) = delta.num_incomplete {
        record.peers_total = count;
    }
    if let Some(count) = delta.num_seeds {
        record.seeds_connected = count;
    }
    if let Some(count) = delta.num_complete {
        record.seeds_total = count;
    }
    if let Some(added) = delta.added_on {
        record.date_added = added;
    }
    if let Some(finished) = delta.completion_on {
        record.date_finished = finished;
    }
    if let Some(active) = delta.last_activity {
        record.date_active = active;
    }
    if let Some(private) = delta.private {
        record.is_private = private;
    }

    let bytes_done = bytes_done_from(record);
    record.bytes_done = bytes_done;
    let status = derive_status(cached);
    cached.record.status = status;
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn bytes_done_from(record: &TorrentRecord) -> u64 {
    ((record.size_bytes as f64) * record.percent_complete / 100.0).round() as u64
}

fn derive_status(cached: &CachedTorrent) -> Vec<TorrentStatus> {
    let record = &cached.record;
    let mut status = Vec::new();
    match cached.raw_state.as_str() {
        "downloading" | "metaDL" | "forcedDL" | "stalledDL" | "queuedDL" => {
            status.push(TorrentStatus::Downloading);
        }
        "uploading" | "forcedUP" | "stalledUP" | "queuedUP" => {
            status.push(TorrentStatus::Seeding);
        }
        "checkingDL" | "checkingUP" | "checkingResumeData" => {
            status.push(TorrentStatus::Checking);
        }
        "pausedDL" | "stoppedDL" | "pausedUP" | "stoppedUP" => {
            status.push(TorrentStatus::Stopped);
        }
        "error" | "missingFiles" => status.push(TorrentStatus::Error),
        other => {
            debug!(state = other, "unrecognized backend torrent state");
        }
    }
    if record.percent_complete >= 100.0 {
        status.push(TorrentStatus::Complete);
    }
    status.push(if record.down_rate > 0 || record.up_rate > 0 {
        TorrentStatus::Active
    } else {
        TorrentStatus::Inactive
    });
    status
}

const fn file_priority_code(priority: ContentPriority) -> i64 {
    match priority {
        ContentPriority::Skip => 0,
        ContentPriority::Normal => 1,
        ContentPriority::High => 6,
    }
}

fn joined(hashes: &[TorrentHash]) -> String {
    hashes.join("|")
}

#[async_trait]
impl ClientGateway for RestClient {
    async fn add_torrents_by_file(&self, options: AddTorrentByFileOptions) -> GatewayResult<()> {
        if options.files.is_empty() {
            return Err(GatewayError::validation("no metainfo files supplied"));
        }
        let mut decoded = Vec::with_capacity(options.files.len());
        for file in &options.files {
            decoded.push(BASE64.decode(file).map_err(|_| {
                GatewayError::validation("metainfo payload is not valid base64")
            })?);
        }

        let operation = "add_torrents_by_file";
        let url = self.api_url(operation, "torrents/add")?;
        self.ensure_auth(operation).await?;

        let mut form = reqwest::multipart::Form::new();
        for (index, bytes) in decoded.into_iter().enumerate() {
            let part = reqwest::multipart::Part::bytes(bytes)
                .file_name(format!("upload-{index}.torrent"))
                .mime_str("application/x-bittorrent")
                .map_err(|err| GatewayError::decode(operation, err.to_string()))?;
            form = form.part("torrents", part);
        }
        if let Some(destination) = &options.destination {
            form = form.text("savepath", destination.clone());
        }
        if !options.tags.is_empty() {
            form = form.text("tags", options.tags.join(","));
        }
        form = form.text("stopped", (!options.start_on_add).to_string());

        let response = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|err| GatewayError::connectivity(operation, err))?;
        if !response.status().is_success() {
            return Err(GatewayError::rejected(
                operation,
                format!("HTTP {}", response.status()),
            ));
        }
        Ok(())
    }

    async fn add_torrents_by_url(&self, options: AddTorrentByUrlOptions) -> GatewayResult<()> {
        if options.urls.is_empty() {
            return Err(GatewayError::validation("no torrent URLs supplied"));
        }
        let mut form = vec![
            ("urls", options.urls.join("\n")),
            ("stopped", (!options.start_on_add).to_string()),
        ];
        if let Some(destination) = options.destination {
            form.push(("savepath", destination));
        }
        if !options.tags.is_empty() {
            form.push(("tags", options.tags.join(",")));
        }
        if let Some(cookies) = options.cookies {
            form.push(("cookie", cookies));
        }
        self.post_form("add_torrents_by_url", "torrents/add", form).await
    }

    async fn remove_torrents(
        &self,
        hashes: Vec<TorrentHash>,
        delete_data: bool,
    ) -> GatewayResult<()> {
        require_hashes(&hashes)?;
        self.post_form(
            "remove_torrents",
            "torrents/delete",
            vec![
                ("hashes", joined(&hashes)),
                ("deleteFiles", delete_data.to_string()),
            ],
        )
        .await
    }

    async fn start_torrents(&self, hashes: Vec<TorrentHash>) -> GatewayResult<()> {
        require_hashes(&hashes)?;
        self.post_form(
            "start_torrents",
            "torrents/start",
            vec![("hashes", joined(&hashes))],
        )
        .await
    }

    async fn stop_torrents(&self, hashes: Vec<TorrentHash>) -> GatewayResult<()> {
        require_hashes(&hashes)?;
        self.post_form(
            "stop_torrents",
            "torrents/stop",
            vec![("hashes", joined(&hashes))],
        )
        .await
    }

    async fn move_torrents(&self, options: MoveTorrentsOptions) -> GatewayResult<()> {
        require_hashes(&options.hashes)?;
        if !options.move_files {
            // This backend always moves on-disk data with the registration.
            return Err(GatewayError::validation(
                "this backend cannot relocate a torrent without moving its data",
            ));
        }
        self.post_form(
            "move_torrents",
            "torrents/setLocation",
            vec![
                ("hashes", joined(&options.hashes)),
                ("location", options.destination.clone()),
            ],
        )
        .await?;
        if options.verify_hashes {
            self.post_form(
                "move_torrents",
                "torrents/recheck",
                vec![("hashes", joined(&options.hashes))],
            )
            .await?;
        }
        Ok(())
    }

    async fn check_torrents(&self, hashes: Vec<TorrentHash>) -> GatewayResult<()> {
        require_hashes(&hashes)?;
        self.post_form(
            "check_torrents",
            "torrents/recheck",
            vec![("hashes", joined(&hashes))],
        )
        .await
    }

    async fn set_torrents_priority(
        &self,
        hashes: Vec<TorrentHash>,
        priority: TransferPriority,
    ) -> GatewayResult<()> {
        require_hashes(&hashes)?;
        let path = match priority {
            TransferPriority::High => "torrents/topPrio",
            TransferPriority::Low | TransferPriority::Off => "torrents/bottomPrio",
            // The daemon only exposes queue extremes; normal is a no-op.
            TransferPriority::Normal => return Ok(()),
        };
        self.post_form(
            "set_torrents_priority",
            path,
            vec![("hashes", joined(&hashes))],
        )
        .await
    }

    async fn set_torrents_tags(
        &self,
        hashes: Vec<TorrentHash>,
        tags: Vec<String>,
    ) -> GatewayResult<()> {
        require_hashes(&hashes)?;
        self.post_form(
            "set_torrents_tags",
            "torrents/removeTags",
            vec![("hashes", joined(&hashes))],
        )
        .await?;
        if !tags.is_empty() {
            self.post_form(
                "set_torrents_tags",
                "torrents/addTags",
                vec![("hashes", joined(&hashes)), ("tags", tags.join(","))],
            )
            .await?;
        }
        Ok(())
    }

    async fn set_torrents_trackers(
        &self,
        hashes: Vec<TorrentHash>,
        trackers: Vec<String>,
    ) -> GatewayResult<()> {
        require_hashes(&hashes)?;
        if trackers.is_empty() {
            return Err(GatewayError::validation("no tracker URLs supplied"));
        }
        for hash in &hashes {
            self.post_form(
                "set_torrents_trackers",
                "torrents/addTrackers",
                vec![("hash", hash.clone()), ("urls", trackers.join("\n"))],
            )
            .await?;
        }
        Ok(())
    }

    async fn set_torrent_contents_priority(
        &self,
        hash: TorrentHash,
        indices: Vec<u32>,
        priority: ContentPriority,
    ) -> GatewayResult<()> {
        if indices.is_empty() {
            return Err(GatewayError::validation("no file indices supplied"));
        }
        let ids = indices
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join("|");
        self.post_form(
            "set_torrent_contents_priority",
            "torrents/filePrio",
            vec![
                ("hash", hash),
                ("id", ids),
                ("priority", file_priority_code(priority).to_string()),
            ],
        )
        .await
    }

    async fn get_torrent_contents(&self, hash: TorrentHash) -> GatewayResult<Vec<TorrentContent>> {
        let operation = "get_torrent_contents";
        let url = self.api_url(operation, "torrents/files")?;
        let response = self
            .request(operation, move |client| {
                client.get(url.clone()).query(&[("hash", hash.clone())])
            })
            .await?;
        let files: Vec<FileEntry> = response
            .json()
            .await
            .map_err(|err| GatewayError::decode(operation, err.to_string()))?;
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let contents = files
            .into_iter()
            .enumerate()
            .map(|(fallback_index, file)| TorrentContent {
                index: file
                    .index
                    .unwrap_or(u32::try_from(fallback_index).unwrap_or(u32::MAX)),
                bytes_done: ((file.size as f64) * file.progress).round() as u64,
                size_bytes: file.size,
                path: file.name,
                priority: match file.priority {
                    0 => ContentPriority::Skip,
                    6 | 7 => ContentPriority::High,
                    _ => ContentPriority::Normal,
                },
            })
            .collect();
        Ok(contents)
    }

    async fn get_torrent_peers(&self, hash: TorrentHash) -> GatewayResult<Vec<TorrentPeer>> {
        let operation = "get_torrent_peers";
        let url = self.api_url(operation, "sync/torrentPeers")?;
        let response = self
            .request(operation, move |client| {
                client
                    .get(url.clone())
                    .query(&[("hash", hash.clone()), ("rid", "0".to_owned())])
            })
            .await?;
        let list: PeerList = response
            .json()
            .await
            .map_err(|err| GatewayError::decode(operation, err.to_string()))?;
        let peers = list
            .peers
            .into_iter()
            .map(|(address, peer)| TorrentPeer {
                address,
                client: peer.client,
                down_rate: peer.dl_speed,
                up_rate: peer.up_speed,
                percent_complete: peer.progress * 100.0,
                is_encrypted: peer.flags.contains('E'),
                is_incoming: peer.flags.contains('I'),
            })
            .collect();
        Ok(peers)
    }

    async fn get_torrent_trackers(&self, hash: TorrentHash) -> GatewayResult<Vec<TorrentTracker>> {
        let operation = "get_torrent_trackers";
        let url = self.api_url(operation, "torrents/trackers")?;
        let response = self
            .request(operation, move |client| {
                client.get(url.clone()).query(&[("hash", hash.clone())])
            })
            .await?;
        let entries: Vec<TrackerEntry> = response
            .json()
            .await
            .map_err(|err| GatewayError::decode(operation, err.to_string()))?;
        let trackers = entries
            .into_iter()
            .map(|entry| TorrentTracker {
                kind: if entry.url.starts_with("**") {
                    TrackerKind::Dht
                } else if entry.url.starts_with("udp") {
                    TrackerKind::Udp
                } else {
                    TrackerKind::Http
                },
                is_enabled: entry.status != 0,
                url: entry.url,
            })
            .collect();
        Ok(trackers)
    }

    async fn fetch_torrent_list(&self) -> GatewayResult<TorrentListSnapshot> {
        let operation = "fetch_torrent_list";
        self.ensure_auth(operation).await?;
        let mut state = self.state.lock().await;

        let url = self.api_url(operation, "sync/maindata")?;
        let rid = state.rid.to_string();
        let mut response = self
            .http
            .get(url.clone())
            .query(&[("rid", rid.clone())])
            .send()
            .await
            .map_err(|err| GatewayError::connectivity(operation, err))?;
        if response.status() == StatusCode::FORBIDDEN {
            self.login(operation).await?;
            response = self
                .http
                .get(url)
                .query(&[("rid", rid)])
                .send()
                .await
                .map_err(|err| GatewayError::connectivity(operation, err))?;
        }
        if !response.status().is_success() {
            return Err(GatewayError::connectivity(
                operation,
                io::Error::other(format!("HTTP {}", response.status())),
            ));
        }
        let main: MainData = response
            .json()
            .await
            .map_err(|err| GatewayError::decode(operation, err.to_string()))?;

        if main.full_update {
            state.torrents.clear();
        }
        for hash in &main.torrents_removed {
            state.torrents.remove(hash);
        }
        for (hash, delta) in main.torrents {
            let cached = state.torrents.entry(hash.clone()).or_default();
            merge_delta(cached, &hash, delta);
        }
        state.rid = main.rid;

        Ok(TorrentListSnapshot {
            id: Utc::now().timestamp_millis(),
            torrents: state
                .torrents
                .iter()
                .map(|(hash, cached)| (hash.clone(), cached.record.clone()))
                .collect(),
        })
    }

    async fn fetch_transfer_summary(&self) -> GatewayResult<TransferSummary> {
        let operation = "fetch_transfer_summary";
        let url = self.api_url(operation, "transfer/info")?;
        let response = self
            .request(operation, move |client| client.get(url.clone()))
            .await?;
        let info: TransferInfo = response
            .json()
            .await
            .map_err(|err| GatewayError::decode(operation, err.to_string()))?;
        Ok(TransferSummary {
            down_rate: info.dl_info_speed,
            down_total: info.dl_info_data,
            down_throttle: info.dl_rate_limit.max(0).unsigned_abs(),
            up_rate: info.up_info_speed,
            up_total: info.up_info_data,
            up_throttle: info.up_rate_limit.max(0).unsigned_abs(),
        })
    }

    async fn get_client_settings(&self) -> GatewayResult<ClientSettings> {
        let operation = "get_client_settings";
        let url = self.api_url(operation, "app/preferences")?;
        let response = self
            .request(operation, move |client| client.get(url.clone()))
            .await?;
        let prefs: Preferences = response
            .json()
            .await
            .map_err(|err| GatewayError::decode(operation, err.to_string()))?;
        Ok(ClientSettings {
            download_dir: prefs.save_path,
            down_throttle: prefs.dl_limit.max(0).unsigned_abs(),
            up_throttle: prefs.up_limit.max(0).unsigned_abs(),
            peer_limit_global: u32::try_from(prefs.max_connec.max(0)).unwrap_or(u32::MAX),
            peer_limit_per_torrent: u32::try_from(prefs.max_connec_per_torrent.max(0))
                .unwrap_or(u32::MAX),
        })
    }

    async fn set_client_settings(&self, patch: ClientSettingsPatch) -> GatewayResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let mut prefs = serde_json::Map::new();
        if let Some(dir) = patch.download_dir {
            prefs.insert("save_path".to_owned(), dir.into());
        }
        if let Some(throttle) = patch.down_throttle {
            prefs.insert("dl_limit".to_owned(), throttle.into());
        }
        if let Some(throttle) = patch.up_throttle {
            prefs.insert("up_limit".to_owned(), throttle.into());
        }
        if let Some(limit) = patch.peer_limit_global {
            prefs.insert("max_connec".to_owned(), limit.into());
        }
        if let Some(limit) = patch.peer_limit_per_torrent {
            prefs.insert("max_connec_per_torrent".to_owned(), limit.into());
        }
        let body = serde_json::Value::Object(prefs).to_string();
        self.post_form(
            "set_client_settings",
            "app/setPreferences",
            vec![("json", body)],
        )
        .await
    }

    async fn test_gateway(&self) -> GatewayResult<()> {
        let operation = "test_gateway";
        let url = self.api_url(operation, "app/version")?;
        self.request(operation, move |client| client.get(url.clone()))
            .await
            .map(|_| ())
    }
}
