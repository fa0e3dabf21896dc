//! Adapter for the multicall-style RPC daemon.
//!
//! The daemon exposes per-torrent property getters; the adapter batches every
//! getter for every torrent into one composite call per poll, then runs
//! per-property transforms to turn the daemon's string/number encodings into
//! typed domain values.

use std::collections::BTreeMap;
use std::io;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use floodgate_gateway::error::{GatewayError, GatewayResult};
use floodgate_gateway::model::{
    AddTorrentByFileOptions, AddTorrentByUrlOptions, ClientSettings, ClientSettingsPatch,
    ContentPriority, MoveTorrentsOptions, TorrentContent, TorrentHash, TorrentListSnapshot,
    TorrentPeer, TorrentRecord, TorrentStatus, TorrentTracker, TrackerKind, TransferPriority,
    TransferSummary,
};
use floodgate_gateway::rates::{RateComputer, eta};
use floodgate_gateway::service::{ClientGateway, require_hashes};

use crate::tracker::extract_tracker_domains;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Property getters batched into the composite torrent-list call, in column
/// order.
const TORRENT_GETTERS: &[&str] = &[
    "d.hash=",
    "d.name=",
    "d.size_bytes=",
    "d.completed_bytes=",
    "d.up.total=",
    "d.down.total=",
    "d.ratio=",
    "d.is_open=",
    "d.is_active=",
    "d.complete=",
    "d.hashing=",
    "d.is_private=",
    "d.message=",
    "d.directory=",
    "d.custom1=",
    "d.timestamp.started=",
    "d.creation_date=",
    "d.timestamp.finished=",
    "d.last_active=",
    "d.peers_accounted=",
    "d.peers_complete=",
    "t.multicall=,t.url=",
];

const COL_HASH: usize = 0;
const COL_NAME: usize = 1;
const COL_SIZE: usize = 2;
const COL_DONE: usize = 3;
const COL_UP_TOTAL: usize = 4;
const COL_DOWN_TOTAL: usize = 5;
const COL_RATIO: usize = 6;
const COL_IS_OPEN: usize = 7;
const COL_IS_ACTIVE: usize = 8;
const COL_COMPLETE: usize = 9;
const COL_HASHING: usize = 10;
const COL_IS_PRIVATE: usize = 11;
const COL_MESSAGE: usize = 12;
const COL_DIRECTORY: usize = 13;
const COL_TAGS: usize = 14;
const COL_DATE_ADDED: usize = 15;
const COL_DATE_CREATED: usize = 16;
const COL_DATE_FINISHED: usize = 17;
const COL_DATE_ACTIVE: usize = 18;
const COL_PEERS: usize = 19;
const COL_SEEDS: usize = 20;
const COL_TRACKERS: usize = 21;

/// Client for the multicall-style daemon, speaking JSON-RPC over HTTP.
pub struct MulticallClient {
    http: Client,
    endpoint: Url,
    auth: Option<(String, String)>,
    rates: Mutex<RateComputer>,
}

impl MulticallClient {
    /// Construct a client for the given endpoint and optional basic auth.
    pub fn new(
        url: &str,
        username: Option<String>,
        password: Option<String>,
    ) -> GatewayResult<Self> {
        let endpoint = Url::parse(url)
            .map_err(|err| GatewayError::validation(format!("invalid multicall endpoint: {err}")))?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| GatewayError::connectivity("client_init", err))?;
        Ok(Self {
            http,
            endpoint,
            auth: username.map(|user| (user, password.unwrap_or_default())),
            rates: Mutex::new(RateComputer::new()),
        })
    }

    async fn call(
        &self,
        operation: &'static str,
        method: &str,
        params: Value,
    ) -> GatewayResult<Value> {
        let body = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
        let mut request = self.http.post(self.endpoint.clone()).json(&body);
        if let Some((user, pass)) = &self.auth {
            request = request.basic_auth(user, Some(pass));
        }
        let response = request
            .send()
            .await
            .map_err(|err| GatewayError::connectivity(operation, err))?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(GatewayError::connectivity(
                operation,
                io::Error::other(format!("HTTP {status}")),
            ));
        }
        let payload: Value = response
            .json()
            .await
            .map_err(|err| GatewayError::decode(operation, err.to_string()))?;
        if let Some(error) = payload.get("error").filter(|value| !value.is_null()) {
            return Err(GatewayError::rejected(operation, error.to_string()));
        }
        payload
            .get("result")
            .cloned()
            .ok_or_else(|| GatewayError::decode(operation, "response missing result"))
    }

    /// Batch several method calls into one composite round trip.
    async fn multicall(
        &self,
        operation: &'static str,
        calls: Vec<(String, Value)>,
    ) -> GatewayResult<Value> {
        debug!(operation, batched = calls.len(), "issuing composite call");
        let batch: Vec<Value> = calls
            .into_iter()
            .map(|(method, params)| json!({ "methodName": method, "params": params }))
            .collect();
        self.call(operation, "system.multicall", json!([batch])).await
    }

    /// One setter call per hash, batched into a single round trip.
    async fn per_hash(
        &self,
        operation: &'static str,
        hashes: &[TorrentHash],
        methods: &[&str],
    ) -> GatewayResult<()> {
        require_hashes(hashes)?;
        let mut calls = Vec::with_capacity(hashes.len() * methods.len());
        for hash in hashes {
            for method in methods {
                calls.push(((*method).to_owned(), json!([hash])));
            }
        }
        self.multicall(operation, calls).await.map(|_| ())
    }
}

fn string_at(row: &[Value], index: usize) -> String {
    match row.get(index) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number.to_string(),
        _ => String::new(),
    }
}

fn int_at(row: &[Value], index: usize) -> i64 {
    match row.get(index) {
        Some(Value::Number(number)) => number.as_i64().unwrap_or(0),
        Some(Value::String(text)) => text.parse().unwrap_or(0),
        _ => 0,
    }
}

fn uint_at(row: &[Value], index: usize) -> u64 {
    int_at(row, index).max(0).unsigned_abs()
}

fn bool_at(row: &[Value], index: usize) -> bool {
    int_at(row, index) != 0
}

fn tracker_urls_at(row: &[Value], index: usize) -> Vec<String> {
    let Some(Value::Array(entries)) = row.get(index) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::Array(fields) => fields.first().and_then(Value::as_str).map(str::to_owned),
            Value::String(text) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

fn parse_torrent_row(
    row: &[Value],
    rates: &mut RateComputer,
    now_ms: i64,
) -> GatewayResult<TorrentRecord> {
    let hash = string_at(row, COL_HASH);
    if hash.is_empty() {
        return Err(GatewayError::decode(
            "fetch_torrent_list",
            "row missing hash column",
        ));
    }

    let size_bytes = uint_at(row, COL_SIZE);
    let bytes_done = uint_at(row, COL_DONE);
    let up_total = uint_at(row, COL_UP_TOTAL);
    let down_total = uint_at(row, COL_DOWN_TOTAL);
    let is_open = bool_at(row, COL_IS_OPEN);
    let is_active = bool_at(row, COL_IS_ACTIVE);
    let is_complete = bool_at(row, COL_COMPLETE);
    let is_hashing = bool_at(row, COL_HASHING);
    let message = string_at(row, COL_MESSAGE);

    let down_rate = rates.sample(&format!("down:{hash}"), now_ms, down_total);
    let up_rate = rates.sample(&format!("up:{hash}"), now_ms, up_total);

    let mut status = Vec::new();
    if is_hashing {
        status.push(TorrentStatus::Checking);
    } else if !is_open {
        status.push(TorrentStatus::Stopped);
    } else if is_complete {
        status.push(TorrentStatus::Seeding);
    } else {
        status.push(TorrentStatus::Downloading);
    }
    if is_complete {
        status.push(TorrentStatus::Complete);
    }
    status.push(if is_active {
        TorrentStatus::Active
    } else {
        TorrentStatus::Inactive
    });
    if !message.is_empty() {
        status.push(TorrentStatus::Error);
    }

    let tags: Vec<String> = string_at(row, COL_TAGS)
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_owned)
        .collect();
    let tracker_urls = tracker_urls_at(row, COL_TRACKERS);
    let tracker_domains =
        extract_tracker_domains(tracker_urls.iter().map(String::as_str));

    #[allow(clippy::cast_precision_loss)]
    let percent_complete = if size_bytes == 0 {
        if is_complete { 100.0 } else { 0.0 }
    } else {
        (bytes_done as f64 / size_bytes as f64) * 100.0
    };

    // The daemon reports ratio scaled by a thousand.
    #[allow(clippy::cast_precision_loss)]
    let ratio = int_at(row, COL_RATIO) as f64 / 1_000.0;

    Ok(TorrentRecord {
        hash,
        name: string_at(row, COL_NAME),
        size_bytes,
        bytes_done,
        percent_complete,
        up_total,
        down_total,
        up_rate,
        down_rate,
        eta: eta(size_bytes.saturating_sub(bytes_done), down_rate),
        ratio,
        status,
        tags,
        tracker_domains,
        directory: string_at(row, COL_DIRECTORY),
        is_private: bool_at(row, COL_IS_PRIVATE),
        peers_connected: u32::try_from(uint_at(row, COL_PEERS)).unwrap_or(u32::MAX),
        peers_total: u32::try_from(uint_at(row, COL_PEERS)).unwrap_or(u32::MAX),
        seeds_connected: u32::try_from(uint_at(row, COL_SEEDS)).unwrap_or(u32::MAX),
        seeds_total: u32::try_from(uint_at(row, COL_SEEDS)).unwrap_or(u32::MAX),
        date_added: int_at(row, COL_DATE_ADDED),
        date_created: int_at(row, COL_DATE_CREATED),
        date_finished: int_at(row, COL_DATE_FINISHED),
        date_active: int_at(row, COL_DATE_ACTIVE),
        message,
    })
}

fn multicall_int(result: &Value, index: usize) -> i64 {
    let entry = &result[index];
    let value = entry.get(0).unwrap_or(entry);
    match value {
        Value::Number(number) => number.as_i64().unwrap_or(0),
        Value::String(text) => text.parse().unwrap_or(0),
        _ => 0,
    }
}

fn multicall_uint(result: &Value, index: usize) -> u64 {
    multicall_int(result, index).max(0).unsigned_abs()
}

fn multicall_string(result: &Value, index: usize) -> String {
    let entry = &result[index];
    let value = entry.get(0).unwrap_or(entry);
    value.as_str().map(str::to_owned).unwrap_or_default()
}

const fn priority_level(priority: TransferPriority) -> i64 {
    match priority {
        TransferPriority::Off => 0,
        TransferPriority::Low => 1,
        TransferPriority::Normal => 2,
        TransferPriority::High => 3,
    }
}

const fn content_priority_level(priority: ContentPriority) -> i64 {
    match priority {
        ContentPriority::Skip => 0,
        ContentPriority::Normal => 1,
        ContentPriority::High => 2,
    }
}

fn tracker_kind(url: &str) -> TrackerKind {
    if url.starts_with("udp") {
        TrackerKind::Udp
    } else if url.starts_with("dht") {
        TrackerKind::Dht
    } else {
        TrackerKind::Http
    }
}

#[async_trait]
impl ClientGateway for MulticallClient {
    async fn add_torrents_by_file(&self, options: AddTorrentByFileOptions) -> GatewayResult<()> {
        if options.files.is_empty() {
            return Err(GatewayError::validation("no metainfo files supplied"));
        }
        for file in &options.files {
            if BASE64.decode(file).is_err() {
                return Err(GatewayError::validation("metainfo payload is not valid base64"));
            }
        }
        let method = if options.start_on_add {
            "load.raw_start"
        } else {
            "load.raw"
        };
        let setters = load_setters(options.destination.as_deref(), &options.tags);
        let calls = options
            .files
            .iter()
            .map(|file| {
                let mut params = vec![json!(""), json!(file)];
                params.extend(setters.iter().map(|setter| json!(setter)));
                (method.to_owned(), Value::Array(params))
            })
            .collect();
        self.multicall("add_torrents_by_file", calls).await.map(|_| ())
    }

    async fn add_torrents_by_url(&self, options: AddTorrentByUrlOptions) -> GatewayResult<()> {
        if options.urls.is_empty() {
            return Err(GatewayError::validation("no torrent URLs supplied"));
        }
        let method = if options.start_on_add {
            "load.start"
        } else {
            "load.normal"
        };
        let setters = load_setters(options.destination.as_deref(), &options.tags);
        let calls = options
            .urls
            .iter()
            .map(|url| {
                let mut params = vec![json!(""), json!(url)];
                params.extend(setters.iter().map(|setter| json!(setter)));
                (method.to_owned(), Value::Array(params))
            })
            .collect();
        self.multicall("add_torrents_by_url", calls).await.map(|_| ())
    }

    async fn remove_torrents(
        &self,
        hashes: Vec<TorrentHash>,
        delete_data: bool,
    ) -> GatewayResult<()> {
        let methods: &[&str] = if delete_data {
            &["d.delete_tied", "d.erase"]
        } else {
            &["d.erase"]
        };
        self.per_hash("remove_torrents", &hashes, methods).await
    }

    async fn start_torrents(&self, hashes: Vec<TorrentHash>) -> GatewayResult<()> {
        self.per_hash("start_torrents", &hashes, &["d.open", "d.start"])
            .await
    }

    async fn stop_torrents(&self, hashes: Vec<TorrentHash>) -> GatewayResult<()> {
        self.per_hash("stop_torrents", &hashes, &["d.stop", "d.close"])
            .await
    }

    async fn move_torrents(&self, options: MoveTorrentsOptions) -> GatewayResult<()> {
        require_hashes(&options.hashes)?;
        if options.move_files {
            return Err(GatewayError::Unsupported {
                operation: "move_torrents",
            });
        }
        let mut calls = Vec::new();
        for hash in &options.hashes {
            calls.push((
                "d.directory.set".to_owned(),
                json!([hash, options.destination]),
            ));
            if options.verify_hashes {
                calls.push(("d.check_hash".to_owned(), json!([hash])));
            }
        }
        self.multicall("move_torrents", calls).await.map(|_| ())
    }

    async fn check_torrents(&self, hashes: Vec<TorrentHash>) -> GatewayResult<()> {
        self.per_hash("check_torrents", &hashes, &["d.check_hash"]).await
    }

    async fn set_torrents_priority(
        &self,
        hashes: Vec<TorrentHash>,
        priority: TransferPriority,
    ) -> GatewayResult<()> {
        require_hashes(&hashes)?;
        let level = priority_level(priority);
        let calls = hashes
            .iter()
            .map(|hash| ("d.priority.set".to_owned(), json!([hash, level])))
            .collect();
        self.multicall("set_torrents_priority", calls).await.map(|_| ())
    }

    async fn set_torrents_tags(
        &self,
        hashes: Vec<TorrentHash>,
        tags: Vec<String>,
    ) -> GatewayResult<()> {
        require_hashes(&hashes)?;
        let joined = tags.join(",");
        let calls = hashes
            .iter()
            .map(|hash| ("d.custom1.set".to_owned(), json!([hash, joined])))
            .collect();
        self.multicall("set_torrents_tags", calls).await.map(|_| ())
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
        let level = content_priority_level(priority);
        let mut calls: Vec<(String, Value)> = indices
            .iter()
            .map(|index| {
                (
                    "f.priority.set".to_owned(),
                    json!([format!("{hash}:f{index}"), level]),
                )
            })
            .collect();
        calls.push(("d.update_priorities".to_owned(), json!([hash])));
        self.multicall("set_torrent_contents_priority", calls)
            .await
            .map(|_| ())
    }

    async fn get_torrent_contents(&self, hash: TorrentHash) -> GatewayResult<Vec<TorrentContent>> {
        let result = self
            .call(
                "get_torrent_contents",
                "f.multicall",
                json!([
                    hash,
                    "",
                    "f.path=",
                    "f.size_bytes=",
                    "f.completed_chunks=",
                    "f.size_chunks=",
                    "f.priority="
                ]),
            )
            .await?;
        let rows = result.as_array().ok_or_else(|| {
            GatewayError::decode("get_torrent_contents", "expected an array of file rows")
        })?;
        let contents = rows
            .iter()
            .enumerate()
            .filter_map(|(index, row)| {
                let row = row.as_array()?;
                let size_bytes = uint_at(row, 1);
                let completed_chunks = uint_at(row, 2);
                let size_chunks = uint_at(row, 3).max(1);
                Some(TorrentContent {
                    index: u32::try_from(index).unwrap_or(u32::MAX),
                    path: string_at(row, 0),
                    size_bytes,
                    bytes_done: size_bytes * completed_chunks / size_chunks,
                    priority: match int_at(row, 4) {
                        0 => ContentPriority::Skip,
                        2 => ContentPriority::High,
                        _ => ContentPriority::Normal,
                    },
                })
            })
            .collect();
        Ok(contents)
    }

    async fn get_torrent_peers(&self, hash: TorrentHash) -> GatewayResult<Vec<TorrentPeer>> {
        let result = self
            .call(
                "get_torrent_peers",
                "p.multicall",
                json!([
                    hash,
                    "",
                    "p.address=",
                    "p.port=",
                    "p.client_version=",
                    "p.down_rate=",
                    "p.up_rate=",
                    "p.completed_percent=",
                    "p.is_encrypted=",
                    "p.is_incoming="
                ]),
            )
            .await?;
        let rows = result.as_array().ok_or_else(|| {
            GatewayError::decode("get_torrent_peers", "expected an array of peer rows")
        })?;
        let peers = rows
            .iter()
            .filter_map(|row| {
                let row = row.as_array()?;
                #[allow(clippy::cast_precision_loss)]
                let percent_complete = int_at(row, 5) as f64;
                Some(TorrentPeer {
                    address: format!("{}:{}", string_at(row, 0), uint_at(row, 1)),
                    client: string_at(row, 2),
                    down_rate: uint_at(row, 3),
                    up_rate: uint_at(row, 4),
                    percent_complete,
                    is_encrypted: bool_at(row, 6),
                    is_incoming: bool_at(row, 7),
                })
            })
            .collect();
        Ok(peers)
    }

    async fn get_torrent_trackers(&self, hash: TorrentHash) -> GatewayResult<Vec<TorrentTracker>> {
        let result = self
            .call(
                "get_torrent_trackers",
                "t.multicall",
                json!([hash, "", "t.url=", "t.is_enabled="]),
            )
            .await?;
        let rows = result.as_array().ok_or_else(|| {
            GatewayError::decode("get_torrent_trackers", "expected an array of tracker rows")
        })?;
        let trackers = rows
            .iter()
            .filter_map(|row| {
                let row = row.as_array()?;
                let url = string_at(row, 0);
                Some(TorrentTracker {
                    kind: tracker_kind(&url),
                    is_enabled: bool_at(row, 1),
                    url,
                })
            })
            .collect();
        Ok(trackers)
    }

    async fn fetch_torrent_list(&self) -> GatewayResult<TorrentListSnapshot> {
        let mut params = vec![json!(""), json!("main")];
        params.extend(TORRENT_GETTERS.iter().map(|getter| json!(getter)));
        let result = self
            .call("fetch_torrent_list", "d.multicall2", Value::Array(params))
            .await?;
        let rows = result.as_array().ok_or_else(|| {
            GatewayError::decode("fetch_torrent_list", "expected an array of torrent rows")
        })?;

        let now_ms = Utc::now().timestamp_millis();
        let mut torrents = BTreeMap::new();
        let mut rates = self.rates.lock().expect("rate state mutex poisoned");
        for row in rows {
            let row = row.as_array().ok_or_else(|| {
                GatewayError::decode("fetch_torrent_list", "torrent row is not an array")
            })?;
            let record = parse_torrent_row(row, &mut rates, now_ms)?;
            torrents.insert(record.hash.clone(), record);
        }
        Ok(TorrentListSnapshot {
            id: now_ms,
            torrents,
        })
    }

    async fn fetch_transfer_summary(&self) -> GatewayResult<TransferSummary> {
        let result = self
            .multicall(
                "fetch_transfer_summary",
                vec![
                    ("throttle.global_down.total".to_owned(), json!([])),
                    ("throttle.global_up.total".to_owned(), json!([])),
                    ("throttle.global_down.max_rate".to_owned(), json!([])),
                    ("throttle.global_up.max_rate".to_owned(), json!([])),
                ],
            )
            .await?;
        let down_total = multicall_uint(&result, 0);
        let up_total = multicall_uint(&result, 1);
        let now_ms = Utc::now().timestamp_millis();
        let mut rates = self.rates.lock().expect("rate state mutex poisoned");
        Ok(TransferSummary {
            down_rate: rates.sample("global:down", now_ms, down_total),
            down_total,
            down_throttle: multicall_uint(&result, 2),
            up_rate: rates.sample("global:up", now_ms, up_total),
            up_total,
            up_throttle: multicall_uint(&result, 3),
        })
    }

    async fn get_client_settings(&self) -> GatewayResult<ClientSettings> {
        let result = self
            .multicall(
                "get_client_settings",
                vec![
                    ("directory.default".to_owned(), json!([])),
                    ("throttle.global_down.max_rate".to_owned(), json!([])),
                    ("throttle.global_up.max_rate".to_owned(), json!([])),
                    ("network.max_open_sockets".to_owned(), json!([])),
                    ("throttle.max_peers.normal".to_owned(), json!([])),
                ],
            )
            .await?;
        Ok(ClientSettings {
            download_dir: multicall_string(&result, 0),
            down_throttle: multicall_uint(&result, 1),
            up_throttle: multicall_uint(&result, 2),
            peer_limit_global: u32::try_from(multicall_uint(&result, 3)).unwrap_or(u32::MAX),
            peer_limit_per_torrent: u32::try_from(multicall_uint(&result, 4)).unwrap_or(u32::MAX),
        })
    }

    async fn set_client_settings(&self, patch: ClientSettingsPatch) -> GatewayResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let mut calls = Vec::new();
        if let Some(dir) = &patch.download_dir {
            calls.push(("directory.default.set".to_owned(), json!(["", dir])));
        }
        if let Some(throttle) = patch.down_throttle {
            calls.push((
                "throttle.global_down.max_rate.set".to_owned(),
                json!(["", throttle]),
            ));
        }
        if let Some(throttle) = patch.up_throttle {
            calls.push((
                "throttle.global_up.max_rate.set".to_owned(),
                json!(["", throttle]),
            ));
        }
        if let Some(limit) = patch.peer_limit_global {
            calls.push(("network.max_open_sockets.set".to_owned(), json!(["", limit])));
        }
        if let Some(limit) = patch.peer_limit_per_torrent {
            calls.push(("throttle.max_peers.normal.set".to_owned(), json!(["", limit])));
        }
        self.multicall("set_client_settings", calls).await.map(|_| ())
    }

    async fn test_gateway(&self) -> GatewayResult<()> {
        self.call("test_gateway", "system.client_version", json!([]))
            .await
            .map(|_| ())
    }
}

fn load_setters(destination: Option<&str>, tags: &[String]) -> Vec<String> {
    let mut setters = Vec::new();
    if let Some(destination) = destination {
        setters.push(format!("d.directory.set=\"{destination}\""));
    }
    if !tags.is_empty() {
        setters.push(format!("d.custom1.set={}", tags.join(",")));
    }
    setters
}

#[cfg(test)]
mod tests {
    use super::*;
    use floodgate_gateway::model::Eta;
    use httpmock::prelude::*;

    fn sample_row(hash: &str, down_total: u64) -> Value {
        json!([
            hash,
            "distro.iso",
            "733468672",
            366734336_u64,
            "1024",
            down_total,
            "1500",
            1,
            1,
            0,
            0,
            "1",
            "",
            "/data/downloads",
            "linux,iso",
            1_700_000_000_i64,
            1_699_000_000_i64,
            0,
            1_700_000_500_i64,
            4,
            2,
            [["http://tracker.example.co.uk/ann"], ["http://tracker2.example.co.uk/ann"]]
        ])
    }

    #[test]
    fn row_transforms_produce_typed_values() {
        let mut rates = RateComputer::new();
        let row = sample_row("abc123", 100);
        let record =
            parse_torrent_row(row.as_array().expect("array"), &mut rates, 0).expect("parses");

        assert_eq!(record.hash, "abc123");
        assert_eq!(record.name, "distro.iso");
        assert_eq!(record.size_bytes, 733_468_672);
        assert_eq!(record.bytes_done, 366_734_336);
        assert!((record.percent_complete - 50.0).abs() < 0.01);
        assert!((record.ratio - 1.5).abs() < f64::EPSILON);
        assert!(record.is_private);
        assert_eq!(record.tags, vec!["linux", "iso"]);
        assert_eq!(record.tracker_domains, vec!["example.co.uk"]);
        assert_eq!(record.status, vec![
            TorrentStatus::Downloading,
            TorrentStatus::Active
        ]);
        // First observation of the counters yields zero rates.
        assert_eq!(record.down_rate, 0);
        assert_eq!(record.eta, Eta::Infinite);
    }

    #[test]
    fn repeated_rows_derive_moving_rates() {
        let mut rates = RateComputer::new();
        let row = sample_row("abc123", 0);
        parse_torrent_row(row.as_array().expect("array"), &mut rates, 0).expect("parses");

        let row = sample_row("abc123", 250_000);
        let record =
            parse_torrent_row(row.as_array().expect("array"), &mut rates, 1_000).expect("parses");
        assert_eq!(record.down_rate, 250_000);
        assert_eq!(
            record.eta,
            Eta::Seconds((733_468_672 - 366_734_336) / 250_000)
        );
    }

    #[test]
    fn missing_hash_column_is_a_decode_error() {
        let mut rates = RateComputer::new();
        let row = json!([""]);
        let result = parse_torrent_row(row.as_array().expect("array"), &mut rates, 0);
        assert!(matches!(result, Err(GatewayError::Decode { .. })));
    }

    #[tokio::test]
    async fn fetch_torrent_list_issues_one_composite_call() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/rpc")
                    .json_body_includes(r#"{ "method": "d.multicall2" }"#);
                then.status(200).json_body(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "result": [sample_row("abc123", 100)]
                }));
            })
            .await;

        let client =
            MulticallClient::new(&server.url("/rpc"), None, None).expect("client builds");
        let snapshot = client.fetch_torrent_list().await.expect("list fetches");

        mock.assert_async().await;
        assert_eq!(snapshot.torrents.len(), 1);
        assert!(snapshot.torrents.contains_key("abc123"));
    }

    #[tokio::test]
    async fn rpc_error_payloads_are_rejections() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/rpc");
                then.status(200).json_body(json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": { "code": -501, "message": "unknown method" }
                }));
            })
            .await;

        let client =
            MulticallClient::new(&server.url("/rpc"), None, None).expect("client builds");
        let result = client.test_gateway().await;
        assert!(matches!(result, Err(GatewayError::Rejected { .. })));
    }

    #[tokio::test]
    async fn unreachable_daemon_is_a_connectivity_error() {
        let client =
            MulticallClient::new("http://127.0.0.1:1/rpc", None, None).expect("client builds");
        let result = client.test_gateway().await;
        assert!(matches!(result, Err(GatewayError::Connectivity { .. })));
    }

    #[test]
    fn empty_batches_are_rejected_before_any_network_call() {
        let client =
            MulticallClient::new("http://127.0.0.1:1/rpc", None, None).expect("client builds");
        let result = futures_util::future::FutureExt::now_or_never(
            client.start_torrents(Vec::new()),
        )
        .expect("validation is synchronous");
        assert!(matches!(result, Err(GatewayError::Validation { .. })));
    }
}
