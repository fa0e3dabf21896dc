//! Adapter for the binary-RPC daemon.
//!
//! Every request and response runs through the wire codec; frames are
//! `[version][u32 length][deflated body]` on one TCP connection. The daemon
//! is stateful and single-channel, so requests are serialized behind an
//! async mutex: a second caller waits for the first response (or timeout)
//! before its request is written.

use std::collections::BTreeMap;
use std::io::{self, Read as _};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use flate2::Compression;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

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
use floodgate_wire::{WireKey, WireValue, decode, encode};

const PROTOCOL_VERSION: u8 = 0x01;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound on one frame; guards against a corrupt length header.
const MAX_FRAME_LEN: u32 = 1 << 26;

const RPC_RESPONSE: i64 = 1;
const RPC_ERROR: i64 = 2;
const RPC_EVENT: i64 = 3;

/// Status fields requested for every torrent on each poll.
const STATUS_FIELDS: &[&str] = &[
    "name",
    "total_size",
    "total_done",
    "progress",
    "ratio",
    "total_uploaded",
    "all_time_download",
    "state",
    "label",
    "trackers",
    "save_path",
    "private",
    "message",
    "num_peers",
    "total_peers",
    "num_seeds",
    "total_seeds",
    "time_added",
    "completed_time",
];

/// Client for the binary-RPC daemon.
pub struct BinRpcClient {
    host: String,
    port: u16,
    username: String,
    password: String,
    /// The in-flight gate: one outstanding request per channel.
    channel: Mutex<Channel>,
    rates: StdMutex<RateComputer>,
}

struct Channel {
    stream: Option<TcpStream>,
    next_request_id: i64,
}

impl Channel {
    fn next_id(&mut self) -> i64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }
}

/// Decoded response classification.
enum RpcMessage {
    Event,
    Response { request_id: i64, result: WireValue },
    Error { request_id: i64, message: String },
}

fn classify_message(operation: &'static str, value: &WireValue) -> GatewayResult<RpcMessage> {
    let fields = value
        .as_list()
        .ok_or_else(|| GatewayError::decode(operation, "message is not a list"))?;
    let kind = fields
        .first()
        .and_then(WireValue::as_int)
        .ok_or_else(|| GatewayError::decode(operation, "message missing type field"))?;
    match kind {
        RPC_EVENT => Ok(RpcMessage::Event),
        RPC_RESPONSE => {
            let request_id = fields
                .get(1)
                .and_then(WireValue::as_int)
                .ok_or_else(|| GatewayError::decode(operation, "response missing request id"))?;
            let result = fields.get(2).cloned().unwrap_or(WireValue::Null);
            Ok(RpcMessage::Response { request_id, result })
        }
        RPC_ERROR => {
            let request_id = fields
                .get(1)
                .and_then(WireValue::as_int)
                .ok_or_else(|| GatewayError::decode(operation, "error missing request id"))?;
            let message = fields
                .get(3)
                .or_else(|| fields.get(2))
                .and_then(WireValue::as_str)
                .unwrap_or("backend error")
                .to_owned();
            Ok(RpcMessage::Error { request_id, message })
        }
        other => Err(GatewayError::decode(
            operation,
            format!("unknown message type {other}"),
        )),
    }
}

fn deflate(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = flate2::read::ZlibEncoder::new(bytes, Compression::default());
    let mut out = Vec::new();
    encoder.read_to_end(&mut out)?;
    Ok(out)
}

fn inflate(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = flate2::read::ZlibDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

fn timed_out(operation: &'static str) -> GatewayError {
    GatewayError::connectivity(
        operation,
        io::Error::new(io::ErrorKind::TimedOut, "response timed out"),
    )
}

async fn write_frame(
    stream: &mut TcpStream,
    operation: &'static str,
    body: &WireValue,
) -> GatewayResult<()> {
    let compressed = deflate(&encode(body))
        .map_err(|err| GatewayError::decode(operation, err.to_string()))?;
    let mut frame = Vec::with_capacity(compressed.len() + 5);
    frame.push(PROTOCOL_VERSION);
    #[allow(clippy::cast_possible_truncation)]
    frame.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
    frame.extend_from_slice(&compressed);
    match timeout(RESPONSE_TIMEOUT, stream.write_all(&frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(GatewayError::connectivity(operation, err)),
        Err(_) => Err(timed_out(operation)),
    }
}

async fn read_frame(stream: &mut TcpStream, operation: &'static str) -> GatewayResult<WireValue> {
    let mut header = [0u8; 5];
    match timeout(RESPONSE_TIMEOUT, stream.read_exact(&mut header)).await {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => return Err(GatewayError::connectivity(operation, err)),
        Err(_) => return Err(timed_out(operation)),
    }
    if header[0] != PROTOCOL_VERSION {
        return Err(GatewayError::decode(
            operation,
            format!("unexpected protocol version {}", header[0]),
        ));
    }
    let len = u32::from_be_bytes(header[1..5].try_into().expect("length checked"));
    if len > MAX_FRAME_LEN {
        return Err(GatewayError::decode(
            operation,
            format!("frame length {len} exceeds limit"),
        ));
    }
    let mut payload = vec![0u8; len as usize];
    match timeout(RESPONSE_TIMEOUT, stream.read_exact(&mut payload)).await {
        Ok(Ok(_)) => {}
        Ok(Err(err)) => return Err(GatewayError::connectivity(operation, err)),
        Err(_) => return Err(timed_out(operation)),
    }
    let inflated =
        inflate(&payload).map_err(|err| GatewayError::decode(operation, err.to_string()))?;
    decode(&inflated).map_err(|err| GatewayError::decode(operation, err.to_string()))
}

/// Send one request and wait for its matching response, skipping pushed
/// events and stale replies.
async fn exchange(
    stream: &mut TcpStream,
    operation: &'static str,
    request_id: i64,
    method: &str,
    args: Vec<WireValue>,
    kwargs: Vec<(WireKey, WireValue)>,
) -> GatewayResult<WireValue> {
    let body = WireValue::List(vec![WireValue::List(vec![
        WireValue::Int(request_id),
        WireValue::str(method),
        WireValue::List(args),
        WireValue::Dict(kwargs),
    ])]);
    write_frame(stream, operation, &body).await?;

    loop {
        let message = read_frame(stream, operation).await?;
        match classify_message(operation, &message)? {
            RpcMessage::Event => {}
            RpcMessage::Response {
                request_id: id,
                result,
            } if id == request_id => return Ok(result),
            RpcMessage::Error {
                request_id: id,
                message,
            } if id == request_id => return Err(GatewayError::rejected(operation, message)),
            // Replies for requests that already timed out on this channel.
            RpcMessage::Response { request_id: id, .. }
            | RpcMessage::Error { request_id: id, .. } => {
                debug!(operation, stale_id = id, "discarding stale reply");
            }
        }
    }
}

impl BinRpcClient {
    /// Construct a client for the given daemon address and credentials.
    #[must_use]
    pub fn new(host: String, port: u16, username: String, password: String) -> Self {
        Self {
            host,
            port,
            username,
            password,
            channel: Mutex::new(Channel {
                stream: None,
                next_request_id: 0,
            }),
            rates: StdMutex::new(RateComputer::new()),
        }
    }

    /// Issue one call on the serialized channel, reconnecting lazily.
    async fn call(
        &self,
        operation: &'static str,
        method: &str,
        args: Vec<WireValue>,
        kwargs: Vec<(WireKey, WireValue)>,
    ) -> GatewayResult<WireValue> {
        let mut channel = self.channel.lock().await;

        if channel.stream.is_none() {
            let mut stream = match timeout(
                CONNECT_TIMEOUT,
                TcpStream::connect((self.host.as_str(), self.port)),
            )
            .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(err)) => return Err(GatewayError::connectivity(operation, err)),
                Err(_) => return Err(timed_out(operation)),
            };
            let login_id = channel.next_id();
            exchange(
                &mut stream,
                operation,
                login_id,
                "daemon.login",
                vec![
                    WireValue::str(self.username.clone()),
                    WireValue::str(self.password.clone()),
                ],
                vec![(
                    WireKey::from("client_version"),
                    WireValue::str("floodgate"),
                )],
            )
            .await?;
            channel.stream = Some(stream);
        }

        let request_id = channel.next_id();
        let stream = channel.stream.as_mut().expect("connected above");
        let result = exchange(stream, operation, request_id, method, args, kwargs).await;
        if let Err(err) = &result {
            // A dead or desynchronized channel is torn down and reopened on
            // the next call.
            if err.is_connectivity() {
                channel.stream = None;
            }
        }
        result
    }

    async fn torrent_status(
        &self,
        operation: &'static str,
        hash: &str,
        fields: &[&str],
    ) -> GatewayResult<WireValue> {
        let filter = WireValue::dict([(
            WireKey::from("id"),
            WireValue::List(vec![WireValue::str(hash)]),
        )]);
        let fields = WireValue::List(fields.iter().map(|field| WireValue::str(*field)).collect());
        let result = self
            .call(operation, "core.get_torrents_status", vec![filter, fields], Vec::new())
            .await?;
        result
            .get(hash)
            .cloned()
            .ok_or_else(|| GatewayError::decode(operation, "torrent missing from status reply"))
    }
}

fn dict_str(dict: &WireValue, key: &str) -> String {
    dict.get(key)
        .and_then(WireValue::as_str)
        .unwrap_or_default()
        .to_owned()
}

fn dict_u64(dict: &WireValue, key: &str) -> u64 {
    dict.get(key)
        .and_then(|value| {
            value
                .as_u64()
                .or_else(|| value.as_f64().map(|float| float.max(0.0) as u64))
        })
        .unwrap_or(0)
}

fn dict_u32(dict: &WireValue, key: &str) -> u32 {
    u32::try_from(dict_u64(dict, key)).unwrap_or(u32::MAX)
}

fn dict_i64(dict: &WireValue, key: &str) -> i64 {
    dict.get(key)
        .and_then(|value| {
            value
                .as_int()
                .or_else(|| value.as_f64().map(|float| float as i64))
        })
        .unwrap_or(0)
}

fn dict_f64(dict: &WireValue, key: &str) -> f64 {
    dict.get(key).and_then(WireValue::as_f64).unwrap_or(0.0)
}

fn dict_bool(dict: &WireValue, key: &str) -> bool {
    dict.get(key)
        .and_then(WireValue::as_bool)
        .unwrap_or(false)
}

fn tracker_urls(dict: &WireValue) -> Vec<String> {
    dict.get("trackers")
        .and_then(WireValue::as_list)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| entry.get("url").and_then(WireValue::as_str))
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

fn record_from_status(
    hash: &str,
    status: &WireValue,
    rates: &mut RateComputer,
    now_ms: i64,
) -> TorrentRecord {
    let size_bytes = dict_u64(status, "total_size");
    let bytes_done = dict_u64(status, "total_done");
    let down_total = dict_u64(status, "all_time_download");
    let up_total = dict_u64(status, "total_uploaded");
    let state = dict_str(status, "state");
    let message = dict_str(status, "message");

    let down_rate = rates.sample(&format!("down:{hash}"), now_ms, down_total);
    let up_rate = rates.sample(&format!("up:{hash}"), now_ms, up_total);
    let percent_complete = dict_f64(status, "progress");

    let mut flags = Vec::new();
    match state.as_str() {
        "Downloading" => flags.push(TorrentStatus::Downloading),
        "Seeding" => flags.push(TorrentStatus::Seeding),
        "Checking" | "Allocating" | "Moving" => flags.push(TorrentStatus::Checking),
        "Paused" | "Queued" => flags.push(TorrentStatus::Stopped),
        "Error" => flags.push(TorrentStatus::Error),
        other => debug!(state = other, "unrecognized backend torrent state"),
    }
    if percent_complete >= 100.0 {
        flags.push(TorrentStatus::Complete);
    }
    flags.push(if down_rate > 0 || up_rate > 0 {
        TorrentStatus::Active
    } else {
        TorrentStatus::Inactive
    });

    let label = dict_str(status, "label");
    let urls = tracker_urls(status);

    TorrentRecord {
        hash: hash.to_owned(),
        name: dict_str(status, "name"),
        size_bytes,
        bytes_done,
        percent_complete,
        up_total,
        down_total,
        up_rate,
        down_rate,
        eta: eta(size_bytes.saturating_sub(bytes_done), down_rate),
        ratio: dict_f64(status, "ratio"),
        status: flags,
        tags: if label.is_empty() { Vec::new() } else { vec![label] },
        tracker_domains: extract_tracker_domains(urls.iter().map(String::as_str)),
        directory: dict_str(status, "save_path"),
        is_private: dict_bool(status, "private"),
        peers_connected: dict_u32(status, "num_peers"),
        peers_total: dict_u32(status, "total_peers"),
        seeds_connected: dict_u32(status, "num_seeds"),
        seeds_total: dict_u32(status, "total_seeds"),
        date_added: dict_i64(status, "time_added"),
        date_created: 0,
        date_finished: dict_i64(status, "completed_time"),
        date_active: 0,
        message,
    }
}

/// The daemon expresses throttles in KiB/s with `-1` meaning unlimited.
fn throttle_from_kib(value: f64) -> u64 {
    if value <= 0.0 {
        0
    } else {
        (value * 1024.0) as u64
    }
}

#[allow(clippy::cast_precision_loss)]
fn throttle_to_kib(bytes: u64) -> f64 {
    if bytes == 0 { -1.0 } else { bytes as f64 / 1024.0 }
}

fn hash_list(hashes: &[TorrentHash]) -> WireValue {
    WireValue::List(hashes.iter().map(|hash| WireValue::str(hash.clone())).collect())
}

const fn file_priority_code(priority: ContentPriority) -> i64 {
    match priority {
        ContentPriority::Skip => 0,
        ContentPriority::Normal => 4,
        ContentPriority::High => 7,
    }
}

#[async_trait]
impl ClientGateway for BinRpcClient {
    async fn add_torrents_by_file(&self, options: AddTorrentByFileOptions) -> GatewayResult<()> {
        if options.files.is_empty() {
            return Err(GatewayError::validation("no metainfo files supplied"));
        }
        let add_options = add_options_dict(options.destination.as_deref(), options.start_on_add);
        for (index, file) in options.files.iter().enumerate() {
            self.call(
                "add_torrents_by_file",
                "core.add_torrent_file",
                vec![
                    WireValue::str(format!("upload-{index}.torrent")),
                    WireValue::str(file.clone()),
                    add_options.clone(),
                ],
                Vec::new(),
            )
            .await?;
        }
        Ok(())
    }

    async fn add_torrents_by_url(&self, options: AddTorrentByUrlOptions) -> GatewayResult<()> {
        if options.urls.is_empty() {
            return Err(GatewayError::validation("no torrent URLs supplied"));
        }
        let add_options = add_options_dict(options.destination.as_deref(), options.start_on_add);
        for url in &options.urls {
            let method = if url.starts_with("magnet:") {
                "core.add_torrent_magnet"
            } else {
                "core.add_torrent_url"
            };
            self.call(
                "add_torrents_by_url",
                method,
                vec![WireValue::str(url.clone()), add_options.clone()],
                Vec::new(),
            )
            .await?;
        }
        Ok(())
    }

    async fn remove_torrents(
        &self,
        hashes: Vec<TorrentHash>,
        delete_data: bool,
    ) -> GatewayResult<()> {
        require_hashes(&hashes)?;
        let result = self
            .call(
                "remove_torrents",
                "core.remove_torrents",
                vec![hash_list(&hashes), WireValue::Bool(delete_data)],
                Vec::new(),
            )
            .await?;
        // The daemon reports per-item failures as a list; the batch is
        // all-or-nothing from the caller's perspective.
        if let Some(failures) = result.as_list()
            && !failures.is_empty()
        {
            return Err(GatewayError::rejected(
                "remove_torrents",
                format!("{} torrents failed to remove", failures.len()),
            ));
        }
        Ok(())
    }

    async fn start_torrents(&self, hashes: Vec<TorrentHash>) -> GatewayResult<()> {
        require_hashes(&hashes)?;
        self.call(
            "start_torrents",
            "core.resume_torrents",
            vec![hash_list(&hashes)],
            Vec::new(),
        )
        .await
        .map(|_| ())
    }

    async fn stop_torrents(&self, hashes: Vec<TorrentHash>) -> GatewayResult<()> {
        require_hashes(&hashes)?;
        self.call(
            "stop_torrents",
            "core.pause_torrents",
            vec![hash_list(&hashes)],
            Vec::new(),
        )
        .await
        .map(|_| ())
    }

    async fn move_torrents(&self, options: MoveTorrentsOptions) -> GatewayResult<()> {
        require_hashes(&options.hashes)?;
        if !options.move_files {
            return Err(GatewayError::validation(
                "this backend cannot relocate a torrent without moving its data",
            ));
        }
        self.call(
            "move_torrents",
            "core.move_storage",
            vec![
                hash_list(&options.hashes),
                WireValue::str(options.destination.clone()),
            ],
            Vec::new(),
        )
        .await?;
        if options.verify_hashes {
            self.call(
                "move_torrents",
                "core.force_recheck",
                vec![hash_list(&options.hashes)],
                Vec::new(),
            )
            .await?;
        }
        Ok(())
    }

    async fn check_torrents(&self, hashes: Vec<TorrentHash>) -> GatewayResult<()> {
        require_hashes(&hashes)?;
        self.call(
            "check_torrents",
            "core.force_recheck",
            vec![hash_list(&hashes)],
            Vec::new(),
        )
        .await
        .map(|_| ())
    }

    async fn set_torrents_priority(
        &self,
        _hashes: Vec<TorrentHash>,
        _priority: TransferPriority,
    ) -> GatewayResult<()> {
        Err(GatewayError::Unsupported {
            operation: "set_torrents_priority",
        })
    }

    async fn set_torrents_tags(
        &self,
        hashes: Vec<TorrentHash>,
        tags: Vec<String>,
    ) -> GatewayResult<()> {
        require_hashes(&hashes)?;
        if tags.len() > 1 {
            return Err(GatewayError::validation(
                "this backend supports a single label per torrent",
            ));
        }
        let label = tags.first().cloned().unwrap_or_default();
        for hash in &hashes {
            self.call(
                "set_torrents_tags",
                "label.set_torrent",
                vec![WireValue::str(hash.clone()), WireValue::str(label.clone())],
                Vec::new(),
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
        let tracker_dicts: Vec<WireValue> = trackers
            .iter()
            .enumerate()
            .map(|(tier, url)| {
                WireValue::dict([
                    (WireKey::from("url"), WireValue::str(url.clone())),
                    (
                        WireKey::from("tier"),
                        WireValue::Int(i64::try_from(tier).unwrap_or(i64::MAX)),
                    ),
                ])
            })
            .collect();
        for hash in &hashes {
            self.call(
                "set_torrents_trackers",
                "core.set_torrent_trackers",
                vec![
                    WireValue::str(hash.clone()),
                    WireValue::List(tracker_dicts.clone()),
                ],
                Vec::new(),
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
        let operation = "set_torrent_contents_priority";
        let status = self
            .torrent_status(operation, &hash, &["file_priorities"])
            .await?;
        let mut priorities: Vec<i64> = status
            .get("file_priorities")
            .and_then(WireValue::as_list)
            .map(|values| {
                values
                    .iter()
                    .map(|value| value.as_int().unwrap_or(4))
                    .collect()
            })
            .unwrap_or_default();
        let code = file_priority_code(priority);
        for index in &indices {
            let index = *index as usize;
            if index >= priorities.len() {
                return Err(GatewayError::validation(format!(
                    "file index {index} out of range"
                )));
            }
            priorities[index] = code;
        }
        let options = WireValue::dict([(
            WireKey::from("file_priorities"),
            WireValue::List(priorities.into_iter().map(WireValue::Int).collect()),
        )]);
        self.call(
            operation,
            "core.set_torrent_options",
            vec![
                WireValue::List(vec![WireValue::str(hash)]),
                options,
            ],
            Vec::new(),
        )
        .await
        .map(|_| ())
    }

    async fn get_torrent_contents(&self, hash: TorrentHash) -> GatewayResult<Vec<TorrentContent>> {
        let operation = "get_torrent_contents";
        let status = self
            .torrent_status(operation, &hash, &["files", "file_progress", "file_priorities"])
            .await?;
        let files = status
            .get("files")
            .and_then(WireValue::as_list)
            .ok_or_else(|| GatewayError::decode(operation, "status reply missing files"))?;
        let progress = status
            .get("file_progress")
            .and_then(WireValue::as_list)
            .unwrap_or(&[]);
        let priorities = status
            .get("file_priorities")
            .and_then(WireValue::as_list)
            .unwrap_or(&[]);

        let contents = files
            .iter()
            .enumerate()
            .map(|(index, file)| {
                let size_bytes = dict_u64(file, "size");
                let done_fraction = progress
                    .get(index)
                    .and_then(WireValue::as_f64)
                    .unwrap_or(0.0);
                #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                let bytes_done = ((size_bytes as f64) * done_fraction).round() as u64;
                TorrentContent {
                    index: dict_u32(file, "index"),
                    path: dict_str(file, "path"),
                    size_bytes,
                    bytes_done,
                    priority: match priorities.get(index).and_then(WireValue::as_int) {
                        Some(0) => ContentPriority::Skip,
                        Some(7) => ContentPriority::High,
                        _ => ContentPriority::Normal,
                    },
                }
            })
            .collect();
        Ok(contents)
    }

    async fn get_torrent_peers(&self, hash: TorrentHash) -> GatewayResult<Vec<TorrentPeer>> {
        let operation = "get_torrent_peers";
        let status = self.torrent_status(operation, &hash, &["peers"]).await?;
        let peers = status
            .get("peers")
            .and_then(WireValue::as_list)
            .ok_or_else(|| GatewayError::decode(operation, "status reply missing peers"))?;
        Ok(peers
            .iter()
            .map(|peer| TorrentPeer {
                address: dict_str(peer, "ip"),
                client: dict_str(peer, "client"),
                down_rate: dict_u64(peer, "down_speed"),
                up_rate: dict_u64(peer, "up_speed"),
                percent_complete: dict_f64(peer, "progress"),
                is_encrypted: false,
                is_incoming: false,
            })
            .collect())
    }

    async fn get_torrent_trackers(&self, hash: TorrentHash) -> GatewayResult<Vec<TorrentTracker>> {
        let operation = "get_torrent_trackers";
        let status = self.torrent_status(operation, &hash, &["trackers"]).await?;
        let trackers = status
            .get("trackers")
            .and_then(WireValue::as_list)
            .ok_or_else(|| GatewayError::decode(operation, "status reply missing trackers"))?;
        Ok(trackers
            .iter()
            .map(|tracker| {
                let url = dict_str(tracker, "url");
                TorrentTracker {
                    kind: if url.starts_with("udp") {
                        TrackerKind::Udp
                    } else {
                        TrackerKind::Http
                    },
                    is_enabled: true,
                    url,
                }
            })
            .collect())
    }

    async fn fetch_torrent_list(&self) -> GatewayResult<TorrentListSnapshot> {
        let operation = "fetch_torrent_list";
        let fields = WireValue::List(
            STATUS_FIELDS
                .iter()
                .map(|field| WireValue::str(*field))
                .collect(),
        );
        let result = self
            .call(
                operation,
                "core.get_torrents_status",
                vec![WireValue::Dict(Vec::new()), fields],
                Vec::new(),
            )
            .await?;
        let entries = result
            .as_dict()
            .ok_or_else(|| GatewayError::decode(operation, "status reply is not a dictionary"))?;

        let now_ms = Utc::now().timestamp_millis();
        let mut torrents = BTreeMap::new();
        let mut rates = self.rates.lock().expect("rate state mutex poisoned");
        for (key, status) in entries {
            let WireKey::Str(hash) = key else {
                return Err(GatewayError::decode(operation, "torrent key is not a hash"));
            };
            let record = record_from_status(hash, status, &mut rates, now_ms);
            torrents.insert(hash.clone(), record);
        }
        Ok(TorrentListSnapshot {
            id: now_ms,
            torrents,
        })
    }

    async fn fetch_transfer_summary(&self) -> GatewayResult<TransferSummary> {
        let operation = "fetch_transfer_summary";
        let session = self
            .call(
                operation,
                "core.get_session_status",
                vec![WireValue::List(vec![
                    WireValue::str("total_download"),
                    WireValue::str("total_upload"),
                ])],
                Vec::new(),
            )
            .await?;
        let config = self
            .call(
                operation,
                "core.get_config_values",
                vec![WireValue::List(vec![
                    WireValue::str("max_download_speed"),
                    WireValue::str("max_upload_speed"),
                ])],
                Vec::new(),
            )
            .await?;

        let down_total = dict_u64(&session, "total_download");
        let up_total = dict_u64(&session, "total_upload");
        let now_ms = Utc::now().timestamp_millis();
        let mut rates = self.rates.lock().expect("rate state mutex poisoned");
        Ok(TransferSummary {
            down_rate: rates.sample("session:down", now_ms, down_total),
            down_total,
            down_throttle: throttle_from_kib(dict_f64(&config, "max_download_speed")),
            up_rate: rates.sample("session:up", now_ms, up_total),
            up_total,
            up_throttle: throttle_from_kib(dict_f64(&config, "max_upload_speed")),
        })
    }

    async fn get_client_settings(&self) -> GatewayResult<ClientSettings> {
        let operation = "get_client_settings";
        let config = self
            .call(operation, "core.get_config", Vec::new(), Vec::new())
            .await?;
        Ok(ClientSettings {
            download_dir: dict_str(&config, "download_location"),
            down_throttle: throttle_from_kib(dict_f64(&config, "max_download_speed")),
            up_throttle: throttle_from_kib(dict_f64(&config, "max_upload_speed")),
            peer_limit_global: dict_u32(&config, "max_connections_global"),
            peer_limit_per_torrent: dict_u32(&config, "max_connections_per_torrent"),
        })
    }

    async fn set_client_settings(&self, patch: ClientSettingsPatch) -> GatewayResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let mut pairs = Vec::new();
        if let Some(dir) = patch.download_dir {
            pairs.push((WireKey::from("download_location"), WireValue::str(dir)));
        }
        if let Some(throttle) = patch.down_throttle {
            pairs.push((
                WireKey::from("max_download_speed"),
                WireValue::Float64(throttle_to_kib(throttle)),
            ));
        }
        if let Some(throttle) = patch.up_throttle {
            pairs.push((
                WireKey::from("max_upload_speed"),
                WireValue::Float64(throttle_to_kib(throttle)),
            ));
        }
        if let Some(limit) = patch.peer_limit_global {
            pairs.push((
                WireKey::from("max_connections_global"),
                WireValue::from(limit),
            ));
        }
        if let Some(limit) = patch.peer_limit_per_torrent {
            pairs.push((
                WireKey::from("max_connections_per_torrent"),
                WireValue::from(limit),
            ));
        }
        self.call(
            "set_client_settings",
            "core.set_config",
            vec![WireValue::Dict(pairs)],
            Vec::new(),
        )
        .await
        .map(|_| ())
    }

    async fn test_gateway(&self) -> GatewayResult<()> {
        self.call("test_gateway", "daemon.info", Vec::new(), Vec::new())
            .await
            .map(|_| ())
    }
}

fn add_options_dict(destination: Option<&str>, start_on_add: bool) -> WireValue {
    let mut pairs = vec![(
        WireKey::from("add_paused"),
        WireValue::Bool(!start_on_add),
    )];
    if let Some(destination) = destination {
        pairs.push((
            WireKey::from("download_location"),
            WireValue::str(destination),
        ));
    }
    WireValue::Dict(pairs)
}
