//! Adapter for the websocket-command daemon.
//!
//! Commands travel as `{ "command": .., "args": .. }` envelopes; the adapter
//! correlates the next frame whose `type` matches the expected response tag.
//! A fixed per-request timeout tears the socket down; the next call lazily
//! reconnects. The socket is a single stateful channel, so requests are
//! serialized behind an async mutex.

use std::collections::BTreeMap;
use std::io;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
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

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Fixed per-request response deadline.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Client for the websocket-command daemon.
pub struct WsCommandClient {
    url: String,
    password: Option<String>,
    /// The in-flight gate: one outstanding command per socket.
    channel: Mutex<Option<WsStream>>,
    rates: StdMutex<RateComputer>,
}

impl WsCommandClient {
    /// Construct a client for the given websocket URL.
    #[must_use]
    pub fn new(url: String, password: Option<String>) -> Self {
        Self {
            url,
            password,
            channel: Mutex::new(None),
            rates: StdMutex::new(RateComputer::new()),
        }
    }

    /// Issue one command and await its matching response.
    async fn send_command(
        &self,
        operation: &'static str,
        command: &str,
        args: Value,
        expect: &str,
    ) -> GatewayResult<Value> {
        let mut channel = self.channel.lock().await;

        if channel.is_none() {
            let stream = match timeout(CONNECT_TIMEOUT, connect_async(self.url.as_str())).await {
                Ok(Ok((stream, _))) => stream,
                Ok(Err(err)) => return Err(GatewayError::connectivity(operation, err)),
                Err(_) => return Err(timed_out(operation)),
            };
            let mut stream = stream;
            if let Some(password) = &self.password {
                perform(
                    &mut stream,
                    operation,
                    "authenticate",
                    json!({ "password": password }),
                    "auth-ok",
                )
                .await?;
            }
            debug!(operation, "websocket channel established");
            *channel = Some(stream);
        }

        let stream = channel.as_mut().expect("connected above");
        let result = perform(stream, operation, command, args, expect).await;
        if let Err(err) = &result {
            // Timeouts and transport failures poison the channel; it is
            // reopened on the next call.
            if err.is_connectivity() {
                *channel = None;
            }
        }
        result
    }
}

fn timed_out(operation: &'static str) -> GatewayError {
    GatewayError::connectivity(
        operation,
        io::Error::new(io::ErrorKind::TimedOut, "response timed out"),
    )
}

async fn perform(
    stream: &mut WsStream,
    operation: &'static str,
    command: &str,
    args: Value,
    expect: &str,
) -> GatewayResult<Value> {
    let envelope = json!({ "command": command, "args": args });
    match timeout(
        RESPONSE_TIMEOUT,
        stream.send(Message::Text(envelope.to_string().into())),
    )
    .await
    {
        Ok(Ok(())) => {}
        Ok(Err(err)) => return Err(GatewayError::connectivity(operation, err)),
        Err(_) => return Err(timed_out(operation)),
    }

    let wait = async {
        loop {
            match stream.next().await {
                None => {
                    return Err(GatewayError::connectivity(
                        operation,
                        io::Error::other("channel closed"),
                    ));
                }
                Some(Err(err)) => return Err(GatewayError::connectivity(operation, err)),
                Some(Ok(Message::Text(text))) => {
                    let value: Value = serde_json::from_str(text.as_str())
                        .map_err(|err| GatewayError::decode(operation, err.to_string()))?;
                    let kind = value
                        .get("type")
                        .and_then(Value::as_str)
                        .ok_or_else(|| {
                            GatewayError::decode(operation, "response missing type tag")
                        })?;
                    if kind == expect {
                        return Ok(value);
                    }
                    if kind == "error" {
                        let message = value
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("backend error");
                        return Err(GatewayError::rejected(operation, message.to_owned()));
                    }
                    // Unsolicited push for another concern; keep waiting.
                    debug!(operation, kind, "skipping unrelated frame");
                }
                Some(Ok(Message::Close(_))) => {
                    return Err(GatewayError::connectivity(
                        operation,
                        io::Error::other("channel closed by daemon"),
                    ));
                }
                Some(Ok(_)) => {}
            }
        }
    };
    match timeout(RESPONSE_TIMEOUT, wait).await {
        Ok(result) => result,
        Err(_) => Err(timed_out(operation)),
    }
}

/// Torrent payload in the daemon's list response.
#[derive(Debug, Default, Deserialize)]
struct WsTorrent {
    hash: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    size_bytes: u64,
    #[serde(default)]
    bytes_done: u64,
    #[serde(default)]
    up_total: u64,
    #[serde(default)]
    down_total: u64,
    #[serde(default)]
    ratio: f64,
    #[serde(default)]
    state: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    trackers: Vec<String>,
    #[serde(default)]
    path: String,
    #[serde(default)]
    private: bool,
    #[serde(default)]
    peers_connected: u32,
    #[serde(default)]
    peers_total: u32,
    #[serde(default)]
    seeds_connected: u32,
    #[serde(default)]
    seeds_total: u32,
    #[serde(default)]
    added: i64,
    #[serde(default)]
    created: i64,
    #[serde(default)]
    finished: i64,
    #[serde(default)]
    last_active: i64,
    #[serde(default)]
    message: String,
}

fn record_from_ws(torrent: WsTorrent, rates: &mut RateComputer, now_ms: i64) -> TorrentRecord {
    let down_rate = rates.sample(&format!("down:{}", torrent.hash), now_ms, torrent.down_total);
    let up_rate = rates.sample(&format!("up:{}", torrent.hash), now_ms, torrent.up_total);

    let complete = torrent.size_bytes > 0 && torrent.bytes_done >= torrent.size_bytes;
    let mut flags = Vec::new();
    match torrent.state.as_str() {
        "leeching" | "pending" | "magnet" => flags.push(TorrentStatus::Downloading),
        "seeding" => flags.push(TorrentStatus::Seeding),
        "hashing" => flags.push(TorrentStatus::Checking),
        "paused" => flags.push(TorrentStatus::Stopped),
        "error" => flags.push(TorrentStatus::Error),
        "idle" => {}
        other => debug!(state = other, "unrecognized backend torrent state"),
    }
    if complete {
        flags.push(TorrentStatus::Complete);
    }
    flags.push(if down_rate > 0 || up_rate > 0 {
        TorrentStatus::Active
    } else {
        TorrentStatus::Inactive
    });

    #[allow(clippy::cast_precision_loss)]
    let percent_complete = if torrent.size_bytes == 0 {
        0.0
    } else {
        (torrent.bytes_done as f64 / torrent.size_bytes as f64) * 100.0
    };

    TorrentRecord {
        tracker_domains: extract_tracker_domains(
            torrent.trackers.iter().map(String::as_str),
        ),
        eta: eta(
            torrent.size_bytes.saturating_sub(torrent.bytes_done),
            down_rate,
        ),
        hash: torrent.hash,
        name: torrent.name,
        size_bytes: torrent.size_bytes,
        bytes_done: torrent.bytes_done,
        percent_complete,
        up_total: torrent.up_total,
        down_total: torrent.down_total,
        up_rate,
        down_rate,
        ratio: torrent.ratio,
        status: flags,
        tags: torrent.tags,
        directory: torrent.path,
        is_private: torrent.private,
        peers_connected: torrent.peers_connected,
        peers_total: torrent.peers_total,
        seeds_connected: torrent.seeds_connected,
        seeds_total: torrent.seeds_total,
        date_added: torrent.added,
        date_created: torrent.created,
        date_finished: torrent.finished,
        date_active: torrent.last_active,
        message: torrent.message,
    }
}

const fn priority_tag(priority: TransferPriority) -> &'static str {
    match priority {
        TransferPriority::Off => "off",
        TransferPriority::Low => "low",
        TransferPriority::Normal => "normal",
        TransferPriority::High => "high",
    }
}

const fn content_priority_tag(priority: ContentPriority) -> &'static str {
    match priority {
        ContentPriority::Skip => "skip",
        ContentPriority::Normal => "normal",
        ContentPriority::High => "high",
    }
}

#[async_trait]
impl ClientGateway for WsCommandClient {
    async fn add_torrents_by_file(&self, options: AddTorrentByFileOptions) -> GatewayResult<()> {
        if options.files.is_empty() {
            return Err(GatewayError::validation("no metainfo files supplied"));
        }
        self.send_command(
            "add_torrents_by_file",
            "add-metainfo",
            json!({
                "files": options.files,
                "destination": options.destination,
                "tags": options.tags,
                "start": options.start_on_add,
            }),
            "ok",
        )
        .await
        .map(|_| ())
    }

    async fn add_torrents_by_url(&self, options: AddTorrentByUrlOptions) -> GatewayResult<()> {
        if options.urls.is_empty() {
            return Err(GatewayError::validation("no torrent URLs supplied"));
        }
        self.send_command(
            "add_torrents_by_url",
            "add-url",
            json!({
                "urls": options.urls,
                "destination": options.destination,
                "tags": options.tags,
                "start": options.start_on_add,
            }),
            "ok",
        )
        .await
        .map(|_| ())
    }

    async fn remove_torrents(
        &self,
        hashes: Vec<TorrentHash>,
        delete_data: bool,
    ) -> GatewayResult<()> {
        require_hashes(&hashes)?;
        self.send_command(
            "remove_torrents",
            "remove-torrents",
            json!({ "hashes": hashes, "delete_data": delete_data }),
            "ok",
        )
        .await
        .map(|_| ())
    }

    async fn start_torrents(&self, hashes: Vec<TorrentHash>) -> GatewayResult<()> {
        require_hashes(&hashes)?;
        self.send_command(
            "start_torrents",
            "start-torrents",
            json!({ "hashes": hashes }),
            "ok",
        )
        .await
        .map(|_| ())
    }

    async fn stop_torrents(&self, hashes: Vec<TorrentHash>) -> GatewayResult<()> {
        require_hashes(&hashes)?;
        self.send_command(
            "stop_torrents",
            "stop-torrents",
            json!({ "hashes": hashes }),
            "ok",
        )
        .await
        .map(|_| ())
    }

    async fn move_torrents(&self, options: MoveTorrentsOptions) -> GatewayResult<()> {
        require_hashes(&options.hashes)?;
        self.send_command(
            "move_torrents",
            "move-torrents",
            json!({
                "hashes": options.hashes,
                "destination": options.destination,
                "move_files": options.move_files,
                "verify_hashes": options.verify_hashes,
            }),
            "ok",
        )
        .await
        .map(|_| ())
    }

    async fn check_torrents(&self, hashes: Vec<TorrentHash>) -> GatewayResult<()> {
        require_hashes(&hashes)?;
        self.send_command(
            "check_torrents",
            "check-torrents",
            json!({ "hashes": hashes }),
            "ok",
        )
        .await
        .map(|_| ())
    }

    async fn set_torrents_priority(
        &self,
        hashes: Vec<TorrentHash>,
        priority: TransferPriority,
    ) -> GatewayResult<()> {
        require_hashes(&hashes)?;
        self.send_command(
            "set_torrents_priority",
            "set-priority",
            json!({ "hashes": hashes, "priority": priority_tag(priority) }),
            "ok",
        )
        .await
        .map(|_| ())
    }

    async fn set_torrents_tags(
        &self,
        hashes: Vec<TorrentHash>,
        tags: Vec<String>,
    ) -> GatewayResult<()> {
        require_hashes(&hashes)?;
        self.send_command(
            "set_torrents_tags",
            "set-tags",
            json!({ "hashes": hashes, "tags": tags }),
            "ok",
        )
        .await
        .map(|_| ())
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
        self.send_command(
            "set_torrents_trackers",
            "set-trackers",
            json!({ "hashes": hashes, "trackers": trackers }),
            "ok",
        )
        .await
        .map(|_| ())
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
        self.send_command(
            "set_torrent_contents_priority",
            "set-file-priority",
            json!({
                "hash": hash,
                "indices": indices,
                "priority": content_priority_tag(priority),
            }),
            "ok",
        )
        .await
        .map(|_| ())
    }

    async fn get_torrent_contents(&self, hash: TorrentHash) -> GatewayResult<Vec<TorrentContent>> {
        let operation = "get_torrent_contents";
        let response = self
            .send_command(operation, "get-files", json!({ "hash": hash }), "file-list")
            .await?;
        let files = response
            .get("files")
            .cloned()
            .ok_or_else(|| GatewayError::decode(operation, "file list missing files field"))?;
        serde_json::from_value(files)
            .map_err(|err| GatewayError::decode(operation, err.to_string()))
    }

    async fn get_torrent_peers(&self, hash: TorrentHash) -> GatewayResult<Vec<TorrentPeer>> {
        let operation = "get_torrent_peers";
        let response = self
            .send_command(operation, "get-peers", json!({ "hash": hash }), "peer-list")
            .await?;
        let peers = response
            .get("peers")
            .cloned()
            .ok_or_else(|| GatewayError::decode(operation, "peer list missing peers field"))?;
        serde_json::from_value(peers)
            .map_err(|err| GatewayError::decode(operation, err.to_string()))
    }

    async fn get_torrent_trackers(&self, hash: TorrentHash) -> GatewayResult<Vec<TorrentTracker>> {
        let operation = "get_torrent_trackers";
        let response = self
            .send_command(
                operation,
                "get-trackers",
                json!({ "hash": hash }),
                "tracker-list",
            )
            .await?;
        #[derive(Deserialize)]
        struct Entry {
            url: String,
            #[serde(default = "default_enabled")]
            enabled: bool,
        }
        const fn default_enabled() -> bool {
            true
        }
        let entries = response
            .get("trackers")
            .cloned()
            .ok_or_else(|| GatewayError::decode(operation, "tracker list missing trackers"))?;
        let entries: Vec<Entry> = serde_json::from_value(entries)
            .map_err(|err| GatewayError::decode(operation, err.to_string()))?;
        Ok(entries
            .into_iter()
            .map(|entry| TorrentTracker {
                kind: if entry.url.starts_with("udp") {
                    TrackerKind::Udp
                } else {
                    TrackerKind::Http
                },
                is_enabled: entry.enabled,
                url: entry.url,
            })
            .collect())
    }

    async fn fetch_torrent_list(&self) -> GatewayResult<TorrentListSnapshot> {
        let operation = "fetch_torrent_list";
        let response = self
            .send_command(operation, "list-torrents", json!({}), "torrent-list")
            .await?;
        let torrents = response
            .get("torrents")
            .cloned()
            .ok_or_else(|| GatewayError::decode(operation, "list missing torrents field"))?;
        let torrents: Vec<WsTorrent> = serde_json::from_value(torrents)
            .map_err(|err| GatewayError::decode(operation, err.to_string()))?;

        let now_ms = Utc::now().timestamp_millis();
        let mut rates = self.rates.lock().expect("rate state mutex poisoned");
        let mut records = BTreeMap::new();
        for torrent in torrents {
            let record = record_from_ws(torrent, &mut rates, now_ms);
            records.insert(record.hash.clone(), record);
        }
        Ok(TorrentListSnapshot {
            id: now_ms,
            torrents: records,
        })
    }

    async fn fetch_transfer_summary(&self) -> GatewayResult<TransferSummary> {
        let operation = "fetch_transfer_summary";
        let response = self
            .send_command(operation, "get-transfer-totals", json!({}), "transfer-totals")
            .await?;
        let down_total = response
            .get("down_total")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let up_total = response.get("up_total").and_then(Value::as_u64).unwrap_or(0);
        let now_ms = Utc::now().timestamp_millis();
        let mut rates = self.rates.lock().expect("rate state mutex poisoned");
        Ok(TransferSummary {
            down_rate: rates.sample("session:down", now_ms, down_total),
            down_total,
            down_throttle: response
                .get("down_throttle")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            up_rate: rates.sample("session:up", now_ms, up_total),
            up_total,
            up_throttle: response
                .get("up_throttle")
                .and_then(Value::as_u64)
                .unwrap_or(0),
        })
    }

    async fn get_client_settings(&self) -> GatewayResult<ClientSettings> {
        let operation = "get_client_settings";
        let response = self
            .send_command(operation, "get-settings", json!({}), "settings")
            .await?;
        let settings = response
            .get("settings")
            .cloned()
            .ok_or_else(|| GatewayError::decode(operation, "response missing settings field"))?;
        serde_json::from_value(settings)
            .map_err(|err| GatewayError::decode(operation, err.to_string()))
    }

    async fn set_client_settings(&self, patch: ClientSettingsPatch) -> GatewayResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        self.send_command(
            "set_client_settings",
            "set-settings",
            serde_json::to_value(&patch)
                .map_err(|err| GatewayError::decode("set_client_settings", err.to_string()))?,
            "ok",
        )
        .await
        .map(|_| ())
    }

    async fn test_gateway(&self) -> GatewayResult<()> {
        self.send_command("test_gateway", "ping", json!({}), "pong")
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt as _;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    #[test]
    fn ws_payloads_normalize_into_records() {
        let torrent = WsTorrent {
            hash: "abc123".into(),
            name: "distro.iso".into(),
            size_bytes: 1_000,
            bytes_done: 1_000,
            up_total: 500,
            down_total: 1_000,
            state: "seeding".into(),
            tags: vec!["linux".into()],
            trackers: vec!["http://tracker.example.co.uk/ann".into()],
            path: "/downloads".into(),
            ..WsTorrent::default()
        };
        let mut rates = RateComputer::new();
        let record = record_from_ws(torrent, &mut rates, 0);
        assert_eq!(record.hash, "abc123");
        assert!((record.percent_complete - 100.0).abs() < f64::EPSILON);
        assert_eq!(record.tracker_domains, vec!["example.co.uk"]);
        assert_eq!(record.status, vec![
            TorrentStatus::Seeding,
            TorrentStatus::Complete,
            TorrentStatus::Inactive
        ]);
    }

    async fn serve_once<F>(listener: TcpListener, reply: F)
    where
        F: Fn(&Value) -> Option<Value> + Send + 'static,
    {
        let (socket, _) = listener.accept().await.expect("accept");
        let mut stream = accept_async(socket).await.expect("handshake");
        while let Some(Ok(message)) = stream.next().await {
            if let Message::Text(text) = message {
                let envelope: Value = serde_json::from_str(text.as_str()).expect("json");
                if let Some(response) = reply(&envelope) {
                    stream
                        .send(Message::Text(response.to_string().into()))
                        .await
                        .expect("send");
                }
            }
        }
    }

    #[tokio::test]
    async fn commands_correlate_on_the_expected_type_tag() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(serve_once(listener, |envelope| {
            assert_eq!(envelope["command"], "ping");
            Some(json!({ "type": "pong" }))
        }));

        let client = WsCommandClient::new(format!("ws://{addr}"), None);
        client.test_gateway().await.expect("ping succeeds");
    }

    #[tokio::test]
    async fn unrelated_frames_are_skipped_until_the_match() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept");
            let mut stream = accept_async(socket).await.expect("handshake");
            let _ = stream.next().await;
            // An unsolicited push lands before the real response.
            stream
                .send(Message::Text(
                    json!({ "type": "torrent-added", "hash": "abc" })
                        .to_string()
                        .into(),
                ))
                .await
                .expect("send push");
            stream
                .send(Message::Text(json!({ "type": "pong" }).to_string().into()))
                .await
                .expect("send pong");
        });

        let client = WsCommandClient::new(format!("ws://{addr}"), None);
        client.test_gateway().await.expect("ping succeeds");
    }

    #[tokio::test]
    async fn error_frames_become_rejections() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(serve_once(listener, |_| {
            Some(json!({ "type": "error", "message": "unknown torrent" }))
        }));

        let client = WsCommandClient::new(format!("ws://{addr}"), None);
        let result = client.start_torrents(vec!["abc".into()]).await;
        assert!(matches!(result, Err(GatewayError::Rejected { .. })));
    }

    #[tokio::test]
    async fn silent_daemon_times_out_and_channel_reopens() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            // First connection: swallow the command, never answer.
            let (socket, _) = listener.accept().await.expect("accept");
            let mut stream = accept_async(socket).await.expect("handshake");
            let _ = stream.next().await;
            drop(stream);
            // Second connection: answer properly.
            let (socket, _) = listener.accept().await.expect("accept");
            let mut stream = accept_async(socket).await.expect("handshake");
            let _ = stream.next().await;
            stream
                .send(Message::Text(json!({ "type": "pong" }).to_string().into()))
                .await
                .expect("send pong");
        });

        let client = WsCommandClient::new(format!("ws://{addr}"), None);
        let first = client.test_gateway().await;
        assert!(matches!(first, Err(GatewayError::Connectivity { .. })));
        // The torn-down channel reconnects lazily on the next call.
        client.test_gateway().await.expect("second ping succeeds");
    }
}
