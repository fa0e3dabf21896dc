//! Per-session registry wiring adapters, health, and streams together.
//!
//! Each authenticated session owns exactly one adapter, one health monitor,
//! one event bus, and one diff engine, constructed on registration and torn
//! down on deregistration. There is no state shared across sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use floodgate_events::{Event, EventBus};
use floodgate_gateway::health::{GatewayMonitor, RetryPolicy};
use floodgate_gateway::model::{DiskUsage, PollingConfig};
use floodgate_gateway::service::ClientGateway;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::broadcast::{self, ConnectState, ViewerStream};
use crate::history::TransferHistoryRing;
use crate::poller;
use crate::publisher::SnapshotPublisher;

/// State shared between the poll loop and connecting viewers.
pub(crate) struct SharedState {
    pub(crate) publisher: StdMutex<SnapshotPublisher>,
    pub(crate) history: StdMutex<TransferHistoryRing>,
    pub(crate) disks: StdMutex<Vec<DiskUsage>>,
    pub(crate) notifications: StdMutex<(u64, u64)>,
}

/// One session's gateway services: the monitor-wrapped adapter, its event
/// bus, and the background poll loop.
pub struct SessionHandle {
    bus: EventBus,
    monitor: GatewayMonitor,
    shared: Arc<SharedState>,
    poller: JoinHandle<()>,
    connectivity_forwarder: JoinHandle<()>,
}

impl SessionHandle {
    fn spawn(
        gateway: Arc<dyn ClientGateway>,
        retry_policy: RetryPolicy,
        polling: PollingConfig,
    ) -> Self {
        let bus = EventBus::new();
        let monitor = GatewayMonitor::new(gateway, retry_policy);
        let shared = Arc::new(SharedState {
            publisher: StdMutex::new(SnapshotPublisher::new(bus.clone())),
            history: StdMutex::new(TransferHistoryRing::default()),
            disks: StdMutex::new(Vec::new()),
            notifications: StdMutex::new((0, 0)),
        });

        let connectivity_forwarder = {
            let mut connectivity = monitor.connectivity();
            let bus = bus.clone();
            tokio::spawn(async move {
                while connectivity.changed().await.is_ok() {
                    let connected = *connectivity.borrow_and_update();
                    let _ = bus.publish(Event::ConnectivityChanged { connected });
                }
            })
        };
        let poller = poller::spawn(monitor.clone(), bus.clone(), Arc::clone(&shared), polling);

        Self {
            bus,
            monitor,
            shared,
            poller,
            connectivity_forwarder,
        }
    }

    /// The monitor-wrapped gateway for issuing operations.
    #[must_use]
    pub fn gateway(&self) -> &GatewayMonitor {
        &self.monitor
    }

    /// The session's event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Open a viewer stream seeded with the full current state.
    ///
    /// # Panics
    ///
    /// Panics if a shared-state mutex has been poisoned.
    #[must_use]
    pub fn open_stream(&self) -> ViewerStream {
        let initial = {
            let publisher = self
                .shared
                .publisher
                .lock()
                .expect("publisher mutex poisoned");
            ConnectState {
                connected: *self.monitor.connectivity().borrow(),
                disks: self
                    .shared
                    .disks
                    .lock()
                    .expect("disk state mutex poisoned")
                    .clone(),
                snapshot: publisher.latest_list(),
                taxonomy: publisher.latest_taxonomy(),
                summary: publisher.latest_summary(),
                history: self
                    .shared
                    .history
                    .lock()
                    .expect("history mutex poisoned")
                    .snapshot(),
                notifications: *self
                    .shared
                    .notifications
                    .lock()
                    .expect("notification state mutex poisoned"),
            }
        };
        broadcast::open_stream(&self.bus, initial)
    }

    /// Update disk usage readings and notify viewers; disk usage has no
    /// diffable snapshot and always travels in full.
    ///
    /// # Panics
    ///
    /// Panics if the disk-state mutex has been poisoned.
    pub fn publish_disk_usage(&self, disks: Vec<DiskUsage>) {
        *self
            .shared
            .disks
            .lock()
            .expect("disk state mutex poisoned") = disks.clone();
        let _ = self.bus.publish(Event::DiskUsageChanged { disks });
    }

    /// Update notification counters and notify viewers.
    ///
    /// # Panics
    ///
    /// Panics if the notification-state mutex has been poisoned.
    pub fn publish_notification_count(&self, total: u64, unread: u64) {
        *self
            .shared
            .notifications
            .lock()
            .expect("notification state mutex poisoned") = (total, unread);
        let _ = self.bus.publish(Event::NotificationCountChanged { total, unread });
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.poller.abort();
        self.connectivity_forwarder.abort();
    }
}

/// Arena of per-session gateway services keyed by session id.
pub struct SessionRegistry {
    retry_policy: RetryPolicy,
    sessions: StdMutex<HashMap<Uuid, Arc<SessionHandle>>>,
}

impl SessionRegistry {
    /// Construct an empty registry using `retry_policy` for every session's
    /// health monitor.
    #[must_use]
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self {
            retry_policy,
            sessions: StdMutex::new(HashMap::new()),
        }
    }

    /// Construct and register the services for `session_id`, replacing (and
    /// tearing down) any previous registration.
    ///
    /// # Panics
    ///
    /// Panics if the registry mutex has been poisoned.
    pub fn register(
        &self,
        session_id: Uuid,
        gateway: Arc<dyn ClientGateway>,
        polling: PollingConfig,
    ) -> Arc<SessionHandle> {
        let handle = Arc::new(SessionHandle::spawn(gateway, self.retry_policy, polling));
        let mut sessions = self.sessions.lock().expect("session registry mutex poisoned");
        sessions.insert(session_id, Arc::clone(&handle));
        handle
    }

    /// Look up a registered session.
    ///
    /// # Panics
    ///
    /// Panics if the registry mutex has been poisoned.
    #[must_use]
    pub fn get(&self, session_id: Uuid) -> Option<Arc<SessionHandle>> {
        self.sessions
            .lock()
            .expect("session registry mutex poisoned")
            .get(&session_id)
            .cloned()
    }

    /// Tear down a session's services; returns whether one was registered.
    ///
    /// # Panics
    ///
    /// Panics if the registry mutex has been poisoned.
    pub fn deregister(&self, session_id: Uuid) -> bool {
        self.sessions
            .lock()
            .expect("session registry mutex poisoned")
            .remove(&session_id)
            .is_some()
    }

    /// Number of live sessions.
    ///
    /// # Panics
    ///
    /// Panics if the registry mutex has been poisoned.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions
            .lock()
            .expect("session registry mutex poisoned")
            .len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use floodgate_gateway::error::GatewayResult;
    use floodgate_gateway::model::{
        AddTorrentByFileOptions, AddTorrentByUrlOptions, ClientSettings, ClientSettingsPatch,
        ContentPriority, MoveTorrentsOptions, TorrentContent, TorrentHash, TorrentListSnapshot,
        TorrentRecord, TorrentTracker, TransferPriority, TransferSummary,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    struct ScriptedGateway {
        polls: AtomicUsize,
    }

    impl ScriptedGateway {
        fn new() -> Self {
            Self {
                polls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ClientGateway for ScriptedGateway {
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
            let poll = self.polls.fetch_add(1, Ordering::SeqCst);
            let mut snapshot = TorrentListSnapshot {
                id: i64::try_from(poll).unwrap_or(i64::MAX),
                torrents: std::collections::BTreeMap::new(),
            };
            snapshot.torrents.insert(
                "aaa".into(),
                TorrentRecord {
                    hash: "aaa".into(),
                    name: "one".into(),
                    bytes_done: poll as u64,
                    ..TorrentRecord::default()
                },
            );
            Ok(snapshot)
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

    fn fast_polling() -> PollingConfig {
        PollingConfig {
            interval_secs: 0,
            idle_interval_secs: 0,
        }
    }

    #[tokio::test]
    async fn registered_sessions_poll_and_stream() {
        let registry = SessionRegistry::default();
        let session_id = Uuid::new_v4();
        let handle = registry.register(
            session_id,
            Arc::new(ScriptedGateway::new()),
            fast_polling(),
        );
        assert_eq!(registry.session_count(), 1);

        let mut stream = handle.open_stream();
        let mut saw_list_event = false;
        for _ in 0..32 {
            let frame = timeout(Duration::from_secs(2), stream.next_frame())
                .await
                .expect("frame arrives")
                .expect("stream open");
            if frame.contains("event: torrent-list-full\n")
                || frame.contains("event: torrent-list-patch\n")
            {
                saw_list_event = true;
                break;
            }
        }
        assert!(saw_list_event, "poll loop should feed the stream");
    }

    #[tokio::test]
    async fn deregistration_stops_the_poll_loop() {
        let registry = SessionRegistry::default();
        let session_id = Uuid::new_v4();
        let gateway = Arc::new(ScriptedGateway::new());
        let handle = registry.register(session_id, Arc::clone(&gateway) as _, fast_polling());

        sleep(Duration::from_millis(50)).await;
        assert!(gateway.polls.load(Ordering::SeqCst) > 0);

        assert!(registry.deregister(session_id));
        assert_eq!(registry.session_count(), 0);
        drop(handle);

        sleep(Duration::from_millis(20)).await;
        let after = gateway.polls.load(Ordering::SeqCst);
        sleep(Duration::from_millis(50)).await;
        assert_eq!(gateway.polls.load(Ordering::SeqCst), after);
    }

    #[tokio::test]
    async fn side_channel_state_reaches_viewers() {
        let registry = SessionRegistry::default();
        let handle = registry.register(
            Uuid::new_v4(),
            Arc::new(ScriptedGateway::new()),
            PollingConfig {
                interval_secs: 3_600,
                idle_interval_secs: 3_600,
            },
        );

        let mut stream = handle.open_stream();
        // Drain the seven connect-time fulls.
        for _ in 0..7 {
            loop {
                let frame = timeout(Duration::from_secs(1), stream.next_frame())
                    .await
                    .expect("frame arrives")
                    .expect("stream open");
                if !frame.starts_with(':') {
                    break;
                }
            }
        }

        sleep(Duration::from_millis(10)).await;
        handle.publish_notification_count(5, 2);
        loop {
            let frame = timeout(Duration::from_secs(1), stream.next_frame())
                .await
                .expect("frame arrives")
                .expect("stream open");
            if frame.contains("event: notification-count-changed\n") {
                assert!(frame.contains("\"total\":5"));
                assert!(frame.contains("\"unread\":2"));
                break;
            }
        }
    }
}
