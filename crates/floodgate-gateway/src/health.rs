//! Connection-health state machine wrapping any gateway.
//!
//! The monitor decorates an adapter transparently: every call flows through
//! it, successes reset the failure count, and connectivity failures schedule
//! a single backoff probe timer. Viewers only ever see a boolean connectivity
//! flag, never raw transport errors.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::GatewayResult;
use crate::model::{
    AddTorrentByFileOptions, AddTorrentByUrlOptions, ClientSettings, ClientSettingsPatch,
    ContentPriority, MoveTorrentsOptions, TorrentContent, TorrentHash, TorrentListSnapshot,
    TorrentPeer, TorrentTracker, TransferPriority, TransferSummary,
};
use crate::service::ClientGateway;

/// Backoff configuration for the retry timer.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Base delay; the n-th consecutive failure waits `base_interval * n`.
    pub base_interval: Duration,
}

impl RetryPolicy {
    /// Delay before the probe following the n-th consecutive failure.
    #[must_use]
    pub fn delay_for(&self, error_count: u32) -> Duration {
        self.base_interval * error_count.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(5),
        }
    }
}

struct HealthState {
    error_count: u32,
    retry_timer: Option<JoinHandle<()>>,
}

/// Transparent connection-health decorator around a gateway.
///
/// One instance per adapter; the monitor owns the only pending retry timer
/// and replaces it whenever a new failure arrives.
#[derive(Clone)]
pub struct GatewayMonitor {
    inner: Arc<dyn ClientGateway>,
    policy: RetryPolicy,
    state: Arc<Mutex<HealthState>>,
    connectivity: Arc<watch::Sender<bool>>,
}

impl GatewayMonitor {
    /// Wrap `inner` with a fresh monitor starting in the connected state.
    #[must_use]
    pub fn new(inner: Arc<dyn ClientGateway>, policy: RetryPolicy) -> Self {
        let (tx, _) = watch::channel(true);
        Self {
            inner,
            policy,
            state: Arc::new(Mutex::new(HealthState {
                error_count: 0,
                retry_timer: None,
            })),
            connectivity: Arc::new(tx),
        }
    }

    /// Subscribe to connectivity transitions.
    ///
    /// The channel only observes actual transitions: `false` exactly once on
    /// entering the retrying state, `true` exactly once on reconnect.
    #[must_use]
    pub fn connectivity(&self) -> watch::Receiver<bool> {
        self.connectivity.subscribe()
    }

    /// Current consecutive-failure count.
    ///
    /// # Panics
    ///
    /// Panics if the health state mutex has been poisoned.
    #[must_use]
    pub fn error_count(&self) -> u32 {
        self.state.lock().expect("health state mutex poisoned").error_count
    }

    /// Whether the monitor is currently in the retrying state.
    #[must_use]
    pub fn is_retrying(&self) -> bool {
        self.error_count() > 0
    }

    async fn observe<T, F>(&self, call: F) -> GatewayResult<T>
    where
        F: Future<Output = GatewayResult<T>> + Send,
    {
        match call.await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) if err.is_connectivity() => {
                self.record_failure();
                Err(err)
            }
            // Decode and validation failures are surfaced immediately and do
            // not disturb the retry state machine.
            Err(err) => Err(err),
        }
    }

    fn record_success(&self) {
        let mut state = self.state.lock().expect("health state mutex poisoned");
        if state.error_count == 0 {
            return;
        }
        state.error_count = 0;
        if let Some(timer) = state.retry_timer.take() {
            timer.abort();
        }
        drop(state);
        debug!("gateway reconnected");
        self.connectivity.send_replace(true);
    }

    fn record_failure(&self) {
        let attempt;
        {
            let mut state = self.state.lock().expect("health state mutex poisoned");
            state.error_count += 1;
            attempt = state.error_count;
            if let Some(timer) = state.retry_timer.take() {
                timer.abort();
            }
            let monitor = self.clone();
            let delay = self.policy.delay_for(attempt);
            state.retry_timer = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                monitor.run_probe().await;
            }));
        }
        if attempt == 1 {
            warn!("gateway connection lost, entering retry state");
            self.connectivity.send_replace(false);
        }
    }

    async fn run_probe(&self) {
        // The firing timer removes its own handle so a concurrent
        // reschedule never aborts a probe already in flight.
        {
            let mut state = self.state.lock().expect("health state mutex poisoned");
            state.retry_timer = None;
        }
        match self.inner.test_gateway().await {
            Ok(()) => self.record_success(),
            Err(err) => {
                debug!(error = %err, "gateway probe failed");
                self.record_failure();
            }
        }
    }
}

#[async_trait]
impl ClientGateway for GatewayMonitor {
    async fn add_torrents_by_file(&self, options: AddTorrentByFileOptions) -> GatewayResult<()> {
        self.observe(self.inner.add_torrents_by_file(options)).await
    }

    async fn add_torrents_by_url(&self, options: AddTorrentByUrlOptions) -> GatewayResult<()> {
        self.observe(self.inner.add_torrents_by_url(options)).await
    }

    async fn remove_torrents(
        &self,
        hashes: Vec<TorrentHash>,
        delete_data: bool,
    ) -> GatewayResult<()> {
        self.observe(self.inner.remove_torrents(hashes, delete_data))
            .await
    }

    async fn start_torrents(&self, hashes: Vec<TorrentHash>) -> GatewayResult<()> {
        self.observe(self.inner.start_torrents(hashes)).await
    }

    async fn stop_torrents(&self, hashes: Vec<TorrentHash>) -> GatewayResult<()> {
        self.observe(self.inner.stop_torrents(hashes)).await
    }

    async fn move_torrents(&self, options: MoveTorrentsOptions) -> GatewayResult<()> {
        self.observe(self.inner.move_torrents(options)).await
    }

    async fn check_torrents(&self, hashes: Vec<TorrentHash>) -> GatewayResult<()> {
        self.observe(self.inner.check_torrents(hashes)).await
    }

    async fn set_torrents_priority(
        &self,
        hashes: Vec<TorrentHash>,
        priority: TransferPriority,
    ) -> GatewayResult<()> {
        self.observe(self.inner.set_torrents_priority(hashes, priority))
            .await
    }

    async fn set_torrents_tags(
        &self,
        hashes: Vec<TorrentHash>,
        tags: Vec<String>,
    ) -> GatewayResult<()> {
        self.observe(self.inner.set_torrents_tags(hashes, tags)).await
    }

    async fn set_torrents_trackers(
        &self,
        hashes: Vec<TorrentHash>,
        trackers: Vec<String>,
    ) -> GatewayResult<()> {
        self.observe(self.inner.set_torrents_trackers(hashes, trackers))
            .await
    }

    async fn set_torrent_contents_priority(
        &self,
        hash: TorrentHash,
        indices: Vec<u32>,
        priority: ContentPriority,
    ) -> GatewayResult<()> {
        self.observe(
            self.inner
                .set_torrent_contents_priority(hash, indices, priority),
        )
        .await
    }

    async fn get_torrent_contents(&self, hash: TorrentHash) -> GatewayResult<Vec<TorrentContent>> {
        self.observe(self.inner.get_torrent_contents(hash)).await
    }

    async fn get_torrent_peers(&self, hash: TorrentHash) -> GatewayResult<Vec<TorrentPeer>> {
        self.observe(self.inner.get_torrent_peers(hash)).await
    }

    async fn get_torrent_trackers(&self, hash: TorrentHash) -> GatewayResult<Vec<TorrentTracker>> {
        self.observe(self.inner.get_torrent_trackers(hash)).await
    }

    async fn fetch_torrent_list(&self) -> GatewayResult<TorrentListSnapshot> {
        self.observe(self.inner.fetch_torrent_list()).await
    }

    async fn fetch_transfer_summary(&self) -> GatewayResult<TransferSummary> {
        self.observe(self.inner.fetch_transfer_summary()).await
    }

    async fn get_client_settings(&self) -> GatewayResult<ClientSettings> {
        self.observe(self.inner.get_client_settings()).await
    }

    async fn set_client_settings(&self, patch: ClientSettingsPatch) -> GatewayResult<()> {
        self.observe(self.inner.set_client_settings(patch)).await
    }

    async fn test_gateway(&self) -> GatewayResult<()> {
        self.observe(self.inner.test_gateway()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Gateway whose probe fails until `allow_after` attempts have happened.
    struct FlakyGateway {
        calls: AtomicU32,
        allow_after: u32,
    }

    impl FlakyGateway {
        fn new(allow_after: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                allow_after,
            }
        }

        fn attempt(&self) -> GatewayResult<()> {
            let seen = self.calls.fetch_add(1, Ordering::SeqCst);
            if seen < self.allow_after {
                Err(GatewayError::connectivity(
                    "test_gateway",
                    io::Error::other("connection refused"),
                ))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ClientGateway for FlakyGateway {
        async fn add_torrents_by_file(
            &self,
            _options: AddTorrentByFileOptions,
        ) -> GatewayResult<()> {
            self.attempt()
        }

        async fn add_torrents_by_url(&self, _options: AddTorrentByUrlOptions) -> GatewayResult<()> {
            self.attempt()
        }

        async fn remove_torrents(
            &self,
            _hashes: Vec<TorrentHash>,
            _delete_data: bool,
        ) -> GatewayResult<()> {
            self.attempt()
        }

        async fn start_torrents(&self, _hashes: Vec<TorrentHash>) -> GatewayResult<()> {
            self.attempt()
        }

        async fn stop_torrents(&self, _hashes: Vec<TorrentHash>) -> GatewayResult<()> {
            self.attempt()
        }

        async fn move_torrents(&self, _options: MoveTorrentsOptions) -> GatewayResult<()> {
            self.attempt()
        }

        async fn check_torrents(&self, _hashes: Vec<TorrentHash>) -> GatewayResult<()> {
            self.attempt()
        }

        async fn set_torrents_priority(
            &self,
            _hashes: Vec<TorrentHash>,
            _priority: TransferPriority,
        ) -> GatewayResult<()> {
            self.attempt()
        }

        async fn set_torrents_tags(
            &self,
            _hashes: Vec<TorrentHash>,
            _tags: Vec<String>,
        ) -> GatewayResult<()> {
            self.attempt()
        }

        async fn set_torrent_contents_priority(
            &self,
            _hash: TorrentHash,
            _indices: Vec<u32>,
            _priority: ContentPriority,
        ) -> GatewayResult<()> {
            self.attempt()
        }

        async fn get_torrent_contents(
            &self,
            _hash: TorrentHash,
        ) -> GatewayResult<Vec<TorrentContent>> {
            self.attempt().map(|()| Vec::new())
        }

        async fn get_torrent_trackers(
            &self,
            _hash: TorrentHash,
        ) -> GatewayResult<Vec<TorrentTracker>> {
            self.attempt().map(|()| Vec::new())
        }

        async fn fetch_torrent_list(&self) -> GatewayResult<TorrentListSnapshot> {
            self.attempt().map(|()| TorrentListSnapshot::default())
        }

        async fn fetch_transfer_summary(&self) -> GatewayResult<TransferSummary> {
            self.attempt().map(|()| TransferSummary::default())
        }

        async fn get_client_settings(&self) -> GatewayResult<ClientSettings> {
            self.attempt().map(|()| ClientSettings::default())
        }

        async fn set_client_settings(&self, _patch: ClientSettingsPatch) -> GatewayResult<()> {
            self.attempt()
        }

        async fn test_gateway(&self) -> GatewayResult<()> {
            self.attempt()
        }
    }

    fn slow_policy() -> RetryPolicy {
        // Long enough that no probe fires during the test body.
        RetryPolicy {
            base_interval: Duration::from_secs(600),
        }
    }

    #[tokio::test]
    async fn three_failures_reach_retrying_three() {
        let monitor = GatewayMonitor::new(Arc::new(FlakyGateway::new(u32::MAX)), slow_policy());
        for _ in 0..3 {
            let result = monitor.fetch_torrent_list().await;
            assert!(result.is_err());
        }
        assert_eq!(monitor.error_count(), 3);
        assert!(monitor.is_retrying());
    }

    #[test]
    fn backoff_delay_grows_with_failures() {
        let policy = RetryPolicy {
            base_interval: Duration::from_millis(250),
        };
        assert!(policy.delay_for(3) > policy.delay_for(1));
        assert_eq!(policy.delay_for(2), Duration::from_millis(500));
        // A zero count still waits at least one base interval.
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn disconnect_emits_false_exactly_once() {
        let monitor = GatewayMonitor::new(Arc::new(FlakyGateway::new(u32::MAX)), slow_policy());
        let mut connectivity = monitor.connectivity();

        for _ in 0..3 {
            let _ = monitor.start_torrents(vec!["abc".into()]).await;
        }

        connectivity.changed().await.expect("sender alive");
        assert!(!*connectivity.borrow_and_update());
        // Subsequent failures do not re-emit.
        assert!(!connectivity.has_changed().expect("sender alive"));
    }

    #[tokio::test]
    async fn probe_success_resets_and_emits_true_once() {
        // First call fails, every later call (the probe) succeeds.
        let monitor = GatewayMonitor::new(
            Arc::new(FlakyGateway::new(1)),
            RetryPolicy {
                base_interval: Duration::from_millis(10),
            },
        );
        let mut connectivity = monitor.connectivity();

        let _ = monitor.fetch_transfer_summary().await;
        assert_eq!(monitor.error_count(), 1);

        connectivity.changed().await.expect("sender alive");
        assert!(!*connectivity.borrow_and_update());

        connectivity.changed().await.expect("sender alive");
        assert!(*connectivity.borrow_and_update());
        assert_eq!(monitor.error_count(), 0);
        assert!(!connectivity.has_changed().expect("sender alive"));
    }

    #[tokio::test]
    async fn ordinary_success_restores_connected_state() {
        // One failing call, then ordinary calls succeed before any probe.
        let monitor = GatewayMonitor::new(Arc::new(FlakyGateway::new(1)), slow_policy());

        let _ = monitor.fetch_torrent_list().await;
        assert_eq!(monitor.error_count(), 1);

        monitor
            .fetch_torrent_list()
            .await
            .expect("second call succeeds");
        assert_eq!(monitor.error_count(), 0);
        assert!(*monitor.connectivity().borrow());
    }

    #[tokio::test]
    async fn validation_errors_leave_health_untouched() {
        struct RejectingGateway;

        #[async_trait]
        impl ClientGateway for RejectingGateway {
            async fn add_torrents_by_file(
                &self,
                _options: AddTorrentByFileOptions,
            ) -> GatewayResult<()> {
                Err(GatewayError::validation("no files supplied"))
            }

            async fn add_torrents_by_url(
                &self,
                _options: AddTorrentByUrlOptions,
            ) -> GatewayResult<()> {
                unimplemented!()
            }

            async fn remove_torrents(
                &self,
                _hashes: Vec<TorrentHash>,
                _delete_data: bool,
            ) -> GatewayResult<()> {
                unimplemented!()
            }

            async fn start_torrents(&self, _hashes: Vec<TorrentHash>) -> GatewayResult<()> {
                unimplemented!()
            }

            async fn stop_torrents(&self, _hashes: Vec<TorrentHash>) -> GatewayResult<()> {
                unimplemented!()
            }

            async fn move_torrents(&self, _options: MoveTorrentsOptions) -> GatewayResult<()> {
                unimplemented!()
            }

            async fn check_torrents(&self, _hashes: Vec<TorrentHash>) -> GatewayResult<()> {
                unimplemented!()
            }

            async fn set_torrents_priority(
                &self,
                _hashes: Vec<TorrentHash>,
                _priority: TransferPriority,
            ) -> GatewayResult<()> {
                unimplemented!()
            }

            async fn set_torrents_tags(
                &self,
                _hashes: Vec<TorrentHash>,
                _tags: Vec<String>,
            ) -> GatewayResult<()> {
                unimplemented!()
            }

            async fn set_torrent_contents_priority(
                &self,
                _hash: TorrentHash,
                _indices: Vec<u32>,
                _priority: ContentPriority,
            ) -> GatewayResult<()> {
                unimplemented!()
            }

            async fn get_torrent_contents(
                &self,
                _hash: TorrentHash,
            ) -> GatewayResult<Vec<TorrentContent>> {
                unimplemented!()
            }

            async fn get_torrent_trackers(
                &self,
                _hash: TorrentHash,
            ) -> GatewayResult<Vec<TorrentTracker>> {
                unimplemented!()
            }

            async fn fetch_torrent_list(&self) -> GatewayResult<TorrentListSnapshot> {
                unimplemented!()
            }

            async fn fetch_transfer_summary(&self) -> GatewayResult<TransferSummary> {
                unimplemented!()
            }

            async fn get_client_settings(&self) -> GatewayResult<ClientSettings> {
                unimplemented!()
            }

            async fn set_client_settings(&self, _patch: ClientSettingsPatch) -> GatewayResult<()> {
                unimplemented!()
            }

            async fn test_gateway(&self) -> GatewayResult<()> {
                unimplemented!()
            }
        }

        let monitor = GatewayMonitor::new(Arc::new(RejectingGateway), slow_policy());
        let result = monitor
            .add_torrents_by_file(AddTorrentByFileOptions::default())
            .await;
        assert!(matches!(result, Err(GatewayError::Validation { .. })));
        assert_eq!(monitor.error_count(), 0);
    }
}
