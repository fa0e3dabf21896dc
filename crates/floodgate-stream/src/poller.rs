//! Interval-driven poll loop feeding the diff engine.

use std::sync::Arc;

use chrono::Utc;
use floodgate_events::{Event, EventBus};
use floodgate_gateway::health::GatewayMonitor;
use floodgate_gateway::model::{PollingConfig, TransferSample};
use floodgate_gateway::service::ClientGateway;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::session::SharedState;

/// Spawn the poll loop for one session.
///
/// Fetch failures are logged and skipped; the health monitor wrapped around
/// the gateway owns reconnection, so the loop itself never backs off or
/// exits.
pub(crate) fn spawn(
    monitor: GatewayMonitor,
    bus: EventBus,
    shared: Arc<SharedState>,
    polling: PollingConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let interval = if bus.subscriber_count() == 0 {
                polling.idle_interval()
            } else {
                polling.interval()
            };
            tokio::time::sleep(interval).await;

            match monitor.fetch_torrent_list().await {
                Ok(snapshot) => {
                    shared
                        .publisher
                        .lock()
                        .expect("publisher mutex poisoned")
                        .publish_list(snapshot);
                }
                Err(err) => {
                    warn!(error = %err, "torrent list poll failed");
                    continue;
                }
            }

            match monitor.fetch_transfer_summary().await {
                Ok(summary) => {
                    shared
                        .publisher
                        .lock()
                        .expect("publisher mutex poisoned")
                        .publish_summary(summary);
                    let history = {
                        let mut ring = shared.history.lock().expect("history mutex poisoned");
                        ring.push(TransferSample {
                            timestamp: Utc::now().timestamp_millis(),
                            down_rate: summary.down_rate,
                            up_rate: summary.up_rate,
                        });
                        ring.snapshot()
                    };
                    let _ = bus.publish(Event::TransferHistoryFull { history });
                }
                Err(err) => {
                    warn!(error = %err, "transfer summary poll failed");
                }
            }
        }
    })
}
