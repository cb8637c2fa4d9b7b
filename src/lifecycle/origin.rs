//! Origin heartbeat.

use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::model::OriginId;
use crate::statistics::StatisticsWriter;

/// Keeps the origin's last-seen time fresh while the instance runs.
pub struct OriginHeartbeat {
    origin_id: OriginId,
    statistics: Arc<dyn StatisticsWriter>,
    interval: Duration,
}

impl OriginHeartbeat {
    pub fn new(origin_id: OriginId, statistics: Arc<dyn StatisticsWriter>, interval: Duration) -> Self {
        Self {
            origin_id,
            statistics,
            interval,
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(origin_id = %self.origin_id, interval_secs = self.interval.as_secs(), "Origin heartbeat starting");

        let mut ticker = time::interval(self.interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.statistics.update_origin_last_seen(self.origin_id).await;
                    tracing::trace!(origin_id = %self.origin_id, "Origin heartbeat");
                }
                _ = shutdown.cancelled() => {
                    tracing::info!(origin_id = %self.origin_id, "Origin heartbeat received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Origin;
    use crate::statistics::MemoryStatistics;

    #[tokio::test]
    async fn test_heartbeat_refreshes_last_seen() {
        let statistics = Arc::new(MemoryStatistics::new());
        let mut origin = Origin::start();
        origin.last_seen_at = 0;
        statistics.set_origin_started(&origin).await;

        let shutdown = CancellationToken::new();
        let heartbeat = OriginHeartbeat::new(origin.id, statistics.clone(), Duration::from_millis(10));
        let task = tokio::spawn(heartbeat.run(shutdown.clone()));

        time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        task.await.unwrap();

        assert!(statistics.origin(origin.id).unwrap().last_seen_at > 0);
    }
}
