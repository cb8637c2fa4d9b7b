//! Periodic sweep of abandoned correlation states.

use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::coordination::{AcknowledgeCoordinator, ResponseCoordinator};

/// Removes waiting and acknowledge states that outlived `max_age`.
pub struct Housekeeping {
    responses: Arc<ResponseCoordinator>,
    acknowledges: Arc<AcknowledgeCoordinator>,
    interval: Duration,
    max_age: Duration,
}

impl Housekeeping {
    pub fn new(
        responses: Arc<ResponseCoordinator>,
        acknowledges: Arc<AcknowledgeCoordinator>,
        interval: Duration,
        max_age: Duration,
    ) -> Self {
        Self {
            responses,
            acknowledges,
            interval,
            max_age,
        }
    }

    /// Run one sweep. Returns the number of removed states.
    pub async fn sweep(&self) -> usize {
        let responses = self.responses.remove_expired(self.max_age).await;
        let acknowledges = self.acknowledges.remove_expired(self.max_age);
        if responses + acknowledges > 0 {
            tracing::info!(responses, acknowledges, "Removed expired states");
        }
        responses + acknowledges
    }

    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            max_age_secs = self.max_age.as_secs(),
            "Housekeeping starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Housekeeping received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
