//! Acknowledge dispatch.

use std::sync::Arc;

use crate::coordination::{AcknowledgeCoordinator, RelayError};
use crate::model::{AcknowledgeRequest, OriginId};
use crate::subscription::{handler, Subscription};
use crate::transport::ServerTransport;

/// Routes a connector's acknowledge to the origin holding its acknowledge state.
pub struct AcknowledgeDispatcher {
    origin_id: OriginId,
    shortcut_enabled: bool,
    coordinator: Arc<AcknowledgeCoordinator>,
    server_transport: Arc<dyn ServerTransport>,
    _subscription: Subscription,
}

impl AcknowledgeDispatcher {
    /// Also subscribes the coordinator to acknowledgements arriving over the transport.
    pub fn new(
        origin_id: OriginId,
        shortcut_enabled: bool,
        coordinator: Arc<AcknowledgeCoordinator>,
        server_transport: Arc<dyn ServerTransport>,
    ) -> Self {
        let target = coordinator.clone();
        let subscription = server_transport.subscribe_acknowledges(handler(move |request: AcknowledgeRequest| {
            let target = target.clone();
            async move {
                if let Err(e) = target.process_acknowledge(&request).await {
                    tracing::warn!(request_id = %request.request_id, error = %e, "Failed to process acknowledge");
                }
            }
        }));

        Self {
            origin_id,
            shortcut_enabled,
            coordinator,
            server_transport,
            _subscription: subscription,
        }
    }

    pub async fn dispatch(&self, request: AcknowledgeRequest) -> Result<(), RelayError> {
        if self.shortcut_enabled && request.origin_id == self.origin_id {
            tracing::debug!(request_id = %request.request_id, "Acknowledge shortcut to local coordinator");
            self.coordinator.process_acknowledge(&request).await?;
            return Ok(());
        }

        tracing::debug!(
            request_id = %request.request_id,
            origin_id = %request.origin_id,
            "Dispatching acknowledge through server transport"
        );
        self.server_transport.dispatch_acknowledge(request).await?;
        Ok(())
    }
}
