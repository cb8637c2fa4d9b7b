//! Request dispatch with body outsourcing.

use bytes::Bytes;
use std::io::Cursor;
use std::sync::Arc;

use crate::body_store::BodyStore;
use crate::coordination::RelayError;
use crate::model::ClientRequest;
use crate::observability::metrics;
use crate::transport::TenantTransport;

/// Attaches the body to a request and hands it to the tenant transport.
pub struct RequestCoordinator {
    tenant_transport: Arc<dyn TenantTransport>,
    body_store: Arc<dyn BodyStore>,
    maximum_binary_size: u64,
}

impl RequestCoordinator {
    pub fn new(
        tenant_transport: Arc<dyn TenantTransport>,
        body_store: Arc<dyn BodyStore>,
        maximum_binary_size: u64,
    ) -> Self {
        Self {
            tenant_transport,
            body_store,
            maximum_binary_size,
        }
    }

    /// Dispatch a request.
    ///
    /// Bodies larger than the inline threshold go to the body store and the
    /// message only carries their size. A stored body is removed again if the
    /// transport rejects the request.
    pub async fn process_request(&self, mut request: ClientRequest, body: Bytes) -> Result<(), RelayError> {
        let request_id = request.request_id;
        let body_size = body.len() as u64;

        let outsourced = body_size > self.maximum_binary_size;
        if outsourced {
            let stored = self
                .body_store
                .store_request_body(request_id, Box::new(Cursor::new(body)))
                .await?;
            request.body_size = Some(stored);
            request.body_content = None;
            metrics::record_outsourced_body("request");
            tracing::debug!(request_id = %request_id, body_size = stored, "Request body outsourced");
        } else {
            request.body_size = Some(body_size);
            request.body_content = (!body.is_empty()).then_some(body);
        }

        let tenant = request.tenant_name.clone();
        if let Err(e) = self.tenant_transport.transport(request).await {
            tracing::warn!(request_id = %request_id, tenant = %tenant, error = %e, "Request dispatch failed");
            if outsourced {
                if let Err(remove_error) = self.body_store.remove_request_body(request_id).await {
                    tracing::warn!(request_id = %request_id, error = %remove_error, "Failed to remove outsourced request body");
                }
            }
            return Err(e.into());
        }

        metrics::record_request_dispatched(&tenant);
        Ok(())
    }
}
