//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the body store and the relay core from configuration
//! - Create the Axum router with all handlers
//! - Wire up middleware (tracing, timeout)
//! - Run background tasks (origin heartbeat, housekeeping) next to the listener
//! - Shut the core down once the listener stops

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{any, get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::body_store::{BodyStore, BodyStoreError, FileBodyStore, MemoryBodyStore};
use crate::config::schema::BodyStoreKind;
use crate::config::RelayConfig;
use crate::http::{body, hub, relay, ConnectorHub};
use crate::lifecycle::{Housekeeping, OriginHeartbeat, Shutdown};
use crate::relay::{RelayCore, TransportBackend};
use crate::statistics::{MemoryStatistics, StatisticsWriter};
use crate::tenant::{ConfiguredTenants, TenantLookup};
use crate::transport::TransportError;

/// Errors that prevent the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("body store unavailable: {0}")]
    BodyStore(#[from] BodyStoreError),

    #[error("transport unavailable: {0}")]
    Transport(#[from] TransportError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<RelayCore>,
    pub hub: Arc<ConnectorHub>,
    pub tenants: Arc<dyn TenantLookup>,
    pub shutdown: CancellationToken,
}

/// HTTP server for the relay.
pub struct RelayServer {
    router: Router,
    config: RelayConfig,
    core: Arc<RelayCore>,
    shutdown: Shutdown,
}

impl RelayServer {
    /// Create a server with the body store named in the configuration and
    /// in-memory statistics.
    pub async fn new(config: RelayConfig, backend: TransportBackend, shutdown: Shutdown) -> Result<Self, StartupError> {
        let body_store: Arc<dyn BodyStore> = match config.body_store.kind {
            BodyStoreKind::Memory => Arc::new(MemoryBodyStore::new()),
            BodyStoreKind::File => Arc::new(FileBodyStore::new(&config.body_store.storage_path).await?),
        };
        Self::with_parts(config, backend, body_store, Arc::new(MemoryStatistics::new()), shutdown).await
    }

    /// Create a server with explicit collaborators.
    pub async fn with_parts(
        config: RelayConfig,
        backend: TransportBackend,
        body_store: Arc<dyn BodyStore>,
        statistics: Arc<dyn StatisticsWriter>,
        shutdown: Shutdown,
    ) -> Result<Self, StartupError> {
        let hub = Arc::new(ConnectorHub::new());
        let core = Arc::new(
            RelayCore::start(config.relay.clone(), backend, body_store, statistics, hub.clone()).await?,
        );
        let tenants: Arc<dyn TenantLookup> = Arc::new(ConfiguredTenants::new(
            &config.tenants,
            config.relay.default_acknowledge_mode,
        ));

        let state = AppState {
            core: core.clone(),
            hub,
            tenants,
            shutdown: shutdown.token(),
        };
        let router = Self::build_router(&config, state);

        Ok(Self {
            router,
            config,
            core,
            shutdown,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &RelayConfig, state: AppState) -> Router {
        // The relay handler answers 504 itself; the layer only bounds stuck handlers.
        let timeout = Duration::from_secs(config.relay.request_timeout_secs.saturating_add(10));

        Router::new()
            .route("/relay/{tenant}/{target}", any(relay::relay_handler))
            .route("/relay/{tenant}/{target}/{*path}", any(relay::relay_handler))
            .route("/connector/{tenant}", get(hub::connector_handler))
            .route("/body/request/{request_id}", get(body::fetch_request_body))
            .route("/body/response/{request_id}", post(body::upload_response_body))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(timeout))
            .layer(TraceLayer::new_for_http())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn core(&self) -> &Arc<RelayCore> {
        &self.core
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Run the server until shutdown is triggered.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, origin_id = %self.core.origin_id(), "HTTP server starting");

        let heartbeat = OriginHeartbeat::new(
            self.core.origin_id(),
            self.core.statistics().clone(),
            Duration::from_secs(self.config.origin.heartbeat_interval_secs),
        );
        tokio::spawn(heartbeat.run(self.shutdown.token()));

        let housekeeping = Housekeeping::new(
            self.core.responses().clone(),
            self.core.acknowledges().clone(),
            Duration::from_secs(self.config.relay.housekeeping_interval_secs),
            Duration::from_secs(self.config.relay.state_expiry_secs),
        );
        tokio::spawn(housekeeping.run(self.shutdown.token()));

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let shutdown = self.shutdown.clone();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await;

        self.core.shutdown().await;
        tracing::info!("HTTP server stopped");
        served
    }
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "originId": state.core.origin_id(),
        "connectors": state.core.connectors().connection_count(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TenantConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn server() -> RelayServer {
        let mut config = RelayConfig::default();
        config.tenants.push(TenantConfig {
            name: "acme".into(),
            acknowledge_mode: None,
        });
        RelayServer::new(config, TransportBackend::InProcess, Shutdown::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_origin() {
        let server = server().await;
        let response = server
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["originId"], server.core().origin_id().to_string());
        assert_eq!(health["connectors"], 0);
    }

    #[tokio::test]
    async fn test_relay_status_mapping() {
        let server = server().await;

        let unknown = server
            .router()
            .oneshot(Request::get("/relay/globex/api").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

        let unavailable = server
            .router()
            .oneshot(Request::post("/relay/acme/api/orders").body(Body::from("{}")).unwrap())
            .await
            .unwrap();
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(server.core().responses().is_empty());
    }

    #[tokio::test]
    async fn test_missing_request_body_is_not_found() {
        let server = server().await;
        let response = server
            .router()
            .oneshot(
                Request::get(format!("/body/request/{}", uuid::Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
