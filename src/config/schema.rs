//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::model::AcknowledgeMode;

/// Root configuration for the relay server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Relay behavior consumed by the core.
    pub relay: RelaySettings,

    /// Which transport connects relay instances.
    pub transport: TransportConfig,

    /// Where outsourced bodies live.
    pub body_store: BodyStoreConfig,

    /// Origin lifecycle settings.
    pub origin: OriginConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Tenants allowed to relay.
    pub tenants: Vec<TenantConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Relay behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Deliver responses and acknowledgements for the local origin without the transport.
    pub enable_server_transport_shortcut: bool,

    /// Bodies above this many bytes go to the body store instead of the message.
    pub maximum_binary_size: u64,

    /// How long an HTTP call waits for its response.
    pub request_timeout_secs: u64,

    /// Largest accepted request body.
    pub max_request_body_size: usize,

    /// Acknowledge mode for tenants that do not set one.
    pub default_acknowledge_mode: AcknowledgeMode,

    /// Waiting and acknowledge states older than this are swept.
    pub state_expiry_secs: u64,

    /// How often the sweep runs.
    pub housekeeping_interval_secs: u64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            enable_server_transport_shortcut: true,
            maximum_binary_size: 65_536,
            request_timeout_secs: 100,
            max_request_body_size: 10 * 1024 * 1024,
            default_acknowledge_mode: AcknowledgeMode::ConnectorReceived,
            state_expiry_secs: 600,
            housekeeping_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Single instance; requests go straight to local connectors.
    #[default]
    InProcess,
    /// Message broker shared by all instances.
    Broker,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BodyStoreKind {
    #[default]
    Memory,
    File,
}

/// Body store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BodyStoreConfig {
    pub kind: BodyStoreKind,

    /// Root directory of the file store. Checked for create/read/write/delete at startup.
    pub storage_path: String,
}

impl Default for BodyStoreConfig {
    fn default() -> Self {
        Self {
            kind: BodyStoreKind::Memory,
            storage_path: "./relay-bodies".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    /// How often the origin's last-seen time is refreshed.
    pub heartbeat_interval_secs: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// A tenant allowed to relay.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TenantConfig {
    pub name: String,

    /// Overrides `relay.default_acknowledge_mode`.
    #[serde(default)]
    pub acknowledge_mode: Option<AcknowledgeMode>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: RelayConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.relay.maximum_binary_size, 65_536);
        assert!(config.relay.enable_server_transport_shortcut);
        assert_eq!(config.transport.kind, TransportKind::InProcess);
        assert!(config.tenants.is_empty());
    }

    #[test]
    fn test_full_config_parses() {
        let config: RelayConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [relay]
            enable_server_transport_shortcut = false
            maximum_binary_size = 1024
            default_acknowledge_mode = "Manual"

            [transport]
            kind = "broker"

            [body_store]
            kind = "file"
            storage_path = "/var/lib/relay"

            [observability]
            log_format = "json"

            [[tenants]]
            name = "acme"
            acknowledge_mode = "Disabled"

            [[tenants]]
            name = "globex"
            "#,
        )
        .unwrap();

        assert!(!config.relay.enable_server_transport_shortcut);
        assert_eq!(config.relay.default_acknowledge_mode, AcknowledgeMode::Manual);
        assert_eq!(config.transport.kind, TransportKind::Broker);
        assert_eq!(config.body_store.kind, BodyStoreKind::File);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.tenants[0].acknowledge_mode, Some(AcknowledgeMode::Disabled));
        assert_eq!(config.tenants[1].acknowledge_mode, None);
    }
}
