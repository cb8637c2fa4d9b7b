//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - The body store path is only checked for syntax here; access is verified at startup

use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::{BodyStoreKind, RelayConfig};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is not a valid socket address: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("body_store.storage_path is required for the file body store")]
    MissingStoragePath,

    #[error("tenant name must not be empty")]
    EmptyTenantName,

    #[error("tenant {0} is declared more than once")]
    DuplicateTenant(String),

    #[error("unknown log level {0}")]
    InvalidLogLevel(String),
}

/// Check a parsed configuration.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    let relay = &config.relay;
    for (field, value) in [
        ("relay.request_timeout_secs", relay.request_timeout_secs),
        ("relay.max_request_body_size", relay.max_request_body_size as u64),
        ("relay.state_expiry_secs", relay.state_expiry_secs),
        ("relay.housekeeping_interval_secs", relay.housekeeping_interval_secs),
        ("origin.heartbeat_interval_secs", config.origin.heartbeat_interval_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroValue { field });
        }
    }

    if config.body_store.kind == BodyStoreKind::File && config.body_store.storage_path.trim().is_empty() {
        errors.push(ValidationError::MissingStoragePath);
    }

    let mut seen = HashSet::new();
    for tenant in &config.tenants {
        if tenant.name.trim().is_empty() {
            errors.push(ValidationError::EmptyTenantName);
        } else if !seen.insert(tenant.name.to_lowercase()) {
            errors.push(ValidationError::DuplicateTenant(tenant.name.clone()));
        }
    }

    if !matches!(
        config.observability.log_level.to_lowercase().as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        errors.push(ValidationError::InvalidLogLevel(config.observability.log_level.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TenantConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&RelayConfig::default()), Ok(()));
    }

    #[test]
    fn test_all_errors_are_reported() {
        let mut config = RelayConfig::default();
        config.listener.bind_address = "not-an-address".to_string();
        config.relay.request_timeout_secs = 0;
        config.body_store.kind = BodyStoreKind::File;
        config.body_store.storage_path = " ".to_string();
        config.tenants = vec![
            TenantConfig {
                name: "acme".to_string(),
                acknowledge_mode: None,
            },
            TenantConfig {
                name: "ACME".to_string(),
                acknowledge_mode: None,
            },
        ];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::MissingStoragePath));
        assert!(errors.contains(&ValidationError::DuplicateTenant("ACME".to_string())));
        assert!(errors.contains(&ValidationError::ZeroValue {
            field: "relay.request_timeout_secs"
        }));
    }
}
