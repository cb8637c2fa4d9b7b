//! Tenant resolution for the HTTP boundary.

use std::collections::HashMap;

use crate::config::schema::TenantConfig;
use crate::model::AcknowledgeMode;

/// Per-tenant relay settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantSettings {
    pub name: String,
    pub acknowledge_mode: AcknowledgeMode,
}

/// Resolves tenants by name.
pub trait TenantLookup: Send + Sync {
    fn find(&self, tenant_name: &str) -> Option<TenantSettings>;
}

/// Tenants declared in the configuration file. Names match case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredTenants {
    tenants: HashMap<String, TenantSettings>,
}

impl ConfiguredTenants {
    pub fn new(tenants: &[TenantConfig], default_acknowledge_mode: AcknowledgeMode) -> Self {
        let tenants = tenants
            .iter()
            .map(|tenant| {
                (
                    tenant.name.to_lowercase(),
                    TenantSettings {
                        name: tenant.name.clone(),
                        acknowledge_mode: tenant.acknowledge_mode.unwrap_or(default_acknowledge_mode),
                    },
                )
            })
            .collect();
        Self { tenants }
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}

impl TenantLookup for ConfiguredTenants {
    fn find(&self, tenant_name: &str) -> Option<TenantSettings> {
        self.tenants.get(&tenant_name.to_lowercase()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_is_case_insensitive_and_applies_default_mode() {
        let tenants = ConfiguredTenants::new(
            &[
                TenantConfig {
                    name: "Acme".to_string(),
                    acknowledge_mode: None,
                },
                TenantConfig {
                    name: "globex".to_string(),
                    acknowledge_mode: Some(AcknowledgeMode::Manual),
                },
            ],
            AcknowledgeMode::ConnectorFinished,
        );

        let acme = tenants.find("acme").unwrap();
        assert_eq!(acme.name, "Acme");
        assert_eq!(acme.acknowledge_mode, AcknowledgeMode::ConnectorFinished);
        assert_eq!(tenants.find("GLOBEX").unwrap().acknowledge_mode, AcknowledgeMode::Manual);
        assert!(tenants.find("initech").is_none());
    }
}
