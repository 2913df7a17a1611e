use crate::config::{FeaturesConfig, FlagConfig};
use crate::errors::FeatureError;
use async_trait::async_trait;
use std::collections::HashMap;

/// Tenant-level switch for publishing events at all.
pub const EVENT_INGESTION_FLAG: &str = "usage-telemetry-event-ingestion";

/// Boolean feature flag lookup scoped to a tenant.
#[async_trait]
pub trait FeatureFlags: Send + Sync {
    async fn bool_tenant_feature(&self, flag: &str, tenant_id: &str) -> Result<bool, FeatureError>;
}

/// Flags served straight from configuration. A tenant override wins over the
/// flag's default.
pub struct StaticFeatureFlags {
    flags: HashMap<String, FlagConfig>,
}

impl StaticFeatureFlags {
    pub fn new(flags: HashMap<String, FlagConfig>) -> Self {
        StaticFeatureFlags { flags }
    }

    pub fn from_config(config: &FeaturesConfig) -> Self {
        Self::new(config.flags.clone())
    }
}

#[async_trait]
impl FeatureFlags for StaticFeatureFlags {
    async fn bool_tenant_feature(&self, flag: &str, tenant_id: &str) -> Result<bool, FeatureError> {
        let config = self
            .flags
            .get(flag)
            .ok_or_else(|| FeatureError::UnknownFlag(flag.to_string()))?;

        Ok(config
            .tenants
            .get(tenant_id)
            .copied()
            .unwrap_or(config.default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags() -> StaticFeatureFlags {
        StaticFeatureFlags::new(HashMap::from([(
            EVENT_INGESTION_FLAG.to_string(),
            FlagConfig {
                default: true,
                tenants: HashMap::from([("tenant-off".to_string(), false)]),
            },
        )]))
    }

    #[tokio::test]
    async fn test_tenant_override_and_default() {
        let flags = flags();
        assert!(
            flags
                .bool_tenant_feature(EVENT_INGESTION_FLAG, "tenant-any")
                .await
                .unwrap()
        );
        assert!(
            !flags
                .bool_tenant_feature(EVENT_INGESTION_FLAG, "tenant-off")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_unknown_flag() {
        let err = flags()
            .bool_tenant_feature("nope", "tenant-any")
            .await
            .unwrap_err();
        assert!(matches!(err, FeatureError::UnknownFlag(flag) if flag == "nope"));
    }
}
