//! Pre-emission gating. A gate sees every valid event before it is scrubbed
//! and decides whether it reaches the sink. Skipped events are still
//! acknowledged.

use crate::features::FeatureFlags;
use crate::model::RawEvent;
use async_trait::async_trait;
use std::sync::Arc;

const PURGED_SUFFIX: &str = ".purged";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Emit,
    Skip(&'static str),
}

#[async_trait]
pub trait EventGate: Send + Sync {
    async fn check(&self, event: &RawEvent) -> GateDecision;
}

/// Lets everything through.
pub struct AllowAll;

#[async_trait]
impl EventGate for AllowAll {
    async fn check(&self, _event: &RawEvent) -> GateDecision {
        GateDecision::Emit
    }
}

/// Drops event types ending in `.purged`.
pub struct PurgeEventGate;

#[async_trait]
impl EventGate for PurgeEventGate {
    async fn check(&self, event: &RawEvent) -> GateDecision {
        if event.event_type.ends_with(PURGED_SUFFIX) {
            GateDecision::Skip("purge event")
        } else {
            GateDecision::Emit
        }
    }
}

/// Emits only for tenants that have `flag` turned on. A failed lookup lets
/// the event through.
pub struct TenantFlagGate {
    flags: Arc<dyn FeatureFlags>,
    flag: String,
}

impl TenantFlagGate {
    pub fn new(flags: Arc<dyn FeatureFlags>, flag: impl Into<String>) -> Self {
        TenantFlagGate {
            flags,
            flag: flag.into(),
        }
    }
}

#[async_trait]
impl EventGate for TenantFlagGate {
    async fn check(&self, event: &RawEvent) -> GateDecision {
        match self
            .flags
            .bool_tenant_feature(&self.flag, &event.tenantid)
            .await
        {
            Ok(true) => GateDecision::Emit,
            Ok(false) => GateDecision::Skip("tenant flag disabled"),
            Err(e) => {
                tracing::warn!(
                    flag = %self.flag,
                    tenant_id = %event.tenantid,
                    error = %e,
                    "feature flag lookup failed, emitting event"
                );
                GateDecision::Emit
            }
        }
    }
}

/// Runs gates in order; the first skip wins.
#[derive(Default)]
pub struct GateChain {
    gates: Vec<Box<dyn EventGate>>,
}

impl GateChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, gate: impl EventGate + 'static) -> Self {
        self.gates.push(Box::new(gate));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}

#[async_trait]
impl EventGate for GateChain {
    async fn check(&self, event: &RawEvent) -> GateDecision {
        for gate in &self.gates {
            if let GateDecision::Skip(reason) = gate.check(event).await {
                return GateDecision::Skip(reason);
            }
        }
        GateDecision::Emit
    }
}
