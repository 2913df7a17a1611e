//! Per-message processing: parse, validate, gate, scrub, emit, then
//! acknowledge. Every path ends in exactly one acknowledgment; failures are
//! logged and counted, never handed back to the transport.

use crate::formatter;
use crate::gate::{AllowAll, EventGate, GateDecision};
use crate::metrics_defs::{
    EVENTS_ACK_FAILED, EVENTS_EMIT_FAILED, EVENTS_EMITTED, EVENTS_INVALID, EVENTS_MALFORMED,
    EVENTS_RECEIVED, EVENTS_SCRUB_FAILED, EVENTS_SKIPPED, HANDLER_DURATION,
};
use crate::model::RawEvent;
use crate::scrubber::scrub;
use crate::sink::EventSink;
use crate::transport::Message;
use crate::validator::is_valid;
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parse,
    Validate,
    Scrub,
    Emit,
}

impl Stage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Stage::Parse => "parse",
            Stage::Validate => "validate",
            Stage::Scrub => "scrub",
            Stage::Emit => "emit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Emitted,
    Skipped(&'static str),
    FailedAt(Stage),
}

impl Outcome {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Outcome::Emitted => "emitted",
            Outcome::Skipped(_) => "skipped",
            Outcome::FailedAt(stage) => stage.as_str(),
        }
    }
}

/// What happened to one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerReport {
    pub outcome: Outcome,
    pub acked: bool,
}

pub struct EventHandler {
    sink: Arc<dyn EventSink>,
    gate: Arc<dyn EventGate>,
}

impl EventHandler {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        EventHandler {
            sink,
            gate: Arc::new(AllowAll),
        }
    }

    pub fn with_gate(mut self, gate: Arc<dyn EventGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    pub async fn handle(&self, message: &dyn Message) -> HandlerReport {
        let start = Instant::now();
        counter!(EVENTS_RECEIVED).increment(1);

        let outcome = self.process(message).await;

        let acked = match message.ack().await {
            Ok(()) => true,
            Err(e) => {
                counter!(EVENTS_ACK_FAILED).increment(1);
                tracing::error!(
                    subject = message.subject(),
                    outcome = outcome.as_str(),
                    error = %e,
                    "failed to ack event"
                );
                false
            }
        };

        histogram!(HANDLER_DURATION, "outcome" => outcome.as_str())
            .record(start.elapsed().as_secs_f64());
        tracing::debug!(
            subject = message.subject(),
            deliveries = message.delivery_count(),
            outcome = outcome.as_str(),
            acked,
            "event handled"
        );

        HandlerReport { outcome, acked }
    }

    async fn process(&self, message: &dyn Message) -> Outcome {
        let event = match RawEvent::from_slice(message.payload()) {
            Ok(event) => event,
            Err(e) => {
                counter!(EVENTS_MALFORMED).increment(1);
                tracing::info!(
                    subject = message.subject(),
                    error = %e,
                    payload = %String::from_utf8_lossy(message.payload()),
                    "failed to unmarshal event"
                );
                return Outcome::FailedAt(Stage::Parse);
            }
        };

        if !is_valid(&event) {
            counter!(EVENTS_INVALID).increment(1);
            tracing::info!(
                id = %event.id,
                event_type = %event.event_type,
                tenant_id = %event.tenantid,
                time = %event.time,
                "event is not valid"
            );
            return Outcome::FailedAt(Stage::Validate);
        }

        if let GateDecision::Skip(reason) = self.gate.check(&event).await {
            counter!(EVENTS_SKIPPED, "reason" => reason).increment(1);
            tracing::debug!(
                id = %event.id,
                event_type = %event.event_type,
                tenant_id = %event.tenantid,
                reason,
                "event skipped"
            );
            return Outcome::Skipped(reason);
        }

        let id = event.id.clone();
        let scrubbed = match scrub(event) {
            Ok(scrubbed) => scrubbed,
            Err(e) => {
                counter!(EVENTS_SCRUB_FAILED).increment(1);
                tracing::info!(id = %id, error = %e, "failed to scrub event");
                return Outcome::FailedAt(Stage::Scrub);
            }
        };

        match self.sink.emit(formatter::flatten(&scrubbed)).await {
            Ok(()) => {
                counter!(EVENTS_EMITTED).increment(1);
                Outcome::Emitted
            }
            Err(e) => {
                counter!(EVENTS_EMIT_FAILED).increment(1);
                tracing::error!(
                    id = %scrubbed.id,
                    event_type = %scrubbed.event_type,
                    error = %e,
                    "failed to emit event"
                );
                Outcome::FailedAt(Stage::Emit)
            }
        }
    }
}
