//! Metrics definitions for the event pipeline.

use shared::metrics_defs::{MetricDef, MetricType};

pub const EVENTS_RECEIVED: MetricDef = MetricDef {
    name: "events.received",
    metric_type: MetricType::Counter,
    description: "Messages handed to the event handler",
};

pub const EVENTS_MALFORMED: MetricDef = MetricDef {
    name: "events.malformed",
    metric_type: MetricType::Counter,
    description: "Payloads that could not be decoded as a CloudEvent",
};

pub const EVENTS_INVALID: MetricDef = MetricDef {
    name: "events.invalid",
    metric_type: MetricType::Counter,
    description: "Events missing type, time or tenant id",
};

pub const EVENTS_SKIPPED: MetricDef = MetricDef {
    name: "events.skipped",
    metric_type: MetricType::Counter,
    description: "Events suppressed by a gate. Tagged with reason.",
};

pub const EVENTS_SCRUB_FAILED: MetricDef = MetricDef {
    name: "events.scrub_failed",
    metric_type: MetricType::Counter,
    description: "Events whose data attribute is not an object",
};

pub const EVENTS_EMITTED: MetricDef = MetricDef {
    name: "events.emitted",
    metric_type: MetricType::Counter,
    description: "Flattened events accepted by the sink",
};

pub const EVENTS_EMIT_FAILED: MetricDef = MetricDef {
    name: "events.emit_failed",
    metric_type: MetricType::Counter,
    description: "Flattened events the sink refused",
};

pub const EVENTS_ACK_FAILED: MetricDef = MetricDef {
    name: "events.ack_failed",
    metric_type: MetricType::Counter,
    description: "Acknowledgments rejected by the transport",
};

pub const EVENTS_REDELIVERED: MetricDef = MetricDef {
    name: "events.redelivered",
    metric_type: MetricType::Counter,
    description: "Unacknowledged messages queued for another delivery",
};

pub const HANDLER_DURATION: MetricDef = MetricDef {
    name: "handler.duration",
    metric_type: MetricType::Histogram,
    description: "Time spent handling one message in seconds. Tagged with outcome.",
};

pub const HANDLERS_INFLIGHT: MetricDef = MetricDef {
    name: "handlers.inflight",
    metric_type: MetricType::Gauge,
    description: "Number of messages currently being handled",
};

pub const SINK_BATCHES: MetricDef = MetricDef {
    name: "sink.batches",
    metric_type: MetricType::Counter,
    description: "Batches delivered by the HTTP sink",
};

pub const SINK_BATCH_FAILED: MetricDef = MetricDef {
    name: "sink.batch_failed",
    metric_type: MetricType::Counter,
    description: "Batches the HTTP sink could not deliver",
};

pub const ALL_METRICS: &[MetricDef] = &[
    EVENTS_RECEIVED,
    EVENTS_MALFORMED,
    EVENTS_INVALID,
    EVENTS_SKIPPED,
    EVENTS_SCRUB_FAILED,
    EVENTS_EMITTED,
    EVENTS_EMIT_FAILED,
    EVENTS_ACK_FAILED,
    EVENTS_REDELIVERED,
    HANDLER_DURATION,
    HANDLERS_INFLIGHT,
    SINK_BATCHES,
    SINK_BATCH_FAILED,
];
