use crate::errors::{AckError, SinkError};
use crate::sink::EventSink;
use crate::transport::Message;
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;

/// A log record seen by [`CapturedLogs`].
#[derive(Debug, Clone)]
pub struct LogLine {
    pub level: Level,
    pub message: String,
}

/// Collects log records emitted on the current thread while the returned
/// guard is alive.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    lines: Arc<Mutex<Vec<LogLine>>>,
}

impl CapturedLogs {
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::registry().with(logs.clone());
        let guard = tracing::subscriber::set_default(subscriber);
        (logs, guard)
    }

    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.lock().unwrap().clone()
    }

    pub fn count(&self, level: Level, message: &str) -> usize {
        self.lines()
            .iter()
            .filter(|line| line.level == level && line.message == message)
            .count()
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        self.lines.lock().unwrap().push(LogLine {
            level: *event.metadata().level(),
            message: visitor.0,
        });
    }
}

/// Sink that keeps every line in memory, or refuses all of them.
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
    fail: bool,
}

impl MemorySink {
    pub fn failing() -> Self {
        MemorySink {
            fail: true,
            ..Default::default()
        }
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn emit(&self, line: String) -> Result<(), SinkError> {
        if self.fail {
            return Err(SinkError::Closed);
        }
        self.lines.lock().unwrap().push(line);
        Ok(())
    }
}

/// Message with a fixed payload that counts acknowledgments.
pub struct TestMessage {
    payload: Vec<u8>,
    acks: AtomicUsize,
    fail_ack: bool,
}

impl TestMessage {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        TestMessage {
            payload: payload.into(),
            acks: AtomicUsize::new(0),
            fail_ack: false,
        }
    }

    pub fn failing_ack(payload: impl Into<Vec<u8>>) -> Self {
        TestMessage {
            fail_ack: true,
            ..Self::new(payload)
        }
    }

    pub fn acks(&self) -> usize {
        self.acks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Message for TestMessage {
    fn subject(&self) -> &str {
        "system-events"
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    async fn ack(&self) -> Result<(), AckError> {
        self.acks.fetch_add(1, Ordering::SeqCst);
        if self.fail_ack {
            return Err(AckError::Transport("connection reset".into()));
        }
        Ok(())
    }
}
