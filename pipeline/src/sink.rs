use crate::auth::TokenProvider;
use crate::config::HttpSinkConfig;
use crate::errors::SinkError;
use crate::metrics_defs::{SINK_BATCH_FAILED, SINK_BATCHES};
use async_trait::async_trait;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use shared::counter;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

const NDJSON: &str = "application/x-ndjson";

/// Downstream destination for flattened event lines.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, line: String) -> Result<(), SinkError>;

    /// Pushes out anything buffered.
    async fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Flushes and releases the sink. Called once on shutdown; later emits
    /// may fail.
    async fn close(&self) -> Result<(), SinkError> {
        self.flush().await
    }
}

/// Writes every line as an info-level log record.
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn emit(&self, line: String) -> Result<(), SinkError> {
        tracing::info!(target: "telemetry", record = %line, "event published");
        Ok(())
    }
}

/// Writes newline-terminated lines to any async writer.
pub struct WriterSink<W> {
    writer: Mutex<W>,
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        WriterSink {
            writer: Mutex::new(writer),
        }
    }

    pub async fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl WriterSink<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl WriterSink<tokio::fs::File> {
    /// Opens `path` for appending, creating it if needed.
    pub async fn append_to(path: &Path) -> Result<Self, SinkError> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self::new(file))
    }
}

#[async_trait]
impl<W> EventSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn emit(&self, line: String) -> Result<(), SinkError> {
        let mut buf = line.into_bytes();
        buf.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&buf).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        self.writer.lock().await.flush().await?;
        Ok(())
    }
}

enum BatchCommand {
    Line(String),
    Flush(oneshot::Sender<()>),
    Close(oneshot::Sender<()>),
}

/// Posts lines in NDJSON batches. A batch goes out when it is full, when the
/// flush interval elapses, on [`EventSink::flush`] and on [`EventSink::close`].
/// Delivery failures are logged and counted, the batch is not retried.
pub struct HttpSink {
    tx: mpsc::Sender<BatchCommand>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HttpSink {
    pub fn new(
        config: &HttpSinkConfig,
        tokens: Option<Arc<dyn TokenProvider>>,
    ) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let (tx, rx) = mpsc::channel(config.batch_size * 2);
        let batcher = Batcher {
            client,
            url: config.url.clone(),
            audience: config.audience.clone(),
            tokens,
            batch_size: config.batch_size,
            lines: Vec::with_capacity(config.batch_size),
        };
        let flush_interval = Duration::from_millis(config.flush_interval_ms);
        let task = tokio::spawn(batcher.run(rx, flush_interval));

        Ok(HttpSink {
            tx,
            task: Mutex::new(Some(task)),
        })
    }

    async fn request<C>(&self, command: C) -> Result<(), SinkError>
    where
        C: FnOnce(oneshot::Sender<()>) -> BatchCommand,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(command(reply_tx))
            .await
            .map_err(|_| SinkError::Closed)?;
        reply_rx.await.map_err(|_| SinkError::Closed)
    }
}

#[async_trait]
impl EventSink for HttpSink {
    async fn emit(&self, line: String) -> Result<(), SinkError> {
        self.tx
            .send(BatchCommand::Line(line))
            .await
            .map_err(|_| SinkError::Closed)
    }

    async fn flush(&self) -> Result<(), SinkError> {
        self.request(BatchCommand::Flush).await
    }

    /// Sends the last batch and waits for the batcher task to exit.
    async fn close(&self) -> Result<(), SinkError> {
        self.request(BatchCommand::Close).await?;
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "http sink batcher failed");
            }
        }
        Ok(())
    }
}

struct Batcher {
    client: reqwest::Client,
    url: url::Url,
    audience: String,
    tokens: Option<Arc<dyn TokenProvider>>,
    batch_size: usize,
    lines: Vec<String>,
}

impl Batcher {
    async fn run(mut self, mut rx: mpsc::Receiver<BatchCommand>, flush_interval: Duration) {
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(BatchCommand::Line(line)) => {
                        self.lines.push(line);
                        if self.lines.len() >= self.batch_size {
                            self.send_batch().await;
                        }
                    }
                    Some(BatchCommand::Flush(reply)) => {
                        self.send_batch().await;
                        let _ = reply.send(());
                    }
                    Some(BatchCommand::Close(reply)) => {
                        self.send_batch().await;
                        let _ = reply.send(());
                        return;
                    }
                    None => {
                        self.send_batch().await;
                        return;
                    }
                },
                _ = ticker.tick() => self.send_batch().await,
            }
        }
    }

    async fn send_batch(&mut self) {
        if self.lines.is_empty() {
            return;
        }
        let lines = std::mem::take(&mut self.lines);
        let count = lines.len();

        match self.post(lines.join("\n")).await {
            Ok(()) => {
                counter!(SINK_BATCHES).increment(1);
                tracing::debug!(url = %self.url, count, "batch delivered");
            }
            Err(e) => {
                counter!(SINK_BATCH_FAILED).increment(1);
                tracing::error!(url = %self.url, count, error = %e, "failed to deliver batch");
            }
        }
    }

    async fn post(&self, body: String) -> Result<(), SinkError> {
        let mut request = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, NDJSON)
            .body(body);

        if let Some(tokens) = &self.tokens {
            let token = tokens.token(&self.audience).await?;
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SinkError::UpstreamStatus(response.status()));
        }
        Ok(())
    }
}
