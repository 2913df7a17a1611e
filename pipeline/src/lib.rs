pub mod auth;
pub mod config;
pub mod consumer;
pub mod errors;
pub mod features;
pub mod formatter;
pub mod gate;
pub mod handler;
pub mod metrics_defs;
pub mod model;
pub mod scrubber;
pub mod sink;
pub mod source;
pub mod transport;
pub mod validator;

#[cfg(test)]
mod testutils;

use crate::auth::{FileTokenProvider, TokenProvider};
use crate::config::{Config, SinkConfig};
use crate::consumer::WorkerPool;
use crate::errors::{PipelineError, SinkError};
use crate::features::{EVENT_INGESTION_FLAG, StaticFeatureFlags};
use crate::gate::{GateChain, PurgeEventGate, TenantFlagGate};
use crate::handler::EventHandler;
use crate::sink::{EventSink, HttpSink, LogSink, WriterSink};
use crate::transport::QueueGroup;
use shared::admin_service::AdminService;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpListener;
use tokio::sync::watch;

pub async fn build_sink(
    config: &SinkConfig,
    tokens: Option<Arc<dyn TokenProvider>>,
) -> Result<Arc<dyn EventSink>, SinkError> {
    let sink: Arc<dyn EventSink> = match config {
        SinkConfig::Log => Arc::new(LogSink),
        SinkConfig::Stdout => Arc::new(WriterSink::stdout()),
        SinkConfig::File { path } => Arc::new(WriterSink::append_to(path).await?),
        SinkConfig::Http(http) => Arc::new(HttpSink::new(http, tokens)?),
    };
    Ok(sink)
}

pub fn build_gate(config: &Config) -> GateChain {
    let mut gate = GateChain::new();
    if config.skip_purge_events {
        gate = gate.with(PurgeEventGate);
    }
    if config.features.enabled {
        let flags = Arc::new(StaticFeatureFlags::from_config(&config.features));
        gate = gate.with(TenantFlagGate::new(flags, EVENT_INGESTION_FLAG));
    }
    gate
}

/// Runs the pipeline until the source is exhausted and every message has
/// settled, or until interrupted. In-flight handlers are drained and the sink
/// is closed either way.
pub async fn run(config: Config) -> Result<(), PipelineError> {
    config.validate()?;

    let tokens = config.auth.as_ref().map(|auth| {
        Arc::new(FileTokenProvider::new(auth.token_file.clone())) as Arc<dyn TokenProvider>
    });
    let sink = build_sink(&config.sink, tokens).await?;
    let gate = build_gate(&config);
    let handler = Arc::new(EventHandler::new(sink.clone()).with_gate(Arc::new(gate)));
    let group = QueueGroup::new(&config.messaging);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ready = Arc::new(AtomicBool::new(false));

    let listener = TcpListener::bind(format!(
        "{}:{}",
        config.admin_listener.host, config.admin_listener.port
    ))
    .await?;
    tracing::info!(
        host = %config.admin_listener.host,
        port = config.admin_listener.port,
        "admin listener bound"
    );
    let admin = {
        let ready = ready.clone();
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(shared::http::serve(
            listener,
            AdminService::new(move || ready.load(Ordering::Relaxed)),
            async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            },
        ))
    };

    let consumer = {
        let pool = WorkerPool::new(handler, config.messaging.concurrency);
        let group = group.clone();
        tokio::spawn(async move { pool.run(group, shutdown_rx).await })
    };
    ready.store(true, Ordering::Relaxed);

    let drained = async {
        let published = source::run_source(&config.source, group.clone()).await?;
        group.wait_idle().await;
        Ok::<_, PipelineError>(published)
    };

    let result = tokio::select! {
        drained = drained => drained.map(|published| {
            tracing::info!(published, "all events settled");
        }),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(pending = group.pending(), "interrupted, shutting down");
            Ok(())
        }
    };

    ready.store(false, Ordering::Relaxed);
    let _ = shutdown_tx.send(true);

    match consumer.await {
        Ok(handled) => tracing::info!(handled, "consumer drained"),
        Err(e) => tracing::error!(error = %e, "consumer task failed"),
    }
    if let Err(e) = sink.close().await {
        tracing::error!(error = %e, "failed to close sink");
    }
    match admin.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "admin listener failed"),
        Err(e) => tracing::error!(error = %e, "admin task failed"),
    }

    result
}
