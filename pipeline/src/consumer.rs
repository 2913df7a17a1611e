use crate::handler::EventHandler;
use crate::metrics_defs::HANDLERS_INFLIGHT;
use crate::transport::QueueGroup;
use shared::gauge;
use std::sync::Arc;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;

/// Pulls deliveries from a queue group and handles each on its own task,
/// with at most `concurrency` handlers running at once.
pub struct WorkerPool {
    handler: Arc<EventHandler>,
    concurrency: usize,
}

impl WorkerPool {
    pub fn new(handler: Arc<EventHandler>, concurrency: usize) -> Self {
        WorkerPool {
            handler,
            concurrency: concurrency.max(1),
        }
    }

    /// Runs until `shutdown` flips to true or the group closes, then waits for
    /// in-flight handlers to finish. A dropped shutdown sender counts as
    /// shutdown. Returns the number of messages handled.
    pub async fn run(&self, group: QueueGroup, mut shutdown: watch::Receiver<bool>) -> usize {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut handled = 0;

        tracing::info!(
            queue_group = group.name(),
            concurrency = self.concurrency,
            "consumer started"
        );

        loop {
            while let Some(result) = tasks.try_join_next() {
                handled += finished(result);
            }

            if *shutdown.borrow() {
                break;
            }

            let permit = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let delivery = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                delivery = group.next() => match delivery {
                    Some(delivery) => delivery,
                    None => break,
                },
            };

            let handler = self.handler.clone();
            tasks.spawn(async move {
                gauge!(HANDLERS_INFLIGHT).increment(1.0);
                handler.handle(&delivery).await;
                gauge!(HANDLERS_INFLIGHT).decrement(1.0);
                drop(permit);
            });
        }

        tracing::info!(
            queue_group = group.name(),
            inflight = tasks.len(),
            "consumer stopping, draining in-flight handlers"
        );
        while let Some(result) = tasks.join_next().await {
            handled += finished(result);
        }
        tracing::info!(queue_group = group.name(), handled, "consumer stopped");

        handled
    }
}

fn finished(result: Result<(), tokio::task::JoinError>) -> usize {
    match result {
        Ok(()) => 1,
        Err(e) => {
            tracing::error!(error = %e, "event handler task failed");
            0
        }
    }
}
