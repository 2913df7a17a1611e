//! In-process queue group with manual acknowledgment.
//!
//! Consumers sharing a [`QueueGroup`] compete for deliveries. A [`Delivery`]
//! that is dropped without being acknowledged goes back on the queue until it
//! has been delivered `max_deliver` times.

use crate::config::{Messaging, subject_matches};
use crate::errors::{AckError, PublishError};
use crate::metrics_defs::EVENTS_REDELIVERED;
use async_trait::async_trait;
use shared::counter;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, Notify, mpsc};

/// One inbound message as seen by the event handler.
#[async_trait]
pub trait Message: Send + Sync {
    fn subject(&self) -> &str;

    fn payload(&self) -> &[u8];

    /// 1 on first delivery, incremented on every redelivery.
    fn delivery_count(&self) -> u32 {
        1
    }

    async fn ack(&self) -> Result<(), AckError>;
}

#[derive(Debug)]
struct Envelope {
    subject: String,
    payload: Vec<u8>,
    delivery_count: u32,
}

struct Receivers {
    fresh: mpsc::Receiver<Envelope>,
    redelivered: mpsc::UnboundedReceiver<Envelope>,
}

struct GroupInner {
    name: String,
    channels: Vec<String>,
    max_deliver: u32,
    fresh_tx: mpsc::Sender<Envelope>,
    redeliver_tx: mpsc::UnboundedSender<Envelope>,
    receivers: Mutex<Receivers>,
    // Published but not yet acknowledged or given up on.
    pending: AtomicUsize,
    idle: Notify,
}

impl GroupInner {
    fn settle(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

#[derive(Clone)]
pub struct QueueGroup {
    inner: Arc<GroupInner>,
}

impl QueueGroup {
    pub fn new(config: &Messaging) -> Self {
        let (fresh_tx, fresh) = mpsc::channel(config.buffer_size);
        let (redeliver_tx, redelivered) = mpsc::unbounded_channel();

        QueueGroup {
            inner: Arc::new(GroupInner {
                name: config.queue_group.clone(),
                channels: config.channels.clone(),
                max_deliver: config.max_deliver,
                fresh_tx,
                redeliver_tx,
                receivers: Mutex::new(Receivers { fresh, redelivered }),
                pending: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Enqueues a payload. Waits while the queue is full.
    pub async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        if !self
            .inner
            .channels
            .iter()
            .any(|channel| subject_matches(channel, subject))
        {
            return Err(PublishError::NoSubscriber(subject.to_string()));
        }

        // Count the message only once a slot is held, so a cancelled publish
        // leaves `pending` untouched.
        let permit = self
            .inner
            .fresh_tx
            .reserve()
            .await
            .map_err(|_| PublishError::Closed)?;
        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        permit.send(Envelope {
            subject: subject.to_string(),
            payload,
            delivery_count: 1,
        });
        Ok(())
    }

    /// Waits for the next delivery. Redeliveries are served before fresh
    /// messages.
    pub async fn next(&self) -> Option<Delivery> {
        let mut receivers = self.inner.receivers.lock().await;
        let Receivers { fresh, redelivered } = &mut *receivers;

        let envelope = tokio::select! {
            biased;
            Some(envelope) = redelivered.recv() => envelope,
            Some(envelope) = fresh.recv() => envelope,
            else => return None,
        };

        Some(Delivery {
            subject: envelope.subject,
            payload: envelope.payload,
            delivery_count: envelope.delivery_count,
            acked: AtomicBool::new(false),
            group: self.inner.clone(),
        })
    }

    /// Messages published but not yet settled.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Resolves once every published message has been acknowledged or
    /// dropped after its last delivery.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// A message handed out by a [`QueueGroup`].
pub struct Delivery {
    subject: String,
    payload: Vec<u8>,
    delivery_count: u32,
    acked: AtomicBool,
    group: Arc<GroupInner>,
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("queue_group", &self.group.name)
            .field("subject", &self.subject)
            .field("delivery_count", &self.delivery_count)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Message for Delivery {
    fn subject(&self) -> &str {
        &self.subject
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn delivery_count(&self) -> u32 {
        self.delivery_count
    }

    async fn ack(&self) -> Result<(), AckError> {
        if self.acked.swap(true, Ordering::AcqRel) {
            return Err(AckError::AlreadyAcked);
        }
        self.group.settle();
        Ok(())
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if self.acked.load(Ordering::Acquire) {
            return;
        }

        if self.delivery_count >= self.group.max_deliver {
            tracing::warn!(
                queue_group = %self.group.name,
                subject = %self.subject,
                deliveries = self.delivery_count,
                "dropping message after final delivery"
            );
            self.group.settle();
            return;
        }

        let envelope = Envelope {
            subject: std::mem::take(&mut self.subject),
            payload: std::mem::take(&mut self.payload),
            delivery_count: self.delivery_count + 1,
        };
        if self.group.redeliver_tx.send(envelope).is_err() {
            self.group.settle();
            return;
        }
        counter!(EVENTS_REDELIVERED).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn group_with_buffer(max_deliver: u32, buffer_size: usize) -> QueueGroup {
        QueueGroup::new(&Messaging {
            queue_group: "test-group".into(),
            channels: vec!["events".into()],
            buffer_size,
            concurrency: 1,
            max_deliver,
        })
    }

    fn group(max_deliver: u32) -> QueueGroup {
        group_with_buffer(max_deliver, 8)
    }

    #[tokio::test]
    async fn test_publish_and_ack() {
        let group = group(3);
        group.publish("events/apps", b"one".to_vec()).await.unwrap();
        assert_eq!(group.pending(), 1);

        let delivery = group.next().await.unwrap();
        assert_eq!(delivery.subject(), "events/apps");
        assert_eq!(delivery.payload(), b"one");
        assert_eq!(delivery.delivery_count(), 1);

        delivery.ack().await.unwrap();
        assert!(matches!(
            delivery.ack().await.unwrap_err(),
            AckError::AlreadyAcked
        ));
        drop(delivery);

        assert_eq!(group.pending(), 0);
        tokio::time::timeout(Duration::from_secs(1), group.wait_idle())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unsubscribed_subject_is_rejected() {
        let group = group(3);
        let err = group.publish("other", b"x".to_vec()).await.unwrap_err();
        assert!(matches!(err, PublishError::NoSubscriber(subject) if subject == "other"));
        assert_eq!(group.pending(), 0);
    }

    #[tokio::test]
    async fn test_unacked_message_is_redelivered_until_max_deliver() {
        let group = group(2);
        group.publish("events", b"retry-me".to_vec()).await.unwrap();
        group.publish("events", b"second".to_vec()).await.unwrap();

        let first = group.next().await.unwrap();
        assert_eq!(first.payload(), b"retry-me");
        drop(first);

        // The redelivery jumps ahead of the fresh message.
        let again = group.next().await.unwrap();
        assert_eq!(again.payload(), b"retry-me");
        assert_eq!(again.delivery_count(), 2);
        drop(again);

        let second = group.next().await.unwrap();
        assert_eq!(second.payload(), b"second");
        second.ack().await.unwrap();
        drop(second);

        assert_eq!(group.pending(), 0);
    }

    #[tokio::test]
    async fn test_competing_consumers_share_the_queue() {
        let group = group_with_buffer(1, 32);
        for i in 0..20 {
            group.publish("events", vec![i]).await.unwrap();
        }

        let mut consumers = Vec::new();
        for _ in 0..3 {
            let group = group.clone();
            consumers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while group.pending() > 0 {
                    let next = tokio::time::timeout(Duration::from_millis(50), group.next()).await;
                    let Ok(Some(delivery)) = next else { break };
                    seen.push(delivery.payload()[0]);
                    delivery.ack().await.unwrap();
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }
        all.sort();
        assert_eq!(all, (0..20).collect::<Vec<u8>>());
        group.wait_idle().await;
    }

    #[tokio::test]
    async fn test_publish_waits_while_buffer_is_full() {
        let group = group_with_buffer(1, 2);
        group.publish("events", vec![0]).await.unwrap();
        group.publish("events", vec![1]).await.unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            group.publish("events", vec![2]),
        )
        .await;
        assert!(blocked.is_err());
        assert_eq!(group.pending(), 2);

        // Freeing a slot lets the next publish through.
        let delivery = group.next().await.unwrap();
        delivery.ack().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), group.publish("events", vec![3]))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_idle_blocks_until_settled() {
        let group = group(3);
        group.publish("events", b"x".to_vec()).await.unwrap();

        let waiter = {
            let group = group.clone();
            tokio::spawn(async move { group.wait_idle().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        let delivery = group.next().await.unwrap();
        delivery.ack().await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
