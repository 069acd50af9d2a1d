//! Broker and key-value store: the traits the core depends on and their
//! Redis and in-memory implementations.

pub mod memory_repo;
pub mod redis_repo;

pub use memory_repo::MemoryRepository;
pub use redis_repo::RedisRepository;

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::error::AppResult;

/// Messages buffered per subscription before the forwarder waits.
pub const SUBSCRIPTION_BUFFER: usize = 64;

const RESUBSCRIBE_INITIAL_DELAY: Duration = Duration::from_millis(100);
const RESUBSCRIBE_MAX_DELAY: Duration = Duration::from_secs(5);

/// One message received from a broker channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub channel: String,
    pub payload: String,
}

/// Publish/subscribe transport.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish a serialized payload; returns how many subscribers received it.
    async fn publish(&self, channel: &str, payload: &str) -> AppResult<u64>;

    /// Open a dedicated subscription to `channels`. It lives as long as the
    /// returned [`Subscription`].
    async fn subscribe(&self, channels: &[&str]) -> AppResult<Subscription>;
}

/// Integer counters keyed by string.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn incr(&self, key: &str) -> AppResult<i64>;
    async fn get(&self, key: &str) -> AppResult<i64>;
    async fn del(&self, key: &str) -> AppResult<()>;
}

/// A live broker subscription. Dropping it cancels the forwarding task,
/// which unsubscribes and closes the underlying connection.
pub struct Subscription {
    channels: Vec<String>,
    rx: mpsc::Receiver<BrokerMessage>,
    _guard: DropGuard,
}

impl Subscription {
    /// Wrap the receiving end of a forwarder; `cancel` stops the forwarder.
    pub fn new(
        channels: Vec<String>,
        rx: mpsc::Receiver<BrokerMessage>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            channels,
            rx,
            _guard: cancel.drop_guard(),
        }
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Next message, or `None` once the broker side has closed.
    pub async fn recv(&mut self) -> Option<BrokerMessage> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = BrokerMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Open a replacement for a subscription that ended. Retries with doubling
/// delay, capped at five seconds, until the broker accepts.
pub async fn resubscribe(broker: &dyn Broker, channels: &[&str]) -> Subscription {
    let mut delay = RESUBSCRIBE_INITIAL_DELAY;
    loop {
        tokio::time::sleep(delay).await;
        match broker.subscribe(channels).await {
            Ok(subscription) => {
                info!(channels = ?channels, "resubscribed");
                return subscription;
            }
            Err(e) => warn!(channels = ?channels, error = %e, "resubscribe failed"),
        }
        delay = (delay * 2).min(RESUBSCRIBE_MAX_DELAY);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!(channels = ?self.channels, "subscription dropped");
    }
}
