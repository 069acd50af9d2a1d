//! In-memory broker and counters for single-node deployments and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Broker, BrokerMessage, CounterStore, Subscription, SUBSCRIPTION_BUFFER};
use crate::error::AppResult;

const TOPIC_CAPACITY: usize = 256;

/// Broadcast-channel pub/sub plus a counter map. Cloning shares state.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<String>>>>,
    counters: Arc<RwLock<HashMap<String, i64>>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions on a channel.
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.topics
            .read()
            .await
            .get(channel)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Broker for MemoryRepository {
    async fn publish(&self, channel: &str, payload: &str) -> AppResult<u64> {
        let topics = self.topics.read().await;
        // send() only fails when nobody is listening.
        let count = topics
            .get(channel)
            .and_then(|tx| tx.send(payload.to_string()).ok())
            .unwrap_or(0);
        debug!(channel = %channel, count, "published");
        Ok(count as u64)
    }

    async fn subscribe(&self, channels: &[&str]) -> AppResult<Subscription> {
        let receivers: Vec<(String, broadcast::Receiver<String>)> = {
            let mut topics = self.topics.write().await;
            channels
                .iter()
                .map(|channel| {
                    let tx = topics
                        .entry(channel.to_string())
                        .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0);
                    (channel.to_string(), tx.subscribe())
                })
                .collect()
        };
        let names: Vec<String> = receivers.iter().map(|(c, _)| c.clone()).collect();

        let streams = receivers.into_iter().map(|(channel, rx)| {
            BroadcastStream::new(rx)
                .filter_map(move |item| {
                    let channel = channel.clone();
                    async move {
                        match item {
                            Ok(payload) => Some(BrokerMessage { channel, payload }),
                            Err(e) => {
                                warn!(channel = %channel, error = %e, "subscriber lagged");
                                None
                            }
                        }
                    }
                })
                .boxed()
        });
        let mut merged = futures::stream::select_all(streams);

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    msg = merged.next() => {
                        let Some(msg) = msg else { break };
                        if tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Ok(Subscription::new(names, rx, cancel))
    }
}

#[async_trait]
impl CounterStore for MemoryRepository {
    async fn incr(&self, key: &str) -> AppResult<i64> {
        let mut counters = self.counters.write().await;
        let value = counters.entry(key.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }

    async fn get(&self, key: &str) -> AppResult<i64> {
        Ok(self.counters.read().await.get(key).copied().unwrap_or(0))
    }

    async fn del(&self, key: &str) -> AppResult<()> {
        self.counters.write().await.remove(key);
        Ok(())
    }
}
