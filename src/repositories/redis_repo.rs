//! Redis pub/sub for channel messaging and Redis keys for counters.

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Broker, BrokerMessage, CounterStore, Subscription, SUBSCRIPTION_BUFFER};
use crate::error::AppResult;

/// Redis-backed repository: PUBLISH/SUBSCRIBE for events, INCR/GET/DEL for counters.
///
/// Commands share one [`ConnectionManager`] opened at startup; every
/// subscription gets its own dedicated pub/sub connection.
#[derive(Clone)]
pub struct RedisRepository {
    client: redis::Client,
    commands: ConnectionManager,
}

impl RedisRepository {
    /// Connect to Redis. Fails fast if the server is unreachable.
    pub async fn connect(redis_url: &str) -> AppResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let commands = ConnectionManager::new(client.clone()).await?;
        info!(url = %redis_url, "connected to redis");
        Ok(Self { client, commands })
    }

    fn commands(&self) -> ConnectionManager {
        self.commands.clone()
    }
}

#[async_trait]
impl Broker for RedisRepository {
    async fn publish(&self, channel: &str, payload: &str) -> AppResult<u64> {
        let mut conn = self.commands();
        let count: u64 = conn.publish(channel, payload).await?;
        debug!(channel = %channel, count, "published");
        Ok(count)
    }

    async fn subscribe(&self, channels: &[&str]) -> AppResult<Subscription> {
        let conn = self.client.get_async_connection().await?;
        let mut pubsub = conn.into_pubsub();
        for channel in channels {
            pubsub.subscribe(*channel).await?;
        }
        let names: Vec<String> = channels.iter().map(|c| c.to_string()).collect();
        info!(channels = ?names, "subscribed to redis channels");

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        let keys = names.clone();

        tokio::spawn(async move {
            {
                let mut stream = Box::pin(pubsub.on_message());
                loop {
                    tokio::select! {
                        _ = stop.cancelled() => break,
                        msg = stream.next() => {
                            let Some(msg) = msg else {
                                warn!(channels = ?keys, "redis subscription stream ended");
                                break;
                            };
                            let channel = msg.get_channel_name().to_string();
                            match msg.get_payload::<String>() {
                                Ok(payload) => {
                                    if tx.send(BrokerMessage { channel, payload }).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => warn!(channel = %channel, error = %e, "unreadable redis payload"),
                            }
                        }
                    }
                }
            }
            for key in &keys {
                if let Err(e) = pubsub.unsubscribe(key).await {
                    debug!(channel = %key, error = %e, "unsubscribe failed");
                }
            }
            debug!(channels = ?keys, "redis subscription closed");
        });

        Ok(Subscription::new(names, rx, cancel))
    }
}

#[async_trait]
impl CounterStore for RedisRepository {
    async fn incr(&self, key: &str) -> AppResult<i64> {
        let mut conn = self.commands();
        let value: i64 = conn.incr(key, 1).await?;
        Ok(value)
    }

    async fn get(&self, key: &str) -> AppResult<i64> {
        let mut conn = self.commands();
        let value: Option<i64> = conn.get(key).await?;
        Ok(value.unwrap_or(0))
    }

    async fn del(&self, key: &str) -> AppResult<()> {
        let mut conn = self.commands();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}
