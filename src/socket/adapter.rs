//! Cross-process room delivery through the broker.
//!
//! Each node publishes its room emissions on [`ROOM_FANOUT_CHANNEL`] and
//! delivers envelopes published by other nodes to its own local members.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::repositories::{resubscribe, Broker};
use crate::socket::rooms::RoomRegistry;

pub const ROOM_FANOUT_CHANNEL: &str = "socket:room-fanout";

/// One room emission as seen by other nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomEnvelope {
    pub node_id: String,
    pub room: String,
    /// Encoded frame, delivered verbatim.
    pub frame: String,
}

/// Running adapter tasks. Dropping the handle leaves them running; call
/// [`ClusterAdapter::shutdown`] to stop.
pub struct ClusterAdapter {
    outbound: JoinHandle<()>,
    inbound: JoinHandle<()>,
}

impl ClusterAdapter {
    /// Subscribe to the fanout channel and start relaying. `outbound` is the
    /// receiving half of the queue given to [`RoomRegistry::with_fanout`];
    /// a single publisher task drains it so one node's emissions keep their order.
    pub async fn spawn(
        broker: Arc<dyn Broker>,
        rooms: Arc<RoomRegistry>,
        mut outbound: mpsc::UnboundedReceiver<RoomEnvelope>,
    ) -> AppResult<Self> {
        let node_id = rooms
            .node_id()
            .map(str::to_string)
            .ok_or_else(|| AppError::Config("room registry was built without fanout".to_string()))?;

        let mut subscription = broker.subscribe(&[ROOM_FANOUT_CHANNEL]).await?;
        info!(node_id = %node_id, "cluster fanout enabled");

        let publisher = broker.clone();
        let outbound = tokio::spawn(async move {
            while let Some(envelope) = outbound.recv().await {
                let body = match serde_json::to_string(&envelope) {
                    Ok(body) => body,
                    Err(e) => {
                        warn!(error = %e, "could not encode room envelope");
                        continue;
                    }
                };
                if let Err(e) = publisher.publish(ROOM_FANOUT_CHANNEL, &body).await {
                    warn!(room = %envelope.room, error = %e, "room fanout publish failed");
                }
            }
        });

        let inbound = tokio::spawn(async move {
            loop {
                while let Some(msg) = subscription.recv().await {
                    match serde_json::from_str::<RoomEnvelope>(&msg.payload) {
                        Ok(envelope) if envelope.node_id == node_id => {}
                        Ok(envelope) => {
                            let delivered = rooms.emit_local(&envelope.room, &envelope.frame);
                            debug!(from = %envelope.node_id, room = %envelope.room, delivered, "remote room emission");
                        }
                        Err(e) => warn!(error = %e, "dropping malformed room envelope"),
                    }
                }
                warn!("cluster fanout subscription ended, resubscribing");
                subscription = resubscribe(broker.as_ref(), &[ROOM_FANOUT_CHANNEL]).await;
            }
        });

        Ok(Self { outbound, inbound })
    }

    pub fn shutdown(self) {
        self.outbound.abort();
        self.inbound.abort();
    }
}
