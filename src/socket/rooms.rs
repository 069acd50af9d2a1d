//! Live connections and the rooms they belong to.

use std::collections::HashSet;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Room, ServerEvent};
use crate::socket::adapter::RoomEnvelope;

/// Outbound text frames for one socket, drained by its writer task.
pub type ConnectionSender = mpsc::UnboundedSender<String>;

/// Generate a unique socket/connection id.
pub fn generate_socket_id() -> String {
    format!("{}.{}", std::process::id(), Uuid::new_v4().as_simple())
}

struct ConnectionEntry {
    sender: ConnectionSender,
    rooms: HashSet<String>,
}

struct Fanout {
    node_id: String,
    tx: mpsc::UnboundedSender<RoomEnvelope>,
}

/// Room membership as a view over live connections: a room exists while it
/// has members and disappears with its last one.
///
/// Emitting is synchronous. When it returns, the frame is queued on every
/// member's writer, so frames sent to one room arrive in emission order.
pub struct RoomRegistry {
    connections: DashMap<String, ConnectionEntry>,
    rooms: DashMap<String, HashSet<String>>,
    fanout: Option<Fanout>,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    /// Registry for a single process.
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
            fanout: None,
        }
    }

    /// Registry that also hands every room emission to the cluster adapter.
    pub fn with_fanout(node_id: impl Into<String>, tx: mpsc::UnboundedSender<RoomEnvelope>) -> Self {
        Self {
            fanout: Some(Fanout {
                node_id: node_id.into(),
                tx,
            }),
            ..Self::new()
        }
    }

    pub fn node_id(&self) -> Option<&str> {
        self.fanout.as_ref().map(|f| f.node_id.as_str())
    }

    pub fn register(&self, socket_id: &str, sender: ConnectionSender) {
        self.connections.insert(
            socket_id.to_string(),
            ConnectionEntry {
                sender,
                rooms: HashSet::new(),
            },
        );
    }

    /// Add a live connection to a room. Joining twice is a no-op.
    pub fn join(&self, socket_id: &str, room: &Room) -> bool {
        let key = room.key();
        let Some(mut entry) = self.connections.get_mut(socket_id) else {
            return false;
        };
        if !entry.rooms.insert(key.clone()) {
            return true;
        }
        drop(entry);
        self.rooms
            .entry(key.clone())
            .or_default()
            .insert(socket_id.to_string());
        debug!(socket_id = %socket_id, room = %key, "joined room");
        true
    }

    pub fn leave(&self, socket_id: &str, room: &Room) {
        let key = room.key();
        if let Some(mut entry) = self.connections.get_mut(socket_id) {
            entry.rooms.remove(&key);
        }
        self.forget_member(&key, socket_id);
    }

    /// Drop a connection and its memberships. Returns how many rooms it was in.
    pub fn remove(&self, socket_id: &str) -> usize {
        let Some((_, entry)) = self.connections.remove(socket_id) else {
            return 0;
        };
        for key in &entry.rooms {
            self.forget_member(key, socket_id);
        }
        entry.rooms.len()
    }

    fn forget_member(&self, key: &str, socket_id: &str) {
        if let Some(mut members) = self.rooms.get_mut(key) {
            members.remove(socket_id);
        }
        self.rooms.remove_if(key, |_, members| members.is_empty());
    }

    /// Send to one connection.
    pub fn send_to(&self, socket_id: &str, event: &ServerEvent) -> bool {
        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(event = event.name(), error = %e, "could not encode frame");
                return false;
            }
        };
        self.connections
            .get(socket_id)
            .map(|entry| entry.sender.send(frame).is_ok())
            .unwrap_or(false)
    }

    /// Emit to every member of `room`, on this node and, with fanout, on
    /// every other node. Returns local deliveries; an empty room drops the
    /// event.
    pub fn emit(&self, room: &Room, event: &ServerEvent) -> usize {
        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(event = event.name(), error = %e, "could not encode frame");
                return 0;
            }
        };
        let key = room.key();
        if let Some(fanout) = &self.fanout {
            let envelope = RoomEnvelope {
                node_id: fanout.node_id.clone(),
                room: key.clone(),
                frame: frame.clone(),
            };
            if fanout.tx.send(envelope).is_err() {
                warn!(room = %key, "cluster fanout queue closed");
            }
        }
        let delivered = self.emit_local(&key, &frame);
        debug!(room = %key, event = event.name(), delivered, "emitted");
        delivered
    }

    /// Deliver an encoded frame to members connected to this node only.
    pub fn emit_local(&self, room_key: &str, frame: &str) -> usize {
        let Some(members) = self.rooms.get(room_key) else {
            return 0;
        };
        let mut delivered = 0;
        for socket_id in members.iter() {
            if let Some(entry) = self.connections.get(socket_id) {
                if entry.sender.send(frame.to_string()).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    pub fn room_size(&self, room: &Room) -> usize {
        self.rooms.get(&room.key()).map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_member(&self, socket_id: &str, room: &Room) -> bool {
        self.connections
            .get(socket_id)
            .map(|entry| entry.rooms.contains(&room.key()))
            .unwrap_or(false)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
