//! Order socket server: rooms, commands, the order-bus bridge and the
//! optional cluster fanout.

pub mod adapter;
pub mod bridge;
pub mod handler;
pub mod orders;
pub mod rooms;

pub use adapter::{ClusterAdapter, RoomEnvelope, ROOM_FANOUT_CHANNEL};
pub use handler::orders_socket;
pub use orders::Session;
pub use rooms::RoomRegistry;
