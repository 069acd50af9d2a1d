//! Data models for channels, identities, rooms and events.

pub mod channel;
pub mod event;
pub mod identity;
pub mod order;
pub mod room;

pub use channel::Channel;
pub use event::*;
pub use identity::{Identity, Role};
pub use order::*;
pub use room::Room;
