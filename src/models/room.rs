//! Socket room names.

use std::fmt;

/// A multiplexing group on the order socket server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    /// Standing mailbox for one identity: `user:<userId>`.
    User(String),
    /// Watchers of one order: `order:<orderId>`.
    Order(String),
    /// Sockets of one restaurant: `restaurant:<restaurantId>`.
    Restaurant(String),
}

impl Room {
    pub fn user(id: impl Into<String>) -> Self {
        Room::User(id.into())
    }

    pub fn order(id: impl Into<String>) -> Self {
        Room::Order(id.into())
    }

    pub fn restaurant(id: impl Into<String>) -> Self {
        Room::Restaurant(id.into())
    }

    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::User(id) => write!(f, "user:{}", id),
            Room::Order(id) => write!(f, "order:{}", id),
            Room::Restaurant(id) => write!(f, "restaurant:{}", id),
        }
    }
}
