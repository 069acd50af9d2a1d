//! Broker channel registry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// The closed set of broker channels. Publishers and subscribers agree on
/// these exact strings; anything else is never observed by a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    #[serde(rename = "notifications:new-application")]
    NewApplication,
    #[serde(rename = "notifications:application-update")]
    ApplicationUpdate,
    #[serde(rename = "orders:new-order")]
    NewOrder,
    #[serde(rename = "orders:status-update")]
    OrderStatusUpdate,
    #[serde(rename = "delivery:rider-location")]
    RiderLocation,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::NewApplication,
        Channel::ApplicationUpdate,
        Channel::NewOrder,
        Channel::OrderStatusUpdate,
        Channel::RiderLocation,
    ];

    /// Channels consumed by the admin notification stream.
    pub const APPLICATIONS: [Channel; 2] = [Channel::NewApplication, Channel::ApplicationUpdate];

    /// Channels relayed from backend processes into socket rooms.
    pub const ORDER_BUS: [Channel; 3] = [
        Channel::NewOrder,
        Channel::OrderStatusUpdate,
        Channel::RiderLocation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::NewApplication => "notifications:new-application",
            Channel::ApplicationUpdate => "notifications:application-update",
            Channel::NewOrder => "orders:new-order",
            Channel::OrderStatusUpdate => "orders:status-update",
            Channel::RiderLocation => "delivery:rider-location",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = AppError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|c| c.as_str() == name)
            .ok_or_else(|| AppError::UnknownChannel(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_registered_name() {
        for channel in Channel::ALL {
            assert_eq!(channel.as_str().parse::<Channel>().unwrap(), channel);
        }
    }

    #[test]
    fn rejects_unregistered_name() {
        assert!(matches!(
            "orders:anything".parse::<Channel>(),
            Err(AppError::UnknownChannel(_))
        ));
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&Channel::RiderLocation).unwrap();
        assert_eq!(json, "\"delivery:rider-location\"");
        let back: Channel = serde_json::from_str("\"orders:status-update\"").unwrap();
        assert_eq!(back, Channel::OrderStatusUpdate);
    }
}
