//! Order socket wire protocol.
//!
//! Every frame is a JSON text message `{"event": "<name>", "data": {...}}`.
//! Inbound frames decode into [`ClientCommand`], outbound frames are built
//! from [`ServerEvent`]; both have one variant per event name, so an unknown
//! event or a malformed payload is rejected before any handler runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::identity::Role;

/// Event names on the `/orders` socket.
pub mod events {
    pub const CONNECTED: &str = "connected";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const ORDER_PLACED: &str = "order:placed";
    pub const ORDER_CONFIRMED: &str = "order:confirmed";
    pub const ORDER_NEW: &str = "order:new";
    pub const ORDER_ACCEPT: &str = "order:accept";
    pub const ORDER_ACCEPTED: &str = "order:accepted";
    pub const ORDER_ACTION_CONFIRMED: &str = "order:action_confirmed";
    pub const ORDER_REJECT: &str = "order:reject";
    pub const ORDER_REJECTED: &str = "order:rejected";
    pub const ORDER_UPDATE_STATUS: &str = "order:update_status";
    pub const ORDER_STATUS_UPDATE: &str = "order:status_update";
    pub const ORDER_STATUS_CHANGED: &str = "order:status_changed";
    pub const ORDER_UPDATE_CONFIRMED: &str = "order:update_confirmed";
    pub const ORDER_CANCEL: &str = "order:cancel";
    pub const ORDER_CANCELLED: &str = "order:cancelled";
    pub const DELIVERY_LOCATION_UPDATE: &str = "delivery:location_update";
    pub const DELIVERY_LOCATION: &str = "delivery:location";
    pub const ORDER_ERROR: &str = "order:error";
}

pub const DEFAULT_REJECT_REASON: &str = "Restaurant is unable to accept this order";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Accepted,
    Rejected,
    Preparing,
    Ready,
    OutForDelivery,
    Delivered,
    Cancelled,
}

/// What the acting socket did, echoed back in `order:action_confirmed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderAction {
    Accepted,
    Rejected,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelledBy {
    Customer,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct GeoPoint {
    #[validate(range(min = -90.0, max = 90.0))]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub lng: f64,
}

// ---- Client -> server payloads ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrder {
    #[validate(length(min = 1))]
    pub order_id: String,
    #[validate(length(min = 1))]
    pub restaurant_id: String,
    /// Items, totals, address: carried through to the restaurant untouched.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl PlaceOrder {
    pub fn new(order_id: impl Into<String>, restaurant_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            restaurant_id: restaurant_id.into(),
            details: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AcceptOrder {
    #[validate(length(min = 1))]
    pub order_id: String,
    #[serde(rename = "userId")]
    #[validate(length(min = 1))]
    pub customer_id: String,
    /// Minutes until ready.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RejectOrder {
    #[validate(length(min = 1))]
    pub order_id: String,
    #[serde(rename = "userId")]
    #[validate(length(min = 1))]
    pub customer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatus {
    #[validate(length(min = 1))]
    pub order_id: String,
    #[serde(rename = "userId")]
    #[validate(length(min = 1))]
    pub customer_id: String,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CancelOrder {
    #[validate(length(min = 1))]
    pub order_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    #[validate(length(min = 1))]
    pub order_id: String,
    #[validate(nested)]
    pub location: GeoPoint,
}

/// Inbound socket frame, decoded at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientCommand {
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "order:placed")]
    PlaceOrder(PlaceOrder),
    #[serde(rename = "order:accept")]
    AcceptOrder(AcceptOrder),
    #[serde(rename = "order:reject")]
    RejectOrder(RejectOrder),
    #[serde(rename = "order:update_status")]
    UpdateStatus(UpdateOrderStatus),
    #[serde(rename = "order:cancel")]
    CancelOrder(CancelOrder),
    #[serde(rename = "delivery:location_update")]
    LocationUpdate(LocationUpdate),
}

#[derive(Deserialize)]
struct EventName {
    event: Option<String>,
}

impl ClientCommand {
    /// Parse and validate one inbound text frame.
    pub fn decode(text: &str) -> AppResult<Self> {
        let command: ClientCommand = serde_json::from_str(text)?;
        command.validate()?;
        Ok(command)
    }

    /// Best-effort event name of a frame that may not decode.
    pub fn peek_event(text: &str) -> Option<String> {
        serde_json::from_str::<EventName>(text).ok().and_then(|f| f.event)
    }

    pub fn encode(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::Ping => events::PING,
            ClientCommand::PlaceOrder(_) => events::ORDER_PLACED,
            ClientCommand::AcceptOrder(_) => events::ORDER_ACCEPT,
            ClientCommand::RejectOrder(_) => events::ORDER_REJECT,
            ClientCommand::UpdateStatus(_) => events::ORDER_UPDATE_STATUS,
            ClientCommand::CancelOrder(_) => events::ORDER_CANCEL,
            ClientCommand::LocationUpdate(_) => events::DELIVERY_LOCATION_UPDATE,
        }
    }

    /// Order this command refers to, if any.
    pub fn order_id(&self) -> Option<&str> {
        match self {
            ClientCommand::Ping => None,
            ClientCommand::PlaceOrder(p) => Some(&p.order_id),
            ClientCommand::AcceptOrder(p) => Some(&p.order_id),
            ClientCommand::RejectOrder(p) => Some(&p.order_id),
            ClientCommand::UpdateStatus(p) => Some(&p.order_id),
            ClientCommand::CancelOrder(p) => Some(&p.order_id),
            ClientCommand::LocationUpdate(p) => Some(&p.order_id),
        }
    }

    /// Roles allowed to send this command.
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            ClientCommand::Ping => &[
                Role::Customer,
                Role::RestaurantOwner,
                Role::Superadmin,
                Role::DeliveryPartner,
            ],
            ClientCommand::PlaceOrder(_) => &[Role::Customer],
            ClientCommand::CancelOrder(_) => &[Role::Customer, Role::Superadmin],
            ClientCommand::AcceptOrder(_) | ClientCommand::RejectOrder(_) => {
                &[Role::RestaurantOwner, Role::Superadmin]
            }
            ClientCommand::UpdateStatus(_) => {
                &[Role::RestaurantOwner, Role::DeliveryPartner, Role::Superadmin]
            }
            ClientCommand::LocationUpdate(_) => {
                &[Role::DeliveryPartner, Role::RestaurantOwner, Role::Superadmin]
            }
        }
    }

    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        match self {
            ClientCommand::Ping => Ok(()),
            ClientCommand::PlaceOrder(p) => p.validate(),
            ClientCommand::AcceptOrder(p) => p.validate(),
            ClientCommand::RejectOrder(p) => p.validate(),
            ClientCommand::UpdateStatus(p) => p.validate(),
            ClientCommand::CancelOrder(p) => p.validate(),
            ClientCommand::LocationUpdate(p) => p.validate(),
        }
    }
}

// ---- Server -> client payloads ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connected {
    pub socket_id: String,
    pub user_id: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub order_id: String,
    pub restaurant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(flatten)]
    pub details: Map<String, Value>,
    #[serde(default = "Utc::now")]
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmed {
    pub order_id: String,
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAccepted {
    pub order_id: String,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time: Option<u32>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRejected {
    pub order_id: String,
    pub status: OrderStatus,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionConfirmed {
    pub order_id: String,
    pub action: OrderAction,
}

/// Payload of both `order:status_update` and `order:status_changed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub order_id: String,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateConfirmed {
    pub order_id: String,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancelled {
    pub order_id: String,
    pub cancelled_by: CancelledBy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryLocation {
    pub order_id: String,
    pub location: GeoPoint,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderError {
    pub message: String,
    /// Event that caused the error, when it could be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

/// Outbound socket frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "connected")]
    Connected(Connected),
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "order:new")]
    NewOrder(NewOrder),
    #[serde(rename = "order:confirmed")]
    OrderConfirmed(OrderConfirmed),
    #[serde(rename = "order:accepted")]
    OrderAccepted(OrderAccepted),
    #[serde(rename = "order:rejected")]
    OrderRejected(OrderRejected),
    #[serde(rename = "order:action_confirmed")]
    ActionConfirmed(ActionConfirmed),
    #[serde(rename = "order:status_update")]
    StatusUpdate(StatusUpdate),
    #[serde(rename = "order:status_changed")]
    StatusChanged(StatusUpdate),
    #[serde(rename = "order:update_confirmed")]
    UpdateConfirmed(UpdateConfirmed),
    #[serde(rename = "order:cancelled")]
    OrderCancelled(OrderCancelled),
    #[serde(rename = "delivery:location")]
    DeliveryLocation(DeliveryLocation),
    #[serde(rename = "order:error")]
    Error(OrderError),
}

impl ServerEvent {
    pub fn encode(&self) -> AppResult<String> {
        serde_json::to_string(self).map_err(AppError::from)
    }

    pub fn decode(text: &str) -> AppResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected(_) => events::CONNECTED,
            ServerEvent::Pong => events::PONG,
            ServerEvent::NewOrder(_) => events::ORDER_NEW,
            ServerEvent::OrderConfirmed(_) => events::ORDER_CONFIRMED,
            ServerEvent::OrderAccepted(_) => events::ORDER_ACCEPTED,
            ServerEvent::OrderRejected(_) => events::ORDER_REJECTED,
            ServerEvent::ActionConfirmed(_) => events::ORDER_ACTION_CONFIRMED,
            ServerEvent::StatusUpdate(_) => events::ORDER_STATUS_UPDATE,
            ServerEvent::StatusChanged(_) => events::ORDER_STATUS_CHANGED,
            ServerEvent::UpdateConfirmed(_) => events::ORDER_UPDATE_CONFIRMED,
            ServerEvent::OrderCancelled(_) => events::ORDER_CANCELLED,
            ServerEvent::DeliveryLocation(_) => events::DELIVERY_LOCATION,
            ServerEvent::Error(_) => events::ORDER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_place_order_with_extra_fields() {
        let text = json!({
            "event": "order:placed",
            "data": { "orderId": "O1", "restaurantId": "R1", "total": 42.5 }
        })
        .to_string();
        match ClientCommand::decode(&text).unwrap() {
            ClientCommand::PlaceOrder(p) => {
                assert_eq!(p.order_id, "O1");
                assert_eq!(p.restaurant_id, "R1");
                assert_eq!(p.details.get("total"), Some(&json!(42.5)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn accept_reads_user_id_as_customer() {
        let text = json!({
            "event": "order:accept",
            "data": { "orderId": "O1", "userId": "C1", "estimatedTime": 20 }
        })
        .to_string();
        let cmd = ClientCommand::decode(&text).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::AcceptOrder(AcceptOrder {
                order_id: "O1".into(),
                customer_id: "C1".into(),
                estimated_time: Some(20),
            })
        );
        assert_eq!(cmd.name(), events::ORDER_ACCEPT);
        assert_eq!(cmd.order_id(), Some("O1"));
    }

    #[test]
    fn ping_has_no_data() {
        assert_eq!(
            ClientCommand::decode(r#"{"event":"ping"}"#).unwrap(),
            ClientCommand::Ping
        );
    }

    #[test]
    fn rejects_unknown_event() {
        let err = ClientCommand::decode(r#"{"event":"order:teleport","data":{}}"#).unwrap_err();
        assert!(matches!(err, AppError::Serialization(_)));
        assert_eq!(
            ClientCommand::peek_event(r#"{"event":"order:teleport","data":{}}"#).as_deref(),
            Some("order:teleport")
        );
    }

    #[test]
    fn rejects_invalid_payloads() {
        let empty_id = json!({ "event": "order:cancel", "data": { "orderId": "" } }).to_string();
        assert!(matches!(
            ClientCommand::decode(&empty_id),
            Err(AppError::Validation(_))
        ));

        let off_map = json!({
            "event": "delivery:location_update",
            "data": { "orderId": "O1", "location": { "lat": 123.0, "lng": 0.0 } }
        })
        .to_string();
        assert!(matches!(
            ClientCommand::decode(&off_map),
            Err(AppError::Validation(_))
        ));

        let bad_status = json!({
            "event": "order:update_status",
            "data": { "orderId": "O1", "userId": "C1", "status": "teleported" }
        })
        .to_string();
        assert!(matches!(
            ClientCommand::decode(&bad_status),
            Err(AppError::Serialization(_))
        ));
    }

    #[test]
    fn server_event_wire_shape() {
        let frame = ServerEvent::ActionConfirmed(ActionConfirmed {
            order_id: "O1".into(),
            action: OrderAction::Accepted,
        });
        let value: Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({ "event": "order:action_confirmed", "data": { "orderId": "O1", "action": "accepted" } })
        );

        let cancelled = ServerEvent::OrderCancelled(OrderCancelled {
            order_id: "O1".into(),
            cancelled_by: CancelledBy::Customer,
            reason: None,
            timestamp: Utc::now(),
        });
        let value: Value = serde_json::from_str(&cancelled.encode().unwrap()).unwrap();
        assert_eq!(value["data"]["cancelledBy"], "customer");
        assert_eq!(cancelled.name(), events::ORDER_CANCELLED);
    }

    #[test]
    fn status_names_are_snake_case() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::OutForDelivery).unwrap(),
            "\"out_for_delivery\""
        );
    }

    #[test]
    fn role_gates() {
        let place = ClientCommand::PlaceOrder(PlaceOrder::new("O1", "R1"));
        assert_eq!(place.allowed_roles(), &[Role::Customer]);
        let accept = ClientCommand::AcceptOrder(AcceptOrder {
            order_id: "O1".into(),
            customer_id: "C1".into(),
            estimated_time: None,
        });
        assert!(!accept.allowed_roles().contains(&Role::Customer));
        assert!(ClientCommand::Ping.allowed_roles().contains(&Role::DeliveryPartner));
    }
}
