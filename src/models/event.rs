//! Event envelopes carried on broker channels and the HTTP publish API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppResult;
use crate::models::channel::Channel;
use crate::models::order::{DeliveryLocation, NewOrder, OrderStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

/// A restaurant application was submitted and awaits review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewApplication {
    pub application_id: String,
    pub restaurant_name: String,
    pub owner_name: String,
    #[serde(default = "Utc::now")]
    pub submitted_at: DateTime<Utc>,
    /// Admins this notification is addressed to.
    pub admin_ids: Vec<String>,
}

/// A restaurant application was approved or rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationUpdate {
    pub application_id: String,
    pub restaurant_name: String,
    pub status: ApplicationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    /// Empty means every connected admin.
    #[serde(default)]
    pub admin_ids: Vec<String>,
}

/// Payload on the application channels, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApplicationEvent {
    NewApplication(NewApplication),
    ApplicationUpdate(ApplicationUpdate),
}

impl ApplicationEvent {
    pub fn channel(&self) -> Channel {
        match self {
            ApplicationEvent::NewApplication(_) => Channel::NewApplication,
            ApplicationEvent::ApplicationUpdate(_) => Channel::ApplicationUpdate,
        }
    }

    pub fn admin_ids(&self) -> &[String] {
        match self {
            ApplicationEvent::NewApplication(e) => &e.admin_ids,
            ApplicationEvent::ApplicationUpdate(e) => &e.admin_ids,
        }
    }

    /// Relevance filter for one admin's notification stream.
    pub fn is_addressed_to(&self, admin_id: &str) -> bool {
        match self {
            ApplicationEvent::NewApplication(e) => e.admin_ids.iter().any(|id| id == admin_id),
            ApplicationEvent::ApplicationUpdate(e) => {
                e.admin_ids.is_empty() || e.admin_ids.iter().any(|id| id == admin_id)
            }
        }
    }
}

/// Status change published by a backend process on `orders:status-update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusChange {
    pub order_id: String,
    #[serde(default, alias = "userId", skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Events backend processes publish for the order socket server to relay.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderBusEvent {
    NewOrder(NewOrder),
    StatusChange(OrderStatusChange),
    RiderLocation(DeliveryLocation),
}

impl OrderBusEvent {
    /// Decode a payload according to the channel it arrived on.
    /// Returns `Ok(None)` for channels that are not part of the order bus.
    pub fn decode(channel: &str, payload: &str) -> AppResult<Option<Self>> {
        let event = match channel.parse::<Channel>() {
            Ok(Channel::NewOrder) => OrderBusEvent::NewOrder(serde_json::from_str(payload)?),
            Ok(Channel::OrderStatusUpdate) => {
                OrderBusEvent::StatusChange(serde_json::from_str(payload)?)
            }
            Ok(Channel::RiderLocation) => {
                OrderBusEvent::RiderLocation(serde_json::from_str(payload)?)
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// Payload for `POST /api/publish`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub channel: String,
    pub payload: Value,
}
