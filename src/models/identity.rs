//! Connection identity derived from a bearer token.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    RestaurantOwner,
    Superadmin,
    DeliveryPartner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "CUSTOMER",
            Role::RestaurantOwner => "RESTAURANT_OWNER",
            Role::Superadmin => "SUPERADMIN",
            Role::DeliveryPartner => "DELIVERY_PARTNER",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Superadmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is on the other end of a connection. Fixed for the connection's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
    /// Restaurant owned by this user, for `RESTAURANT_OWNER` tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restaurant_id: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            restaurant_id: None,
        }
    }

    pub fn restaurant_owner(user_id: impl Into<String>, restaurant_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: Role::RestaurantOwner,
            restaurant_id: Some(restaurant_id.into()),
        }
    }
}
