//! Event listeners registered on the client.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::models::{
    events, ActionConfirmed, Connected, DeliveryLocation, NewOrder, OrderAccepted,
    OrderCancelled, OrderConfirmed, OrderError, OrderRejected, ServerEvent, StatusUpdate,
    UpdateConfirmed,
};

type Handler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

/// Listeners keyed by event name. Cloning shares the registry.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<DashMap<String, Vec<Handler>>>,
}

macro_rules! typed_listener {
    ($(#[$doc:meta])* $method:ident, $event:expr, $variant:ident, $payload:ty) => {
        $(#[$doc])*
        pub fn $method<F>(&self, handler: F)
        where
            F: Fn(&$payload) + Send + Sync + 'static,
        {
            self.on($event, move |event| {
                if let ServerEvent::$variant(payload) = event {
                    handler(payload)
                }
            });
        }
    };
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen for a raw event name.
    pub fn on<F>(&self, event: &str, handler: F)
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        self.handlers
            .entry(event.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    typed_listener!(on_connected, events::CONNECTED, Connected, Connected);
    typed_listener!(on_order_confirmed, events::ORDER_CONFIRMED, OrderConfirmed, OrderConfirmed);
    typed_listener!(on_order_accepted, events::ORDER_ACCEPTED, OrderAccepted, OrderAccepted);
    typed_listener!(on_order_rejected, events::ORDER_REJECTED, OrderRejected, OrderRejected);
    typed_listener!(on_order_status_update, events::ORDER_STATUS_UPDATE, StatusUpdate, StatusUpdate);
    typed_listener!(
        /// Broadcast to everyone watching the order, not only its customer.
        on_status_changed,
        events::ORDER_STATUS_CHANGED,
        StatusChanged,
        StatusUpdate
    );
    typed_listener!(on_order_cancelled, events::ORDER_CANCELLED, OrderCancelled, OrderCancelled);
    typed_listener!(on_delivery_location, events::DELIVERY_LOCATION, DeliveryLocation, DeliveryLocation);
    typed_listener!(on_error, events::ORDER_ERROR, Error, OrderError);
    typed_listener!(on_new_order, events::ORDER_NEW, NewOrder, NewOrder);
    typed_listener!(on_action_confirmed, events::ORDER_ACTION_CONFIRMED, ActionConfirmed, ActionConfirmed);
    typed_listener!(on_update_confirmed, events::ORDER_UPDATE_CONFIRMED, UpdateConfirmed, UpdateConfirmed);

    /// Decode an incoming frame and run its listeners. Returns how many ran.
    pub fn dispatch(&self, text: &str) -> usize {
        let event = match ServerEvent::decode(text) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "ignoring undecodable frame");
                return 0;
            }
        };
        // Clone out so listeners may register more listeners.
        let listeners: Vec<Handler> = self
            .handlers
            .get(event.name())
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        for listener in &listeners {
            listener(&event);
        }
        debug!(event = event.name(), listeners = listeners.len(), "frame dispatched");
        listeners.len()
    }

    pub fn clear(&self) {
        self.handlers.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.iter().all(|entry| entry.value().is_empty())
    }
}
