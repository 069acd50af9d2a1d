//! Order lifecycle commands: who gets told what.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::{
    ActionConfirmed, CancelledBy, ClientCommand, Identity, NewOrder, OrderAccepted, OrderAction,
    OrderCancelled, OrderConfirmed, OrderError, OrderRejected, OrderStatus, Role, Room,
    ServerEvent, StatusUpdate, UpdateConfirmed, DEFAULT_REJECT_REASON,
};
use crate::socket::rooms::RoomRegistry;

/// An authenticated socket.
#[derive(Debug, Clone)]
pub struct Session {
    pub socket_id: String,
    pub identity: Identity,
}

impl Session {
    fn reply(&self, rooms: &RoomRegistry, event: ServerEvent) {
        if !rooms.send_to(&self.socket_id, &event) {
            debug!(socket_id = %self.socket_id, event = event.name(), "reply not delivered");
        }
    }
}

/// Decode and handle one text frame. Failures are reported to the sending
/// socket as `order:error`; the connection stays open.
pub fn handle_frame(rooms: &RoomRegistry, session: &Session, text: &str) {
    let result = ClientCommand::decode(text).and_then(|command| handle_command(rooms, session, command));
    if let Err(e) = result {
        let event = ClientCommand::peek_event(text);
        warn!(
            socket_id = %session.socket_id,
            user_id = %session.identity.user_id,
            event = ?event,
            error = %e,
            "order command failed"
        );
        session.reply(
            rooms,
            ServerEvent::Error(OrderError {
                message: e.to_string(),
                event,
            }),
        );
    }
}

pub fn handle_command(rooms: &RoomRegistry, session: &Session, command: ClientCommand) -> AppResult<()> {
    let identity = &session.identity;
    if !command.allowed_roles().contains(&identity.role) {
        return Err(AppError::Forbidden(format!(
            "{} may not send {}",
            identity.role,
            command.name()
        )));
    }
    let now = Utc::now();

    match command {
        ClientCommand::Ping => session.reply(rooms, ServerEvent::Pong),

        ClientCommand::PlaceOrder(mut order) => {
            // The server decides who placed it and when.
            order.details.remove("customerId");
            order.details.remove("placedAt");
            rooms.join(&session.socket_id, &Room::order(&order.order_id));
            let delivered = rooms.emit(
                &Room::restaurant(&order.restaurant_id),
                &ServerEvent::NewOrder(NewOrder {
                    order_id: order.order_id.clone(),
                    restaurant_id: order.restaurant_id.clone(),
                    customer_id: Some(identity.user_id.clone()),
                    details: order.details,
                    placed_at: now,
                }),
            );
            info!(
                order_id = %order.order_id,
                restaurant_id = %order.restaurant_id,
                delivered,
                "order placed"
            );
            session.reply(
                rooms,
                ServerEvent::OrderConfirmed(OrderConfirmed {
                    order_id: order.order_id,
                    status: OrderStatus::Pending,
                    timestamp: now,
                }),
            );
        }

        ClientCommand::AcceptOrder(accept) => {
            rooms.join(&session.socket_id, &Room::order(&accept.order_id));
            rooms.emit(
                &Room::user(&accept.customer_id),
                &ServerEvent::OrderAccepted(OrderAccepted {
                    order_id: accept.order_id.clone(),
                    status: OrderStatus::Accepted,
                    estimated_time: accept.estimated_time,
                    timestamp: now,
                }),
            );
            info!(order_id = %accept.order_id, customer_id = %accept.customer_id, "order accepted");
            session.reply(
                rooms,
                ServerEvent::ActionConfirmed(ActionConfirmed {
                    order_id: accept.order_id,
                    action: OrderAction::Accepted,
                }),
            );
        }

        ClientCommand::RejectOrder(reject) => {
            let reason = reject
                .reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_REJECT_REASON.to_string());
            rooms.emit(
                &Room::user(&reject.customer_id),
                &ServerEvent::OrderRejected(OrderRejected {
                    order_id: reject.order_id.clone(),
                    status: OrderStatus::Rejected,
                    reason,
                    timestamp: now,
                }),
            );
            info!(order_id = %reject.order_id, customer_id = %reject.customer_id, "order rejected");
            session.reply(
                rooms,
                ServerEvent::ActionConfirmed(ActionConfirmed {
                    order_id: reject.order_id,
                    action: OrderAction::Rejected,
                }),
            );
        }

        ClientCommand::UpdateStatus(update) => {
            rooms.join(&session.socket_id, &Room::order(&update.order_id));
            let payload = StatusUpdate {
                order_id: update.order_id.clone(),
                status: update.status,
                reason: None,
                details: update.details,
                timestamp: now,
            };
            rooms.emit(
                &Room::user(&update.customer_id),
                &ServerEvent::StatusUpdate(payload.clone()),
            );
            rooms.emit(
                &Room::order(&update.order_id),
                &ServerEvent::StatusChanged(payload),
            );
            info!(order_id = %update.order_id, status = ?update.status, "order status updated");
            session.reply(
                rooms,
                ServerEvent::UpdateConfirmed(UpdateConfirmed {
                    order_id: update.order_id,
                    status: update.status,
                }),
            );
        }

        ClientCommand::CancelOrder(cancel) => {
            let cancelled_by = match identity.role {
                Role::Superadmin => CancelledBy::Admin,
                _ => CancelledBy::Customer,
            };
            rooms.emit(
                &Room::order(&cancel.order_id),
                &ServerEvent::OrderCancelled(OrderCancelled {
                    order_id: cancel.order_id.clone(),
                    cancelled_by,
                    reason: cancel.reason,
                    timestamp: now,
                }),
            );
            info!(order_id = %cancel.order_id, "order cancelled");
            session.reply(
                rooms,
                ServerEvent::ActionConfirmed(ActionConfirmed {
                    order_id: cancel.order_id,
                    action: OrderAction::Cancelled,
                }),
            );
        }

        // Telemetry: no confirmation.
        ClientCommand::LocationUpdate(update) => {
            rooms.emit(
                &Room::order(&update.order_id),
                &ServerEvent::DeliveryLocation(crate::models::DeliveryLocation {
                    order_id: update.order_id,
                    location: update.location,
                    timestamp: now,
                }),
            );
        }
    }
    Ok(())
}
