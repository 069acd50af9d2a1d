//! WebSocket endpoint for the order socket: handshake auth, default rooms
//! and the per-connection read/write loop.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::handlers::http::AppState;
use crate::middleware::bearer_token;
use crate::models::{Connected, Identity, Role, Room, ServerEvent};
use crate::socket::orders::{handle_frame, Session};
use crate::socket::rooms::generate_socket_id;

#[derive(Debug, Default, Deserialize)]
pub struct HandshakeQuery {
    pub token: Option<String>,
    /// Role the client expects to hold; must agree with the token.
    pub role: Option<String>,
}

/// GET /orders. The token comes from `?token=` or `Authorization: Bearer`.
/// Connections without a valid token never upgrade.
pub async fn orders_socket(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HandshakeQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(&headers).map(str::to_string))
        .ok_or_else(|| AppError::Auth("authentication token required".to_string()))?;

    let identity = state.jwt_secret().validate(&token).map_err(|e| {
        debug!(error = %e, "order socket handshake rejected");
        AppError::Auth("invalid authentication token".to_string())
    })?;

    if let Some(declared) = query.role.as_deref().filter(|r| !r.is_empty()) {
        if !declared.eq_ignore_ascii_case(identity.role.as_str()) {
            return Err(AppError::Auth(format!(
                "declared role {} does not match token",
                declared
            )));
        }
    }

    Ok(ws.on_upgrade(move |socket| handle_socket(state, socket, identity)))
}

/// Rooms a fresh connection joins before it sends anything.
pub fn default_rooms(identity: &Identity) -> Vec<Room> {
    let mut rooms = vec![Room::user(&identity.user_id)];
    if identity.role == Role::RestaurantOwner {
        if let Some(restaurant_id) = &identity.restaurant_id {
            rooms.push(Room::restaurant(restaurant_id));
        }
    }
    rooms
}

async fn handle_socket(state: AppState, socket: WebSocket, identity: Identity) {
    let socket_id = generate_socket_id();
    let rooms = state.rooms();
    info!(socket_id = %socket_id, user_id = %identity.user_id, role = %identity.role, "order socket connected");

    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    rooms.register(&socket_id, tx);
    for room in default_rooms(&identity) {
        rooms.join(&socket_id, &room);
    }

    let session = Session {
        socket_id: socket_id.clone(),
        identity,
    };
    rooms.send_to(
        &socket_id,
        &ServerEvent::Connected(Connected {
            socket_id: socket_id.clone(),
            user_id: session.identity.user_id.clone(),
            role: session.identity.role,
        }),
    );

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => handle_frame(rooms, &session, &text),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(socket_id = %socket_id, error = %e, "order socket read failed");
                break;
            }
        }
    }

    let left = rooms.remove(&socket_id);
    send_task.abort();
    info!(
        socket_id = %socket_id,
        user_id = %session.identity.user_id,
        rooms = left,
        "order socket disconnected"
    );
}
