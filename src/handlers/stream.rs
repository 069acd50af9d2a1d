//! Server-push notification stream for admins.

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{future, stream, Stream, StreamExt};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::handlers::http::AppState;
use crate::middleware::AdminUser;
use crate::models::{ApplicationEvent, Channel};
use crate::repositories::BrokerMessage;

/// GET /api/notifications/stream
///
/// The broker subscription is opened before the response starts, so the
/// `connected` frame means events published from now on will arrive. The
/// subscription lives inside the response body: when the client goes away
/// axum drops the body, which unsubscribes.
pub async fn notification_stream(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let channels: Vec<&str> = Channel::APPLICATIONS.iter().map(|c| c.as_str()).collect();
    let subscription = state.broker().subscribe(&channels).await?;
    info!(user_id = %admin.user_id, channels = ?channels, "notification stream opened");

    let connected = Event::default().data(json!({ "type": "connected" }).to_string());
    let admin_id = admin.user_id;
    let events = subscription.filter_map(move |msg| {
        future::ready(forward_for(&admin_id, &msg).map(|data| Ok(Event::default().data(data))))
    });

    let body = stream::once(future::ready(Ok(connected))).chain(events);
    Ok(Sse::new(body).keep_alive(
        KeepAlive::new()
            .interval(state.keep_alive())
            .text("keep-alive"),
    ))
}

/// The payload to push to `admin_id`, if the message concerns them. The
/// published text is forwarded as-is; unparseable messages are dropped.
pub fn forward_for(admin_id: &str, msg: &BrokerMessage) -> Option<String> {
    let event: ApplicationEvent = match serde_json::from_str(&msg.payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(channel = %msg.channel, error = %e, "dropping malformed notification");
            return None;
        }
    };
    if !event.is_addressed_to(admin_id) {
        debug!(channel = %msg.channel, user_id = %admin_id, "notification not addressed to admin");
        return None;
    }
    Some(msg.payload.clone())
}
