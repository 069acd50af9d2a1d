//! Order socket client: one connection per session, semantic emit methods,
//! typed listeners and bounded reconnection.

mod handlers;
mod state;

pub use handlers::HandlerRegistry;
pub use state::{ConnectionState, FailureReason, ReconnectPolicy};

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::form_urlencoded;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{
    AcceptOrder, CancelOrder, ClientCommand, GeoPoint, LocationUpdate, OrderStatus, PlaceOrder,
    RejectOrder, Role, ServerEvent, UpdateOrderStatus,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long the server may take to send `connected` after the upgrade.
const GREETING_TIMEOUT: Duration = Duration::from_secs(5);

/// Where and as whom the client connects.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL without the namespace, e.g. `ws://127.0.0.1:3000`.
    pub base_url: String,
    pub token: String,
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            reconnect: ReconnectPolicy::default(),
        }
    }

    pub fn from_config(config: &Config, token: impl Into<String>) -> Self {
        Self::new(config.order_socket_url.clone(), token)
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    fn socket_url(&self, role: Role) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("token", &self.token)
            .append_pair("role", role.as_str())
            .finish();
        format!("{}/orders?{}", self.base_url.trim_end_matches('/'), query)
    }
}

/// One underlying socket and its reconnect loop.
pub struct Connection {
    role: Role,
    outbound: mpsc::UnboundedSender<String>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
}

impl Connection {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until connected or until no further attempts will be made.
    /// Connected means the server has greeted the socket, so its user and
    /// restaurant rooms are joined.
    pub async fn wait_connected(&self) -> AppResult<()> {
        let mut rx = self.state.clone();
        let state = *rx
            .wait_for(|s| *s == ConnectionState::Connected || s.is_terminal())
            .await
            .map_err(|_| AppError::NotConnected)?;
        match state {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Failed(FailureReason::Unauthorized) => {
                Err(AppError::Auth("order socket rejected the token".to_string()))
            }
            _ => Err(AppError::NotConnected),
        }
    }

    /// Send a command. Nothing is queued while disconnected.
    pub fn emit(&self, command: &ClientCommand) -> AppResult<()> {
        if self.state() != ConnectionState::Connected {
            return Err(AppError::NotConnected);
        }
        let frame = command.encode()?;
        self.outbound.send(frame).map_err(|_| AppError::NotConnected)
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

/// Client side of the order socket.
pub struct OrderSocketClient {
    config: ClientConfig,
    handlers: HandlerRegistry,
    connection: Mutex<Option<Arc<Connection>>>,
}

impl OrderSocketClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            handlers: HandlerRegistry::new(),
            connection: Mutex::new(None),
        }
    }

    /// Listener registry. Listeners survive reconnects but not `disconnect`.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Start connecting and return at once. While a connection is live (not
    /// failed or closed) the same instance is returned.
    pub async fn connect(&self, role: Role) -> Arc<Connection> {
        let mut current = self.connection.lock().await;
        if let Some(conn) = current.as_ref() {
            if !conn.state().is_terminal() {
                if conn.role != role {
                    warn!(current = %conn.role, requested = %role, "already connected with another role");
                }
                return conn.clone();
            }
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let cancel = CancellationToken::new();
        let conn = Arc::new(Connection {
            role,
            outbound: outbound_tx,
            state: state_rx,
            cancel: cancel.clone(),
        });

        let driver = Driver {
            url: self.config.socket_url(role),
            policy: self.config.reconnect,
            role,
            handlers: self.handlers.clone(),
            state: state_tx,
            outbound: outbound_rx,
            cancel,
        };
        tokio::spawn(driver.run());

        *current = Some(conn.clone());
        conn
    }

    /// Connect and wait until the server has greeted the socket.
    pub async fn connect_and_wait(&self, role: Role) -> AppResult<Arc<Connection>> {
        let conn = self.connect(role).await;
        conn.wait_connected().await?;
        Ok(conn)
    }

    /// Remove listeners, close the socket and forget the connection.
    pub async fn disconnect(&self) {
        self.handlers.clear();
        if let Some(conn) = self.connection.lock().await.take() {
            conn.close();
            info!(role = %conn.role, "order socket disconnect requested");
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.connection
            .lock()
            .await
            .as_ref()
            .map(|c| c.state())
            .unwrap_or(ConnectionState::Idle)
    }

    pub async fn connection(&self) -> Option<Arc<Connection>> {
        self.connection.lock().await.clone()
    }

    async fn emit(&self, command: ClientCommand) -> AppResult<()> {
        let conn = self.connection().await.ok_or(AppError::NotConnected)?;
        conn.emit(&command)
    }

    // Customer side

    pub async fn place_order(&self, order: PlaceOrder) -> AppResult<()> {
        self.emit(ClientCommand::PlaceOrder(order)).await
    }

    pub async fn cancel_order(&self, order_id: &str, reason: Option<String>) -> AppResult<()> {
        self.emit(ClientCommand::CancelOrder(CancelOrder {
            order_id: order_id.to_string(),
            reason,
        }))
        .await
    }

    // Restaurant side

    pub async fn accept_order(
        &self,
        order_id: &str,
        customer_id: &str,
        estimated_time: Option<u32>,
    ) -> AppResult<()> {
        self.emit(ClientCommand::AcceptOrder(AcceptOrder {
            order_id: order_id.to_string(),
            customer_id: customer_id.to_string(),
            estimated_time,
        }))
        .await
    }

    pub async fn reject_order(
        &self,
        order_id: &str,
        customer_id: &str,
        reason: Option<String>,
    ) -> AppResult<()> {
        self.emit(ClientCommand::RejectOrder(RejectOrder {
            order_id: order_id.to_string(),
            customer_id: customer_id.to_string(),
            reason,
        }))
        .await
    }

    pub async fn update_order_status(
        &self,
        order_id: &str,
        customer_id: &str,
        status: OrderStatus,
        details: Option<Value>,
    ) -> AppResult<()> {
        self.emit(ClientCommand::UpdateStatus(UpdateOrderStatus {
            order_id: order_id.to_string(),
            customer_id: customer_id.to_string(),
            status,
            details,
        }))
        .await
    }

    // Delivery side

    pub async fn send_location(&self, order_id: &str, location: GeoPoint) -> AppResult<()> {
        self.emit(ClientCommand::LocationUpdate(LocationUpdate {
            order_id: order_id.to_string(),
            location,
        }))
        .await
    }
}

enum SessionEnd {
    Cancelled,
    Lost,
}

/// Background task owning the socket for one `Connection`.
struct Driver {
    url: String,
    policy: ReconnectPolicy,
    role: Role,
    handlers: HandlerRegistry,
    state: watch::Sender<ConnectionState>,
    outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
}

impl Driver {
    async fn run(mut self) {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.state.send_replace(ConnectionState::Connecting { attempt });
            debug!(attempt, role = %self.role, "dialing order socket");

            let dial = tokio::select! {
                _ = self.cancel.cancelled() => break,
                dial = connect_async(self.url.as_str()) => dial,
            };

            let failure = match dial {
                Ok((mut socket, _)) => {
                    let greeted = tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        greeted = self.await_greeting(&mut socket) => greeted,
                    };
                    match greeted {
                        Ok(()) => {
                            attempt = 0;
                            self.state.send_replace(ConnectionState::Connected);
                            info!(role = %self.role, "order socket connected");
                            match self.session(socket).await {
                                SessionEnd::Cancelled => break,
                                SessionEnd::Lost => {
                                    warn!(role = %self.role, "order socket connection lost")
                                }
                            }
                            None
                        }
                        Err(e) => Some(e),
                    }
                }
                Err(tungstenite::Error::Http(response)) if response.status().as_u16() == 401 => {
                    error!(role = %self.role, "order socket rejected credentials");
                    self.state
                        .send_replace(ConnectionState::Failed(FailureReason::Unauthorized));
                    return;
                }
                Err(e) => Some(AppError::from(e)),
            };

            if let Some(e) = failure {
                warn!(attempt, error = %e, "order socket connect failed");
                if attempt >= self.policy.max_attempts {
                    error!(attempts = attempt, "max reconnection attempts reached");
                    self.state
                        .send_replace(ConnectionState::Failed(FailureReason::MaxAttemptsReached));
                    return;
                }
            }

            let delay = self.policy.delay_for(attempt.max(1));
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        self.state.send_replace(ConnectionState::Closed);
        debug!(role = %self.role, "order socket closed");
    }

    /// Read until the server's `connected` frame, which it sends once the
    /// socket's default rooms are joined. Listeners see that frame too.
    async fn await_greeting(&self, socket: &mut Socket) -> AppResult<()> {
        tokio::time::timeout(GREETING_TIMEOUT, read_greeting(&self.handlers, socket))
            .await
            .map_err(|_| AppError::NotConnected)?
    }

    async fn session(&mut self, socket: Socket) -> SessionEnd {
        let (mut write, mut read) = socket.split();
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return SessionEnd::Cancelled;
                }
                frame = self.outbound.recv() => match frame {
                    Some(frame) => {
                        if let Err(e) = write.send(Message::Text(frame)).await {
                            warn!(error = %e, "order socket write failed");
                            return SessionEnd::Lost;
                        }
                    }
                    // Every `Connection` handle is gone.
                    None => {
                        self.cancel.cancel();
                        let _ = write.send(Message::Close(None)).await;
                        return SessionEnd::Cancelled;
                    }
                },
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        self.handlers.dispatch(&text);
                    }
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Lost,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "order socket read failed");
                        return SessionEnd::Lost;
                    }
                },
            }
        }
    }
}

async fn read_greeting(handlers: &HandlerRegistry, socket: &mut Socket) -> AppResult<()> {
    while let Some(msg) = socket.next().await {
        if let Message::Text(text) = msg? {
            handlers.dispatch(&text);
            if matches!(ServerEvent::decode(&text), Ok(ServerEvent::Connected(_))) {
                return Ok(());
            }
        }
    }
    Err(AppError::NotConnected)
}
