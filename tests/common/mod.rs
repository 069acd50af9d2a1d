//! Shared helpers: start the full router on an ephemeral port with the
//! in-memory broker.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use orderwire::auth::JwtSecret;
use orderwire::config::Config;
use orderwire::models::{Identity, Role};
use orderwire::repositories::MemoryRepository;
use orderwire::socket::{bridge, RoomRegistry};
use orderwire::{create_app, AppState};
use tokio::net::TcpListener;

pub const APP_KEY: &str = "test-key";
pub const JWT_SECRET: &str = "test-jwt-secret-min-32-chars!!!!";

pub fn config(keep_alive_secs: u64) -> Config {
    let keep_alive = keep_alive_secs.to_string();
    Config::from_lookup(move |key| match key {
        "BROKER_BACKEND" => Some("memory".to_string()),
        "APP_KEY" => Some(APP_KEY.to_string()),
        "JWT_SECRET" => Some(JWT_SECRET.to_string()),
        "KEEP_ALIVE_SECS" => Some(keep_alive.clone()),
        "NODE_ID" => Some("test-node".to_string()),
        _ => None,
    })
    .unwrap()
}

/// Router state over a fresh memory repository.
pub fn state(repo: &Arc<MemoryRepository>, keep_alive_secs: u64) -> AppState {
    AppState::new(
        &config(keep_alive_secs),
        repo.clone(),
        repo.clone(),
        Arc::new(RoomRegistry::new()),
    )
}

pub fn token(identity: &Identity) -> String {
    JwtSecret::new(JWT_SECRET.to_string()).issue(identity).unwrap()
}

pub fn admin_token(user_id: &str) -> String {
    token(&Identity::new(user_id, Role::Superadmin))
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub repo: Arc<MemoryRepository>,
    pub state: AppState,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with_keep_alive(30).await
    }

    pub async fn start_with_keep_alive(keep_alive_secs: u64) -> Self {
        let repo = Arc::new(MemoryRepository::new());
        let state = state(&repo, keep_alive_secs);
        bridge::spawn(repo.clone(), state.rooms().clone()).await.unwrap();

        let app = create_app(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, repo, state }
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_base(&self) -> String {
        format!("ws://{}", self.addr)
    }
}

/// Poll `check` until it holds or `within` elapses.
pub async fn eventually<F>(within: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
