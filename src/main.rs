//! Entry point: load config, wire dependencies, and run the server.

use std::sync::Arc;

use orderwire::config::{BrokerBackend, Config};
use orderwire::repositories::{Broker, CounterStore, MemoryRepository, RedisRepository};
use orderwire::socket::{bridge, ClusterAdapter, RoomRegistry};
use orderwire::{create_app, AppState};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("config: {}", e))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (broker, counters): (Arc<dyn Broker>, Arc<dyn CounterStore>) = match config.broker_backend {
        BrokerBackend::Redis => {
            let repo = Arc::new(RedisRepository::connect(&config.broker_url).await?);
            let counters: Arc<dyn CounterStore> = if config.redis_url == config.broker_url {
                repo.clone()
            } else {
                Arc::new(RedisRepository::connect(&config.redis_url).await?)
            };
            let broker: Arc<dyn Broker> = repo;
            (broker, counters)
        }
        BrokerBackend::Memory => {
            tracing::warn!("memory broker: events stay inside this process");
            let repo = Arc::new(MemoryRepository::new());
            let broker: Arc<dyn Broker> = repo.clone();
            let counters: Arc<dyn CounterStore> = repo;
            (broker, counters)
        }
    };

    let rooms = if config.cluster_fanout {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let rooms = Arc::new(RoomRegistry::with_fanout(config.node_id.clone(), tx));
        // Runs for the life of the process.
        let _adapter = ClusterAdapter::spawn(broker.clone(), rooms.clone(), rx).await?;
        rooms
    } else {
        Arc::new(RoomRegistry::new())
    };
    let _bridge = bridge::spawn(broker.clone(), rooms.clone()).await?;

    let state = AppState::new(&config, broker, counters, rooms);
    let app = create_app(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!(addr = %config.server_addr, node_id = %config.node_id, "listening");
    let listener = tokio::net::TcpListener::bind(config.server_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
