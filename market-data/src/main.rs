mod book;
mod config;
mod consumer;
mod healthz;
mod http;
mod pubsub;
mod repository;
mod state;
mod ticker;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use redis::aio::ConnectionManager;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;
use xcore::health::LoopHealth;
use xcore::log::{setup_logs, LogLevel};
use xcore::shutdown::{drain_with_deadline, wait_for_shutdown_signal};

use crate::config::MarketDataConfig;
use crate::consumer::ConsumerConfig;
use crate::http::AppState;
use crate::repository::{connect, PgSymbolConfigRepository};
use crate::state::MarketDataState;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    setup_logs(LogLevel::Info)?;
    let config = MarketDataConfig::from_env()?;
    info!(
        stream = %config.event_stream_name,
        group = %config.consumer_group,
        consumer = %config.consumer_name,
        "starting market-data"
    );

    let pool = connect(&config.database_url).await?;
    let symbols = Arc::new(PgSymbolConfigRepository::new(pool));
    let market_data = MarketDataState::new(symbols.clone());

    let redis_client = redis::Client::open(format!("redis://{}", config.core.redis_addr))?;
    let mut conn = ConnectionManager::new(redis_client).await?;

    let replayed = consumer::replay(&mut conn, &config.event_stream_name, &market_data).await?;
    info!(replayed, "warmed market-data state from stream replay");
    consumer::ensure_group(&mut conn, &config.event_stream_name, &config.consumer_group).await?;

    let root_token = CancellationToken::new();
    tokio::spawn(wait_for_shutdown_signal(root_token.clone()));

    let health = LoopHealth::new();
    let consumer_config = ConsumerConfig {
        stream_name: config.event_stream_name.clone(),
        group: config.consumer_group.clone(),
        consumer: config.consumer_name.clone(),
        batch_size: config.batch_size,
        block: config.block,
    };
    let consumer_cancel = root_token.clone();
    let consumer_health = health.clone();
    let consumer_market_data = market_data.clone();
    let consumer_handle =
    tokio::spawn(consumer::run(conn, consumer_config, consumer_market_data, consumer_health, consumer_cancel));

    let app_state = Arc::new(AppState { market_data, symbols });

    let health_routes =
    Router::new().route("/live", get(healthz::live)).route("/health", get(healthz::health)).route("/ready", get(healthz::ready)).with_state(health);

    let data_routes = Router::new()
    .route("/v1/depth", get(http::depth))
    .route("/v1/trades", get(http::trades))
    .route("/v1/ticker", get(http::ticker))
    .with_state(app_state);

    let app = health_routes.merge(data_routes).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let shutdown_token = root_token.clone();

    axum::serve(listener, app.into_make_service())
    .with_graceful_shutdown(async move {
            shutdown_token.cancelled().await;
    })
    .await?;

    drain_with_deadline("market-data", async {
            let _ = consumer_handle.await;
    })
    .await;
    Ok(())
}
