mod config;
mod consumer;
mod dlq;
mod handlers;
mod http;
mod repository;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use clearing_client::HttpClearingClient;
use redis::aio::ConnectionManager;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;
use xcore::health::LoopHealth;
use xcore::log::{setup_logs, LogLevel};
use xcore::shutdown::{drain_with_deadline, wait_for_shutdown_signal};

use crate::config::MatchingConsumerConfig;
use crate::consumer::ConsumerConfig;
use crate::handlers::MatchingEventHandler;
use crate::repository::{connect, PgOrderRepository, PgSymbolConfigRepository, PgTradeRepository};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    setup_logs(LogLevel::Info)?;
    let config = MatchingConsumerConfig::from_env()?;
    info!(
        stream = %config.event_stream_name,
        group = %config.consumer_group,
        consumer = %config.consumer_name,
        "starting matching-consumer"
    );

    let pool = connect(&config.database_url).await?;
    let orders = Arc::new(PgOrderRepository::new(pool.clone()));
    let trades = Arc::new(PgTradeRepository::new(pool.clone()));
    let symbols = Arc::new(PgSymbolConfigRepository::new(pool));
    let clearing = Arc::new(HttpClearingClient::new(&config.clearing_base_url)?);
    let handler: Arc<dyn handlers::EventHandler> = Arc::new(MatchingEventHandler::new(orders, trades, symbols, clearing));

    let redis_client = redis::Client::open(format!("redis://{}", config.core.redis_addr))?;
    let mut conn = ConnectionManager::new(redis_client).await?;
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
        sweep_interval: config.sweep_interval,
        pending_min_idle: config.pending_min_idle,
        max_retries: config.max_retries,
    };
    let consumer_cancel = root_token.clone();
    let consumer_health = health.clone();
    let consumer_handle =
    tokio::spawn(consumer::run(conn, consumer_config, handler, consumer_health, consumer_cancel));

    let app = Router::new()
    .route("/live", get(http::live))
    .route("/health", get(http::health))
    .route("/ready", get(http::ready))
    .with_state(health)
    .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let shutdown_token = root_token.clone();

    axum::serve(listener, app.into_make_service())
    .with_graceful_shutdown(async move {
            shutdown_token.cancelled().await;
    })
    .await?;

    drain_with_deadline("matching-consumer", async {
            let _ = consumer_handle.await;
    })
    .await;
    Ok(())
}
