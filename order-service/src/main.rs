mod config;
mod freeze;
mod http;
mod internal_auth;
mod order_stream;
mod price_reference;
mod repository;
mod service;
mod validation;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::{middleware, Router};
use clearing_client::HttpClearingClient;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;
use xcore::ids::IdGenerator;
use xcore::log::{setup_logs, LogLevel};
use xcore::shutdown::{drain_with_deadline, wait_for_shutdown_signal};

use crate::config::OrderServiceConfig;
use crate::http::AppState;
use crate::order_stream::OrderStreamProducer;
use crate::price_reference::PriceReferenceCache;
use crate::repository::{connect, PgOrderRepository, PgSymbolConfigRepository};
use crate::service::OrderService;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    setup_logs(LogLevel::Info)?;
    let config = OrderServiceConfig::from_env()?;
    info!(bind_addr = %config.bind_addr, environment = %config.core.environment, "starting order-service");

    let pool = connect(&config.database_url).await?;
    let orders = Arc::new(PgOrderRepository::new(pool.clone()));
    let symbols = Arc::new(PgSymbolConfigRepository::new(pool));
    let clearing = Arc::new(HttpClearingClient::new(&config.clearing_base_url)?);
    let price_reference = Arc::new(PriceReferenceCache::new(
            config.matching_depth_base_url.clone(),
            config.reference_price_ttl,
            config.matching_depth_timeout,
        )?);
    let order_stream = Arc::new(OrderStreamProducer::connect(&config.core.redis_addr, &config.order_stream_name).await?);

    let root_token = CancellationToken::new();
    let shutdown_token = root_token.clone();
    tokio::spawn(wait_for_shutdown_signal(root_token.clone()));

    let service = Arc::new(OrderService {
            ids: IdGenerator::new(),
            orders,
            symbols,
            clearing,
            price_reference,
            order_stream,
            shutdown: root_token,
            price_protection_enabled: config.price_protection_enabled,
            default_price_limit_rate: config.price_protection_default_limit_rate,
    });
    let state = Arc::new(AppState { service });

    let app = Router::new()
    .route("/v1/order", post(http::create_order).get(http::get_order).delete(http::cancel_order))
    .route("/v1/openOrders", get(http::list_open_orders))
    .route("/v1/allOrders", get(http::list_historical_orders))
    .route("/v1/exchangeInfo", get(http::exchange_info))
    .with_state(state)
    .layer(middleware::from_fn_with_state(
            Arc::new(config.clone()),
            internal_auth::internal_auth_middleware,
    ))
    .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
    .with_graceful_shutdown(async move {
            shutdown_token.cancelled().await;
    })
    .await?;

    drain_with_deadline("order-service", async { tokio::time::sleep(Duration::from_millis(0)).await }).await;
    Ok(())
}
