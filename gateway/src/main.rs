mod auth;
mod config;
mod handlers;
mod ip;
mod metrics_auth;
mod nonce;
mod permission;
mod proxy;
mod rate_limit;
mod signing;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{any, get};
use axum::{middleware, Router};
use clearing_client::verifier::HttpSignatureVerifierClient;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use xcore::log::{setup_logs, LogLevel};
use xcore::shutdown::{drain_with_deadline, wait_for_shutdown_signal};

use crate::auth::{AuthState, StaticApiKeyStore};
use crate::config::GatewayConfig;
use crate::nonce::NonceStore;
use crate::proxy::ProxyState;
use crate::rate_limit::RateLimitState;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    setup_logs(LogLevel::Info)?;
    let config = Arc::new(GatewayConfig::from_env()?);
    info!(bind_addr = %config.bind_addr, environment = %config.core.environment, "starting gateway");

    let verifier_client =
    Arc::new(HttpSignatureVerifierClient::new(&config.verifier_base_url, config.verifier_legacy_empty_body_retry)?);
    let auth_state = Arc::new(AuthState {
            config: config.clone(),
            secret_loader: Arc::new(StaticApiKeyStore::new()),
            verifier_client,
            nonce_store: Arc::new(NonceStore::new(config.time_window)),
    });
    let rate_limit_state =
    Arc::new(RateLimitState::new(config.ip_rate_limit, config.user_rate_limit, config.rate_limit_window));
    let order_proxy_state = Arc::new(ProxyState {
            config: config.clone(),
            http_client: reqwest::Client::new(),
            upstream_base_url: config.upstream_base_url.clone(),
    });
    // Market-data reads (depth/trades/ticker) fan out to the market-data
    // service directly rather than through the order-service.
    let market_data_proxy_state = Arc::new(ProxyState {
            config: config.clone(),
            http_client: reqwest::Client::new(),
            upstream_base_url: config.market_data_base_url.clone(),
    });

    let cors = build_cors_layer(&config)?;

    let public_routes = Router::new()
    .route("/live", get(handlers::live))
    .route("/health", get(handlers::health))
    .route("/ready", get(handlers::ready))
    .route(
        "/metrics",
        get(handlers::metrics)
        .layer(middleware::from_fn_with_state(config.clone(), metrics_auth::metrics_auth_middleware)),
    )
    .route("/v1/ping", get(handlers::ping))
    .route("/v1/time", get(handlers::server_time));

    let market_data_routes = Router::new()
    .route("/v1/depth", any(proxy::proxy_handler))
    .route("/v1/trades", any(proxy::proxy_handler))
    .route("/v1/ticker", any(proxy::proxy_handler))
    .with_state(market_data_proxy_state);

    let proxied_routes = Router::new()
    .route("/v1/exchangeInfo", any(proxy::proxy_handler))
    .route("/v1/auth/register", any(proxy::proxy_handler))
    .route("/v1/auth/login", any(proxy::proxy_handler))
    .route("/v1/apiKeys", any(proxy::proxy_handler))
    .route("/v1/apiKeys/*rest", any(proxy::proxy_handler))
    .route("/v1/order", any(proxy::proxy_handler))
    .route("/v1/openOrders", any(proxy::proxy_handler))
    .route("/v1/allOrders", any(proxy::proxy_handler))
    .route("/v1/myTrades", any(proxy::proxy_handler))
    .route("/v1/account", any(proxy::proxy_handler))
    .route("/v1/ledger", any(proxy::proxy_handler))
    .with_state(order_proxy_state)
    .merge(market_data_routes)
    .layer(middleware::from_fn(permission::permission_middleware))
    .layer(middleware::from_fn_with_state(auth_state.clone(), auth::auth_middleware))
    .layer(middleware::from_fn_with_state(rate_limit_state.clone(), rate_limit::user_rate_limit_middleware));

    let app = Router::new()
    .merge(public_routes)
    .merge(proxied_routes)
    .layer(middleware::from_fn_with_state(rate_limit_state, rate_limit::ip_rate_limit_middleware))
    .layer(cors)
    .layer(TraceLayer::new_for_http())
    .layer(tower_http::limit::RequestBodyLimitLayer::new(config.max_body_bytes));

    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let root_token = CancellationToken::new();
    let shutdown_token = root_token.clone();
    tokio::spawn(wait_for_shutdown_signal(root_token));

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
    .with_graceful_shutdown(async move {
            shutdown_token.cancelled().await;
    })
    .await?;

    drain_with_deadline("gateway", async { tokio::time::sleep(Duration::from_millis(0)).await }).await;
    Ok(())
}

fn build_cors_layer(config: &GatewayConfig) -> eyre::Result<CorsLayer> {
    let allow_origin = if config.core.cors_allow_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<_> = config
        .core
        .cors_allow_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
        AllowOrigin::list(origins)
    };
    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PUT,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
        ])
        .allow_headers([
                axum::http::HeaderName::from_static("x-api-key"),
                axum::http::HeaderName::from_static("x-api-timestamp"),
                axum::http::HeaderName::from_static("x-api-nonce"),
                axum::http::HeaderName::from_static("x-api-signature"),
                axum::http::HeaderName::from_static("x-request-id"),
                axum::http::header::CONTENT_TYPE,
    ]))
}
