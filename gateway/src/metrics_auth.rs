//! Optional gate on `GET /metrics`: checks a bearer token or
//! `X-Metrics-Token` header. When no token is configured the endpoint stays
//! public.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use xcore::error::{AppError, ErrorCode};

use crate::config::GatewayConfig;

pub async fn metrics_auth_middleware(
    State(config): State<Arc<GatewayConfig>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = &config.metrics_token else {
        return Ok(next.run(req).await);
    };
    let bearer_ok = req
    .headers()
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(|token| token == expected)
    .unwrap_or(false);
    let token_header_ok = req
    .headers()
    .get("X-Metrics-Token")
    .and_then(|v| v.to_str().ok())
    .map(|v| v == expected)
    .unwrap_or(false);
    if bearer_ok || token_header_ok {
        Ok(next.run(req).await)
    } else {
        Err(AppError::new(ErrorCode::Unauthenticated))
    }
}
