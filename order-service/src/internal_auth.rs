//! Verifies the gateway-set `X-Internal-Token` / `X-User-Id` headers are
//! present and the token matches this service's provisioned secret — the
//! downstream half of the internal trust boundary gateway's proxy hop
//! establishes. A request that reaches this service without a valid token
//! did not come through the gateway's reverse-proxy hop (C2) and is
//! rejected.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use xcore::error::{AppError, ErrorCode};
use xcore::identity::{HEADER_INTERNAL_TOKEN, HEADER_USER_ID, HEADER_USER_ID_ALT};

use crate::config::OrderServiceConfig;

pub struct AuthenticatedUser(pub i64);

pub async fn internal_auth_middleware(
    State(config): State<Arc<OrderServiceConfig>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
    .headers()
    .get(HEADER_INTERNAL_TOKEN)
    .and_then(|v| v.to_str().ok())
    .ok_or_else(|| AppError::new(ErrorCode::Unauthenticated))?;
    if token != config.core.internal_token {
        return Err(AppError::new(ErrorCode::Unauthenticated));
    }
    let user_id: i64 = req
    .headers()
    .get(HEADER_USER_ID)
    .or_else(|| req.headers().get(HEADER_USER_ID_ALT))
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.parse().ok())
    .ok_or_else(|| AppError::new(ErrorCode::Unauthenticated))?;
    req.extensions_mut().insert(AuthenticatedUser(user_id));
    Ok(next.run(req).await)
}
