//! C1 permission enforcement: checks the authenticated
//! context's bitmask against a required bit, or a method -> bit table for a
//! given path. Must run after [`crate::auth::auth_middleware`] since it reads
//! the [`AuthContext`] that middleware inserts.

use axum::extract::Request;
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;
use xcore::error::{AppError, ErrorCode};
use xcore::identity::{AuthContext, Permissions};

/// GET => READ, everything else (POST/DELETE/PUT) => TRADE for
/// `/v1/order` and the other trading-scoped routes.
pub fn required_permission_for(method: &Method, path: &str) -> Option<u32> {
    if path == "/v1/account" || path == "/v1/ledger" {
        return Some(Permissions::READ);
    }
    if !path.starts_with("/v1/order")
    && !path.starts_with("/v1/openOrders")
    && !path.starts_with("/v1/allOrders")
    && !path.starts_with("/v1/myTrades")
    {
        return None;
    }
    Some(if *method == Method::GET { Permissions::READ } else { Permissions::TRADE })
}

pub async fn permission_middleware(req: Request, next: Next) -> Result<Response, AppError> {
    let required = required_permission_for(req.method(), req.uri().path());
    if let Some(bit) = required {
        let ctx = req
        .extensions()
        .get::<AuthContext>()
        .ok_or_else(|| AppError::new(ErrorCode::Unauthenticated))?;
        if !ctx.has_permission(bit) {
            return Err(AppError::new(ErrorCode::PermissionDenied));
        }
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_requires_read_post_requires_trade() {
        assert_eq!(required_permission_for(&Method::GET, "/v1/order"), Some(Permissions::READ));
        assert_eq!(required_permission_for(&Method::POST, "/v1/order"), Some(Permissions::TRADE));
        assert_eq!(required_permission_for(&Method::DELETE, "/v1/order"), Some(Permissions::TRADE));
    }

    #[test]
    fn unrelated_paths_require_nothing() {
        assert_eq!(required_permission_for(&Method::GET, "/v1/ping"), None);
    }
}
