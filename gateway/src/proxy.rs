//! C2: reverse proxy hop. Strips client-supplied identity, injects the
//! gateway's own internal token and the authenticated user id, extends
//! `X-Forwarded-For`, and passes the request id through.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, Uri};
use axum::response::{IntoResponse, Response};
use xcore::error::{AppError, ErrorCode};
use xcore::identity::{
    AuthContext, HEADER_INTERNAL_TOKEN, HEADER_REQUEST_ID, HEADER_REQUEST_ID_ALT, HEADER_USER_ID, HEADER_USER_ID_ALT,
};

use crate::config::GatewayConfig;
use crate::ip::extend_forwarded_for;

pub struct ProxyState {
    pub config: Arc<GatewayConfig>,
    pub http_client: reqwest::Client,
    /// Distinct proxied paths fan out to distinct backends (order-service vs
    /// market-data), so each `ProxyState` pins its own target rather than
    /// sharing `config.upstream_base_url`.
    pub upstream_base_url: String,
}

fn strip_client_identity(req: &mut Request) {
    for name in [HEADER_INTERNAL_TOKEN, HEADER_USER_ID, HEADER_USER_ID_ALT] {
        req.headers_mut().remove(name);
    }
}

fn strip_user_id_from_query(uri: &Uri) -> Uri {
    let Some(query) = uri.query() else { return uri.clone() };
    let filtered: String = url::form_urlencoded::Serializer::new(String::new())
    .extend_pairs(url::form_urlencoded::parse(query.as_bytes()).filter(|(k, _)| k != "userId"))
    .finish();
    let mut parts = uri.clone().into_parts();
    let path = parts.path_and_query.as_ref().map(|pq| pq.path().to_string()).unwrap_or_default();
    let new_pq = if filtered.is_empty() { path } else { format!("{path}?{filtered}") };
    parts.path_and_query = Some(new_pq.parse().expect("rebuilt path+query is valid"));
    Uri::from_parts(parts).unwrap_or_else(|_| uri.clone())
}

pub async fn proxy_handler(State(state): State<Arc<ProxyState>>, mut req: Request) -> Result<Response, AppError> {
    let auth_ctx = req.extensions().get::<AuthContext>().cloned();
    let client_ip = req.extensions().get::<std::net::IpAddr>().copied();
    let request_id = req
    .headers()
    .get(HEADER_REQUEST_ID)
    .or_else(|| req.headers().get(HEADER_REQUEST_ID_ALT))
    .and_then(|v| v.to_str().ok())
    .map(|s| s.to_string())
    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    strip_client_identity(&mut req);
    let new_uri = strip_user_id_from_query(req.uri());
    *req.uri_mut() = new_uri;

    if let Some(ctx) = &auth_ctx {
        req.headers_mut().insert(
            HeaderName::from_static("x-user-id"),
            HeaderValue::from_str(&ctx.user_id.to_string()).map_err(|_| AppError::new(ErrorCode::Internal))?,
        );
    }
    req.headers_mut().insert(
        HeaderName::from_static("x-internal-token"),
        HeaderValue::from_str(&state.config.core.internal_token).map_err(|_| AppError::new(ErrorCode::Internal))?,
    );
    req.headers_mut().insert(
        HeaderName::from_static("x-request-id"),
        HeaderValue::from_str(&request_id).map_err(|_| AppError::new(ErrorCode::Internal))?,
    );
    if let Some(ip) = client_ip {
        let existing = req.headers().get("X-Forwarded-For").and_then(|v| v.to_str().ok()).map(|s| s.to_string());
        let peer_is_trusted = existing.is_some();
        let xff = extend_forwarded_for(existing.as_deref(), ip, peer_is_trusted);
        req.headers_mut().insert(
            HeaderName::from_static("x-forwarded-for"),
            HeaderValue::from_str(&xff).map_err(|_| AppError::new(ErrorCode::Internal))?,
        );
    }

    let (parts, body) = req.into_parts();
    let body_bytes = to_bytes(body, state.config.max_body_bytes)
    .await
    .map_err(|_| AppError::new(ErrorCode::RequestTooLarge))?;

    let upstream_url = format!(
        "{}{}",
        state.upstream_base_url,
        parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
    );

    let method = reqwest::Method::from_bytes(parts.method.as_str().as_bytes())
    .map_err(|_| AppError::new(ErrorCode::Internal))?;
    let mut builder = state.http_client.request(method, &upstream_url);
    for (name, value) in parts.headers.iter() {
        if name == axum::http::header::HOST {
            continue;
        }
        if let Ok(v) = value.to_str() {
            builder = builder.header(name.as_str(), v);
        }
    }
    builder = builder.body(body_bytes.to_vec());

    let upstream_resp = builder.send().await.map_err(|_| AppError::new(ErrorCode::Unavailable))?;
    let status = upstream_resp.status();
    let headers = upstream_resp.headers().clone();
    let body_bytes = upstream_resp.bytes().await.map_err(|_| AppError::new(ErrorCode::Unavailable))?;

    let mut response = Response::builder()
    .status(status.as_u16())
    .body(Body::from(body_bytes))
    .map_err(|_| AppError::new(ErrorCode::Internal))?;
    for (name, value) in headers.iter() {
        response.headers_mut().insert(
            HeaderName::from_bytes(name.as_str().as_bytes()).unwrap(),
            HeaderValue::from_bytes(value.as_bytes()).unwrap(),
        );
    }
    response
    .headers_mut()
    .insert(HeaderName::from_static("x-request-id"), HeaderValue::from_str(&request_id).unwrap());
    Ok(response.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_user_id_query_param_only() {
        let uri: Uri = "/v1/order?userId=7&symbol=BTC_USDT".parse().unwrap();
        let stripped = strip_user_id_from_query(&uri);
        assert_eq!(stripped.path(), "/v1/order");
        assert_eq!(stripped.query(), Some("symbol=BTC_USDT"));
    }

    #[test]
    fn leaves_uri_without_query_untouched() {
        let uri: Uri = "/v1/order".parse().unwrap();
        let stripped = strip_user_id_from_query(&uri);
        assert_eq!(stripped, uri);
    }
}
