//! C1: signature verification. Two modes selected by config:
//! local HMAC verification against a loaded secret, or delegation to a remote
//! signature-verifier RPC. Both populate an [`AuthContext`] the downstream
//! handlers and C2's proxy hop rely on.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use clearing_client::verifier::{classify_verifier_error, SignatureVerifierClient, VerifyRequest};
use sha2::Digest;
use xcore::error::{AppError, ErrorCode};
use xcore::identity::{AuthContext, HEADER_API_KEY, HEADER_API_NONCE, HEADER_API_SIGNATURE, HEADER_API_TIMESTAMP};

use crate::config::{GatewayConfig, VerificationMode};
use crate::ip::derive_client_ip;
use crate::nonce::NonceStore;
use crate::signing::{canonical_query, canonical_string, verify_signature};

#[derive(Debug, Clone)]
pub struct ApiKeySecret {
    pub secret: String,
    pub user_id: i64,
    pub permissions: u32,
}

/// Local-mode secret lookup, narrow enough to be faked in tests.
#[async_trait]
pub trait ApiKeySecretLoader: Send + Sync {
    async fn load(&self, api_key: &str) -> eyre::Result<Option<ApiKeySecret>>;
}

pub struct AuthState {
    pub config: Arc<GatewayConfig>,
    pub secret_loader: Arc<dyn ApiKeySecretLoader>,
    pub verifier_client: Arc<dyn SignatureVerifierClient>,
    pub nonce_store: Arc<NonceStore>,
}

fn missing_header(name: &str) -> AppError {
    AppError::with_message(ErrorCode::InvalidRequest, format!("missing required header: {name}"))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AppError> {
    headers.get(name).and_then(|v| v.to_str().ok()).ok_or_else(|| missing_header(name))
}

pub async fn auth_middleware(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let path = req.uri().path().to_string();
    if state.config.is_public_path(&path) {
        return Ok(next.run(req).await);
    }

    let headers = req.headers().clone();
    let api_key = header_str(&headers, HEADER_API_KEY)?.to_string();
    let timestamp_str = header_str(&headers, HEADER_API_TIMESTAMP)?;
    let timestamp_ms: i64 = timestamp_str
    .parse()
    .map_err(|_| AppError::new(ErrorCode::InvalidTimestamp))?;
    let nonce = header_str(&headers, HEADER_API_NONCE)?.to_string();
    let signature = header_str(&headers, HEADER_API_SIGNATURE)?.to_string();

    let method = req.method().to_string();
    let query_pairs: Vec<(String, String)> = req
    .uri()
    .query()
    .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
    .unwrap_or_default();
    let query = canonical_query(&query_pairs);

    let peer_ip: IpAddr = req
    .extensions()
    .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
    .map(|a| a.0.ip())
    .unwrap_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED));
    let forwarded_for = headers.get("X-Forwarded-For").and_then(|v| v.to_str().ok());
    let client_ip = derive_client_ip(peer_ip, forwarded_for, &state.config.trusted_proxy_cidrs);

    // Buffer the body once so we can both hash it for remote verification and
    // hand it unchanged to the next layer.
    let (parts, body) = req.into_parts();
    let body_bytes = to_bytes(body, state.config.max_body_bytes)
    .await
    .map_err(|_| AppError::new(ErrorCode::RequestTooLarge))?;
    let body_hash = {
        let mut hasher = sha2::Sha256::new();
        hasher.update(&body_bytes);
        hex::encode(hasher.finalize())
    };

    let auth_ctx = match state.config.verification_mode {
        VerificationMode::Local => {
            authenticate_local(
                &state,
                &api_key,
                timestamp_ms,
                &nonce,
                &signature,
                &method,
                parts.uri.path(),
                &query,
            )
            .await?
        }
        VerificationMode::Remote => {
            let body_str = String::from_utf8_lossy(&body_bytes).to_string();
            authenticate_remote(
                &state,
                VerifyRequest {
                    api_key: api_key.clone(),
                    timestamp_ms,
                    nonce: nonce.clone(),
                    signature: signature.clone(),
                    method: method.clone(),
                    path: parts.uri.path().to_string(),
                    query: query.clone(),
                    body: body_str,
                    body_hash: body_hash.clone(),
                    client_ip,
                },
            )
            .await?
        }
    };

    let mut req = Request::from_parts(parts, Body::from(body_bytes));
    req.extensions_mut().insert(auth_ctx);
    req.extensions_mut().insert(client_ip);
    Ok(next.run(req).await)
}

#[allow(clippy::too_many_arguments)]
async fn authenticate_local(
    state: &AuthState,
    api_key: &str,
    timestamp_ms: i64,
    nonce: &str,
    signature: &str,
    method: &str,
    path: &str,
    query: &str,
) -> Result<AuthContext, AppError> {
    let now_ms = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as i64;
    let window_ms = state.config.time_window.as_millis() as i64;
    if (now_ms - timestamp_ms).unsigned_abs() as i64 > window_ms {
        return Err(AppError::new(ErrorCode::InvalidTimestamp));
    }

    let secret = state
    .secret_loader
    .load(api_key)
    .await
    .map_err(|_| AppError::new(ErrorCode::Internal))?
    .ok_or_else(|| AppError::new(ErrorCode::InvalidApiKey))?;

    if !state.nonce_store.check_and_record(api_key, nonce) {
        return Err(AppError::new(ErrorCode::InvalidNonce));
    }

    let message = canonical_string(timestamp_ms, nonce, method, path, query);
    if !verify_signature(&secret.secret, &message, signature) {
        return Err(AppError::new(ErrorCode::InvalidSignature));
    }

    Ok(AuthContext { user_id: secret.user_id, permissions: secret.permissions, api_key: api_key.to_string() })
}

async fn authenticate_remote(state: &AuthState, req: VerifyRequest) -> Result<AuthContext, AppError> {
    let resp = state.verifier_client.verify(req).await.map_err(|err| {
            let msg = err.to_string().to_ascii_lowercase();
            let code = if msg.contains("timed out") || msg.contains("timeout") {
                ErrorCode::Timeout
            } else {
                ErrorCode::Unavailable
            };
            AppError::new(code)
    })?;

    if !resp.valid {
        let code = classify_verifier_error(resp.error.as_deref());
        return Err(AppError::new(code));
    }

    Ok(AuthContext {
            user_id: resp.user_id.unwrap_or_default(),
            permissions: resp.permissions.unwrap_or_default(),
            api_key: String::new(),
    })
}

/// Simple in-process loader for deployments that keep api-key secrets in a
/// local map rather than delegating to the remote verifier.
pub struct StaticApiKeyStore {
    pub keys: dashmap::DashMap<String, ApiKeySecret>,
}

impl StaticApiKeyStore {
    pub fn new() -> Self {
        Self { keys: dashmap::DashMap::new() }
    }

    pub fn insert(&self, api_key: impl Into<String>, secret: ApiKeySecret) {
        self.keys.insert(api_key.into(), secret);
    }
}

impl Default for StaticApiKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApiKeySecretLoader for StaticApiKeyStore {
    async fn load(&self, api_key: &str) -> eyre::Result<Option<ApiKeySecret>> {
        Ok(self.keys.get(api_key).map(|e| e.clone()))
    }
}

pub const DEFAULT_TIME_WINDOW: Duration = Duration::from_secs(30);

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_store_round_trips() {
        let store = StaticApiKeyStore::new();
        store.insert("k1", ApiKeySecret { secret: "s".into(), user_id: 7, permissions: 3 });
        let found = store.load("k1").await.unwrap().unwrap();
        assert_eq!(found.user_id, 7);
        assert!(store.load("missing").await.unwrap().is_none());
    }
}
