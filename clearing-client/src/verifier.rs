//! Remote signature-verifier RPC client.
//! The verifier is responsible for time-window, nonce-replay, api-key state
//! and IP allow-listing; this client only forwards the payload and classifies
//! the verifier's error string onto our closed `ErrorCode` set.

use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use xcore::error::ErrorCode;

pub const VERIFIER_RPC_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Serialize)]
pub struct VerifyRequest {
    pub api_key: String,
    pub timestamp_ms: i64,
    pub nonce: String,
    pub signature: String,
    pub method: String,
    pub path: String,
    pub query: String,
    pub body: String,
    pub body_hash: String,
    pub client_ip: IpAddr,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub user_id: Option<i64>,
    pub permissions: Option<u32>,
    pub error: Option<String>,
}

/// Classification table from
pub fn classify_verifier_error(error: Option<&str>) -> ErrorCode {
    match error {
        None => ErrorCode::InvalidSignature,
        Some(e) => {
            let e = e.to_ascii_lowercase();
            if e.contains("timestamp") {
                ErrorCode::InvalidTimestamp
            } else if e.contains("nonce") {
                ErrorCode::InvalidNonce
            } else if e.contains("api_key") || e.contains("api key") || e.contains("unknown key") {
                ErrorCode::InvalidApiKey
            } else if e.contains("ip") && e.contains("whitelist") {
                ErrorCode::IpNotWhitelisted
            } else if e.contains("frozen") {
                ErrorCode::UserFrozen
            } else if e.contains("disabled") {
                ErrorCode::UserDisabled
            } else if e.contains("timeout") {
                ErrorCode::Timeout
            } else if e.contains("unavailable") {
                ErrorCode::Unavailable
            } else {
                ErrorCode::InvalidSignature
            }
        }
    }
}

#[async_trait::async_trait]
pub trait SignatureVerifierClient: Send + Sync {
    async fn verify(&self, req: VerifyRequest) -> eyre::Result<VerifyResponse>;
}

pub struct HttpSignatureVerifierClient {
    client: reqwest::Client,
    base_url: String,
    /// Legacy mode: retry once with an empty body if verification failed and
    /// the original body was empty.
    pub legacy_empty_body_retry: bool,
}

impl HttpSignatureVerifierClient {
    pub fn new(base_url: impl Into<String>, legacy_empty_body_retry: bool) -> eyre::Result<Self> {
        let client = reqwest::Client::builder().timeout(VERIFIER_RPC_TIMEOUT).build()?;
        Ok(Self { client, base_url: base_url.into(), legacy_empty_body_retry })
    }

    async fn call(&self, req: &VerifyRequest) -> eyre::Result<VerifyResponse> {
        let url = format!("{}/internal/verify-signature", self.base_url);
        let resp = self.client.post(&url).json(req).send().await?;
        Ok(resp.json::<VerifyResponse>().await?)
    }
}

#[async_trait::async_trait]
impl SignatureVerifierClient for HttpSignatureVerifierClient {
    async fn verify(&self, req: VerifyRequest) -> eyre::Result<VerifyResponse> {
        let resp = self.call(&req).await?;
        if !resp.valid && self.legacy_empty_body_retry && req.body.is_empty() {
            // some legacy callers hashed an absent body differently; retry once
            let mut retry_req = req;
            retry_req.body_hash.clear();
            return self.call(&retry_req).await;
        }
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_errors() {
        assert_eq!(classify_verifier_error(Some("timestamp out of window")), ErrorCode::InvalidTimestamp);
        assert_eq!(classify_verifier_error(Some("nonce already used")), ErrorCode::InvalidNonce);
        assert_eq!(classify_verifier_error(Some("unknown api_key")), ErrorCode::InvalidApiKey);
        assert_eq!(classify_verifier_error(Some("ip not whitelisted")), ErrorCode::IpNotWhitelisted);
        assert_eq!(classify_verifier_error(Some("user frozen")), ErrorCode::UserFrozen);
        assert_eq!(classify_verifier_error(Some("user disabled")), ErrorCode::UserDisabled);
        assert_eq!(classify_verifier_error(Some("gateway timeout")), ErrorCode::Timeout);
        assert_eq!(classify_verifier_error(Some("verifier unavailable")), ErrorCode::Unavailable);
        assert_eq!(classify_verifier_error(Some("garbage")), ErrorCode::InvalidSignature);
        assert_eq!(classify_verifier_error(None), ErrorCode::InvalidSignature);
    }
}
