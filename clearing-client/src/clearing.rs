//! Clearing RPC client — external collaborator, contract only.
//! Freeze/unfreeze/deduct/credit are idempotent on `idempotency_key`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use xcore::decimal::ScaledAmount;
use xcore::error::ErrorCode;

pub const CLEARING_RPC_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub enum RefType {
    Order,
    Withdraw,
    Deposit,
}

#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct ClearingRequest {
    pub idempotency_key: String,
    pub user_id: i64,
    pub asset: String,
    pub amount: ScaledAmount,
    pub ref_type: RefType,
    pub ref_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClearingResponse {
    pub success: bool,
    pub error_code: Option<String>,
}

/// Maps a clearing RPC's own error string onto our closed error-code set.
/// Unknown strings collapse to `Internal` rather than leaking a clearing-side
/// error string the caller can't act on.
pub fn clearing_error_code(response_error: Option<&str>) -> ErrorCode {
    match response_error {
        Some("INSUFFICIENT_BALANCE") => ErrorCode::InsufficientBalance,
        Some("IDEMPOTENCY_CONFLICT") => ErrorCode::IdempotencyConflict,
        Some("TIMEOUT") => ErrorCode::Timeout,
        Some("UNAVAILABLE") => ErrorCode::Unavailable,
        _ => ErrorCode::Internal,
    }
}

/// Narrow interface so order-service and matching-consumer can depend on a
/// trait object and be tested against an in-memory fake.
#[async_trait]
pub trait ClearingClient: Send + Sync {
    async fn freeze(&self, req: ClearingRequest) -> eyre::Result<ClearingResponse>;
    async fn unfreeze(&self, req: ClearingRequest) -> eyre::Result<ClearingResponse>;
    async fn deduct(&self, req: ClearingRequest) -> eyre::Result<ClearingResponse>;
    async fn credit(&self, req: ClearingRequest) -> eyre::Result<ClearingResponse>;
}

pub fn freeze_key(order_id: i64) -> String {
    format!("freeze:order:{order_id}")
}

pub fn unfreeze_key(order_id: i64, reason: Option<&str>) -> String {
    match reason {
        Some(reason) => format!("unfreeze:order:{order_id}:{reason}"),
        None => format!("unfreeze:order:{order_id}"),
    }
}

pub fn deposit_key(asset: &str, network: &str, txid: &str, vout: u32) -> String {
    format!("deposit:{asset}:{network}:{txid}:{vout}")
}

pub fn complete_withdraw_key(withdraw_id: &str) -> String {
    format!("complete:{withdraw_id}")
}

pub struct HttpClearingClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClearingClient {
    pub fn new(base_url: impl Into<String>) -> eyre::Result<Self> {
        let client = reqwest::Client::builder().timeout(CLEARING_RPC_TIMEOUT).build()?;
        Ok(Self { client, base_url: base_url.into() })
    }

    async fn call(&self, path: &str, req: &ClearingRequest) -> eyre::Result<ClearingResponse> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.post(&url).json(req).send().await?;
        let resp = resp.json::<ClearingResponse>().await?;
        Ok(resp)
    }
}

#[async_trait]
impl ClearingClient for HttpClearingClient {
    async fn freeze(&self, req: ClearingRequest) -> eyre::Result<ClearingResponse> {
        self.call("/internal/freeze", &req).await
    }
    async fn unfreeze(&self, req: ClearingRequest) -> eyre::Result<ClearingResponse> {
        self.call("/internal/unfreeze", &req).await
    }
    async fn deduct(&self, req: ClearingRequest) -> eyre::Result<ClearingResponse> {
        self.call("/internal/deduct", &req).await
    }
    async fn credit(&self, req: ClearingRequest) -> eyre::Result<ClearingResponse> {
        self.call("/internal/credit", &req).await
    }
}

/// In-memory fake for unit tests — deduplicates by idempotency key like the
/// real clearing service must.
pub mod fake {
    use std::sync::Arc;

    use dashmap::DashMap;

    use super::*;

    #[derive(Default)]
    pub struct FakeClearingClient {
        pub seen_keys: DashMap<String, ClearingResponse>,
        pub fail_keys: DashMap<String, String>,
    }

    impl FakeClearingClient {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn fail_with(&self, key: impl Into<String>, error_code: impl Into<String>) {
            self.fail_keys.insert(key.into(), error_code.into());
        }

        fn handle(&self, req: ClearingRequest) -> ClearingResponse {
            if let Some(existing) = self.seen_keys.get(&req.idempotency_key) {
                return existing.clone();
            }
            let resp = if let Some(code) = self.fail_keys.get(&req.idempotency_key) {
                ClearingResponse { success: false, error_code: Some(code.clone()) }
            } else {
                ClearingResponse { success: true, error_code: None }
            };
            self.seen_keys.insert(req.idempotency_key.clone(), resp.clone());
            resp
        }
    }

    #[async_trait]
    impl ClearingClient for FakeClearingClient {
        async fn freeze(&self, req: ClearingRequest) -> eyre::Result<ClearingResponse> {
            Ok(self.handle(req))
        }
        async fn unfreeze(&self, req: ClearingRequest) -> eyre::Result<ClearingResponse> {
            Ok(self.handle(req))
        }
        async fn deduct(&self, req: ClearingRequest) -> eyre::Result<ClearingResponse> {
            Ok(self.handle(req))
        }
        async fn credit(&self, req: ClearingRequest) -> eyre::Result<ClearingResponse> {
            Ok(self.handle(req))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeClearingClient;
    use super::*;

    #[tokio::test]
    async fn freeze_is_idempotent_on_key() {
        let client = FakeClearingClient::new();
        let req = ClearingRequest {
            idempotency_key: freeze_key(1),
            user_id: 1,
            asset: "USDT".into(),
            amount: ScaledAmount(100),
            ref_type: RefType::Order,
            ref_id: "1".into(),
        };
        let a = client.freeze(req.clone()).await.unwrap();
        let b = client.freeze(req).await.unwrap();
        assert!(a.success && b.success);
        assert_eq!(client.seen_keys.len(), 1);
    }

    #[test]
    fn key_naming_follows_snake_case_convention() {
        assert_eq!(freeze_key(42), "freeze:order:42");
        assert_eq!(unfreeze_key(42, None), "unfreeze:order:42");
        assert_eq!(unfreeze_key(42, Some("filled")), "unfreeze:order:42:filled");
        assert_eq!(deposit_key("BTC", "mainnet", "abc", 0), "deposit:BTC:mainnet:abc:0");
        assert_eq!(complete_withdraw_key("w1"), "complete:w1");
    }
}
