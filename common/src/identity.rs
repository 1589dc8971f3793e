//! Authenticated request identity: resolved by the gateway's auth layer and
//! carried through to downstream services via trusted headers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Permissions(pub u32);

impl Permissions {
    pub const READ: u32 = 1;
    pub const TRADE: u32 = 2;
    pub const WITHDRAW: u32 = 4;

    pub fn has(self, bit: u32) -> bool {
        self.0 & bit == bit
    }
}

/// Resolved by C1, carried through the request, and echoed as `X-User-Id` /
/// `X-Internal-Token` by C2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    pub user_id: i64,
    pub permissions: u32,
    pub api_key: String,
}

impl AuthContext {
    pub fn has_permission(&self, bit: u32) -> bool {
        Permissions(self.permissions).has(bit)
    }
}

pub const HEADER_API_KEY: &str = "X-API-KEY";
pub const HEADER_API_TIMESTAMP: &str = "X-API-TIMESTAMP";
pub const HEADER_API_NONCE: &str = "X-API-NONCE";
pub const HEADER_API_SIGNATURE: &str = "X-API-SIGNATURE";
pub const HEADER_REQUEST_ID: &str = "X-Request-ID";
pub const HEADER_REQUEST_ID_ALT: &str = "X-Request-Id";
pub const HEADER_INTERNAL_TOKEN: &str = "X-Internal-Token";
pub const HEADER_USER_ID: &str = "X-User-Id";
pub const HEADER_USER_ID_ALT: &str = "X-User-ID";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_bits_combine_as_a_mask() {
        let ctx = AuthContext { user_id: 1, permissions: Permissions::READ | Permissions::TRADE, api_key: "k".into() };
        assert!(ctx.has_permission(Permissions::READ));
        assert!(ctx.has_permission(Permissions::TRADE));
        assert!(!ctx.has_permission(Permissions::WITHDRAW));
    }
}
