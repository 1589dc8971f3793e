//! Closed-set error codes shared by every binary in the workspace: a stable
//! code identity plus a human message, expressed as a closed `enum` rather
//! than an opaque `u32` wrapper, since every code here is known up front.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(
        Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // validation
    InvalidParam,
    InvalidRequest,
    InvalidSide,
    InvalidOrderType,
    InvalidTimeInForce,
    InvalidPrice,
    InvalidQuantity,
    InvalidSymbolConfig,

    // auth
    Unauthenticated,
    InvalidApiKey,
    InvalidSignature,
    InvalidTimestamp,
    InvalidNonce,
    IpNotWhitelisted,
    ApiKeyDisabled,

    // permission
    PermissionDenied,
    UserFrozen,
    UserDisabled,

    // trading
    SymbolNotFound,
    SymbolNotTrading,
    PriceOutOfRange,
    QtyTooSmall,
    QtyTooLarge,
    NotionalTooSmall,
    OrderNotFound,
    OrderAlreadyCanceled,
    OrderAlreadyFilled,
    DuplicateClientOrderId,
    SelfTradeBlocked,
    PostOnlyRejected,
    NoReferencePrice,

    // clearing
    InsufficientBalance,
    FreezeFailure,
    UnfreezeFailure,
    SettleFailure,
    IdempotencyConflict,

    // infra
    RateLimited,
    Timeout,
    Unavailable,
    Internal,
    MaintenanceMode,
    RequestTooLarge,
    SystemBusy,
}

impl ErrorCode {
    /// Default, user-facing message for this code.
    pub fn default_message(self) -> &'static str {
        use ErrorCode::*;
        match self {
            InvalidParam => "invalid parameter",
            InvalidRequest => "invalid request",
            InvalidSide => "invalid side",
            InvalidOrderType => "invalid order type",
            InvalidTimeInForce => "invalid time in force",
            InvalidPrice => "invalid price",
            InvalidQuantity => "invalid quantity",
            InvalidSymbolConfig => "invalid symbol configuration",
            Unauthenticated => "authentication required",
            InvalidApiKey => "invalid api key",
            InvalidSignature => "invalid signature",
            InvalidTimestamp => "request timestamp outside allowed window",
            InvalidNonce => "nonce already used",
            IpNotWhitelisted => "ip address not allowed",
            ApiKeyDisabled => "api key disabled",
            PermissionDenied => "permission denied",
            UserFrozen => "user account frozen",
            UserDisabled => "user account disabled",
            SymbolNotFound => "symbol not found",
            SymbolNotTrading => "symbol is not trading",
            PriceOutOfRange => "price outside allowed deviation from reference price",
            QtyTooSmall => "quantity below minimum",
            QtyTooLarge => "quantity above maximum",
            NotionalTooSmall => "order notional below minimum",
            OrderNotFound => "order not found",
            OrderAlreadyCanceled => "order already canceled",
            OrderAlreadyFilled => "order already filled",
            DuplicateClientOrderId => "duplicate client order id",
            SelfTradeBlocked => "self trade blocked",
            PostOnlyRejected => "post-only order would have taken liquidity",
            NoReferencePrice => "no reference price available",
            InsufficientBalance => "insufficient balance",
            FreezeFailure => "failed to freeze funds",
            UnfreezeFailure => "failed to unfreeze funds",
            SettleFailure => "failed to settle funds",
            IdempotencyConflict => "idempotency key already used with different parameters",
            RateLimited => "too many requests",
            Timeout => "upstream timed out",
            Unavailable => "service unavailable",
            Internal => "internal error",
            MaintenanceMode => "service under maintenance",
            RequestTooLarge => "request body too large",
            SystemBusy => "system busy",
        }
    }

    pub fn retryable(self) -> bool {
        use ErrorCode::*;
        matches!(self, Timeout | Unavailable | SystemBusy | RateLimited | InvalidTimestamp)
    }

    pub fn http_status(self) -> StatusCode {
        use ErrorCode::*;
        match self {
            InvalidParam
            | InvalidRequest
            | InvalidSide
            | InvalidOrderType
            | InvalidTimeInForce
            | InvalidPrice
            | InvalidQuantity
            | InvalidSymbolConfig => StatusCode::BAD_REQUEST,

            Unauthenticated | InvalidApiKey | InvalidSignature | InvalidTimestamp | InvalidNonce
            | ApiKeyDisabled => StatusCode::UNAUTHORIZED,

            PermissionDenied | UserFrozen | UserDisabled | IpNotWhitelisted | PostOnlyRejected
            | SelfTradeBlocked => StatusCode::FORBIDDEN,

            SymbolNotFound | OrderNotFound => StatusCode::NOT_FOUND,

            SymbolNotTrading
            | PriceOutOfRange
            | QtyTooSmall
            | QtyTooLarge
            | NotionalTooSmall
            | OrderAlreadyCanceled
            | OrderAlreadyFilled
            | DuplicateClientOrderId
            | IdempotencyConflict
            | NoReferencePrice
            | InsufficientBalance => StatusCode::CONFLICT,

            RateLimited => StatusCode::TOO_MANY_REQUESTS,

            Timeout => StatusCode::GATEWAY_TIMEOUT,
            Unavailable | FreezeFailure | UnfreezeFailure | SettleFailure | SystemBusy => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            Internal | MaintenanceMode => StatusCode::INTERNAL_SERVER_ERROR,
            RequestTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

/// The application-wide error type. Carries a code, an optional override
/// message, and the request id it should be echoed with, so handlers can just
/// use `?` and a single `IntoResponse` impl produces the §6 JSON envelope.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    pub request_id: Option<String>,
    pub retry_after: Option<std::time::Duration>,
}

impl AppError {
    pub fn new(code: ErrorCode) -> Self {
        Self { code, message: code.default_message().to_string(), request_id: None, retry_after: None }
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), request_id: None, retry_after: None }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_retry_after(mut self, retry_after: std::time::Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

impl From<ErrorCode> for AppError {
    fn from(code: ErrorCode) -> Self {
        AppError::new(code)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: ErrorCode,
    message: String,
    retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.code.http_status();
        let retry_after = self.retry_after;
        let body = ErrorBody {
            code: self.code,
            message: self.message,
            retryable: self.code.retryable(),
            request_id: self.request_id,
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(retry_after) = retry_after {
            if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after.as_secs().to_string()) {
                response.headers_mut().insert(axum::http::header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_codes_are_transient_failures() {
        assert!(ErrorCode::Timeout.retryable());
        assert!(ErrorCode::Unavailable.retryable());
        assert!(ErrorCode::RateLimited.retryable());
        assert!(ErrorCode::InvalidTimestamp.retryable());
        assert!(!ErrorCode::InvalidSignature.retryable());
    }

    #[test]
    fn status_families_map_correctly() {
        assert_eq!(ErrorCode::InvalidParam.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::InvalidSignature.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::PermissionDenied.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::SymbolNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::RateLimited.http_status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ErrorCode::Internal.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ErrorCode::Unavailable.http_status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ErrorCode::Timeout.http_status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
