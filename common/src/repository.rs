//! Narrow persistence interfaces shared by `order-service` and
//! `matching-consumer`, in the same async-trait-with-fake style as
//! `clearing-client::ClearingClient`. Each binary supplies its own
//! `sqlx`-backed implementation; this crate only owns the contract so tests
//! can run against an in-memory fake without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::decimal::ScaledAmount;
use crate::model::order::{Order, OrderStatus};
use crate::model::symbol::SymbolConfig;
use crate::model::trade::Trade;

/// Filters for the history listing.
#[derive(Debug, Clone, Default)]
pub struct OrderHistoryFilter {
    pub symbol: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Insert a brand new order at status INIT. Returns `Ok(None)` if a
    /// `(user, client_order_id)` row already exists (caller should then
    /// fetch it and run idempotent recovery instead of treating this as an error).
    async fn insert_init(&self, order: Order) -> eyre::Result<Option<Order>>;

    async fn find_by_order_id(&self, order_id: i64) -> eyre::Result<Option<Order>>;

    async fn find_by_user_and_order_id(&self, user_id: i64, order_id: i64) -> eyre::Result<Option<Order>>;

    async fn find_by_user_and_client_order_id(
        &self,
        user_id: i64,
        client_order_id: &str,
    ) -> eyre::Result<Option<Order>>;

    /// CAS-like update: only applies if the row's current status is one of
    /// `from`. Returns the updated row, or `None` if the predicate didn't
    /// match (stale/duplicate delivery — caller treats as a no-op).
    async fn transition_status(
        &self,
        order_id: i64,
        from: &[OrderStatus],
        to: OrderStatus,
        reason: Option<String>,
    ) -> eyre::Result<Option<Order>>;

    /// Set `executed_qty` (and bump `updated_at`) only when the row's current
    /// status is one of `from`; used by ORDER_PARTIALLY_FILLED / ORDER_FILLED.
    async fn set_executed_qty(
        &self,
        order_id: i64,
        from: &[OrderStatus],
        to: OrderStatus,
        executed_qty: ScaledAmount,
    ) -> eyre::Result<Option<Order>>;

    /// Atomic `cumulative_quote_qty += delta`, avoiding the read-modify-write
    /// race calls out for trade-heavy orders.
    async fn add_cumulative_quote_qty(&self, order_id: i64, delta: ScaledAmount) -> eyre::Result<()>;

    async fn list_open(&self, user_id: i64, symbol: Option<&str>, limit: u32) -> eyre::Result<Vec<Order>>;

    async fn list_historical(&self, user_id: i64, filter: OrderHistoryFilter, limit: u32) -> eyre::Result<Vec<Order>>;
}

#[async_trait]
pub trait TradeRepository: Send + Sync {
    /// Insert a trade, ignoring the insert if `(maker_order, taker_order,
    /// price)` already exists. Returns whether a new row was
    /// actually inserted.
    async fn insert_if_absent(&self, trade: Trade) -> eyre::Result<bool>;

    async fn recent_for_user(&self, user_id: i64, symbol: Option<&str>, limit: u32) -> eyre::Result<Vec<Trade>>;
}

#[async_trait]
pub trait SymbolConfigRepository: Send + Sync {
    async fn get(&self, symbol: &str) -> eyre::Result<Option<SymbolConfig>>;

    async fn list(&self) -> eyre::Result<Vec<SymbolConfig>>;
}
