//! `sqlx`/Postgres-backed implementations of [`xcore::repository`]'s traits
//! for this consumer's own connection pool, plus in-memory fakes for tests —
//! same split as `order_service::repository` (each deployable owns its data
//! access layer).

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use xcore::decimal::ScaledAmount;
use xcore::model::order::{Order, OrderStatus, OrderType, Side, TimeInForce};
use xcore::model::symbol::SymbolConfig;
use xcore::model::trade::Trade;
use xcore::repository::{OrderHistoryFilter, OrderRepository, SymbolConfigRepository, TradeRepository};

pub async fn connect(database_url: &str) -> eyre::Result<PgPool> {
    let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;
    Ok(pool)
}

pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_order(row: &sqlx::postgres::PgRow) -> eyre::Result<Order> {
        let status: String = row.try_get("status")?;
        let side: String = row.try_get("side")?;
        let order_type: String = row.try_get("order_type")?;
        let tif: String = row.try_get("time_in_force")?;
        let price_text: Option<String> = row.try_get("price")?;
        Ok(Order {
                id: row.try_get("id")?,
                client_order_id: row.try_get("client_order_id")?,
                user_id: row.try_get("user_id")?,
                symbol: row.try_get("symbol")?,
                side: Side::from_str(&side)?,
                order_type: OrderType::from_str(&order_type)?,
                time_in_force: TimeInForce::from_str(&tif)?,
                price: price_text.map(|s| ScaledAmount::from_str(&s)).transpose()?,
                orig_qty: ScaledAmount::from_str(&row.try_get::<String, _>("orig_qty")?)?,
                executed_qty: ScaledAmount::from_str(&row.try_get::<String, _>("executed_qty")?)?,
                cumulative_quote_qty: ScaledAmount::from_str(&row.try_get::<String, _>("cumulative_quote_qty")?)?,
                status: OrderStatus::from_str(&status)?,
                reject_reason: row.try_get("reject_reason")?,
                cancel_reason: row.try_get("cancel_reason")?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
                transact_at: row.try_get("transact_at")?,
        })
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert_init(&self, _order: Order) -> eyre::Result<Option<Order>> {
        // C4 never originates orders; only C3 inserts at INIT.
        eyre::bail!("matching-consumer does not create orders")
    }

    async fn find_by_order_id(&self, order_id: i64) -> eyre::Result<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1").bind(order_id).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn find_by_user_and_order_id(&self, user_id: i64, order_id: i64) -> eyre::Result<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE user_id = $1 AND id = $2")
        .bind(user_id)
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn find_by_user_and_client_order_id(
        &self,
        user_id: i64,
        client_order_id: &str,
    ) -> eyre::Result<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE user_id = $1 AND client_order_id = $2")
        .bind(user_id)
        .bind(client_order_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn transition_status(
        &self,
        order_id: i64,
        from: &[OrderStatus],
        to: OrderStatus,
        reason: Option<String>,
    ) -> eyre::Result<Option<Order>> {
        let from_strings: Vec<String> = from.iter().map(|s| s.to_string()).collect();
        let is_cancel = matches!(to, OrderStatus::Canceled);
        let row = sqlx::query(
            "UPDATE orders SET status = $1, updated_at = now(), \
            cancel_reason = CASE WHEN $2 THEN $4 ELSE cancel_reason END, \
            reject_reason = CASE WHEN NOT $2 THEN $4 ELSE reject_reason END \
            WHERE id = $3 AND status = ANY($5) RETURNING *",
        )
        .bind(to.to_string())
        .bind(is_cancel)
        .bind(order_id)
        .bind(reason)
        .bind(&from_strings)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn set_executed_qty(
        &self,
        order_id: i64,
        from: &[OrderStatus],
        to: OrderStatus,
        executed_qty: ScaledAmount,
    ) -> eyre::Result<Option<Order>> {
        let from_strings: Vec<String> = from.iter().map(|s| s.to_string()).collect();
        let row = sqlx::query(
            "UPDATE orders SET status = $1, executed_qty = $2, updated_at = now() \
            WHERE id = $3 AND status = ANY($4) RETURNING *",
        )
        .bind(to.to_string())
        .bind(executed_qty.to_string())
        .bind(order_id)
        .bind(&from_strings)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(Self::row_to_order).transpose()
    }

    async fn add_cumulative_quote_qty(&self, order_id: i64, delta: ScaledAmount) -> eyre::Result<()> {
        sqlx::query(
            "UPDATE orders SET cumulative_quote_qty = (cumulative_quote_qty::numeric + $1::numeric)::text, \
            updated_at = now() WHERE id = $2",
        )
        .bind(delta.to_string())
        .bind(order_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_open(&self, user_id: i64, symbol: Option<&str>, limit: u32) -> eyre::Result<Vec<Order>> {
        let limit = limit.clamp(1, 500) as i64;
        let rows = sqlx::query(
            "SELECT * FROM orders WHERE user_id = $1 AND status IN ('NEW','PARTIALLY_FILLED') \
            AND ($2::text IS NULL OR symbol = $2) ORDER BY created_at DESC LIMIT $3",
        )
        .bind(user_id)
        .bind(symbol)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_order).collect()
    }

    async fn list_historical(&self, user_id: i64, filter: OrderHistoryFilter, limit: u32) -> eyre::Result<Vec<Order>> {
        let limit = limit.clamp(1, 1000) as i64;
        let start = filter.start.unwrap_or_else(|| Utc::now() - chrono::Duration::days(7));
        let end = filter.end.unwrap_or_else(Utc::now);
        let rows = sqlx::query(
            "SELECT * FROM orders WHERE user_id = $1 AND ($2::text IS NULL OR symbol = $2) \
            AND created_at BETWEEN $3 AND $4 ORDER BY created_at DESC LIMIT $5",
        )
        .bind(user_id)
        .bind(filter.symbol.as_deref())
        .bind(start)
        .bind(end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_order).collect()
    }
}

pub struct PgTradeRepository {
    pool: PgPool,
}

impl PgTradeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_trade(row: &sqlx::postgres::PgRow) -> eyre::Result<Trade> {
        let side: String = row.try_get("taker_side")?;
        Ok(Trade {
                id: row.try_get("id")?,
                symbol: row.try_get("symbol")?,
                maker_order_id: row.try_get("maker_order_id")?,
                taker_order_id: row.try_get("taker_order_id")?,
                maker_user_id: row.try_get("maker_user_id")?,
                taker_user_id: row.try_get("taker_user_id")?,
                price: ScaledAmount::from_str(&row.try_get::<String, _>("price")?)?,
                qty: ScaledAmount::from_str(&row.try_get::<String, _>("qty")?)?,
                quote_qty: ScaledAmount::from_str(&row.try_get::<String, _>("quote_qty")?)?,
                maker_fee: ScaledAmount::ZERO,
                taker_fee: ScaledAmount::ZERO,
                fee_asset: row.try_get("fee_asset")?,
                taker_side: Side::from_str(&side)?,
                transact_time: row.try_get("transact_time")?,
        })
    }
}

#[async_trait]
impl TradeRepository for PgTradeRepository {
    async fn insert_if_absent(&self, trade: Trade) -> eyre::Result<bool> {
        let result = sqlx::query(
            "INSERT INTO trades (id, symbol, maker_order_id, taker_order_id, maker_user_id, taker_user_id, price, \
            qty, quote_qty, fee_asset, taker_side, transact_time) \
        VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12) \
        ON CONFLICT (maker_order_id, taker_order_id, price) DO NOTHING",
    )
    .bind(trade.id)
    .bind(&trade.symbol)
    .bind(trade.maker_order_id)
    .bind(trade.taker_order_id)
    .bind(trade.maker_user_id)
    .bind(trade.taker_user_id)
    .bind(trade.price.to_string())
    .bind(trade.qty.to_string())
    .bind(trade.quote_qty.to_string())
    .bind(&trade.fee_asset)
    .bind(trade.taker_side.to_string())
    .bind(trade.transact_time)
    .execute(&self.pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

async fn recent_for_user(&self, user_id: i64, symbol: Option<&str>, limit: u32) -> eyre::Result<Vec<Trade>> {
    let limit = limit.clamp(1, 1000) as i64;
    let rows = sqlx::query(
        "SELECT * FROM trades WHERE (maker_user_id = $1 OR taker_user_id = $1) \
        AND ($2::text IS NULL OR symbol = $2) ORDER BY transact_time DESC LIMIT $3",
    )
    .bind(user_id)
    .bind(symbol)
    .bind(limit)
    .fetch_all(&self.pool)
    .await?;
    rows.iter().map(Self::row_to_trade).collect()
}
}

pub struct PgSymbolConfigRepository {
    pool: PgPool,
}

impl PgSymbolConfigRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SymbolConfigRepository for PgSymbolConfigRepository {
    async fn get(&self, symbol: &str) -> eyre::Result<Option<SymbolConfig>> {
        let row = sqlx::query("SELECT * FROM symbol_configs WHERE symbol = $1")
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_symbol_config(&r)).transpose()
    }

    async fn list(&self) -> eyre::Result<Vec<SymbolConfig>> {
        let rows = sqlx::query("SELECT * FROM symbol_configs ORDER BY symbol").fetch_all(&self.pool).await?;
        rows.iter().map(row_to_symbol_config).collect()
    }
}

fn row_to_symbol_config(row: &sqlx::postgres::PgRow) -> eyre::Result<SymbolConfig> {
    let status: String = row.try_get("status")?;
    Ok(SymbolConfig {
            symbol: row.try_get("symbol")?,
            base_asset: row.try_get("base_asset")?,
            quote_asset: row.try_get("quote_asset")?,
            price_tick: ScaledAmount::from_str(&row.try_get::<String, _>("price_tick")?)?,
            qty_step: ScaledAmount::from_str(&row.try_get::<String, _>("qty_step")?)?,
            price_precision: row.try_get::<i32, _>("price_precision")? as u32,
            qty_precision: row.try_get::<i32, _>("qty_precision")? as u32,
            base_precision: row.try_get::<i32, _>("base_precision")? as u32,
            quote_precision: row.try_get::<i32, _>("quote_precision")? as u32,
            min_qty: ScaledAmount::from_str(&row.try_get::<String, _>("min_qty")?)?,
            max_qty: ScaledAmount::from_str(&row.try_get::<String, _>("max_qty")?)?,
            min_notional: ScaledAmount::from_str(&row.try_get::<String, _>("min_notional")?)?,
            price_limit_rate: row.try_get("price_limit_rate")?,
            maker_fee_rate: row.try_get("maker_fee_rate")?,
            taker_fee_rate: row.try_get("taker_fee_rate")?,
            status: xcore::model::symbol::SymbolStatus::from_str(&status)?,
    })
}

/// In-memory fakes for unit tests, mirroring `order_service::repository::fake`.
pub mod fake {
    use super::*;

    #[derive(Default)]
    pub struct InMemoryOrderRepository {
        orders: RwLock<HashMap<i64, Order>>,
    }

    impl InMemoryOrderRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seed(&self, order: Order) {
            self.orders.write().insert(order.id, order);
        }
    }

    #[async_trait]
    impl OrderRepository for InMemoryOrderRepository {
        async fn insert_init(&self, order: Order) -> eyre::Result<Option<Order>> {
            self.orders.write().insert(order.id, order.clone());
            Ok(Some(order))
        }

        async fn find_by_order_id(&self, order_id: i64) -> eyre::Result<Option<Order>> {
            Ok(self.orders.read().get(&order_id).cloned())
        }

        async fn find_by_user_and_order_id(&self, user_id: i64, order_id: i64) -> eyre::Result<Option<Order>> {
            Ok(self.orders.read().get(&order_id).filter(|o| o.user_id == user_id).cloned())
        }

        async fn find_by_user_and_client_order_id(
            &self,
            user_id: i64,
            client_order_id: &str,
        ) -> eyre::Result<Option<Order>> {
            Ok(self
                .orders
                .read()
                .values()
                .find(|o| o.user_id == user_id && o.client_order_id.as_deref() == Some(client_order_id))
                .cloned())
        }

        async fn transition_status(
            &self,
            order_id: i64,
            from: &[OrderStatus],
            to: OrderStatus,
            reason: Option<String>,
        ) -> eyre::Result<Option<Order>> {
            let mut orders = self.orders.write();
            let Some(order) = orders.get_mut(&order_id) else { return Ok(None) };
            if !from.contains(&order.status) {
                return Ok(None);
            }
            order.status = to;
            order.updated_at = Utc::now();
            if matches!(to, OrderStatus::Canceled) {
                order.cancel_reason = reason;
            } else {
                order.reject_reason = reason;
            }
            Ok(Some(order.clone()))
        }

        async fn set_executed_qty(
            &self,
            order_id: i64,
            from: &[OrderStatus],
            to: OrderStatus,
            executed_qty: ScaledAmount,
        ) -> eyre::Result<Option<Order>> {
            let mut orders = self.orders.write();
            let Some(order) = orders.get_mut(&order_id) else { return Ok(None) };
            if !from.contains(&order.status) {
                return Ok(None);
            }
            order.status = to;
            order.executed_qty = executed_qty;
            order.updated_at = Utc::now();
            Ok(Some(order.clone()))
        }

        async fn add_cumulative_quote_qty(&self, order_id: i64, delta: ScaledAmount) -> eyre::Result<()> {
            if let Some(order) = self.orders.write().get_mut(&order_id) {
                order.cumulative_quote_qty = order.cumulative_quote_qty.checked_add(delta)?;
            }
            Ok(())
        }

        async fn list_open(&self, user_id: i64, symbol: Option<&str>, limit: u32) -> eyre::Result<Vec<Order>> {
            let limit = limit.clamp(1, 500) as usize;
            let mut out: Vec<Order> = self
            .orders
            .read()
            .values()
            .filter(|o| o.user_id == user_id && o.is_on_book())
            .filter(|o| symbol.is_none_or(|s| o.symbol == s))
            .cloned()
            .collect();
            out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            out.truncate(limit);
            Ok(out)
        }

        async fn list_historical(
            &self,
            user_id: i64,
            filter: OrderHistoryFilter,
            limit: u32,
        ) -> eyre::Result<Vec<Order>> {
            let limit = limit.clamp(1, 1000) as usize;
            let mut out: Vec<Order> = self
            .orders
            .read()
            .values()
            .filter(|o| o.user_id == user_id)
            .filter(|o| filter.symbol.as_deref().is_none_or(|s| o.symbol == s))
            .cloned()
            .collect();
            out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            out.truncate(limit);
            Ok(out)
        }
    }

    #[derive(Default)]
    pub struct InMemoryTradeRepository {
        trades: RwLock<Vec<Trade>>,
    }

    impl InMemoryTradeRepository {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl TradeRepository for InMemoryTradeRepository {
        async fn insert_if_absent(&self, trade: Trade) -> eyre::Result<bool> {
            let mut trades = self.trades.write();
            if trades.iter().any(|t| t.dedup_key() == trade.dedup_key()) {
                return Ok(false);
            }
            trades.push(trade);
            Ok(true)
        }

        async fn recent_for_user(&self, user_id: i64, symbol: Option<&str>, limit: u32) -> eyre::Result<Vec<Trade>> {
            let limit = limit.clamp(1, 1000) as usize;
            let mut out: Vec<Trade> = self
            .trades
            .read()
            .iter()
            .filter(|t| t.maker_user_id == user_id || t.taker_user_id == user_id)
            .filter(|t| symbol.is_none_or(|s| t.symbol == s))
            .cloned()
            .collect();
            out.sort_by(|a, b| b.transact_time.cmp(&a.transact_time));
            out.truncate(limit);
            Ok(out)
        }
    }

    #[derive(Default)]
    pub struct InMemorySymbolConfigRepository {
        configs: RwLock<HashMap<String, SymbolConfig>>,
    }

    impl InMemorySymbolConfigRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, config: SymbolConfig) {
            self.configs.write().insert(config.symbol.clone(), config);
        }
    }

    #[async_trait]
    impl SymbolConfigRepository for InMemorySymbolConfigRepository {
        async fn get(&self, symbol: &str) -> eyre::Result<Option<SymbolConfig>> {
            Ok(self.configs.read().get(symbol).cloned())
        }

        async fn list(&self) -> eyre::Result<Vec<SymbolConfig>> {
            Ok(self.configs.read().values().cloned().collect())
        }
    }
}
