//! Event dispatch: one idempotent handler per
//! `MatchingEventType`, driven entirely by CAS-like repository predicates and
//! clearing's own key-based idempotency so at-least-once redelivery is safe.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use clearing_client::{unfreeze_key, ClearingClient, ClearingRequest, RefType};
use tracing::{error, warn};
use xcore::decimal::ScaledAmount;
use xcore::model::event::{MatchingEvent, MatchingEventData};
use xcore::model::order::{Order, OrderStatus, Side};
use xcore::repository::{OrderRepository, SymbolConfigRepository, TradeRepository};

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: MatchingEvent) -> eyre::Result<()>;
}

pub struct MatchingEventHandler {
    pub orders: Arc<dyn OrderRepository>,
    pub trades: Arc<dyn TradeRepository>,
    pub symbols: Arc<dyn SymbolConfigRepository>,
    pub clearing: Arc<dyn ClearingClient>,
    pub active_orders: AtomicI64,
}

impl MatchingEventHandler {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        trades: Arc<dyn TradeRepository>,
        symbols: Arc<dyn SymbolConfigRepository>,
        clearing: Arc<dyn ClearingClient>,
    ) -> Self {
        Self { orders, trades, symbols, clearing, active_orders: AtomicI64::new(0) }
    }

    async fn current_order(&self, order_id: i64) -> eyre::Result<Option<Order>> {
        self.orders.find_by_order_id(order_id).await
    }

    /// `price * orig_qty / 10^qtyPrecision`, the original pre-trade quote
    /// reservation for a BUY order.
    async fn total_frozen_quote(&self, order: &Order) -> eyre::Result<ScaledAmount> {
        let config = self.symbols.get(&order.symbol).await?;
        let Some(config) = config else { return Ok(ScaledAmount::ZERO) };
        let Some(price) = order.price else { return Ok(order.cumulative_quote_qty) };
        Ok(price.mul_div_pow10(order.orig_qty, config.qty_precision).unwrap_or(ScaledAmount::ZERO))
    }

    async fn unfreeze(&self, order: &Order, asset: &str, amount: ScaledAmount, reason: Option<&str>) {
        if amount.is_zero() {
            return;
        }
        let req = ClearingRequest {
            idempotency_key: unfreeze_key(order.id, reason),
            user_id: order.user_id,
            asset: asset.to_string(),
            amount,
            ref_type: RefType::Order,
            ref_id: order.id.to_string(),
        };
        if let Err(err) = self.clearing.unfreeze(req).await {
            error!(order_id = order.id, reason, error = %err, "CRITICAL: unfreeze call failed, orphaned reservation");
        }
    }

    async fn handle_accepted(&self, order_id: i64) -> eyre::Result<()> {
        self.orders.transition_status(order_id, &[OrderStatus::Init], OrderStatus::New, None).await?;
        self.active_orders.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn handle_partially_filled(&self, order_id: i64, executed_qty: ScaledAmount) -> eyre::Result<()> {
        self.orders
        .set_executed_qty(
            order_id,
            &[OrderStatus::New, OrderStatus::PartiallyFilled],
            OrderStatus::PartiallyFilled,
            executed_qty,
        )
        .await?;
        Ok(())
    }

    async fn handle_filled(&self, order_id: i64, executed_qty: ScaledAmount) -> eyre::Result<()> {
        self.orders
        .set_executed_qty(order_id, &[OrderStatus::New, OrderStatus::PartiallyFilled], OrderStatus::Filled, executed_qty)
        .await?;
        self.active_orders.fetch_sub(1, Ordering::Relaxed);
        let Some(order) = self.current_order(order_id).await? else {
            warn!(order_id, "ORDER_FILLED for unknown order, skipping unfreeze");
            return Ok(());
        };
        if order.side != Side::Buy {
            return Ok(());
        }
        let total_frozen_quote = self.total_frozen_quote(&order).await?;
        let amount = total_frozen_quote.saturating_sub_floor_zero(order.cumulative_quote_qty);
        self.unfreeze(&order, &self.quote_asset(&order).await?, amount, Some("filled")).await;
        Ok(())
    }

    async fn handle_canceled(&self, order_id: i64, leaves_qty: ScaledAmount, reason: String) -> eyre::Result<()> {
        self.orders
        .transition_status(
            order_id,
            &[OrderStatus::New, OrderStatus::PartiallyFilled],
            OrderStatus::Canceled,
            Some(reason),
        )
        .await?;
        self.active_orders.fetch_sub(1, Ordering::Relaxed);
        let Some(order) = self.current_order(order_id).await? else {
            warn!(order_id, "ORDER_CANCELED for unknown order, skipping unfreeze");
            return Ok(());
        };
        match order.side {
            Side::Sell => {
                let config = self.symbols.get(&order.symbol).await?;
                let asset = config.map(|c| c.base_asset).unwrap_or_default();
                self.unfreeze(&order, &asset, leaves_qty, None).await;
            }
            Side::Buy => {
                let total_frozen_quote = self.total_frozen_quote(&order).await?;
                let amount = total_frozen_quote.saturating_sub_floor_zero(order.cumulative_quote_qty);
                self.unfreeze(&order, &self.quote_asset(&order).await?, amount, None).await;
            }
        }
        Ok(())
    }

    async fn handle_rejected(&self, order_id: i64, reason: String) -> eyre::Result<()> {
        self.orders
        .transition_status(order_id, &[OrderStatus::Init, OrderStatus::New], OrderStatus::Rejected, Some(reason))
        .await?;
        let Some(order) = self.current_order(order_id).await? else {
            warn!(order_id, "ORDER_REJECTED for unknown order, skipping unfreeze");
            return Ok(());
        };
        match order.side {
            Side::Sell => {
                let config = self.symbols.get(&order.symbol).await?;
                let asset = config.map(|c| c.base_asset).unwrap_or_default();
                self.unfreeze(&order, &asset, order.orig_qty, Some("reject")).await;
            }
            Side::Buy => {
                let total_frozen_quote = self.total_frozen_quote(&order).await?;
                self.unfreeze(&order, &self.quote_asset(&order).await?, total_frozen_quote, Some("reject")).await;
            }
        }
        Ok(())
    }

    async fn handle_trade_created(
        &self,
        symbol: &str,
        trade_id: i64,
        maker_order_id: i64,
        taker_order_id: i64,
        maker_user_id: i64,
        taker_user_id: i64,
        price: ScaledAmount,
        qty: ScaledAmount,
        taker_side: Side,
        transact_time: chrono::DateTime<chrono::Utc>,
    ) -> eyre::Result<()> {
        let config = self.symbols.get(symbol).await?;
        let Some(config) = config else {
            warn!(symbol, "TRADE_CREATED for unknown symbol, skipping persistence");
            return Ok(());
        };
        let quote = price.mul_div_pow10(qty, config.qty_precision).unwrap_or(ScaledAmount::ZERO);
        let trade = xcore::model::trade::Trade {
            id: trade_id,
            symbol: symbol.to_string(),
            maker_order_id,
            taker_order_id,
            maker_user_id,
            taker_user_id,
            price,
            qty,
            quote_qty: quote,
            maker_fee: ScaledAmount::ZERO,
            taker_fee: ScaledAmount::ZERO,
            fee_asset: config.quote_asset,
            taker_side,
            transact_time,
        };
        let inserted = self.trades.insert_if_absent(trade).await?;
        if !inserted {
            return Ok(());
        }
        self.orders.add_cumulative_quote_qty(maker_order_id, quote).await?;
        self.orders.add_cumulative_quote_qty(taker_order_id, quote).await?;
        Ok(())
    }

    async fn quote_asset(&self, order: &Order) -> eyre::Result<String> {
        Ok(self.symbols.get(&order.symbol).await?.map(|c| c.quote_asset).unwrap_or_default())
    }
}

#[async_trait]
impl EventHandler for MatchingEventHandler {
    async fn handle(&self, event: MatchingEvent) -> eyre::Result<()> {
        match event.data {
            MatchingEventData::OrderAccepted { order_id,.. } => self.handle_accepted(order_id).await,
            MatchingEventData::OrderPartiallyFilled { order_id, executed_qty } => {
                self.handle_partially_filled(order_id, executed_qty).await
            }
            MatchingEventData::OrderFilled { order_id, executed_qty } => self.handle_filled(order_id, executed_qty).await,
            MatchingEventData::OrderCanceled { order_id, leaves_qty, reason } => {
                self.handle_canceled(order_id, leaves_qty, reason).await
            }
            MatchingEventData::OrderRejected { order_id, reason } => self.handle_rejected(order_id, reason).await,
            MatchingEventData::TradeCreated {
                trade_id,
                maker_order_id,
                taker_order_id,
                maker_user_id,
                taker_user_id,
                price,
                qty,
                taker_side,
            } => {
                let transact_time = chrono::DateTime::from_timestamp_millis(event.timestamp_ms).unwrap_or_else(chrono::Utc::now);
                self.handle_trade_created(
                    &event.symbol,
                    trade_id,
                    maker_order_id,
                    taker_order_id,
                    maker_user_id,
                    taker_user_id,
                    price,
                    qty,
                    taker_side,
                    transact_time,
                )
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use clearing_client::fake::FakeClearingClient;
    use xcore::model::order::{Order, OrderStatus, OrderType, TimeInForce};
    use xcore::model::symbol::{SymbolConfig, SymbolStatus};
    use xcore::repository::{OrderRepository, SymbolConfigRepository};

    use super::*;

    fn symbol() -> SymbolConfig {
        SymbolConfig {
            symbol: "BTC_USDT".into(),
            base_asset: "BTC".into(),
            quote_asset: "USDT".into(),
            price_tick: ScaledAmount::parse("0.01", 8).unwrap(),
            qty_step: ScaledAmount::parse("0.001", 8).unwrap(),
            price_precision: 8,
            qty_precision: 8,
            base_precision: 8,
            quote_precision: 8,
            min_qty: ScaledAmount::parse("0.001", 8).unwrap(),
            max_qty: ScaledAmount::parse("1000", 8).unwrap(),
            min_notional: ScaledAmount::parse("10", 8).unwrap(),
            price_limit_rate: None,
            maker_fee_rate: 0.0,
            taker_fee_rate: 0.0,
            status: SymbolStatus::Trading,
        }
    }

    fn buy_order(id: i64) -> Order {
        let now = Utc::now();
        Order {
            id,
            client_order_id: None,
            user_id: 1,
            symbol: "BTC_USDT".into(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::Gtc,
            price: Some(ScaledAmount::parse("100", 8).unwrap()),
            orig_qty: ScaledAmount::parse("0.2", 8).unwrap(),
            executed_qty: ScaledAmount::ZERO,
            cumulative_quote_qty: ScaledAmount::ZERO,
            status: OrderStatus::New,
            reject_reason: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
            transact_at: None,
        }
    }

    async fn fixture() -> (
        MatchingEventHandler,
        Arc<crate::repository::fake::InMemoryOrderRepository>,
        Arc<crate::repository::fake::InMemoryTradeRepository>,
    ) {
        let orders = Arc::new(crate::repository::fake::InMemoryOrderRepository::new());
        let trades = Arc::new(crate::repository::fake::InMemoryTradeRepository::new());
        let symbols = Arc::new(crate::repository::fake::InMemorySymbolConfigRepository::new());
        symbols.insert(symbol());
        let clearing = FakeClearingClient::new();
        orders.seed(buy_order(1));
        let handler = MatchingEventHandler::new(orders.clone(), trades.clone(), symbols, clearing);
        (handler, orders, trades)
    }

    #[tokio::test]
    async fn happy_path_limit_buy_order_fills_and_unfreezes() {
        let (handler, orders, trades) = fixture().await;
        handler.handle_accepted(1).await.unwrap();
        handler
        .handle_trade_created(
            "BTC_USDT",
            100,
            1,
            2,
            1,
            2,
            ScaledAmount::parse("100", 8).unwrap(),
            ScaledAmount::parse("0.2", 8).unwrap(),
            Side::Sell,
            Utc::now(),
        )
        .await
        .unwrap();
        handler.handle_filled(1, ScaledAmount::parse("0.2", 8).unwrap()).await.unwrap();

        let order = orders.find_by_order_id(1).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.cumulative_quote_qty, ScaledAmount::parse("20", 8).unwrap());
        assert_eq!(trades.recent_for_user(1, None, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_trade_delivery_does_not_double_count() {
        let (handler, orders, _trades) = fixture().await;
        handler.handle_accepted(1).await.unwrap();
        for _ in 0..2 {
            handler
            .handle_trade_created(
                "BTC_USDT",
                100,
                1,
                2,
                1,
                2,
                ScaledAmount::parse("100", 8).unwrap(),
                ScaledAmount::parse("0.1", 8).unwrap(),
                Side::Sell,
                Utc::now(),
            )
            .await
            .unwrap();
        }
        let order = orders.find_by_order_id(1).await.unwrap().unwrap();
        assert_eq!(order.cumulative_quote_qty, ScaledAmount::parse("10", 8).unwrap());
    }

    #[tokio::test]
    async fn cancel_unfreezes_residual_quote() {
        let (handler, orders, _) = fixture().await;
        handler.handle_accepted(1).await.unwrap();
        handler
        .handle_trade_created(
            "BTC_USDT",
            100,
            1,
            2,
            1,
            2,
            ScaledAmount::parse("100", 8).unwrap(),
            ScaledAmount::parse("0.12", 8).unwrap(),
            Side::Sell,
            Utc::now(),
        )
        .await
        .unwrap();
        handler.handle_partially_filled(1, ScaledAmount::parse("0.12", 8).unwrap()).await.unwrap();
        handler
        .handle_canceled(1, ScaledAmount::parse("0.08", 8).unwrap(), "user_requested".into())
        .await
        .unwrap();
        let order = orders.find_by_order_id(1).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Canceled);
    }
}
