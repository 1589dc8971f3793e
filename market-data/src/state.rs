//! Shared per-symbol projector state: book + ticker behind their own
//! `RwLock`s.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::warn;
use xcore::decimal::ScaledAmount;
use xcore::model::event::{MatchingEvent, MatchingEventData};
use xcore::repository::SymbolConfigRepository;

use crate::book::{BookSnapshot, SymbolBook};
use crate::pubsub::SubscriberHub;
use crate::ticker::{RecentTrade, SymbolTicker, TickerSnapshot};

struct SymbolState {
    book: RwLock<SymbolBook>,
    ticker: RwLock<SymbolTicker>,
}

impl SymbolState {
    fn new() -> Self {
        Self { book: RwLock::new(SymbolBook::new()), ticker: RwLock::new(SymbolTicker::new()) }
    }
}

#[derive(Clone)]
pub struct MarketDataState {
    symbols: Arc<DashMap<String, Arc<SymbolState>>>,
    symbol_configs: Arc<dyn SymbolConfigRepository>,
    pub hub: Arc<SubscriberHub>,
}

impl MarketDataState {
    pub fn new(symbol_configs: Arc<dyn SymbolConfigRepository>) -> Self {
        Self { symbols: Arc::new(DashMap::new()), symbol_configs, hub: Arc::new(SubscriberHub::new()) }
    }

    fn entry(&self, symbol: &str) -> Arc<SymbolState> {
        self.symbols.entry(symbol.to_string()).or_insert_with(|| Arc::new(SymbolState::new())).clone()
    }

    /// Applies one matching event's depth delta, folds trades into the
    /// rolling ticker, then republishes the fresh snapshot to subscribers.
    pub async fn apply_event(&self, event: &MatchingEvent) {
        let state = self.entry(&event.symbol);
        state.book.write().apply(event);

        if let MatchingEventData::TradeCreated { trade_id, price, qty, taker_side,.. } = &event.data {
            match self.symbol_configs.get(&event.symbol).await {
                Ok(Some(config)) => {
                    let quote_qty = price.mul_div_pow10(*qty, config.qty_precision).unwrap_or(ScaledAmount::ZERO);
                    state.ticker.write().record_trade(RecentTrade {
                            trade_id: *trade_id,
                            price: *price,
                            qty: *qty,
                            quote_qty,
                            taker_side: *taker_side,
                            transact_time_ms: event.timestamp_ms,
                    });
                }
                Ok(None) => warn!(symbol = %event.symbol, "TRADE_CREATED for unknown symbol, skipping ticker update"),
                Err(err) => warn!(symbol = %event.symbol, error = %err, "symbol config lookup failed, skipping ticker update"),
            }
        }

        let snapshot = state.book.read().snapshot(usize::MAX);
        self.hub.publish(&event.symbol, snapshot);
    }

    pub fn depth(&self, symbol: &str, limit: usize) -> BookSnapshot {
        self.entry(symbol).book.read().snapshot(limit)
    }

    pub fn recent_trades(&self, symbol: &str, limit: usize) -> Vec<RecentTrade> {
        self.entry(symbol).ticker.read().recent_trades(limit)
    }

    pub fn ticker(&self, symbol: &str, now_ms: i64) -> TickerSnapshot {
        self.entry(symbol).ticker.read().ticker(now_ms)
    }
}

#[cfg(test)]
mod tests {
    use xcore::model::order::Side;
    use xcore::model::symbol::{SymbolConfig, SymbolStatus};

    use super::*;
    use crate::repository::fake::InMemorySymbolConfigRepository;

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

    #[tokio::test]
    async fn trade_created_updates_ticker_and_publishes_depth() {
        let symbols = Arc::new(InMemorySymbolConfigRepository::new());
        symbols.insert(symbol());
        let state = MarketDataState::new(symbols);
        let mut rx = state.hub.subscribe("BTC_USDT");

        let accept = MatchingEvent::new(
            "BTC_USDT",
            1,
            1_700_000_000_000,
            MatchingEventData::OrderAccepted {
                order_id: 1,
                side: Side::Buy,
                price: Some(ScaledAmount::parse("100", 8).unwrap()),
                orig_qty: ScaledAmount::parse("1", 8).unwrap(),
            },
        );
        state.apply_event(&accept).await;

        let trade = MatchingEvent::new(
            "BTC_USDT",
            2,
            1_700_000_000_500,
            MatchingEventData::TradeCreated {
                trade_id: 9,
                maker_order_id: 1,
                taker_order_id: 2,
                maker_user_id: 1,
                taker_user_id: 2,
                price: ScaledAmount::parse("100", 8).unwrap(),
                qty: ScaledAmount::parse("1", 8).unwrap(),
                taker_side: Side::Sell,
            },
        );
        state.apply_event(&trade).await;

        let ticker = state.ticker("BTC_USDT", 1_700_000_001_000);
        assert_eq!(ticker.trade_count, 1);
        assert_eq!(ticker.last, Some(ScaledAmount::parse("100", 8).unwrap()));

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }
}
