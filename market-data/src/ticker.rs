//! Recent-trade ring buffer and rolling 24h ticker.

use std::collections::VecDeque;

use xcore::decimal::ScaledAmount;
use xcore::model::order::Side;

const TRADE_RING_CAPACITY: usize = 1000;
const TICKER_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy)]
pub struct RecentTrade {
    pub trade_id: i64,
    pub price: ScaledAmount,
    pub qty: ScaledAmount,
    pub quote_qty: ScaledAmount,
    pub taker_side: Side,
    pub transact_time_ms: i64,
}

#[derive(Debug, Clone, Default)]
pub struct TickerSnapshot {
    pub open: Option<ScaledAmount>,
    pub high: Option<ScaledAmount>,
    pub low: Option<ScaledAmount>,
    pub last: Option<ScaledAmount>,
    pub volume: ScaledAmount,
    pub quote_volume: ScaledAmount,
    pub trade_count: u64,
    pub percent_change: f64,
}

/// Bounded ring of the most recent trades for one symbol, used both to serve
/// `/v1/trades` and to fold a rolling 24h ticker on read.
pub struct SymbolTicker {
    trades: VecDeque<RecentTrade>,
}

impl Default for SymbolTicker {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTicker {
    pub fn new() -> Self {
        Self { trades: VecDeque::with_capacity(TRADE_RING_CAPACITY) }
    }

    pub fn record_trade(&mut self, trade: RecentTrade) {
        if self.trades.len() == TRADE_RING_CAPACITY {
            self.trades.pop_front();
        }
        self.trades.push_back(trade);
    }

    pub fn recent_trades(&self, limit: usize) -> Vec<RecentTrade> {
        self.trades.iter().rev().take(limit).copied().collect()
    }

    pub fn ticker(&self, now_ms: i64) -> TickerSnapshot {
        let window_start = now_ms - TICKER_WINDOW_MS;
        let mut snapshot = TickerSnapshot::default();
        for trade in self.trades.iter().filter(|t| t.transact_time_ms >= window_start) {
            snapshot.open.get_or_insert(trade.price);
            snapshot.high = Some(snapshot.high.map_or(trade.price, |h| if trade.price.0 > h.0 { trade.price } else { h }));
            snapshot.low = Some(snapshot.low.map_or(trade.price, |l| if trade.price.0 < l.0 { trade.price } else { l }));
            snapshot.last = Some(trade.price);
            snapshot.volume = snapshot.volume.checked_add(trade.qty).unwrap_or(snapshot.volume);
            snapshot.quote_volume = snapshot.quote_volume.checked_add(trade.quote_qty).unwrap_or(snapshot.quote_volume);
            snapshot.trade_count += 1;
        }
        if let (Some(open), Some(last)) = (snapshot.open, snapshot.last) {
            if open.0 != 0 {
                snapshot.percent_change = (last.0 - open.0) as f64 / open.0 as f64 * 100.0;
            }
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(id: i64, price: &str, qty: &str, ts_ms: i64) -> RecentTrade {
        let price = ScaledAmount::parse(price, 8).unwrap();
        let qty = ScaledAmount::parse(qty, 8).unwrap();
        RecentTrade {
            trade_id: id,
            price,
            qty,
            quote_qty: price.mul_div_pow10(qty, 8).unwrap(),
            taker_side: Side::Buy,
            transact_time_ms: ts_ms,
        }
    }

    #[test]
    fn ring_drops_oldest_past_capacity() {
        let mut ticker = SymbolTicker::new();
        for i in 0..(TRADE_RING_CAPACITY + 10) {
            ticker.record_trade(trade(i as i64, "100", "1", i as i64));
        }
        assert_eq!(ticker.recent_trades(usize::MAX).len(), TRADE_RING_CAPACITY);
        assert_eq!(ticker.recent_trades(1)[0].trade_id, (TRADE_RING_CAPACITY + 9) as i64);
    }

    #[test]
    fn ticker_computes_ohlc_and_percent_change_over_window() {
        let mut ticker = SymbolTicker::new();
        let now = 2_000_000_000_000;
        ticker.record_trade(trade(1, "100", "1", now - 1000));
        ticker.record_trade(trade(2, "110", "1", now - 500));
        ticker.record_trade(trade(3, "90", "2", now - 100));
        let snap = ticker.ticker(now);
        assert_eq!(snap.open, Some(ScaledAmount::parse("100", 8).unwrap()));
        assert_eq!(snap.last, Some(ScaledAmount::parse("90", 8).unwrap()));
        assert_eq!(snap.high, Some(ScaledAmount::parse("110", 8).unwrap()));
        assert_eq!(snap.low, Some(ScaledAmount::parse("90", 8).unwrap()));
        assert_eq!(snap.trade_count, 3);
        assert!((snap.percent_change - (-10.0)).abs() < 1e-9);
    }

    #[test]
    fn trades_outside_window_are_excluded() {
        let mut ticker = SymbolTicker::new();
        let now = 2_000_000_000_000;
        ticker.record_trade(trade(1, "100", "1", now - TICKER_WINDOW_MS - 1));
        let snap = ticker.ticker(now);
        assert_eq!(snap.trade_count, 0);
        assert!(snap.open.is_none());
    }
}
