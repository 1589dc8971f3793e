//! Incremental per-symbol order book, rebuilt by replaying the
//! matching event stream rather than computed by a matching algorithm.
//! Guarded by a single `parking_lot::RwLock` per symbol; snapshots always copy.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use xcore::decimal::ScaledAmount;
use xcore::model::event::{MatchingEvent, MatchingEventData};
use xcore::model::order::Side;

#[derive(Debug, Clone, Copy)]
struct OpenOrderEntry {
    side: Side,
    price: ScaledAmount,
    orig_qty: ScaledAmount,
    leaves_qty: ScaledAmount,
}

#[derive(Debug, Clone, Default)]
pub struct BookSnapshot {
    /// Price-descending.
    pub bids: Vec<(ScaledAmount, ScaledAmount)>,
    /// Price-ascending.
    pub asks: Vec<(ScaledAmount, ScaledAmount)>,
    pub last_update_id: u64,
    pub timestamp_ms: i64,
}

/// One symbol's book. Not `Sync` on its own; callers hold it behind a lock
/// (see `state::MarketDataState`).
pub struct SymbolBook {
    bids: BTreeMap<i128, ScaledAmount>,
    asks: BTreeMap<i128, ScaledAmount>,
    open_orders: HashMap<i64, OpenOrderEntry>,
    last_update_id: u64,
    updated_at_ms: i64,
}

impl Default for SymbolBook {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolBook {
    pub fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            open_orders: HashMap::new(),
            last_update_id: 0,
            updated_at_ms: Utc::now().timestamp_millis(),
        }
    }

    /// Applies one matching event's depth delta. Events for
    /// other symbols must be filtered out by the caller.
    pub fn apply(&mut self, event: &MatchingEvent) {
        match &event.data {
            MatchingEventData::OrderAccepted { order_id, side, price, orig_qty } => {
                if let Some(price) = price {
                    self.adjust_level(*side, *price, orig_qty.0);
                    self.open_orders.insert(
                        *order_id,
                        OpenOrderEntry { side: *side, price: *price, orig_qty: *orig_qty, leaves_qty: *orig_qty },
                    );
                }
            }
            MatchingEventData::OrderPartiallyFilled { order_id, executed_qty } => {
                if let Some(entry) = self.open_orders.get_mut(order_id) {
                    let new_leaves = entry.orig_qty.checked_sub(*executed_qty).unwrap_or(ScaledAmount::ZERO);
                    let delta = new_leaves.0 - entry.leaves_qty.0;
                    self.adjust_level(entry.side, entry.price, delta);
                    if new_leaves.is_zero() {
                        self.open_orders.remove(order_id);
                    } else {
                        entry.leaves_qty = new_leaves;
                    }
                }
            }
            MatchingEventData::OrderFilled { order_id,.. } => {
                if let Some(entry) = self.open_orders.remove(order_id) {
                    self.adjust_level(entry.side, entry.price, -entry.leaves_qty.0);
                }
            }
            MatchingEventData::OrderCanceled { order_id, leaves_qty,.. } => {
                if let Some(entry) = self.open_orders.remove(order_id) {
                    self.adjust_level(entry.side, entry.price, -leaves_qty.0);
                }
            }
            MatchingEventData::OrderRejected {.. } | MatchingEventData::TradeCreated {.. } => {
                // Rejected orders never entered the book; trades move depth
                // only via their accompanying fill/partial-fill events.
            }
        }
        self.last_update_id = event.seq;
        self.updated_at_ms = event.timestamp_ms;
    }

    fn adjust_level(&mut self, side: Side, price: ScaledAmount, delta_raw: i128) {
        let levels = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let new_raw = levels.get(&price.0).map(|q| q.0).unwrap_or(0) + delta_raw;
        if new_raw <= 0 {
            levels.remove(&price.0);
        } else {
            levels.insert(price.0, ScaledAmount(new_raw));
        }
    }

    pub fn snapshot(&self, depth_limit: usize) -> BookSnapshot {
        BookSnapshot {
            bids: self.bids.iter().rev().take(depth_limit).map(|(p, q)| (ScaledAmount(*p), *q)).collect(),
            asks: self.asks.iter().take(depth_limit).map(|(p, q)| (ScaledAmount(*p), *q)).collect(),
            last_update_id: self.last_update_id,
            timestamp_ms: self.updated_at_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use xcore::model::event::MatchingEventData;

    use super::*;

    fn event(seq: u64, data: MatchingEventData) -> MatchingEvent {
        MatchingEvent::new("BTC_USDT", seq, 1_700_000_000_000 + seq as i64, data)
    }

    #[test]
    fn accept_inserts_level_and_fill_removes_it() {
        let mut book = SymbolBook::new();
        book.apply(&event(
                1,
                MatchingEventData::OrderAccepted {
                    order_id: 1,
                    side: Side::Buy,
                    price: Some(ScaledAmount::parse("100", 8).unwrap()),
                    orig_qty: ScaledAmount::parse("0.5", 8).unwrap(),
                },
        ));
        let snap = book.snapshot(10);
        assert_eq!(snap.bids.len(), 1);
        assert_eq!(snap.bids[0].1, ScaledAmount::parse("0.5", 8).unwrap());

        book.apply(&event(2, MatchingEventData::OrderFilled { order_id: 1, executed_qty: ScaledAmount::parse("0.5", 8).unwrap() }));
        assert!(book.snapshot(10).bids.is_empty());
    }

    #[test]
    fn partial_fill_reduces_level_without_removing_entry() {
        let mut book = SymbolBook::new();
        book.apply(&event(
                1,
                MatchingEventData::OrderAccepted {
                    order_id: 1,
                    side: Side::Sell,
                    price: Some(ScaledAmount::parse("100", 8).unwrap()),
                    orig_qty: ScaledAmount::parse("1", 8).unwrap(),
                },
        ));
        book.apply(&event(
                2,
                MatchingEventData::OrderPartiallyFilled { order_id: 1, executed_qty: ScaledAmount::parse("0.4", 8).unwrap() },
        ));
        let snap = book.snapshot(10);
        assert_eq!(snap.asks[0].1, ScaledAmount::parse("0.6", 8).unwrap());
    }

    #[test]
    fn bids_sort_descending_and_asks_ascending() {
        let mut book = SymbolBook::new();
        for (id, price) in [(1, "100"), (2, "101"), (3, "99")] {
            book.apply(&event(
                    id as u64,
                    MatchingEventData::OrderAccepted {
                        order_id: id,
                        side: Side::Buy,
                        price: Some(ScaledAmount::parse(price, 8).unwrap()),
                        orig_qty: ScaledAmount::parse("1", 8).unwrap(),
                    },
            ));
        }
        let snap = book.snapshot(10);
        let prices: Vec<String> = snap.bids.iter().map(|(p, _)| p.to_decimal_string(8)).collect();
        assert_eq!(prices, vec!["101.00000000", "100.00000000", "99.00000000"]);
    }

    #[test]
    fn rejected_order_never_touches_depth() {
        let mut book = SymbolBook::new();
        book.apply(&event(1, MatchingEventData::OrderRejected { order_id: 1, reason: "PRICE_OUT_OF_RANGE".into() }));
        assert!(book.snapshot(10).bids.is_empty());
        assert!(book.snapshot(10).asks.is_empty());
    }
}
