use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::decimal::ScaledAmount;
use crate::model::order::Side;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchingEventType {
    OrderAccepted,
    OrderRejected,
    OrderPartiallyFilled,
    OrderFilled,
    OrderCanceled,
    TradeCreated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchingEventData {
    /// `side`/`price`/`orig_qty` are carried for the market-data projector's
    /// initial book insertion; C4 only needs `order_id`.
    OrderAccepted { order_id: i64, side: Side, price: Option<ScaledAmount>, orig_qty: ScaledAmount },
    OrderRejected { order_id: i64, reason: String },
    OrderPartiallyFilled { order_id: i64, executed_qty: ScaledAmount },
    OrderFilled { order_id: i64, executed_qty: ScaledAmount },
    OrderCanceled { order_id: i64, leaves_qty: ScaledAmount, reason: String },
    TradeCreated {
        trade_id: i64,
        maker_order_id: i64,
        taker_order_id: i64,
        maker_user_id: i64,
        taker_user_id: i64,
        price: ScaledAmount,
        qty: ScaledAmount,
        taker_side: Side,
    },
}

impl MatchingEventData {
    pub fn event_type(&self) -> MatchingEventType {
        match self {
            MatchingEventData::OrderAccepted {.. } => MatchingEventType::OrderAccepted,
            MatchingEventData::OrderRejected {.. } => MatchingEventType::OrderRejected,
            MatchingEventData::OrderPartiallyFilled {.. } => MatchingEventType::OrderPartiallyFilled,
            MatchingEventData::OrderFilled {.. } => MatchingEventType::OrderFilled,
            MatchingEventData::OrderCanceled {.. } => MatchingEventType::OrderCanceled,
            MatchingEventData::TradeCreated {.. } => MatchingEventType::TradeCreated,
        }
    }
}

/// The typed envelope of : `{type, symbol, seq, timestamp, data}`.
/// `type` is carried alongside `data`'s own internal tag (rather than
/// reconstructed from it) so a consumer can route on `event_type` without
/// deserializing the payload body first; [`MatchingEvent::data`]'s
/// discriminant is asserted to match in `new`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingEvent {
    #[serde(rename = "type")]
    pub event_type: MatchingEventType,
    pub symbol: String,
    /// Monotonic per symbol.
    pub seq: u64,
    pub timestamp_ms: i64,
    pub data: MatchingEventData,
}

impl MatchingEvent {
    pub fn new(symbol: impl Into<String>, seq: u64, timestamp_ms: i64, data: MatchingEventData) -> Self {
        Self { event_type: data.event_type(), symbol: symbol.into(), seq, timestamp_ms, data }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum OrderStreamMessageType {
    New,
    Cancel,
}

/// The order-stream message C3 publishes to matching, covering both new-order
/// submission and the cancel-order protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStreamMessage {
    #[serde(rename = "type")]
    pub message_type: OrderStreamMessageType,
    pub order_id: i64,
    pub client_order_id: Option<String>,
    pub user_id: i64,
    pub symbol: String,
    pub side: Option<Side>,
    pub order_type: Option<crate::model::order::OrderType>,
    pub time_in_force: Option<crate::model::order::TimeInForce>,
    pub price: Option<ScaledAmount>,
    pub qty: Option<ScaledAmount>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_through_json() {
        let ev = MatchingEvent {
            event_type: MatchingEventType::OrderFilled,
            symbol: "BTC_USDT".into(),
            seq: 42,
            timestamp_ms: 1_700_000_000_000,
            data: MatchingEventData::OrderFilled { order_id: 7, executed_qty: ScaledAmount(20_000_000) },
        };
        let json = serde_json::to_string(&ev).unwrap();
        let back: MatchingEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.seq, 42);
        match back.data {
            MatchingEventData::OrderFilled { order_id,.. } => assert_eq!(order_id, 7),
            _ => panic!("wrong variant"),
        }
    }
}
