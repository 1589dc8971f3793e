use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::ScaledAmount;
use crate::model::order::Side;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub symbol: String,
    pub maker_order_id: i64,
    pub taker_order_id: i64,
    pub maker_user_id: i64,
    pub taker_user_id: i64,
    pub price: ScaledAmount,
    pub qty: ScaledAmount,
    pub quote_qty: ScaledAmount,
    /// Always zero today — fee computation is left to a downstream service
    /// that this pipeline doesn't model.
    pub maker_fee: ScaledAmount,
    pub taker_fee: ScaledAmount,
    /// Always the symbol's quote asset, unconditionally.
    pub fee_asset: String,
    pub taker_side: Side,
    pub transact_time: DateTime<Utc>,
}

impl Trade {
    /// The `(maker, taker, price)` dedup key requires to be unique.
    pub fn dedup_key(&self) -> (i64, i64, ScaledAmount) {
        (self.maker_order_id, self.taker_order_id, self.price)
    }
}
