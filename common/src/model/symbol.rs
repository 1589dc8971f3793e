use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::decimal::ScaledAmount;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SymbolStatus {
    Trading,
    Halt,
    CancelOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolConfig {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub price_tick: ScaledAmount,
    pub qty_step: ScaledAmount,
    pub price_precision: u32,
    pub qty_precision: u32,
    pub base_precision: u32,
    pub quote_precision: u32,
    pub min_qty: ScaledAmount,
    pub max_qty: ScaledAmount,
    pub min_notional: ScaledAmount,
    /// `None` falls back to `PRICE_PROTECTION_DEFAULT_LIMIT_RATE`.
    pub price_limit_rate: Option<f64>,
    pub maker_fee_rate: f64,
    pub taker_fee_rate: f64,
    pub status: SymbolStatus,
}

impl SymbolConfig {
    /// `qtyPrecision == basePrecision` and `pricePrecision == quotePrecision`
    /// must hold for every tradable symbol.
    pub fn precision_invariants_hold(&self) -> bool {
        self.qty_precision == self.base_precision && self.price_precision == self.quote_precision
    }

    pub fn effective_price_limit_rate(&self, default_rate: f64) -> f64 {
        self.price_limit_rate.unwrap_or(default_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SymbolConfig {
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

    #[test]
    fn precision_invariant_holds_for_valid_config() {
        assert!(sample().precision_invariants_hold());
    }

    #[test]
    fn precision_invariant_fails_for_mismatched_config() {
        let mut cfg = sample();
        cfg.base_precision = 6;
        assert!(!cfg.precision_invariants_hold());
    }

    #[test]
    fn default_rate_falls_back() {
        assert_eq!(sample().effective_price_limit_rate(0.05), 0.05);
    }
}
