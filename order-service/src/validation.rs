//! Normalizes inputs, loads the symbol, and validates the order against
//! its configuration — the first steps of the create-order protocol.

use std::str::FromStr;

use xcore::decimal::ScaledAmount;
use xcore::error::{AppError, ErrorCode};
use xcore::model::order::{OrderType, Side, TimeInForce};
use xcore::model::symbol::{SymbolConfig, SymbolStatus};

#[derive(Debug, Clone)]
pub struct NormalizedOrderParams {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
}

/// Step 1: trim/upper-case enums, default `tif`, fold MARKET+GTC to IOC,
/// reject POST_ONLY+MARKET.
pub fn normalize(
    symbol: &str,
    side: &str,
    order_type: &str,
    time_in_force: Option<&str>,
) -> Result<NormalizedOrderParams, AppError> {
    let symbol = symbol.trim().to_uppercase();
    let side = Side::from_str(&side.trim().to_uppercase())
    .map_err(|_| AppError::new(ErrorCode::InvalidSide))?;
    let order_type = OrderType::from_str(&order_type.trim().to_uppercase())
    .map_err(|_| AppError::new(ErrorCode::InvalidOrderType))?;

    let mut time_in_force = match time_in_force.map(|s| s.trim().to_uppercase()) {
        Some(raw) if !raw.is_empty() => {
            TimeInForce::from_str(&raw).map_err(|_| AppError::new(ErrorCode::InvalidTimeInForce))?
        }
        _ => TimeInForce::Gtc,
    };
    if order_type == OrderType::Market && time_in_force == TimeInForce::Gtc {
        time_in_force = TimeInForce::Ioc;
    }
    if order_type == OrderType::Market && time_in_force == TimeInForce::PostOnly {
        return Err(AppError::new(ErrorCode::InvalidTimeInForce));
    }
    Ok(NormalizedOrderParams { symbol, side, order_type, time_in_force })
}

/// Step 2: absent symbol / non-trading status.
pub fn require_tradable(config: &Option<SymbolConfig>) -> Result<&SymbolConfig, AppError> {
    let config = config.as_ref().ok_or_else(|| AppError::new(ErrorCode::SymbolNotFound))?;
    if config.status != SymbolStatus::Trading {
        return Err(AppError::new(ErrorCode::SymbolNotTrading));
    }
    Ok(config)
}

/// Step 3: quantity/price validation against the symbol's tick/step/notional
/// rules, plus the precision invariant.
pub fn validate_against_config(
    config: &SymbolConfig,
    order_type: OrderType,
    price: Option<ScaledAmount>,
    qty: ScaledAmount,
) -> Result<(), AppError> {
    if !config.precision_invariants_hold() {
        return Err(AppError::new(ErrorCode::InvalidSymbolConfig));
    }
    if qty.0 < config.min_qty.0 {
        return Err(AppError::new(ErrorCode::QtyTooSmall));
    }
    if qty.0 > config.max_qty.0 {
        return Err(AppError::new(ErrorCode::QtyTooLarge));
    }
    if config.qty_step.0 != 0 && qty.checked_rem(config.qty_step).unwrap_or(0) != 0 {
        return Err(AppError::new(ErrorCode::InvalidQuantity));
    }
    if order_type == OrderType::Limit {
        let price = price.ok_or_else(|| AppError::new(ErrorCode::InvalidPrice))?;
        if price.0 <= 0 {
            return Err(AppError::new(ErrorCode::InvalidPrice));
        }
        if config.price_tick.0 != 0 && price.checked_rem(config.price_tick).unwrap_or(0) != 0 {
            return Err(AppError::new(ErrorCode::InvalidPrice));
        }
        let notional = price.mul_div_pow10(qty, config.qty_precision).map_err(|_| AppError::new(ErrorCode::Internal))?;
        if notional.0 < config.min_notional.0 {
            return Err(AppError::new(ErrorCode::NotionalTooSmall));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_defaults_tif() {
        let params = normalize("btc_usdt", "buy", "limit", None).unwrap();
        assert_eq!(params.symbol, "BTC_USDT");
        assert_eq!(params.side, Side::Buy);
        assert_eq!(params.time_in_force, TimeInForce::Gtc);
    }

    #[test]
    fn market_gtc_folds_to_ioc() {
        let params = normalize("BTC_USDT", "BUY", "market", Some("gtc")).unwrap();
        assert_eq!(params.time_in_force, TimeInForce::Ioc);
    }

    #[test]
    fn post_only_market_is_rejected() {
        let err = normalize("BTC_USDT", "BUY", "MARKET", Some("POST_ONLY")).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTimeInForce);
    }

    fn sample_config() -> SymbolConfig {
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
    fn rejects_notional_below_minimum() {
        let config = sample_config();
        let price = ScaledAmount::parse("100", 8).unwrap();
        let qty = ScaledAmount::parse("0.001", 8).unwrap();
        let err = validate_against_config(&config, OrderType::Limit, Some(price), qty).unwrap_err();
        assert_eq!(err.code, ErrorCode::NotionalTooSmall);
    }

    #[test]
    fn rejects_qty_off_step() {
        let config = sample_config();
        let price = ScaledAmount::parse("100", 8).unwrap();
        let qty = ScaledAmount::parse("0.0015", 8).unwrap();
        let err = validate_against_config(&config, OrderType::Limit, Some(price), qty).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidQuantity);
    }
}
