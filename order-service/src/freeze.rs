//! Price protection and freeze-spec computation for the create-order flow.

use xcore::decimal::ScaledAmount;
use xcore::error::{AppError, ErrorCode};
use xcore::model::order::{OrderType, Side};
use xcore::model::symbol::SymbolConfig;

pub struct FreezeSpec {
    pub asset: String,
    pub amount: ScaledAmount,
}

/// Step 5: reject if `price` deviates from `reference` by more than `rate`.
/// No reference at all means "admit" for LIMIT orders (caller only calls this
/// when a price is present).
pub fn check_price_protection(
    price: ScaledAmount,
    reference: Option<ScaledAmount>,
    side: Side,
    rate: f64,
) -> Result<(), AppError> {
    let Some(reference) = reference else { return Ok(()) };
    if reference.is_zero() {
        return Ok(());
    }
    let deviation = (price.0 - reference.0).unsigned_abs() as f64 / reference.0 as f64;
    if deviation > rate {
        return Err(AppError::new(ErrorCode::PriceOutOfRange));
    }
    let upper = buffered_price(reference, rate);
    let lower = discounted_price(reference, rate);
    match side {
        Side::Buy if price.0 > upper.0 => Err(AppError::new(ErrorCode::PriceOutOfRange)),
        Side::Sell if price.0 < lower.0 => Err(AppError::new(ErrorCode::PriceOutOfRange)),
        _ => Ok(()),
    }
}

pub fn buffered_price(reference: ScaledAmount, rate: f64) -> ScaledAmount {
    ScaledAmount((reference.0 as f64 * (1.0 + rate)).round() as i128)
}

pub fn discounted_price(reference: ScaledAmount, rate: f64) -> ScaledAmount {
    ScaledAmount((reference.0 as f64 * (1.0 - rate)).round() as i128)
}

/// Step 6. `price` is required for LIMIT, ignored for MARKET (the buffered
/// reference price is used for BUY MARKET instead).
pub fn compute_freeze(
    config: &SymbolConfig,
    side: Side,
    order_type: OrderType,
    price: Option<ScaledAmount>,
    qty: ScaledAmount,
    reference: Option<ScaledAmount>,
    rate: f64,
) -> Result<FreezeSpec, AppError> {
    match (side, order_type) {
        (Side::Sell, _) => Ok(FreezeSpec { asset: config.base_asset.clone(), amount: qty }),
        (Side::Buy, OrderType::Limit) => {
            let price = price.ok_or_else(|| AppError::new(ErrorCode::InvalidPrice))?;
            let amount = price
            .mul_div_pow10(qty, config.qty_precision)
            .map_err(|_| AppError::new(ErrorCode::Internal))?;
            Ok(FreezeSpec { asset: config.quote_asset.clone(), amount })
        }
        (Side::Buy, OrderType::Market) => {
            let reference = reference.ok_or_else(|| AppError::new(ErrorCode::NoReferencePrice))?;
            let buffered = buffered_price(reference, rate);
            let amount = buffered
            .mul_div_pow10(qty, config.qty_precision)
            .map_err(|_| AppError::new(ErrorCode::Internal))?;
            Ok(FreezeSpec { asset: config.quote_asset.clone(), amount })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_within_deviation_is_admitted() {
        let reference = ScaledAmount::parse("100", 8).unwrap();
        let price = ScaledAmount::parse("103", 8).unwrap();
        assert!(check_price_protection(price, Some(reference), Side::Buy, 0.05).is_ok());
    }

    #[test]
    fn buy_above_cap_is_rejected() {
        let reference = ScaledAmount::parse("100", 8).unwrap();
        let price = ScaledAmount::parse("106", 8).unwrap();
        let err = check_price_protection(price, Some(reference), Side::Buy, 0.05).unwrap_err();
        assert_eq!(err.code, ErrorCode::PriceOutOfRange);
    }

    #[test]
    fn no_reference_admits() {
        let price = ScaledAmount::parse("100", 8).unwrap();
        assert!(check_price_protection(price, None, Side::Buy, 0.05).is_ok());
    }

    fn config() -> SymbolConfig {
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
            status: xcore::model::symbol::SymbolStatus::Trading,
        }
    }

    #[test]
    fn sell_freezes_base_qty() {
        let qty = ScaledAmount::parse("1", 8).unwrap();
        let spec = compute_freeze(&config(), Side::Sell, OrderType::Limit, None, qty, None, 0.05).unwrap();
        assert_eq!(spec.asset, "BTC");
        assert_eq!(spec.amount, qty);
    }

    #[test]
    fn buy_limit_freezes_quote_notional() {
        let price = ScaledAmount::parse("100", 8).unwrap();
        let qty = ScaledAmount::parse("0.2", 8).unwrap();
        let spec = compute_freeze(&config(), Side::Buy, OrderType::Limit, Some(price), qty, None, 0.05).unwrap();
        assert_eq!(spec.asset, "USDT");
        assert_eq!(spec.amount, ScaledAmount(20_00000000));
    }

    #[test]
    fn buy_market_without_reference_is_rejected() {
        let qty = ScaledAmount::parse("1", 8).unwrap();
        let err = compute_freeze(&config(), Side::Buy, OrderType::Market, None, qty, None, 0.05).unwrap_err();
        assert_eq!(err.code, ErrorCode::NoReferencePrice);
    }
}
