use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use xcore::error::{AppError, ErrorCode};
use xcore::repository::SymbolConfigRepository;

use crate::state::MarketDataState;

pub struct AppState {
    pub market_data: MarketDataState,
    pub symbols: Arc<dyn SymbolConfigRepository>,
}

#[derive(Debug, Deserialize)]
pub struct SymbolQuery {
    pub symbol: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct DepthResponse {
    pub bids: Vec<[String; 2]>,
    pub asks: Vec<[String; 2]>,
    pub last_update_id: u64,
    pub timestamp_ms: i64,
}

pub async fn depth(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SymbolQuery>,
) -> Result<impl IntoResponse, AppError> {
    let config = state
    .symbols
    .get(&query.symbol)
    .await
    .map_err(|_| AppError::new(ErrorCode::Internal))?
    .ok_or_else(|| AppError::new(ErrorCode::SymbolNotFound))?;
    let limit = query.limit.unwrap_or(100).clamp(1, 5000);
    let snapshot = state.market_data.depth(&query.symbol, limit);
    let render = |(price, qty): &(xcore::decimal::ScaledAmount, xcore::decimal::ScaledAmount)| {
        [price.to_decimal_string(config.price_precision), qty.to_decimal_string(config.qty_precision)]
    };
    Ok(Json(DepthResponse {
                bids: snapshot.bids.iter().map(render).collect(),
                asks: snapshot.asks.iter().map(render).collect(),
                last_update_id: snapshot.last_update_id,
                timestamp_ms: snapshot.timestamp_ms,
    }))
}

#[derive(Debug, Serialize)]
pub struct TradeResponse {
    pub id: i64,
    pub price: String,
    pub qty: String,
    pub quote_qty: String,
    pub is_buyer_maker: bool,
    pub time: i64,
}

#[derive(Debug, Deserialize)]
pub struct TradesQuery {
    pub symbol: String,
    pub limit: Option<usize>,
}

pub async fn trades(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TradesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let config = state
    .symbols
    .get(&query.symbol)
    .await
    .map_err(|_| AppError::new(ErrorCode::Internal))?
    .ok_or_else(|| AppError::new(ErrorCode::SymbolNotFound))?;
    let limit = query.limit.unwrap_or(500).clamp(1, 1000);
    let trades = state.market_data.recent_trades(&query.symbol, limit);
    let responses: Vec<TradeResponse> = trades
    .into_iter()
    .map(|t| TradeResponse {
            id: t.trade_id,
            price: t.price.to_decimal_string(config.price_precision),
            qty: t.qty.to_decimal_string(config.qty_precision),
            quote_qty: t.quote_qty.to_decimal_string(config.quote_precision),
            // taker_side=SELL means the maker (resting order) was the buyer.
            is_buyer_maker: t.taker_side == xcore::model::order::Side::Sell,
            time: t.transact_time_ms,
    })
    .collect();
    Ok(Json(responses))
}

#[derive(Debug, Serialize)]
pub struct TickerResponse {
    pub symbol: String,
    pub open_price: Option<String>,
    pub high_price: Option<String>,
    pub low_price: Option<String>,
    pub last_price: Option<String>,
    pub volume: String,
    pub quote_volume: String,
    pub price_change_percent: f64,
    pub count: u64,
}

#[derive(Debug, Deserialize)]
pub struct TickerQuery {
    pub symbol: String,
}

pub async fn ticker(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TickerQuery>,
) -> Result<impl IntoResponse, AppError> {
    let config = state
    .symbols
    .get(&query.symbol)
    .await
    .map_err(|_| AppError::new(ErrorCode::Internal))?
    .ok_or_else(|| AppError::new(ErrorCode::SymbolNotFound))?;
    let now_ms = chrono::Utc::now().timestamp_millis();
    let snapshot = state.market_data.ticker(&query.symbol, now_ms);
    Ok(Json(TickerResponse {
                symbol: query.symbol,
                open_price: snapshot.open.map(|p| p.to_decimal_string(config.price_precision)),
                high_price: snapshot.high.map(|p| p.to_decimal_string(config.price_precision)),
                low_price: snapshot.low.map(|p| p.to_decimal_string(config.price_precision)),
                last_price: snapshot.last.map(|p| p.to_decimal_string(config.price_precision)),
                volume: snapshot.volume.to_decimal_string(config.qty_precision),
                quote_volume: snapshot.quote_volume.to_decimal_string(config.quote_precision),
                price_change_percent: snapshot.percent_change,
                count: snapshot.trade_count,
    }))
}
