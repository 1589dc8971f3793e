use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use xcore::error::{AppError, ErrorCode};
use xcore::model::order::Order;
use xcore::repository::OrderHistoryFilter;

use crate::internal_auth::AuthenticatedUser;
use crate::service::{CreateOrderInput, OrderService};

pub struct AppState {
    pub service: Arc<OrderService>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub symbol: String,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub time_in_force: Option<String>,
    pub price: Option<String>,
    pub quantity: Option<String>,
    pub quote_order_qty: Option<String>,
    pub new_client_order_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order_id: i64,
    pub client_order_id: Option<String>,
    pub symbol: String,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub time_in_force: String,
    pub price: Option<String>,
    pub orig_qty: String,
    pub executed_qty: String,
    pub cumulative_quote_qty: String,
    pub status: String,
    pub transact_time: Option<i64>,
}

impl OrderResponse {
    fn from_order(order: &Order, price_precision: u32, qty_precision: u32) -> Self {
        Self {
            order_id: order.id,
            client_order_id: order.client_order_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side.to_string(),
            order_type: order.order_type.to_string(),
            time_in_force: order.time_in_force.to_string(),
            price: order.price.map(|p| p.to_decimal_string(price_precision)),
            orig_qty: order.orig_qty.to_decimal_string(qty_precision),
            executed_qty: order.executed_qty.to_decimal_string(qty_precision),
            cumulative_quote_qty: order.cumulative_quote_qty.to_decimal_string(qty_precision),
            status: order.status.to_string(),
            transact_time: order.transact_at.map(|t| t.timestamp_millis()),
        }
    }
}

async fn render_order(service: &OrderService, order: &Order) -> Result<OrderResponse, AppError> {
    let config = service
    .symbols
    .get(&order.symbol)
    .await
    .map_err(|_| AppError::new(ErrorCode::Internal))?
    .ok_or_else(|| AppError::new(ErrorCode::SymbolNotFound))?;
    Ok(OrderResponse::from_order(order, config.price_precision, config.qty_precision))
}

pub async fn create_order(
    State(state): State<Arc<AppState>>,
    user: axum::extract::Extension<AuthenticatedUser>,
    Json(body): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, AppError> {
    let input = CreateOrderInput {
        user_id: user.0.0,
        symbol: body.symbol,
        side: body.side,
        order_type: body.order_type,
        time_in_force: body.time_in_force,
        price: body.price,
        qty: body.quantity,
        quote_order_qty: body.quote_order_qty,
        client_order_id: body.new_client_order_id,
    };
    let order = state.service.create_order(input).await?;
    let response = render_order(&state.service, &order).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct OrderLookupQuery {
    pub order_id: Option<i64>,
    pub orig_client_order_id: Option<String>,
}

pub async fn cancel_order(
    State(state): State<Arc<AppState>>,
    user: axum::extract::Extension<AuthenticatedUser>,
    Query(query): Query<OrderLookupQuery>,
) -> Result<impl IntoResponse, AppError> {
    let order =
    state.service.cancel_order(user.0.0, query.order_id, query.orig_client_order_id.as_deref()).await?;
    let response = render_order(&state.service, &order).await?;
    Ok(Json(response))
}

pub async fn get_order(
    State(state): State<Arc<AppState>>,
    user: axum::extract::Extension<AuthenticatedUser>,
    Query(query): Query<OrderLookupQuery>,
) -> Result<impl IntoResponse, AppError> {
    let order = state.service.get_order(user.0.0, query.order_id, query.orig_client_order_id.as_deref()).await?;
    let response = render_order(&state.service, &order).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct ListOpenQuery {
    pub symbol: Option<String>,
    pub limit: Option<u32>,
}

pub async fn list_open_orders(
    State(state): State<Arc<AppState>>,
    user: axum::extract::Extension<AuthenticatedUser>,
    Query(query): Query<ListOpenQuery>,
) -> Result<impl IntoResponse, AppError> {
    let orders =
    state.service.list_open_orders(user.0.0, query.symbol.as_deref(), query.limit.unwrap_or(500)).await?;
    let mut responses = Vec::with_capacity(orders.len());
    for order in &orders {
        responses.push(render_order(&state.service, order).await?);
    }
    Ok(Json(responses))
}

#[derive(Debug, Deserialize)]
pub struct ListHistoryQuery {
    pub symbol: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub limit: Option<u32>,
}

pub async fn list_historical_orders(
    State(state): State<Arc<AppState>>,
    user: axum::extract::Extension<AuthenticatedUser>,
    Query(query): Query<ListHistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = OrderHistoryFilter {
        symbol: query.symbol,
        start: query.start_time.and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        end: query.end_time.and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
    };
    let orders = state.service.list_historical_orders(user.0.0, filter, query.limit.unwrap_or(1000)).await?;
    let mut responses = Vec::with_capacity(orders.len());
    for order in &orders {
        responses.push(render_order(&state.service, order).await?);
    }
    Ok(Json(responses))
}

pub async fn exchange_info(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let symbols = state.service.get_exchange_info().await?;
    Ok(Json(symbols))
}
