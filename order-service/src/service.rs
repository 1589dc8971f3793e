//! The order write service itself: orchestrates validation, freezing,
//! persistence, and matching-stream publication. Follows the
//! narrow-collaborator style of `clearing_client` — every external
//! dependency is a trait object so the whole flow is unit-testable against
//! in-memory fakes.

use std::sync::Arc;

use chrono::Utc;
use clearing_client::{clearing_error_code, unfreeze_key, ClearingClient, ClearingRequest, RefType};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use xcore::decimal::ScaledAmount;
use xcore::error::{AppError, ErrorCode};
use xcore::ids::IdGenerator;
use xcore::model::event::{OrderStreamMessage, OrderStreamMessageType};
use xcore::model::order::{Order, OrderStatus, OrderType, Side};
use xcore::model::symbol::SymbolConfig;
use xcore::repository::{OrderHistoryFilter, OrderRepository, SymbolConfigRepository};

use crate::freeze::{check_price_protection, compute_freeze};
use crate::order_stream::OrderStreamProducer;
use crate::price_reference::PriceReferenceCache;
use crate::validation::{normalize, require_tradable, validate_against_config};

pub struct CreateOrderInput {
    pub user_id: i64,
    pub symbol: String,
    pub side: String,
    pub order_type: String,
    pub time_in_force: Option<String>,
    pub price: Option<String>,
    pub qty: Option<String>,
    pub quote_order_qty: Option<String>,
    pub client_order_id: Option<String>,
}

pub struct OrderService {
    pub ids: IdGenerator,
    pub orders: Arc<dyn OrderRepository>,
    pub symbols: Arc<dyn SymbolConfigRepository>,
    pub clearing: Arc<dyn ClearingClient>,
    pub price_reference: Arc<PriceReferenceCache>,
    pub order_stream: Arc<OrderStreamProducer>,
    pub shutdown: CancellationToken,
    pub price_protection_enabled: bool,
    pub default_price_limit_rate: f64,
}

impl OrderService {
    /// The full create-order protocol: normalize, load config, validate,
    /// check idempotency, price-protect, freeze, persist, and publish.
    pub async fn create_order(&self, input: CreateOrderInput) -> Result<Order, AppError> {
        // Step 1: normalize.
        let params = normalize(&input.symbol, &input.side, &input.order_type, input.time_in_force.as_deref())?;

        // Step 2: load symbol config.
        let config =
        self.symbols.get(&params.symbol).await.map_err(|_| AppError::new(ErrorCode::Internal))?;
        let config = require_tradable(&config)?.clone();

        let price = input
        .price
        .as_deref()
        .map(|p| ScaledAmount::parse(p, config.price_precision))
        .transpose()
        .map_err(|_| AppError::new(ErrorCode::InvalidPrice))?;
        let qty = self.resolve_qty(&input, &config, params.order_type, params.side, price).await?;

        // Step 3: validate against config.
        validate_against_config(&config, params.order_type, price, qty)?;

        // Step 4: idempotency.
        if let Some(client_order_id) = &input.client_order_id {
            if let Some(existing) =
            self.orders.find_by_user_and_client_order_id(input.user_id, client_order_id).await.map_err(|_| AppError::new(ErrorCode::Internal))?
            {
                return self.recover(existing).await;
            }
        }

        // Step 5: price protection (LIMIT only; MARKET validated via freeze step).
        let reference = if self.price_protection_enabled {
            self.price_reference.reference_price(&params.symbol, config.price_precision).await.unwrap_or(None)
        } else {
            None
        };
        let rate = config.effective_price_limit_rate(self.default_price_limit_rate);
        if params.order_type == OrderType::Limit {
            if let Some(price) = price {
                check_price_protection(price, reference, params.side, rate)?;
            }
        }

        // Step 6: compute freeze spec.
        let freeze_spec = compute_freeze(&config, params.side, params.order_type, price, qty, reference, rate)?;

        // Step 7: persist at INIT.
        let order_id = self.ids.next_id();
        let now = Utc::now();
        let order = Order {
            id: order_id,
            client_order_id: input.client_order_id.clone(),
            user_id: input.user_id,
            symbol: params.symbol.clone(),
            side: params.side,
            order_type: params.order_type,
            time_in_force: params.time_in_force,
            price,
            orig_qty: qty,
            executed_qty: ScaledAmount::ZERO,
            cumulative_quote_qty: ScaledAmount::ZERO,
            status: OrderStatus::Init,
            reject_reason: None,
            cancel_reason: None,
            created_at: now,
            updated_at: now,
            transact_at: None,
        };
        let inserted = self.orders.insert_init(order.clone()).await.map_err(|_| AppError::new(ErrorCode::Internal))?;
        let order = match inserted {
            Some(order) => order,
            None => {
                // Lost a race against a duplicate client-order-id insert.
                let existing = self
                .orders
                .find_by_user_and_client_order_id(
                    input.user_id,
                    input.client_order_id.as_deref().unwrap_or_default(),
                )
                .await
                .map_err(|_| AppError::new(ErrorCode::Internal))?
                .ok_or_else(|| AppError::new(ErrorCode::Internal))?;
                return self.recover(existing).await;
            }
        };

        self.freeze_and_publish(order, &freeze_spec.asset, freeze_spec.amount).await
    }

    /// Steps 8-10: freeze, transition to NEW, publish to matching, best-effort
    /// private event. Shared by the create path and by idempotent recovery.
    async fn freeze_and_publish(&self, order: Order, asset: &str, amount: ScaledAmount) -> Result<Order, AppError> {
        let freeze_req = ClearingRequest {
            idempotency_key: clearing_client::freeze_key(order.id),
            user_id: order.user_id,
            asset: asset.to_string(),
            amount,
            ref_type: RefType::Order,
            ref_id: order.id.to_string(),
        };
        let freeze_result = self.clearing.freeze(freeze_req).await;
        let order = match freeze_result {
            Ok(resp) if resp.success => {
                let updated = self
                .orders
                .transition_status(order.id, &[OrderStatus::Init], OrderStatus::New, None)
                .await
                .map_err(|_| AppError::new(ErrorCode::Internal))?;
                updated.unwrap_or(order)
            }
            Ok(resp) => {
                let code = clearing_error_code(resp.error_code.as_deref());
                self.reject(order.id, code.to_string()).await;
                return Err(AppError::new(code));
            }
            Err(err) => {
                warn!(order_id = order.id, error = %err, "clearing freeze transport failure");
                self.reject(order.id, ErrorCode::Unavailable.to_string()).await;
                return Err(AppError::new(ErrorCode::Unavailable));
            }
        };

        // Step 9: publish to matching, with compensation on final failure.
        let message = OrderStreamMessage {
            message_type: OrderStreamMessageType::New,
            order_id: order.id,
            client_order_id: order.client_order_id.clone(),
            user_id: order.user_id,
            symbol: order.symbol.clone(),
            side: Some(order.side),
            order_type: Some(order.order_type),
            time_in_force: Some(order.time_in_force),
            price: order.price,
            qty: Some(order.orig_qty),
        };
        if let Err(err) = self.order_stream.publish(&message, &self.shutdown).await {
            error!(order_id = order.id, error = %err, "order stream publish exhausted retries, compensating");
            self.compensate_publish_failure(&order, asset, amount).await;
            return Err(AppError::new(ErrorCode::Unavailable));
        }

        // Step 10: best-effort private event, logged on failure (no external
        // event bus wired up in this deployment; tracing stands in for it).
        info!(order_id = order.id, user_id = order.user_id, symbol = %order.symbol, "order created");
        Ok(order)
    }

    async fn compensate_publish_failure(&self, order: &Order, asset: &str, amount: ScaledAmount) {
        let _ = self
        .orders
        .transition_status(
            order.id,
            &[OrderStatus::New],
            OrderStatus::Rejected,
            Some("send_matching_failed".to_string()),
        )
        .await;
        let unfreeze_req = ClearingRequest {
            idempotency_key: unfreeze_key(order.id, Some("send_matching_failed")),
            user_id: order.user_id,
            asset: asset.to_string(),
            amount,
            ref_type: RefType::Order,
            ref_id: order.id.to_string(),
        };
        if let Err(err) = self.clearing.unfreeze(unfreeze_req).await {
            error!(order_id = order.id, error = %err, "compensating unfreeze failed after matching publish failure");
        }
    }

    async fn reject(&self, order_id: i64, reason: String) {
        let _ = self.orders.transition_status(order_id, &[OrderStatus::Init], OrderStatus::Rejected, Some(reason)).await;
    }

    /// Idempotent re-entry for an existing order found via client-order-id
    /// lookup: resumes from wherever the prior attempt left off.
    async fn recover(&self, order: Order) -> Result<Order, AppError> {
        match order.status {
            OrderStatus::Init => {
                let config = self
                .symbols
                .get(&order.symbol)
                .await
                .map_err(|_| AppError::new(ErrorCode::Internal))?
                .ok_or_else(|| AppError::new(ErrorCode::SymbolNotFound))?;
                let asset = match order.side {
                    Side::Sell => config.base_asset,
                    Side::Buy => config.quote_asset,
                };
                let amount = match (order.side, order.order_type) {
                    (Side::Sell, _) => order.orig_qty,
                    (Side::Buy, OrderType::Limit) => order
                    .price
                    .unwrap_or(ScaledAmount::ZERO)
                    .mul_div_pow10(order.orig_qty, config.qty_precision)
                    .unwrap_or(ScaledAmount::ZERO),
                    (Side::Buy, OrderType::Market) => order.cumulative_quote_qty,
                };
                self.freeze_and_publish(order, &asset, amount).await
            }
            OrderStatus::New => {
                let message = OrderStreamMessage {
                    message_type: OrderStreamMessageType::New,
                    order_id: order.id,
                    client_order_id: order.client_order_id.clone(),
                    user_id: order.user_id,
                    symbol: order.symbol.clone(),
                    side: Some(order.side),
                    order_type: Some(order.order_type),
                    time_in_force: Some(order.time_in_force),
                    price: order.price,
                    qty: Some(order.orig_qty),
                };
                // Best-effort; matching is expected to deduplicate re-sends.
                let _ = self.order_stream.publish(&message, &self.shutdown).await;
                Ok(order)
            }
            _ => Ok(order),
        }
    }

    async fn resolve_qty(
        &self,
        input: &CreateOrderInput,
        config: &SymbolConfig,
        order_type: OrderType,
        side: Side,
        price: Option<ScaledAmount>,
    ) -> Result<ScaledAmount, AppError> {
        if let Some(qty) = &input.qty {
            return ScaledAmount::parse(qty, config.qty_precision).map_err(|_| AppError::new(ErrorCode::InvalidQuantity));
        }
        if order_type == OrderType::Market && side == Side::Buy {
            if let Some(quote_qty) = &input.quote_order_qty {
                let quote_qty = ScaledAmount::parse(quote_qty, config.quote_precision)
                .map_err(|_| AppError::new(ErrorCode::InvalidQuantity))?;
                let reference = price
                .or(self.price_reference.reference_price(&config.symbol, config.price_precision).await.unwrap_or(None))
                .ok_or_else(|| AppError::new(ErrorCode::NoReferencePrice))?;
                if reference.is_zero() {
                    return Err(AppError::new(ErrorCode::NoReferencePrice));
                }
                let scale = 10i128.pow(config.qty_precision);
                return Ok(ScaledAmount(quote_qty.0 * scale / reference.0));
            }
        }
        Err(AppError::new(ErrorCode::InvalidQuantity))
    }

    /// Cancel-order protocol: look up the order, reject ownership/status
    /// mismatches, and for an open order publish a CANCEL message — the
    /// authoritative state transition happens when matching emits
    /// ORDER_CANCELED.
    pub async fn cancel_order(
        &self,
        user_id: i64,
        order_id: Option<i64>,
        client_order_id: Option<&str>,
    ) -> Result<Order, AppError> {
        let order = self.lookup(user_id, order_id, client_order_id).await?;
        if order.status.is_terminal() {
            return if order.status == OrderStatus::Canceled {
                Ok(order)
            } else {
                Err(AppError::new(ErrorCode::OrderAlreadyFilled))
            };
        }
        let message = OrderStreamMessage {
            message_type: OrderStreamMessageType::Cancel,
            order_id: order.id,
            client_order_id: order.client_order_id.clone(),
            user_id: order.user_id,
            symbol: order.symbol.clone(),
            side: None,
            order_type: None,
            time_in_force: None,
            price: None,
            qty: None,
        };
        self.order_stream.publish(&message, &self.shutdown).await.map_err(|_| AppError::new(ErrorCode::Unavailable))?;
        Ok(order)
    }

    pub async fn get_order(
        &self,
        user_id: i64,
        order_id: Option<i64>,
        client_order_id: Option<&str>,
    ) -> Result<Order, AppError> {
        self.lookup(user_id, order_id, client_order_id).await
    }

    async fn lookup(
        &self,
        user_id: i64,
        order_id: Option<i64>,
        client_order_id: Option<&str>,
    ) -> Result<Order, AppError> {
        let found = if let Some(order_id) = order_id {
            self.orders.find_by_user_and_order_id(user_id, order_id).await
        } else if let Some(client_order_id) = client_order_id {
            self.orders.find_by_user_and_client_order_id(user_id, client_order_id).await
        } else {
            return Err(AppError::new(ErrorCode::InvalidParam));
        };
        found.map_err(|_| AppError::new(ErrorCode::Internal))?.ok_or_else(|| AppError::new(ErrorCode::OrderNotFound))
    }

    pub async fn list_open_orders(&self, user_id: i64, symbol: Option<&str>, limit: u32) -> Result<Vec<Order>, AppError> {
        self.orders.list_open(user_id, symbol, limit).await.map_err(|_| AppError::new(ErrorCode::Internal))
    }

    pub async fn list_historical_orders(
        &self,
        user_id: i64,
        filter: OrderHistoryFilter,
        limit: u32,
    ) -> Result<Vec<Order>, AppError> {
        self.orders.list_historical(user_id, filter, limit).await.map_err(|_| AppError::new(ErrorCode::Internal))
    }

    pub async fn get_exchange_info(&self) -> Result<Vec<SymbolConfig>, AppError> {
        self.symbols.list().await.map_err(|_| AppError::new(ErrorCode::Internal))
    }
}
