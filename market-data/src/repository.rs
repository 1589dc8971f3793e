//! Read-only symbol-config access — the projector needs per-symbol precision
//! to render amounts and compute quote volume, but never writes.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use xcore::decimal::ScaledAmount;
use xcore::model::symbol::{SymbolConfig, SymbolStatus};
use xcore::repository::SymbolConfigRepository;

pub async fn connect(database_url: &str) -> eyre::Result<PgPool> {
    let pool = PgPoolOptions::new().max_connections(5).connect(database_url).await?;
    Ok(pool)
}

pub struct PgSymbolConfigRepository {
    pool: PgPool,
}

impl PgSymbolConfigRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SymbolConfigRepository for PgSymbolConfigRepository {
    async fn get(&self, symbol: &str) -> eyre::Result<Option<SymbolConfig>> {
        let row = sqlx::query("SELECT * FROM symbol_configs WHERE symbol = $1")
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_symbol_config(&r)).transpose()
    }

    async fn list(&self) -> eyre::Result<Vec<SymbolConfig>> {
        let rows = sqlx::query("SELECT * FROM symbol_configs ORDER BY symbol").fetch_all(&self.pool).await?;
        rows.iter().map(row_to_symbol_config).collect()
    }
}

fn row_to_symbol_config(row: &sqlx::postgres::PgRow) -> eyre::Result<SymbolConfig> {
    let status: String = row.try_get("status")?;
    Ok(SymbolConfig {
            symbol: row.try_get("symbol")?,
            base_asset: row.try_get("base_asset")?,
            quote_asset: row.try_get("quote_asset")?,
            price_tick: ScaledAmount::from_str(&row.try_get::<String, _>("price_tick")?)?,
            qty_step: ScaledAmount::from_str(&row.try_get::<String, _>("qty_step")?)?,
            price_precision: row.try_get::<i32, _>("price_precision")? as u32,
            qty_precision: row.try_get::<i32, _>("qty_precision")? as u32,
            base_precision: row.try_get::<i32, _>("base_precision")? as u32,
            quote_precision: row.try_get::<i32, _>("quote_precision")? as u32,
            min_qty: ScaledAmount::from_str(&row.try_get::<String, _>("min_qty")?)?,
            max_qty: ScaledAmount::from_str(&row.try_get::<String, _>("max_qty")?)?,
            min_notional: ScaledAmount::from_str(&row.try_get::<String, _>("min_notional")?)?,
            price_limit_rate: row.try_get("price_limit_rate")?,
            maker_fee_rate: row.try_get("maker_fee_rate")?,
            taker_fee_rate: row.try_get("taker_fee_rate")?,
            status: SymbolStatus::from_str(&status)?,
    })
}

/// In-memory fake for tests, mirroring the other crates' `repository::fake`.
pub mod fake {
    use std::collections::HashMap;

    use parking_lot::RwLock;

    use super::*;

    #[derive(Default)]
    pub struct InMemorySymbolConfigRepository {
        configs: RwLock<HashMap<String, SymbolConfig>>,
    }

    impl InMemorySymbolConfigRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn insert(&self, config: SymbolConfig) {
            self.configs.write().insert(config.symbol.clone(), config);
        }
    }

    #[async_trait]
    impl SymbolConfigRepository for InMemorySymbolConfigRepository {
        async fn get(&self, symbol: &str) -> eyre::Result<Option<SymbolConfig>> {
            Ok(self.configs.read().get(symbol).cloned())
        }

        async fn list(&self) -> eyre::Result<Vec<SymbolConfig>> {
            Ok(self.configs.read().values().cloned().collect())
        }
    }
}
