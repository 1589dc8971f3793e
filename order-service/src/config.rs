use std::time::Duration;

use xcore::config::{env_f64, env_string, env_u64};

#[derive(Debug, Clone)]
pub struct OrderServiceConfig {
    pub core: xcore::config::CoreConfig,
    pub bind_addr: String,
    pub database_url: String,
    pub clearing_base_url: String,
    pub matching_depth_base_url: String,
    pub order_stream_name: String,
    pub price_protection_enabled: bool,
    pub price_protection_default_limit_rate: f64,
    pub reference_price_ttl: Duration,
    pub matching_publish_timeout: Duration,
    pub clearing_timeout: Duration,
    pub matching_depth_timeout: Duration,
}

impl OrderServiceConfig {
    pub fn from_env() -> eyre::Result<Self> {
        let core = xcore::config::CoreConfig::from_env()?;
        Ok(Self {
                bind_addr: env_string("ORDER_SERVICE_BIND_ADDR", "0.0.0.0:8081"),
                database_url: env_string("DATABASE_URL", "postgres://localhost/exchange"),
                clearing_base_url: env_string("CLEARING_SERVICE_URL", "http://127.0.0.1:9200"),
                matching_depth_base_url: env_string("MARKET_DATA_URL", "http://127.0.0.1:8083"),
                order_stream_name: env_string("ORDER_STREAM_NAME", "orders-to-matching"),
                price_protection_enabled: xcore::config::env_bool("PRICE_PROTECTION_ENABLED", true),
                price_protection_default_limit_rate: env_f64("PRICE_PROTECTION_DEFAULT_LIMIT_RATE", 0.05),
                reference_price_ttl: Duration::from_millis(env_u64("PRICE_REFERENCE_TTL_MS", 1000)),
                matching_publish_timeout: Duration::from_secs(2),
                clearing_timeout: Duration::from_secs(5),
                matching_depth_timeout: Duration::from_secs(2),
                core,
        })
    }
}
