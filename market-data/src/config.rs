use std::time::Duration;

use xcore::config::{env_string, env_u64};

#[derive(Debug, Clone)]
pub struct MarketDataConfig {
    pub core: xcore::config::CoreConfig,
    pub bind_addr: String,
    pub database_url: String,
    pub event_stream_name: String,
    pub consumer_group: String,
    pub consumer_name: String,
    pub batch_size: usize,
    pub block: Duration,
}

impl MarketDataConfig {
    pub fn from_env() -> eyre::Result<Self> {
        let core = xcore::config::CoreConfig::from_env()?;
        let consumer_name = env_string("MARKET_DATA_CONSUMER_NAME", &format!("market-data-{}", std::process::id()));
        Ok(Self {
                bind_addr: env_string("MARKET_DATA_BIND_ADDR", "0.0.0.0:8083"),
                database_url: env_string("DATABASE_URL", "postgres://localhost/exchange"),
                event_stream_name: env_string("EVENT_STREAM_NAME", "matching-to-everyone"),
                consumer_group: env_string("MARKET_DATA_CONSUMER_GROUP", "market-data-group"),
                consumer_name,
                batch_size: env_u64("MARKET_DATA_BATCH_SIZE", 100) as usize,
                block: Duration::from_millis(env_u64("MARKET_DATA_BLOCK_MS", 1000)),
                core,
        })
    }
}
