use std::time::Duration;

use xcore::config::{env_string, env_u64};

#[derive(Debug, Clone)]
pub struct MatchingConsumerConfig {
    pub core: xcore::config::CoreConfig,
    pub bind_addr: String,
    pub database_url: String,
    pub clearing_base_url: String,
    pub event_stream_name: String,
    pub consumer_group: String,
    pub consumer_name: String,
    pub batch_size: usize,
    pub block: Duration,
    pub sweep_interval: Duration,
    pub pending_min_idle: Duration,
    pub max_retries: u32,
    pub clearing_timeout: Duration,
}

impl MatchingConsumerConfig {
    pub fn from_env() -> eyre::Result<Self> {
        let core = xcore::config::CoreConfig::from_env()?;
        let consumer_name = env_string("MATCHING_CONSUMER_NAME", &format!("matching-consumer-{}", std::process::id()));
        Ok(Self {
                bind_addr: env_string("MATCHING_CONSUMER_BIND_ADDR", "0.0.0.0:8082"),
                database_url: env_string("DATABASE_URL", "postgres://localhost/exchange"),
                clearing_base_url: env_string("CLEARING_SERVICE_URL", "http://127.0.0.1:9200"),
                event_stream_name: env_string("EVENT_STREAM_NAME", "matching-to-everyone"),
                consumer_group: env_string("MATCHING_CONSUMER_GROUP", "matching-consumer-group"),
                consumer_name,
                batch_size: env_u64("MATCHING_CONSUMER_BATCH_SIZE", 100) as usize,
                block: Duration::from_millis(env_u64("MATCHING_CONSUMER_BLOCK_MS", 1000)),
                sweep_interval: Duration::from_millis(env_u64("MATCHING_CONSUMER_SWEEP_INTERVAL_MS", 30_000)),
                pending_min_idle: Duration::from_millis(env_u64("MATCHING_CONSUMER_PENDING_MIN_IDLE_MS", 30_000)),
                max_retries: env_u64("MATCHING_CONSUMER_MAX_RETRIES", 10) as u32,
                clearing_timeout: Duration::from_secs(5),
                core,
        })
    }
}
