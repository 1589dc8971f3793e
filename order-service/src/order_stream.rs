//! Durable order-stream producer.
//! Publishes to a Redis stream the matching engine consumes; retries with a
//! short exponential backoff before the caller compensates by rejecting and
//! unfreezing.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use xcore::model::event::OrderStreamMessage;

const RETRY_DELAYS_MS: [u64; 3] = [50, 100, 200];

pub struct OrderStreamProducer {
    conn: ConnectionManager,
    stream_name: String,
}

impl OrderStreamProducer {
    pub async fn connect(redis_addr: &str, stream_name: impl Into<String>) -> eyre::Result<Self> {
        let client = redis::Client::open(format!("redis://{redis_addr}"))?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn, stream_name: stream_name.into() })
    }

    /// Publish with up to 3 retries (50ms, 100ms, 200ms); aborts early if
    /// `cancel` fires. On final failure the caller compensates by rejecting
    /// the order and releasing its freeze.
    pub async fn publish(&self, message: &OrderStreamMessage, cancel: &CancellationToken) -> eyre::Result<()> {
        let payload = serde_json::to_string(message)?;
        let mut last_err = None;
        for (attempt, delay_ms) in std::iter::once(0).chain(RETRY_DELAYS_MS).enumerate() {
            if attempt > 0 {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
                    _ = cancel.cancelled() => {
                        eyre::bail!("order stream publish aborted by shutdown");
                    }
                }
            }
            match self.try_publish(&payload).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(attempt, error = %err, "order stream publish attempt failed");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| eyre::eyre!("order stream publish failed with no recorded error")))
    }

    async fn try_publish(&self, payload: &str) -> eyre::Result<()> {
        let mut conn = self.conn.clone();
        let _id: String = conn.xadd(&self.stream_name, "*", &[("data", payload)]).await?;
        Ok(())
    }
}
