//! Consumer-group loop over the matching event stream: batched
//! XREADGROUP, ack-on-success, periodic pending sweep with DLQ escalation
//! past the retry threshold, liveness ticked every iteration.

use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::cmd;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use xcore::health::LoopHealth;
use xcore::model::event::MatchingEvent;

use crate::dlq;
use crate::handlers::EventHandler;

#[derive(Clone)]
pub struct ConsumerConfig {
    pub stream_name: String,
    pub group: String,
    pub consumer: String,
    pub batch_size: usize,
    pub block: Duration,
    pub sweep_interval: Duration,
    pub pending_min_idle: Duration,
    pub max_retries: u32,
}

/// Creates the consumer group starting from new entries (`$`), tolerating a
/// prior run having already created it.
pub async fn ensure_group(conn: &mut ConnectionManager, stream_name: &str, group: &str) -> eyre::Result<()> {
    let result: redis::RedisResult<String> =
    cmd("XGROUP").arg("CREATE").arg(stream_name).arg(group).arg("$").arg("MKSTREAM").query_async(conn).await;
    match result {
        Ok(_) => Ok(()),
        Err(err) if err.to_string().contains("BUSYGROUP") => Ok(()),
        Err(err) => Err(err.into()),
    }
}

pub async fn run(
    mut conn: ConnectionManager,
    config: ConsumerConfig,
    handler: Arc<dyn EventHandler>,
    health: LoopHealth,
    cancel: CancellationToken,
) {
    let mut sweep_tick = tokio::time::interval(config.sweep_interval);
    sweep_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    sweep_tick.tick().await; // first tick fires immediately; skip it, stream is empty anyway

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("matching consumer loop draining on shutdown");
                break;
            }
            _ = sweep_tick.tick() => {
                if let Err(err) = sweep_pending(&mut conn, &config, handler.as_ref()).await {
                    warn!(error = %err, "pending sweep failed");
                    health.record_error(err.to_string());
                } else {
                    health.clear_error();
                }
                health.tick();
            }
            result = read_batch(&mut conn, &config) => {
                match result {
                    Ok(messages) => {
                        for (id, data) in messages {
                            process_message(&mut conn, &config, handler.as_ref(), &id, &data).await;
                        }
                        health.clear_error();
                    }
                    Err(err) => {
                        error!(error = %err, "matching event read failed, backing off");
                        health.record_error(err.to_string());
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
                health.tick();
            }
        }
    }
}

async fn read_batch(conn: &mut ConnectionManager, config: &ConsumerConfig) -> eyre::Result<Vec<(String, String)>> {
    let reply: redis::streams::StreamReadReply = cmd("XREADGROUP")
    .arg("GROUP")
    .arg(&config.group)
    .arg(&config.consumer)
    .arg("COUNT")
    .arg(config.batch_size)
    .arg("BLOCK")
    .arg(config.block.as_millis() as usize)
    .arg("STREAMS")
    .arg(&config.stream_name)
    .arg(">")
    .query_async(conn)
    .await?;
    let mut out = Vec::new();
    for stream_key in reply.keys {
        for entry in stream_key.ids {
            if let Some(data) = entry.get::<String>("data") {
                out.push((entry.id, data));
            }
        }
    }
    Ok(out)
}

async fn process_message(
    conn: &mut ConnectionManager,
    config: &ConsumerConfig,
    handler: &dyn EventHandler,
    id: &str,
    data: &str,
) {
    let event: MatchingEvent = match serde_json::from_str(data) {
        Ok(event) => event,
        Err(err) => {
            error!(id, error = %err, "malformed matching event, leaving unacked for pending sweep");
            return;
        }
    };
    match handler.handle(event).await {
        Ok(()) => {
            if let Err(err) = ack(conn, config, id).await {
                error!(id, error = %err, "XACK failed after successful handling");
            }
        }
        Err(err) => {
            warn!(id, error = %err, "matching event handler failed, will retry via pending sweep");
        }
    }
}

async fn ack(conn: &mut ConnectionManager, config: &ConsumerConfig, id: &str) -> eyre::Result<()> {
    let _: i64 = cmd("XACK").arg(&config.stream_name).arg(&config.group).arg(id).query_async(conn).await?;
    Ok(())
}

/// Claims messages idle longer than `pending_min_idle`; past `max_retries`
/// deliveries they're escalated to the DLQ and acked, otherwise reclaimed to
/// this consumer and retried inline.
async fn sweep_pending(conn: &mut ConnectionManager, config: &ConsumerConfig, handler: &dyn EventHandler) -> eyre::Result<()> {
    let min_idle_ms = config.pending_min_idle.as_millis() as usize;
    let entries: Vec<(String, String, i64, i64)> = cmd("XPENDING")
    .arg(&config.stream_name)
    .arg(&config.group)
    .arg("IDLE")
    .arg(min_idle_ms)
    .arg("-")
    .arg("+")
    .arg(config.batch_size)
    .query_async(conn)
    .await?;

    for (id, _consumer, _idle_ms, delivery_count) in entries {
        if delivery_count as u32 > config.max_retries {
            escalate_to_dlq(conn, config, &id, delivery_count).await?;
        } else {
            reclaim_and_retry(conn, config, handler, &id).await;
        }
    }
    Ok(())
}

async fn escalate_to_dlq(conn: &mut ConnectionManager, config: &ConsumerConfig, id: &str, delivery_count: i64) -> eyre::Result<()> {
    let raw = fetch_raw(conn, config, id).await?;
    let reason = format!("max retries exceeded: {delivery_count}");
    dlq::escalate(conn, &config.stream_name, id, &reason, raw.as_deref().unwrap_or(""), &config.group, &config.consumer).await?;
    ack(conn, config, id).await?;
    warn!(id, delivery_count, "escalated matching event to dead-letter queue");
    Ok(())
}

async fn fetch_raw(conn: &mut ConnectionManager, config: &ConsumerConfig, id: &str) -> eyre::Result<Option<String>> {
    let reply: redis::streams::StreamRangeReply = cmd("XRANGE").arg(&config.stream_name).arg(id).arg(id).query_async(conn).await?;
    Ok(reply.ids.first().and_then(|entry| entry.get::<String>("data")))
}

async fn reclaim_and_retry(conn: &mut ConnectionManager, config: &ConsumerConfig, handler: &dyn EventHandler, id: &str) {
    let claimed: redis::streams::StreamClaimReply = match cmd("XCLAIM")
    .arg(&config.stream_name)
    .arg(&config.group)
    .arg(&config.consumer)
    .arg(config.pending_min_idle.as_millis() as usize)
    .arg(id)
    .query_async(conn)
    .await
    {
        Ok(reply) => reply,
        Err(err) => {
            error!(id, error = %err, "XCLAIM failed during pending sweep");
            return;
        }
    };
    for entry in claimed.ids {
        if let Some(data) = entry.get::<String>("data") {
            process_message(conn, config, handler, &entry.id, &data).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumer_config_is_clone() {
        let config = ConsumerConfig {
            stream_name: "matching-to-everyone".into(),
            group: "matching-consumer-group".into(),
            consumer: "consumer-1".into(),
            batch_size: 100,
            block: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(30),
            pending_min_idle: Duration::from_secs(30),
            max_retries: 10,
        };
        let cloned = config.clone();
        assert_eq!(cloned.stream_name, config.stream_name);
    }
}
