//! Second consumer group on the matching event stream:
//! replays the last N entries on startup to warm state, then tails new
//! entries. Applying an event to the book/ticker is a pure fold that cannot
//! fail, so every delivered message is acknowledged immediately.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::cmd;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use xcore::health::LoopHealth;
use xcore::model::event::MatchingEvent;

use crate::state::MarketDataState;

const REPLAY_COUNT: usize = 1000;

pub struct ConsumerConfig {
    pub stream_name: String,
    pub group: String,
    pub consumer: String,
    pub batch_size: usize,
    pub block: Duration,
}

pub async fn ensure_group(conn: &mut ConnectionManager, stream_name: &str, group: &str) -> eyre::Result<()> {
    let result: redis::RedisResult<String> =
    cmd("XGROUP").arg("CREATE").arg(stream_name).arg(group).arg("$").arg("MKSTREAM").query_async(conn).await;
    match result {
        Ok(_) => Ok(()),
        Err(err) if err.to_string().contains("BUSYGROUP") => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Reads the last [`REPLAY_COUNT`] entries (oldest-first) and folds them into
/// `state` before the group-based tail begins, so a fresh projector instance
/// doesn't serve an empty book.
pub async fn replay(conn: &mut ConnectionManager, stream_name: &str, state: &MarketDataState) -> eyre::Result<usize> {
    let reply: redis::streams::StreamRangeReply =
    cmd("XREVRANGE").arg(stream_name).arg("+").arg("-").arg("COUNT").arg(REPLAY_COUNT).query_async(conn).await?;
    let mut applied = 0;
    for entry in reply.ids.into_iter().rev() {
        if let Some(data) = entry.get::<String>("data") {
            match serde_json::from_str::<MatchingEvent>(&data) {
                Ok(event) => {
                    state.apply_event(&event).await;
                    applied += 1;
                }
                Err(err) => warn!(id = %entry.id, error = %err, "skipping malformed entry during replay"),
            }
        }
    }
    Ok(applied)
}

pub async fn run(
    mut conn: ConnectionManager,
    config: ConsumerConfig,
    state: MarketDataState,
    health: LoopHealth,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("market-data consumer loop draining on shutdown");
                break;
            }
            result = read_batch(&mut conn, &config) => {
                match result {
                    Ok(messages) => {
                        for (id, data) in messages {
                            match serde_json::from_str::<MatchingEvent>(&data) {
                                Ok(event) => state.apply_event(&event).await,
                                Err(err) => error!(id, error = %err, "malformed matching event, acking and skipping"),
                            }
                            if let Err(err) = ack(&mut conn, &config, &id).await {
                                error!(id, error = %err, "XACK failed after applying event");
                            }
                        }
                        health.clear_error();
                    }
                    Err(err) => {
                        error!(error = %err, "market-data event read failed, backing off");
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

async fn ack(conn: &mut ConnectionManager, config: &ConsumerConfig, id: &str) -> eyre::Result<()> {
    let _: i64 = cmd("XACK").arg(&config.stream_name).arg(&config.group).arg(id).query_async(conn).await?;
    Ok(())
}
