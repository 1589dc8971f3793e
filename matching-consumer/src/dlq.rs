//! Dead-letter escalation for messages past the retry ceiling: published to
//! `<stream>:dlq` with fields `{stream, msgId, reason, data, tsMs, group,
//! consumer}`.

use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
struct DlqEntry<'a> {
    stream: &'a str,
    msg_id: &'a str,
    reason: &'a str,
    data: &'a str,
    ts_ms: i64,
    group: &'a str,
    consumer: &'a str,
}

pub fn dlq_stream_name(stream_name: &str) -> String {
    format!("{stream_name}:dlq")
}

/// Publishes the poison message's raw payload plus context to the DLQ. The
/// original message is still the caller's responsibility to ack.
pub async fn escalate(
    conn: &mut ConnectionManager,
    stream_name: &str,
    msg_id: &str,
    reason: &str,
    raw_data: &str,
    group: &str,
    consumer: &str,
) -> eyre::Result<()> {
    let entry =
    DlqEntry { stream: stream_name, msg_id, reason, data: raw_data, ts_ms: Utc::now().timestamp_millis(), group, consumer };
    let payload = serde_json::to_string(&entry)?;
    let dlq_name = dlq_stream_name(stream_name);
    let _id: String = conn.xadd(&dlq_name, "*", &[("data", payload.as_str())]).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dlq_stream_name_suffixes_original() {
        assert_eq!(dlq_stream_name("matching-events"), "matching-events:dlq");
    }
}
