//! Depth-delta broadcast per symbol: bounded capacity-100 channel per
//! symbol. `tokio::sync::broadcast` already drops the oldest buffered entry
//! for a lagging subscriber instead of blocking the publisher.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::book::BookSnapshot;

const SUBSCRIBER_CHANNEL_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct DepthUpdate {
    pub symbol: String,
    pub snapshot: BookSnapshot,
}

#[derive(Default)]
pub struct SubscriberHub {
    channels: RwLock<HashMap<String, broadcast::Sender<DepthUpdate>>>,
}

impl SubscriberHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, symbol: &str) -> broadcast::Receiver<DepthUpdate> {
        let mut channels = self.channels.write();
        channels.entry(symbol.to_string()).or_insert_with(|| broadcast::channel(SUBSCRIBER_CHANNEL_CAPACITY).0).subscribe()
    }

    /// No-op when nobody has subscribed to `symbol` yet.
    pub fn publish(&self, symbol: &str, snapshot: BookSnapshot) {
        let channels = self.channels.read();
        if let Some(tx) = channels.get(symbol) {
            let _ = tx.send(DepthUpdate { symbol: symbol.to_string(), snapshot });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_update() {
        let hub = SubscriberHub::new();
        let mut rx = hub.subscribe("BTC_USDT");
        hub.publish("BTC_USDT", BookSnapshot::default());
        let update = rx.recv().await.unwrap();
        assert_eq!(update.symbol, "BTC_USDT");
    }

    #[tokio::test]
    async fn lagging_subscriber_drops_instead_of_blocking_publisher() {
        let hub = SubscriberHub::new();
        let mut rx = hub.subscribe("BTC_USDT");
        for _ in 0..(SUBSCRIBER_CHANNEL_CAPACITY + 10) {
            hub.publish("BTC_USDT", BookSnapshot::default());
        }
        let result = rx.recv().await;
        assert!(matches!(result, Err(broadcast::error::RecvError::Lagged(_))));
    }
}
