//! Reference-price lookup for price protection,
//! cached at most 1 s per symbol so a burst of orders on the same symbol
//! doesn't hammer the market-data depth endpoint.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Deserialize;
use xcore::decimal::ScaledAmount;

#[derive(Debug, Deserialize)]
struct DepthResponse {
    bids: Vec<[String; 2]>,
    asks: Vec<[String; 2]>,
}

struct CacheEntry {
    fetched_at: Instant,
    reference: Option<ScaledAmount>,
}

pub struct PriceReferenceCache {
    client: reqwest::Client,
    base_url: String,
    ttl: Duration,
    entries: DashMap<String, CacheEntry>,
}

impl PriceReferenceCache {
    pub fn new(base_url: impl Into<String>, ttl: Duration, timeout: Duration) -> eyre::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.into(), ttl, entries: DashMap::new() })
    }

    /// `Ok(None)` means "no reference available" — step 5 says
    /// callers should then admit LIMIT orders unconditionally, or reject
    /// MARKET buys with `NO_REFERENCE_PRICE`.
    pub async fn reference_price(&self, symbol: &str, price_precision: u32) -> eyre::Result<Option<ScaledAmount>> {
        if let Some(entry) = self.entries.get(symbol) {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(entry.reference);
            }
        }
        let reference = self.fetch(symbol, price_precision).await?;
        self.entries.insert(symbol.to_string(), CacheEntry { fetched_at: Instant::now(), reference });
        Ok(reference)
    }

    async fn fetch(&self, symbol: &str, price_precision: u32) -> eyre::Result<Option<ScaledAmount>> {
        let url = format!("{}/v1/depth", self.base_url);
        let resp = self.client.get(&url).query(&[("symbol", symbol), ("limit", "1")]).send().await?;
        if !resp.status().is_success() {
            return Ok(None);
        }
        let depth: DepthResponse = resp.json().await?;
        let best_bid = depth.bids.first().map(|l| &l[0]).map(|p| ScaledAmount::parse(p, price_precision)).transpose()?;
        let best_ask = depth.asks.first().map(|l| &l[0]).map(|p| ScaledAmount::parse(p, price_precision)).transpose()?;
        let reference = match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => Some(ScaledAmount((bid.0 + ask.0) / 2)),
            (Some(bid), None) => Some(bid),
            (None, Some(ask)) => Some(ask),
            (None, None) => None,
        };
        Ok(reference)
    }
}
