//! Health model for background consumer loops: every durable loop owns a
//! monotonic "last tick" and "last error"; readiness aggregates these against
//! a per-kind staleness threshold.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

/// Shared between a durable loop and the HTTP health handler that reports on it.
#[derive(Clone)]
pub struct LoopHealth {
    inner: Arc<LoopHealthInner>,
}

struct LoopHealthInner {
    last_tick_ms: AtomicI64,
    last_error: RwLock<Option<String>>,
    tick_count: AtomicU64,
}

impl LoopHealth {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LoopHealthInner {
                    last_tick_ms: AtomicI64::new(Utc::now().timestamp_millis()),
                    last_error: RwLock::new(None),
                    tick_count: AtomicU64::new(0),
            }),
        }
    }

    pub fn tick(&self) {
        self.inner.last_tick_ms.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        self.inner.tick_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, err: impl std::fmt::Display) {
        *self.inner.last_error.write() = Some(err.to_string());
    }

    pub fn clear_error(&self) {
        *self.inner.last_error.write() = None;
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.read().clone()
    }

    pub fn staleness_ms(&self) -> i64 {
        Utc::now().timestamp_millis() - self.inner.last_tick_ms.load(Ordering::Relaxed)
    }

    pub fn tick_count(&self) -> u64 {
        self.inner.tick_count.load(Ordering::Relaxed)
    }

    /// Whether the loop's last tick was recent enough given `staleness_threshold_ms`.
    pub fn is_healthy(&self, staleness_threshold_ms: i64) -> bool {
        self.staleness_ms() <= staleness_threshold_ms
    }
}

impl Default for LoopHealth {
    fn default() -> Self {
        Self::new()
    }
}

pub const EVENT_LOOP_STALENESS_THRESHOLD_MS: i64 = 45_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_loop_is_healthy() {
        let h = LoopHealth::new();
        h.tick();
        assert!(h.is_healthy(EVENT_LOOP_STALENESS_THRESHOLD_MS));
    }

    #[test]
    fn stale_loop_is_unhealthy() {
        let h = LoopHealth::new();
        // Simulate staleness by asserting a zero threshold always fails.
        assert!(!h.is_healthy(-1));
    }

    #[test]
    fn records_and_clears_errors() {
        let h = LoopHealth::new();
        h.record_error("boom");
        assert_eq!(h.last_error().as_deref(), Some("boom"));
        h.clear_error();
        assert_eq!(h.last_error(), None);
    }
}
