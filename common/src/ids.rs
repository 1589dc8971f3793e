//! Process-unique 64-bit id allocation: an `AtomicU64` counter seeded with a
//! millisecond timestamp prefix so ids allocated by different process
//! restarts don't collide on a shared low counter.

use std::sync::atomic::{AtomicU64, Ordering};

pub struct IdGenerator {
    counter: AtomicU64,
}

const COUNTER_BITS: u32 = 22;

impl IdGenerator {
    pub fn new() -> Self {
        let now_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
        Self { counter: AtomicU64::new(now_ms << COUNTER_BITS) }
    }

    /// Allocate the next process-unique, strictly increasing id.
    pub fn next_id(&self) -> i64 {
        let raw = self.counter.fetch_add(1, Ordering::Relaxed);
        (raw & 0x7fff_ffff_ffff_ffff) as i64
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_strictly_increase() {
        let gen = IdGenerator::new();
        let a = gen.next_id();
        let b = gen.next_id();
        assert!(b > a);
    }

    #[test]
    fn ids_are_positive() {
        let gen = IdGenerator::new();
        for _ in 0..1000 {
            assert!(gen.next_id() > 0);
        }
    }
}
