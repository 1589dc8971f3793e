//! One-shot `(api_key, nonce)` replay protection for local verification mode
//!.

use std::time::{Duration, Instant};

use dashmap::DashMap;

pub struct NonceStore {
    window: Duration,
    seen: DashMap<(String, String), Instant>,
}

impl NonceStore {
    pub fn new(window: Duration) -> Self {
        Self { window, seen: DashMap::new() }
    }

    /// Returns `true` if `(api_key, nonce)` had not been seen within the
    /// active window, recording it atomically so concurrent duplicate
    /// requests can't both pass.
    pub fn check_and_record(&self, api_key: &str, nonce: &str) -> bool {
        let now = Instant::now();
        let key = (api_key.to_string(), nonce.to_string());
        match self.seen.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(mut e) => {
                if now.duration_since(*e.get()) > self.window {
                    e.insert(now);
                    true
                } else {
                    false
                }
            }
            dashmap::mapref::entry::Entry::Vacant(e) => {
                e.insert(now);
                true
            }
        }
    }

    pub fn sweep_expired(&self) {
        let now = Instant::now();
        let window = self.window;
        self.seen.retain(|_, seen_at| now.duration_since(*seen_at) <= window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_use_is_accepted_second_is_rejected() {
        let store = NonceStore::new(Duration::from_secs(30));
        assert!(store.check_and_record("key1", "nonce1"));
        assert!(!store.check_and_record("key1", "nonce1"));
    }

    #[test]
    fn different_api_keys_have_independent_nonce_space() {
        let store = NonceStore::new(Duration::from_secs(30));
        assert!(store.check_and_record("key1", "n"));
        assert!(store.check_and_record("key2", "n"));
    }

    #[test]
    fn nonce_can_be_reused_after_window_elapses() {
        let store = NonceStore::new(Duration::from_millis(10));
        assert!(store.check_and_record("key1", "n"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(store.check_and_record("key1", "n"));
    }
}
