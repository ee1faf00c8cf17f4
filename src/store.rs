//! Shared latest-value store
//!
//! A single slot holding the most recently received serial line. One writer
//! (the ingest loop) and any number of HTTP readers share it through cloned
//! handles; readers always observe a complete value, never a torn one.

use std::sync::{Arc, PoisonError, RwLock};

/// Value served before any line has been received.
pub const PLACEHOLDER: &str = "{}";

/// Cloneable handle to the shared latest-value slot.
///
/// Clones share the same underlying slot. There is no history and no change
/// notification; each publish discards the previous value.
#[derive(Clone)]
pub struct LatestValue {
    slot: Arc<RwLock<String>>,
}

impl LatestValue {
    /// Create a new store holding the placeholder.
    pub fn new() -> Self {
        Self {
            slot: Arc::new(RwLock::new(PLACEHOLDER.to_string())),
        }
    }

    /// Replace the stored value.
    pub fn publish(&self, value: String) {
        // The slot only ever holds fully-formed values, so a poisoned lock
        // still guards a usable one.
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        *slot = value;
    }

    /// Snapshot the current value.
    pub fn read(&self) -> String {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for LatestValue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn starts_with_placeholder() {
        let store = LatestValue::new();
        assert_eq!(store.read(), PLACEHOLDER);
    }

    #[test]
    fn last_write_wins() {
        let store = LatestValue::new();
        store.publish("{\"x\":1}".to_string());
        store.publish("{\"x\":2}".to_string());
        assert_eq!(store.read(), "{\"x\":2}");
        assert_eq!(store.read(), "{\"x\":2}");
    }

    #[test]
    fn clones_share_the_slot() {
        let store = LatestValue::new();
        let handle = store.clone();
        handle.publish("{\"y\":3}".to_string());
        assert_eq!(store.read(), "{\"y\":3}");
    }

    #[test]
    fn concurrent_readers_never_see_torn_values() {
        let store = LatestValue::new();
        let all_a = "a".repeat(64);
        let all_b = "b".repeat(64);

        let writer = {
            let store = store.clone();
            let (a, b) = (all_a.clone(), all_b.clone());
            thread::spawn(move || {
                for i in 0..2000 {
                    let v = if i % 2 == 0 { a.clone() } else { b.clone() };
                    store.publish(v);
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                let (a, b) = (all_a.clone(), all_b.clone());
                thread::spawn(move || {
                    for _ in 0..2000 {
                        let v = store.read();
                        assert!(
                            v == PLACEHOLDER || v == a || v == b,
                            "observed spliced value: {v}"
                        );
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }
}
