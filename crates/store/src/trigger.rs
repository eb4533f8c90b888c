//! Most recent user interaction that asked for disambiguation detail.

use std::time::{Duration, Instant};

use cire_core::RequestKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRecord {
    pub key: RequestKey,
    pub at: Instant,
}

/// Holds at most one record; a newer interaction replaces the older one.
#[derive(Debug)]
pub struct TriggerTracker {
    current: Option<TriggerRecord>,
    ttl: Duration,
}

impl TriggerTracker {
    pub fn new(ttl: Duration) -> Self { Self { current: None, ttl } }

    pub fn record(&mut self, key: RequestKey, now: Instant) {
        self.current = Some(TriggerRecord { key, at: now });
    }

    /// The live trigger key, clearing the record once its TTL has elapsed.
    pub fn current(&mut self, now: Instant) -> Option<&RequestKey> {
        if let Some(rec) = &self.current {
            if now.saturating_duration_since(rec.at) >= self.ttl {
                self.current = None;
            }
        }
        self.current.as_ref().map(|r| &r.key)
    }

    pub fn consume(&mut self) -> Option<TriggerRecord> { self.current.take() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_until_ttl() {
        let mut t = TriggerTracker::new(Duration::from_secs(5));
        let t0 = Instant::now();
        t.record("card1".into(), t0);
        assert_eq!(t.current(t0 + Duration::from_secs(4)).map(|k| k.as_str()), Some("card1"));
        assert!(t.current(t0 + Duration::from_secs(5)).is_none());
        assert!(t.consume().is_none(), "expired record is cleared, not kept");
    }

    #[test]
    fn newer_trigger_replaces_older() {
        let mut t = TriggerTracker::new(Duration::from_secs(5));
        let t0 = Instant::now();
        t.record("a".into(), t0);
        t.record("b".into(), t0 + Duration::from_secs(1));
        assert_eq!(t.current(t0 + Duration::from_secs(2)).map(|k| k.as_str()), Some("b"));
    }

    #[test]
    fn consume_clears() {
        let mut t = TriggerTracker::new(Duration::from_secs(5));
        let t0 = Instant::now();
        t.record("a".into(), t0);
        assert_eq!(t.consume().map(|r| r.key), Some(RequestKey::from("a")));
        assert!(t.current(t0).is_none());
    }
}
