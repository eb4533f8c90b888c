//! Engine configuration: defaults plus `CIRE_*` environment overrides.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Lifetime of a pending request, restarted on every refresh.
    pub request_ttl: Duration,
    /// Lifetime of the trigger record.
    pub trigger_ttl: Duration,
    /// Pending registry capacity; the oldest request is evicted when full.
    pub max_pending: usize,
    /// Number of subjects whose sibling entries are remembered.
    pub max_entries: usize,
    pub min_detailed_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_ttl: Duration::from_secs(5),
            trigger_ttl: Duration::from_secs(5),
            max_pending: 256,
            max_entries: 4096,
            min_detailed_len: 2,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self { Self::default().with_overrides(|k| std::env::var(k).ok()) }

    /// Apply overrides from `lookup`; unparsable values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let num = |k: &str| lookup(k).and_then(|s| s.trim().parse::<u64>().ok());
        if let Some(ms) = num("CIRE_REQUEST_TTL_MS") { self.request_ttl = Duration::from_millis(ms); }
        if let Some(ms) = num("CIRE_TRIGGER_TTL_MS") { self.trigger_ttl = Duration::from_millis(ms); }
        if let Some(n) = num("CIRE_MAX_PENDING").filter(|n| *n > 0) { self.max_pending = n as usize; }
        if let Some(n) = num("CIRE_MAX_ENTRIES").filter(|n| *n > 0) { self.max_entries = n as usize; }
        if let Some(n) = num("CIRE_MIN_DETAILED_LEN") { self.min_detailed_len = n as usize; }
        self
    }
}
