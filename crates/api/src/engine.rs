//! The collaborator identity resolution engine.
//!
//! Single-threaded and synchronous: every entry point runs to completion in
//! arrival order. Hosts that share an engine across threads go through
//! [`crate::spawn_engine`], which serializes events behind one task.

use std::sync::Arc;

use cire_core::{score, CandidateList, Clock, RequestKey, ResolutionResult, SubjectId, SystemClock};
use cire_matcher::{find_match, MatchKind, MatchOpts};
use cire_store::{EntryIndex, PendingRegistry, PendingRequest, ResolvedCache, TriggerTracker};
use tokio::sync::mpsc;
use tracing::debug;

use crate::propagate::{Propagation, Propagator};
use crate::{EngineConfig, EngineEvent, EngineStats};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartialOutcome {
    /// The card now has a pending request.
    Registered,
    /// The subject was already resolved well enough; the cached list was emitted for this card.
    AlreadyResolved(ResolutionResult),
    /// Nothing to disambiguate (fewer than two collaborators expected).
    Ignored,
}

#[derive(Debug, Default)]
struct Counters {
    resolved: u64,
    unmatched: u64,
    downgrades_rejected: u64,
    empty_details: u64,
    cache_hits: u64,
}

pub struct CollabEngine {
    cfg: EngineConfig,
    clock: Arc<dyn Clock>,
    registry: PendingRegistry,
    trigger: TriggerTracker,
    cache: ResolvedCache,
    entries: EntryIndex,
    subscribers: Vec<mpsc::UnboundedSender<ResolutionResult>>,
    counters: Counters,
    /// Bumped whenever the resolved cache changes.
    epoch: u64,
}

impl CollabEngine {
    pub fn new(cfg: EngineConfig) -> Self { Self::with_clock(cfg, Arc::new(SystemClock)) }

    pub fn with_clock(cfg: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: PendingRegistry::new(cfg.request_ttl, cfg.max_pending),
            trigger: TriggerTracker::new(cfg.trigger_ttl),
            cache: ResolvedCache::new(),
            entries: EntryIndex::new(cfg.max_entries),
            subscribers: Vec::new(),
            counters: Counters::default(),
            epoch: 0,
            clock,
            cfg,
        }
    }

    pub fn config(&self) -> &EngineConfig { &self.cfg }
    pub fn epoch(&self) -> u64 { self.epoch }

    /// Receive every resolution emitted from now on. Dropped receivers are pruned on the next emit.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ResolutionResult> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// A card rendered with (some of) its collaborators.
    pub fn observe_partial(
        &mut self,
        key: RequestKey,
        subject: Option<SubjectId>,
        candidates: CandidateList,
        expected_count: usize,
    ) -> PartialOutcome {
        let now = self.clock.now();
        let partial = candidates.sanitized();
        if let Some(s) = &subject {
            self.entries.track(s.clone(), key.clone());
        }
        if expected_count.max(partial.len()) < 2 {
            debug!(key = %key, "single-collaborator card; nothing to resolve");
            return PartialOutcome::Ignored;
        }

        if let Some(s) = &subject {
            if let Some(hit) = self.cache.entry(s) {
                if hit.collaborators.len() >= expected_count {
                    let result = ResolutionResult {
                        subject_id: s.clone(),
                        collaborators: hit.collaborators.clone(),
                        expected_count: hit.expected_count,
                        quality_score: hit.score,
                        entries: vec![key.clone()],
                    };
                    // an earlier render of this card may still be waiting without a subject
                    self.registry.remove(&key);
                    self.counters.cache_hits += 1;
                    metrics::counter!("cire_cache_hit_total", 1u64);
                    debug!(key = %key, subject = %s, "subject already resolved; replaying cached list");
                    self.emit(&result);
                    return PartialOutcome::AlreadyResolved(result);
                }
            }
        }

        self.registry.register(key, subject, partial, expected_count, now);
        PartialOutcome::Registered
    }

    /// Remember `key` as a card for `subject` without waiting on detail for it.
    pub fn track_entry(&mut self, key: RequestKey, subject: SubjectId) { self.entries.track(subject, key); }

    /// The user just asked for detail on this card.
    pub fn record_trigger(&mut self, key: RequestKey) {
        let now = self.clock.now();
        debug!(key = %key, "trigger recorded");
        self.trigger.record(key, now);
    }

    /// A detail dialog rendered its full collaborator list.
    pub fn observe_detailed(&mut self, detailed: &CandidateList) -> Option<ResolutionResult> {
        let now = self.clock.now();
        let opts = MatchOpts { min_detailed_len: self.cfg.min_detailed_len };
        let Some(m) = find_match(&mut self.registry, &mut self.trigger, detailed, now, opts) else {
            self.counters.unmatched += 1;
            return None;
        };
        if m.kind == MatchKind::Trigger {
            self.trigger.consume();
        }

        let outcome = Propagator { registry: &mut self.registry, cache: &mut self.cache, entries: &mut self.entries }
            .resolve(&m.key, detailed, now);
        match outcome {
            Propagation::Resolved(result) => {
                self.counters.resolved += 1;
                self.epoch += 1;
                self.emit(&result);
                Some(result)
            }
            Propagation::Downgrade { .. } => {
                self.counters.downgrades_rejected += 1;
                None
            }
            Propagation::Empty => {
                self.counters.empty_details += 1;
                None
            }
            Propagation::Missing => None,
        }
    }

    /// Drop a pending request explicitly. Returns whether one was live.
    pub fn cancel(&mut self, key: &RequestKey) -> bool {
        let now = self.clock.now();
        self.registry.sweep(now);
        let removed = self.registry.remove(key).is_some();
        if removed {
            debug!(key = %key, "pending request cancelled");
        }
        removed
    }

    /// Dispatch one event; returns the resolution it produced, if any.
    pub fn apply(&mut self, event: EngineEvent) -> Option<ResolutionResult> {
        match event {
            EngineEvent::Partial { key, subject_id, candidates, expected_count } => {
                match self.observe_partial(key, subject_id.and_then(|s| SubjectId::new(s)), candidates, expected_count) {
                    PartialOutcome::AlreadyResolved(r) => Some(r),
                    _ => None,
                }
            }
            EngineEvent::Trigger { key } => {
                self.record_trigger(key);
                None
            }
            EngineEvent::Detailed { candidates } => self.observe_detailed(&candidates),
            EngineEvent::Track { key, subject_id } => {
                if let Some(s) = SubjectId::new(subject_id) {
                    self.track_entry(key, s);
                }
                None
            }
            EngineEvent::Cancel { key } => {
                self.cancel(&key);
                None
            }
        }
    }

    /// Best list resolved so far for `subject`.
    pub fn resolved(&self, subject: &SubjectId) -> Option<&CandidateList> { self.cache.get(subject) }

    pub fn resolved_cache(&self) -> &ResolvedCache { &self.cache }

    pub fn pending(&mut self, key: &RequestKey) -> Option<&PendingRequest> {
        let now = self.clock.now();
        self.registry.get(key, now)
    }

    pub fn live_pending(&mut self) -> Vec<RequestKey> {
        let now = self.clock.now();
        self.registry.all_live(now).map(|r| r.key().clone()).collect()
    }

    pub fn stats(&mut self) -> EngineStats {
        let now = self.clock.now();
        self.registry.sweep(now);
        EngineStats {
            pending: self.registry.len(),
            resolved_subjects: self.cache.len(),
            resolved: self.counters.resolved,
            unmatched: self.counters.unmatched,
            downgrades_rejected: self.counters.downgrades_rejected,
            empty_details: self.counters.empty_details,
            cache_hits: self.counters.cache_hits,
            expired: self.registry.expired(),
            evicted: self.registry.dropped(),
        }
    }

    fn emit(&mut self, result: &ResolutionResult) {
        self.subscribers.retain(|tx| tx.send(result.clone()).is_ok());
        debug!(subject = %result.subject_id, score = score(&result.collaborators), subscribers = self.subscribers.len(), "resolution emitted");
    }
}
