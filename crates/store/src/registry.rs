//! Pending request registry: one entry per rendered card awaiting detail.

use std::collections::hash_map::Entry;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use cire_core::{score, CandidateList, QualityScore, RequestKey, SubjectId};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

/// A card that showed several collaborators and is waiting for the detailed list.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    key: RequestKey,
    subject_id: Option<SubjectId>,
    partial: CandidateList,
    expected_count: usize,
    created_at: Instant,
    expires_at: Instant,
    seq: u64,
}

impl PendingRequest {
    pub fn key(&self) -> &RequestKey { &self.key }
    pub fn subject_id(&self) -> Option<&SubjectId> { self.subject_id.as_ref() }
    pub fn partial(&self) -> &CandidateList { &self.partial }
    /// Never decreases across refreshes.
    pub fn expected_count(&self) -> usize { self.expected_count }
    pub fn created_at(&self) -> Instant { self.created_at }
    pub fn expires_at(&self) -> Instant { self.expires_at }
    /// Creation order; breaks ties between requests created at the same instant.
    pub fn seq(&self) -> u64 { self.seq }
    pub fn partial_score(&self) -> QualityScore { score(&self.partial) }
    pub fn is_live(&self, now: Instant) -> bool { now < self.expires_at }

    fn refresh(&mut self, subject_id: Option<SubjectId>, partial: CandidateList, expected_count: usize, expires_at: Instant) {
        if subject_id.is_some() {
            self.subject_id = subject_id;
        }
        if score(&partial) >= score(&self.partial) {
            self.partial = partial;
        }
        self.expected_count = self.expected_count.max(expected_count).max(self.partial.len());
        self.expires_at = expires_at;
    }
}

/// Keyed store of in-flight requests with per-entry TTL and a FIFO capacity bound.
///
/// Expired entries are swept lazily on every access, so callers never see a stale
/// request and no timer is needed.
pub struct PendingRegistry {
    map: FxHashMap<RequestKey, PendingRequest>,
    order: VecDeque<RequestKey>,
    ttl: Duration,
    cap: usize,
    next_seq: u64,
    dropped: u64,
    expired: u64,
}

impl PendingRegistry {
    pub fn new(ttl: Duration, cap: usize) -> Self {
        Self { map: FxHashMap::default(), order: VecDeque::new(), ttl, cap: cap.max(1), next_seq: 0, dropped: 0, expired: 0 }
    }

    pub fn len(&self) -> usize { self.map.len() }
    pub fn is_empty(&self) -> bool { self.map.is_empty() }
    /// Entries evicted because the registry was full.
    pub fn dropped(&self) -> u64 { self.dropped }
    /// Entries evicted because their TTL elapsed.
    pub fn expired(&self) -> u64 { self.expired }
    pub fn ttl(&self) -> Duration { self.ttl }

    /// Create or refresh the request for `key`. A refresh keeps the higher-quality
    /// partial list, the larger expected count, and restarts the TTL.
    pub fn register(
        &mut self,
        key: RequestKey,
        subject_id: Option<SubjectId>,
        partial: CandidateList,
        expected_count: usize,
        now: Instant,
    ) -> &PendingRequest {
        self.sweep(now);
        let expires_at = now + self.ttl;
        if !self.map.contains_key(&key) && self.map.len() >= self.cap {
            self.evict_oldest();
        }
        let lookup = key.clone();
        match self.map.entry(key) {
            Entry::Occupied(mut e) => {
                e.get_mut().refresh(subject_id, partial, expected_count, expires_at);
                debug!(key = %lookup, expected = e.get().expected_count, "pending request refreshed");
            }
            Entry::Vacant(v) => {
                let seq = self.next_seq;
                self.next_seq += 1;
                let expected_count = expected_count.max(partial.len());
                self.order.push_back(v.key().clone());
                v.insert(PendingRequest { key: lookup.clone(), subject_id, partial, expected_count, created_at: now, expires_at, seq });
                debug!(key = %lookup, expected = expected_count, "pending request registered");
            }
        }
        metrics::gauge!("cire_pending", self.map.len() as f64);
        &self.map[&lookup]
    }

    pub fn get(&mut self, key: &RequestKey, now: Instant) -> Option<&PendingRequest> {
        self.sweep(now);
        self.map.get(key)
    }

    /// Live requests in creation order.
    pub fn all_live(&mut self, now: Instant) -> impl Iterator<Item = &PendingRequest> + '_ {
        self.sweep(now);
        let map = &self.map;
        self.order.iter().filter_map(move |k| map.get(k))
    }

    pub fn remove(&mut self, key: &RequestKey) -> Option<PendingRequest> {
        let removed = self.map.remove(key)?;
        self.order.retain(|k| k != key);
        metrics::gauge!("cire_pending", self.map.len() as f64);
        Some(removed)
    }

    /// Remove every request describing `subject`.
    pub fn remove_subject(&mut self, subject: &SubjectId) -> Vec<PendingRequest> {
        let keys: Vec<RequestKey> = self
            .map
            .values()
            .filter(|r| r.subject_id.as_ref() == Some(subject))
            .map(|r| r.key.clone())
            .collect();
        keys.iter().filter_map(|k| self.remove(k)).collect()
    }

    /// Drop expired entries; returns how many were evicted.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.map.len();
        self.map.retain(|_, r| r.is_live(now));
        let evicted = before - self.map.len();
        if evicted > 0 {
            let map = &self.map;
            self.order.retain(|k| map.contains_key(k));
            self.expired += evicted as u64;
            metrics::counter!("cire_registry_expired_total", evicted as u64);
            metrics::gauge!("cire_pending", self.map.len() as f64);
            debug!(evicted, remaining = self.map.len(), "pending requests expired");
        }
        evicted
    }

    fn evict_oldest(&mut self) {
        while let Some(old) = self.order.pop_front() {
            if self.map.remove(&old).is_some() {
                self.dropped += 1;
                metrics::counter!("cire_registry_evicted_total", 1u64);
                warn!(key = %old, cap = self.cap, "pending registry full; evicted oldest request");
                return;
            }
        }
    }
}
