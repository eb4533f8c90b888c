//! Apply a matched detail list to its request, the resolved cache and sibling entries.

use std::time::Instant;

use cire_core::{score, CandidateList, QualityScore, RequestKey, ResolutionResult, SubjectId};
use cire_store::{CacheDecision, EntryIndex, PendingRegistry, ResolvedCache};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Propagation {
    Resolved(ResolutionResult),
    /// The request vanished (expired or removed) between match and resolve.
    Missing,
    /// Sanitizing the detail left nothing to propagate.
    Empty,
    /// The cache already holds a strictly better list for the subject.
    Downgrade { cached: QualityScore, offered: QualityScore },
}

/// Borrowed view over the engine state touched by a resolution.
pub struct Propagator<'a> {
    pub registry: &'a mut PendingRegistry,
    pub cache: &'a mut ResolvedCache,
    pub entries: &'a mut EntryIndex,
}

impl<'a> Propagator<'a> {
    pub fn resolve(&mut self, key: &RequestKey, detailed: &CandidateList, now: Instant) -> Propagation {
        let (subject, expected) = match self.registry.get(key, now) {
            Some(req) => (req.subject_id().cloned().unwrap_or_else(|| SubjectId::for_request(key)), req.expected_count()),
            None => return Propagation::Missing,
        };

        let collaborators = detailed.sanitized();
        if collaborators.is_empty() {
            debug!(key = %key, raw = detailed.len(), "detail empty after sanitizing; dropped");
            metrics::counter!("cire_empty_detail_total", 1u64);
            return Propagation::Empty;
        }
        let expected_count = expected.max(collaborators.len());
        let quality_score = score(&collaborators);

        if let CacheDecision::Rejected { cached, offered } = self.cache.offer(subject.clone(), collaborators.clone(), expected_count) {
            debug!(key = %key, subject = %subject, cached, offered, "lower-quality detail rejected");
            metrics::counter!("cire_downgrade_rejected_total", 1u64);
            return Propagation::Downgrade { cached, offered };
        }

        self.registry.remove(key);
        let siblings = self.registry.remove_subject(&subject);
        for sib in siblings.iter() {
            self.entries.track(subject.clone(), sib.key().clone());
        }
        self.entries.track(subject.clone(), key.clone());
        let entries = self.entries.fan_out(&subject, key);

        info!(
            key = %key,
            subject = %subject,
            collaborators = collaborators.len(),
            expected = expected_count,
            score = quality_score,
            entries = entries.len(),
            "collaborators resolved"
        );
        metrics::counter!("cire_resolved_total", 1u64);
        Propagation::Resolved(ResolutionResult { subject_id: subject, collaborators, expected_count, quality_score, entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cire_core::Collaborator;
    use std::time::Duration;

    fn c(name: &str, handle: &str) -> Collaborator { Collaborator::from_parts(Some(name), Some(handle), None).unwrap() }

    struct State {
        registry: PendingRegistry,
        cache: ResolvedCache,
        entries: EntryIndex,
        t0: Instant,
    }

    impl State {
        fn new() -> Self {
            Self {
                registry: PendingRegistry::new(Duration::from_secs(5), 64),
                cache: ResolvedCache::new(),
                entries: EntryIndex::new(64),
                t0: Instant::now(),
            }
        }

        fn resolve(&mut self, key: &str, detailed: &CandidateList) -> Propagation {
            Propagator { registry: &mut self.registry, cache: &mut self.cache, entries: &mut self.entries }.resolve(&key.into(), detailed, self.t0)
        }
    }

    fn three() -> CandidateList { vec![c("Alice", "@alice"), c("Bob", "@bob"), c("Cy", "@cy")].into() }

    #[test]
    fn resolves_removes_request_and_fans_out() {
        let mut s = State::new();
        let subj = SubjectId::new("S");
        s.entries.track(subj.clone().unwrap(), "grid-card".into());
        s.registry.register("card1".into(), subj.clone(), CandidateList::new(), 2, s.t0);
        s.registry.register("card2".into(), subj.clone(), CandidateList::new(), 2, s.t0);
        let Propagation::Resolved(res) = s.resolve("card1", &three()) else { panic!("expected resolution") };
        assert_eq!(res.subject_id.as_str(), "S");
        assert_eq!(res.expected_count, 3);
        assert_eq!(res.entries[0].as_str(), "card1");
        assert_eq!(res.entries.len(), 3);
        assert!(s.registry.is_empty(), "request and its sibling are both settled");
    }

    #[test]
    fn keeps_better_cached_result() {
        let mut s = State::new();
        let subj = SubjectId::new("S");
        s.registry.register("card1".into(), subj.clone(), CandidateList::new(), 2, s.t0);
        assert!(matches!(s.resolve("card1", &three()), Propagation::Resolved(_)));

        s.registry.register("card2".into(), subj.clone(), CandidateList::new(), 1, s.t0);
        let one: CandidateList = vec![c("Alice", "@alice")].into();
        assert!(matches!(s.resolve("card2", &one), Propagation::Downgrade { .. }));
        assert_eq!(s.cache.get(&subj.unwrap()).unwrap().len(), 3);
        assert!(s.registry.get(&"card2".into(), s.t0).is_some(), "rejected detail leaves the request pending");
    }

    #[test]
    fn duplicates_collapse_before_propagation() {
        let mut s = State::new();
        s.registry.register("card1".into(), None, CandidateList::new(), 2, s.t0);
        let dup: CandidateList = vec![c("Alice", "@alice"), c("ALICE", "@Alice"), c("Bob", "@bob")].into();
        let Propagation::Resolved(res) = s.resolve("card1", &dup) else { panic!("expected resolution") };
        assert_eq!(res.collaborators.len(), 2);
        assert_eq!(res.subject_id, SubjectId::for_request(&"card1".into()));
    }

    #[test]
    fn empty_detail_is_not_propagated() {
        let mut s = State::new();
        s.registry.register("card1".into(), None, CandidateList::new(), 2, s.t0);
        assert_eq!(s.resolve("card1", &CandidateList::new()), Propagation::Empty);
        assert!(s.cache.is_empty());
        assert_eq!(s.resolve("nope", &three()), Propagation::Missing);
    }
}
