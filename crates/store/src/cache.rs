//! Best resolution seen so far per subject.

use cire_core::{score, CandidateList, QualityScore, SubjectId};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResolution {
    pub collaborators: CandidateList,
    pub score: QualityScore,
    pub expected_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheDecision {
    Inserted,
    Replaced { previous: QualityScore },
    /// Offer scored strictly below the cached entry; cache unchanged.
    Rejected { cached: QualityScore, offered: QualityScore },
}

impl CacheDecision {
    pub fn accepted(&self) -> bool { !matches!(self, CacheDecision::Rejected { .. }) }
}

/// Subject → collaborators. An entry is only replaced by an offer scoring at least as high.
#[derive(Debug, Default)]
pub struct ResolvedCache {
    map: FxHashMap<SubjectId, CachedResolution>,
}

impl ResolvedCache {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.map.len() }
    pub fn is_empty(&self) -> bool { self.map.is_empty() }

    pub fn get(&self, subject: &SubjectId) -> Option<&CandidateList> { self.map.get(subject).map(|c| &c.collaborators) }

    pub fn entry(&self, subject: &SubjectId) -> Option<&CachedResolution> { self.map.get(subject) }

    /// Would `offered` be accepted for `subject`?
    pub fn check(&self, subject: &SubjectId, offered: QualityScore) -> CacheDecision {
        match self.map.get(subject) {
            None => CacheDecision::Inserted,
            Some(c) if c.score > offered => CacheDecision::Rejected { cached: c.score, offered },
            Some(c) => CacheDecision::Replaced { previous: c.score },
        }
    }

    pub fn offer(&mut self, subject: SubjectId, collaborators: CandidateList, expected_count: usize) -> CacheDecision {
        let offered = score(&collaborators);
        let decision = self.check(&subject, offered);
        if decision.accepted() {
            self.map.insert(subject, CachedResolution { collaborators, score: offered, expected_count });
        }
        decision
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SubjectId, &CachedResolution)> { self.map.iter() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cire_core::Collaborator;

    fn list(handles: &[&str]) -> CandidateList {
        handles.iter().filter_map(|h| Collaborator::from_parts(Some(*h), Some(format!("@{}", h).as_str()), None)).collect()
    }

    fn subject() -> SubjectId { SubjectId::new("vid1").unwrap() }

    #[test]
    fn never_downgrades() {
        let mut c = ResolvedCache::new();
        assert_eq!(c.offer(subject(), list(&["a", "b", "c"]), 3), CacheDecision::Inserted);
        let d = c.offer(subject(), list(&["a"]), 1);
        assert!(matches!(d, CacheDecision::Rejected { .. }));
        assert_eq!(c.get(&subject()).unwrap().len(), 3);
    }

    #[test]
    fn equal_or_better_replaces() {
        let mut c = ResolvedCache::new();
        c.offer(subject(), list(&["a", "b"]), 2);
        assert!(matches!(c.offer(subject(), list(&["x", "y"]), 2), CacheDecision::Replaced { .. }));
        assert_eq!(c.get(&subject()).unwrap()[0].name(), Some("x"));
        c.offer(subject(), list(&["x", "y", "z"]), 3);
        assert_eq!(c.entry(&subject()).unwrap().expected_count, 3);
    }
}
