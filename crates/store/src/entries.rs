//! Known card entries per subject, used to fan a resolution out to siblings.

use std::collections::VecDeque;

use cire_core::{RequestKey, SubjectId};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Bounded subject → entries index; the least recently added subject is dropped when full.
#[derive(Debug)]
pub struct EntryIndex {
    map: FxHashMap<SubjectId, SmallVec<[RequestKey; 4]>>,
    order: VecDeque<SubjectId>,
    cap: usize,
}

impl EntryIndex {
    pub fn new(cap: usize) -> Self { Self { map: FxHashMap::default(), order: VecDeque::new(), cap: cap.max(1) } }

    pub fn len(&self) -> usize { self.map.len() }
    pub fn is_empty(&self) -> bool { self.map.is_empty() }

    pub fn track(&mut self, subject: SubjectId, key: RequestKey) {
        if !self.map.contains_key(&subject) {
            if self.map.len() >= self.cap {
                if let Some(old) = self.order.pop_front() {
                    self.map.remove(&old);
                }
            }
            self.order.push_back(subject.clone());
        }
        let keys = self.map.entry(subject).or_default();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    pub fn entries(&self, subject: &SubjectId) -> &[RequestKey] {
        self.map.get(subject).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// `origin` followed by every other entry known for `subject`.
    pub fn fan_out(&self, subject: &SubjectId, origin: &RequestKey) -> Vec<RequestKey> {
        let mut out = vec![origin.clone()];
        out.extend(self.entries(subject).iter().filter(|k| *k != origin).cloned());
        out
    }
}
