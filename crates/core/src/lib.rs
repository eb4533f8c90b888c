//! Cire core types: collaborator identities, candidate lists and the clock seam.

#![forbid(unsafe_code)]

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub mod normalize;
pub mod quality;

pub use normalize::{extract_opaque_id, is_opaque_id, name_key, normalize};
pub use quality::{score, QualityScore};

/// Canonical lowercase handle key, always starting with `@`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Only `normalize` builds identifiers, so the invariants hold for every value.
    pub(crate) fn from_normalized(s: String) -> Self { Self(s) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl TryFrom<String> for Identifier {
    type Error = IdError;

    fn try_from(raw: String) -> Result<Self, Self::Error> { normalize(&raw).ok_or(IdError::NotAHandle(raw)) }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self { id.0 }
}

/// Composite identity of one rendered card instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn new(s: impl Into<String>) -> Self { Self(s.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for RequestKey {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

/// Identifier of the content item a card describes (several cards may share one).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    /// Returns `None` for blank input; an empty subject means "not known yet".
    pub fn new(s: impl Into<String>) -> Option<Self> {
        let s = s.into();
        let trimmed = s.trim();
        if trimmed.is_empty() { None } else { Some(Self(trimmed.to_string())) }
    }

    /// Subject used when a request resolves before its content item was identified.
    pub fn for_request(key: &RequestKey) -> Self { Self(format!("card:{}", key.as_str())) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl TryFrom<String> for SubjectId {
    type Error = IdError;

    fn try_from(raw: String) -> Result<Self, Self::Error> { Self::new(raw).ok_or(IdError::BlankSubject) }
}

impl From<SubjectId> for String {
    fn from(id: SubjectId) -> Self { id.0 }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdError {
    #[error("not a handle: {0:?}")]
    NotAHandle(String),
    #[error("subject id is blank")]
    BlankSubject,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("collaborator has no usable name, handle or id")]
    Empty,
}

/// Shape accepted at the boundary; every field is optional and unvalidated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCollaborator {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

/// A person credited on a content item. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawCollaborator")]
pub struct Collaborator {
    name: Option<String>,
    handle: Option<Identifier>,
    id: Option<String>,
}

impl Collaborator {
    /// Build from raw extracted fields. A handle slot holding an opaque channel
    /// id (`/channel/UC…`) is treated as the id. Returns `None` when nothing usable
    /// survives.
    pub fn from_parts(name: Option<&str>, handle: Option<&str>, id: Option<&str>) -> Option<Self> {
        let name = name
            .map(|n| n.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|n| !n.is_empty());
        let handle_raw = handle.map(str::trim).filter(|h| !h.is_empty());
        let norm_handle = handle_raw.and_then(normalize);
        let id = id
            .map(str::trim)
            .filter(|i| !i.is_empty())
            .map(|i| extract_opaque_id(i).unwrap_or_else(|| i.to_string()))
            .or_else(|| handle_raw.filter(|_| norm_handle.is_none()).and_then(extract_opaque_id));
        if name.is_none() && norm_handle.is_none() && id.is_none() {
            return None;
        }
        Some(Self { name, handle: norm_handle, id })
    }

    pub fn named(name: &str) -> Option<Self> { Self::from_parts(Some(name), None, None) }

    pub fn name(&self) -> Option<&str> { self.name.as_deref() }
    pub fn handle(&self) -> Option<&Identifier> { self.handle.as_ref() }
    pub fn id(&self) -> Option<&str> { self.id.as_deref() }

    pub fn name_key(&self) -> Option<String> { self.name.as_deref().and_then(name_key) }

    pub fn populated_fields(&self) -> usize {
        self.name.is_some() as usize + self.handle.is_some() as usize + self.id.is_some() as usize
    }

    /// Strongest available identity, class-prefixed so a name never collides with a handle.
    pub fn identity_key(&self) -> Option<String> {
        if let Some(h) = &self.handle { return Some(h.as_str().to_string()); }
        if let Some(id) = &self.id { return Some(format!("id:{}", id)); }
        self.name_key().map(|n| format!("name:{}", n))
    }

    /// True when any populated identifier agrees (handle, opaque id, or case-folded name).
    pub fn shares_identity(&self, other: &Collaborator) -> bool {
        if let (Some(a), Some(b)) = (&self.handle, &other.handle) { if a == b { return true; } }
        if let (Some(a), Some(b)) = (&self.id, &other.id) { if a == b { return true; } }
        match (self.name_key(), other.name_key()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Copy of `self` with missing fields taken from `other`.
    pub fn filled_from(&self, other: &Collaborator) -> Collaborator {
        Collaborator {
            name: self.name.clone().or_else(|| other.name.clone()),
            handle: self.handle.clone().or_else(|| other.handle.clone()),
            id: self.id.clone().or_else(|| other.id.clone()),
        }
    }
}

impl TryFrom<RawCollaborator> for Collaborator {
    type Error = CollaboratorError;
    fn try_from(raw: RawCollaborator) -> Result<Self, Self::Error> {
        Self::from_parts(raw.name.as_deref(), raw.handle.as_deref(), raw.id.as_deref()).ok_or(CollaboratorError::Empty)
    }
}

/// Ordered collaborator list, either a partial card scrape or a detailed dialog listing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateList(SmallVec<[Collaborator; 4]>);

impl CandidateList {
    pub fn new() -> Self { Self(SmallVec::new()) }
    pub fn primary(&self) -> Option<&Collaborator> { self.0.first() }
    pub fn as_slice(&self) -> &[Collaborator] { &self.0 }

    /// Drop entries with no usable identifier and merge duplicates into their first occurrence.
    pub fn sanitized(&self) -> CandidateList {
        let mut out: SmallVec<[Collaborator; 4]> = SmallVec::new();
        for c in self.0.iter().filter(|c| c.identity_key().is_some()) {
            if let Some(slot) = out.iter_mut().find(|kept| kept.shares_identity(c)) {
                *slot = slot.filled_from(c);
            } else {
                out.push(c.clone());
            }
        }
        CandidateList(out)
    }
}

impl std::ops::Deref for CandidateList {
    type Target = [Collaborator];
    fn deref(&self) -> &[Collaborator] { &self.0 }
}

impl FromIterator<Collaborator> for CandidateList {
    fn from_iter<I: IntoIterator<Item = Collaborator>>(iter: I) -> Self { Self(iter.into_iter().collect()) }
}

impl From<Vec<Collaborator>> for CandidateList {
    fn from(v: Vec<Collaborator>) -> Self { Self(SmallVec::from_vec(v)) }
}

/// Subject → collaborators binding handed to the filtering engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    pub subject_id: SubjectId,
    pub collaborators: CandidateList,
    pub expected_count: usize,
    pub quality_score: QualityScore,
    /// Every known entry for the subject; the originating entry comes first.
    pub entries: Vec<RequestKey>,
}

pub mod prelude {
    pub use super::{
        CandidateList, Clock, Collaborator, Identifier, ManualClock, RequestKey, ResolutionResult, SubjectId, SystemClock,
    };
}

/// Time source. Engines hold one so expiry can be driven deterministically.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant { Instant::now() }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self { Self { base: Instant::now(), offset_ms: AtomicU64::new(0) } }

    pub fn advance(&self, by: Duration) {
        self.offset_ms.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self { Self::new() }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant { self.base + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst)) }
}
