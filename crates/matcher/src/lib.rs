//! Cire matcher: decide which pending request a detailed collaborator list belongs to.
//!
//! A live trigger pointing at a live request wins outright. Otherwise the primary
//! entry of the detailed list is corroborated against every live partial list and
//! ties are broken deterministically: larger expected count, then higher partial
//! quality, then the most recently created request.

#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::time::Instant;

use cire_core::{CandidateList, Collaborator, RequestKey};
use cire_store::{PendingRegistry, PendingRequest, TriggerTracker};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// The user opened the dialog from this card.
    Trigger,
    /// Exactly one live request corroborated the primary collaborator.
    Unique,
    /// Several requests corroborated; this one ranked first.
    Ranked { contenders: usize },
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Trigger => "trigger",
            MatchKind::Unique => "unique",
            MatchKind::Ranked { .. } => "ranked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub key: RequestKey,
    pub kind: MatchKind,
}

#[derive(Debug, Clone, Copy)]
pub struct MatchOpts {
    /// Detailed lists shorter than this never fuzzy-match (single-collaborator content).
    pub min_detailed_len: usize,
}

impl Default for MatchOpts {
    fn default() -> Self { Self { min_detailed_len: 2 } }
}

/// Ranking used when several requests are plausible; `Greater` means `a` wins.
pub fn rank(a: &PendingRequest, b: &PendingRequest) -> Ordering {
    a.expected_count()
        .cmp(&b.expected_count())
        .then_with(|| a.partial_score().cmp(&b.partial_score()))
        .then_with(|| a.created_at().cmp(&b.created_at()))
        .then_with(|| a.seq().cmp(&b.seq()))
}

fn corroborates(req: &PendingRequest, primary: &Collaborator) -> bool {
    req.partial().iter().any(|p| p.shares_identity(primary))
}

pub fn find_match(
    registry: &mut PendingRegistry,
    trigger: &mut TriggerTracker,
    detailed: &CandidateList,
    now: Instant,
    opts: MatchOpts,
) -> Option<Match> {
    let started = std::time::Instant::now();
    let out = find_match_inner(registry, trigger, detailed, now, opts);
    metrics::histogram!("cire_match_ms", started.elapsed().as_secs_f64() * 1_000.0);
    match &out {
        Some(m) => metrics::counter!("cire_match_total", 1u64, "kind" => m.kind.as_str()),
        None => metrics::counter!("cire_unmatched_total", 1u64),
    }
    out
}

fn find_match_inner(
    registry: &mut PendingRegistry,
    trigger: &mut TriggerTracker,
    detailed: &CandidateList,
    now: Instant,
    opts: MatchOpts,
) -> Option<Match> {
    if let Some(key) = trigger.current(now).cloned() {
        if registry.get(&key, now).is_some() {
            debug!(key = %key, "detail matched by trigger");
            return Some(Match { key, kind: MatchKind::Trigger });
        }
        debug!(key = %key, "trigger points at no live request; falling back to corroboration");
    }

    if detailed.len() < opts.min_detailed_len {
        debug!(len = detailed.len(), min = opts.min_detailed_len, "detail too short to disambiguate");
        return None;
    }
    let primary = detailed.primary()?;

    let contenders: Vec<&PendingRequest> = registry.all_live(now).filter(|r| corroborates(r, primary)).collect();
    let kind = match contenders.len() {
        0 => {
            debug!(primary = ?primary.identity_key(), "no pending request corroborates detail");
            return None;
        }
        1 => MatchKind::Unique,
        n => MatchKind::Ranked { contenders: n },
    };
    let best = contenders.into_iter().max_by(|a, b| rank(a, b))?;
    debug!(key = %best.key(), kind = kind.as_str(), "detail matched by corroboration");
    Some(Match { key: best.key().clone(), kind })
}
