//! Candidate list quality scoring.
//!
//! Only the ordering matters: more populated identifier fields, or more entries,
//! never lowers the score, and lists with the same population and length tie.

use crate::Collaborator;

pub type QualityScore = u32;

/// Weight of one populated field (name, handle or id) on any entry.
const FIELD_WEIGHT: QualityScore = 4;
/// Weight of one entry regardless of how many fields it carries.
const ENTRY_WEIGHT: QualityScore = 1;

pub fn score(list: &[Collaborator]) -> QualityScore {
    let fields: usize = list.iter().map(Collaborator::populated_fields).sum();
    (fields as QualityScore).saturating_mul(FIELD_WEIGHT).saturating_add((list.len() as QualityScore).saturating_mul(ENTRY_WEIGHT))
}
