//! Cire public API façade (in-process).
//!
//! The extraction layer feeds partial card data and triggers, the detail layer
//! feeds disambiguation lists, and the filtering engine subscribes to
//! [`ResolutionResult`]s. Nothing in here fails loudly: malformed input,
//! unmatched detail and downgrade attempts all end as "nothing happened".

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

pub mod actor;
pub mod config;
pub mod engine;
pub mod propagate;

pub use actor::{spawn_engine, submit, EngineHandle, ResolvedSnapshot};
pub use cire_core::{CandidateList, Collaborator, RequestKey, ResolutionResult, SubjectId};
pub use config::EngineConfig;
pub use engine::{CollabEngine, PartialOutcome};
pub use propagate::{Propagation, Propagator};

/// API errors; only raised at the edges (event decoding, actor transport).
#[derive(Debug, thiserror::Error, Serialize, Deserialize)]
pub enum CireError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("closed: {0}")]
    Closed(String),
}

pub type CireResult<T> = Result<T, CireError>;

/// One input to the engine, in arrival order. Also the replay line format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A card rendered showing several collaborators.
    Partial {
        key: RequestKey,
        #[serde(default)]
        subject_id: Option<String>,
        #[serde(default)]
        candidates: CandidateList,
        #[serde(default)]
        expected_count: usize,
    },
    /// The user interacted with a card in a way that opens the detail dialog.
    Trigger { key: RequestKey },
    /// A disambiguation dialog rendered its full list.
    Detailed { candidates: CandidateList },
    /// A card is known to describe a subject but is not awaiting detail.
    Track { key: RequestKey, subject_id: String },
    Cancel { key: RequestKey },
}

impl EngineEvent {
    pub fn from_json_line(line: &str) -> CireResult<Self> {
        serde_json::from_str(line).map_err(|e| CireError::Validation(e.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::Partial { .. } => "partial",
            EngineEvent::Trigger { .. } => "trigger",
            EngineEvent::Detailed { .. } => "detailed",
            EngineEvent::Track { .. } => "track",
            EngineEvent::Cancel { .. } => "cancel",
        }
    }
}

/// Runtime counters exposed to hosts and the CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EngineStats {
    pub pending: usize,
    pub resolved_subjects: usize,
    pub resolved: u64,
    pub unmatched: u64,
    pub downgrades_rejected: u64,
    pub empty_details: u64,
    pub cache_hits: u64,
    pub expired: u64,
    pub evicted: u64,
}
