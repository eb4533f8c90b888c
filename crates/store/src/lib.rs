//! Cire store: in-RAM state the engine matches and resolves against.
//!
//! Everything here is synchronous and takes the current instant explicitly;
//! expiry is swept lazily on access rather than by a timer.

#![forbid(unsafe_code)]

pub mod cache;
pub mod entries;
pub mod registry;
pub mod trigger;

pub use cache::{CacheDecision, CachedResolution, ResolvedCache};
pub use entries::EntryIndex;
pub use registry::{PendingRegistry, PendingRequest};
pub use trigger::{TriggerRecord, TriggerTracker};
