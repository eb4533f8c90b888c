//! Engine behind a single task, for hosts that feed events from several threads.
//!
//! Events are applied strictly in the order the channel delivers them; readers
//! get a lock-free view of the resolved cache that is swapped after each change.

use std::sync::Arc;

use arc_swap::ArcSwap;
use cire_core::{CandidateList, SubjectId};
use rustc_hash::FxHashMap;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::{CireError, CireResult, CollabEngine, EngineEvent};

/// Resolved lists as of `epoch`. Lists are shared between snapshots, so a swap
/// copies pointers only.
#[derive(Debug, Clone, Default)]
pub struct ResolvedSnapshot {
    pub epoch: u64,
    pub subjects: FxHashMap<SubjectId, Arc<CandidateList>>,
}

impl ResolvedSnapshot {
    fn capture(engine: &CollabEngine) -> Self {
        let subjects =
            engine.resolved_cache().iter().map(|(s, c)| (s.clone(), Arc::new(c.collaborators.clone()))).collect();
        Self { epoch: engine.epoch(), subjects }
    }
}

/// Read side of a spawned engine.
#[derive(Clone)]
pub struct EngineHandle {
    snap: Arc<ArcSwap<ResolvedSnapshot>>,
    epoch_rx: watch::Receiver<u64>,
}

impl EngineHandle {
    pub fn current(&self) -> Arc<ResolvedSnapshot> { self.snap.load_full() }
    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> { self.epoch_rx.clone() }
    pub fn resolved(&self, subject: &SubjectId) -> Option<Arc<CandidateList>> { self.snap.load().subjects.get(subject).cloned() }
}

/// Apply one event; record the subject if the resolved cache changed.
fn apply_one(engine: &mut CollabEngine, ev: EngineEvent, dirty: &mut Vec<SubjectId>) {
    let kind = ev.kind();
    let before = engine.epoch();
    let res = engine.apply(ev);
    if engine.epoch() != before {
        if let Some(r) = res {
            debug!(kind, subject = %r.subject_id, "resolved cache changed");
            dirty.push(r.subject_id);
        }
    }
}

/// Move `engine` onto a task consuming events. Subscribe to resolutions on the
/// engine before calling this. Must be called from within a tokio runtime.
///
/// Events already queued are applied as one batch before a new snapshot is published.
pub fn spawn_engine(mut engine: CollabEngine, cap: usize) -> (mpsc::Sender<EngineEvent>, EngineHandle) {
    let (tx, mut rx) = mpsc::channel::<EngineEvent>(cap.max(1));
    let initial = ResolvedSnapshot::capture(&engine);
    let mut subjects = initial.subjects.clone();
    let snap = Arc::new(ArcSwap::from_pointee(initial));
    let (epoch_tx, epoch_rx) = watch::channel(engine.epoch());
    let snap_clone = Arc::clone(&snap);

    tokio::spawn(async move {
        let mut dirty: Vec<SubjectId> = Vec::new();
        while let Some(ev) = rx.recv().await {
            apply_one(&mut engine, ev, &mut dirty);
            while let Ok(ev) = rx.try_recv() {
                apply_one(&mut engine, ev, &mut dirty);
            }
            if dirty.is_empty() {
                continue;
            }
            for subject in dirty.drain(..) {
                if let Some(list) = engine.resolved(&subject) {
                    subjects.insert(subject, Arc::new(list.clone()));
                }
            }
            let epoch = engine.epoch();
            snap_clone.store(Arc::new(ResolvedSnapshot { epoch, subjects: subjects.clone() }));
            let _ = epoch_tx.send(epoch);
            debug!(epoch, subjects = subjects.len(), "resolved snapshot swapped");
        }
        info!("engine loop stopped");
    });

    (tx, EngineHandle { snap, epoch_rx })
}

/// Queue `ev` on a spawned engine, waiting for channel capacity.
pub async fn submit(tx: &mpsc::Sender<EngineEvent>, ev: EngineEvent) -> CireResult<()> {
    let kind = ev.kind();
    tx.send(ev).await.map_err(|_| CireError::Closed(format!("engine loop gone; dropped {} event", kind)))
}
