//! Single-flight bookkeeping: at most one measurement per cell at a time.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

use crate::types::CellKey;

/// Result of trying to become the measuring task for a cell.
pub(crate) enum Claim {
    /// Caller must measure; dropping the guard releases the cell.
    Leader(InFlightGuard),
    /// Another task is measuring; the receiver flips to `true` when it is done.
    Follower(watch::Receiver<bool>),
}

/// Cells currently being measured.
#[derive(Default)]
pub(crate) struct InFlightTable {
    entries: Mutex<HashMap<CellKey, watch::Receiver<bool>>>,
}

impl InFlightTable {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Receiver for an in-progress measurement of `key`, if there is one.
    pub(crate) fn follow(&self, key: &CellKey) -> Option<watch::Receiver<bool>> {
        self.entries.lock().get(key).cloned()
    }

    /// Atomically marks `key` in flight, or joins the existing measurement.
    pub(crate) fn claim(self: &Arc<Self>, key: &CellKey) -> Claim {
        let mut entries = self.entries.lock();
        if let Some(rx) = entries.get(key) {
            return Claim::Follower(rx.clone());
        }

        let (tx, rx) = watch::channel(false);
        entries.insert(key.clone(), rx);
        Claim::Leader(InFlightGuard {
            table: Arc::clone(self),
            key: key.clone(),
            done: tx,
        })
    }

    pub(crate) fn contains(&self, key: &CellKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Held by the measuring task. Dropping it (success, failure or panic)
/// clears the in-flight marker and then wakes every follower.
pub(crate) struct InFlightGuard {
    table: Arc<InFlightTable>,
    key: CellKey,
    done: watch::Sender<bool>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.table.entries.lock().remove(&self.key);
        let _ = self.done.send(true);
    }
}
