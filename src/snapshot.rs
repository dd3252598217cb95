//! Atomically replaced snapshot holder shared by the facades

use std::sync::Arc;
use tokio::sync::watch;

/// Holds the last successfully decoded value of a facade
///
/// The value is published as a whole `Arc`, so a reader always sees either
/// the previous snapshot or the new one. Nothing is written until an update
/// has fully succeeded; a failed or cancelled update leaves the cell as it was.
#[derive(Debug)]
pub struct SnapshotCell<T> {
    tx: watch::Sender<Option<Arc<T>>>,
}

impl<T> SnapshotCell<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Current snapshot; `None` until the first successful update
    pub fn get(&self) -> Option<Arc<T>> {
        self.tx.borrow().clone()
    }

    /// Publish a new snapshot, returning the shared handle
    pub fn replace(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.tx.send_replace(Some(value.clone()));
        value
    }

    /// Receiver notified on every replacement
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<T>>> {
        self.tx.subscribe()
    }
}

impl<T> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self::new()
    }
}
