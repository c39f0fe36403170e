//! External collaborator contracts.
//!
//! The session core does not read or write document state itself. Pull
//! handling delegates historical-change retrieval to a [`ChangeLog`], and
//! inbound batches are handed to a [`ChangeApplier`]. The in-memory
//! implementations here back the test suites.

use async_trait::async_trait;
use parking_lot::RwLock;
use vellum_proto::{Change, Checkpoint};

/// A batch of changes produced by the change log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeBatch {
    pub changes: Vec<Change>,
    pub checkpoint: Checkpoint,
    pub has_more: bool,
}

/// Source of historical changes, consumed when answering a pull.
#[async_trait]
pub trait ChangeLog: Send + Sync + 'static {
    /// Changes recorded after `checkpoint`, restricted to `collections`
    /// when non-empty, capped at `limit` entries.
    async fn changes_since(
        &self,
        checkpoint: Option<&Checkpoint>,
        collections: &[String],
        limit: Option<u64>,
    ) -> ChangeBatch;
}

/// Sink for inbound change batches from push and pull-response handling.
#[async_trait]
pub trait ChangeApplier: Send + Sync + 'static {
    async fn apply(&self, changes: Vec<Change>);
}

/// In-memory change log: an append-only list with index-based checkpoints.
#[derive(Default)]
pub struct MemoryChangeLog {
    entries: RwLock<Vec<Change>>,
}

impl MemoryChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a local change.
    pub fn append(&self, change: Change) {
        self.entries.write().push(change);
    }

    /// Number of recorded changes.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ChangeLog for MemoryChangeLog {
    async fn changes_since(
        &self,
        checkpoint: Option<&Checkpoint>,
        collections: &[String],
        limit: Option<u64>,
    ) -> ChangeBatch {
        let entries = self.entries.read();
        let start = checkpoint
            .and_then(|cp| cp.0.parse::<usize>().ok())
            .unwrap_or(0)
            .min(entries.len());

        let mut changes = Vec::new();
        let mut consumed = start;
        for change in entries[start..].iter() {
            if let Some(limit) = limit {
                if changes.len() as u64 >= limit {
                    break;
                }
            }
            consumed += 1;
            if collections.is_empty() || collections.contains(&change.collection) {
                changes.push(change.clone());
            }
        }

        ChangeBatch {
            changes,
            checkpoint: Checkpoint::new(consumed.to_string()),
            has_more: consumed < entries.len(),
        }
    }
}

/// In-memory applier that records every batch it receives.
#[derive(Default)]
pub struct MemoryApplier {
    applied: RwLock<Vec<Change>>,
}

impl MemoryApplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All changes applied so far, in arrival order.
    pub fn applied(&self) -> Vec<Change> {
        self.applied.read().clone()
    }

    pub fn applied_count(&self) -> usize {
        self.applied.read().len()
    }
}

#[async_trait]
impl ChangeApplier for MemoryApplier {
    async fn apply(&self, changes: Vec<Change>) {
        self.applied.write().extend(changes);
    }
}
