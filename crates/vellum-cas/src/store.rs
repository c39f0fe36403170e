//! The content store contract.
//!
//! The DAG engine never assumes local latency: `put` and `get` may suspend,
//! so the trait is async. Pinning is reference-counted; content still pinned
//! by a DAG head or an in-flight proof survives a sweep.

use crate::cid::Cid;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur in content store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Content not found: {0}")]
    NotFound(Cid),

    #[error("Store I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Durable mapping from a content hash to immutable bytes.
#[async_trait]
pub trait ContentStore: Send + Sync + 'static {
    /// Store bytes, returning their CID.
    ///
    /// Idempotent: re-putting identical bytes returns the same CID and does
    /// not duplicate storage.
    async fn put(&self, bytes: &[u8]) -> Result<Cid>;

    /// Fetch the bytes for a CID.
    async fn get(&self, cid: &Cid) -> Result<Vec<u8>>;

    /// Check whether a CID is present.
    async fn has(&self, cid: &Cid) -> bool;

    /// Increment the pin count for a CID, protecting it from sweeps.
    async fn pin(&self, cid: &Cid) -> Result<()>;

    /// Decrement the pin count for a CID. Unpinning below zero is a no-op.
    async fn unpin(&self, cid: &Cid);

    /// Remove all unpinned content, returning the CIDs that were swept.
    async fn sweep_unpinned(&self) -> Vec<Cid>;
}
