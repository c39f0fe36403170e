//! In-memory content store.
//!
//! Reference implementation used by the DAG engine tests and session
//! integration tests. Real deployments substitute a durable backend behind
//! the same trait.

use crate::cid::{Cid, Hasher};
use crate::store::{ContentStore, Result, StoreError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory implementation of [`ContentStore`].
#[derive(Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<Cid, Vec<u8>>>,
    pins: RwLock<HashMap<Cid, u64>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current pin count for a CID.
    pub fn pin_count(&self, cid: &Cid) -> u64 {
        self.pins.read().get(cid).copied().unwrap_or(0)
    }

    /// Overwrite the bytes stored under an existing CID.
    ///
    /// Deliberately breaks the content-address invariant; exists so tests
    /// can simulate out-of-band corruption for `verify_integrity`.
    pub fn corrupt(&self, cid: &Cid, bytes: Vec<u8>) -> bool {
        let mut blobs = self.blobs.write();
        match blobs.get_mut(cid) {
            Some(slot) => {
                *slot = bytes;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn put(&self, bytes: &[u8]) -> Result<Cid> {
        let cid = Hasher::digest(bytes);
        self.blobs
            .write()
            .entry(cid)
            .or_insert_with(|| bytes.to_vec());
        Ok(cid)
    }

    async fn get(&self, cid: &Cid) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .get(cid)
            .cloned()
            .ok_or(StoreError::NotFound(*cid))
    }

    async fn has(&self, cid: &Cid) -> bool {
        self.blobs.read().contains_key(cid)
    }

    async fn pin(&self, cid: &Cid) -> Result<()> {
        if !self.blobs.read().contains_key(cid) {
            return Err(StoreError::NotFound(*cid));
        }
        *self.pins.write().entry(*cid).or_insert(0) += 1;
        Ok(())
    }

    async fn unpin(&self, cid: &Cid) {
        let mut pins = self.pins.write();
        if let Some(count) = pins.get_mut(cid) {
            *count -= 1;
            if *count == 0 {
                pins.remove(cid);
            }
        }
    }

    async fn sweep_unpinned(&self) -> Vec<Cid> {
        let pins = self.pins.read();
        let mut blobs = self.blobs.write();
        let swept: Vec<Cid> = blobs
            .keys()
            .filter(|cid| !pins.contains_key(cid))
            .copied()
            .collect();
        for cid in &swept {
            blobs.remove(cid);
        }
        swept
    }
}
