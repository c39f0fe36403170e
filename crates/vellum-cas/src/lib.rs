//! # vellum-cas
//!
//! Content identifiers and the content-addressed blob store for the Vellum
//! sync core.
//!
//! This crate provides:
//! - [`Cid`]: a 32-byte SHA-256 content identifier with hex round-trip
//! - [`Hasher`]: incremental hashing producing CIDs
//! - [`ContentStore`]: the async store contract (idempotent `put`,
//!   reference-counted pinning, sweep of unpinned content)
//! - [`MemoryStore`]: the in-memory reference implementation
//!
//! The rest of the sync core only ever talks to the store through the
//! [`ContentStore`] trait; durable backends (SQLite, KV engines) plug in
//! behind it without touching the DAG or protocol layers.

mod cid;
mod memory;
mod store;

pub use cid::{Cid, Hasher};
pub use memory::MemoryStore;
pub use store::{ContentStore, Result, StoreError};
