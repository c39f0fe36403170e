//! # vellum-dag
//!
//! Merkle DAG engine for the Vellum sync core.
//!
//! This crate provides:
//! - Content-addressed, tamper-evident per-document edit history
//! - Automatic head (causal frontier) tracking and fork detection
//! - Verifiable merge commits that resolve forks
//! - Chain verification and inclusion proofs
//!
//! ## Architecture
//!
//! Every document's history is a hash-linked graph of [`DagNode`]s stored
//! alongside payload blobs in a [`vellum_cas::ContentStore`]. The engine is
//! append-only: a node is admitted only once all of its parents are present,
//! so the graph never contains forward references or cycles. Two heads for
//! one document mean concurrent divergent edits; [`DagEngine::resolve_conflict`]
//! collapses them with a merge node whose content the caller supplies.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use vellum_cas::MemoryStore;
//! use vellum_dag::DagEngine;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let dag = DagEngine::new(Arc::new(MemoryStore::new()));
//!
//! let genesis = dag.add_node(b"v1", vec![], "notes", "alice").await.unwrap();
//! let edit = dag.add_node(b"v2", vec![genesis], "notes", "alice").await.unwrap();
//!
//! assert_eq!(dag.get_heads("notes"), vec![edit]);
//! assert!(dag.verify_chain(&edit).await);
//! # }
//! ```

mod conflict;
mod engine;
mod node;

pub use conflict::{ConflictDescriptor, InclusionProof};
pub use engine::{DagEngine, DagError, DagEvent, Result};
pub use node::DagNode;
