//! DAG node definition and content addressing.
//!
//! Each node records one revision of one document:
//! - CIDs of its causal predecessors (empty for a genesis node)
//! - the CID of the payload blob in the content store
//! - the document it belongs to and the author that wrote it
//!
//! The node's own CID is computed over `(document_id, author, sorted
//! parents, payload_ref)`. `created_at` is carried as unhashed metadata so
//! that identical edits made at different times deduplicate to the same CID.

use serde::{Deserialize, Serialize};
use vellum_cas::{Cid, Hasher};

/// A node in a document's Merkle DAG.
///
/// Content-addressed and tamper-evident: any change to the hashed fields
/// changes the CID.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagNode {
    /// Content identifier computed from the node's hashed fields.
    pub cid: Cid,

    /// CIDs of parent nodes (causal predecessors). Empty for genesis.
    pub parents: Vec<Cid>,

    /// CID of the payload blob in the content store.
    pub payload_ref: Cid,

    /// The document this revision belongs to.
    pub document_id: String,

    /// The author that created this revision.
    pub author: String,

    /// Wall-clock creation time in milliseconds. Metadata only, not hashed.
    pub created_at: u64,
}

impl DagNode {
    /// Construct a node, computing its CID from the hashed fields.
    pub fn new(
        document_id: impl Into<String>,
        author: impl Into<String>,
        parents: Vec<Cid>,
        payload_ref: Cid,
        created_at: u64,
    ) -> Self {
        let document_id = document_id.into();
        let author = author.into();
        let cid = Self::compute_cid(&document_id, &author, &parents, &payload_ref);

        DagNode {
            cid,
            parents,
            payload_ref,
            document_id,
            author,
            created_at,
        }
    }

    /// Check if this is a genesis node for its document.
    pub fn is_genesis(&self) -> bool {
        self.parents.is_empty()
    }

    /// Check if this is a merge node (resolves a fork).
    pub fn is_merge(&self) -> bool {
        self.parents.len() >= 2
    }

    /// Check if this node has the given CID as a direct parent.
    pub fn has_parent(&self, cid: &Cid) -> bool {
        self.parents.contains(cid)
    }

    /// Compute the CID for a node with the given contents.
    ///
    /// Parents are hashed in sorted order and each variable-length field is
    /// length-prefixed, so no two distinct inputs serialize identically.
    pub fn compute_cid(document_id: &str, author: &str, parents: &[Cid], payload_ref: &Cid) -> Cid {
        let mut hasher = Hasher::new();

        hasher.update(&(document_id.len() as u64).to_le_bytes());
        hasher.update(document_id.as_bytes());

        hasher.update(&(author.len() as u64).to_le_bytes());
        hasher.update(author.as_bytes());

        hasher.update(&(parents.len() as u64).to_le_bytes());
        let mut sorted_parents = parents.to_vec();
        sorted_parents.sort();
        for parent in &sorted_parents {
            hasher.update(parent.as_bytes());
        }

        hasher.update(payload_ref.as_bytes());

        hasher.finalize()
    }

    /// Verify that the CID matches the node's contents.
    pub fn verify(&self) -> bool {
        let computed =
            Self::compute_cid(&self.document_id, &self.author, &self.parents, &self.payload_ref);
        computed == self.cid
    }
}
