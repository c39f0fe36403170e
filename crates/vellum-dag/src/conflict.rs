//! Fork descriptors and inclusion proofs.

use serde::{Deserialize, Serialize};
use vellum_cas::Cid;

/// Description of an unresolved fork in a document's history.
///
/// Computed on demand from the current head set; never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDescriptor {
    /// The diverging heads, sorted.
    pub heads: Vec<Cid>,

    /// Nearest common ancestor of the heads, if the histories intersect.
    pub common_ancestor: Option<Cid>,

    /// Whether an automatic three-way merge would have a base to work from.
    pub resolvable: bool,
}

/// A parent-to-child path demonstrating that one node is a causal ancestor
/// of another.
///
/// The first element is the ancestor being proven, the last is the root the
/// proof was requested against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    pub path: Vec<Cid>,
}

impl InclusionProof {
    /// The ancestor the proof establishes.
    pub fn target(&self) -> Option<&Cid> {
        self.path.first()
    }

    /// The root the proof terminates at.
    pub fn root(&self) -> Option<&Cid> {
        self.path.last()
    }

    /// Number of edges in the path.
    pub fn depth(&self) -> usize {
        self.path.len().saturating_sub(1)
    }
}
