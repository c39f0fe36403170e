//! The Merkle DAG engine.
//!
//! Tracks per-document causal history on top of a [`ContentStore`]:
//! - node admission with parent validation and automatic head tracking
//! - fork detection and merge-node resolution
//! - integrity verification and inclusion proofs
//!
//! Node admission is serialized per document, so concurrent local edits
//! cannot clobber each other's head-set update. All read-side queries take
//! shared locks only and never suspend.

use crate::conflict::{ConflictDescriptor, InclusionProof};
use crate::node::DagNode;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use vellum_cas::{Cid, ContentStore, Hasher, StoreError};

/// Errors that can occur during DAG operations.
///
/// Structural violations are typed failures; hash-mismatch detection is a
/// boolean result of `verify_integrity`/`verify_chain`, not an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DagError {
    #[error("Parent node(s) not found: {}", format_cids(.0))]
    ParentNotFound(Vec<Cid>),

    #[error("Node not found: {}", .0.short())]
    NodeNotFound(Cid),

    #[error("Content store error: {0}")]
    Store(#[from] StoreError),
}

fn format_cids(cids: &[Cid]) -> String {
    cids.iter()
        .map(|c| c.short())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, DagError>;

/// Events emitted by the engine as the graph grows.
#[derive(Clone, Debug)]
pub enum DagEvent {
    /// A node was admitted into the DAG.
    NodeAdmitted { document_id: String, cid: Cid },
    /// A document's head set grew past one entry.
    ForkDetected { document_id: String, heads: Vec<Cid> },
    /// A merge node collapsed a fork back to a single head.
    ForkResolved { document_id: String, merge_cid: Cid },
}

/// Node table plus the indices maintained incrementally at admission time.
#[derive(Default)]
struct DagIndex {
    /// All nodes by CID.
    nodes: HashMap<Cid, DagNode>,

    /// Per-document causal frontier.
    heads: HashMap<String, BTreeSet<Cid>>,

    /// Reverse index: parent -> children.
    children: HashMap<Cid, HashSet<Cid>>,
}

impl DagIndex {
    fn admit(&mut self, node: DagNode) {
        let cid = node.cid;
        let heads = self.heads.entry(node.document_id.clone()).or_default();
        for parent in &node.parents {
            heads.remove(parent);
        }
        heads.insert(cid);

        for parent in &node.parents {
            self.children.entry(*parent).or_default().insert(cid);
        }

        self.nodes.insert(cid, node);
    }
}

/// Causal history and fork resolution for every document.
pub struct DagEngine<S: ContentStore> {
    store: Arc<S>,
    index: RwLock<DagIndex>,

    /// Per-document admission locks; held across parent validation and the
    /// head-set update.
    admission: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,

    event_tx: broadcast::Sender<DagEvent>,
}

impl<S: ContentStore> DagEngine<S> {
    /// Create an engine over a content store.
    pub fn new(store: Arc<S>) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        DagEngine {
            store,
            index: RwLock::new(DagIndex::default()),
            admission: Mutex::new(HashMap::new()),
            event_tx,
        }
    }

    /// Get the underlying content store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Subscribe to graph events.
    pub fn subscribe(&self) -> broadcast::Receiver<DagEvent> {
        self.event_tx.subscribe()
    }

    /// Admit a new revision for a document.
    ///
    /// The payload is written to the content store and pinned, the node's
    /// CID is computed from `(document_id, author, parents, payload_ref)`,
    /// and the document's head set is updated (parents removed, new CID
    /// added). Fails with [`DagError::ParentNotFound`] if any parent is not
    /// already in the DAG. Admitting an identical revision twice is
    /// idempotent and returns the same CID.
    pub async fn add_node(
        &self,
        payload: &[u8],
        parents: Vec<Cid>,
        document_id: &str,
        author: &str,
    ) -> Result<Cid> {
        let lock = self.document_lock(document_id);
        let _guard = lock.lock().await;
        self.admit_locked(payload, parents, document_id, author).await
    }

    /// Get a node by CID.
    pub fn get_node(&self, cid: &Cid) -> Result<DagNode> {
        self.index
            .read()
            .nodes
            .get(cid)
            .cloned()
            .ok_or(DagError::NodeNotFound(*cid))
    }

    /// Current causal frontier for a document, sorted. Empty if unknown.
    pub fn get_heads(&self, document_id: &str) -> Vec<Cid> {
        self.index
            .read()
            .heads
            .get(document_id)
            .map(|heads| heads.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Describe the current fork for a document, if any.
    ///
    /// `None` when the document has at most one head. Otherwise reports the
    /// nearest common ancestor across all heads; `resolvable` is true iff
    /// one exists.
    pub fn detect_conflicts(&self, document_id: &str) -> Option<ConflictDescriptor> {
        let heads = self.get_heads(document_id);
        if heads.len() <= 1 {
            return None;
        }

        let mut common = Some(heads[0]);
        for head in &heads[1..] {
            common = match common {
                Some(anchor) => self.find_common_ancestor(&anchor, head),
                None => None,
            };
        }

        Some(ConflictDescriptor {
            resolvable: common.is_some(),
            common_ancestor: common,
            heads,
        })
    }

    /// Resolve a fork by admitting a merge node over the current heads.
    ///
    /// Returns `Ok(None)` when there is nothing to resolve, which is a
    /// normal outcome, not an error. On success the merge node is the
    /// document's sole head and its CID is returned.
    pub async fn resolve_conflict(
        &self,
        document_id: &str,
        merged_payload: &[u8],
        author: &str,
    ) -> Result<Option<Cid>> {
        let lock = self.document_lock(document_id);
        let _guard = lock.lock().await;

        let heads = self.get_heads(document_id);
        if heads.len() <= 1 {
            return Ok(None);
        }

        let merge_cid = self
            .admit_locked(merged_payload, heads, document_id, author)
            .await?;

        debug!(document_id, merge = %merge_cid.short(), "fork resolved");
        let _ = self.event_tx.send(DagEvent::ForkResolved {
            document_id: document_id.to_string(),
            merge_cid,
        });

        Ok(Some(merge_cid))
    }

    /// Find the nearest common ancestor of two CIDs.
    ///
    /// Bidirectional breadth-first traversal over parent edges; a CID that
    /// is itself an ancestor of the other counts. Symmetric in its
    /// arguments; `None` if the histories never intersect.
    pub fn find_common_ancestor(&self, a: &Cid, b: &Cid) -> Option<Cid> {
        let index = self.index.read();
        if !index.nodes.contains_key(a) || !index.nodes.contains_key(b) {
            return None;
        }

        let mut seen_a: HashSet<Cid> = HashSet::from([*a]);
        let mut seen_b: HashSet<Cid> = HashSet::from([*b]);
        let mut frontier_a = vec![*a];
        let mut frontier_b = vec![*b];

        loop {
            // Ties at the same depth resolve to the smallest CID so the
            // result does not depend on argument order.
            if let Some(found) = seen_a.intersection(&seen_b).min() {
                return Some(*found);
            }
            if frontier_a.is_empty() && frontier_b.is_empty() {
                return None;
            }

            frontier_a = expand_frontier(&index, &frontier_a, &mut seen_a);
            frontier_b = expand_frontier(&index, &frontier_b, &mut seen_b);
        }
    }

    /// All transitive ancestors of a CID, excluding the CID itself.
    pub fn get_ancestors(&self, cid: &Cid) -> Vec<Cid> {
        let index = self.index.read();
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut queue: VecDeque<Cid> = match index.nodes.get(cid) {
            Some(node) => node.parents.iter().copied().collect(),
            None => return result,
        };

        while let Some(current) = queue.pop_front() {
            if visited.insert(current) {
                result.push(current);
                if let Some(node) = index.nodes.get(&current) {
                    queue.extend(node.parents.iter().copied());
                }
            }
        }

        result
    }

    /// All transitive descendants of a CID, excluding the CID itself.
    pub fn get_descendants(&self, cid: &Cid) -> Vec<Cid> {
        let index = self.index.read();
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut queue: VecDeque<Cid> = match index.children.get(cid) {
            Some(children) => children.iter().copied().collect(),
            None => return result,
        };

        while let Some(current) = queue.pop_front() {
            if visited.insert(current) {
                result.push(current);
                if let Some(children) = index.children.get(&current) {
                    queue.extend(children.iter().copied());
                }
            }
        }

        result
    }

    /// Verify a single node against its claimed CID and stored payload.
    ///
    /// `false` on any mismatch or missing node/payload; tamper detection is
    /// an expected outcome for the caller to handle, not an error.
    pub async fn verify_integrity(&self, cid: &Cid) -> bool {
        let node = match self.get_node(cid) {
            Ok(node) => node,
            Err(_) => return false,
        };

        if !node.verify() {
            warn!(cid = %cid.short(), "node hash mismatch");
            return false;
        }

        match self.store.get(&node.payload_ref).await {
            Ok(bytes) => {
                let ok = Hasher::digest(&bytes) == node.payload_ref;
                if !ok {
                    warn!(cid = %cid.short(), "payload bytes do not match payload ref");
                }
                ok
            }
            Err(_) => false,
        }
    }

    /// Verify a node and every ancestor, short-circuiting on first failure.
    pub async fn verify_chain(&self, cid: &Cid) -> bool {
        if !self.verify_integrity(cid).await {
            return false;
        }
        for ancestor in self.get_ancestors(cid) {
            if !self.verify_integrity(&ancestor).await {
                return false;
            }
        }
        true
    }

    /// Build a parent-to-child path proving `target` is an ancestor of
    /// `root`. `None` if it is not.
    pub fn generate_inclusion_proof(&self, target: &Cid, root: &Cid) -> Option<InclusionProof> {
        let index = self.index.read();
        if target == root || !index.nodes.contains_key(root) {
            return None;
        }

        // BFS upward from the root, remembering which child led to each
        // ancestor, then walk the child links back down from the target.
        let mut via_child: HashMap<Cid, Cid> = HashMap::new();
        let mut queue = VecDeque::from([*root]);

        while let Some(current) = queue.pop_front() {
            if current == *target {
                let mut path = vec![*target];
                let mut cursor = *target;
                while let Some(child) = via_child.get(&cursor) {
                    path.push(*child);
                    cursor = *child;
                }
                return Some(InclusionProof { path });
            }
            if let Some(node) = index.nodes.get(&current) {
                for parent in &node.parents {
                    if !via_child.contains_key(parent) && *parent != *root {
                        via_child.insert(*parent, current);
                        queue.push_back(*parent);
                    }
                }
            }
        }

        None
    }

    /// Total number of nodes across all documents.
    pub fn node_count(&self) -> usize {
        self.index.read().nodes.len()
    }

    /// All known document IDs, sorted.
    pub fn document_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.index.read().heads.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Admission body; caller must hold the document's admission lock.
    async fn admit_locked(
        &self,
        payload: &[u8],
        parents: Vec<Cid>,
        document_id: &str,
        author: &str,
    ) -> Result<Cid> {
        {
            let index = self.index.read();
            let mut missing: Vec<Cid> = parents
                .iter()
                .filter(|p| !index.nodes.contains_key(p))
                .copied()
                .collect();
            if !missing.is_empty() {
                missing.sort();
                return Err(DagError::ParentNotFound(missing));
            }
        }

        let payload_ref = self.store.put(payload).await?;
        let node = DagNode::new(document_id, author, parents, payload_ref, now_millis());
        let cid = node.cid;

        if self.index.read().nodes.contains_key(&cid) {
            return Ok(cid);
        }

        self.store.pin(&payload_ref).await?;

        let head_count = {
            let mut index = self.index.write();
            index.admit(node);
            index.heads.get(document_id).map(|h| h.len()).unwrap_or(0)
        };

        debug!(document_id, author, cid = %cid.short(), "node admitted");
        let _ = self.event_tx.send(DagEvent::NodeAdmitted {
            document_id: document_id.to_string(),
            cid,
        });
        if head_count > 1 {
            let _ = self.event_tx.send(DagEvent::ForkDetected {
                document_id: document_id.to_string(),
                heads: self.get_heads(document_id),
            });
        }

        Ok(cid)
    }

    fn document_lock(&self, document_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.admission
            .lock()
            .entry(document_id.to_string())
            .or_default()
            .clone()
    }
}

fn expand_frontier(index: &DagIndex, frontier: &[Cid], seen: &mut HashSet<Cid>) -> Vec<Cid> {
    let mut next = Vec::new();
    for cid in frontier {
        if let Some(node) = index.nodes.get(cid) {
            for parent in &node.parents {
                if seen.insert(*parent) {
                    next.push(*parent);
                }
            }
        }
    }
    next
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_cas::MemoryStore;

    fn engine() -> DagEngine<MemoryStore> {
        DagEngine::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_genesis_becomes_head() {
        let dag = engine();
        let cid = dag.add_node(b"v1", vec![], "doc", "alice").await.unwrap();

        assert_eq!(dag.get_heads("doc"), vec![cid]);
        assert_eq!(dag.node_count(), 1);
        assert_eq!(dag.document_ids(), vec!["doc".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_document_has_no_heads() {
        let dag = engine();
        assert!(dag.get_heads("nowhere").is_empty());
    }

    #[tokio::test]
    async fn test_missing_parent_rejected() {
        let dag = engine();
        let ghost = Hasher::digest(b"never admitted");

        let result = dag.add_node(b"v1", vec![ghost], "doc", "alice").await;
        assert_eq!(result, Err(DagError::ParentNotFound(vec![ghost])));
        assert_eq!(dag.node_count(), 0);
    }

    #[tokio::test]
    async fn test_linear_history_single_head() {
        let dag = engine();
        let genesis = dag.add_node(b"v1", vec![], "doc", "alice").await.unwrap();
        let next = dag
            .add_node(b"v2", vec![genesis], "doc", "alice")
            .await
            .unwrap();

        assert_eq!(dag.get_heads("doc"), vec![next]);
        assert!(dag.detect_conflicts("doc").is_none());
        assert_eq!(dag.get_ancestors(&next), vec![genesis]);
        assert_eq!(dag.get_descendants(&genesis), vec![next]);
    }

    #[tokio::test]
    async fn test_fork_detection() {
        let dag = engine();
        let genesis = dag.add_node(b"v1", vec![], "doc", "alice").await.unwrap();
        let a = dag
            .add_node(b"edit-a", vec![genesis], "doc", "alice")
            .await
            .unwrap();
        let b = dag
            .add_node(b"edit-b", vec![genesis], "doc", "bob")
            .await
            .unwrap();

        let heads = dag.get_heads("doc");
        assert_eq!(heads.len(), 2);
        assert!(heads.contains(&a) && heads.contains(&b));

        let conflict = dag.detect_conflicts("doc").unwrap();
        assert_eq!(conflict.common_ancestor, Some(genesis));
        assert!(conflict.resolvable);
        assert_eq!(conflict.heads, heads);
    }

    #[tokio::test]
    async fn test_resolve_conflict_collapses_heads() {
        let dag = engine();
        let genesis = dag.add_node(b"v1", vec![], "doc", "alice").await.unwrap();
        dag.add_node(b"edit-a", vec![genesis], "doc", "alice")
            .await
            .unwrap();
        dag.add_node(b"edit-b", vec![genesis], "doc", "bob")
            .await
            .unwrap();

        let merge = dag
            .resolve_conflict("doc", b"merged", "alice")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(dag.get_heads("doc"), vec![merge]);
        assert!(dag.get_node(&merge).unwrap().is_merge());
        assert!(dag.detect_conflicts("doc").is_none());
    }

    #[tokio::test]
    async fn test_resolve_without_fork_is_none() {
        let dag = engine();
        let genesis = dag.add_node(b"v1", vec![], "doc", "alice").await.unwrap();

        let resolved = dag.resolve_conflict("doc", b"merged", "alice").await.unwrap();

        assert!(resolved.is_none());
        assert_eq!(dag.get_heads("doc"), vec![genesis]);
    }

    #[tokio::test]
    async fn test_disjoint_genesis_fork_unresolvable() {
        let dag = engine();
        // Two independent genesis nodes for the same document.
        let a = dag.add_node(b"origin-a", vec![], "doc", "alice").await.unwrap();
        let b = dag.add_node(b"origin-b", vec![], "doc", "bob").await.unwrap();

        let conflict = dag.detect_conflicts("doc").unwrap();
        assert_eq!(conflict.common_ancestor, None);
        assert!(!conflict.resolvable);
        assert_eq!(dag.find_common_ancestor(&a, &b), None);
    }

    #[tokio::test]
    async fn test_common_ancestor_symmetric() {
        let dag = engine();
        let genesis = dag.add_node(b"v1", vec![], "doc", "alice").await.unwrap();
        let a = dag
            .add_node(b"edit-a", vec![genesis], "doc", "alice")
            .await
            .unwrap();
        let b = dag
            .add_node(b"edit-b", vec![genesis], "doc", "bob")
            .await
            .unwrap();

        assert_eq!(
            dag.find_common_ancestor(&a, &b),
            dag.find_common_ancestor(&b, &a)
        );
        assert_eq!(dag.find_common_ancestor(&a, &b), Some(genesis));
    }

    #[tokio::test]
    async fn test_ancestor_of_other_is_common_ancestor() {
        let dag = engine();
        let genesis = dag.add_node(b"v1", vec![], "doc", "alice").await.unwrap();
        let child = dag
            .add_node(b"v2", vec![genesis], "doc", "alice")
            .await
            .unwrap();

        assert_eq!(dag.find_common_ancestor(&genesis, &child), Some(genesis));
        assert_eq!(dag.find_common_ancestor(&child, &genesis), Some(genesis));
    }

    #[tokio::test]
    async fn test_duplicate_admission_idempotent() {
        let dag = engine();
        let first = dag.add_node(b"v1", vec![], "doc", "alice").await.unwrap();
        let second = dag.add_node(b"v1", vec![], "doc", "alice").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(dag.node_count(), 1);
        assert_eq!(dag.get_heads("doc"), vec![first]);
    }

    #[tokio::test]
    async fn test_verify_integrity_and_tamper() {
        let store = Arc::new(MemoryStore::new());
        let dag = DagEngine::new(store.clone());
        let cid = dag.add_node(b"v1", vec![], "doc", "alice").await.unwrap();

        assert!(dag.verify_integrity(&cid).await);

        // Corrupt the payload bytes out-of-band.
        let payload_ref = dag.get_node(&cid).unwrap().payload_ref;
        assert!(store.corrupt(&payload_ref, b"tampered".to_vec()));

        assert!(!dag.verify_integrity(&cid).await);
    }

    #[tokio::test]
    async fn test_verify_chain() {
        let store = Arc::new(MemoryStore::new());
        let dag = DagEngine::new(store.clone());
        let genesis = dag.add_node(b"v1", vec![], "doc", "alice").await.unwrap();
        let mid = dag
            .add_node(b"v2", vec![genesis], "doc", "alice")
            .await
            .unwrap();
        let head = dag.add_node(b"v3", vec![mid], "doc", "alice").await.unwrap();

        assert!(dag.verify_chain(&head).await);

        // Corrupting an ancestor's payload breaks the whole chain.
        let payload_ref = dag.get_node(&genesis).unwrap().payload_ref;
        store.corrupt(&payload_ref, b"tampered".to_vec());

        assert!(!dag.verify_chain(&head).await);
        assert!(dag.verify_integrity(&head).await);
    }

    #[tokio::test]
    async fn test_inclusion_proof_endpoints() {
        let dag = engine();
        let genesis = dag.add_node(b"v1", vec![], "doc", "alice").await.unwrap();
        let mid = dag
            .add_node(b"v2", vec![genesis], "doc", "alice")
            .await
            .unwrap();
        let head = dag.add_node(b"v3", vec![mid], "doc", "alice").await.unwrap();

        let proof = dag.generate_inclusion_proof(&genesis, &head).unwrap();
        assert_eq!(proof.target(), Some(&genesis));
        assert_eq!(proof.root(), Some(&head));
        assert_eq!(proof.path, vec![genesis, mid, head]);
        assert_eq!(proof.depth(), 2);
    }

    #[tokio::test]
    async fn test_inclusion_proof_unrelated() {
        let dag = engine();
        let a = dag.add_node(b"a", vec![], "doc-a", "alice").await.unwrap();
        let b = dag.add_node(b"b", vec![], "doc-b", "bob").await.unwrap();

        assert!(dag.generate_inclusion_proof(&a, &b).is_none());
        assert!(dag.generate_inclusion_proof(&a, &a).is_none());
    }

    #[tokio::test]
    async fn test_inclusion_proof_through_merge() {
        let dag = engine();
        let genesis = dag.add_node(b"v1", vec![], "doc", "alice").await.unwrap();
        dag.add_node(b"edit-a", vec![genesis], "doc", "alice")
            .await
            .unwrap();
        dag.add_node(b"edit-b", vec![genesis], "doc", "bob")
            .await
            .unwrap();
        let merge = dag
            .resolve_conflict("doc", b"merged", "alice")
            .await
            .unwrap()
            .unwrap();

        let proof = dag.generate_inclusion_proof(&genesis, &merge).unwrap();
        assert_eq!(proof.target(), Some(&genesis));
        assert_eq!(proof.root(), Some(&merge));
        assert_eq!(proof.path.len(), 3);
    }

    #[tokio::test]
    async fn test_payloads_are_pinned() {
        let store = Arc::new(MemoryStore::new());
        let dag = DagEngine::new(store.clone());
        let cid = dag.add_node(b"v1", vec![], "doc", "alice").await.unwrap();

        assert!(store.sweep_unpinned().await.is_empty());
        let payload_ref = dag.get_node(&cid).unwrap().payload_ref;
        assert!(store.has(&payload_ref).await);
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let dag = engine();
        let mut events = dag.subscribe();

        let genesis = dag.add_node(b"v1", vec![], "doc", "alice").await.unwrap();
        dag.add_node(b"edit-a", vec![genesis], "doc", "alice")
            .await
            .unwrap();
        dag.add_node(b"edit-b", vec![genesis], "doc", "bob")
            .await
            .unwrap();

        let mut admitted = 0;
        let mut forks = 0;
        while let Ok(event) = events.try_recv() {
            match event {
                DagEvent::NodeAdmitted { .. } => admitted += 1,
                DagEvent::ForkDetected { heads, .. } => {
                    forks += 1;
                    assert_eq!(heads.len(), 2);
                }
                DagEvent::ForkResolved { .. } => {}
            }
        }
        assert_eq!(admitted, 3);
        assert_eq!(forks, 1);
    }

    #[tokio::test]
    async fn test_concurrent_admissions_keep_frontier_consistent() {
        let dag = Arc::new(engine());
        let genesis = dag.add_node(b"v1", vec![], "doc", "alice").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8u8 {
            let dag = dag.clone();
            handles.push(tokio::spawn(async move {
                dag.add_node(&[i], vec![genesis], "doc", "writer").await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // All eight concurrent edits must appear in the frontier.
        assert_eq!(dag.get_heads("doc").len(), 8);
        assert_eq!(dag.node_count(), 9);
    }
}
