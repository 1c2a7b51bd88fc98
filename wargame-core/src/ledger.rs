//! The scenario ledger: an append-only, branching tree of world states.
//!
//! Nodes live in an arena keyed by their full content hash. Each node names
//! its parent by hash; the ledger additionally indexes children so branches
//! can be enumerated without scanning. The ledger never tracks a "current"
//! node. That pointer belongs to the session.

use crate::hash::{hash_snapshot, ContentHash};
use crate::state::StateSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("No node with hash {0}")]
    NotFound(ContentHash),

    #[error("Node {0} is a root and has no parent")]
    AtRoot(ContentHash),

    #[error("Stored hash {stored} does not match content hash {computed}")]
    HashMismatch {
        stored: ContentHash,
        computed: ContentHash,
    },

    #[error("Node {node} names unknown parent {parent}")]
    DanglingParent {
        node: ContentHash,
        parent: ContentHash,
    },

    #[error("Parent links through {0} form a cycle")]
    Cycle(ContentHash),

    #[error("Snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LedgerError {
    /// Whether this is the recoverable "no such node" outcome of a lookup or
    /// rollback, as opposed to a malformed snapshot or corrupt store.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::NotFound(_) | LedgerError::AtRoot(_))
    }
}

/// One committed world state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerNode {
    hash: ContentHash,
    parent: Option<ContentHash>,
    snapshot: StateSnapshot,
}

impl LedgerNode {
    fn new(snapshot: StateSnapshot, parent: Option<ContentHash>) -> Result<Self, LedgerError> {
        let hash = hash_snapshot(&snapshot)?;
        Ok(Self {
            hash,
            parent,
            snapshot,
        })
    }

    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    pub fn short_hash(&self) -> String {
        self.hash.short()
    }

    pub fn parent_hash(&self) -> Option<ContentHash> {
        self.parent
    }

    pub fn snapshot(&self) -> &StateSnapshot {
        &self.snapshot
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Recompute the digest and check it against the stored one.
    pub fn verify(&self) -> Result<(), LedgerError> {
        let computed = hash_snapshot(&self.snapshot)?;
        if computed != self.hash {
            return Err(LedgerError::HashMismatch {
                stored: self.hash,
                computed,
            });
        }
        Ok(())
    }
}

/// Hash-addressed store of every snapshot a session has produced.
#[derive(Debug, Default)]
pub struct Ledger {
    nodes: HashMap<ContentHash, Arc<LedgerNode>>,
    children: HashMap<ContentHash, Vec<ContentHash>>,
    /// Commit order, for stable iteration and persistence.
    order: Vec<ContentHash>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from stored nodes.
    ///
    /// Every digest is recomputed; stored hashes are never trusted. Parents
    /// may appear in any order relative to their children but must exist,
    /// and following parent links from any node must end at a root.
    pub fn from_nodes(nodes: impl IntoIterator<Item = LedgerNode>) -> Result<Self, LedgerError> {
        let mut ledger = Self::new();
        for node in nodes {
            node.verify()?;
            if ledger.nodes.contains_key(&node.hash) {
                continue;
            }
            ledger.order.push(node.hash);
            ledger.nodes.insert(node.hash, Arc::new(node));
        }

        for hash in &ledger.order {
            let node = &ledger.nodes[hash];
            if let Some(parent) = node.parent {
                if !ledger.nodes.contains_key(&parent) {
                    return Err(LedgerError::DanglingParent {
                        node: node.hash,
                        parent,
                    });
                }
                ledger.children.entry(parent).or_default().push(node.hash);
            }
        }

        // The digest covers only the snapshot, so stored parent links can loop
        let mut rooted = HashSet::new();
        for hash in &ledger.order {
            let mut chain = HashSet::new();
            let mut cursor = Some(*hash);
            while let Some(h) = cursor {
                if rooted.contains(&h) {
                    break;
                }
                if !chain.insert(h) {
                    return Err(LedgerError::Cycle(h));
                }
                cursor = ledger.nodes.get(&h).and_then(|node| node.parent);
            }
            rooted.extend(chain);
        }

        Ok(ledger)
    }

    /// Store a snapshot with no parent.
    pub fn commit_root(&mut self, snapshot: StateSnapshot) -> Result<Arc<LedgerNode>, LedgerError> {
        let node = LedgerNode::new(snapshot, None)?;
        Ok(self.insert(node))
    }

    /// Store a snapshot as a child of `parent`.
    ///
    /// Committing content that is already stored returns the stored node, so
    /// repeated commits of the same `(parent, snapshot)` share one identity.
    pub fn commit_child(
        &mut self,
        parent: &LedgerNode,
        snapshot: StateSnapshot,
    ) -> Result<Arc<LedgerNode>, LedgerError> {
        if !self.nodes.contains_key(&parent.hash) {
            return Err(LedgerError::NotFound(parent.hash));
        }
        let node = LedgerNode::new(snapshot, Some(parent.hash))?;
        Ok(self.insert(node))
    }

    fn insert(&mut self, node: LedgerNode) -> Arc<LedgerNode> {
        if let Some(existing) = self.nodes.get(&node.hash) {
            debug!(hash = %node.hash.short(), "content already committed");
            return Arc::clone(existing);
        }

        let hash = node.hash;
        if let Some(parent) = node.parent {
            self.children.entry(parent).or_default().push(hash);
        }
        let node = Arc::new(node);
        self.nodes.insert(hash, Arc::clone(&node));
        self.order.push(hash);

        info!(
            hash = %hash.short(),
            parent = %node.parent.map(|p| p.short()).unwrap_or_else(|| "-".to_string()),
            canon = node.snapshot.canon.len(),
            "committed ledger node"
        );
        node
    }

    /// Exact-match lookup by full digest.
    pub fn find_by_hash(&self, hash: &ContentHash) -> Option<Arc<LedgerNode>> {
        self.nodes.get(hash).cloned()
    }

    /// Like [`Ledger::find_by_hash`], reporting a miss as [`LedgerError::NotFound`].
    pub fn get(&self, hash: &ContentHash) -> Result<Arc<LedgerNode>, LedgerError> {
        self.find_by_hash(hash).ok_or(LedgerError::NotFound(*hash))
    }

    /// Resolve a rollback target.
    ///
    /// With a target, any stored node qualifies (not only ancestors of
    /// `from`), which is how sibling branches are revisited. Without one,
    /// the parent of `from`.
    pub fn rollback(
        &self,
        from: &LedgerNode,
        target: Option<&ContentHash>,
    ) -> Result<Arc<LedgerNode>, LedgerError> {
        match target {
            Some(hash) => self.get(hash),
            None => {
                let parent = from.parent.ok_or(LedgerError::AtRoot(from.hash))?;
                self.get(&parent)
            }
        }
    }

    /// Children of `hash`, in commit order.
    pub fn children(&self, hash: &ContentHash) -> Vec<Arc<LedgerNode>> {
        self.children
            .get(hash)
            .map(|kids| kids.iter().filter_map(|h| self.find_by_hash(h)).collect())
            .unwrap_or_default()
    }

    /// The path from the root down to `hash`, inclusive.
    pub fn ancestry(&self, hash: &ContentHash) -> Result<Vec<Arc<LedgerNode>>, LedgerError> {
        let mut path = Vec::new();
        let mut cursor = Some(*hash);
        while let Some(h) = cursor {
            if path.len() > self.nodes.len() {
                return Err(LedgerError::Cycle(h));
            }
            let node = self.get(&h)?;
            cursor = node.parent;
            path.push(node);
        }
        path.reverse();
        Ok(path)
    }

    /// Nodes without a parent, in commit order.
    pub fn roots(&self) -> Vec<Arc<LedgerNode>> {
        self.nodes().filter(|node| node.is_root()).collect()
    }

    /// Every node, in commit order.
    pub fn nodes(&self) -> impl Iterator<Item = Arc<LedgerNode>> + '_ {
        self.order.iter().filter_map(|h| self.find_by_hash(h))
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.nodes.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
