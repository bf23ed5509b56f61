#![forbid(unsafe_code)]

//! Ordered registry of live candidates.
//!
//! Nodes are kept in kill order: the highest priority value first, and
//! registration order within a tier. Every operation takes the index lock
//! once for O(log n) work and releases it before returning, so a scan never
//! holds the lock across steps. A node removed between two `next` calls is
//! simply not returned.

use crate::domain::{CandidateId, CandidateRecord, Priority};
use crate::error::Error;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct NodeKey {
    rank: Reverse<Priority>,
    seq: u64,
}

/// A position in the index, handed out by traversal.
#[derive(Debug, Clone)]
pub struct IndexNode {
    key: NodeKey,
    record: Arc<CandidateRecord>,
}

impl IndexNode {
    pub fn record(&self) -> &CandidateRecord {
        &self.record
    }

    pub fn id(&self) -> CandidateId {
        self.record.id
    }

    pub fn priority(&self) -> Priority {
        self.record.priority
    }
}

#[derive(Debug, Default)]
struct Tree {
    nodes: BTreeMap<NodeKey, Arc<CandidateRecord>>,
    by_id: FxHashMap<CandidateId, NodeKey>,
    next_seq: u64,
}

#[derive(Debug, Default)]
pub struct PriorityIndex {
    tree: Mutex<Tree>,
}

impl PriorityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a candidate under its current priority.
    pub fn insert(&self, record: CandidateRecord) -> Result<(), Error> {
        let mut tree = self.tree.lock();
        if tree.by_id.contains_key(&record.id) {
            return Err(Error::AlreadyRegistered(record.id));
        }
        let key = NodeKey {
            rank: Reverse(record.priority),
            seq: tree.next_seq,
        };
        tree.next_seq += 1;
        tree.by_id.insert(record.id, key);
        tree.nodes.insert(key, Arc::new(record));
        Ok(())
    }

    /// Drop a registration, returning the record it held.
    pub fn remove(&self, id: CandidateId) -> Result<CandidateRecord, Error> {
        let mut tree = self.tree.lock();
        let key = tree.by_id.remove(&id).ok_or(Error::NotRegistered(id))?;
        let record = tree
            .nodes
            .remove(&key)
            .ok_or(Error::NotRegistered(id))?;
        Ok(Arc::unwrap_or_clone(record))
    }

    /// The most killable candidate.
    pub fn first(&self) -> Option<IndexNode> {
        let tree = self.tree.lock();
        tree.nodes.first_key_value().map(Self::node)
    }

    /// The least killable candidate; the inclusive end of a scan.
    pub fn last(&self) -> Option<IndexNode> {
        let tree = self.tree.lock();
        tree.nodes.last_key_value().map(Self::node)
    }

    /// The node following `node` in kill order, whether or not `node` is
    /// still registered.
    pub fn next(&self, node: &IndexNode) -> Option<IndexNode> {
        let tree = self.tree.lock();
        tree.nodes
            .range((Bound::Excluded(node.key), Bound::Unbounded))
            .next()
            .map(Self::node)
    }

    /// Walk the index from [`first`](Self::first) to the end, one short
    /// lock per step.
    pub fn scan(&self) -> Scan<'_> {
        Scan {
            index: self,
            next: self.first(),
        }
    }

    pub fn contains(&self, id: CandidateId) -> bool {
        self.tree.lock().by_id.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.tree.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every record in kill order.
    pub fn snapshot(&self) -> Vec<CandidateRecord> {
        let tree = self.tree.lock();
        tree.nodes.values().map(|r| CandidateRecord::clone(r)).collect()
    }

    fn node((key, record): (&NodeKey, &Arc<CandidateRecord>)) -> IndexNode {
        IndexNode {
            key: *key,
            record: Arc::clone(record),
        }
    }
}

/// Cursor returned by [`PriorityIndex::scan`].
pub struct Scan<'a> {
    index: &'a PriorityIndex,
    next: Option<IndexNode>,
}

impl Iterator for Scan<'_> {
    type Item = IndexNode;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        self.next = self.index.next(&current);
        Some(current)
    }
}
