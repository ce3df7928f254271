//! Operation buffers and the bounded history log.
//!
//! The sync manager keeps three ordered collections around the document:
//! the local pending buffer (optimistically applied, not yet acknowledged
//! by every peer), the remote staging buffer (recently delivered, kept
//! for idempotent replay), and a bounded history window of everything
//! applied. All three are interior-locked so the transport and editor
//! threads can poke at them directly.

use std::collections::HashSet;
use std::sync::RwLock;

use crate::op::Operation;

/// Thread-safe, insertion-ordered sequence of operations.
#[derive(Debug, Default)]
pub struct OperationBuffer {
    ops: RwLock<Vec<Operation>>,
}

impl OperationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one operation.
    pub fn push(&self, op: Operation) {
        self.ops.write().unwrap().push(op);
    }

    /// Copy of the current contents, in insertion order.
    pub fn snapshot(&self) -> Vec<Operation> {
        self.ops.read().unwrap().clone()
    }

    /// Ids of the current contents.
    pub fn ids(&self) -> HashSet<String> {
        self.ops
            .read()
            .unwrap()
            .iter()
            .map(|op| op.op_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ops.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.read().unwrap().is_empty()
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.ops.write().unwrap().clear();
    }

    /// Swap in a whole new sequence (used after a transform pass rewrites
    /// the pending operations).
    pub fn replace(&self, ops: Vec<Operation>) {
        *self.ops.write().unwrap() = ops;
    }

    /// Remove every entry whose id is in `ids`.
    pub fn retain_not_in(&self, ids: &HashSet<String>) {
        self.ops
            .write()
            .unwrap()
            .retain(|op| !ids.contains(&op.op_id));
    }
}

/// Bounded log of applied operations.
///
/// On overflow the oldest half is dropped in one go, so the window
/// shrinks rarely instead of on every append.
#[derive(Debug)]
pub struct HistoryLog {
    ops: RwLock<Vec<Operation>>,
    capacity: usize,
}

/// Default retention window.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

impl HistoryLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            ops: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Append one applied operation, evicting the oldest half first if
    /// the window is full.
    pub fn record(&self, op: Operation) {
        let mut ops = self.ops.write().unwrap();
        if ops.len() >= self.capacity {
            let evict = ops.len() / 2;
            ops.drain(..evict);
        }
        ops.push(op);
    }

    /// Copy of the retained window, oldest first.
    pub fn snapshot(&self) -> Vec<Operation> {
        self.ops.read().unwrap().clone()
    }

    /// Ids still inside the retention window.
    pub fn ids(&self) -> HashSet<String> {
        self.ops
            .read()
            .unwrap()
            .iter()
            .map(|op| op.op_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ops.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.read().unwrap().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.ops.write().unwrap().clear();
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
