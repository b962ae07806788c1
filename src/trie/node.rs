//! Trie nodes and the node store.
//!
//! A node is owned by its parent's children representation. The parent link
//! is a `Weak` back-reference used only to rebuild keys and to walk upward
//! while pruning; ownership always flows from parent to child.
//!
//! Allocation charges the trie's [`AllocationPool`] (when configured) and
//! bumps the live node count; [`Trie::free_node`] reverses both. Physical
//! memory is reclaimed by `Arc` once the last reader lets go, so a node that
//! was detached while another thread still looked at it stays valid for that
//! thread.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;
use bitflags::bitflags;
use parking_lot::RwLock;
use tracing::trace;

use super::children::Children;
use super::key::Key;
use super::value::Value;
use super::Trie;
use crate::errors::{Resource, TrieError, TrieResult};

/// Bytes charged against an allocation pool per node
pub(crate) const NODE_SIZE: usize = std::mem::size_of::<Node>();

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct NodeFlags: u32 {
        /// Node was freed: detached by pruning or by emptying the trie
        const PRUNED = 0x0001;
    }
}

/// Where a node hangs in the trie
pub(crate) enum Parent {
    Root,
    Attached(Arc<Node>),
    /// The parent is gone; this node is no longer reachable
    Detached,
}

/// One trie vertex
pub(crate) struct Node {
    /// Edge label from the parent (meaningless for the root)
    pub(crate) key: Key,
    pub(crate) value: RwLock<Option<Value>>,
    parent: Option<Weak<Node>>,
    /// `None` means no children
    pub(crate) children: ArcSwapOption<Children>,
    flags: AtomicU32,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("key", &self.key)
            .field("has_value", &self.value.read().is_some())
            .field("flags", &self.flags())
            .finish()
    }
}

impl Node {
    pub(crate) fn root() -> Arc<Node> {
        Arc::new(Node {
            key: Key::Error,
            value: RwLock::new(None),
            parent: None,
            children: ArcSwapOption::empty(),
            flags: AtomicU32::new(0),
        })
    }

    fn new(key: Key, parent: &Arc<Node>) -> Arc<Node> {
        Arc::new(Node {
            key,
            value: RwLock::new(None),
            parent: Some(Arc::downgrade(parent)),
            children: ArcSwapOption::empty(),
            flags: AtomicU32::new(0),
        })
    }

    pub(crate) fn parent(&self) -> Parent {
        match &self.parent {
            None => Parent::Root,
            Some(weak) => weak.upgrade().map_or(Parent::Detached, Parent::Attached),
        }
    }

    #[inline]
    pub(crate) fn flags(&self) -> NodeFlags {
        NodeFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn is_pruned(&self) -> bool {
        self.flags().contains(NodeFlags::PRUNED)
    }

    /// Set PRUNED; false if it was already set
    fn mark_pruned(&self) -> bool {
        let old = self
            .flags
            .fetch_or(NodeFlags::PRUNED.bits(), Ordering::AcqRel);
        old & NodeFlags::PRUNED.bits() == 0
    }

    #[inline]
    pub(crate) fn has_value(&self) -> bool {
        self.value.read().is_some()
    }
}

/// Byte budget shared by the nodes of one or more tries
#[derive(Debug)]
pub struct AllocationPool {
    used: AtomicUsize,
    limit: usize,
}

impl AllocationPool {
    pub fn new(limit: usize) -> Self {
        AllocationPool {
            used: AtomicUsize::new(0),
            limit,
        }
    }

    /// Bytes currently charged
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Charge `bytes`, failing without side effects if over the limit
    fn charge(&self, bytes: usize) -> bool {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|total| *total <= self.limit)
            })
            .is_ok()
    }

    fn refund(&self, bytes: usize) {
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(bytes))
            });
    }
}

impl Trie {
    /// Create a node labelled `key` below `parent`. The node is not yet
    /// published in `parent`'s children.
    pub(crate) fn allocate_node(&self, key: Key, parent: &Arc<Node>) -> TrieResult<Arc<Node>> {
        if let Some(pool) = &self.pool {
            if !pool.charge(NODE_SIZE) {
                return Err(TrieError::ResourceExhausted(Resource::TableSpace));
            }
        }
        if let Some(symbol) = key.symbol() {
            self.atoms.acquire(symbol);
        }
        self.node_count.fetch_add(1, Ordering::AcqRel);
        trace!(target: "termtrie::trie", ?key, "allocate node");
        Ok(Node::new(key, parent))
    }

    /// Return a detached (or never published) node to the store.
    ///
    /// Releases its key and any value. Freeing twice is a no-op.
    pub(crate) fn free_node(&self, node: &Node) {
        if !node.mark_pruned() {
            return;
        }
        if let Some(value) = node.value.write().take() {
            self.value_count.fetch_sub(1, Ordering::AcqRel);
            self.records.release(&value);
        }
        if let Some(symbol) = node.key.symbol() {
            self.atoms.release(symbol);
        }
        if let Some(pool) = &self.pool {
            pool.refund(NODE_SIZE);
        }
        self.node_count.fetch_sub(1, Ordering::AcqRel);
    }
}
