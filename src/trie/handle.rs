//! Public handles to tries and trie nodes.
//!
//! A [`TrieHandle`] is a cheap, cloneable reference to one trie. Every
//! operation takes a scoped reference count ([`TrieRef`]) for its duration,
//! which keeps a concurrently destroyed trie intact until the operation ends.
//!
//! A [`NodeHandle`] names a single node, typically the leaf of a stored key.
//! It stays memory-safe after the node is pruned; operations on it then report
//! [`TrieError::NotFound`].

use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::debug;

use super::decode::unify_keys;
use super::enumerate::Enumerator;
use super::key::Key;
use super::node::{AllocationPool, Node, Parent};
use super::stats::{TrieCounters, TrieStatistics};
use super::{Step, Trie, TrieFlags};
use crate::config::TrieConfig;
use crate::errors::{TrieError, TrieResult};
use crate::term::{Addr, Heap, Term};

/// How an insert treats a key that already holds a different value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertMode {
    /// Report [`InsertOutcome::Conflict`]
    #[default]
    Strict,
    /// Replace the old value
    Update,
}

/// What an insert did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InsertOutcome {
    /// The key had no value
    Inserted,
    /// The key's value was replaced
    Updated,
    /// The key already held an equal value
    Unchanged,
    /// The key holds a different value and the insert was strict
    Conflict,
}

/// Scoped reference count on a live trie
pub(crate) struct TrieRef {
    trie: Arc<Trie>,
}

impl TrieRef {
    pub(crate) fn acquire(trie: &Arc<Trie>) -> TrieResult<Self> {
        trie.acquire();
        let access = TrieRef {
            trie: Arc::clone(trie),
        };
        if access.trie.is_live() {
            Ok(access)
        } else {
            Err(TrieError::InvalidHandle)
        }
    }

    pub(crate) fn arc(&self) -> &Arc<Trie> {
        &self.trie
    }
}

impl Clone for TrieRef {
    fn clone(&self) -> Self {
        self.trie.acquire();
        TrieRef {
            trie: Arc::clone(&self.trie),
        }
    }
}

impl Drop for TrieRef {
    fn drop(&mut self) {
        self.trie.release();
    }
}

impl Deref for TrieRef {
    type Target = Trie;

    fn deref(&self) -> &Trie {
        &self.trie
    }
}

/// Handle to a trie
#[derive(Clone)]
pub struct TrieHandle {
    trie: Arc<Trie>,
}

impl std::fmt::Debug for TrieHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TrieHandle").field(&*self.trie).finish()
    }
}

impl PartialEq for TrieHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.trie, &other.trie)
    }
}

impl Eq for TrieHandle {}

impl Default for TrieHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl TrieHandle {
    /// New empty trie with the default configuration
    pub fn new() -> Self {
        TrieHandle {
            trie: Arc::new(Trie::new(TrieConfig::default(), None)),
        }
    }

    pub fn with_config(config: TrieConfig) -> TrieResult<Self> {
        config.validate()?;
        Ok(TrieHandle {
            trie: Arc::new(Trie::new(config, None)),
        })
    }

    /// New trie charging its nodes to a (possibly shared) pool
    pub fn with_pool(config: TrieConfig, pool: Arc<AllocationPool>) -> TrieResult<Self> {
        config.validate()?;
        Ok(TrieHandle {
            trie: Arc::new(Trie::new(config, Some(pool))),
        })
    }

    fn access(&self) -> TrieResult<TrieRef> {
        TrieRef::acquire(&self.trie)
    }

    fn node_handle(&self, node: Arc<Node>) -> NodeHandle {
        NodeHandle {
            trie: Arc::clone(&self.trie),
            node,
        }
    }

    /// Check that `node` belongs to this trie
    fn owns<'n>(&self, node: &'n NodeHandle) -> TrieResult<&'n Arc<Node>> {
        if Arc::ptr_eq(&self.trie, &node.trie) {
            Ok(&node.node)
        } else {
            Err(TrieError::InvalidHandle)
        }
    }

    /// True until the trie is destroyed
    pub fn is_valid(&self) -> bool {
        self.trie.is_live()
    }

    /// Destroy the trie.
    ///
    /// Later operations through any handle fail with
    /// [`TrieError::InvalidHandle`]. The content is freed as soon as no
    /// operation or enumeration is using the trie.
    pub fn destroy(&self) {
        self.trie.destroy();
    }

    // ========================================================================
    // Keyed operations on heap terms
    // ========================================================================

    /// Store `value` under the term in slot `key` of `heap`.
    ///
    /// The heap is left exactly as it was. A strict insert over a different
    /// value reports [`InsertOutcome::Conflict`] and changes nothing.
    pub fn insert(&self, heap: &mut Heap, key: Addr, value: &Term, mode: InsertMode) -> TrieResult<InsertOutcome> {
        self.insert_with_node(heap, key, value, mode).map(|(outcome, _)| outcome)
    }

    /// Like [`insert`](Self::insert), also returning the key's node
    pub fn insert_with_node(
        &self,
        heap: &mut Heap,
        key: Addr,
        value: &Term,
        mode: InsertMode,
    ) -> TrieResult<(InsertOutcome, NodeHandle)> {
        let trie = self.access()?;
        trie.add_flags(TrieFlags::MAP);
        let (outcome, node) = trie.insert(heap, key, value, mode)?;
        Ok((outcome, self.node_handle(node)))
    }

    /// Add the key to a set-style trie (the stored value is `true`)
    pub fn insert_key(&self, heap: &mut Heap, key: Addr) -> TrieResult<InsertOutcome> {
        let trie = self.access()?;
        trie.add_flags(TrieFlags::SET);
        let (outcome, _) = trie.insert(heap, key, &Term::atom("true"), InsertMode::Strict)?;
        Ok(outcome)
    }

    /// Value stored under the term in slot `key`
    pub fn lookup(&self, heap: &mut Heap, key: Addr) -> TrieResult<Option<Term>> {
        let trie = self.access()?;
        let node = trie.lookup(heap, key)?;
        Ok(node.and_then(|node| trie.get_value(&node)).map(|value| value.to_term()))
    }

    /// Node of the term in slot `key`, if it holds a value
    pub fn lookup_node(&self, heap: &mut Heap, key: Addr) -> TrieResult<Option<NodeHandle>> {
        let trie = self.access()?;
        let node = trie.lookup(heap, key)?.filter(|node| node.has_value());
        Ok(node.map(|node| self.node_handle(node)))
    }

    /// Remove the key in slot `key`, returning its old value.
    ///
    /// With `prune` the nodes that served only this key are unlinked.
    pub fn delete(&self, heap: &mut Heap, key: Addr, prune: bool) -> TrieResult<Option<Term>> {
        let trie = self.access()?;
        let Some(node) = trie.lookup(heap, key)? else {
            return Ok(None);
        };
        Ok(take_value(&trie, &node, prune))
    }

    // ========================================================================
    // Keyed operations on owned terms
    // ========================================================================

    /// Copy `key` onto a scratch heap.
    ///
    /// The key is already held in memory, so its copy is not subject to
    /// `max_heap_cells`; only the initial size comes from the configuration.
    fn scratch(&self, key: &Term) -> TrieResult<(Heap, Addr)> {
        let mut heap = Heap::with_capacity(self.trie.config.heap_cells, usize::MAX);
        let addr = heap.put_term_growing(key)?;
        Ok((heap, addr))
    }

    pub fn insert_term(&self, key: &Term, value: &Term, mode: InsertMode) -> TrieResult<InsertOutcome> {
        let (mut heap, addr) = self.scratch(key)?;
        self.insert(&mut heap, addr, value, mode)
    }

    pub fn insert_term_with_node(
        &self,
        key: &Term,
        value: &Term,
        mode: InsertMode,
    ) -> TrieResult<(InsertOutcome, NodeHandle)> {
        let (mut heap, addr) = self.scratch(key)?;
        self.insert_with_node(&mut heap, addr, value, mode)
    }

    pub fn lookup_term(&self, key: &Term) -> TrieResult<Option<Term>> {
        let (mut heap, addr) = self.scratch(key)?;
        self.lookup(&mut heap, addr)
    }

    pub fn lookup_node_term(&self, key: &Term) -> TrieResult<Option<NodeHandle>> {
        let (mut heap, addr) = self.scratch(key)?;
        self.lookup_node(&mut heap, addr)
    }

    pub fn delete_term(&self, key: &Term, prune: bool) -> TrieResult<Option<Term>> {
        let (mut heap, addr) = self.scratch(key)?;
        self.delete(&mut heap, addr, prune)
    }

    // ========================================================================
    // Node operations
    // ========================================================================

    /// Store `value` at `node`, failing with [`TrieError::ValueConflict`] if
    /// it holds a different one
    pub fn set_value(&self, node: &NodeHandle, value: &Term) -> TrieResult<InsertOutcome> {
        match self.store_at(node, value, InsertMode::Strict)? {
            InsertOutcome::Conflict => Err(TrieError::ValueConflict),
            outcome => Ok(outcome),
        }
    }

    /// Store `value` at `node`, replacing any different one
    pub fn update_value(&self, node: &NodeHandle, value: &Term) -> TrieResult<InsertOutcome> {
        self.store_at(node, value, InsertMode::Update)
    }

    fn store_at(&self, node: &NodeHandle, value: &Term, mode: InsertMode) -> TrieResult<InsertOutcome> {
        let trie = self.access()?;
        let node = self.owns(node)?;
        if node.is_pruned() {
            return Err(TrieError::NotFound);
        }
        let value = trie.records.intern_value(value);
        match trie.set_value(node, value, mode) {
            Step::Done(outcome) => Ok(outcome),
            Step::Retry => Err(TrieError::NotFound),
        }
    }

    /// Remove the value at `node`, returning it
    pub fn delete_node(&self, node: &NodeHandle, prune: bool) -> TrieResult<Option<Term>> {
        let trie = self.access()?;
        let node = self.owns(node)?;
        if node.is_pruned() {
            return Err(TrieError::NotFound);
        }
        Ok(take_value(&trie, node, prune))
    }

    // ========================================================================
    // Enumeration and inspection
    // ========================================================================

    /// Enumerate all (key, value) pairs
    pub fn enumerate(&self) -> TrieResult<Enumerator> {
        let trie = self.access()?;
        trie.count_enumeration();
        Ok(Enumerator::new(trie))
    }

    /// Number of nodes below the root
    pub fn node_count(&self) -> usize {
        self.trie.node_count()
    }

    pub fn value_count(&self) -> usize {
        self.trie.value_count()
    }

    /// Scan the whole trie
    pub fn statistics(&self) -> TrieResult<TrieStatistics> {
        let trie = self.access()?;
        Ok(trie.statistics())
    }

    pub fn counters(&self) -> TrieCounters {
        self.trie.counters()
    }

    pub fn flags(&self) -> TrieFlags {
        self.trie.flags()
    }

    /// Mark the trie complete
    pub fn set_complete(&self) -> TrieResult<()> {
        let trie = self.access()?;
        trie.add_flags(TrieFlags::COMPLETE);
        Ok(())
    }

    pub fn config(&self) -> &TrieConfig {
        &self.trie.config
    }

    /// Pool charged for this trie's nodes, if any
    pub fn pool(&self) -> Option<Arc<AllocationPool>> {
        self.trie.pool().cloned()
    }

    /// Number of distinct oversized values interned by this trie
    pub fn indirect_count(&self) -> usize {
        self.trie.indirect_count()
    }
}

fn take_value(trie: &Trie, node: &Arc<Node>, prune: bool) -> Option<Term> {
    let old = trie.delete_value(node, prune)?;
    let term = old.to_term();
    trie.records.release(&old);
    Some(term)
}

/// Handle to one node of a trie
#[derive(Clone)]
pub struct NodeHandle {
    trie: Arc<Trie>,
    node: Arc<Node>,
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.id())
            .field("node", &*self.node)
            .finish()
    }
}

impl PartialEq for NodeHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for NodeHandle {}

impl Hash for NodeHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl NodeHandle {
    pub(crate) fn new(trie: Arc<Trie>, node: Arc<Node>) -> Self {
        NodeHandle { trie, node }
    }

    /// Opaque identity, stable for the node's lifetime
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.node) as usize
    }

    /// The trie this node belongs to
    pub fn trie(&self) -> TrieHandle {
        TrieHandle {
            trie: Arc::clone(&self.trie),
        }
    }

    /// Key path from the root, or `NotFound` if the node was unlinked
    fn path(&self) -> TrieResult<SmallVec<[Key; 32]>> {
        let mut keys: SmallVec<[Key; 32]> = SmallVec::new();
        let mut node = Arc::clone(&self.node);
        loop {
            if node.is_pruned() {
                return Err(TrieError::NotFound);
            }
            match node.parent() {
                Parent::Root => break,
                Parent::Attached(parent) => {
                    keys.push(node.key);
                    node = parent;
                }
                Parent::Detached => return Err(TrieError::NotFound),
            }
        }
        if !Arc::ptr_eq(&node, &self.trie.root) {
            return Err(TrieError::InvalidHandle);
        }
        keys.reverse();
        Ok(keys)
    }

    /// The key this node stands for, with variables numbered from 0
    pub fn reconstruct(&self) -> TrieResult<Term> {
        let trie = TrieRef::acquire(&self.trie)?;
        let keys = self.path()?;
        let mut heap = trie.config.new_heap();
        let target = heap
            .new_var()
            .map_err(|_| TrieError::ResourceExhausted(crate::errors::Resource::Memory))?;
        if !unify_keys(&trie, &mut heap, target, &keys)? {
            debug!(target: "termtrie::decode", "key path names a value the trie no longer holds");
            return Err(TrieError::NotFound);
        }
        Ok(heap.read_term(target))
    }

    /// Unify the term in slot `target` with this node's key.
    ///
    /// Bindings made on success stay on the heap; nothing changes on failure.
    pub fn unify(&self, heap: &mut Heap, target: Addr) -> TrieResult<bool> {
        let trie = TrieRef::acquire(&self.trie)?;
        let keys = self.path()?;
        unify_keys(&trie, heap, target, &keys)
    }

    /// Value stored at this node
    pub fn value(&self) -> Option<Term> {
        self.node.value.read().as_ref().map(|value| value.to_term())
    }

    /// True if the node's key contains no variables
    pub fn is_ground(&self) -> bool {
        let mut node = Arc::clone(&self.node);
        loop {
            if node.key.is_var() {
                return false;
            }
            match node.parent() {
                Parent::Attached(parent) => node = parent,
                Parent::Root | Parent::Detached => return true,
            }
        }
    }
}
