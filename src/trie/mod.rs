//! Concurrent term trie.
//!
//! A trie maps structured keys (terms, compared up to variable renaming) to
//! values. Keys are linearized into a token sequence by [`encode`] and stored
//! as paths of [`node::Node`]s, so keys with a common prefix share nodes.
//!
//! # Concurrency
//!
//! Any number of threads may look up, insert, delete and enumerate at the
//! same time. Child sets change only through compare-and-swap (see
//! [`children`]); values are guarded by a per-node lock. Pruning first seals
//! a childless node with a tombstone so a racing insert cannot attach a child
//! to a node that is about to be unlinked; an insert that meets a tombstone
//! restarts its walk from the root.
//!
//! # Lifetime
//!
//! [`TrieHandle`] is the public face of a trie. Operations briefly acquire a
//! reference count for their duration; destroying a trie only marks it, and
//! the last reference to leave empties it.

mod children;
mod decode;
mod encode;
mod enumerate;
mod handle;
mod key;
mod node;
mod stats;
mod value;


use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use bitflags::bitflags;
use tracing::{debug, trace, warn};

use crate::config::TrieConfig;
use crate::errors::TrieResult;
use crate::indirect::{IndirectId, IndirectTable, IndirectValue};
use crate::symbol::{AtomTable, Symbol};
use crate::term::{Addr, Heap, Term};

use self::children::Children;
use self::encode::{Encoded, KeyEncoder};
use self::key::Key;
use self::node::{Node, Parent};
use self::stats::Counters;
use self::value::{RecordStore, Value};

pub use self::enumerate::{EnumState, Enumerator, TrieEntry};
pub use self::handle::{InsertMode, InsertOutcome, NodeHandle, TrieHandle};
pub use self::key::{is_inline_int, INLINE_INT_BITS};
pub use self::node::AllocationPool;
pub use self::stats::{TrieCounters, TrieStatistics};

const TRIE_MAGIC: u32 = 0x4bcb_cf87;
const TRIE_CLEARED: u32 = 0x4bcb_cf88;

bitflags! {
    /// Usage flags of a trie
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TrieFlags: u32 {
        /// Used as a set (values are the constant `true`)
        const SET = 0x0001;
        /// Used as a map
        const MAP = 0x0002;
        /// Shared between threads of a tabling engine
        const SHARED = 0x0004;
        /// Marked complete by the owner; no further insertions expected
        const COMPLETE = 0x0008;
    }
}

/// Outcome of a step that can lose a race with pruning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step<T> {
    Done(T),
    /// A node on the path was sealed; restart from the root
    Retry,
}

enum Walk {
    Found(Arc<Node>),
    Missing,
    Retry,
}

/// The trie proper, shared behind [`TrieHandle`]s
pub(crate) struct Trie {
    magic: AtomicU32,
    references: AtomicUsize,
    node_count: AtomicUsize,
    value_count: AtomicUsize,
    flags: AtomicU32,
    pub(crate) root: Arc<Node>,
    pub(crate) atoms: AtomTable,
    indirects: ArcSwapOption<IndirectTable>,
    pub(crate) records: RecordStore,
    pool: Option<Arc<AllocationPool>>,
    pub(crate) config: TrieConfig,
    counters: Counters,
}

impl std::fmt::Debug for Trie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trie")
            .field("live", &self.is_live())
            .field("references", &self.references.load(Ordering::Relaxed))
            .field("nodes", &self.node_count())
            .field("values", &self.value_count())
            .field("flags", &self.flags())
            .finish()
    }
}

impl Trie {
    pub(crate) fn new(config: TrieConfig, pool: Option<Arc<AllocationPool>>) -> Self {
        let pool = pool.or_else(|| config.table_space.map(|bytes| Arc::new(AllocationPool::new(bytes))));
        let flags = if config.shared {
            TrieFlags::SHARED
        } else {
            TrieFlags::empty()
        };
        Trie {
            magic: AtomicU32::new(TRIE_MAGIC),
            references: AtomicUsize::new(0),
            node_count: AtomicUsize::new(0),
            value_count: AtomicUsize::new(0),
            flags: AtomicU32::new(flags.bits()),
            root: Node::root(),
            atoms: AtomTable::new(),
            indirects: ArcSwapOption::empty(),
            records: RecordStore::new(),
            pool,
            config,
            counters: Counters::default(),
        }
    }

    // ========================================================================
    // Lifetime
    // ========================================================================

    #[inline]
    pub(crate) fn is_live(&self) -> bool {
        self.magic.load(Ordering::SeqCst) == TRIE_MAGIC
    }

    pub(crate) fn acquire(&self) {
        self.references.fetch_add(1, Ordering::SeqCst);
    }

    /// Drop one reference; the last one out empties a destroyed trie
    pub(crate) fn release(&self) {
        if self.references.fetch_sub(1, Ordering::SeqCst) == 1 && !self.is_live() {
            self.empty();
        }
    }

    /// Mark the trie destroyed and empty it once nobody is inside
    pub(crate) fn destroy(&self) {
        if self.magic.swap(TRIE_CLEARED, Ordering::SeqCst) == TRIE_MAGIC {
            debug!(target: "termtrie::trie", nodes = self.node_count(), "trie destroyed");
        }
        self.empty();
    }

    fn empty(&self) {
        // Pairs with the SeqCst acquire/liveness check of new operations
        if self.references.load(Ordering::SeqCst) != 0 {
            return;
        }
        debug!(target: "termtrie::trie", nodes = self.node_count(), "emptying trie");
        self.clear();
    }

    /// Free every node below the root, without recursion
    fn clear(&self) {
        let mut pending = vec![Arc::clone(&self.root)];
        while let Some(node) = pending.pop() {
            if let Some(children) = node.children.swap(None) {
                pending.extend(children.entries().into_iter().map(|(_, child)| child));
                if let Children::Hashed(table) = &*children {
                    table.clear();
                }
            }
            if Arc::ptr_eq(&node, &self.root) {
                if let Some(value) = node.value.write().take() {
                    self.value_count.fetch_sub(1, Ordering::AcqRel);
                    self.records.release(&value);
                }
            } else {
                self.free_node(&node);
            }
        }
        self.indirects.store(None);
    }

    // ========================================================================
    // Interning helpers used by the encoder and decoder
    // ========================================================================

    pub(crate) fn symbol(&self, name: &str, add: bool) -> Option<Symbol> {
        if add {
            Some(self.atoms.intern(name))
        } else {
            self.atoms.get(name)
        }
    }

    pub(crate) fn indirect_key(&self, value: &IndirectValue, add: bool) -> Option<Key> {
        let table = if add {
            self.indirect_table()
        } else {
            self.indirects.load_full()?
        };
        table.intern(value, add).map(Key::Indirect)
    }

    pub(crate) fn materialize(&self, id: IndirectId) -> Option<IndirectValue> {
        self.indirects.load().as_ref()?.materialize(id)
    }

    /// The indirect table, created on first use
    fn indirect_table(&self) -> Arc<IndirectTable> {
        loop {
            let current = self.indirects.load_full();
            if let Some(table) = current {
                return table;
            }
            let fresh = Arc::new(IndirectTable::new());
            let _ = self.indirects.compare_and_swap(&current, Some(fresh));
        }
    }

    pub(crate) fn indirect_count(&self) -> usize {
        self.indirects.load().as_ref().map_or(0, |table| table.len())
    }

    // ========================================================================
    // Paths
    // ========================================================================

    /// Walk the key in slot `key` from the root, creating nodes if `add`.
    fn walk(&self, heap: &mut Heap, key: Addr, add: bool) -> TrieResult<Walk> {
        let mut encoder = KeyEncoder::new(heap, key, add, self.config.cycle_check_interval);
        let mut node = Arc::clone(&self.root);

        loop {
            let token = match encoder.next_key(self) {
                Ok(Some(Encoded::Key(token))) => token,
                Ok(Some(Encoded::Missing)) => return Ok(Walk::Missing),
                Ok(None) => return Ok(Walk::Found(node)),
                Err(err) => {
                    if add {
                        warn!(target: "termtrie::trie", error = %err, "insert aborted, pruning partial path");
                        self.prune_error(&node);
                    }
                    return Err(err);
                }
            };
            if let Some(child) = node.child(&token) {
                node = child;
                continue;
            }
            if !add {
                return Ok(Walk::Missing);
            }
            match self.insert_child(&node, token) {
                Ok(Step::Done(child)) => node = child,
                Ok(Step::Retry) => return Ok(Walk::Retry),
                Err(err) => {
                    warn!(target: "termtrie::trie", error = %err, "insert aborted, pruning partial path");
                    self.prune_error(&node);
                    return Err(err);
                }
            }
        }
    }

    /// Node for the key in slot `key`, if the trie has a path for it
    pub(crate) fn lookup(&self, heap: &mut Heap, key: Addr) -> TrieResult<Option<Arc<Node>>> {
        self.counters.lookup();
        match self.walk(heap, key, false)? {
            Walk::Found(node) => Ok(Some(node)),
            Walk::Missing | Walk::Retry => Ok(None),
        }
    }

    /// Node for the key in slot `key`, creating the path if needed
    pub(crate) fn lookup_or_insert(&self, heap: &mut Heap, key: Addr) -> TrieResult<Arc<Node>> {
        self.counters.lookup();
        loop {
            match self.walk(heap, key, true)? {
                Walk::Found(node) => return Ok(node),
                // Adding walks never miss; both cases restart
                Walk::Missing | Walk::Retry => {
                    trace!(target: "termtrie::trie", "walk met a sealed node, restarting");
                }
            }
        }
    }

    /// Insert `value` under the key in slot `key`
    pub(crate) fn insert(
        &self,
        heap: &mut Heap,
        key: Addr,
        value: &Term,
        mode: InsertMode,
    ) -> TrieResult<(InsertOutcome, Arc<Node>)> {
        loop {
            let node = self.lookup_or_insert(heap, key)?;
            let value = self.records.intern_value(value);
            if let Step::Done(outcome) = self.set_value(&node, value, mode) {
                return Ok((outcome, node));
            }
        }
    }

    // ========================================================================
    // Values
    // ========================================================================

    /// Store `value` at `node`.
    ///
    /// Consumes the value reference: it is released again when not stored.
    pub(crate) fn set_value(&self, node: &Node, value: Value, mode: InsertMode) -> Step<InsertOutcome> {
        let mut slot = node.value.write();
        if node.is_sealed() || node.is_pruned() {
            drop(slot);
            self.records.release(&value);
            return Step::Retry;
        }
        let outcome = match slot.as_ref() {
            None => InsertOutcome::Inserted,
            Some(old) if *old == value => InsertOutcome::Unchanged,
            Some(_) if mode == InsertMode::Strict => InsertOutcome::Conflict,
            Some(_) => InsertOutcome::Updated,
        };
        match outcome {
            InsertOutcome::Inserted => {
                *slot = Some(value);
                self.value_count.fetch_add(1, Ordering::AcqRel);
            }
            InsertOutcome::Updated => {
                if let Some(old) = slot.replace(value) {
                    self.records.release(&old);
                }
            }
            InsertOutcome::Unchanged | InsertOutcome::Conflict => {
                drop(slot);
                self.records.release(&value);
            }
        }
        Step::Done(outcome)
    }

    pub(crate) fn get_value(&self, node: &Node) -> Option<Value> {
        node.value.read().clone()
    }

    /// Remove the value at `node`, pruning the dead branch if `prune`.
    ///
    /// The caller owns the returned value's record reference.
    pub(crate) fn delete_value(&self, node: &Arc<Node>, prune: bool) -> Option<Value> {
        let old = node.value.write().take()?;
        self.value_count.fetch_sub(1, Ordering::AcqRel);
        if prune {
            self.prune_node(node);
        }
        Some(old)
    }

    // ========================================================================
    // Pruning
    // ========================================================================

    /// Unlink `start` and every ancestor left without value or children
    pub(crate) fn prune_node(&self, start: &Arc<Node>) {
        let mut node = Arc::clone(start);
        let mut pruned = 0usize;
        loop {
            let Parent::Attached(parent) = node.parent() else {
                break;
            };
            if !self.seal(&node) {
                break;
            }
            self.detach(&parent, &node);
            self.free_node(&node);
            pruned += 1;
            node = parent;
        }
        if pruned > 0 {
            debug!(target: "termtrie::prune", pruned, "pruned dead branch");
        }
    }

    /// Tear down the partial path ending at `node` after a failed insert.
    ///
    /// An `Error` child makes the node look occupied to concurrent walkers
    /// while the branch is pruned from below.
    fn prune_error(&self, node: &Arc<Node>) {
        match self.insert_child(node, Key::Error) {
            Ok(Step::Done(marker)) => self.prune_node(&marker),
            _ => self.prune_node(node),
        }
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub(crate) fn node_count(&self) -> usize {
        self.node_count.load(Ordering::Acquire)
    }

    pub(crate) fn value_count(&self) -> usize {
        self.value_count.load(Ordering::Acquire)
    }

    pub(crate) fn flags(&self) -> TrieFlags {
        TrieFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    pub(crate) fn add_flags(&self, flags: TrieFlags) {
        self.flags.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    pub(crate) fn pool(&self) -> Option<&Arc<AllocationPool>> {
        self.pool.as_ref()
    }

    /// Visit every node reachable from the root, depth first.
    ///
    /// Stops early with the value of the first `Break`.
    pub(crate) fn map_nodes<R>(&self, mut visit: impl FnMut(&Node) -> ControlFlow<R>) -> Option<R> {
        let mut pending = vec![Arc::clone(&self.root)];
        while let Some(node) = pending.pop() {
            if let ControlFlow::Break(result) = visit(&node) {
                return Some(result);
            }
            if let Some(children) = node.children.load_full() {
                pending.extend(children.entries().into_iter().map(|(_, child)| child));
            }
        }
        None
    }
}

impl Drop for Trie {
    fn drop(&mut self) {
        // Unlink iteratively so deep tries never recurse in Arc drops
        self.clear();
    }
}
