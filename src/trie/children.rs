//! Children representations and their lock-free transitions.
//!
//! A node's children slot moves through
//!
//! ```text
//! None -> Single -> Hashed
//!   \       \         \
//!    +-------+---------+--> Pruned   (only while childless)
//! ```
//!
//! Every transition is a compare-and-swap on the node's `ArcSwapOption`. A
//! `Hashed` table is never swapped back to `Single`; once published, entries
//! are added and removed inside the table. `Pruned` is a tombstone written by
//! the pruner before it unlinks a node, so inserters that race with pruning
//! see the tombstone and restart their walk from the root.
//!
//! The tombstone wraps the representation it replaced. A seal that loses to
//! an inserter puts that same representation back, so readers and pruners
//! working through the tombstone act on the table that is restored.

use std::sync::Arc;

use arc_swap::Guard;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::key::Key;
use super::node::Node;
use super::{Step, Trie};
use crate::errors::TrieResult;

/// Shards per hashed children table
const HASHED_SHARDS: usize = 4;
/// Initial capacity of a hashed children table
const HASHED_CAPACITY: usize = 4;

/// Children of one node
pub(crate) enum Children {
    /// Exactly one child
    Single { key: Key, child: Arc<Node> },
    /// Two or more children (or none left after removals)
    Hashed(DashMap<Key, Arc<Node>>),
    /// The node is being unlinked and accepts no new children; holds the
    /// sealed representation until the seal commits or is rolled back
    Pruned(Option<Arc<Children>>),
}

impl Children {
    fn hashed() -> DashMap<Key, Arc<Node>> {
        DashMap::with_capacity_and_shard_amount(HASHED_CAPACITY, HASHED_SHARDS)
    }

    /// Snapshot of every child, in table order
    pub(crate) fn entries(&self) -> Vec<(Key, Arc<Node>)> {
        match self {
            Children::Single { key, child } => vec![(*key, Arc::clone(child))],
            Children::Hashed(table) => table
                .iter()
                .map(|entry| (*entry.key(), Arc::clone(entry.value())))
                .collect(),
            Children::Pruned(sealed) => sealed.as_deref().map_or_else(Vec::new, Children::entries),
        }
    }

    fn is_childless(&self) -> bool {
        match self {
            Children::Single { .. } => false,
            Children::Hashed(table) => table.is_empty(),
            Children::Pruned(sealed) => sealed.as_deref().map_or(true, Children::is_childless),
        }
    }
}

/// True if both loads observed the same published representation
#[inline]
fn same(a: &Option<Arc<Children>>, b: &Option<Arc<Children>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => Arc::ptr_eq(x, y),
        _ => false,
    }
}

impl Node {
    /// Child reached over `key`, if any
    pub(crate) fn child(&self, key: &Key) -> Option<Arc<Node>> {
        let children = self.children.load();
        let mut current = children.as_deref()?;
        while let Children::Pruned(sealed) = current {
            current = sealed.as_deref()?;
        }
        match current {
            Children::Single { key: k, child } if k == key => Some(Arc::clone(child)),
            Children::Hashed(table) => table.get(key).map(|child| Arc::clone(child.value())),
            Children::Single { .. } | Children::Pruned(_) => None,
        }
    }

    pub(crate) fn has_children(&self) -> bool {
        self.children
            .load()
            .as_deref()
            .is_some_and(|children| !children.is_childless())
    }

    /// True once a pruner has tombstoned this node
    pub(crate) fn is_sealed(&self) -> bool {
        matches!(self.children.load().as_deref(), Some(Children::Pruned(_)))
    }
}

impl Trie {
    /// Child of `parent` over `key`, created if absent.
    ///
    /// `Step::Retry` means `parent` is being pruned; the caller must restart
    /// from the root.
    pub(crate) fn insert_child(&self, parent: &Arc<Node>, key: Key) -> TrieResult<Step<Arc<Node>>> {
        let fresh = self.allocate_node(key, parent)?;

        loop {
            let current: Guard<Option<Arc<Children>>> = parent.children.load();
            let replacement = match current.as_deref() {
                None => Children::Single {
                    key,
                    child: Arc::clone(&fresh),
                },
                Some(Children::Single { key: k, child }) if *k == key => {
                    let existing = Arc::clone(child);
                    self.free_node(&fresh);
                    return Ok(Step::Done(existing));
                }
                Some(Children::Single { key: k, child }) => {
                    let table = Children::hashed();
                    table.insert(*k, Arc::clone(child));
                    table.insert(key, Arc::clone(&fresh));
                    Children::Hashed(table)
                }
                Some(Children::Hashed(table)) => {
                    let winner = match table.entry(key) {
                        Entry::Occupied(entry) => Some(Arc::clone(entry.get())),
                        Entry::Vacant(entry) => {
                            entry.insert(Arc::clone(&fresh));
                            None
                        }
                    };
                    if let Some(existing) = winner {
                        self.free_node(&fresh);
                        return Ok(Step::Done(existing));
                    }
                    // A pruner may have sealed the parent after our load
                    if !same(&parent.children.load(), &current) {
                        table.remove_if(&key, |_, child| Arc::ptr_eq(child, &fresh));
                        self.free_node(&fresh);
                        return Ok(Step::Retry);
                    }
                    trace!(target: "termtrie::children", ?key, "added to hashed table");
                    return Ok(Step::Done(fresh));
                }
                Some(Children::Pruned(_)) => {
                    self.free_node(&fresh);
                    return Ok(Step::Retry);
                }
            };

            let upgrading = matches!(replacement, Children::Hashed(_));
            let previous = parent
                .children
                .compare_and_swap(&*current, Some(Arc::new(replacement)));
            if same(&previous, &current) {
                if upgrading {
                    debug!(target: "termtrie::children", ?key, "single child upgraded to hashed table");
                }
                return Ok(Step::Done(fresh));
            }
            trace!(target: "termtrie::children", ?key, "children changed underneath, reloading");
        }
    }

    /// Tombstone a childless, valueless node so no child can be added.
    ///
    /// Returns false (leaving the node untouched) if it still holds a value,
    /// has children, or lost a race to an inserter.
    pub(crate) fn seal(&self, node: &Node) -> bool {
        let current = node.children.load_full();
        if current.as_deref().is_some_and(|c| !c.is_childless()) {
            return false;
        }
        if matches!(current.as_deref(), Some(Children::Pruned(_))) {
            return false;
        }
        let tombstone = Some(Arc::new(Children::Pruned(current.clone())));
        let previous = node.children.compare_and_swap(&current, tombstone);
        if !same(&previous, &current) {
            return false;
        }
        // An insert into a hashed table or a value store may have landed
        // between the check and the swap
        let repopulated = current.as_deref().is_some_and(|c| !c.is_childless());
        if repopulated || node.has_value() {
            node.children.store(current);
            return false;
        }
        true
    }

    /// Unlink `child` from `parent`; no-op if it is no longer there.
    ///
    /// A tombstoned parent is unlinked through the table it wraps; a failed
    /// seal restores that same table.
    pub(crate) fn detach(&self, parent: &Node, child: &Arc<Node>) {
        loop {
            let current = parent.children.load_full();
            let table = match current.as_deref() {
                Some(Children::Single { child: c, .. }) if Arc::ptr_eq(c, child) => {
                    let previous = parent.children.compare_and_swap(&current, None);
                    if same(&previous, &current) {
                        return;
                    }
                    continue;
                }
                Some(Children::Hashed(table)) => table,
                Some(Children::Pruned(Some(sealed))) => match sealed.as_ref() {
                    Children::Hashed(table) => table,
                    _ => return,
                },
                _ => return,
            };
            if table.remove_if(&child.key, |_, c| Arc::ptr_eq(c, child)).is_some() {
                trace!(target: "termtrie::children", key = ?child.key, "detached from hashed table");
            }
            return;
        }
    }
}
