//! Trie statistics and counters.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};

use super::children::Children;
use super::key::Key;
use super::node::{Node, NODE_SIZE};
use super::Trie;

/// Result of a full scan of a trie
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrieStatistics {
    /// Approximate memory held by the trie structure
    pub bytes: usize,
    /// Nodes below the root
    pub nodes: usize,
    /// Nodes whose children live in a hash table
    pub hashes: usize,
    /// Nodes holding a value
    pub values: usize,
}

/// Snapshot of the operation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrieCounters {
    /// Path walks started by lookups and inserts
    pub lookups: u64,
    /// Enumerations started
    pub gen_calls: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    lookups: AtomicU64,
    gen_calls: AtomicU64,
}

impl Counters {
    #[inline]
    pub(crate) fn lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn gen_call(&self) {
        self.gen_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> TrieCounters {
        TrieCounters {
            lookups: self.lookups.load(Ordering::Relaxed),
            gen_calls: self.gen_calls.load(Ordering::Relaxed),
        }
    }
}

impl Trie {
    /// Walk the whole trie and total up its shape
    pub(crate) fn statistics(&self) -> TrieStatistics {
        let mut stats = TrieStatistics {
            bytes: std::mem::size_of::<Trie>(),
            ..Default::default()
        };
        self.map_nodes(|node: &Node| -> ControlFlow<()> {
            stats.bytes += NODE_SIZE;
            if !std::ptr::eq(node, &*self.root) {
                stats.nodes += 1;
            }
            if node.has_value() {
                stats.values += 1;
            }
            if let Some(children) = node.children.load().as_deref() {
                stats.bytes += std::mem::size_of::<Children>();
                if let Children::Hashed(table) = children {
                    stats.hashes += 1;
                    stats.bytes += table.capacity() * std::mem::size_of::<(Key, std::sync::Arc<Node>)>();
                }
            }
            ControlFlow::Continue(())
        });
        stats
    }

    pub(crate) fn counters(&self) -> TrieCounters {
        self.counters.snapshot()
    }

    pub(crate) fn count_enumeration(&self) {
        self.counters.gen_call();
    }
}
