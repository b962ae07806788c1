//! Backtracking enumeration of trie entries.
//!
//! The enumerator keeps a stack of choice points, one per level of the
//! current path. Each choice point holds the child taken at that level and a
//! snapshot of its untried siblings. Snapshots are taken when a level is first
//! entered, so children added later at an already-visited level are not seen,
//! while entries removed concurrently are skipped when their value is gone.

use std::sync::Arc;
use std::vec;

use smallvec::SmallVec;
use tracing::trace;

use super::decode::unify_keys;
use super::handle::{NodeHandle, TrieRef};
use super::key::Key;
use super::node::Node;
use super::Trie;
use crate::errors::{Resource, TrieError, TrieResult};
use crate::term::{Addr, Heap, Term};

/// One stored key with its value
#[derive(Debug, Clone)]
pub struct TrieEntry {
    /// The key, with variables numbered from 0
    pub key: Term,
    pub value: Term,
    /// The key's leaf node
    pub node: NodeHandle,
}

/// Where an enumerator stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumState {
    /// Nothing produced yet
    Fresh,
    /// Positioned on an entry
    Positioned,
    /// No entries left; the trie reference has been released
    Exhausted,
}

#[derive(Clone)]
struct Choice {
    key: Key,
    child: Arc<Node>,
    rest: Option<vec::IntoIter<(Key, Arc<Node>)>>,
}

impl Choice {
    /// First child of `node`, or `None` for a childless node
    fn first(node: &Node) -> Option<Choice> {
        let children = node.children.load_full()?;
        let mut entries = children.entries().into_iter();
        let (key, child) = entries.next()?;
        let rest = (entries.len() > 0).then_some(entries);
        Some(Choice { key, child, rest })
    }

    /// Move to the next untried sibling
    fn advance(&mut self) -> bool {
        match self.rest.as_mut().and_then(Iterator::next) {
            Some((key, child)) => {
                self.key = key;
                self.child = child;
                true
            }
            None => false,
        }
    }
}

/// Iterator over the entries of a trie.
///
/// Holds a reference on the trie until exhausted or dropped; dropping an
/// enumerator early is the way to cancel it.
#[derive(Clone)]
pub struct Enumerator {
    access: Option<TrieRef>,
    choices: Vec<Choice>,
    state: EnumState,
}

impl std::fmt::Debug for Enumerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enumerator")
            .field("state", &self.state)
            .field("depth", &self.choices.len())
            .finish()
    }
}

impl Enumerator {
    /// An enumerator over a trie with no nodes starts out exhausted
    pub(crate) fn new(access: TrieRef) -> Self {
        let mut enumerator = Enumerator {
            access: Some(access),
            choices: Vec::new(),
            state: EnumState::Fresh,
        };
        if enumerator.access.as_ref().is_some_and(|access| !access.root.has_children()) {
            enumerator.finish();
        }
        enumerator
    }

    pub fn state(&self) -> EnumState {
        self.state
    }

    /// Stop enumerating and release the trie
    pub fn cut(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        self.choices.clear();
        self.access = None;
        self.state = EnumState::Exhausted;
    }

    /// Move one node forward in depth-first preorder
    fn step(&mut self) -> bool {
        if let Some(top) = self.choices.last() {
            if let Some(choice) = Choice::first(&top.child) {
                self.choices.push(choice);
                return true;
            }
        }
        while let Some(top) = self.choices.last_mut() {
            if top.advance() {
                return true;
            }
            self.choices.pop();
        }
        false
    }

    #[inline]
    fn at_value(&self) -> bool {
        self.choices.last().is_some_and(|top| top.child.has_value())
    }

    fn next_value(&mut self) -> bool {
        while self.step() {
            if self.at_value() {
                return true;
            }
        }
        false
    }

    /// Move to the next node holding a value
    fn position(&mut self) -> bool {
        let Some(access) = &self.access else {
            return false;
        };
        let found = match self.state {
            EnumState::Exhausted => false,
            EnumState::Fresh => match Choice::first(&access.root) {
                Some(choice) => {
                    self.choices.push(choice);
                    self.state = EnumState::Positioned;
                    self.at_value() || self.next_value()
                }
                None => false,
            },
            EnumState::Positioned => self.next_value(),
        };
        if !found {
            trace!(target: "termtrie::enumerate", "enumeration exhausted");
            self.finish();
        }
        found
    }

    fn path(&self) -> SmallVec<[Key; 32]> {
        self.choices.iter().map(|choice| choice.key).collect()
    }

    fn trie(&self) -> TrieResult<&TrieRef> {
        self.access.as_ref().ok_or(TrieError::InvalidHandle)
    }

    /// The entry at the current position, `None` if its value has vanished
    fn current_entry(&self) -> TrieResult<Option<TrieEntry>> {
        let access = self.trie()?;
        let Some(leaf) = self.choices.last().map(|top| Arc::clone(&top.child)) else {
            return Ok(None);
        };
        let Some(value) = access.get_value(&leaf) else {
            return Ok(None);
        };

        let trie: &Trie = access;
        let mut heap = trie.config.new_heap();
        let target = heap
            .new_var()
            .map_err(|_| TrieError::ResourceExhausted(Resource::Memory))?;
        if !unify_keys(trie, &mut heap, target, &self.path())? {
            return Ok(None);
        }
        Ok(Some(TrieEntry {
            key: heap.read_term(target),
            value: value.to_term(),
            node: NodeHandle::new(Arc::clone(access.arc()), leaf),
        }))
    }

    /// Advance to the next entry whose key unifies with the term in slot
    /// `pattern`, returning its node and value.
    ///
    /// Bindings from the match stay on `heap`. Rewind them (with
    /// [`Heap::mark`] and [`Heap::undo`]) before asking for the next match.
    pub fn next_unify(&mut self, heap: &mut Heap, pattern: Addr) -> TrieResult<Option<(NodeHandle, Term)>> {
        while self.position() {
            let trie = Arc::clone(self.trie()?.arc());
            let Some(leaf) = self.choices.last().map(|top| Arc::clone(&top.child)) else {
                continue;
            };
            let mark = heap.mark();
            if !unify_keys(&trie, heap, pattern, &self.path())? {
                continue;
            }
            match trie.get_value(&leaf) {
                Some(value) => {
                    let node = NodeHandle::new(trie, leaf);
                    return Ok(Some((node, value.to_term())));
                }
                None => heap.undo(mark),
            }
        }
        Ok(None)
    }
}

impl Iterator for Enumerator {
    type Item = TrieResult<TrieEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.position() {
            match self.current_entry() {
                Ok(Some(entry)) => return Some(Ok(entry)),
                Ok(None) => continue,
                Err(err) => {
                    self.finish();
                    return Some(Err(err));
                }
            }
        }
        None
    }
}
