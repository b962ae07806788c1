//! Indirect value table
//!
//! Values that do not fit in a key token (big integers, floats, text) are
//! interned here and represented on trie edges by a small surrogate
//! [`IndirectId`]. Equal values always map to the same id, so the trie can
//! compare surrogates instead of payloads.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::term::Cell;

/// Surrogate token for an interned oversized value
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct IndirectId(u32);

/// An oversized atomic value
#[derive(Debug, Clone)]
pub enum IndirectValue {
    Int(i64),
    Float(f64),
    Text(Arc<str>),
}

impl IndirectValue {
    /// Extract the oversized value held by a heap cell, if any
    pub fn from_cell(cell: &Cell) -> Option<Self> {
        match cell {
            Cell::Int(value) => Some(IndirectValue::Int(*value)),
            Cell::Float(value) => Some(IndirectValue::Float(*value)),
            Cell::Text(text) => Some(IndirectValue::Text(Arc::clone(text))),
            _ => None,
        }
    }

    pub fn to_cell(&self) -> Cell {
        match self {
            IndirectValue::Int(value) => Cell::Int(*value),
            IndirectValue::Float(value) => Cell::Float(*value),
            IndirectValue::Text(text) => Cell::Text(Arc::clone(text)),
        }
    }
}

impl PartialEq for IndirectValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (IndirectValue::Int(a), IndirectValue::Int(b)) => a == b,
            (IndirectValue::Float(a), IndirectValue::Float(b)) => a.to_bits() == b.to_bits(),
            (IndirectValue::Text(a), IndirectValue::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for IndirectValue {}

impl Hash for IndirectValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            IndirectValue::Int(value) => value.hash(state),
            IndirectValue::Float(value) => value.to_bits().hash(state),
            IndirectValue::Text(text) => text.hash(state),
        }
    }
}

/// Two-way map between oversized values and their surrogates
pub struct IndirectTable {
    by_value: DashMap<IndirectValue, IndirectId>,
    by_id: DashMap<IndirectId, IndirectValue>,
    next_id: AtomicU32,
}

impl fmt::Debug for IndirectTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndirectTable")
            .field("entries", &self.by_id.len())
            .finish()
    }
}

impl Default for IndirectTable {
    fn default() -> Self {
        Self::new()
    }
}

impl IndirectTable {
    pub fn new() -> Self {
        IndirectTable {
            by_value: DashMap::new(),
            by_id: DashMap::new(),
            next_id: AtomicU32::new(1),
        }
    }

    /// Surrogate for `value`.
    ///
    /// With `insert == false` a value that was never interned yields `None`:
    /// it cannot be on any trie path.
    pub fn intern(&self, value: &IndirectValue, insert: bool) -> Option<IndirectId> {
        if let Some(id) = self.by_value.get(value) {
            return Some(*id);
        }
        if !insert {
            return None;
        }
        match self.by_value.entry(value.clone()) {
            Entry::Occupied(entry) => Some(*entry.get()),
            Entry::Vacant(entry) => {
                let id = IndirectId(self.next_id.fetch_add(1, Ordering::Relaxed));
                // Publish the reverse mapping before the id becomes visible
                self.by_id.insert(id, value.clone());
                entry.insert(id);
                Some(id)
            }
        }
    }

    /// The value behind a surrogate
    pub fn materialize(&self, id: IndirectId) -> Option<IndirectValue> {
        self.by_id.get(&id).map(|value| value.clone())
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
