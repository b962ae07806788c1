//! Values stored at trie leaves.
//!
//! Atoms and small integers are stored inline. Anything else is recorded in
//! the trie's [`RecordStore`]: a canonical copy of the term, deduplicated by
//! content and reference counted by the leaves that hold it.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use super::key::is_inline_int;
use crate::term::Term;

/// Canonical, immutable copy of a non-atomic value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct Record(Term);

impl Record {
    pub(crate) fn term(&self) -> &Term {
        &self.0
    }
}

/// A leaf value
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Value {
    Atom(Arc<str>),
    Int(i64),
    Record(Arc<Record>),
}

impl Value {
    pub(crate) fn to_term(&self) -> Term {
        match self {
            Value::Atom(name) => Term::Atom(Arc::clone(name)),
            Value::Int(value) => Term::Int(*value),
            Value::Record(record) => record.term().clone(),
        }
    }
}

/// Content-addressed store of recorded values
pub(crate) struct RecordStore {
    records: DashMap<Arc<Record>, usize>,
}

impl fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStore")
            .field("records", &self.records.len())
            .finish()
    }
}

impl RecordStore {
    pub(crate) fn new() -> Self {
        RecordStore {
            records: DashMap::new(),
        }
    }

    /// Leaf value for `term`, recording it if it is not immediate.
    ///
    /// Each call that returns a `Value::Record` holds one reference, to be
    /// given back with [`release`](RecordStore::release).
    pub(crate) fn intern_value(&self, term: &Term) -> Value {
        match term {
            Term::Atom(name) => Value::Atom(Arc::clone(name)),
            Term::Int(value) if is_inline_int(*value) => Value::Int(*value),
            _ => Value::Record(self.record(term)),
        }
    }

    fn record(&self, term: &Term) -> Arc<Record> {
        let record = Record(term.canonical());
        let mut entry = self.records.entry(Arc::new(record)).or_insert(0);
        *entry += 1;
        Arc::clone(entry.key())
    }

    pub(crate) fn release(&self, value: &Value) {
        let Value::Record(record) = value else {
            return;
        };
        if let Some(mut count) = self.records.get_mut(record) {
            *count = count.saturating_sub(1);
        }
        self.records.remove_if(record, |_, count| *count == 0);
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}
