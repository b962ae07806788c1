//! Atom interning for trie keys
//!
//! Every atom and functor name that appears on a trie edge is interned into a
//! [`AtomTable`] owned by the trie, so that keys are small `Copy` tokens with
//! O(1) comparison and hashing.
//!
//! # Design
//!
//! - Interning uses lasso's `ThreadedRodeo`, safe for concurrent writers
//! - Each live trie node holding an atom key contributes one reference,
//!   tracked per symbol in a `DashMap`
//! - The table is passed explicitly; there is no process-wide interner
//!
//! lasso never forgets a string, so a symbol whose count drops to zero keeps
//! its spelling; the count only tells how many nodes still use it.
//!
//! # Example
//! ```
//! use termtrie::symbol::AtomTable;
//!
//! let atoms = AtomTable::new();
//! let s1 = atoms.intern("hello");
//! let s2 = atoms.intern("hello");
//! assert_eq!(s1, s2);
//! assert_eq!(&*atoms.resolve(s1), "hello");
//! ```

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use lasso::{Spur, ThreadedRodeo};

/// Interned atom - 4 bytes, O(1) comparison
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct Symbol(Spur);

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", lasso::Key::into_usize(self.0))
    }
}

/// Reference-counted atom interner
pub struct AtomTable {
    rodeo: ThreadedRodeo,
    refs: DashMap<Symbol, usize>,
}

impl fmt::Debug for AtomTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomTable")
            .field("interned", &self.rodeo.len())
            .field("live", &self.live_count())
            .finish()
    }
}

impl Default for AtomTable {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomTable {
    pub fn new() -> Self {
        AtomTable {
            rodeo: ThreadedRodeo::new(),
            refs: DashMap::new(),
        }
    }

    /// Intern a name, creating the symbol if needed
    #[inline]
    pub fn intern(&self, name: &str) -> Symbol {
        Symbol(self.rodeo.get_or_intern(name))
    }

    /// Look up a name without interning it
    #[inline]
    pub fn get(&self, name: &str) -> Option<Symbol> {
        self.rodeo.get(name).map(Symbol)
    }

    /// Spelling of a symbol
    #[inline]
    pub fn resolve(&self, symbol: Symbol) -> Arc<str> {
        Arc::from(self.rodeo.resolve(&symbol.0))
    }

    /// Add one reference
    pub fn acquire(&self, symbol: Symbol) {
        *self.refs.entry(symbol).or_insert(0) += 1;
    }

    /// Drop one reference; the count entry disappears at zero
    pub fn release(&self, symbol: Symbol) {
        if let Some(mut count) = self.refs.get_mut(&symbol) {
            *count = count.saturating_sub(1);
        }
        self.refs.remove_if(&symbol, |_, count| *count == 0);
    }

    /// Number of references currently held on `symbol`
    pub fn references(&self, symbol: Symbol) -> usize {
        self.refs.get(&symbol).map(|count| *count).unwrap_or(0)
    }

    /// Number of symbols with at least one reference
    pub fn live_count(&self) -> usize {
        self.refs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_does_not_intern() {
        let atoms = AtomTable::new();
        assert!(atoms.get("missing").is_none());
        let s = atoms.intern("present");
        assert_eq!(atoms.get("present"), Some(s));
    }

    #[test]
    fn test_reference_counting() {
        let atoms = AtomTable::new();
        let s = atoms.intern("node");
        atoms.acquire(s);
        atoms.acquire(s);
        assert_eq!(atoms.references(s), 2);
        assert_eq!(atoms.live_count(), 1);

        atoms.release(s);
        atoms.release(s);
        assert_eq!(atoms.references(s), 0);
        assert_eq!(atoms.live_count(), 0);
        // Spelling survives
        assert_eq!(&*atoms.resolve(s), "node");
    }

    #[test]
    fn test_concurrent_interning() {
        let atoms = Arc::new(AtomTable::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let atoms = Arc::clone(&atoms);
                std::thread::spawn(move || atoms.intern("shared"))
            })
            .collect();
        let symbols: Vec<Symbol> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(symbols.windows(2).all(|w| w[0] == w[1]));
    }
}
