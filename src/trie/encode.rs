//! Linearizing a heap term into trie keys.
//!
//! The encoder walks the term depth-first, left to right, emitting one
//! [`Key`] per node plus a `Pop` after the last argument of every compound.
//! Variables are numbered by first occurrence: the first is `Var(1)`. While a
//! variable is numbered its cell is overwritten with `Cell::Seen(n)`; dropping
//! the encoder restores every such cell, including on early return.

use smallvec::SmallVec;

use super::key::{is_inline_int, Key};
use super::Trie;
use crate::errors::{TrieError, TrieResult};
use crate::indirect::IndirectValue;
use crate::term::{Addr, Cell, Heap};

/// Result of encoding one token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Encoded {
    Key(Key),
    /// Lookup only: the token names something the trie has never seen
    Missing,
}

/// Pending argument slots of one open compound
#[derive(Debug)]
struct Frame {
    next: Addr,
    remaining: usize,
    /// Emit `Pop` once exhausted
    pop: bool,
}

pub(crate) struct KeyEncoder<'h> {
    heap: &'h mut Heap,
    root: Addr,
    agenda: SmallVec<[Frame; 16]>,
    numbered: SmallVec<[Addr; 8]>,
    compounds: usize,
    cycle_check_interval: usize,
    add: bool,
}

impl<'h> KeyEncoder<'h> {
    /// Encoder for the term in slot `root`. With `add` set, unknown atoms and
    /// oversized values are interned; otherwise they end the walk with
    /// [`Encoded::Missing`].
    pub(crate) fn new(heap: &'h mut Heap, root: Addr, add: bool, cycle_check_interval: usize) -> Self {
        let mut agenda = SmallVec::new();
        agenda.push(Frame {
            next: root,
            remaining: 1,
            pop: false,
        });
        KeyEncoder {
            heap,
            root,
            agenda,
            numbered: SmallVec::new(),
            compounds: 0,
            cycle_check_interval,
            add,
        }
    }

    /// Next token, or `None` once the whole term has been emitted
    pub(crate) fn next_key(&mut self, trie: &Trie) -> TrieResult<Option<Encoded>> {
        let slot = loop {
            let Some(top) = self.agenda.last_mut() else {
                return Ok(None);
            };
            if top.remaining > 0 {
                let slot = top.next;
                top.next += 1;
                top.remaining -= 1;
                break slot;
            }
            if self.agenda.pop().is_some_and(|frame| frame.pop) {
                return Ok(Some(Encoded::Key(Key::Pop)));
            }
        };

        let addr = self.heap.deref(slot);
        let cell = self.heap.cell(addr).clone();
        let key = match cell {
            Cell::Var => {
                let n = self.numbered.len() as u32 + 1;
                self.heap.set(addr, Cell::Seen(n));
                self.numbered.push(addr);
                Key::Var(n)
            }
            Cell::Seen(n) => Key::Var(n),
            Cell::AttVar(_) => return Err(TrieError::ContainsUnresolvedPlaceholder),
            Cell::Atom(name) => {
                let Some(symbol) = trie.symbol(&name, self.add) else {
                    return Ok(Some(Encoded::Missing));
                };
                Key::Atom(symbol)
            }
            Cell::Int(value) if is_inline_int(value) => Key::Int(value),
            Cell::Int(_) | Cell::Float(_) | Cell::Text(_) => {
                let Some(value) = IndirectValue::from_cell(&cell) else {
                    return Err(TrieError::MalformedTerm(addr));
                };
                match trie.indirect_key(&value, self.add) {
                    Some(key) => key,
                    None => return Ok(Some(Encoded::Missing)),
                }
            }
            Cell::Str(base) => {
                self.compounds += 1;
                if self.add
                    && self.compounds == self.cycle_check_interval
                    && !self.heap.is_acyclic(self.root)
                {
                    return Err(TrieError::CyclicValue);
                }
                let Cell::Functor(functor) = self.heap.cell(base) else {
                    return Err(TrieError::MalformedTerm(base));
                };
                let (name, arity) = (functor.name.clone(), functor.arity);
                self.agenda.push(Frame {
                    next: base + 1,
                    remaining: arity as usize,
                    pop: true,
                });
                let Some(symbol) = trie.symbol(&name, self.add) else {
                    return Ok(Some(Encoded::Missing));
                };
                Key::Functor(symbol, arity)
            }
            Cell::Ref(_) | Cell::Functor(_) => return Err(TrieError::MalformedTerm(addr)),
        };
        Ok(Some(Encoded::Key(key)))
    }
}

impl Drop for KeyEncoder<'_> {
    fn drop(&mut self) {
        for &addr in &self.numbered {
            self.heap.set(addr, Cell::Var);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Term;

    fn encode_all(trie: &Trie, term: &Term) -> TrieResult<Vec<Key>> {
        let mut heap = Heap::new();
        let root = heap.put_term(term).unwrap();
        let mut encoder = KeyEncoder::new(&mut heap, root, true, 1000);
        let mut keys = Vec::new();
        while let Some(encoded) = encoder.next_key(trie)? {
            match encoded {
                Encoded::Key(key) => keys.push(key),
                Encoded::Missing => unreachable!("add mode never misses"),
            }
        }
        Ok(keys)
    }

    #[test]
    fn test_variables_numbered_by_first_occurrence() {
        let trie = Trie::new(Default::default(), None);
        let term = Term::compound("f", vec![Term::var(9), Term::var(4), Term::var(9)]);
        let keys = encode_all(&trie, &term).unwrap();
        let f = trie.atoms.get("f").unwrap();
        assert_eq!(
            keys,
            vec![Key::Functor(f, 3), Key::Var(1), Key::Var(2), Key::Var(1), Key::Pop]
        );
    }

    #[test]
    fn test_variables_restored_after_encoding() {
        let trie = Trie::new(Default::default(), None);
        let mut heap = Heap::new();
        let root = heap.put_term(&Term::compound("g", vec![Term::var(0)])).unwrap();
        let before = heap.clone();
        {
            let mut encoder = KeyEncoder::new(&mut heap, root, true, 1000);
            // Stop after the first argument
            encoder.next_key(&trie).unwrap();
            encoder.next_key(&trie).unwrap();
        }
        assert_eq!(heap.read_term(root), before.read_term(root));
        let Cell::Str(base) = heap.cell(root) else {
            panic!("expected compound");
        };
        assert_eq!(heap.cell(base + 1), &Cell::Var);
    }

    #[test]
    fn test_oversized_values_become_indirect() {
        let trie = Trie::new(Default::default(), None);
        let keys = encode_all(&trie, &Term::compound("h", vec![Term::float(1.5), Term::int(1 << 60)])).unwrap();
        assert!(matches!(keys[1], Key::Indirect(_)));
        assert!(matches!(keys[2], Key::Indirect(_)));
        assert_ne!(keys[1], keys[2]);
    }

    #[test]
    fn test_attributed_variable_rejected() {
        let trie = Trie::new(Default::default(), None);
        let mut heap = Heap::new();
        let root = heap.new_attvar(&Term::atom("frozen")).unwrap();
        let mut encoder = KeyEncoder::new(&mut heap, root, true, 1000);
        assert_eq!(
            encoder.next_key(&trie),
            Err(TrieError::ContainsUnresolvedPlaceholder)
        );
    }

    #[test]
    fn test_lookup_of_unknown_atom_misses() {
        let trie = Trie::new(Default::default(), None);
        let mut heap = Heap::new();
        let root = heap.put_term(&Term::atom("never_seen")).unwrap();
        let mut encoder = KeyEncoder::new(&mut heap, root, false, 1000);
        assert_eq!(encoder.next_key(&trie), Ok(Some(Encoded::Missing)));
        assert!(trie.atoms.get("never_seen").is_none());
    }
}
