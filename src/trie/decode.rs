//! Replaying a key path against a heap term.
//!
//! The decoder is a small unification machine. In *read* mode it walks an
//! existing term and checks it against the keys, binding unbound variables as
//! needed; as soon as it binds a variable to a compound it switches to *write*
//! mode and builds the rest of that subterm from the keys. A return stack of
//! (slot, mode) pairs restores the outer context on every `Pop`.
//!
//! Building happens on the caller's heap. When the heap runs out of room the
//! whole replay is rolled back, the heap grows and the replay restarts.

use smallvec::SmallVec;
use tracing::debug;

use super::key::Key;
use super::Trie;
use crate::errors::TrieResult;
use crate::term::{Addr, Cell, Functor, Heap, HeapOverflow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Read,
    Write,
}

struct KeyDecoder<'t> {
    trie: &'t Trie,
    ptr: Addr,
    mode: Mode,
    /// Slot of each key variable, indexed by its ordinal
    vars: SmallVec<[Option<Addr>; 16]>,
    returns: SmallVec<[(Addr, Mode); 16]>,
}

/// Atomic cells that denote the same constant
fn same_constant(a: &Cell, b: &Cell) -> bool {
    match (a, b) {
        (Cell::Atom(x), Cell::Atom(y)) => x == y,
        (Cell::Int(x), Cell::Int(y)) => x == y,
        (Cell::Float(x), Cell::Float(y)) => x.to_bits() == y.to_bits(),
        (Cell::Text(x), Cell::Text(y)) => x == y,
        _ => false,
    }
}

impl<'t> KeyDecoder<'t> {
    fn new(trie: &'t Trie, target: Addr) -> Self {
        KeyDecoder {
            trie,
            ptr: target,
            mode: Mode::Read,
            vars: SmallVec::new(),
            returns: SmallVec::new(),
        }
    }

    fn replay(&mut self, heap: &mut Heap, keys: &[Key]) -> Result<bool, HeapOverflow> {
        for key in keys {
            let matched = match *key {
                Key::Pop => {
                    if let Some((ptr, mode)) = self.returns.pop() {
                        self.ptr = ptr;
                        self.mode = mode;
                    }
                    true
                }
                Key::Error => false,
                Key::Functor(symbol, arity) => {
                    let functor = Functor::new(self.trie.atoms.resolve(symbol), arity);
                    self.compound(heap, functor)?
                }
                Key::Var(n) => self.variable(heap, n as usize),
                Key::Atom(symbol) => self.constant(heap, Cell::Atom(self.trie.atoms.resolve(symbol))),
                Key::Int(value) => self.constant(heap, Cell::Int(value)),
                Key::Indirect(id) => match self.trie.materialize(id) {
                    Some(value) => self.constant(heap, value.to_cell()),
                    None => false,
                },
            };
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn compound(&mut self, heap: &mut Heap, functor: Functor) -> Result<bool, HeapOverflow> {
        self.returns.push((self.ptr + 1, self.mode));
        match self.mode {
            Mode::Write => {
                let base = heap.alloc(functor.arity as usize + 1)?;
                heap.set(base, Cell::Functor(functor));
                heap.set(self.ptr, Cell::Str(base));
                self.ptr = base + 1;
            }
            Mode::Read => {
                let addr = heap.deref(self.ptr);
                match heap.cell(addr) {
                    Cell::Var | Cell::AttVar(_) => {
                        let base = heap.alloc(functor.arity as usize + 1)?;
                        heap.set(base, Cell::Functor(functor));
                        heap.bind(addr, Cell::Str(base));
                        self.ptr = base + 1;
                        self.mode = Mode::Write;
                    }
                    Cell::Str(base) => {
                        let base = *base;
                        if !matches!(heap.cell(base), Cell::Functor(f) if *f == functor) {
                            return Ok(false);
                        }
                        self.ptr = base + 1;
                    }
                    _ => return Ok(false),
                }
            }
        }
        Ok(true)
    }

    fn variable(&mut self, heap: &mut Heap, n: usize) -> bool {
        if self.vars.len() <= n {
            self.vars.resize(n + 1, None);
        }
        let matched = match (self.mode, self.vars[n]) {
            (Mode::Write, None) => {
                heap.set(self.ptr, Cell::Var);
                self.vars[n] = Some(self.ptr);
                true
            }
            (Mode::Write, Some(first)) => {
                heap.set(self.ptr, Cell::Ref(first));
                true
            }
            (Mode::Read, None) => {
                self.vars[n] = Some(self.ptr);
                true
            }
            (Mode::Read, Some(first)) => heap.unify(self.ptr, first),
        };
        self.ptr += 1;
        matched
    }

    fn constant(&mut self, heap: &mut Heap, cell: Cell) -> bool {
        let matched = match self.mode {
            Mode::Write => {
                heap.set(self.ptr, cell);
                true
            }
            Mode::Read => {
                let addr = heap.deref(self.ptr);
                match heap.cell(addr) {
                    Cell::Var | Cell::AttVar(_) => {
                        heap.bind(addr, cell);
                        true
                    }
                    existing => same_constant(existing, &cell),
                }
            }
        };
        self.ptr += 1;
        matched
    }
}

/// Unify the term in slot `target` with the term spelled by `keys`.
///
/// On success the bindings stay on the heap (trailed). On failure every
/// binding and allocation made here is undone. Heap overflow grows the heap
/// and retries; `ResourceExhausted(Memory)` once it cannot grow further.
pub(crate) fn unify_keys(trie: &Trie, heap: &mut Heap, target: Addr, keys: &[Key]) -> TrieResult<bool> {
    loop {
        let mark = heap.mark();
        let mut decoder = KeyDecoder::new(trie, target);
        match decoder.replay(heap, keys) {
            Ok(true) => return Ok(true),
            Ok(false) => {
                heap.undo(mark);
                return Ok(false);
            }
            Err(HeapOverflow) => {
                heap.undo(mark);
                heap.grow()?;
                debug!(
                    target: "termtrie::decode",
                    capacity = heap.capacity(),
                    "heap overflow during reconstruction, retrying"
                );
            }
        }
    }
}
