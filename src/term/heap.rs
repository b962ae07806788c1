//! Cell heap holding terms under construction or inspection.
//!
//! Layout follows the classic structure-copying scheme: a slot holds either an
//! immediate value, a reference, or `Str(addr)` pointing at a `Functor` header
//! cell that is followed by `arity` argument slots.
//!
//! The heap has a soft `capacity`. Allocating past it fails with
//! [`HeapOverflow`]; callers rewind to a [`HeapMark`], [`grow`](Heap::grow) and
//! retry. Every binding is trailed so rewinding restores the exact prior state.

use std::collections::HashMap;
use std::sync::Arc;

use super::{Functor, Term};
use crate::errors::{Resource, TrieError, TrieResult};

/// Index of a heap cell
pub type Addr = usize;

/// One heap cell
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Unbound variable (the variable *is* this cell)
    Var,
    /// Bound to the cell at the given address
    Ref(Addr),
    /// Attributed variable; the attribute term lives at the given address
    AttVar(Addr),
    Atom(Arc<str>),
    Int(i64),
    Float(f64),
    Text(Arc<str>),
    /// Compound term whose functor header is at the given address
    Str(Addr),
    /// Functor header, followed by `arity` argument cells
    Functor(Functor),
    /// Variable temporarily numbered by the key encoder
    Seen(u32),
}

impl Cell {
    #[inline]
    fn is_bindable(&self) -> bool {
        matches!(self, Cell::Var | Cell::AttVar(_))
    }
}

/// Allocation went past the heap's current capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapOverflow;

/// Saved heap top and trail height
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapMark {
    cells: usize,
    trail: usize,
}

/// Growable cell store with a binding trail
#[derive(Debug, Clone)]
pub struct Heap {
    cells: Vec<Cell>,
    trail: Vec<(Addr, Cell)>,
    capacity: usize,
    max_capacity: usize,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub const DEFAULT_CAPACITY: usize = 1 << 12;
    pub const DEFAULT_MAX_CAPACITY: usize = 1 << 24;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY, Self::DEFAULT_MAX_CAPACITY)
    }

    /// Create a heap with a soft capacity and a hard upper bound for growth
    pub fn with_capacity(capacity: usize, max_capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Heap {
            cells: Vec::with_capacity(capacity.min(Self::DEFAULT_CAPACITY)),
            trail: Vec::new(),
            capacity,
            max_capacity: max_capacity.max(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn cell(&self, addr: Addr) -> &Cell {
        &self.cells[addr]
    }

    /// Untrailed write, for fresh cells and transient markers
    #[inline]
    pub(crate) fn set(&mut self, addr: Addr, cell: Cell) {
        self.cells[addr] = cell;
    }

    /// Allocate `n` consecutive unbound cells
    pub fn alloc(&mut self, n: usize) -> Result<Addr, HeapOverflow> {
        let base = self.cells.len();
        if base + n > self.capacity {
            return Err(HeapOverflow);
        }
        self.cells.resize(base + n, Cell::Var);
        Ok(base)
    }

    pub fn new_var(&mut self) -> Result<Addr, HeapOverflow> {
        self.alloc(1)
    }

    /// Create an attributed variable carrying `attribute`
    pub fn new_attvar(&mut self, attribute: &Term) -> Result<Addr, HeapOverflow> {
        let attr = self.put_term(attribute)?;
        let var = self.alloc(1)?;
        self.cells[var] = Cell::AttVar(attr);
        Ok(var)
    }

    /// Follow reference chains to the cell that holds the actual value
    #[inline]
    pub fn deref(&self, mut addr: Addr) -> Addr {
        while let Cell::Ref(next) = self.cells[addr] {
            addr = next;
        }
        addr
    }

    /// Overwrite `addr`, remembering the old cell on the trail
    pub fn bind(&mut self, addr: Addr, cell: Cell) {
        let old = std::mem::replace(&mut self.cells[addr], cell);
        self.trail.push((addr, old));
    }

    pub fn mark(&self) -> HeapMark {
        HeapMark {
            cells: self.cells.len(),
            trail: self.trail.len(),
        }
    }

    /// Undo bindings and discard allocations made since `mark`
    pub fn undo(&mut self, mark: HeapMark) {
        while self.trail.len() > mark.trail {
            if let Some((addr, old)) = self.trail.pop() {
                if addr < self.cells.len() {
                    self.cells[addr] = old;
                }
            }
        }
        self.cells.truncate(mark.cells);
    }

    /// Double the soft capacity, bounded by the hard maximum
    pub fn grow(&mut self) -> TrieResult<()> {
        if self.capacity >= self.max_capacity {
            return Err(TrieError::ResourceExhausted(Resource::Memory));
        }
        self.capacity = self.capacity.saturating_mul(2).min(self.max_capacity);
        Ok(())
    }

    /// [`put_term`](Heap::put_term), growing the heap until the term fits or
    /// the hard maximum is reached
    pub fn put_term_growing(&mut self, term: &Term) -> TrieResult<Addr> {
        loop {
            let mark = self.mark();
            match self.put_term(term) {
                Ok(addr) => return Ok(addr),
                Err(HeapOverflow) => {
                    self.undo(mark);
                    self.grow()?;
                }
            }
        }
    }

    /// Unify the terms at `a` and `b`, trailing every binding.
    ///
    /// On failure the partial bindings stay in place; rewind with
    /// [`undo`](Heap::undo) to discard them.
    pub fn unify(&mut self, a: Addr, b: Addr) -> bool {
        let mut todo: Vec<(Addr, Addr)> = vec![(a, b)];

        while let Some((a, b)) = todo.pop() {
            let a = self.deref(a);
            let b = self.deref(b);
            if a == b {
                continue;
            }
            if self.cells[a].is_bindable() {
                self.bind(a, Cell::Ref(b));
                continue;
            }
            if self.cells[b].is_bindable() {
                self.bind(b, Cell::Ref(a));
                continue;
            }
            match (&self.cells[a], &self.cells[b]) {
                (Cell::Str(x), Cell::Str(y)) => {
                    let (x, y) = (*x, *y);
                    let arity = match (&self.cells[x], &self.cells[y]) {
                        (Cell::Functor(f), Cell::Functor(g)) if f == g => f.arity as usize,
                        _ => return false,
                    };
                    for i in (1..=arity).rev() {
                        todo.push((x + i, y + i));
                    }
                }
                (Cell::Atom(x), Cell::Atom(y)) if x == y => {}
                (Cell::Int(x), Cell::Int(y)) if x == y => {}
                (Cell::Float(x), Cell::Float(y)) if x.to_bits() == y.to_bits() => {}
                (Cell::Text(x), Cell::Text(y)) if x == y => {}
                (Cell::Seen(x), Cell::Seen(y)) if x == y => {}
                _ => return false,
            }
        }
        true
    }

    /// True if no compound reachable from `addr` contains itself
    pub fn is_acyclic(&self, addr: Addr) -> bool {
        // false = on the current path, true = fully explored
        let mut state: HashMap<Addr, bool> = HashMap::new();
        let mut stack: Vec<(Addr, usize)> = Vec::new();

        let root = self.deref(addr);
        if let Cell::Str(s) = self.cells[root] {
            state.insert(s, false);
            stack.push((s, 0));
        }

        while let Some(top) = stack.last_mut() {
            let (base, next) = *top;
            let arity = match &self.cells[base] {
                Cell::Functor(f) => f.arity as usize,
                _ => 0,
            };
            if next < arity {
                top.1 += 1;
                let child = self.deref(base + next + 1);
                if let Cell::Str(s) = self.cells[child] {
                    match state.get(&s) {
                        Some(false) => return false,
                        Some(true) => {}
                        None => {
                            state.insert(s, false);
                            stack.push((s, 0));
                        }
                    }
                }
            } else {
                state.insert(base, true);
                stack.pop();
            }
        }
        true
    }

    /// Copy a tree term onto the heap and return the address of its slot
    pub fn put_term(&mut self, term: &Term) -> Result<Addr, HeapOverflow> {
        let root = self.alloc(1)?;
        let mut vars: HashMap<u32, Addr> = HashMap::new();
        let mut todo: Vec<(&Term, Addr)> = vec![(term, root)];

        while let Some((term, slot)) = todo.pop() {
            let cell = match term {
                Term::Var(id) => match vars.get(id) {
                    Some(&first) => Cell::Ref(first),
                    None => {
                        vars.insert(*id, slot);
                        Cell::Var
                    }
                },
                Term::Atom(name) => Cell::Atom(Arc::clone(name)),
                Term::Int(value) => Cell::Int(*value),
                Term::Float(value) => Cell::Float(*value),
                Term::Text(text) => Cell::Text(Arc::clone(text)),
                Term::Compound(name, args) => {
                    let base = self.alloc(args.len() + 1)?;
                    self.cells[base] = Cell::Functor(Functor::new(Arc::clone(name), args.len() as u32));
                    for (i, arg) in args.iter().enumerate().rev() {
                        todo.push((arg, base + 1 + i));
                    }
                    Cell::Str(base)
                }
            };
            self.cells[slot] = cell;
        }
        Ok(root)
    }

    /// Read the term at `addr` back into tree form.
    ///
    /// Variables are numbered by first occurrence; attributes are dropped.
    /// The term must be acyclic.
    pub fn read_term(&self, addr: Addr) -> Term {
        enum Step {
            Visit(Addr),
            Close(Arc<str>, usize),
        }

        let mut vars: HashMap<Addr, u32> = HashMap::new();
        let mut out: Vec<Term> = Vec::new();
        let mut todo = vec![Step::Visit(addr)];

        while let Some(step) = todo.pop() {
            match step {
                Step::Visit(a) => {
                    let p = self.deref(a);
                    let term = match &self.cells[p] {
                        Cell::Var | Cell::AttVar(_) | Cell::Seen(_) | Cell::Ref(_) => {
                            let next = vars.len() as u32;
                            Term::Var(*vars.entry(p).or_insert(next))
                        }
                        Cell::Atom(name) => Term::Atom(Arc::clone(name)),
                        Cell::Int(value) => Term::Int(*value),
                        Cell::Float(value) => Term::Float(*value),
                        Cell::Text(text) => Term::Text(Arc::clone(text)),
                        Cell::Functor(f) => Term::Atom(Arc::clone(&f.name)),
                        Cell::Str(base) => {
                            let base = *base;
                            if let Cell::Functor(f) = &self.cells[base] {
                                let arity = f.arity as usize;
                                todo.push(Step::Close(Arc::clone(&f.name), arity));
                                for i in (1..=arity).rev() {
                                    todo.push(Step::Visit(base + i));
                                }
                            }
                            continue;
                        }
                    };
                    out.push(term);
                }
                Step::Close(name, arity) => {
                    let args = out.split_off(out.len() - arity);
                    out.push(Term::Compound(name, args));
                }
            }
        }
        out.pop().unwrap_or(Term::Var(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(args: Vec<Term>) -> Term {
        Term::compound("f", args)
    }

    #[test]
    fn test_put_and_read_shares_variables() {
        let mut heap = Heap::new();
        let t = f(vec![Term::var(4), Term::compound("g", vec![Term::var(4)]), Term::int(3)]);
        let addr = heap.put_term(&t).unwrap();
        assert_eq!(heap.read_term(addr), t.canonical());
    }

    #[test]
    fn test_unify_binds_and_undo_restores() {
        let mut heap = Heap::new();
        let a = heap.put_term(&f(vec![Term::var(0), Term::atom("b")])).unwrap();
        let b = heap.put_term(&f(vec![Term::atom("a"), Term::var(0)])).unwrap();
        let mark = heap.mark();

        assert!(heap.unify(a, b));
        assert_eq!(heap.read_term(a), f(vec![Term::atom("a"), Term::atom("b")]));

        heap.undo(mark);
        assert_eq!(heap.read_term(a), f(vec![Term::var(0), Term::atom("b")]));
    }

    #[test]
    fn test_unify_clash() {
        let mut heap = Heap::new();
        let a = heap.put_term(&f(vec![Term::int(1)])).unwrap();
        let b = heap.put_term(&f(vec![Term::int(2)])).unwrap();
        assert!(!heap.unify(a, b));
    }

    #[test]
    fn test_cycle_detection() {
        let mut heap = Heap::new();
        let x = heap.new_var().unwrap();
        let t = heap.put_term(&f(vec![Term::atom("a")])).unwrap();
        // Make the argument of f/1 point back at the compound itself
        let Cell::Str(base) = heap.cell(t).clone() else {
            panic!("expected compound");
        };
        assert!(heap.is_acyclic(t));
        heap.bind(base + 1, Cell::Ref(x));
        heap.bind(x, Cell::Str(base));
        assert!(!heap.is_acyclic(t));
    }

    #[test]
    fn test_shared_subterm_is_not_a_cycle() {
        let mut heap = Heap::new();
        let g = heap.put_term(&Term::compound("g", vec![Term::int(1)])).unwrap();
        let t = heap.put_term(&f(vec![Term::var(0), Term::var(1)])).unwrap();
        let Cell::Str(base) = heap.cell(t).clone() else {
            panic!("expected compound");
        };
        heap.bind(base + 1, Cell::Ref(g));
        heap.bind(base + 2, Cell::Ref(g));
        assert!(heap.is_acyclic(t));
    }

    #[test]
    fn test_overflow_then_grow() {
        let mut heap = Heap::with_capacity(2, 8);
        let big = f(vec![Term::int(1), Term::int(2), Term::int(3)]);
        assert_eq!(heap.put_term(&big), Err(HeapOverflow));

        heap.undo(HeapMark { cells: 0, trail: 0 });
        heap.grow().unwrap();
        heap.grow().unwrap();
        assert!(heap.put_term(&big).is_ok());
        assert_eq!(heap.grow(), Err(TrieError::ResourceExhausted(Resource::Memory)));
    }
}
