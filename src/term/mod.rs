//! Structured values ("terms") as seen by the trie.
//!
//! Two representations are provided:
//!
//! - [`Term`]: an owned tree, convenient at API boundaries and for payloads.
//! - [`Heap`]: a mutable cell store in the style of a logic-programming global
//!   stack. Keys are walked directly on the heap so that variables can be
//!   marked in place, attributed variables and cyclic structures can exist, and
//!   reconstruction can unify against partially instantiated patterns.
//!
//! # Example
//! ```
//! use termtrie::term::{Heap, Term};
//!
//! let t = Term::compound("f", vec![Term::var(7), Term::int(1), Term::var(7)]);
//! let mut heap = Heap::new();
//! let addr = heap.put_term(&t).unwrap();
//! assert_eq!(heap.read_term(addr), t.canonical());
//! ```

mod heap;

pub use heap::{Addr, Cell, Heap, HeapMark, HeapOverflow};

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Name and arity of a compound term
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Functor {
    pub name: Arc<str>,
    pub arity: u32,
}

impl Functor {
    pub fn new(name: impl Into<Arc<str>>, arity: u32) -> Self {
        Functor {
            name: name.into(),
            arity,
        }
    }
}

impl fmt::Display for Functor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

/// An owned structured value
///
/// Variables are identified by number: two `Var(n)` with the same `n` inside one
/// term denote the same variable.
///
/// Cloning, dropping, comparison, hashing and `Display` run on an explicit
/// stack, so nesting depth is bounded by memory rather than the thread stack.
/// The derived `Debug` is recursive.
#[derive(Debug)]
pub enum Term {
    /// A variable
    Var(u32),
    /// A symbolic constant
    Atom(Arc<str>),
    /// An integer
    Int(i64),
    /// A floating point number
    Float(f64),
    /// A string blob
    Text(Arc<str>),
    /// A compound term: name and arguments
    Compound(Arc<str>, Vec<Term>),
}

impl Term {
    pub fn var(id: u32) -> Self {
        Term::Var(id)
    }

    pub fn atom(name: &str) -> Self {
        Term::Atom(Arc::from(name))
    }

    pub fn int(value: i64) -> Self {
        Term::Int(value)
    }

    pub fn float(value: f64) -> Self {
        Term::Float(value)
    }

    pub fn text(value: &str) -> Self {
        Term::Text(Arc::from(value))
    }

    pub fn compound(name: &str, args: Vec<Term>) -> Self {
        Term::Compound(Arc::from(name), args)
    }

    /// True for anything that is neither a variable nor a compound
    pub fn is_atomic(&self) -> bool {
        !matches!(self, Term::Var(_) | Term::Compound(..))
    }

    /// True if the term contains no variables
    pub fn is_ground(&self) -> bool {
        let mut todo = vec![self];
        while let Some(term) = todo.pop() {
            match term {
                Term::Var(_) => return false,
                Term::Compound(_, args) => todo.extend(args.iter()),
                _ => {}
            }
        }
        true
    }

    /// Renumber variables 0, 1, 2, ... in depth-first, left-to-right order of
    /// first occurrence.
    ///
    /// Two terms are variants of each other iff their canonical forms are equal.
    pub fn canonical(&self) -> Term {
        let mut map: HashMap<u32, u32> = HashMap::new();
        self.rebuild(|id| {
            let next = map.len() as u32;
            *map.entry(id).or_insert(next)
        })
    }

    /// Copy of the term with every variable passed through `var`, visiting
    /// variables left to right
    fn rebuild(&self, mut var: impl FnMut(u32) -> u32) -> Term {
        enum Step<'a> {
            Visit(&'a Term),
            Close(&'a Arc<str>, usize),
        }

        let mut out: Vec<Term> = Vec::new();
        let mut todo = vec![Step::Visit(self)];
        while let Some(step) = todo.pop() {
            match step {
                Step::Visit(term) => match term {
                    Term::Var(id) => out.push(Term::Var(var(*id))),
                    Term::Atom(name) => out.push(Term::Atom(Arc::clone(name))),
                    Term::Int(value) => out.push(Term::Int(*value)),
                    Term::Float(value) => out.push(Term::Float(*value)),
                    Term::Text(text) => out.push(Term::Text(Arc::clone(text))),
                    Term::Compound(name, args) => {
                        todo.push(Step::Close(name, args.len()));
                        todo.extend(args.iter().rev().map(Step::Visit));
                    }
                },
                Step::Close(name, arity) => {
                    let args = out.split_off(out.len() - arity);
                    out.push(Term::Compound(Arc::clone(name), args));
                }
            }
        }
        // The root's own step always leaves exactly one term behind
        out.pop().unwrap_or(Term::Int(0))
    }

    /// Variant check: equal up to consistent renaming of variables
    pub fn is_variant(&self, other: &Term) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Clone for Term {
    fn clone(&self) -> Self {
        self.rebuild(|id| id)
    }
}

impl Drop for Term {
    fn drop(&mut self) {
        let Term::Compound(_, args) = self else {
            return;
        };
        let shallow = args
            .iter()
            .all(|arg| !matches!(arg, Term::Compound(_, inner) if !inner.is_empty()));
        if shallow {
            return;
        }
        // Children are moved out before their parent is dropped, so each
        // drop below sees an empty argument list
        let mut pending = std::mem::take(args);
        while let Some(mut term) = pending.pop() {
            if let Term::Compound(_, inner) = &mut term {
                pending.append(inner);
            }
        }
    }
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        let mut todo = vec![(self, other)];
        while let Some(pair) = todo.pop() {
            let same = match pair {
                (Term::Var(a), Term::Var(b)) => a == b,
                (Term::Atom(a), Term::Atom(b)) => a == b,
                (Term::Int(a), Term::Int(b)) => a == b,
                // Bitwise so that Eq and Hash agree
                (Term::Float(a), Term::Float(b)) => a.to_bits() == b.to_bits(),
                (Term::Text(a), Term::Text(b)) => a == b,
                (Term::Compound(f, xs), Term::Compound(g, ys)) => {
                    let heads = f == g && xs.len() == ys.len();
                    if heads {
                        todo.extend(xs.iter().zip(ys.iter()));
                    }
                    heads
                }
                _ => false,
            };
            if !same {
                return false;
            }
        }
        true
    }
}

impl Eq for Term {}

impl Hash for Term {
    /// Hashes the preorder sequence of nodes; arities make it unambiguous
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut todo = vec![self];
        while let Some(term) = todo.pop() {
            std::mem::discriminant(term).hash(state);
            match term {
                Term::Var(id) => id.hash(state),
                Term::Atom(name) | Term::Text(name) => name.hash(state),
                Term::Int(value) => value.hash(state),
                Term::Float(value) => value.to_bits().hash(state),
                Term::Compound(name, args) => {
                    name.hash(state);
                    args.len().hash(state);
                    todo.extend(args.iter().rev());
                }
            }
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        enum Piece<'a> {
            Term(&'a Term),
            Punct(&'static str),
        }

        let mut todo = vec![Piece::Term(self)];
        while let Some(piece) = todo.pop() {
            let term = match piece {
                Piece::Punct(text) => {
                    f.write_str(text)?;
                    continue;
                }
                Piece::Term(term) => term,
            };
            match term {
                Term::Var(id) => write!(f, "_G{}", id)?,
                Term::Atom(name) => write!(f, "{}", name)?,
                Term::Int(value) => write!(f, "{}", value)?,
                Term::Float(value) => write!(f, "{:?}", value)?,
                Term::Text(text) => write!(f, "{:?}", text)?,
                Term::Compound(name, args) => {
                    write!(f, "{}(", name)?;
                    todo.push(Piece::Punct(")"));
                    for (i, arg) in args.iter().enumerate().rev() {
                        todo.push(Piece::Term(arg));
                        if i > 0 {
                            todo.push(Piece::Punct(","));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl From<i64> for Term {
    fn from(value: i64) -> Self {
        Term::Int(value)
    }
}

impl From<&str> for Term {
    fn from(name: &str) -> Self {
        Term::atom(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_renumbers_by_first_occurrence() {
        let t = Term::compound("f", vec![Term::var(9), Term::var(3), Term::var(9)]);
        let expected = Term::compound("f", vec![Term::var(0), Term::var(1), Term::var(0)]);
        assert_eq!(t.canonical(), expected);
    }

    #[test]
    fn test_variant_detection() {
        let a = Term::compound("g", vec![Term::var(1), Term::var(2)]);
        let b = Term::compound("g", vec![Term::var(5), Term::var(4)]);
        let c = Term::compound("g", vec![Term::var(5), Term::var(5)]);
        assert!(a.is_variant(&b));
        assert!(!a.is_variant(&c));
    }

    #[test]
    fn test_display() {
        let t = Term::compound(
            "point",
            vec![Term::int(1), Term::text("x"), Term::var(0), Term::atom("nil")],
        );
        assert_eq!(t.to_string(), "point(1,\"x\",_G0,nil)");
    }

    #[test]
    fn test_ground_and_atomic() {
        assert!(Term::float(1.5).is_atomic());
        assert!(!Term::compound("f", vec![]).is_atomic());
        assert!(Term::compound("f", vec![Term::atom("a")]).is_ground());
        assert!(!Term::compound("f", vec![Term::var(0)]).is_ground());
    }

    /// `cons(N, cons(N-1, ... cons(1, tail)))`
    fn deep_list(depth: i64, tail: Term) -> Term {
        (1..=depth).fold(tail, |acc, i| Term::compound("cons", vec![Term::int(i), acc]))
    }

    #[test]
    fn test_deep_terms_use_bounded_stack() {
        use std::collections::hash_map::DefaultHasher;

        let depth = 200_000;
        let open = deep_list(depth, Term::var(42));
        let renamed = deep_list(depth, Term::var(7));

        assert!(!open.is_ground());
        assert!(open.is_variant(&renamed));
        assert_ne!(open, renamed);

        let canonical = open.canonical();
        assert_eq!(canonical, renamed.canonical());
        let copy = canonical.clone();
        assert_eq!(copy, canonical);

        let hash = |t: &Term| {
            let mut hasher = DefaultHasher::new();
            t.hash(&mut hasher);
            hasher.finish()
        };
        assert_eq!(hash(&copy), hash(&canonical));
        assert!(open.to_string().ends_with("_G42))"));
        // All five dropped here
    }

    #[test]
    fn test_hash_distinguishes_nesting() {
        use std::collections::hash_map::DefaultHasher;

        let hash = |t: &Term| {
            let mut hasher = DefaultHasher::new();
            t.hash(&mut hasher);
            hasher.finish()
        };
        // Same preorder atoms, different shapes
        let a = Term::compound("f", vec![Term::compound("f", vec![Term::atom("a")]), Term::atom("b")]);
        let b = Term::compound("f", vec![Term::compound("f", vec![Term::atom("a"), Term::atom("b")])]);
        assert_ne!(a, b);
        assert_ne!(hash(&a), hash(&b));
    }
}
