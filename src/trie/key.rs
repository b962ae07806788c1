//! Edge labels of the trie.

use crate::indirect::IndirectId;
use crate::symbol::Symbol;

/// Integers in this many bits (two's complement) are stored inline in a key
pub const INLINE_INT_BITS: u32 = 56;

/// True if `value` fits an inline integer key
#[inline]
pub fn is_inline_int(value: i64) -> bool {
    let limit = 1i64 << (INLINE_INT_BITS - 1);
    (-limit..limit).contains(&value)
}

/// One token of a linearized term
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Key {
    /// Atom
    Atom(Symbol),
    /// Small integer
    Int(i64),
    /// Opens a compound of the given name and arity
    Functor(Symbol, u32),
    /// The n-th distinct variable of the key, counting from 1
    Var(u32),
    /// Surrogate for an oversized atomic value
    Indirect(IndirectId),
    /// Closes the innermost open compound
    Pop,
    /// Marks a path that is being torn down after a failed insertion
    Error,
}

impl Key {
    #[inline]
    pub(crate) fn is_var(&self) -> bool {
        matches!(self, Key::Var(_))
    }

    /// Symbol whose reference count this key holds while it labels a node
    #[inline]
    pub(crate) fn symbol(&self) -> Option<Symbol> {
        match self {
            Key::Atom(symbol) | Key::Functor(symbol, _) => Some(*symbol),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_int_bounds() {
        assert!(is_inline_int(0));
        assert!(is_inline_int(-(1 << 55)));
        assert!(is_inline_int((1 << 55) - 1));
        assert!(!is_inline_int(1 << 55));
        assert!(!is_inline_int(i64::MIN));
    }
}
