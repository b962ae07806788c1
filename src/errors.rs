//! Error kinds surfaced by trie operations.
//!
//! Not-found is deliberately *not* an error on the lookup/delete paths: those
//! return `Ok(None)`. [`TrieError::NotFound`] is reserved for node handles whose
//! node has been pruned away from the trie.

use std::fmt;

/// The resource that ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Reconstruction heap could not grow any further
    Memory,
    /// The allocation pool budget of the trie is exhausted
    TableSpace,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::TableSpace => write!(f, "table_space"),
        }
    }
}

/// Errors reported by trie operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrieError {
    /// The key contains an attributed variable
    ContainsUnresolvedPlaceholder,
    /// The key is a cyclic (rational) term
    CyclicValue,
    /// A resource limit was hit
    ResourceExhausted(Resource),
    /// Strict insertion found a different value already stored
    ValueConflict,
    /// The node behind a handle is no longer part of the trie
    NotFound,
    /// The trie was destroyed, or a node handle belongs to another trie
    InvalidHandle,
    /// A heap slot points at something that is not a term
    MalformedTerm(usize),
    /// Configuration could not be parsed
    InvalidConfig(String),
}

impl fmt::Display for TrieError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContainsUnresolvedPlaceholder => {
                write!(f, "Type error: key must be free of attributed variables")
            }
            Self::CyclicValue => write!(f, "Type error: key must be an acyclic term"),
            Self::ResourceExhausted(resource) => {
                write!(f, "Resource error: out of {}", resource)
            }
            Self::ValueConflict => {
                write!(f, "Permission error: key already holds a different value")
            }
            Self::NotFound => write!(f, "Existence error: trie node no longer exists"),
            Self::InvalidHandle => write!(f, "Existence error: invalid trie handle"),
            Self::MalformedTerm(addr) => write!(f, "Malformed term at heap address {}", addr),
            Self::InvalidConfig(msg) => write!(f, "Invalid trie configuration: {}", msg),
        }
    }
}

impl std::error::Error for TrieError {}

/// Result alias used throughout the crate
pub type TrieResult<T> = Result<T, TrieError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_resource() {
        let err = TrieError::ResourceExhausted(Resource::TableSpace);
        assert_eq!(err.to_string(), "Resource error: out of table_space");
    }

    #[test]
    fn test_is_std_error() {
        fn takes_error(_: &dyn std::error::Error) {}
        takes_error(&TrieError::CyclicValue);
    }
}
