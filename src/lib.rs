/// termtrie - Concurrent Term Trie Library
///
/// This library stores structured terms as keys of a prefix-sharing trie,
/// mapping each key (up to consistent renaming of its variables) to a value.
/// It is the answer-table layer of a tabling engine: many threads insert,
/// look up, delete and enumerate concurrently, and enumeration unifies
/// stored keys against a caller's pattern.
///
/// # Architecture
///
/// 1. **Host terms** (`term` module)
///    - `Term`: owned tree form of a structured value
///    - `Heap`: cell store where keys are read and rebuilt, with a binding
///      trail, soft capacity and growth
///
/// 2. **Interning** (`symbol`, `indirect` modules)
///    - Atoms and functor names become small `Symbol`s
///    - Big integers, floats and text become `IndirectId` surrogates
///
/// 3. **Trie** (`trie` module)
///    - Keys are linearized into tokens; each token labels one edge
///    - Child sets are published by compare-and-swap
///    - Deleting with pruning unlinks the branch a key no longer needs
///    - Enumeration backtracks over a choice-point stack
///
/// # Example
///
/// ```rust
/// use termtrie::{InsertMode, InsertOutcome, Term, TrieHandle};
///
/// let trie = TrieHandle::new();
/// let key = Term::compound("f", vec![Term::var(0), Term::int(1)]);
///
/// let outcome = trie.insert_term(&key, &Term::atom("a"), InsertMode::Strict).unwrap();
/// assert_eq!(outcome, InsertOutcome::Inserted);
///
/// // Variable names do not matter, only their pattern
/// let variant = Term::compound("f", vec![Term::var(7), Term::int(1)]);
/// assert_eq!(trie.lookup_term(&variant).unwrap(), Some(Term::atom("a")));
///
/// for entry in trie.enumerate().unwrap() {
///     let entry = entry.unwrap();
///     println!("{} -> {}", entry.key, entry.value);
/// }
/// ```
///
/// # Logging
///
/// Diagnostics go through `tracing` under the `termtrie::*` targets
/// (`trie`, `children`, `prune`, `decode`, `enumerate`).

pub mod config;
pub mod errors;
pub mod indirect;
pub mod symbol;
pub mod term;
pub mod trie;

pub use config::TrieConfig;
pub use errors::{Resource, TrieError, TrieResult};
pub use term::{Addr, Cell, Functor, Heap, HeapMark, Term};
pub use trie::{
    AllocationPool, EnumState, Enumerator, InsertMode, InsertOutcome, NodeHandle, TrieCounters,
    TrieEntry, TrieFlags, TrieHandle, TrieStatistics,
};
