/// Shared helpers for termtrie integration tests
///
/// Provides term builders, a tracing initializer and helpers that collect
/// enumeration output into comparable sets.
use std::collections::HashSet;

use termtrie::{Term, TrieHandle};

/// Install a test subscriber once per binary; later calls are no-ops
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_test_writer()
        .try_init();
}

/// `name(args...)`
#[allow(dead_code)]
pub fn app(name: &str, args: Vec<Term>) -> Term {
    Term::compound(name, args)
}

/// `f(a, b)`
#[allow(dead_code)]
pub fn f2(a: Term, b: Term) -> Term {
    app("f", vec![a, b])
}

/// A ground key unique to `i`
#[allow(dead_code)]
pub fn numbered_key(i: i64) -> Term {
    app("key", vec![Term::int(i % 7), app("n", vec![Term::int(i)])])
}

/// Every (key, value) pair the trie yields, keys in canonical form
pub fn entries(trie: &TrieHandle) -> HashSet<(Term, Term)> {
    trie.enumerate()
        .expect("trie should be valid")
        .map(|entry| {
            let entry = entry.expect("enumeration should not fail");
            (entry.key.canonical(), entry.value)
        })
        .collect()
}
