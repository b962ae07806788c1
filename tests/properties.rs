//! Property tests: the trie against a model map keyed by canonical terms

mod common;

use std::collections::HashMap;

use proptest::prelude::*;

use termtrie::{InsertMode, InsertOutcome, Term, TrieHandle};

fn leaf_strategy() -> impl Strategy<Value = Term> + Clone {
    prop_oneof![
        4 => prop::sample::select(vec!["a", "b", "c", "nil"]).prop_map(Term::atom),
        3 => (-50i64..50).prop_map(Term::int),
        1 => prop_oneof![Just(i64::MAX), Just(i64::MIN), Just(1i64 << 60)].prop_map(Term::int),
        1 => prop::num::f64::NORMAL.prop_map(Term::float),
        1 => "[a-z]{0,6}".prop_map(|s| Term::text(&s)),
        3 => (0u32..4).prop_map(Term::var),
    ]
}

fn term_strategy() -> BoxedStrategy<Term> {
    leaf_strategy().prop_recursive(4, 24, 3, |inner| {
        (
            prop::sample::select(vec!["f", "g", "pair"]),
            prop::collection::vec(inner, 1..=3),
        )
            .prop_map(|(name, args)| Term::compound(name, args))
    })
    .boxed()
}

/// Rename every variable so the result is a variant of the input
fn rename(term: &Term, offset: u32) -> Term {
    match term {
        Term::Var(id) => Term::var(id * 3 + offset),
        Term::Compound(name, args) => Term::compound(
            name,
            args.iter().map(|arg| rename(arg, offset)).collect(),
        ),
        other => other.clone(),
    }
}

#[derive(Clone, Debug)]
enum Op {
    Insert(Term, i64),
    Delete(Term, bool),
    Lookup(Term),
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op>> {
    let key = term_strategy();
    let op = prop_oneof![
        50 => (key.clone(), -5i64..5).prop_map(|(k, v)| Op::Insert(k, v)),
        25 => (key.clone(), any::<bool>()).prop_map(|(k, prune)| Op::Delete(k, prune)),
        25 => key.prop_map(Op::Lookup),
    ];
    prop::collection::vec(op, 0..=120)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_reconstruct_is_variant(key in term_strategy()) {
        let trie = TrieHandle::new();
        let (_, node) = trie.insert_term_with_node(&key, &Term::atom("v"), InsertMode::Strict).unwrap();
        let rebuilt = node.reconstruct().unwrap();
        prop_assert!(rebuilt.is_variant(&key), "{} is not a variant of {}", rebuilt, key);
        prop_assert_eq!(node.is_ground(), key.is_ground());
    }

    #[test]
    fn prop_variants_share_a_leaf(key in term_strategy()) {
        let trie = TrieHandle::new();
        trie.insert_term(&key, &Term::int(1), InsertMode::Strict).unwrap();
        let nodes = trie.node_count();

        let variant = rename(&key, 1);
        prop_assert_eq!(trie.lookup_term(&variant).unwrap(), Some(Term::int(1)));
        prop_assert_eq!(
            trie.insert_term(&variant, &Term::int(1), InsertMode::Strict).unwrap(),
            InsertOutcome::Unchanged
        );
        prop_assert_eq!(trie.node_count(), nodes);

        let first = trie.lookup_node_term(&key).unwrap().unwrap();
        let second = trie.lookup_node_term(&variant).unwrap().unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_equivalence_with_model(ops in ops_strategy()) {
        let trie = TrieHandle::new();
        let mut model: HashMap<Term, i64> = HashMap::new();

        for op in ops {
            match op {
                Op::Insert(key, value) => {
                    let outcome = trie.insert_term(&key, &Term::int(value), InsertMode::Update).unwrap();
                    let expected = match model.insert(key.canonical(), value) {
                        None => InsertOutcome::Inserted,
                        Some(old) if old == value => InsertOutcome::Unchanged,
                        Some(_) => InsertOutcome::Updated,
                    };
                    prop_assert_eq!(outcome, expected);
                }
                Op::Delete(key, prune) => {
                    let removed = trie.delete_term(&key, prune).unwrap();
                    let expected = model.remove(&key.canonical()).map(Term::int);
                    prop_assert_eq!(removed, expected);
                }
                Op::Lookup(key) => {
                    let found = trie.lookup_term(&key).unwrap();
                    let expected = model.get(&key.canonical()).copied().map(Term::int);
                    prop_assert_eq!(found, expected);
                }
            }
            prop_assert_eq!(trie.value_count(), model.len());
        }

        let expected: std::collections::HashSet<(Term, Term)> = model
            .iter()
            .map(|(key, value)| (key.clone(), Term::int(*value)))
            .collect();
        prop_assert_eq!(common::entries(&trie), expected);

        let stats = trie.statistics().unwrap();
        prop_assert_eq!(stats.nodes, trie.node_count());
        prop_assert_eq!(stats.values, model.len());
    }

    #[test]
    fn prop_prune_all_returns_to_empty(keys in prop::collection::vec(term_strategy(), 1..40)) {
        let trie = TrieHandle::new();
        for (i, key) in keys.iter().enumerate() {
            trie.insert_term(key, &Term::int(i as i64), InsertMode::Update).unwrap();
        }
        for key in &keys {
            trie.delete_term(key, true).unwrap();
        }
        prop_assert_eq!(trie.value_count(), 0);
        prop_assert_eq!(trie.node_count(), 0);
        prop_assert!(common::entries(&trie).is_empty());
    }
}
