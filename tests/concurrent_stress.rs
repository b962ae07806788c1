//! Concurrency stress tests
//!
//! Many threads insert, delete with pruning, look up and enumerate on the
//! same trie, on deliberately overlapping branches. The tests check that
//! nothing panics, every operation completes, and the node and value
//! counters agree with a full scan once the threads are done.

mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use itertools::Itertools;
use rayon::prelude::*;

use common::{app, entries, init_tracing, numbered_key};
use termtrie::{InsertMode, InsertOutcome, Term, TrieHandle};

const THREADS: usize = 8;

/// Keys that all share the `hot/2` prefix and collide in small groups
fn hot_key(group: i64, member: i64) -> Term {
    app("hot", vec![Term::int(group), app("m", vec![Term::int(member)])])
}

#[test]
fn test_insert_while_prune_same_branches() {
    init_tracing();
    let trie = TrieHandle::new();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let trie = trie.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for round in 0..300i64 {
                    let key = hot_key(round % 4, (round + t as i64) % 3);
                    if (round + t as i64) % 2 == 0 {
                        trie.insert_term(&key, &Term::int(t as i64), InsertMode::Update)
                            .unwrap();
                    } else {
                        trie.delete_term(&key, true).unwrap();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Counters agree with a full scan
    let stats = trie.statistics().unwrap();
    assert_eq!(stats.nodes, trie.node_count());
    assert_eq!(stats.values, trie.value_count());
    assert_eq!(entries(&trie).len(), trie.value_count());

    // Clearing every key returns the trie to empty
    for group in 0..4 {
        for member in 0..3 {
            trie.delete_term(&hot_key(group, member), true).unwrap();
        }
    }
    assert_eq!(trie.value_count(), 0);
    assert_eq!(trie.node_count(), 0);
}

#[test]
fn test_parallel_inserts_distinct_keys() {
    let trie = TrieHandle::new();
    let outcomes: Vec<InsertOutcome> = (0..2000i64)
        .into_par_iter()
        .map(|i| {
            trie.insert_term(&numbered_key(i), &Term::int(i), InsertMode::Strict)
                .unwrap()
        })
        .collect();

    assert!(outcomes.iter().all(|outcome| *outcome == InsertOutcome::Inserted));
    assert_eq!(trie.value_count(), 2000);
    for i in (0..2000i64).step_by(97) {
        assert_eq!(trie.lookup_term(&numbered_key(i)).unwrap(), Some(Term::int(i)));
    }
}

#[test]
fn test_parallel_same_key_single_winner() {
    let trie = TrieHandle::new();
    let key = app("only", vec![Term::var(0), Term::text("shared")]);

    let outcomes: Vec<InsertOutcome> = (0..64i64)
        .into_par_iter()
        .map(|i| trie.insert_term(&key, &Term::int(i), InsertMode::Strict).unwrap())
        .collect();

    let counts = outcomes.iter().copied().counts();
    assert_eq!(counts.get(&InsertOutcome::Inserted), Some(&1));
    assert_eq!(counts.get(&InsertOutcome::Updated), None);
    assert_eq!(trie.value_count(), 1);
}

#[test]
fn test_enumerate_during_mutation() {
    init_tracing();
    let trie = TrieHandle::new();
    for i in 0..200 {
        trie.insert_term(&numbered_key(i), &Term::int(i), InsertMode::Strict)
            .unwrap();
    }
    let stop = Arc::new(AtomicBool::new(false));

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let trie = trie.clone();
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut i = 0i64;
                while !stop.load(Ordering::Relaxed) {
                    let key = numbered_key(200 + (i * 4 + t) % 400);
                    if i % 3 == 0 {
                        trie.delete_term(&key, true).unwrap();
                    } else {
                        trie.insert_term(&key, &Term::int(i), InsertMode::Update)
                            .unwrap();
                    }
                    i += 1;
                }
            })
        })
        .collect();

    // Keys 0..200 are never touched by the writers and must always be seen
    let stable: HashSet<Term> = (0..200).map(numbered_key).collect();
    for _ in 0..20 {
        let seen = entries(&trie);
        let found = seen.iter().filter(|(key, _)| stable.contains(key)).count();
        assert_eq!(found, 200);
    }

    stop.store(true, Ordering::Relaxed);
    for writer in writers {
        writer.join().unwrap();
    }
    for i in 0..200 {
        assert_eq!(trie.lookup_term(&numbered_key(i)).unwrap(), Some(Term::int(i)));
    }
}

#[test]
fn test_destroy_under_load() {
    let trie = TrieHandle::new();
    let barrier = Arc::new(Barrier::new(THREADS + 1));

    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let trie = trie.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..500i64 {
                    // Operations either complete or see the trie destroyed
                    if trie
                        .insert_term(&numbered_key(i * THREADS as i64 + t as i64), &Term::int(i), InsertMode::Strict)
                        .is_err()
                    {
                        break;
                    }
                }
            })
        })
        .collect();

    barrier.wait();
    thread::sleep(std::time::Duration::from_millis(2));
    trie.destroy();
    for worker in workers {
        worker.join().unwrap();
    }

    assert!(!trie.is_valid());
    assert_eq!(trie.node_count(), 0);
    assert_eq!(trie.value_count(), 0);
}
