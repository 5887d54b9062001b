//! Parallel writers through one database handle

use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use std::thread;

use vecdb::{Metadata, VectorDb};

use super::{fresh, open};

fn all_ids(db: &VectorDb, k: usize) -> BTreeSet<String> {
    let results = db.query("parallel", &[0.0, 0.0], k).unwrap();
    let ids: BTreeSet<String> = results.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids.len(), results.len());
    ids
}

#[test]
fn concurrent_inserts_are_all_visible_and_durable() {
    const THREADS: usize = 6;
    const PER_THREAD: usize = 40;

    let (dir, db) = fresh();
    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let db = Arc::clone(&db);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_THREAD {
                    let id = format!("{}:{}", t, i);
                    db.insert("parallel", &id, vec![t as f32, i as f32], &id, Metadata::new())
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let total = THREADS * PER_THREAD;
    let expected: BTreeSet<String> = (0..THREADS)
        .flat_map(|t| (0..PER_THREAD).map(move |i| format!("{}:{}", t, i)))
        .collect();

    assert_eq!(db.count("parallel").unwrap(), total);
    assert_eq!(all_ids(&db, total), expected);
    db.close().unwrap();
    drop(db);

    let db = open(dir.path());
    assert_eq!(db.count("parallel").unwrap(), total);
    assert_eq!(all_ids(&db, total), expected);
    for t in 0..THREADS {
        for i in 0..PER_THREAD {
            let id = format!("{}:{}", t, i);
            assert_eq!(db.get("parallel", &id).unwrap().document, id);
        }
    }
}
