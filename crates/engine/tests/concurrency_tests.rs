//! Concurrency Tests
//!
//! Many threads against one database:
//! - N concurrent inserts all land, and all survive a reopen
//! - first-use creation of one collection from many threads yields one
//!   collection
//! - queries running beside writers always see a consistent state

use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use std::thread;

use tempfile::TempDir;
use vecdb_engine::{CollectionConfig, DbConfig, DistanceMetric, IndexKind, Metadata, VectorDb};

/// Every id a full-width exact query returns, checked for duplicates
fn queried_ids(db: &VectorDb, collection: &str, k: usize) -> BTreeSet<String> {
    let results = db.query(collection, &[0.0, 0.0], k).unwrap();
    let ids: BTreeSet<String> = results.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids.len(), results.len(), "duplicate ids in query result");
    ids
}

const THREADS: usize = 8;
const PER_THREAD: usize = 50;

#[test]
fn test_concurrent_inserts_all_land() {
    let temp_dir = TempDir::new().unwrap();
    let db = VectorDb::open_with(temp_dir.path(), DbConfig::for_testing()).unwrap();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let db = Arc::clone(&db);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_THREAD {
                    db.insert(
                        "shared",
                        &format!("t{}-{}", t, i),
                        vec![t as f32, i as f32],
                        "",
                        Metadata::new(),
                    )
                    .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let expected: BTreeSet<String> = (0..THREADS)
        .flat_map(|t| (0..PER_THREAD).map(move |i| format!("t{}-{}", t, i)))
        .collect();
    let total = THREADS * PER_THREAD;

    assert_eq!(db.count("shared").unwrap(), total);
    assert_eq!(queried_ids(&db, "shared", total), expected);
    assert_eq!(db.list_collections().unwrap().len(), 1);
    db.close().unwrap();
    drop(db);

    let db = VectorDb::open_with(temp_dir.path(), DbConfig::for_testing()).unwrap();
    assert_eq!(db.count("shared").unwrap(), total);
    assert_eq!(queried_ids(&db, "shared", total), expected);
    let hit = db.query("shared", &[3.0, 7.0], 1).unwrap();
    assert_eq!(hit[0].id, "t3-7");
    assert_eq!(hit[0].distance, 0.0);
}

#[test]
fn test_concurrent_first_use_creates_one_collection() {
    let temp_dir = TempDir::new().unwrap();
    let db = VectorDb::open_with(temp_dir.path(), DbConfig::for_testing()).unwrap();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let db = Arc::clone(&db);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                if t % 2 == 0 {
                    db.query("lazy", &[1.0, 1.0, 1.0], 5).unwrap();
                } else {
                    db.insert("lazy", &format!("t{}", t), vec![t as f32; 3], "", Metadata::new())
                        .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let infos = db.list_collections().unwrap();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].count, THREADS / 2);
    assert_eq!(infos[0].config.dimension, Some(3));
}

#[test]
fn test_queries_alongside_writers() {
    let temp_dir = TempDir::new().unwrap();
    let db = VectorDb::open_with(temp_dir.path(), DbConfig::for_testing()).unwrap();
    db.create_collection(
        "ann",
        CollectionConfig::new(DistanceMetric::Cosine, IndexKind::Approximate).with_dimension(4),
    )
    .unwrap();
    db.insert("ann", "seed", vec![1.0, 0.0, 0.0, 0.0], "", Metadata::new())
        .unwrap();

    let barrier = Arc::new(Barrier::new(4));
    let mut handles = Vec::new();
    for w in 0..2 {
        let db = Arc::clone(&db);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for i in 0..100 {
                let x = (i as f32 + 1.0) / 100.0;
                db.insert("ann", &format!("w{}-{}", w, i), vec![x, 1.0 - x, w as f32, 0.5], "", Metadata::new())
                    .unwrap();
                if i % 10 == 0 {
                    db.delete("ann", &format!("w{}-{}", w, i)).unwrap();
                }
            }
        }));
    }
    for _ in 0..2 {
        let db = Arc::clone(&db);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            for _ in 0..100 {
                let results = db.query("ann", &[1.0, 0.0, 0.0, 0.0], 10).unwrap();
                assert!(!results.is_empty());
                assert!(results.len() <= 10);
                assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(db.count("ann").unwrap(), 1 + 2 * 90);
}
