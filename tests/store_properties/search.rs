//! Search result properties

use proptest::prelude::*;
use vecdb::{
    CollectionConfig, DistanceMetric, IndexKind, Metadata, NeighborResult, Record,
};

use super::fresh;

/// Reference answer: score every record, sort by (distance, id)
fn full_scan(records: &[Record], query: &[f32], metric: DistanceMetric, k: usize) -> Vec<String> {
    let mut scored: Vec<(f32, &str)> = records
        .iter()
        .map(|r| (metric_distance(metric, query, &r.vector), r.id.as_str()))
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(b.1)));
    scored.into_iter().take(k).map(|(_, id)| id.to_string()).collect()
}

fn metric_distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Euclidean => a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
        DistanceMetric::DotProduct => -a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
        DistanceMetric::Cosine => unreachable!("not used by these tests"),
    }
}

fn ids(results: &[NeighborResult]) -> Vec<String> {
    results.iter().map(|r| r.id.clone()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn exact_search_matches_full_scan(
        vectors in prop::collection::vec(prop::collection::vec(-100i32..100, 4), 1..40),
        query in prop::collection::vec(-100i32..100, 4),
        k in 1usize..50,
    ) {
        // Integer-valued coordinates keep distances exact, so ties are real ties
        let (_dir, db) = fresh();
        let records: Vec<Record> = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| Record::new(format!("r{:02}", i), v.iter().map(|&x| x as f32).collect(), ""))
            .collect();
        db.insert_batch("p", records.clone()).unwrap();

        let query: Vec<f32> = query.iter().map(|&x| x as f32).collect();
        let results = db.query("p", &query, k).unwrap();

        prop_assert_eq!(results.len(), k.min(records.len()));
        prop_assert_eq!(ids(&results), full_scan(&records, &query, DistanceMetric::Euclidean, k));
    }
}

#[test]
fn results_are_sorted_with_id_tie_break() {
    let (_dir, db) = fresh();
    for id in ["d", "b", "c", "a"] {
        db.insert("ties", id, vec![1.0, 1.0], "", Metadata::new()).unwrap();
    }
    db.insert("ties", "far", vec![9.0, 9.0], "", Metadata::new()).unwrap();

    let results = db.query("ties", &[1.0, 1.0], 5).unwrap();
    assert_eq!(ids(&results), vec!["a", "b", "c", "d", "far"]);
}

#[test]
fn k_larger_than_collection_is_clamped() {
    let (_dir, db) = fresh();
    for i in 0..3 {
        db.insert("small", &format!("r{}", i), vec![i as f32], "", Metadata::new())
            .unwrap();
    }
    assert_eq!(db.query("small", &[0.0], 1000).unwrap().len(), 3);
    assert_eq!(db.query("small", &[0.0], 20_000).unwrap().len(), 3);
}

#[test]
fn huge_k_on_approximate_collection_returns_every_record() {
    let (_dir, db) = fresh();
    db.create_collection("ann", CollectionConfig::new(DistanceMetric::Euclidean, IndexKind::Approximate))
        .unwrap();
    for i in 0..3 {
        db.insert("ann", &format!("r{}", i), vec![i as f32, 1.0], "", Metadata::new())
            .unwrap();
    }
    let ids: Vec<String> = db
        .query("ann", &[0.0, 1.0], 20_000)
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec!["r0", "r1", "r2"]);
}

#[test]
fn dot_product_prefers_larger_inner_product() {
    let (_dir, db) = fresh();
    db.create_collection("dot", CollectionConfig::new(DistanceMetric::DotProduct, IndexKind::Exact))
        .unwrap();
    let records = vec![
        Record::new("small", vec![1.0, 0.0], ""),
        Record::new("big", vec![5.0, 0.0], ""),
        Record::new("opposite", vec![-3.0, 0.0], ""),
    ];
    db.insert_batch("dot", records.clone()).unwrap();

    let results = db.query("dot", &[1.0, 0.0], 3).unwrap();
    assert_eq!(ids(&results), full_scan(&records, &[1.0, 0.0], DistanceMetric::DotProduct, 3));
    assert_eq!(results[0].id, "big");
}

#[test]
fn approximate_collection_finds_exact_match() {
    let (_dir, db) = fresh();
    db.create_collection("ann", CollectionConfig::new(DistanceMetric::Euclidean, IndexKind::Approximate))
        .unwrap();
    let records: Vec<Record> = (0..200)
        .map(|i| {
            let x = i as f32;
            Record::new(format!("r{:03}", i), vec![x.sin(), x.cos(), x / 200.0], "")
        })
        .collect();
    db.insert_batch("ann", records.clone()).unwrap();

    let target = &records[123];
    let results = db.query("ann", &target.vector, 5).unwrap();
    assert_eq!(results[0].id, "r123");
    assert_eq!(results[0].distance, 0.0);
    assert!(results.len() <= 5);
}
