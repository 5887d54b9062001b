//! Record round-trip tests

use vecdb::{Metadata, MetadataValue, Record};

use super::{fresh, open};

fn tagged(tag: &str) -> Metadata {
    let mut m = Metadata::new();
    m.insert("tag".to_string(), MetadataValue::from(tag));
    m.insert("score".to_string(), MetadataValue::Number(0.5));
    m.insert("live".to_string(), MetadataValue::Bool(true));
    m
}

#[test]
fn inserted_record_reads_back_exactly() {
    let (_dir, db) = fresh();
    db.insert("docs", "a", vec![0.25, -1.5, 3.0], "first document", tagged("x"))
        .unwrap();

    let record = db.get("docs", "a").unwrap();
    assert_eq!(record.id, "a");
    assert_eq!(record.vector, vec![0.25, -1.5, 3.0]);
    assert_eq!(record.document, "first document");
    assert_eq!(record.metadata, tagged("x"));
}

#[test]
fn insert_overwrites_existing_id() {
    let (_dir, db) = fresh();
    db.insert("docs", "a", vec![1.0, 0.0], "old", tagged("old"))
        .unwrap();
    db.insert("docs", "a", vec![0.0, 1.0], "new", tagged("new"))
        .unwrap();

    assert_eq!(db.count("docs").unwrap(), 1);
    let record = db.get("docs", "a").unwrap();
    assert_eq!(record.document, "new");
    assert_eq!(record.vector, vec![0.0, 1.0]);

    // The index follows the overwrite
    let hit = db.query("docs", &[0.0, 1.0], 1).unwrap();
    assert_eq!(hit[0].id, "a");
    assert_eq!(hit[0].distance, 0.0);
}

#[test]
fn delete_removes_from_store_and_results() {
    let (_dir, db) = fresh();
    db.insert("docs", "a", vec![0.0, 0.0], "", Metadata::new()).unwrap();
    db.insert("docs", "b", vec![1.0, 1.0], "", Metadata::new()).unwrap();

    db.delete("docs", "a").unwrap();
    assert!(db.get("docs", "a").unwrap_err().is_not_found());
    assert!(db.delete("docs", "a").unwrap_err().is_not_found());

    let ids: Vec<String> = db
        .query("docs", &[0.0, 0.0], 10)
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec!["b"]);
}

#[test]
fn records_survive_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let records: Vec<Record> = (0..25)
        .map(|i| {
            Record::new(format!("id-{:03}", i), vec![i as f32, (i * 2) as f32], format!("doc {}", i))
                .with_metadata(tagged(&format!("t{}", i % 3)))
        })
        .collect();
    {
        let db = open(dir.path());
        assert_eq!(db.insert_batch("docs", records.clone()).unwrap(), 25);
        db.close().unwrap();
    }

    let db = open(dir.path());
    let scanned: Vec<Record> = db.scan("docs").unwrap().collect();
    assert_eq!(scanned, records);
}

#[test]
fn collections_are_isolated() {
    let (_dir, db) = fresh();
    db.insert("left", "same-id", vec![1.0], "left", Metadata::new())
        .unwrap();
    db.insert("right", "same-id", vec![1.0, 2.0, 3.0], "right", Metadata::new())
        .unwrap();

    assert_eq!(db.get("left", "same-id").unwrap().document, "left");
    assert_eq!(db.get("right", "same-id").unwrap().document, "right");
    db.drop_collection("left").unwrap();
    assert_eq!(db.get("right", "same-id").unwrap().vector.len(), 3);
}
