//! Input validation and dimension enforcement

use vecdb::{CollectionConfig, DistanceMetric, ErrorKind, IndexKind, Metadata, VectorError};

use super::fresh;

#[test]
fn first_insert_fixes_dimension() {
    let (_dir, db) = fresh();
    db.insert("docs", "a", vec![1.0, 2.0, 3.0], "", Metadata::new())
        .unwrap();

    let err = db
        .insert("docs", "b", vec![1.0, 2.0], "", Metadata::new())
        .unwrap_err();
    assert!(matches!(err, VectorError::DimensionMismatch { expected: 3, got: 2 }));
    assert_eq!(db.count("docs").unwrap(), 1);

    let err = db.query("docs", &[1.0], 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
}

#[test]
fn declared_dimension_is_enforced_before_first_insert() {
    let (_dir, db) = fresh();
    db.create_collection("fixed", CollectionConfig::default().with_dimension(4))
        .unwrap();
    let err = db
        .insert("fixed", "a", vec![1.0; 3], "", Metadata::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
}

#[test]
fn batch_with_bad_record_writes_nothing() {
    let (_dir, db) = fresh();
    let records = vec![
        vecdb::Record::new("ok", vec![1.0, 1.0], ""),
        vecdb::Record::new("bad", vec![f32::INFINITY, 1.0], ""),
    ];
    assert_eq!(
        db.insert_batch("docs", records).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
    assert_eq!(db.count("docs").unwrap(), 0);
}

#[test]
fn invalid_inputs_are_rejected() {
    let (_dir, db) = fresh();
    let kind = |r: Result<(), VectorError>| r.unwrap_err().kind();

    assert_eq!(
        kind(db.insert("docs", "", vec![1.0], "", Metadata::new())),
        ErrorKind::InvalidArgument
    );
    assert_eq!(
        kind(db.insert("docs", "a", vec![], "", Metadata::new())),
        ErrorKind::InvalidArgument
    );
    assert_eq!(
        kind(db.insert("docs", "a", vec![f32::NAN], "", Metadata::new())),
        ErrorKind::InvalidArgument
    );
    assert_eq!(
        kind(db.insert("bad/name", "a", vec![1.0], "", Metadata::new())),
        ErrorKind::InvalidArgument
    );

    db.insert("docs", "a", vec![1.0], "", Metadata::new()).unwrap();
    assert_eq!(
        db.query("docs", &[1.0], 0).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
}

#[test]
fn incompatible_create_is_a_config_mismatch() {
    let (_dir, db) = fresh();
    let config = CollectionConfig::new(DistanceMetric::Cosine, IndexKind::Exact).with_dimension(8);
    db.create_collection("docs", config.clone()).unwrap();
    db.create_collection("docs", config).unwrap();

    let err = db
        .create_collection("docs", CollectionConfig::new(DistanceMetric::Euclidean, IndexKind::Exact))
        .err()
        .unwrap();
    assert!(matches!(err, VectorError::ConfigMismatch { .. }));
}
