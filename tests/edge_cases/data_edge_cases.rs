use crate::common::{ident, TestFixture, LOADED_AT};
use dataspy::cli::Tier;
use dataspy::DataSpyError;

#[test]
fn test_empty_tables_on_both_sides() {
    let fixture = TestFixture::new().unwrap();
    fixture.seed_keyed_table("fct_empty", &[], &[]).unwrap();
    fixture.audit_columns("fct_empty", &["amount"]).unwrap();

    let report = fixture.run(Tier::All).unwrap();
    assert!(!report.has_failures(), "failures: {:?}", report.failures);

    let summary = &report.summary[0];
    assert_eq!(summary.rowcount_dev, 0);
    assert_eq!(summary.rowcount_prod, 0);
    assert_eq!(summary.rowcount_diff_pct, None);
    assert_eq!(summary.distinct_pkey_diff_pct, None);

    // Every planned statistic is kept even when it is NULL on both sides
    assert_eq!(report.column_level.len(), 5);
    let avg = &report.column_level[0];
    assert_eq!(avg.test_name, "avg");
    assert_eq!(avg.dev_value, None);
    assert_eq!(avg.prod_value, None);
    assert_eq!(avg.diff, None);

    let row = &report.row_level[0];
    assert_eq!(row.total(), 0);
    assert!(!row.has_changes());
}

#[test]
fn test_null_statistics_are_reported() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .create_table_pair("fct_sparse", "id INTEGER, note VARCHAR, loaded_at DATE")
        .unwrap();
    fixture.register_model("fct_sparse", "id", "loaded_at").unwrap();
    fixture.audit_columns("fct_sparse", &["note"]).unwrap();

    let rows = format!(
        "(1, NULL, DATE '{d}'), (2, NULL, DATE '{d}')",
        d = LOADED_AT
    );
    fixture.insert_dev("fct_sparse", &rows).unwrap();
    fixture.insert_prod("fct_sparse", &rows).unwrap();

    let records = fixture
        .engine()
        .unwrap()
        .column_diff_for_table(&ident("fct_sparse"))
        .unwrap();

    let tests: Vec<&str> = records.iter().map(|r| r.test_name.as_str()).collect();
    assert_eq!(tests, vec!["count_nulls", "unique"]);

    let nulls = &records[0];
    assert_eq!(nulls.dev_value.as_deref(), Some("2"));
    assert_eq!(nulls.prod_value.as_deref(), Some("2"));
    assert_eq!(nulls.diff, Some(0.0));

    let unique = &records[1];
    assert_eq!(unique.dev_value.as_deref(), Some("0"));
    assert_eq!(unique.diff, None);
}

#[test]
fn test_unsupported_column_type_fails_table() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .create_table_pair("fct_blobs", "id INTEGER, payload BLOB, loaded_at DATE")
        .unwrap();
    fixture.register_model("fct_blobs", "id", "loaded_at").unwrap();
    fixture.audit_columns("fct_blobs", &["payload"]).unwrap();

    let err = fixture
        .engine()
        .unwrap()
        .column_diff_for_table(&ident("fct_blobs"))
        .unwrap_err();

    match err {
        DataSpyError::UnknownType { column, raw_type, .. } => {
            assert_eq!(column, "payload");
            assert_eq!(raw_type, "BLOB");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_tables_only_on_one_side_are_ignored() {
    let fixture = TestFixture::new().unwrap();
    fixture.seed_keyed_table("fct_orders", &[1], &[1]).unwrap();
    fixture
        .execute(&format!("CREATE TABLE {} (id INTEGER)", fixture.dev_table("fct_scratch")))
        .unwrap();
    fixture
        .execute(&format!("CREATE TABLE {} (id INTEGER)", fixture.prod_table("fct_legacy")))
        .unwrap();

    let tables = fixture.engine().unwrap().tables_to_compare().unwrap();
    let names: Vec<&str> = tables.iter().map(|t| t.as_str()).collect();
    assert_eq!(names, vec!["fct_orders"]);
}

#[test]
fn test_no_matching_tables() {
    let mut fixture = TestFixture::new().unwrap();
    fixture.seed_keyed_table("fct_orders", &[1], &[1]).unwrap();
    fixture.config.table_regex = "dim_.*".to_string();

    let err = fixture.run(Tier::All).unwrap_err();
    assert!(matches!(err, DataSpyError::EmptyComparisonSet { .. }));
}

#[test]
fn test_pattern_matches_whole_name_case_insensitively() {
    let mut fixture = TestFixture::new().unwrap();
    fixture.seed_keyed_table("fct_orders", &[1], &[1]).unwrap();
    fixture.seed_keyed_table("fct_orders_archive", &[1], &[1]).unwrap();
    fixture.config.table_regex = "FCT_ORDERS".to_string();

    let tables = fixture.engine().unwrap().tables_to_compare().unwrap();
    let names: Vec<&str> = tables.iter().map(|t| t.as_str()).collect();
    assert_eq!(names, vec!["fct_orders"]);
}
