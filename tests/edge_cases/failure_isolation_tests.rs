use crate::common::{ident, TestFixture};
use dataspy::cli::Tier;
use dataspy::{CancelFlag, DataSpyError, DiffEngine};

#[test]
fn test_missing_metadata_fails_only_that_table() {
    let fixture = TestFixture::new().unwrap();
    fixture.seed_keyed_table("fct_orders", &[1, 2], &[1, 2]).unwrap();
    fixture
        .create_table_pair("fct_undeclared", "id INTEGER, loaded_at DATE")
        .unwrap();

    let engine = fixture.engine().unwrap();
    let tables = engine.tables_to_compare().unwrap();
    let batch = engine.summary_diff(&tables, None).unwrap();

    assert_eq!(batch.len(), 2);
    assert!(batch.has_failures());

    let successes: Vec<&str> = batch.successes().map(|(t, _)| t).collect();
    assert_eq!(successes, vec!["fct_orders"]);

    let failures: Vec<(&str, &DataSpyError)> = batch.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "fct_undeclared");
    assert!(matches!(
        failures[0].1,
        DataSpyError::MissingMetadata { key, .. } if key == "primary-key"
    ));
}

#[test]
fn test_failures_recorded_in_report() {
    let fixture = TestFixture::new().unwrap();
    fixture.seed_keyed_table("fct_orders", &[1, 2], &[1, 3]).unwrap();
    fixture
        .create_table_pair("fct_undeclared", "id INTEGER, loaded_at DATE")
        .unwrap();

    let report = fixture.run(Tier::All).unwrap();
    assert!(report.has_failures());
    assert_eq!(report.summary.len(), 1);
    assert_eq!(report.row_level.len(), 1);

    let tiers: Vec<&str> = report.failures.iter().map(|f| f.tier.as_str()).collect();
    assert_eq!(tiers, vec!["summary", "column", "row"]);
    assert!(report.failures.iter().all(|f| f.table == "fct_undeclared"));
}

#[test]
fn test_unsafe_key_expression_rejected() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .create_table_pair("fct_orders", "id INTEGER, loaded_at DATE")
        .unwrap();
    fixture
        .register_model("fct_orders", "id; DROP TABLE prod_db.analytics.model_meta", "loaded_at")
        .unwrap();

    let err = fixture
        .engine()
        .unwrap()
        .summary_for_table(&ident("fct_orders"))
        .unwrap_err();
    assert!(matches!(err, DataSpyError::InvalidIdentifier { .. }));

    let catalog_rows = fixture
        .scalar(&format!("SELECT COUNT(*) FROM {}", fixture.prod_table("model_meta")))
        .unwrap();
    assert_eq!(catalog_rows.as_deref(), Some("1"));
}

#[test]
fn test_comment_in_key_expression_rejected() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .create_table_pair("fct_orders", "id INTEGER, loaded_at DATE")
        .unwrap();
    fixture
        .register_model("fct_orders", "id -- trailing", "loaded_at")
        .unwrap();

    let err = fixture
        .engine()
        .unwrap()
        .row_diff_for_table(&ident("fct_orders"))
        .unwrap_err();
    assert!(matches!(err, DataSpyError::InvalidIdentifier { .. }));
}

#[test]
fn test_cancelled_run_aborts_batch() {
    let fixture = TestFixture::new().unwrap();
    fixture.seed_keyed_table("fct_orders", &[1], &[1]).unwrap();
    let tables = vec![ident("fct_orders")];

    let cancel = CancelFlag::new();
    let engine = DiffEngine::new(&fixture.store, &fixture.config, fixture.dev(), cancel.clone()).unwrap();
    cancel.cancel();

    let err = engine.summary_diff(&tables, None).unwrap_err();
    assert!(matches!(err, DataSpyError::Cancelled));
}

#[test]
fn test_progress_callback_fires_per_table() {
    let fixture = TestFixture::new().unwrap();
    fixture.seed_keyed_table("fct_orders", &[1], &[1]).unwrap();
    fixture
        .create_table_pair("fct_undeclared", "id INTEGER, loaded_at DATE")
        .unwrap();

    let engine = fixture.engine().unwrap();
    let tables = engine.tables_to_compare().unwrap();

    let seen = std::sync::Mutex::new(Vec::new());
    let record = |table: &str| seen.lock().unwrap().push(table.to_string());
    engine.row_level_diff(&tables, Some(&record)).unwrap();

    let mut seen = seen.into_inner().unwrap();
    seen.sort();
    assert_eq!(seen, vec!["fct_orders", "fct_undeclared"]);
}
