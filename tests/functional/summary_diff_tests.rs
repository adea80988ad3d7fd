use crate::common::{ident, TestFixture};
use chrono::NaiveDate;

#[test]
fn test_summary_counts_and_ratios() {
    let fixture = TestFixture::new().unwrap();
    let dev_ids: Vec<i64> = (1..=110).collect();
    let prod_ids: Vec<i64> = (1..=100).collect();
    fixture
        .seed_keyed_table("fct_orders", &dev_ids, &prod_ids)
        .unwrap();

    let engine = fixture.engine().unwrap();
    let record = engine.summary_for_table(&ident("fct_orders")).unwrap();

    assert_eq!(record.table_name, "fct_orders");
    assert_eq!(record.rowcount_dev, 110);
    assert_eq!(record.rowcount_prod, 100);
    assert!((record.rowcount_diff_pct.unwrap() - 0.1).abs() < 1e-9);
    assert_eq!(record.column_count_dev, 3);
    assert_eq!(record.column_count_prod, 3);
    assert_eq!(record.column_count_diff_pct, Some(0.0));
    assert_eq!(record.distinct_pkey_dev, 110);
    assert_eq!(record.distinct_pkey_prod, 100);
    assert!(!record.is_identical());
}

#[test]
fn test_empty_prod_yields_null_ratios() {
    let fixture = TestFixture::new().unwrap();
    fixture.seed_keyed_table("fct_orders", &[1, 2], &[]).unwrap();

    let engine = fixture.engine().unwrap();
    let record = engine.summary_for_table(&ident("fct_orders")).unwrap();

    assert_eq!(record.rowcount_prod, 0);
    assert_eq!(record.rowcount_diff_pct, None);
    assert_eq!(record.distinct_pkey_prod, 0);
    assert_eq!(record.distinct_pkey_diff_pct, None);
    assert_eq!(record.column_count_diff_pct, Some(0.0));
}

#[test]
fn test_summary_detects_column_changes() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .execute(&format!(
            "CREATE TABLE {} (id INTEGER, a INTEGER, b INTEGER, loaded_at DATE);
CREATE TABLE {} (id INTEGER, a INTEGER, loaded_at DATE);",
            fixture.dev_table("dim_users"),
            fixture.prod_table("dim_users")
        ))
        .unwrap();
    fixture.register_model("dim_users", "id", "loaded_at").unwrap();

    let engine = fixture.engine().unwrap();
    let record = engine.summary_for_table(&ident("dim_users")).unwrap();

    assert_eq!(record.column_count_dev, 4);
    assert_eq!(record.column_count_prod, 3);
    let pct = record.column_count_diff_pct.unwrap();
    assert!((pct - 1.0 / 3.0).abs() < 1e-9);
}

#[test]
fn test_summary_excludes_rows_loaded_today() {
    let fixture = TestFixture::new().unwrap();
    fixture.seed_keyed_table("fct_orders", &[1, 2], &[1, 2]).unwrap();
    fixture
        .insert_dev(
            "fct_orders",
            &format!(
                "(3, 30.0, {}), (4, 40.0, {})",
                fixture.cutoff_date(0),
                fixture.cutoff_date(1)
            ),
        )
        .unwrap();

    let engine = fixture.engine().unwrap();
    let record = engine.summary_for_table(&ident("fct_orders")).unwrap();

    assert_eq!(record.rowcount_dev, 2);
    assert!(record.is_identical());
}

#[test]
fn test_configured_cutoff_drives_freshness() {
    let mut fixture = TestFixture::new().unwrap();
    fixture.seed_keyed_table("fct_orders", &[1, 2, 3], &[1, 2]).unwrap();

    // Seeded rows load on 2024-01-01, so a cutoff on that day excludes them all
    fixture.config.freshness_cutoff = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let record = fixture
        .engine()
        .unwrap()
        .summary_for_table(&ident("fct_orders"))
        .unwrap();
    assert_eq!(record.rowcount_dev, 0);
    assert_eq!(record.rowcount_prod, 0);
    assert_eq!(record.rowcount_diff_pct, None);

    fixture.config.freshness_cutoff = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let record = fixture
        .engine()
        .unwrap()
        .summary_for_table(&ident("fct_orders"))
        .unwrap();
    assert_eq!(record.rowcount_dev, 3);
    assert_eq!(record.rowcount_prod, 2);
}

#[test]
fn test_composite_key_expression() {
    let fixture = TestFixture::new().unwrap();
    fixture
        .create_table_pair("fct_lines", "order_id INTEGER, line_id INTEGER, loaded_at DATE")
        .unwrap();
    fixture
        .register_model("fct_lines", "order_id * 1000 + line_id", "loaded_at")
        .unwrap();
    fixture
        .insert_dev(
            "fct_lines",
            "(1, 1, DATE '2024-01-01'), (1, 2, DATE '2024-01-01'), (1, 2, DATE '2024-01-01')",
        )
        .unwrap();
    fixture
        .insert_prod("fct_lines", "(1, 1, DATE '2024-01-01')")
        .unwrap();

    let engine = fixture.engine().unwrap();
    let record = engine.summary_for_table(&ident("fct_lines")).unwrap();

    assert_eq!(record.rowcount_dev, 3);
    assert_eq!(record.distinct_pkey_dev, 2);
    assert_eq!(record.distinct_pkey_prod, 1);
    assert_eq!(record.distinct_pkey_diff_pct, Some(1.0));
}
