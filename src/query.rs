//! SQL rendering for the three diff tiers and the write-back tables
//!
//! Builders are pure: they take validated identifiers and key expressions and
//! return query text. Nothing here talks to the store. String values only
//! reach the SQL through [`quote_literal`].

use crate::aggregate::{ColumnDiffRecord, SummaryDiffRecord};
use crate::config::SchemaLocation;
use crate::error::{DataSpyError, Result};
use crate::ident::{literal_or_null, quote_literal, Ident, KeyExpr};
use crate::metadata::{FreshnessKeys, Side, TableIdentity};
use crate::planner::DiffTestSpec;
use chrono::NaiveDate;
use indexmap::IndexMap;

pub const ROW_DIFF_SUFFIX: &str = "row_level_diff";
pub const SUMMARY_TABLE: &str = "data_diff_summary";
pub const COLUMN_LEVEL_TABLE: &str = "data_diff_column_level";

/// Output columns of the column test query that are not side labels
const FIXED_COLUMN_OUTPUTS: [&str; 4] = ["table_name", "column_name", "test", "diff"];

const DIFF_TYPE: &str = "diff_type";
const PRIMARY_KEY_ALIAS: &str = "primary_key";
const ROW_MARKER_ALIAS: &str = "row_present";

/// Names the pivoted dev and prod value columns take
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideLabels {
    pub dev: Ident,
    pub prod: Ident,
}

impl SideLabels {
    /// Schema names when they differ, `<database>_<schema>` otherwise
    pub fn new(dev: &TableIdentity, prod: &TableIdentity) -> Result<Self> {
        let mut labels = Self {
            dev: dev.schema.clone(),
            prod: prod.schema.clone(),
        };

        if labels.dev.eq_ignore_case(&labels.prod) {
            labels = Self {
                dev: dev.schema.prefixed(dev.database.as_str())?,
                prod: prod.schema.prefixed(prod.database.as_str())?,
            };
        }

        labels.validate()?;
        Ok(labels)
    }

    fn validate(&self) -> Result<()> {
        if self.dev.eq_ignore_case(&self.prod) {
            return Err(DataSpyError::pivot_shape(format!(
                "dev and prod both pivot to '{}'",
                self.dev
            )));
        }

        for label in [&self.dev, &self.prod] {
            if FIXED_COLUMN_OUTPUTS
                .iter()
                .any(|fixed| label.as_str().eq_ignore_ascii_case(fixed))
            {
                return Err(DataSpyError::pivot_shape(format!(
                    "label '{}' collides with a fixed output column",
                    label
                )));
            }
        }

        Ok(())
    }
}

/// Check that the labels tagged onto rows are exactly the pivot's target columns
pub fn validate_pivot_shape(projected: &[&Ident], targets: &[&Ident]) -> Result<()> {
    if projected.len() != targets.len() {
        return Err(DataSpyError::pivot_shape(format!(
            "{} projected labels but {} pivot targets",
            projected.len(),
            targets.len()
        )));
    }

    for (i, label) in projected.iter().enumerate() {
        if projected[..i].iter().any(|other| other.eq_ignore_case(label)) {
            return Err(DataSpyError::pivot_shape(format!(
                "label '{}' is projected twice",
                label
            )));
        }
        if !targets.iter().any(|target| target.eq_ignore_case(label)) {
            return Err(DataSpyError::pivot_shape(format!(
                "label '{}' has no pivot target",
                label
            )));
        }
    }

    Ok(())
}

/// `DATE 'YYYY-MM-DD'`
pub fn date_literal(date: NaiveDate) -> String {
    format!("DATE '{}'", date.format("%Y-%m-%d"))
}

fn fresh_rows(table: &TableIdentity, freshness_key: &KeyExpr, cutoff: NaiveDate) -> String {
    format!(
        "FROM {}\n    WHERE {} < {}",
        table.qualified(),
        freshness_key,
        date_literal(cutoff)
    )
}

fn column_count(table: &TableIdentity) -> String {
    format!(
        "(SELECT COUNT(*) FROM information_schema.columns WHERE LOWER(table_catalog) = {} AND LOWER(table_schema) = {} AND LOWER(table_name) = {})",
        table.database.lower().literal(),
        table.schema.lower().literal(),
        table.table.lower().literal()
    )
}

fn ratio(dev: &str, prod: &str, alias: &str) -> String {
    format!(
        "CAST({dev} - {prod} AS DOUBLE) / NULLIF({prod}, 0) AS {alias}",
        dev = dev,
        prod = prod,
        alias = alias
    )
}

/// Row, column and distinct-key counts with dev-vs-prod ratios
///
/// A zero prod count yields a NULL ratio.
pub fn build_summary_query(
    dev: &TableIdentity,
    prod: &TableIdentity,
    freshness: FreshnessKeys<'_>,
    dev_pkey: &KeyExpr,
    prod_pkey: &KeyExpr,
) -> String {
    let ratios = [
        ratio("rowcount_dev", "rowcount_prod", "rowcount_diff_pct"),
        ratio("column_count_dev", "column_count_prod", "column_count_diff_pct"),
        ratio("distinct_pkey_dev", "distinct_pkey_prod", "distinct_pkey_diff_pct"),
    ];

    format!(
        "WITH dev AS (
    SELECT *
    {dev_rows}
),
prod AS (
    SELECT *
    {prod_rows}
),
counts AS (
    SELECT
        {table_name} AS table_name,
        (SELECT COUNT(*) FROM dev) AS rowcount_dev,
        (SELECT COUNT(*) FROM prod) AS rowcount_prod,
        {dev_columns} AS column_count_dev,
        {prod_columns} AS column_count_prod,
        (SELECT COUNT(DISTINCT {dev_pkey}) FROM dev) AS distinct_pkey_dev,
        (SELECT COUNT(DISTINCT {prod_pkey}) FROM prod) AS distinct_pkey_prod
)
SELECT
    table_name,
    rowcount_dev,
    rowcount_prod,
    {rowcount_ratio},
    column_count_dev,
    column_count_prod,
    {column_ratio},
    distinct_pkey_dev,
    distinct_pkey_prod,
    {pkey_ratio}
FROM counts",
        dev_rows = fresh_rows(dev, freshness.dev, freshness.cutoff),
        prod_rows = fresh_rows(prod, freshness.prod, freshness.cutoff),
        table_name = dev.table.literal(),
        dev_columns = column_count(dev),
        prod_columns = column_count(prod),
        dev_pkey = dev_pkey,
        prod_pkey = prod_pkey,
        rowcount_ratio = ratios[0],
        column_ratio = ratios[1],
        pkey_ratio = ratios[2],
    )
}

/// One statistic for one column, both sides pivoted into a single row
///
/// Output columns: `table_name, column_name, test, <prod label>, <dev label>,
/// diff`, every value cast to text.
pub fn build_column_test_query(
    dev: &TableIdentity,
    prod: &TableIdentity,
    spec: &DiffTestSpec,
    freshness: FreshnessKeys<'_>,
    labels: &SideLabels,
) -> Result<String> {
    let projected = [&labels.dev, &labels.prod];
    let targets = [&labels.prod, &labels.dev];
    validate_pivot_shape(&projected, &targets)?;

    let formula = spec.value_formula();
    let side = |identity: &TableIdentity, key: &KeyExpr, label: &Ident| {
        format!(
            "SELECT {label} AS schema_label, {formula} AS value\n    {rows}",
            label = label.literal(),
            formula = formula,
            rows = fresh_rows(identity, key, freshness.cutoff)
        )
    };
    let pivot = |label: &Ident| {
        format!(
            "MAX(CASE WHEN schema_label = {} THEN value END) AS {}",
            label.literal(),
            label.quoted()
        )
    };

    Ok(format!(
        "WITH dev AS (
    {dev_side}
),
prod AS (
    {prod_side}
),
tagged AS (
    SELECT * FROM dev
    UNION ALL
    SELECT * FROM prod
),
pivoted AS (
    SELECT
        {table_name} AS table_name,
        {column_name} AS column_name,
        {test_name} AS test,
        {prod_pivot},
        {dev_pivot}
    FROM tagged
)
SELECT
    table_name,
    column_name,
    test,
    CAST({prod} AS VARCHAR) AS {prod},
    CAST({dev} AS VARCHAR) AS {dev},
    CAST({diff} AS VARCHAR) AS diff
FROM pivoted",
        dev_side = side(dev, freshness.dev, &labels.dev),
        prod_side = side(prod, freshness.prod, &labels.prod),
        table_name = dev.table.literal(),
        column_name = spec.column.literal(),
        test_name = quote_literal(spec.test_name()),
        prod_pivot = pivot(&labels.prod),
        dev_pivot = pivot(&labels.dev),
        prod = labels.prod.quoted(),
        dev = labels.dev.quoted(),
        diff = spec.diff.render(&labels.dev, &labels.prod),
    ))
}

/// Side-prefixed output names for one side of the row diff
#[derive(Debug, Clone)]
pub struct ColumnAliases {
    key_alias: Ident,
    marker_alias: Ident,
    aliases: IndexMap<Ident, Ident>,
}

impl ColumnAliases {
    /// Alias every column as `<side>_<column>`, refusing duplicates and
    /// names that would shadow the key, marker or classification columns
    pub fn build(side: Side, columns: &[Ident]) -> Result<Self> {
        let key_alias = Ident::new(format!("{}_{}", side.prefix(), PRIMARY_KEY_ALIAS))?;
        let marker_alias = Ident::new(format!("{}_{}", side.prefix(), ROW_MARKER_ALIAS))?;
        let mut aliases: IndexMap<Ident, Ident> = IndexMap::with_capacity(columns.len());

        for column in columns {
            let alias = column.prefixed(side.prefix())?;

            let taken = alias.eq_ignore_case(&key_alias)
                || alias.eq_ignore_case(&marker_alias)
                || alias.as_str().eq_ignore_ascii_case(DIFF_TYPE)
                || aliases.values().any(|existing| existing.eq_ignore_case(&alias));
            if taken {
                return Err(DataSpyError::alias_collision(alias.as_str()));
            }

            aliases.insert(column.clone(), alias);
        }

        Ok(Self {
            key_alias,
            marker_alias,
            aliases,
        })
    }

    pub fn key_alias(&self) -> &Ident {
        &self.key_alias
    }

    /// Always TRUE on this side's rows, NULL after an unmatched outer join
    pub fn marker_alias(&self) -> &Ident {
        &self.marker_alias
    }

    pub fn alias(&self, column: &Ident) -> Option<&Ident> {
        self.aliases.get(column)
    }

    /// `<pkey> AS <side>_primary_key, "c1" AS <side>_c1, ...`
    pub fn select_list(&self, primary_key: &KeyExpr, indent: &str) -> String {
        std::iter::once(format!("{} AS {}", primary_key, self.key_alias))
            .chain(
                self.aliases
                    .iter()
                    .map(|(column, alias)| format!("{} AS {}", column.quoted(), alias)),
            )
            .collect::<Vec<_>>()
            .join(&format!(",\n{}", indent))
    }

    /// Key and column aliases qualified by `relation`, marker excluded
    pub fn output_list(&self, relation: &str, indent: &str) -> String {
        std::iter::once(&self.key_alias)
            .chain(self.aliases.values())
            .map(|alias| format!("{}.{}", relation, alias))
            .collect::<Vec<_>>()
            .join(&format!(",\n{}", indent))
    }
}

/// Rendered row diff statement and the table it materialises
#[derive(Debug, Clone)]
pub struct RowDiffQuery {
    pub sql: String,
    pub target: TableIdentity,
}

pub fn row_diff_target(dev: &TableIdentity) -> Result<TableIdentity> {
    Ok(dev.sibling(dev.table.suffixed(ROW_DIFF_SUFFIX)?))
}

/// Full outer join on the primary key, materialised next to the dev table
///
/// `diff_type` is `equal` for keys on both sides, `addition` for dev rows
/// without a prod match and `deletion` for prod rows without a dev match.
/// A NULL key never joins, so its row is classified by the side it came from.
pub fn build_row_diff_query(
    dev: &TableIdentity,
    prod: &TableIdentity,
    dev_columns: &[Ident],
    prod_columns: &[Ident],
    dev_pkey: &KeyExpr,
    prod_pkey: &KeyExpr,
    freshness: FreshnessKeys<'_>,
) -> Result<RowDiffQuery> {
    let dev_aliases = ColumnAliases::build(Side::Dev, dev_columns)?;
    let prod_aliases = ColumnAliases::build(Side::Prod, prod_columns)?;
    let target = row_diff_target(dev)?;

    let dev_key = dev_aliases.key_alias();
    let prod_key = prod_aliases.key_alias();
    let dev_marker = dev_aliases.marker_alias();
    let prod_marker = prod_aliases.marker_alias();

    let sql = format!(
        "CREATE OR REPLACE TABLE {target} AS
WITH dev AS (
    SELECT
        {dev_select},
        TRUE AS {dev_marker}
    {dev_rows}
),
prod AS (
    SELECT
        {prod_select},
        TRUE AS {prod_marker}
    {prod_rows}
),
joined AS (
    SELECT
        CASE
            WHEN a.{dev_key} IS NOT NULL AND b.{prod_key} IS NOT NULL THEN 'equal'
            WHEN a.{dev_marker} THEN 'addition'
            WHEN b.{prod_marker} THEN 'deletion'
        END AS {diff_type},
        {dev_outputs},
        {prod_outputs}
    FROM dev a
    FULL OUTER JOIN prod b
        ON a.{dev_key} = b.{prod_key}
)
SELECT * FROM joined",
        target = target.qualified(),
        dev_select = dev_aliases.select_list(dev_pkey, "        "),
        dev_rows = fresh_rows(dev, freshness.dev, freshness.cutoff),
        prod_select = prod_aliases.select_list(prod_pkey, "        "),
        prod_rows = fresh_rows(prod, freshness.prod, freshness.cutoff),
        dev_key = dev_key,
        prod_key = prod_key,
        dev_marker = dev_marker,
        prod_marker = prod_marker,
        dev_outputs = dev_aliases.output_list("a", "        "),
        prod_outputs = prod_aliases.output_list("b", "        "),
        diff_type = DIFF_TYPE,
    );

    Ok(RowDiffQuery { sql, target })
}

/// Rows per `diff_type` in a materialised row diff table
pub fn build_row_diff_counts_query(target: &TableIdentity) -> String {
    format!(
        "SELECT {diff_type}, COUNT(*) AS row_count\nFROM {target}\nGROUP BY {diff_type}\nORDER BY {diff_type}",
        diff_type = DIFF_TYPE,
        target = target.qualified()
    )
}

fn int_literal(value: i64) -> String {
    value.to_string()
}

fn float_literal(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:?}", v),
        _ => "NULL".to_string(),
    }
}

fn writeback_target(location: &SchemaLocation, table: &str) -> String {
    format!("{}.{}.{}", location.database, location.schema, table)
}

fn insert_values(target: &str, rows: Vec<String>) -> String {
    if rows.is_empty() {
        return String::new();
    }
    format!(
        "\nINSERT INTO {} VALUES\n    {};",
        target,
        rows.join(",\n    ")
    )
}

/// Replace `data_diff_summary` in the dev location with `records`
pub fn build_summary_writeback(location: &SchemaLocation, records: &[SummaryDiffRecord]) -> String {
    let target = writeback_target(location, SUMMARY_TABLE);
    let rows = records
        .iter()
        .map(|r| {
            format!(
                "({}, {}, {}, {}, {}, {}, {}, {}, {}, {})",
                quote_literal(&r.table_name),
                int_literal(r.rowcount_dev),
                int_literal(r.rowcount_prod),
                float_literal(r.rowcount_diff_pct),
                int_literal(r.column_count_dev),
                int_literal(r.column_count_prod),
                float_literal(r.column_count_diff_pct),
                int_literal(r.distinct_pkey_dev),
                int_literal(r.distinct_pkey_prod),
                float_literal(r.distinct_pkey_diff_pct),
            )
        })
        .collect();

    format!(
        "CREATE OR REPLACE TABLE {target} (
    table_name VARCHAR,
    rowcount_dev BIGINT,
    rowcount_prod BIGINT,
    rowcount_diff_pct DOUBLE,
    column_count_dev BIGINT,
    column_count_prod BIGINT,
    column_count_diff_pct DOUBLE,
    distinct_pkey_dev BIGINT,
    distinct_pkey_prod BIGINT,
    distinct_pkey_diff_pct DOUBLE
);{inserts}",
        target = target,
        inserts = insert_values(&target, rows)
    )
}

/// Replace `data_diff_column_level` in the dev location with `records`
pub fn build_column_writeback(location: &SchemaLocation, records: &[ColumnDiffRecord]) -> String {
    let target = writeback_target(location, COLUMN_LEVEL_TABLE);
    let rows = records
        .iter()
        .map(|r| {
            format!(
                "({}, {}, {}, {}, {}, {}, {}, {})",
                quote_literal(&r.table_name),
                quote_literal(&r.column_name),
                quote_literal(&r.test_name),
                quote_literal(&r.prod_label),
                literal_or_null(r.prod_value.as_deref()),
                quote_literal(&r.dev_label),
                literal_or_null(r.dev_value.as_deref()),
                float_literal(r.diff),
            )
        })
        .collect();

    format!(
        "CREATE OR REPLACE TABLE {target} (
    table_name VARCHAR,
    column_name VARCHAR,
    test VARCHAR,
    prod_label VARCHAR,
    prod_value VARCHAR,
    dev_label VARCHAR,
    dev_value VARCHAR,
    diff DOUBLE
);{inserts}",
        target = target,
        inserts = insert_values(&target, rows)
    )
}
