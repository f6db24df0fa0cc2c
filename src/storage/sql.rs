//! SQL text shared by the relational backends.
//!
//! Table and column names come from [`CounterTable`] and
//! [`CounterFamily::key_columns`], never from user input.

use crate::counters::{CounterColumn, CounterFamily, CounterTable, DimensionFilter};

/// Bind parameter syntax of the target database.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Placeholder {
    /// `?` (SQLite)
    Question,
    /// `$1, $2, ...` (PostgreSQL)
    Numbered,
}

impl Placeholder {
    fn nth(self, n: usize) -> String {
        match self {
            Placeholder::Question => "?".to_string(),
            Placeholder::Numbered => format!("${n}"),
        }
    }
}

pub(crate) fn create_table(table: &CounterTable) -> String {
    let key_columns = table.family.key_columns();

    let mut columns: Vec<String> = key_columns
        .iter()
        .map(|c| format!("{c} BIGINT NOT NULL"))
        .collect();
    columns.push("start_timestamp BIGINT NOT NULL".to_string());
    columns.push("count BIGINT NOT NULL DEFAULT 0".to_string());
    if table.family.has_value() {
        columns.push("value BIGINT".to_string());
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {},\n    PRIMARY KEY ({}, start_timestamp)\n)",
        table.name,
        columns.join(",\n    "),
        key_columns.join(", ")
    )
}

fn value_expr(family: CounterFamily) -> &'static str {
    if family.has_value() {
        "value"
    } else {
        "CAST(NULL AS BIGINT)"
    }
}

/// Binds: key columns, then `start_timestamp`.
pub(crate) fn select_row(table: &CounterTable, placeholder: Placeholder) -> String {
    let key_columns = table.family.key_columns();
    let conditions: Vec<String> = key_columns
        .iter()
        .chain(std::iter::once(&"start_timestamp"))
        .enumerate()
        .map(|(i, c)| format!("{c} = {}", placeholder.nth(i + 1)))
        .collect();

    format!(
        "SELECT count, {} FROM {} WHERE {}",
        value_expr(table.family),
        table.name,
        conditions.join(" AND ")
    )
}

/// Single-statement upsert.
///
/// Binds: key columns, `start_timestamp`, count delta, then the value delta
/// for families with a value column.
pub(crate) fn upsert(table: &CounterTable, placeholder: Placeholder) -> String {
    let key_columns = table.family.key_columns();
    let t = &table.name;

    let mut columns: Vec<&str> = key_columns.to_vec();
    columns.push("start_timestamp");
    columns.push("count");
    if table.family.has_value() {
        columns.push("value");
    }

    let values: Vec<String> = (1..=columns.len()).map(|n| placeholder.nth(n)).collect();

    let mut updates = vec![format!("count = {t}.count + excluded.count")];
    if table.family.has_value() {
        updates.push(format!(
            "value = CASE WHEN excluded.value IS NULL THEN {t}.value \
             ELSE COALESCE({t}.value, 0) + excluded.value END"
        ));
    }

    format!(
        "INSERT INTO {t} ({}) VALUES ({}) ON CONFLICT ({}, start_timestamp) DO UPDATE SET {}",
        columns.join(", "),
        values.join(", "),
        key_columns.join(", "),
        updates.join(", ")
    )
}

/// Binds: the filter's condition values, in [`DimensionFilter::conditions`] order.
pub(crate) fn sum(
    table: &CounterTable,
    filter: &DimensionFilter,
    column: CounterColumn,
    placeholder: Placeholder,
) -> String {
    let conditions: Vec<String> = filter
        .conditions()
        .iter()
        .enumerate()
        .map(|(i, (c, _))| format!("{c} = {}", placeholder.nth(i + 1)))
        .collect();

    let mut query = format!(
        "SELECT CAST(SUM({}) AS BIGINT) FROM {}",
        column.column_name(),
        table.name
    );
    if !conditions.is_empty() {
        query.push_str(" WHERE ");
        query.push_str(&conditions.join(" AND "));
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::{CounterTables, Granularity};

    #[test]
    fn test_create_table_variant_conversions() {
        let tables = CounterTables::new();
        let sql = create_table(tables.get(CounterFamily::VariantConversions, Granularity::Day));

        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS variant_conversions_86400_bucket"));
        assert!(sql.contains("value BIGINT"));
        assert!(sql.contains("PRIMARY KEY (variant_id, goal_id, start_timestamp)"));
    }

    #[test]
    fn test_create_table_impressions_has_no_value() {
        let tables = CounterTables::new();
        let sql = create_table(tables.get(CounterFamily::Impressions, Granularity::All));
        assert!(!sql.contains("value"));
    }

    #[test]
    fn test_upsert_numbered() {
        let tables = CounterTables::new();
        let sql = upsert(
            tables.get(CounterFamily::Conversions, Granularity::Hour),
            Placeholder::Numbered,
        );

        assert!(sql.contains("(goal_id, start_timestamp, count, value) VALUES ($1, $2, $3, $4)"));
        assert!(sql.contains("ON CONFLICT (goal_id, start_timestamp) DO UPDATE"));
        assert!(sql.contains("count = conversions_3600_bucket.count + excluded.count"));
    }

    #[test]
    fn test_sum_question() {
        let tables = CounterTables::new();
        let sql = sum(
            tables.get(CounterFamily::VariantConversions, Granularity::All),
            &DimensionFilter::variant_goal(3, 7),
            CounterColumn::Value,
            Placeholder::Question,
        );

        assert_eq!(
            sql,
            "SELECT CAST(SUM(value) AS BIGINT) FROM variant_conversions_all_bucket \
             WHERE variant_id = ? AND goal_id = ?"
        );
    }
}
