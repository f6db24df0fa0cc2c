use crate::counters::{CounterColumn, CounterKey, CounterRow, CounterTable, DimensionFilter};
use crate::counters::Amount;
use crate::error::{CounterError, CounterResult};
use async_trait::async_trait;

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Initialize the storage (create every counter table)
    async fn init(&self) -> CounterResult<()>;

    /// Get the counter row for a key, if it has ever been incremented
    async fn get(&self, table: &CounterTable, key: &CounterKey) -> CounterResult<Option<CounterRow>>;

    /// Atomically add to a counter row, creating it on first use.
    ///
    /// A supplied `delta_value` is added to the stored value (NULL counts as
    /// zero); `None` leaves the stored value untouched.
    async fn increment(
        &self,
        table: &CounterTable,
        key: &CounterKey,
        delta_count: i64,
        delta_value: Option<Amount>,
    ) -> CounterResult<()>;

    /// Sum a column over every row of `table` matching `filter`.
    ///
    /// Returns `None` when nothing matches or every summed value is NULL.
    async fn sum(
        &self,
        table: &CounterTable,
        filter: &DimensionFilter,
        column: CounterColumn,
    ) -> CounterResult<Option<i64>>;
}

/// Reject keys that do not belong to the table's family.
pub(crate) fn check_key(table: &CounterTable, key: &CounterKey) -> CounterResult<()> {
    let family = key.dimensions.family();
    if family != table.family {
        return Err(CounterError::InvalidQuery(format!(
            "{family} key used against table {}",
            table.name
        )));
    }
    Ok(())
}

/// Reject value deltas for families without a value column.
pub(crate) fn check_value(table: &CounterTable, delta_value: Option<Amount>) -> CounterResult<()> {
    if delta_value.is_some() && !table.family.has_value() {
        return Err(CounterError::InvalidQuery(format!(
            "table {} has no value column",
            table.name
        )));
    }
    Ok(())
}

/// Reject deltas that would shrink a counter. Counts and values only grow.
pub(crate) fn check_delta(
    table: &CounterTable,
    delta_count: i64,
    delta_value: Option<Amount>,
) -> CounterResult<()> {
    if delta_count < 1 {
        return Err(CounterError::InvalidQuery(format!(
            "count delta for table {} must be at least 1, got {delta_count}",
            table.name
        )));
    }
    if let Some(delta) = delta_value.filter(|v| v.cents() < 0) {
        return Err(CounterError::InvalidQuery(format!(
            "value delta for table {} must not be negative, got {delta}",
            table.name
        )));
    }
    Ok(())
}

/// Reject filters and columns the table cannot answer.
pub(crate) fn check_filter(
    table: &CounterTable,
    filter: &DimensionFilter,
    column: CounterColumn,
) -> CounterResult<()> {
    let key_columns = table.family.key_columns();
    if let Some((name, _)) = filter
        .conditions()
        .into_iter()
        .find(|(name, _)| !key_columns.contains(name))
    {
        return Err(CounterError::InvalidQuery(format!(
            "table {} cannot be filtered by {name}",
            table.name
        )));
    }

    if column == CounterColumn::Value && !table.family.has_value() {
        return Err(CounterError::InvalidQuery(format!(
            "table {} has no value column",
            table.name
        )));
    }
    Ok(())
}
