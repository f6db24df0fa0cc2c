//! In-process counter store backed by a [`DashMap`].
//!
//! Each increment runs under the shard lock of its key, so concurrent
//! increments to one key never lose an update. Nothing is persisted.

use crate::counters::{
    Amount, CounterColumn, CounterFamily, CounterKey, CounterRow, CounterTable, DimensionFilter,
    Granularity,
};
use crate::error::{CounterError, CounterResult};
use crate::storage::trait_def::{check_delta, check_filter, check_key, check_value};
use crate::storage::CounterStore;
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RowId {
    family: CounterFamily,
    granularity: Granularity,
    key: CounterKey,
}

impl RowId {
    fn new(table: &CounterTable, key: &CounterKey) -> Self {
        Self {
            family: table.family,
            granularity: table.granularity,
            key: *key,
        }
    }
}

#[derive(Default)]
pub struct MemoryCounterStore {
    rows: DashMap<RowId, CounterRow>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of counter rows across every table
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn init(&self) -> CounterResult<()> {
        Ok(())
    }

    async fn get(&self, table: &CounterTable, key: &CounterKey) -> CounterResult<Option<CounterRow>> {
        check_key(table, key)?;

        Ok(self
            .rows
            .get(&RowId::new(table, key))
            .map(|entry| *entry.value()))
    }

    async fn increment(
        &self,
        table: &CounterTable,
        key: &CounterKey,
        delta_count: i64,
        delta_value: Option<Amount>,
    ) -> CounterResult<()> {
        check_key(table, key)?;
        check_value(table, delta_value)?;
        check_delta(table, delta_count, delta_value)?;

        self.rows
            .entry(RowId::new(table, key))
            .or_default()
            .apply(delta_count, delta_value)
            .ok_or_else(|| CounterError::Overflow(table.name.clone()))
    }

    async fn sum(
        &self,
        table: &CounterTable,
        filter: &DimensionFilter,
        column: CounterColumn,
    ) -> CounterResult<Option<i64>> {
        check_filter(table, filter, column)?;

        let total = self
            .rows
            .iter()
            .filter(|entry| {
                let id = entry.key();
                id.family == table.family
                    && id.granularity == table.granularity
                    && filter.matches(id.key.dimensions)
            })
            .filter_map(|entry| match column {
                CounterColumn::Count => Some(entry.value().count),
                CounterColumn::Value => entry.value().value.map(Amount::cents),
            })
            .try_fold(None, |acc: Option<i64>, v| {
                acc.unwrap_or(0)
                    .checked_add(v)
                    .map(Some)
                    .ok_or_else(|| CounterError::Overflow(table.name.clone()))
            })?;

        Ok(total)
    }
}
