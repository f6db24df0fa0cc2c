//! Read side of the counter store.

use std::sync::Arc;

use crate::counters::granularity::Granularity;
use crate::counters::models::{Amount, CounterColumn, DimensionFilter, TimeWindow};
use crate::counters::tables::CounterTables;
use crate::error::{CounterError, CounterResult};
use crate::storage::CounterStore;

pub struct Aggregator {
    store: Arc<dyn CounterStore>,
    tables: Arc<CounterTables>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn CounterStore>, tables: Arc<CounterTables>) -> Self {
        Self { store, tables }
    }

    /// Pick the granularity that answers a query over `window`.
    ///
    /// Only all-time queries are answerable; any bound fails with
    /// [`CounterError::UnsupportedQuery`] rather than returning an
    /// unfiltered total.
    pub fn choose_granularity(window: &TimeWindow) -> CounterResult<Granularity> {
        if window.is_unbounded() {
            Ok(Granularity::All)
        } else {
            Err(CounterError::UnsupportedQuery {
                start: window.start,
                end: window.end,
            })
        }
    }

    /// Sum `column` over the rows matching `filter`.
    ///
    /// The family is chosen by which dimensions are present: goal and
    /// variant select variant conversions, variant alone selects
    /// impressions, goal alone selects conversions. `None` means no data.
    pub async fn aggregate(
        &self,
        column: CounterColumn,
        filter: &DimensionFilter,
        window: &TimeWindow,
    ) -> CounterResult<Option<i64>> {
        let family = filter.family()?;
        let granularity = Self::choose_granularity(window)?;
        let table = self.tables.get(family, granularity);

        let total = self.store.sum(table, filter, column).await?;
        tracing::debug!(table = %table.name, ?filter, ?column, ?total, "aggregated counters");

        Ok(total)
    }

    /// Number of events matching `filter`; 0 when nothing was recorded.
    pub async fn count(&self, filter: &DimensionFilter, window: &TimeWindow) -> CounterResult<i64> {
        Ok(self
            .aggregate(CounterColumn::Count, filter, window)
            .await?
            .unwrap_or(0))
    }

    /// Summed conversion value matching `filter`; 0.00 when nothing was recorded.
    pub async fn total_value(
        &self,
        filter: &DimensionFilter,
        window: &TimeWindow,
    ) -> CounterResult<Amount> {
        Ok(self
            .aggregate(CounterColumn::Value, filter, window)
            .await?
            .map(Amount::from_cents)
            .unwrap_or(Amount::ZERO))
    }
}
