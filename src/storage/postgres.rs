use crate::counters::{
    Amount, CounterColumn, CounterKey, CounterRow, CounterTable, CounterTables, DimensionFilter,
};
use crate::error::CounterResult;
use crate::storage::sql::{self, Placeholder};
use crate::storage::trait_def::{check_delta, check_filter, check_key, check_value};
use crate::storage::CounterStore;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};
use std::sync::Arc;
use std::time::Duration;

pub struct PostgresCounterStore {
    pool: Arc<PgPool>,
    tables: Arc<CounterTables>,
}

impl PostgresCounterStore {
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
        tables: Arc<CounterTables>,
    ) -> CounterResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
            tables,
        })
    }
}

#[async_trait]
impl CounterStore for PostgresCounterStore {
    async fn init(&self) -> CounterResult<()> {
        for table in self.tables.iter() {
            sqlx::query::<Postgres>(&sql::create_table(table))
                .execute(self.pool.as_ref())
                .await?;
            tracing::debug!(table = %table.name, "counter table ready");
        }

        Ok(())
    }

    async fn get(&self, table: &CounterTable, key: &CounterKey) -> CounterResult<Option<CounterRow>> {
        check_key(table, key)?;

        let query = sql::select_row(table, Placeholder::Numbered);
        let mut q = sqlx::query_as::<Postgres, (i64, Option<i64>)>(&query);
        for id in key.dimensions.values() {
            q = q.bind(id);
        }

        let row = q
            .bind(key.bucket_start)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(row.map(|(count, value)| CounterRow {
            count,
            value: value.map(Amount::from_cents),
        }))
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

        // ON CONFLICT takes the row lock, so concurrent increments to one key
        // serialize instead of racing on a stale count
        let query = sql::upsert(table, Placeholder::Numbered);
        let mut q = sqlx::query::<Postgres>(&query);
        for id in key.dimensions.values() {
            q = q.bind(id);
        }
        q = q.bind(key.bucket_start).bind(delta_count);
        if table.family.has_value() {
            q = q.bind(delta_value.map(Amount::cents));
        }

        q.execute(self.pool.as_ref()).await?;

        Ok(())
    }

    async fn sum(
        &self,
        table: &CounterTable,
        filter: &DimensionFilter,
        column: CounterColumn,
    ) -> CounterResult<Option<i64>> {
        check_filter(table, filter, column)?;

        let query = sql::sum(table, filter, column, Placeholder::Numbered);
        let mut q = sqlx::query_scalar::<Postgres, Option<i64>>(&query);
        for (_, id) in filter.conditions() {
            q = q.bind(id);
        }

        let total = q.fetch_one(self.pool.as_ref()).await?;

        Ok(total)
    }
}
