use crate::counters::{
    Amount, CounterColumn, CounterKey, CounterRow, CounterTable, CounterTables, DimensionFilter,
};
use crate::error::CounterResult;
use crate::storage::sql::{self, Placeholder};
use crate::storage::trait_def::{check_delta, check_filter, check_key, check_value};
use crate::storage::CounterStore;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub struct SqliteCounterStore {
    pool: Arc<SqlitePool>,
    tables: Arc<CounterTables>,
}

impl SqliteCounterStore {
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
        tables: Arc<CounterTables>,
    ) -> CounterResult<Self> {
        // A writer waiting on the database lock gets the same budget as a
        // caller waiting on the pool
        let mut options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(acquire_timeout);

        // WAL lets readers proceed while one writer holds the lock; it does not
        // apply to in-memory databases
        if !database_url.contains(":memory:") {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await?;

        Ok(Self {
            pool: Arc::new(pool),
            tables,
        })
    }
}

#[async_trait]
impl CounterStore for SqliteCounterStore {
    async fn init(&self) -> CounterResult<()> {
        for table in self.tables.iter() {
            sqlx::query::<Sqlite>(&sql::create_table(table))
                .execute(self.pool.as_ref())
                .await?;
            tracing::debug!(table = %table.name, "counter table ready");
        }

        Ok(())
    }

    async fn get(&self, table: &CounterTable, key: &CounterKey) -> CounterResult<Option<CounterRow>> {
        check_key(table, key)?;

        let query = sql::select_row(table, Placeholder::Question);
        let mut q = sqlx::query_as::<Sqlite, (i64, Option<i64>)>(&query);
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

        let query = sql::upsert(table, Placeholder::Question);
        let mut q = sqlx::query::<Sqlite>(&query);
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

        let query = sql::sum(table, filter, column, Placeholder::Question);
        let mut q = sqlx::query_scalar::<Sqlite, Option<i64>>(&query);
        for (_, id) in filter.conditions() {
            q = q.bind(id);
        }

        let total = q.fetch_one(self.pool.as_ref()).await?;

        Ok(total)
    }
}
