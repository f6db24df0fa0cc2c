pub mod memory;
pub mod postgres;
mod sql;
pub mod sqlite;
pub mod trait_def;

pub use memory::MemoryCounterStore;
pub use postgres::PostgresCounterStore;
pub use sqlite::SqliteCounterStore;
pub use trait_def::CounterStore;

use crate::config::{DatabaseBackend, DatabaseConfig};
use crate::counters::CounterTables;
use crate::error::CounterResult;
use std::sync::Arc;
use std::time::Duration;

/// Connect to the configured backend. Tables are not created until
/// [`CounterStore::init`] is called.
pub async fn connect(
    config: &DatabaseConfig,
    tables: Arc<CounterTables>,
) -> CounterResult<Arc<dyn CounterStore>> {
    let acquire_timeout = Duration::from_secs(config.acquire_timeout_secs);

    let store: Arc<dyn CounterStore> = match config.backend {
        DatabaseBackend::Sqlite => {
            tracing::info!("Using SQLite counter store: {}", config.url);
            Arc::new(
                SqliteCounterStore::new(&config.url, config.max_connections, acquire_timeout, tables)
                    .await?,
            )
        }
        DatabaseBackend::Postgres => {
            tracing::info!("Using PostgreSQL counter store");
            Arc::new(
                PostgresCounterStore::new(
                    &config.url,
                    config.max_connections,
                    acquire_timeout,
                    tables,
                )
                .await?,
            )
        }
        DatabaseBackend::Memory => {
            tracing::warn!("Using in-memory counter store; counters are lost on restart");
            Arc::new(MemoryCounterStore::new())
        }
    };

    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counters::{CounterFamily, CounterKey, Dimensions, Granularity};

    fn database_config(backend: DatabaseBackend, url: &str) -> DatabaseConfig {
        DatabaseConfig {
            backend,
            url: url.to_string(),
            max_connections: 2,
            acquire_timeout_secs: 1,
        }
    }

    async fn check_round_trip(store: Arc<dyn CounterStore>, tables: &CounterTables) {
        store.init().await.unwrap();

        let table = tables.get(CounterFamily::Impressions, Granularity::All);
        let key = CounterKey::new(Dimensions::Variant(3), 0);
        store.increment(table, &key, 1, None).await.unwrap();
        assert_eq!(store.get(table, &key).await.unwrap().unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_connect_memory() {
        let tables = Arc::new(CounterTables::new());
        let config = database_config(DatabaseBackend::Memory, "");
        let store = connect(&config, Arc::clone(&tables)).await.unwrap();
        check_round_trip(store, &tables).await;
    }

    #[tokio::test]
    async fn test_connect_sqlite_memory() {
        let tables = Arc::new(CounterTables::new());
        let config = database_config(DatabaseBackend::Sqlite, "sqlite::memory:");
        let store = connect(&config, Arc::clone(&tables)).await.unwrap();
        check_round_trip(store, &tables).await;
    }
}
