//! Integration tests for the counter store backends
//!
//! Tests can be filtered by database backend using the DATABASE_BACKEND environment variable:
//! - `DATABASE_BACKEND=sqlite cargo test` - Run only SQLite tests
//! - `DATABASE_BACKEND=postgres cargo test` - Run only PostgreSQL tests (needs DATABASE_URL)
//! - By default, every backend with a reachable database is tested

use std::sync::Arc;
use std::time::Duration;
use tally::counters::{
    bucket_for, Amount, CounterColumn, CounterFamily, CounterKey, CounterTables, DimensionFilter,
    Dimensions, EventRecorder, Granularity, GRANULARITIES,
};
use tally::storage::{CounterStore, MemoryCounterStore, PostgresCounterStore, SqliteCounterStore};
use tally::CounterError;

/// Get the database backend to test from environment variable
fn should_test_backend(backend: &str) -> bool {
    match std::env::var("DATABASE_BACKEND") {
        Ok(val) => val.to_lowercase() == backend.to_lowercase(),
        Err(_) => true, // Test all backends if not specified
    }
}

/// Helper to create SQLite test storage
async fn create_sqlite_store(tables: Arc<CounterTables>) -> Arc<dyn CounterStore> {
    let store = SqliteCounterStore::new("sqlite::memory:", 5, Duration::from_secs(5), tables)
        .await
        .unwrap();
    store.init().await.unwrap();
    Arc::new(store)
}

/// Helper to create PostgreSQL test storage
async fn create_postgres_store(tables: Arc<CounterTables>) -> Option<Arc<dyn CounterStore>> {
    let db_url = std::env::var("DATABASE_URL").ok()?;
    if !db_url.starts_with("postgres") {
        return None;
    }
    let store = PostgresCounterStore::new(&db_url, 5, Duration::from_secs(5), tables)
        .await
        .ok()?;
    store.init().await.ok()?;
    Some(Arc::new(store))
}

/// Ids unique to this run, so repeated runs against one PostgreSQL database don't collide
fn fresh_id() -> i64 {
    i64::from(rand::random::<u32>()) + 1_000_000
}

async fn check_increment_lifecycle(store: Arc<dyn CounterStore>, tables: &CounterTables) {
    let table = tables.get(CounterFamily::Conversions, Granularity::Hour);
    let goal_id = fresh_id();
    let key = CounterKey::new(Dimensions::Goal(goal_id), 7_200);

    // Absent until first increment
    assert_eq!(store.get(table, &key).await.unwrap(), None);

    // First increment without value inserts count=1, value=NULL
    store.increment(table, &key, 1, None).await.unwrap();
    let row = store.get(table, &key).await.unwrap().unwrap();
    assert_eq!(row.count, 1);
    assert_eq!(row.value, None);

    // A value on a NULL row is added to zero
    store
        .increment(table, &key, 1, Some("10.00".parse().unwrap()))
        .await
        .unwrap();
    let row = store.get(table, &key).await.unwrap().unwrap();
    assert_eq!(row.count, 2);
    assert_eq!(row.value, Some(Amount::from_cents(1_000)));

    // A later value accumulates
    store
        .increment(table, &key, 1, Some("5.50".parse().unwrap()))
        .await
        .unwrap();

    // No value leaves the accumulator untouched
    store.increment(table, &key, 1, None).await.unwrap();

    let row = store.get(table, &key).await.unwrap().unwrap();
    assert_eq!(row.count, 4);
    assert_eq!(row.value, Some(Amount::from_cents(1_550)));

    // Other buckets of the same goal stay untouched
    let next_bucket = CounterKey::new(Dimensions::Goal(goal_id), 10_800);
    assert_eq!(store.get(table, &next_bucket).await.unwrap(), None);
}

async fn check_sum_filters(store: Arc<dyn CounterStore>, tables: &CounterTables) {
    let table = tables.get(CounterFamily::VariantConversions, Granularity::All);
    let goal_id = fresh_id();
    let (variant_a, variant_b) = (fresh_id(), fresh_id() + 1);

    for (variant_id, cents) in [(variant_a, 100), (variant_a, 250), (variant_b, 1_000)] {
        let key = CounterKey::new(
            Dimensions::VariantGoal {
                variant_id,
                goal_id,
            },
            0,
        );
        store
            .increment(table, &key, 1, Some(Amount::from_cents(cents)))
            .await
            .unwrap();
    }

    let both = DimensionFilter::variant_goal(variant_a, goal_id);
    assert_eq!(store.sum(table, &both, CounterColumn::Count).await.unwrap(), Some(2));
    assert_eq!(store.sum(table, &both, CounterColumn::Value).await.unwrap(), Some(350));

    // A looser filter sums across every matching row
    let goal_only = DimensionFilter::goal(goal_id);
    assert_eq!(store.sum(table, &goal_only, CounterColumn::Count).await.unwrap(), Some(3));
    assert_eq!(
        store.sum(table, &goal_only, CounterColumn::Value).await.unwrap(),
        Some(1_350)
    );

    let nothing = DimensionFilter::goal(goal_id + 1);
    assert_eq!(store.sum(table, &nothing, CounterColumn::Count).await.unwrap(), None);
}

async fn check_family_checks(store: Arc<dyn CounterStore>, tables: &CounterTables) {
    let impressions = tables.get(CounterFamily::Impressions, Granularity::Day);
    let variant_id = fresh_id();
    let key = CounterKey::new(Dimensions::Variant(variant_id), 86_400);

    assert!(matches!(
        store
            .increment(impressions, &key, 1, Some(Amount::from_cents(100)))
            .await,
        Err(CounterError::InvalidQuery(_))
    ));
    assert!(matches!(
        store
            .increment(impressions, &CounterKey::new(Dimensions::Goal(1), 0), 1, None)
            .await,
        Err(CounterError::InvalidQuery(_))
    ));
    assert!(matches!(
        store
            .sum(impressions, &DimensionFilter::variant(variant_id), CounterColumn::Value)
            .await,
        Err(CounterError::InvalidQuery(_))
    ));
    assert!(matches!(
        store
            .sum(impressions, &DimensionFilter::goal(1), CounterColumn::Count)
            .await,
        Err(CounterError::InvalidQuery(_))
    ));

    // Rejected calls must not have written anything
    assert_eq!(store.get(impressions, &key).await.unwrap(), None);
}

async fn check_rejects_shrinking_deltas(store: Arc<dyn CounterStore>, tables: &CounterTables) {
    let table = tables.get(CounterFamily::Conversions, Granularity::Day);
    let key = CounterKey::new(Dimensions::Goal(fresh_id()), 86_400);

    store
        .increment(table, &key, 1, Some(Amount::from_cents(500)))
        .await
        .unwrap();

    for (delta_count, delta_value) in [
        (-3, Some(Amount::from_cents(-900))),
        (-1, None),
        (0, None),
        (1, Some(Amount::from_cents(-1))),
    ] {
        assert!(
            matches!(
                store.increment(table, &key, delta_count, delta_value).await,
                Err(CounterError::InvalidQuery(_))
            ),
            "delta ({delta_count}, {delta_value:?}) should be rejected"
        );
    }

    // The row is exactly as the one valid increment left it
    let row = store.get(table, &key).await.unwrap().unwrap();
    assert_eq!(row.count, 1);
    assert_eq!(row.value, Some(Amount::from_cents(500)));
}

async fn check_recorder_fan_out(store: Arc<dyn CounterStore>, tables: Arc<CounterTables>) {
    let recorder = EventRecorder::new(Arc::clone(&store), Arc::clone(&tables));
    let variant_id = fresh_id();
    let timestamp = 1_700_000_000;

    let outcome = recorder.record_impression(variant_id, timestamp).await.unwrap();
    assert!(outcome.is_complete());

    for granularity in GRANULARITIES {
        let table = tables.get(CounterFamily::Impressions, granularity);
        let bucket_start = bucket_for(granularity, timestamp).unwrap();
        let row = store
            .get(table, &CounterKey::new(Dimensions::Variant(variant_id), bucket_start))
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("missing {} row", table.name));
        assert_eq!(row.count, 1);
        assert_eq!(row.value, None);
    }
}

#[tokio::test]
async fn test_increment_lifecycle_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }

    let tables = Arc::new(CounterTables::new());
    let store = create_sqlite_store(Arc::clone(&tables)).await;
    check_increment_lifecycle(store, &tables).await;
}

#[tokio::test]
async fn test_increment_lifecycle_memory() {
    let tables = CounterTables::new();
    check_increment_lifecycle(Arc::new(MemoryCounterStore::new()), &tables).await;
}

#[tokio::test]
async fn test_increment_lifecycle_postgres() {
    if !should_test_backend("postgres") {
        return;
    }

    let tables = Arc::new(CounterTables::new());
    let Some(store) = create_postgres_store(Arc::clone(&tables)).await else {
        return;
    };
    check_increment_lifecycle(store, &tables).await;
}

#[tokio::test]
async fn test_sum_filters_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }

    let tables = Arc::new(CounterTables::new());
    let store = create_sqlite_store(Arc::clone(&tables)).await;
    check_sum_filters(store, &tables).await;
}

#[tokio::test]
async fn test_sum_filters_memory() {
    let tables = CounterTables::new();
    check_sum_filters(Arc::new(MemoryCounterStore::new()), &tables).await;
}

#[tokio::test]
async fn test_sum_filters_postgres() {
    if !should_test_backend("postgres") {
        return;
    }

    let tables = Arc::new(CounterTables::new());
    let Some(store) = create_postgres_store(Arc::clone(&tables)).await else {
        return;
    };
    check_sum_filters(store, &tables).await;
}

#[tokio::test]
async fn test_family_checks_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }

    let tables = Arc::new(CounterTables::new());
    let store = create_sqlite_store(Arc::clone(&tables)).await;
    check_family_checks(store, &tables).await;
}

#[tokio::test]
async fn test_family_checks_memory() {
    let tables = CounterTables::new();
    check_family_checks(Arc::new(MemoryCounterStore::new()), &tables).await;
}

#[tokio::test]
async fn test_recorder_fan_out_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }

    let tables = Arc::new(CounterTables::new());
    let store = create_sqlite_store(Arc::clone(&tables)).await;
    check_recorder_fan_out(store, tables).await;
}

#[tokio::test]
async fn test_recorder_fan_out_postgres() {
    if !should_test_backend("postgres") {
        return;
    }

    let tables = Arc::new(CounterTables::new());
    let Some(store) = create_postgres_store(Arc::clone(&tables)).await else {
        return;
    };
    check_recorder_fan_out(store, tables).await;
}

#[tokio::test]
async fn test_init_is_idempotent_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }

    let tables = Arc::new(CounterTables::new());
    let store = create_sqlite_store(Arc::clone(&tables)).await;
    let table = tables.get(CounterFamily::Conversions, Granularity::All);
    let key = CounterKey::new(Dimensions::Goal(7), 0);

    store.increment(table, &key, 1, None).await.unwrap();
    store.init().await.unwrap();

    // Re-running init keeps existing rows
    assert_eq!(store.get(table, &key).await.unwrap().unwrap().count, 1);
}

#[tokio::test]
async fn test_rejects_shrinking_deltas_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }

    let tables = Arc::new(CounterTables::new());
    let store = create_sqlite_store(Arc::clone(&tables)).await;
    check_rejects_shrinking_deltas(store, &tables).await;
}

#[tokio::test]
async fn test_rejects_shrinking_deltas_memory() {
    let tables = CounterTables::new();
    check_rejects_shrinking_deltas(Arc::new(MemoryCounterStore::new()), &tables).await;
}

#[tokio::test]
async fn test_rejects_shrinking_deltas_postgres() {
    if !should_test_backend("postgres") {
        return;
    }

    let tables = Arc::new(CounterTables::new());
    let Some(store) = create_postgres_store(Arc::clone(&tables)).await else {
        return;
    };
    check_rejects_shrinking_deltas(store, &tables).await;
}
