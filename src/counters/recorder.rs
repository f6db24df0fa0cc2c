//! Event recorder: fans one event out to every granularity.
//!
//! Each granularity's increment is independent. A failure for one bucket
//! width does not stop the others, and nothing is rolled back; the caller
//! gets a [`RecordOutcome`] and decides whether a partial write is acceptable.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::counters::granularity::{bucket_for, Granularity, GRANULARITIES};
use crate::counters::models::{Amount, CounterKey, Dimensions, TrackedEvent};
use crate::counters::tables::CounterTables;
use crate::error::{CounterError, CounterResult};
use crate::storage::CounterStore;

/// Result of recording one event across every granularity.
#[derive(Debug, Default)]
pub struct RecordOutcome {
    pub applied: Vec<Granularity>,
    pub failed: Vec<(Granularity, CounterError)>,
}

impl RecordOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Turn any failed granularity into [`CounterError::PartialFailure`].
    pub fn into_result(self) -> CounterResult<Vec<Granularity>> {
        if self.failed.is_empty() {
            Ok(self.applied)
        } else {
            Err(CounterError::PartialFailure {
                applied: self.applied,
                failed: self.failed,
            })
        }
    }

    pub fn summary(&self) -> RecordSummary {
        RecordSummary {
            applied: self.applied.clone(),
            failed: self
                .failed
                .iter()
                .map(|(granularity, err)| FailedGranularity {
                    granularity: *granularity,
                    error: err.to_string(),
                })
                .collect(),
        }
    }
}

/// Serializable view of a [`RecordOutcome`].
#[derive(Debug, Clone, Serialize)]
pub struct RecordSummary {
    pub applied: Vec<Granularity>,
    pub failed: Vec<FailedGranularity>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedGranularity {
    pub granularity: Granularity,
    pub error: String,
}

pub struct EventRecorder {
    store: Arc<dyn CounterStore>,
    tables: Arc<CounterTables>,
}

impl EventRecorder {
    pub fn new(store: Arc<dyn CounterStore>, tables: Arc<CounterTables>) -> Self {
        Self { store, tables }
    }

    pub async fn record_conversion(
        &self,
        goal_id: i64,
        timestamp: i64,
        value: Option<Amount>,
    ) -> CounterResult<RecordOutcome> {
        self.increment(Dimensions::Goal(goal_id), timestamp, value)
            .await
    }

    pub async fn record_impression(
        &self,
        variant_id: i64,
        timestamp: i64,
    ) -> CounterResult<RecordOutcome> {
        self.increment(Dimensions::Variant(variant_id), timestamp, None)
            .await
    }

    pub async fn record_variant_conversion(
        &self,
        variant_id: i64,
        goal_id: i64,
        timestamp: i64,
        value: Option<Amount>,
    ) -> CounterResult<RecordOutcome> {
        self.increment(
            Dimensions::VariantGoal {
                variant_id,
                goal_id,
            },
            timestamp,
            value,
        )
        .await
    }

    /// Record any kind of event.
    pub async fn record(&self, event: TrackedEvent) -> CounterResult<RecordOutcome> {
        match event {
            TrackedEvent::Conversion {
                goal_id,
                timestamp,
                value,
            } => self.record_conversion(goal_id, timestamp, value).await,
            TrackedEvent::Impression {
                variant_id,
                timestamp,
            } => self.record_impression(variant_id, timestamp).await,
            TrackedEvent::VariantConversion {
                variant_id,
                goal_id,
                timestamp,
                value,
            } => {
                self.record_variant_conversion(variant_id, goal_id, timestamp, value)
                    .await
            }
        }
    }

    async fn increment(
        &self,
        dimensions: Dimensions,
        timestamp: i64,
        value: Option<Amount>,
    ) -> CounterResult<RecordOutcome> {
        // Validate up front so a bad timestamp mutates nothing
        let buckets = GRANULARITIES
            .into_iter()
            .map(|granularity| Ok((granularity, bucket_for(granularity, timestamp)?)))
            .collect::<CounterResult<Vec<_>>>()?;

        let family = dimensions.family();
        let mut outcome = RecordOutcome::default();

        for (granularity, bucket_start) in buckets {
            let table = self.tables.get(family, granularity);
            let key = CounterKey::new(dimensions, bucket_start);

            match self.store.increment(table, &key, 1, value).await {
                Ok(()) => {
                    debug!(table = %table.name, ?dimensions, bucket_start, "counter incremented");
                    outcome.applied.push(granularity);
                }
                Err(err) => {
                    warn!(
                        table = %table.name,
                        ?dimensions,
                        bucket_start,
                        error = %err,
                        "failed to increment counter"
                    );
                    outcome.failed.push((granularity, err));
                }
            }
        }

        Ok(outcome)
    }
}
