//! Multi-granularity bucketed counters
//!
//! Every event is counted once per granularity in [`GRANULARITIES`], in a
//! table per (family, granularity) pair. Reads sum a counter column over the
//! matching rows of one table.

pub mod aggregator;
pub mod granularity;
pub mod models;
pub mod recorder;
pub mod tables;

pub use aggregator::Aggregator;
pub use granularity::{bucket_for, Granularity, GRANULARITIES};
pub use models::{
    Amount, CounterColumn, CounterFamily, CounterKey, CounterRow, DimensionFilter, Dimensions,
    TimeWindow, TrackedEvent, FAMILIES,
};
pub use recorder::{EventRecorder, RecordOutcome, RecordSummary};
pub use tables::{CounterTable, CounterTables};
