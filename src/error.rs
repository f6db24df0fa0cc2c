use thiserror::Error;

use crate::counters::Granularity;

#[derive(Debug, Error)]
pub enum CounterError {
    #[error("invalid granularity: {0:?}")]
    InvalidGranularity(String),

    #[error("invalid timestamp {0}: must be seconds since the epoch")]
    InvalidTimestamp(i64),

    #[error("invalid amount {0:?}: expected a decimal with at most two fractional digits")]
    InvalidAmount(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Windowed aggregation is not implemented; callers must not mistake an
    /// all-time total for a windowed one.
    #[error("windowed aggregation is not supported (start={start:?}, end={end:?})")]
    UnsupportedQuery {
        start: Option<i64>,
        end: Option<i64>,
    },

    #[error("counter overflow in table {0}")]
    Overflow(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),

    #[error("event recorded for {applied:?} but failed for {} granularities", .failed.len())]
    PartialFailure {
        applied: Vec<Granularity>,
        failed: Vec<(Granularity, CounterError)>,
    },
}

pub type CounterResult<T> = Result<T, CounterError>;
