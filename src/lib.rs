pub mod api;
pub mod config;
pub mod counters;
pub mod error;
pub mod storage;
pub mod visitor;

pub use error::{CounterError, CounterResult};
