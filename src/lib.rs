//! Glucose Flux - On-device compute engine for continuous glucose monitoring signals
//!
//! Flux turns a time-ordered stream of calibrated glucose readings into the
//! signals a CGM app shows: trend arrow, delta, time-of-day percentile bands
//! and aggregate glycemic statistics.
//!
//! ## Modules
//!
//! - **Per-reading**: [`trend`] classifies the slope between two readings,
//!   [`delta`] renders the change with its anomaly markers
//! - **History**: [`daily`] builds time-of-day percentile bands,
//!   [`statistics`] computes time-in-range, variability and estimated A1C,
//!   [`engine`] schedules statistics on a latest-request-wins worker

pub mod config;
pub mod daily;
pub mod delta;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod source;
pub mod statistics;
pub mod trend;
pub mod types;
pub mod units;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::AnalysisConfig;
pub use engine::{StatisticsEngine, StatisticsReport};
pub use error::AnalysisError;
pub use pipeline::{
    readings_to_daily_trend, readings_to_statistics, readings_to_trend, GlucoseProcessor,
};
pub use source::{InMemoryReadingStore, ReadingSource};
pub use types::{DailyTrend, GlucoseReading, StatisticsResult, TrendArrow};
pub use units::GlucoseUnit;

/// Flux version embedded in all reports
pub const FLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "glucose-flux";
