//! Core types for the Glucose Flux engine
//!
//! This module defines the values that flow between components: raw readings
//! in, and trend, daily-pattern, and statistics snapshots out.

use crate::units::GlucoseUnit;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single calibrated glucose measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlucoseReading {
    /// When the value was measured (UTC)
    pub timestamp: DateTime<Utc>,
    /// Glucose concentration (mg/dL, unclamped)
    pub value_mgdl: f64,
}

impl GlucoseReading {
    pub fn new(timestamp: DateTime<Utc>, value_mgdl: f64) -> Self {
        Self {
            timestamp,
            value_mgdl,
        }
    }

    /// Timestamp in milliseconds since the Unix epoch
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Trend arrow classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendArrow {
    DoubleDown,
    Down,
    FortyFiveDown,
    Flat,
    FortyFiveUp,
    Up,
    DoubleUp,
    NotComputable,
}

impl TrendArrow {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendArrow::DoubleDown => "double_down",
            TrendArrow::Down => "down",
            TrendArrow::FortyFiveDown => "forty_five_down",
            TrendArrow::Flat => "flat",
            TrendArrow::FortyFiveUp => "forty_five_up",
            TrendArrow::Up => "up",
            TrendArrow::DoubleUp => "double_up",
            TrendArrow::NotComputable => "not_computable",
        }
    }

    /// Arrow glyph for display. Empty when no trend can be shown.
    pub fn glyph(&self) -> &'static str {
        match self {
            TrendArrow::DoubleDown => "\u{21ca}",
            TrendArrow::Down => "\u{2193}",
            TrendArrow::FortyFiveDown => "\u{2198}",
            TrendArrow::Flat => "\u{2192}",
            TrendArrow::FortyFiveUp => "\u{2197}",
            TrendArrow::Up => "\u{2191}",
            TrendArrow::DoubleUp => "\u{21c8}",
            TrendArrow::NotComputable => "",
        }
    }

    pub fn is_computable(&self) -> bool {
        !matches!(self, TrendArrow::NotComputable)
    }
}

/// Slope between two readings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Slope {
    /// Rate of change (mg/dL per millisecond)
    pub mgdl_per_ms: f64,
    /// Set when the gap is zero or too large; the slope must not be shown
    pub not_computable: bool,
}

impl Slope {
    pub const NOT_COMPUTABLE: Slope = Slope {
        mgdl_per_ms: 0.0,
        not_computable: true,
    };

    /// Rate of change in mg/dL per minute
    pub fn mgdl_per_minute(&self) -> f64 {
        self.mgdl_per_ms * 60_000.0
    }
}

/// Percentile band of one time-of-day bucket.
///
/// Ranks are taken over samples sorted high to low, so `high` is the 10th
/// rank from the top and `low` the 90th.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketPercentiles {
    /// Rank 0.10
    pub high: f64,
    /// Rank 0.25
    pub median_high: f64,
    /// Rank 0.50
    pub median: f64,
    /// Rank 0.75
    pub median_low: f64,
    /// Rank 0.90
    pub low: f64,
}

/// One fixed-width time-of-day slot aggregated across days
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTrendBucket {
    /// Bucket start (minutes since local midnight)
    pub time_of_day_offset: u32,
    /// Number of retained samples (one per day at most)
    pub sample_count: usize,
    /// Present only once the bucket holds enough samples
    pub percentiles: Option<BucketPercentiles>,
}

impl DailyTrendBucket {
    pub fn is_valid(&self) -> bool {
        self.percentiles.is_some()
    }
}

/// Multi-day time-of-day percentile pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyTrend {
    /// Oldest retained reading
    pub start_date: DateTime<Utc>,
    /// Newest retained reading
    pub end_date: DateTime<Utc>,
    pub bucket_width_minutes: u32,
    pub buckets: Vec<DailyTrendBucket>,
}

impl DailyTrend {
    /// Number of buckets with a percentile band
    pub fn valid_bucket_count(&self) -> usize {
        self.buckets.iter().filter(|b| b.is_valid()).count()
    }
}

/// HbA1c estimation convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum A1cFormula {
    /// Percent (NGSP/DCCT)
    #[default]
    Ngsp,
    /// mmol/mol (IFCC)
    Ifcc,
}

/// Aggregate glycemic statistics over a date range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsResult {
    /// Requested range start, if bounded
    pub from: Option<DateTime<Utc>>,
    /// Requested range end, if bounded
    pub to: Option<DateTime<Utc>>,
    /// Display unit for average, std_dev and thresholds
    pub unit: GlucoseUnit,
    /// Low boundary used for time-in-range (display unit)
    pub low_threshold: f64,
    /// High boundary used for time-in-range (display unit)
    pub high_threshold: f64,
    pub low_pct: f64,
    pub high_pct: f64,
    pub in_range_pct: f64,
    pub average: f64,
    pub std_dev: f64,
    /// Coefficient of variation (%)
    pub cv_pct: f64,
    pub a1c_formula: A1cFormula,
    pub a1c: f64,
    /// Glycemic Variability Index
    pub gvi: f64,
    /// Patient Glycemic Status
    pub pgs: f64,
    /// Calendar days covered through "now"
    pub days_used: u32,
    /// Readings left after bounds and spacing filters
    pub reading_count: usize,
}
