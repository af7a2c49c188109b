//! Analysis configuration
//!
//! User preferences (unit, thresholds, A1C convention) are passed into every
//! engine call as an explicit immutable value.

use crate::error::AnalysisError;
use crate::types::A1cFormula;
use crate::units::{GlucoseUnit, ThresholdSource};
use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Default daily-pattern bucket width in minutes
pub const DEFAULT_BUCKET_WIDTH_MINUTES: u32 = 5;

/// Default daily-pattern history window in days
pub const DEFAULT_DAILY_HISTORY_DAYS: u32 = 90;

/// Minutes in a day
pub const MINUTES_PER_DAY: u32 = 1440;

/// Settings shared by the analysis components
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub unit: GlucoseUnit,
    pub threshold_source: ThresholdSource,
    pub a1c_formula: A1cFormula,
    /// Daily-pattern bucket width (must divide 1440)
    pub bucket_width_minutes: u32,
    /// Offset from UTC that defines the user's calendar day
    pub utc_offset_minutes: i32,
    /// How far back the daily pattern looks
    pub daily_history_days: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            unit: GlucoseUnit::MgDl,
            threshold_source: ThresholdSource::Standard,
            a1c_formula: A1cFormula::Ngsp,
            bucket_width_minutes: DEFAULT_BUCKET_WIDTH_MINUTES,
            utc_offset_minutes: 0,
            daily_history_days: DEFAULT_DAILY_HISTORY_DAYS,
        }
    }
}

impl AnalysisConfig {
    /// Check field ranges
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let width = self.bucket_width_minutes;
        if width == 0 || MINUTES_PER_DAY % width != 0 {
            return Err(AnalysisError::InvalidBucketWidth(width));
        }

        // FixedOffset accepts strictly less than a day either way
        if self.utc_offset_minutes.unsigned_abs() >= MINUTES_PER_DAY {
            return Err(AnalysisError::InvalidConfig(format!(
                "utc_offset_minutes out of range: {}",
                self.utc_offset_minutes
            )));
        }

        if let ThresholdSource::User(thresholds) = self.threshold_source {
            if !thresholds.is_ordered() {
                return Err(AnalysisError::InvalidConfig(format!(
                    "thresholds must satisfy urgent_low < low < high < urgent_high, got {} < {} < {} < {}",
                    thresholds.urgent_low, thresholds.low, thresholds.high, thresholds.urgent_high
                )));
            }
        }

        if self.daily_history_days == 0 {
            return Err(AnalysisError::InvalidConfig(
                "daily_history_days must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// The user's fixed UTC offset
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
    }

    /// Local calendar day of an instant
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset()).date_naive()
    }

    /// Minutes since local midnight
    pub fn minute_of_day(&self, at: DateTime<Utc>) -> u32 {
        let local = at.with_timezone(&self.offset());
        local.hour() * 60 + local.minute()
    }

    /// Load configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, AnalysisError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> Result<String, AnalysisError> {
        serde_json::to_string(self).map_err(AnalysisError::JsonError)
    }
}
