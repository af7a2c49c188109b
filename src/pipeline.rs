//! Pipeline orchestration
//!
//! This module provides the public API for Glucose Flux. It accepts readings
//! as JSON (array or NDJSON), runs the requested analysis and returns report
//! JSON.

use crate::config::AnalysisConfig;
use crate::daily::aggregate_daily_trend;
use crate::delta::{format_delta, format_rate, DeltaDisplay};
use crate::encoder::{ReportBody, ReportEncoder};
use crate::engine::SharedSource;
use crate::error::AnalysisError;
use crate::source::{parse_array, parse_ndjson, InMemoryReadingStore, ReadingSource};
use crate::statistics::{compute_statistics, StatisticsRequest};
use crate::trend::{classify, compute_slope};
use crate::types::{DailyTrend, GlucoseReading, StatisticsResult, TrendArrow};
use crate::units::GlucoseUnit;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Everything the UI shows next to the current reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSnapshot {
    pub timestamp: DateTime<Utc>,
    pub value_mgdl: f64,
    /// Value in the configured unit
    pub display_value: f64,
    pub unit: GlucoseUnit,
    pub arrow: TrendArrow,
    pub glyph: String,
    /// `None` when the slope is not computable
    pub rate_mgdl_per_min: Option<f64>,
    pub delta: DeltaDisplay,
    pub rate: DeltaDisplay,
}

/// Build the per-reading trend view
pub fn trend_snapshot(
    current: &GlucoseReading,
    previous: Option<&GlucoseReading>,
    config: &AnalysisConfig,
) -> TrendSnapshot {
    let slope = previous.map(|p| compute_slope(current, p));
    let arrow = slope.as_ref().map_or(TrendArrow::NotComputable, classify);
    let rate_mgdl_per_min = slope
        .filter(|_| arrow.is_computable())
        .map(|s| s.mgdl_per_minute());

    TrendSnapshot {
        timestamp: current.timestamp,
        value_mgdl: current.value_mgdl,
        display_value: config.unit.from_mgdl(current.value_mgdl),
        unit: config.unit,
        arrow,
        glyph: arrow.glyph().to_string(),
        rate_mgdl_per_min,
        delta: format_delta(current, previous, config.unit, false),
        rate: format_rate(current, previous, config.unit, false),
    }
}

/// Parse readings given either as a JSON array or as NDJSON
pub fn parse_readings(input: &str) -> Result<Vec<GlucoseReading>, AnalysisError> {
    if input.trim_start().starts_with('[') {
        parse_array(input)
    } else {
        parse_ndjson(input)
    }
}

/// Parse a config, treating blank input as the defaults
pub fn load_config(config_json: &str) -> Result<AnalysisConfig, AnalysisError> {
    if config_json.trim().is_empty() {
        return Ok(AnalysisConfig::default());
    }
    AnalysisConfig::from_json(config_json)
}

/// Trend report for the newest reading in the input.
///
/// # Arguments
/// * `readings_json` - Readings as a JSON array or NDJSON
/// * `config_json` - `AnalysisConfig` JSON, or empty for defaults
///
/// # Example
/// ```ignore
/// let report = readings_to_trend(readings, String::new())?;
/// ```
pub fn readings_to_trend(readings_json: String, config_json: String) -> Result<String, AnalysisError> {
    let mut processor = GlucoseProcessor::new(load_config(&config_json)?)?;
    processor.ingest_json(&readings_json)?;
    processor.current_trend_json()
}

/// Daily percentile pattern report over the configured history window
/// ending at `now`.
pub fn readings_to_daily_trend(
    readings_json: String,
    config_json: String,
    now: DateTime<Utc>,
) -> Result<String, AnalysisError> {
    let mut processor = GlucoseProcessor::new(load_config(&config_json)?)?;
    processor.ingest_json(&readings_json)?;
    processor.daily_trend_json(now)
}

/// Statistics report for `[from, to]`
pub fn readings_to_statistics(
    readings_json: String,
    config_json: String,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<String, AnalysisError> {
    let mut processor = GlucoseProcessor::new(load_config(&config_json)?)?;
    processor.ingest_json(&readings_json)?;
    processor.statistics_json(from, to, now)
}

/// Stateful processor holding a configuration and a reading store.
///
/// Use this when readings arrive incrementally across calls.
pub struct GlucoseProcessor {
    config: AnalysisConfig,
    store: Arc<InMemoryReadingStore>,
    encoder: ReportEncoder,
}

impl Default for GlucoseProcessor {
    fn default() -> Self {
        Self {
            config: AnalysisConfig::default(),
            store: Arc::new(InMemoryReadingStore::new()),
            encoder: ReportEncoder::new(),
        }
    }
}

impl GlucoseProcessor {
    /// Create a processor with a validated configuration
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self {
            config,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Replace the configuration from JSON
    pub fn load_config(&mut self, json: &str) -> Result<(), AnalysisError> {
        self.config = AnalysisConfig::from_json(json)?;
        Ok(())
    }

    /// Save the configuration to JSON
    pub fn save_config(&self) -> Result<String, AnalysisError> {
        self.config.to_json()
    }

    /// The store as a shareable source, e.g. for a [`crate::engine::StatisticsEngine`]
    pub fn source(&self) -> SharedSource {
        self.store.clone()
    }

    pub fn reading_count(&self) -> Result<usize, AnalysisError> {
        self.store.len()
    }

    pub fn ingest(&mut self, reading: GlucoseReading) -> Result<(), AnalysisError> {
        self.store.insert(reading)
    }

    /// Ingest readings from a JSON array or NDJSON. Returns how many were added.
    pub fn ingest_json(&mut self, input: &str) -> Result<usize, AnalysisError> {
        let readings = parse_readings(input)?;
        let count = readings.len();
        self.store.extend(readings)?;
        debug!("ingested {count} readings, store now holds {}", self.store.len()?);
        Ok(count)
    }

    /// Trend view of the newest reading
    pub fn current_trend(&self) -> Result<TrendSnapshot, AnalysisError> {
        let (current, previous) = self
            .store
            .latest_pair()?
            .ok_or_else(|| AnalysisError::NoData("no readings ingested".to_string()))?;
        Ok(trend_snapshot(&current, previous.as_ref(), &self.config))
    }

    /// Daily pattern over the configured window ending at `now`
    pub fn daily_trend(&self, now: DateTime<Utc>) -> Result<DailyTrend, AnalysisError> {
        let from = now - Duration::days(i64::from(self.config.daily_history_days));
        let history = self.store.fetch(Some(from), Some(now))?;
        aggregate_daily_trend(&history, &self.config)
    }

    /// Statistics over `[from, to]`
    pub fn statistics(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<StatisticsResult, AnalysisError> {
        let request = StatisticsRequest::new(from, to, self.config).at(now);
        let history = self.store.fetch(from, to)?;
        compute_statistics(&history, &request)
    }

    pub fn current_trend_json(&self) -> Result<String, AnalysisError> {
        let body = ReportEncoder::body_from(self.current_trend(), ReportBody::Trend)?;
        self.encoder.encode_to_json(body, Utc::now())
    }

    pub fn daily_trend_json(&self, now: DateTime<Utc>) -> Result<String, AnalysisError> {
        let body = ReportEncoder::body_from(self.daily_trend(now), ReportBody::DailyTrend)?;
        self.encoder.encode_to_json(body, Utc::now())
    }

    pub fn statistics_json(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<String, AnalysisError> {
        let body = ReportEncoder::body_from(self.statistics(from, to, now), ReportBody::Statistics)?;
        self.encoder.encode_to_json(body, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_ndjson() -> &'static str {
        r#"{"timestamp": "2024-01-15T08:00:00Z", "value_mgdl": 180.0}
{"timestamp": "2024-01-15T08:05:00Z", "value_mgdl": 160.0}
{"timestamp": "2024-01-15T08:10:00Z", "value_mgdl": 150.0}
"#
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_readings_to_statistics() {
        let result = readings_to_statistics(
            sample_ndjson().to_string(),
            r#"{"threshold_source": {"source": "user", "low": 70.0, "high": 180.0, "urgent_low": 54.0, "urgent_high": 250.0}}"#
                .to_string(),
            None,
            None,
            now(),
        );

        assert!(result.is_ok());
        let payload: serde_json::Value = serde_json::from_str(&result.unwrap()).unwrap();
        assert_eq!(payload["producer"]["name"], "glucose-flux");
        assert_eq!(payload["report"]["kind"], "statistics");

        let stats = &payload["report"]["data"];
        assert_eq!(stats["in_range_pct"], 100.0);
        assert_eq!(stats["pgs"], 0.0);
        assert!((stats["average"].as_f64().unwrap() - 163.33).abs() < 0.01);
    }

    #[test]
    fn test_statistics_empty_range_is_no_data_report() {
        let result = readings_to_statistics(
            sample_ndjson().to_string(),
            String::new(),
            Some(now() + Duration::days(1)),
            None,
            now(),
        )
        .unwrap();

        let payload: serde_json::Value = serde_json::from_str(&result).unwrap();
        assert_eq!(payload["report"]["kind"], "no_data");
    }

    #[test]
    fn test_readings_to_trend() {
        let result = readings_to_trend(sample_ndjson().to_string(), String::new()).unwrap();
        let payload: serde_json::Value = serde_json::from_str(&result).unwrap();
        let trend = &payload["report"]["data"];

        assert_eq!(payload["report"]["kind"], "trend");
        assert_eq!(trend["value_mgdl"], 150.0);
        // -2 mg/dL/min falls in the inclusive Down bucket
        assert_eq!(trend["arrow"], "down");
        assert_eq!(trend["delta"]["text"], "-10");
        assert_eq!(trend["rate"]["text"], "-2.0/m");
    }

    #[test]
    fn test_readings_to_daily_trend() {
        let mut lines = String::new();
        for day in 1..=5 {
            lines.push_str(&format!(
                "{{\"timestamp\": \"2024-01-{day:02}T06:00:00Z\", \"value_mgdl\": {}}}\n",
                100 + day * 10
            ));
        }

        let end = Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap();
        let result = readings_to_daily_trend(lines, String::new(), end).unwrap();
        let payload: serde_json::Value = serde_json::from_str(&result).unwrap();
        let bucket = &payload["report"]["data"]["buckets"][72];

        assert_eq!(bucket["sample_count"], 5);
        assert_eq!(bucket["percentiles"]["median"], 130.0);
    }

    #[test]
    fn test_processor_incremental_trend() {
        let mut processor = GlucoseProcessor::default();
        assert!(processor.current_trend().unwrap_err().is_no_data());

        let t0 = now();
        processor.ingest(GlucoseReading::new(t0, 100.0)).unwrap();
        assert_eq!(processor.reading_count().unwrap(), 1);
        let first = processor.current_trend().unwrap();
        assert_eq!(first.arrow, TrendArrow::NotComputable);
        assert_eq!(first.delta, DeltaDisplay::Unknown);
        assert!(first.rate_mgdl_per_min.is_none());

        processor
            .ingest(GlucoseReading::new(t0 + Duration::minutes(5), 104.0))
            .unwrap();
        let second = processor.current_trend().unwrap();
        assert_eq!(second.arrow, TrendArrow::Flat);
        assert_eq!(second.delta.as_str(), "+4");
    }

    #[test]
    fn test_stale_previous_has_no_rate() {
        let current = GlucoseReading::new(now(), 120.0);
        let previous = GlucoseReading::new(now() - Duration::minutes(25), 110.0);
        let snapshot = trend_snapshot(&current, Some(&previous), &AnalysisConfig::default());

        assert_eq!(snapshot.arrow, TrendArrow::NotComputable);
        assert!(snapshot.rate_mgdl_per_min.is_none());
        assert_eq!(snapshot.rate, DeltaDisplay::Unknown);
    }

    #[test]
    fn test_processor_config_round_trip() {
        let mut processor = GlucoseProcessor::new(AnalysisConfig {
            unit: GlucoseUnit::MmolL,
            ..Default::default()
        })
        .unwrap();

        let saved = processor.save_config().unwrap();
        processor.load_config("{}").unwrap();
        assert_eq!(processor.config().unit, GlucoseUnit::MgDl);

        processor.load_config(&saved).unwrap();
        assert_eq!(processor.config().unit, GlucoseUnit::MmolL);
    }

    #[test]
    fn test_daily_trend_window_excludes_old_readings() {
        let config = AnalysisConfig {
            daily_history_days: 2,
            ..Default::default()
        };
        let mut processor = GlucoseProcessor::new(config).unwrap();
        processor
            .ingest(GlucoseReading::new(now() - Duration::days(10), 120.0))
            .unwrap();

        assert!(processor.daily_trend(now()).unwrap_err().is_no_data());
    }

    #[test]
    fn test_invalid_json() {
        let result = readings_to_trend("not valid json".to_string(), String::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_config() {
        let result = readings_to_trend(
            sample_ndjson().to_string(),
            r#"{"bucket_width_minutes": 7}"#.to_string(),
        );
        assert!(matches!(result, Err(AnalysisError::InvalidBucketWidth(7))));
    }
}
