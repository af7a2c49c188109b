//! Glycemic statistics
//!
//! Pure computation of time-in-range, mean, variability, estimated A1C, GVI
//! and PGS over a date range. Scheduling lives in [`crate::engine`].
//!
//! Two input sets are used on purpose:
//! - average, deviation and range percentages use readings that pass the
//!   sensor bounds and the minimum-spacing filter;
//! - GVI walks the raw range-bounded sequence with only the spacing rule.

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::types::{A1cFormula, GlucoseReading, StatisticsResult};
use chrono::{DateTime, Duration, Utc};
use log::debug;

/// Readings below this value are sensor faults (mg/dL)
pub const MIN_VALID_MGDL: f64 = 40.0;

/// Readings above this value are sensor faults (mg/dL)
pub const MAX_VALID_MGDL: f64 = 450.0;

/// Minimum spacing between readings used for statistics (ms)
pub const MIN_SAMPLE_SPACING_MS: i64 = 270_000;

/// Margin subtracted from the first reading when counting days
const DAYS_USED_MARGIN_MINUTES: i64 = 5;

/// Parameters for one statistics computation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatisticsRequest {
    /// Inclusive range start; unbounded when `None`
    pub from: Option<DateTime<Utc>>,
    /// Inclusive range end; unbounded when `None`
    pub to: Option<DateTime<Utc>>,
    pub config: AnalysisConfig,
    /// Reference instant for `days_used`
    pub now: DateTime<Utc>,
}

impl StatisticsRequest {
    pub fn new(
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            from,
            to,
            config,
            now: Utc::now(),
        }
    }

    /// Override the reference instant
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at <= to)
    }
}

/// True when the value is a plausible physiological reading
pub fn is_within_sensor_bounds(value_mgdl: f64) -> bool {
    value_mgdl != 0.0 && (MIN_VALID_MGDL..=MAX_VALID_MGDL).contains(&value_mgdl)
}

/// Keep the first reading and then only readings at least
/// [`MIN_SAMPLE_SPACING_MS`] after the last kept one.
///
/// `readings` must be sorted ascending.
pub fn enforce_min_spacing<'a, I>(readings: I) -> Vec<GlucoseReading>
where
    I: IntoIterator<Item = &'a GlucoseReading>,
{
    let mut kept: Vec<GlucoseReading> = Vec::new();
    for reading in readings {
        let far_enough = kept
            .last()
            .map_or(true, |last| reading.timestamp_ms() - last.timestamp_ms() >= MIN_SAMPLE_SPACING_MS);
        if far_enough {
            kept.push(*reading);
        }
    }
    kept
}

/// Estimated A1C from a mean glucose in mg/dL
pub fn estimated_a1c(average_mgdl: f64, formula: A1cFormula) -> f64 {
    let ngsp = (46.7 + average_mgdl) / 28.7;
    match formula {
        A1cFormula::Ngsp => ngsp,
        A1cFormula::Ifcc => (ngsp - 2.152) / 0.09148,
    }
}

/// Glycemic Variability Index over an ascending raw sequence.
///
/// Fewer than two readings, or no elapsed time, yields the reading count.
pub fn glycemic_variability_index(raw: &[GlucoseReading]) -> f64 {
    let (Some(first), Some(last)) = (raw.first(), raw.last()) else {
        return 0.0;
    };

    let ideal_minutes = minutes_between(first, last);
    if raw.len() <= 1 || ideal_minutes <= 0.0 {
        return raw.len() as f64;
    }

    let mut path_length = 0.0;
    let mut previous = first;
    for reading in &raw[1..] {
        let dt_ms = reading.timestamp_ms() - previous.timestamp_ms();
        if dt_ms < MIN_SAMPLE_SPACING_MS {
            continue;
        }
        let dt_minutes = dt_ms as f64 / 60_000.0;
        let dv = reading.value_mgdl - previous.value_mgdl;
        path_length += (dt_minutes * dt_minutes + dv * dv).sqrt();
        previous = reading;
    }

    path_length / ideal_minutes
}

/// Patient Glycemic Status
pub fn patient_glycemic_status(gvi: f64, average_mgdl: f64, in_range_pct: f64, all_in_range: bool) -> f64 {
    if all_in_range {
        return 0.0;
    }
    gvi * average_mgdl * (1.0 - in_range_pct / 100.0)
}

fn minutes_between(a: &GlucoseReading, b: &GlucoseReading) -> f64 {
    (b.timestamp_ms() - a.timestamp_ms()) as f64 / 60_000.0
}

/// Compute statistics for `request` over `history` (any order).
///
/// Returns `NoData` when nothing survives range, bounds and spacing filters.
pub fn compute_statistics(
    history: &[GlucoseReading],
    request: &StatisticsRequest,
) -> Result<StatisticsResult, AnalysisError> {
    let config = &request.config;
    config.validate()?;

    let mut in_range: Vec<GlucoseReading> = history
        .iter()
        .filter(|r| request.contains(r.timestamp))
        .copied()
        .collect();
    in_range.sort_by_key(|r| r.timestamp);

    let filtered = enforce_min_spacing(in_range.iter().filter(|r| is_within_sensor_bounds(r.value_mgdl)));

    debug!(
        "statistics: {} readings in range, {} after bounds and spacing filters",
        in_range.len(),
        filtered.len()
    );

    let Some(first) = filtered.first() else {
        return Err(AnalysisError::NoData(
            "no valid readings in the requested range".to_string(),
        ));
    };

    let unit = config.unit;
    let (low_threshold, high_threshold) = config.threshold_source.range_in(unit);
    let n = filtered.len() as f64;

    let mut low_count = 0usize;
    let mut high_count = 0usize;
    let mut sum_mgdl = 0.0;
    for reading in &filtered {
        let value = unit.from_mgdl(reading.value_mgdl);
        if value < low_threshold {
            low_count += 1;
        } else if value > high_threshold {
            high_count += 1;
        }
        sum_mgdl += reading.value_mgdl;
    }

    let low_pct = low_count as f64 / n * 100.0;
    let high_pct = high_count as f64 / n * 100.0;
    let in_range_pct = 100.0 - low_pct - high_pct;

    let average_mgdl = sum_mgdl / n;
    let average = unit.from_mgdl(average_mgdl);
    let variance = filtered
        .iter()
        .map(|r| {
            let d = unit.from_mgdl(r.value_mgdl) - average;
            d * d
        })
        .sum::<f64>()
        / n;
    let std_dev = variance.sqrt();
    let cv_pct = if average > 0.0 { std_dev / average * 100.0 } else { 0.0 };

    let a1c = estimated_a1c(average_mgdl, config.a1c_formula);
    let gvi = glycemic_variability_index(&in_range);
    let pgs = patient_glycemic_status(gvi, average_mgdl, in_range_pct, low_count + high_count == 0);

    let first_day = config.local_date(first.timestamp - Duration::minutes(DAYS_USED_MARGIN_MINUTES));
    let today = config.local_date(request.now);
    let days_used = ((today - first_day).num_days().max(0) + 1) as u32;

    Ok(StatisticsResult {
        from: request.from,
        to: request.to,
        unit,
        low_threshold,
        high_threshold,
        low_pct,
        high_pct,
        in_range_pct,
        average,
        std_dev,
        cv_pct,
        a1c_formula: config.a1c_formula,
        a1c,
        gvi,
        pgs,
        days_used,
        reading_count: filtered.len(),
    })
}
