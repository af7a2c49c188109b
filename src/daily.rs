//! Daily trend aggregation
//!
//! Folds a multi-day history onto a single day of fixed-width time-of-day
//! buckets and computes interpolated percentile bands per bucket. At most one
//! sample per bucket per calendar day is retained so a burst of
//! high-frequency readings cannot dominate a bucket.

use crate::config::{AnalysisConfig, MINUTES_PER_DAY};
use crate::error::AnalysisError;
use crate::types::{BucketPercentiles, DailyTrend, DailyTrendBucket, GlucoseReading};
use chrono::{DateTime, NaiveDate, Utc};
use log::debug;

/// Minimum samples before a bucket gets a percentile band
pub const MIN_BUCKET_SAMPLES: usize = 5;

/// Percentile ranks, high band first
const RANKS: [f64; 5] = [0.10, 0.25, 0.50, 0.75, 0.90];

/// Working state for one bucket during aggregation
#[derive(Debug, Default)]
struct BucketAccumulator {
    samples: Vec<f64>,
}

/// Aggregates history into time-of-day percentile bands
pub struct DailyTrendAggregator {
    config: AnalysisConfig,
}

impl DailyTrendAggregator {
    pub fn new(config: AnalysisConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Self { config })
    }

    fn bucket_count(&self) -> usize {
        (MINUTES_PER_DAY / self.config.bucket_width_minutes) as usize
    }

    fn bucket_index(&self, at: DateTime<Utc>) -> usize {
        (self.config.minute_of_day(at) / self.config.bucket_width_minutes) as usize
    }

    /// Build the daily pattern. Returns `NoData` for an empty history.
    pub fn aggregate(&self, history: &[GlucoseReading]) -> Result<DailyTrend, AnalysisError> {
        if history.is_empty() {
            return Err(AnalysisError::NoData(
                "daily trend requires at least one reading".to_string(),
            ));
        }

        let width = self.config.bucket_width_minutes;
        let mut accumulators: Vec<BucketAccumulator> = (0..self.bucket_count())
            .map(|_| BucketAccumulator::default())
            .collect();

        let mut newest_first: Vec<&GlucoseReading> = history.iter().collect();
        newest_first.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let mut start_date: Option<DateTime<Utc>> = None;
        let mut end_date: Option<DateTime<Utc>> = None;
        let mut last_slot: Option<(NaiveDate, usize)> = None;
        let mut skipped = 0usize;

        for reading in newest_first {
            let slot = (self.config.local_date(reading.timestamp), self.bucket_index(reading.timestamp));

            if last_slot == Some(slot) {
                skipped += 1;
                continue;
            }
            last_slot = Some(slot);

            accumulators[slot.1].samples.push(reading.value_mgdl);

            start_date = Some(start_date.map_or(reading.timestamp, |d| d.min(reading.timestamp)));
            end_date = Some(end_date.map_or(reading.timestamp, |d| d.max(reading.timestamp)));
        }

        debug!(
            "daily trend: {} readings, {} same-slot duplicates skipped",
            history.len(),
            skipped
        );

        let buckets: Vec<DailyTrendBucket> = accumulators
            .into_iter()
            .enumerate()
            .map(|(index, acc)| finish_bucket(index as u32 * width, acc))
            .collect();

        // history is non-empty, so at least one reading was retained
        let (Some(start_date), Some(end_date)) = (start_date, end_date) else {
            return Err(AnalysisError::NoData("no readings retained".to_string()));
        };

        Ok(DailyTrend {
            start_date,
            end_date,
            bucket_width_minutes: width,
            buckets,
        })
    }
}

/// Convenience wrapper around [`DailyTrendAggregator`]
pub fn aggregate_daily_trend(
    history: &[GlucoseReading],
    config: &AnalysisConfig,
) -> Result<DailyTrend, AnalysisError> {
    DailyTrendAggregator::new(*config)?.aggregate(history)
}

fn finish_bucket(time_of_day_offset: u32, mut acc: BucketAccumulator) -> DailyTrendBucket {
    let sample_count = acc.samples.len();

    let percentiles = if sample_count >= MIN_BUCKET_SAMPLES {
        acc.samples.sort_by(|a, b| b.total_cmp(a));
        match RANKS.map(|rank| interpolated_percentile(&acc.samples, rank)) {
            [Some(high), Some(median_high), Some(median), Some(median_low), Some(low)] => {
                Some(BucketPercentiles {
                    high,
                    median_high,
                    median,
                    median_low,
                    low,
                })
            }
            _ => None,
        }
    } else {
        None
    };

    DailyTrendBucket {
        time_of_day_offset,
        sample_count,
        percentiles,
    }
}

/// Linear interpolation between order statistics, `rank` in [0, 1]
fn interpolated_percentile(sorted: &[f64], rank: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let index = last as f64 * rank;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;
    let weight = index - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn day_start(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, day, 0, 0, 0).unwrap()
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig::default()
    }

    #[test]
    fn test_empty_history_is_no_data() {
        let result = aggregate_daily_trend(&[], &config());
        assert!(matches!(result, Err(AnalysisError::NoData(_))));
    }

    #[test]
    fn test_bucket_layout() {
        let history = [GlucoseReading::new(day_start(1), 100.0)];
        let trend = aggregate_daily_trend(&history, &config()).unwrap();
        assert_eq!(trend.buckets.len(), 288);
        assert_eq!(trend.buckets[1].time_of_day_offset, 5);
        assert_eq!(trend.buckets[287].time_of_day_offset, 1435);
    }

    #[test]
    fn test_median_of_five_days() {
        // Same time of day on five different days
        let values = [100.0, 120.0, 140.0, 160.0, 180.0];
        let history: Vec<GlucoseReading> = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                GlucoseReading::new(day_start(i as u32 + 1) + Duration::minutes(62), *v)
            })
            .collect();

        let trend = aggregate_daily_trend(&history, &config()).unwrap();
        let bucket = &trend.buckets[12];
        assert_eq!(bucket.time_of_day_offset, 60);
        assert_eq!(bucket.sample_count, 5);

        let p = bucket.percentiles.unwrap();
        assert_eq!(p.median, 140.0);
        // index 0.4 between 180 and 160
        assert!((p.high - 172.0).abs() < 1e-9);
        // index 1.0
        assert!((p.median_high - 160.0).abs() < 1e-9);
        assert!((p.median_low - 120.0).abs() < 1e-9);
        assert!((p.low - 108.0).abs() < 1e-9);

        assert_eq!(trend.start_date, history[0].timestamp);
        assert_eq!(trend.end_date, history[4].timestamp);
        assert_eq!(trend.valid_bucket_count(), 1);
    }

    #[test]
    fn test_sparse_bucket_has_no_percentiles() {
        let history: Vec<GlucoseReading> = (1..=4)
            .map(|day| GlucoseReading::new(day_start(day) + Duration::hours(6), 110.0))
            .collect();

        let trend = aggregate_daily_trend(&history, &config()).unwrap();
        let bucket = &trend.buckets[72];
        assert_eq!(bucket.sample_count, 4);
        assert!(bucket.percentiles.is_none());
        assert_eq!(trend.valid_bucket_count(), 0);
    }

    #[test]
    fn test_same_day_same_bucket_deduplicated() {
        // A one-minute burst inside one bucket counts once per day
        let mut history = Vec::new();
        for day in 1..=5 {
            for minute in 0..4 {
                history.push(GlucoseReading::new(
                    day_start(day) + Duration::minutes(minute),
                    100.0 + minute as f64,
                ));
            }
        }

        let trend = aggregate_daily_trend(&history, &config()).unwrap();
        assert_eq!(trend.buckets[0].sample_count, 5);
        // Newest reading in each burst is the one retained
        assert_eq!(trend.buckets[0].percentiles.unwrap().median, 103.0);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let mut history: Vec<GlucoseReading> = (1..=6)
            .map(|day| GlucoseReading::new(day_start(day) + Duration::minutes(30), 90.0 + day as f64))
            .collect();
        let forward = aggregate_daily_trend(&history, &config()).unwrap();
        history.reverse();
        let backward = aggregate_daily_trend(&history, &config()).unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_invalid_bucket_width() {
        let config = AnalysisConfig {
            bucket_width_minutes: 11,
            ..Default::default()
        };
        let history = [GlucoseReading::new(day_start(1), 100.0)];
        assert!(matches!(
            aggregate_daily_trend(&history, &config),
            Err(AnalysisError::InvalidBucketWidth(11))
        ));
    }

    #[test]
    fn test_interpolation_single_sample() {
        assert_eq!(interpolated_percentile(&[42.0], 0.9), Some(42.0));
    }

    #[test]
    fn test_interpolation_empty_is_none() {
        assert_eq!(interpolated_percentile(&[], 0.5), None);
    }

    #[test]
    fn test_wide_buckets_in_local_time() {
        // 03:20Z at UTC-5 is 22:20 on the previous local day
        let config = AnalysisConfig {
            bucket_width_minutes: 15,
            utc_offset_minutes: -300,
            ..Default::default()
        };
        let history: Vec<GlucoseReading> = (1..=5)
            .map(|day| {
                GlucoseReading::new(
                    day_start(day) + Duration::hours(3) + Duration::minutes(20),
                    100.0 + day as f64 * 10.0,
                )
            })
            .collect();

        let trend = aggregate_daily_trend(&history, &config).unwrap();
        assert_eq!(trend.bucket_width_minutes, 15);
        assert_eq!(trend.buckets.len(), 96);

        let bucket = &trend.buckets[89];
        assert_eq!(bucket.time_of_day_offset, 1335);
        assert_eq!(bucket.sample_count, 5);
        assert_eq!(bucket.percentiles.unwrap().median, 130.0);
        assert_eq!(trend.buckets[13].sample_count, 0);
    }

    #[test]
    fn test_local_day_boundary_separates_dedupe_runs() {
        // 04:55Z and 05:05Z straddle local midnight at UTC-5
        let config = AnalysisConfig {
            bucket_width_minutes: 15,
            utc_offset_minutes: -300,
            ..Default::default()
        };
        let mut history = Vec::new();
        for day in 1..=5 {
            history.push(GlucoseReading::new(day_start(day) + Duration::minutes(295), 100.0));
            history.push(GlucoseReading::new(day_start(day) + Duration::minutes(305), 200.0));
        }

        let trend = aggregate_daily_trend(&history, &config).unwrap();
        // Local 23:55 and 00:05
        assert_eq!(trend.buckets[95].sample_count, 5);
        assert_eq!(trend.buckets[0].sample_count, 5);
    }
}
