//! Reading sources
//!
//! The engine never owns persistence. It consumes readings through the
//! [`ReadingSource`] trait; this module also provides an in-memory store and
//! parsers for the JSON shapes accepted by the pipeline, FFI and CLI.

use crate::error::AnalysisError;
use crate::types::GlucoseReading;
use chrono::{DateTime, Utc};
use log::warn;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Trait for anything that can return readings for a time range
pub trait ReadingSource {
    /// Readings with `from <= timestamp <= to`, ascending. `None` bounds are open.
    fn fetch(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<GlucoseReading>, AnalysisError>;
}

/// Thread-safe in-memory reading store kept sorted by timestamp
#[derive(Debug, Default)]
pub struct InMemoryReadingStore {
    readings: RwLock<Vec<GlucoseReading>>,
}

impl InMemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from readings in any order
    pub fn from_readings(mut readings: Vec<GlucoseReading>) -> Self {
        readings.sort_by_key(|r| r.timestamp);
        Self {
            readings: RwLock::new(readings),
        }
    }

    fn read_lock(&self) -> Result<RwLockReadGuard<'_, Vec<GlucoseReading>>, AnalysisError> {
        self.readings
            .read()
            .map_err(|_| AnalysisError::SourceError("reading store lock poisoned".to_string()))
    }

    fn write_lock(&self) -> Result<RwLockWriteGuard<'_, Vec<GlucoseReading>>, AnalysisError> {
        self.readings
            .write()
            .map_err(|_| AnalysisError::SourceError("reading store lock poisoned".to_string()))
    }

    /// Insert one reading, keeping timestamp order
    pub fn insert(&self, reading: GlucoseReading) -> Result<(), AnalysisError> {
        let mut readings = self.write_lock()?;
        let position = readings.partition_point(|r| r.timestamp <= reading.timestamp);
        readings.insert(position, reading);
        Ok(())
    }

    /// Insert many readings
    pub fn extend(&self, new_readings: impl IntoIterator<Item = GlucoseReading>) -> Result<(), AnalysisError> {
        let mut readings = self.write_lock()?;
        readings.extend(new_readings);
        readings.sort_by_key(|r| r.timestamp);
        Ok(())
    }

    pub fn len(&self) -> Result<usize, AnalysisError> {
        Ok(self.read_lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, AnalysisError> {
        Ok(self.read_lock()?.is_empty())
    }

    /// The two newest readings, newest first. `None` when the store is empty.
    pub fn latest_pair(&self) -> Result<Option<(GlucoseReading, Option<GlucoseReading>)>, AnalysisError> {
        let readings = self.read_lock()?;
        let mut newest = readings.iter().rev();
        Ok(newest.next().map(|current| (*current, newest.next().copied())))
    }
}

impl ReadingSource for InMemoryReadingStore {
    fn fetch(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<GlucoseReading>, AnalysisError> {
        let readings = self.read_lock()?;

        let start = from.map_or(0, |from| readings.partition_point(|r| r.timestamp < from));
        let end = to.map_or(readings.len(), |to| readings.partition_point(|r| r.timestamp <= to));

        if start >= end {
            return Ok(Vec::new());
        }
        Ok(readings[start..end].to_vec())
    }
}

/// Parse newline-delimited JSON readings. Blank lines are skipped.
pub fn parse_ndjson(ndjson: &str) -> Result<Vec<GlucoseReading>, AnalysisError> {
    let mut readings = Vec::new();
    for (line_num, line) in ndjson.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<GlucoseReading>(trimmed) {
            Ok(reading) => readings.push(reading),
            Err(e) => {
                warn!("rejected reading on line {}: {}", line_num + 1, e);
                return Err(AnalysisError::ParseError(format!(
                    "Failed to parse line {}: {}",
                    line_num + 1,
                    e
                )));
            }
        }
    }
    Ok(readings)
}

/// Parse a JSON array of readings
pub fn parse_array(json: &str) -> Result<Vec<GlucoseReading>, AnalysisError> {
    serde_json::from_str(json).map_err(|e| AnalysisError::ParseError(e.to_string()))
}

/// A problem found in a reading sequence
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ReadingIssue {
    pub index: usize,
    pub message: String,
}

/// Check the upstream contract: finite values, no negatives, ascending order
pub fn validate_readings(readings: &[GlucoseReading]) -> Vec<ReadingIssue> {
    let mut issues = Vec::new();

    for (index, reading) in readings.iter().enumerate() {
        if !reading.value_mgdl.is_finite() {
            issues.push(ReadingIssue {
                index,
                message: "value is not a finite number".to_string(),
            });
        } else if reading.value_mgdl < 0.0 {
            issues.push(ReadingIssue {
                index,
                message: format!("negative value {}", reading.value_mgdl),
            });
        }

        if index > 0 && reading.timestamp < readings[index - 1].timestamp {
            issues.push(ReadingIssue {
                index,
                message: "timestamp earlier than previous reading".to_string(),
            });
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    #[test]
    fn test_store_keeps_order() {
        let store = InMemoryReadingStore::new();
        store.insert(GlucoseReading::new(t(10), 110.0)).unwrap();
        store.insert(GlucoseReading::new(t(0), 100.0)).unwrap();
        store.insert(GlucoseReading::new(t(5), 105.0)).unwrap();

        let all = store.fetch(None, None).unwrap();
        let values: Vec<f64> = all.iter().map(|r| r.value_mgdl).collect();
        assert_eq!(values, vec![100.0, 105.0, 110.0]);
    }

    #[test]
    fn test_fetch_range_inclusive() {
        let store = InMemoryReadingStore::from_readings(
            (0..6).map(|i| GlucoseReading::new(t(i * 5), 100.0 + i as f64)).collect(),
        );

        let slice = store.fetch(Some(t(5)), Some(t(15))).unwrap();
        assert_eq!(slice.len(), 3);
        assert_eq!(slice[0].timestamp, t(5));
        assert_eq!(slice[2].timestamp, t(15));

        assert!(store.fetch(Some(t(100)), None).unwrap().is_empty());
        assert!(store.fetch(Some(t(20)), Some(t(10))).unwrap().is_empty());
    }

    #[test]
    fn test_latest_pair() {
        let store = InMemoryReadingStore::new();
        assert!(store.latest_pair().unwrap().is_none());
        assert!(store.is_empty().unwrap());

        store.insert(GlucoseReading::new(t(0), 100.0)).unwrap();
        let (current, previous) = store.latest_pair().unwrap().unwrap();
        assert_eq!(current.value_mgdl, 100.0);
        assert!(previous.is_none());

        store.insert(GlucoseReading::new(t(5), 104.0)).unwrap();
        let (current, previous) = store.latest_pair().unwrap().unwrap();
        assert_eq!(current.value_mgdl, 104.0);
        assert_eq!(previous.map(|r| r.value_mgdl), Some(100.0));
    }

    #[test]
    fn test_poisoned_store_is_source_error() {
        let store = Arc::new(InMemoryReadingStore::from_readings(vec![GlucoseReading::new(
            t(0),
            100.0,
        )]));
        let writer = Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = writer.readings.write().unwrap();
            panic!("writer panicked while holding the lock");
        })
        .join();

        assert!(matches!(store.len(), Err(AnalysisError::SourceError(_))));
        assert!(matches!(store.is_empty(), Err(AnalysisError::SourceError(_))));
        assert!(matches!(store.latest_pair(), Err(AnalysisError::SourceError(_))));
        assert!(matches!(store.fetch(None, None), Err(AnalysisError::SourceError(_))));
    }

    #[test]
    fn test_parse_ndjson_skips_blank_lines() {
        let input = r#"
{"timestamp": "2024-05-01T07:00:00Z", "value_mgdl": 101.0}

{"timestamp": "2024-05-01T07:05:00Z", "value_mgdl": 99.5}
"#;
        let readings = parse_ndjson(input).unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[1].value_mgdl, 99.5);
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let input = "{\"timestamp\": \"2024-05-01T07:00:00Z\", \"value_mgdl\": 101.0}\nnot json\n";
        let err = parse_ndjson(input).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_array() {
        let input = r#"[{"timestamp": "2024-05-01T07:00:00Z", "value_mgdl": 101.0}]"#;
        assert_eq!(parse_array(input).unwrap().len(), 1);
        assert!(parse_array("{}").is_err());
    }

    #[test]
    fn test_validate_readings() {
        let readings = vec![
            GlucoseReading::new(t(5), 100.0),
            GlucoseReading::new(t(0), -3.0),
        ];
        let issues = validate_readings(&readings);
        assert_eq!(issues.len(), 2);
        assert!(issues.iter().all(|i| i.index == 1));
    }
}
