//! Report encoding
//!
//! Wraps analysis results in a JSON envelope carrying producer metadata so
//! host apps can tell which engine build and instance produced a value.

use crate::error::AnalysisError;
use crate::pipeline::TrendSnapshot;
use crate::types::{DailyTrend, StatisticsResult};
use crate::{FLUX_VERSION, PRODUCER_NAME};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current report schema version
pub const REPORT_VERSION: &str = "1.0.0";

/// Producer metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Report payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ReportBody {
    Trend(TrendSnapshot),
    DailyTrend(DailyTrend),
    Statistics(StatisticsResult),
    /// Insufficient data; distinct from a computed zero
    NoData { reason: String },
}

/// Complete report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlucoseReport {
    pub report_version: String,
    pub producer: ReportProducer,
    pub computed_at_utc: String,
    pub report: ReportBody,
}

/// Encoder for report envelopes
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Wrap a body in an envelope
    pub fn encode(&self, body: ReportBody, computed_at: DateTime<Utc>) -> GlucoseReport {
        GlucoseReport {
            report_version: REPORT_VERSION.to_string(),
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: FLUX_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            computed_at_utc: computed_at.to_rfc3339(),
            report: body,
        }
    }

    /// Turn an analysis outcome into a body, mapping `NoData` to its own
    /// report kind. Other errors propagate.
    pub fn body_from<T>(
        outcome: Result<T, AnalysisError>,
        wrap: impl FnOnce(T) -> ReportBody,
    ) -> Result<ReportBody, AnalysisError> {
        match outcome {
            Ok(value) => Ok(wrap(value)),
            Err(AnalysisError::NoData(reason)) => Ok(ReportBody::NoData { reason }),
            Err(e) => Err(e),
        }
    }

    /// Encode to a JSON string
    pub fn encode_to_json(
        &self,
        body: ReportBody,
        computed_at: DateTime<Utc>,
    ) -> Result<String, AnalysisError> {
        let report = self.encode(body, computed_at);
        serde_json::to_string_pretty(&report).map_err(|e| AnalysisError::EncodingError(e.to_string()))
    }
}
