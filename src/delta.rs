//! Delta formatting
//!
//! Turns the slope between two readings into the signed change a user sees
//! next to the current value. Two anomaly markers are part of the policy:
//! `???` when no slope can be computed and `ERR` when the change is too large
//! to be physiological.

use crate::trend::compute_slope;
use crate::types::GlucoseReading;
use crate::units::GlucoseUnit;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest plausible change between consecutive readings (mg/dL)
pub const MAX_PLAUSIBLE_DELTA_MGDL: f64 = 100.0;

/// Marker rendered when no delta can be computed
pub const UNKNOWN_MARKER: &str = "???";

/// Marker rendered for implausible sensor data
pub const SENSOR_FAULT_MARKER: &str = "ERR";

/// Rendered delta
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum DeltaDisplay {
    /// Missing or stale previous reading. Never show as zero.
    Unknown,
    /// Change beyond physiological bounds
    SensorFault,
    /// Formatted signed value
    Value(String),
}

impl DeltaDisplay {
    pub fn as_str(&self) -> &str {
        match self {
            DeltaDisplay::Unknown => UNKNOWN_MARKER,
            DeltaDisplay::SensorFault => SENSOR_FAULT_MARKER,
            DeltaDisplay::Value(text) => text,
        }
    }
}

impl fmt::Display for DeltaDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Zero band and precision for one rendering mode
struct Precision {
    zero_band: f64,
    decimals: usize,
}

impl Precision {
    /// Anything smaller than the last rendered digit snaps to zero
    fn with_decimals(decimals: usize) -> Self {
        Self {
            zero_band: 10f64.powi(-(decimals as i32)),
            decimals,
        }
    }
}

fn delta_precision(unit: GlucoseUnit) -> Precision {
    Precision::with_decimals(unit.decimals())
}

/// Rates carry one more digit than concentrations
fn rate_precision(unit: GlucoseUnit) -> Precision {
    Precision::with_decimals(unit.decimals() + 1)
}

/// Change from `previous` to `current` over the actual elapsed time, in mg/dL.
///
/// `None` when there is no previous reading or the slope is not computable.
pub fn window_delta_mgdl(current: &GlucoseReading, previous: Option<&GlucoseReading>) -> Option<f64> {
    let previous = previous?;
    let slope = compute_slope(current, previous);
    if slope.not_computable {
        return None;
    }
    let elapsed_ms = (current.timestamp_ms() - previous.timestamp_ms()) as f64;
    Some(slope.mgdl_per_ms * elapsed_ms)
}

/// Format the change since the previous reading, e.g. `+4`, `-0.3 mmol/L`, `0`
pub fn format_delta(
    current: &GlucoseReading,
    previous: Option<&GlucoseReading>,
    unit: GlucoseUnit,
    show_unit: bool,
) -> DeltaDisplay {
    let Some(delta_mgdl) = window_delta_mgdl(current, previous) else {
        return DeltaDisplay::Unknown;
    };

    if delta_mgdl.abs() > MAX_PLAUSIBLE_DELTA_MGDL {
        return DeltaDisplay::SensorFault;
    }

    let suffix = if show_unit {
        format!(" {}", unit.label())
    } else {
        String::new()
    };

    let text = signed_value(unit.from_mgdl(delta_mgdl), &delta_precision(unit));
    DeltaDisplay::Value(format!("{text}{suffix}"))
}

/// Format the per-minute rate, e.g. `+1.5/m`, `-0.08 mmol/L/m`
pub fn format_rate(
    current: &GlucoseReading,
    previous: Option<&GlucoseReading>,
    unit: GlucoseUnit,
    show_unit: bool,
) -> DeltaDisplay {
    let Some(previous) = previous else {
        return DeltaDisplay::Unknown;
    };
    let Some(delta_mgdl) = window_delta_mgdl(current, Some(previous)) else {
        return DeltaDisplay::Unknown;
    };

    if delta_mgdl.abs() > MAX_PLAUSIBLE_DELTA_MGDL {
        return DeltaDisplay::SensorFault;
    }

    let rate_mgdl = compute_slope(current, previous).mgdl_per_minute();
    let suffix = if show_unit {
        format!(" {}", unit.label())
    } else {
        String::new()
    };

    let text = signed_value(unit.from_mgdl(rate_mgdl), &rate_precision(unit));
    DeltaDisplay::Value(format!("{text}{suffix}/m"))
}

/// Render with an explicit `+` for positives, snapping float noise to an
/// unsigned zero.
fn signed_value(value: f64, precision: &Precision) -> String {
    if value.abs() < precision.zero_band {
        return format!("{:.*}", precision.decimals, 0.0);
    }

    let sign = if value > 0.0 { "+" } else { "" };
    format!("{sign}{:.*}", precision.decimals, value)
}
