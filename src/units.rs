//! Glucose units and thresholds
//!
//! All computation happens in mg/dL. Values are converted to mmol/L only when
//! they cross a display or threshold-comparison boundary.

use serde::{Deserialize, Serialize};

/// mg/dL per mmol/L
pub const MGDL_PER_MMOL: f64 = 18.0182;

/// Convert mg/dL to mmol/L
pub fn mgdl_to_mmol(mgdl: f64) -> f64 {
    mgdl / MGDL_PER_MMOL
}

/// Convert mmol/L to mg/dL
pub fn mmol_to_mgdl(mmol: f64) -> f64 {
    mmol * MGDL_PER_MMOL
}

/// User's preferred display unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GlucoseUnit {
    #[serde(rename = "mg/dL")]
    #[default]
    MgDl,
    #[serde(rename = "mmol/L")]
    MmolL,
}

impl GlucoseUnit {
    /// Express a mg/dL value in this unit
    pub fn from_mgdl(self, mgdl: f64) -> f64 {
        match self {
            GlucoseUnit::MgDl => mgdl,
            GlucoseUnit::MmolL => mgdl_to_mmol(mgdl),
        }
    }

    /// Express a value given in this unit as mg/dL
    pub fn to_mgdl(self, value: f64) -> f64 {
        match self {
            GlucoseUnit::MgDl => value,
            GlucoseUnit::MmolL => mmol_to_mgdl(value),
        }
    }

    /// Get the unit label
    pub fn label(self) -> &'static str {
        match self {
            GlucoseUnit::MgDl => "mg/dL",
            GlucoseUnit::MmolL => "mmol/L",
        }
    }

    /// Decimal places used when rendering a concentration in this unit
    pub fn decimals(self) -> usize {
        match self {
            GlucoseUnit::MgDl => 0,
            GlucoseUnit::MmolL => 1,
        }
    }
}

/// User-configured glucose boundaries, all in mg/dL
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub low: f64,
    pub high: f64,
    pub urgent_low: f64,
    pub urgent_high: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low: 70.0,
            high: 180.0,
            urgent_low: 54.0,
            urgent_high: 250.0,
        }
    }
}

impl Thresholds {
    /// Check that the boundaries are ordered urgent_low < low < high < urgent_high
    pub fn is_ordered(&self) -> bool {
        self.urgent_low < self.low && self.low < self.high && self.high < self.urgent_high
    }
}

/// Where time-in-range boundaries come from
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "source")]
pub enum ThresholdSource {
    /// The user's own low/high settings
    User(Thresholds),
    /// Fixed clinical standard: 70-180 mg/dL or 3.9-10.0 mmol/L
    #[default]
    Standard,
}

impl ThresholdSource {
    /// Standard range lower bound (mg/dL)
    pub const STANDARD_LOW_MGDL: f64 = 70.0;
    /// Standard range upper bound (mg/dL)
    pub const STANDARD_HIGH_MGDL: f64 = 180.0;
    /// Standard range lower bound (mmol/L)
    pub const STANDARD_LOW_MMOL: f64 = 3.9;
    /// Standard range upper bound (mmol/L)
    pub const STANDARD_HIGH_MMOL: f64 = 10.0;

    /// Low and high boundaries expressed in `unit`.
    ///
    /// The standard range uses the published per-unit values rather than a
    /// conversion of the mg/dL pair.
    pub fn range_in(&self, unit: GlucoseUnit) -> (f64, f64) {
        match (self, unit) {
            (ThresholdSource::User(t), unit) => (unit.from_mgdl(t.low), unit.from_mgdl(t.high)),
            (ThresholdSource::Standard, GlucoseUnit::MgDl) => {
                (Self::STANDARD_LOW_MGDL, Self::STANDARD_HIGH_MGDL)
            }
            (ThresholdSource::Standard, GlucoseUnit::MmolL) => {
                (Self::STANDARD_LOW_MMOL, Self::STANDARD_HIGH_MMOL)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_round_trip_factor() {
        assert!((mgdl_to_mmol(180.0) - 9.99).abs() < 0.01);
        assert!((mmol_to_mgdl(3.9) - 70.27).abs() < 0.01);
    }

    #[test]
    fn test_standard_range_per_unit() {
        let source = ThresholdSource::Standard;
        assert_eq!(source.range_in(GlucoseUnit::MgDl), (70.0, 180.0));
        assert_eq!(source.range_in(GlucoseUnit::MmolL), (3.9, 10.0));
    }

    #[test]
    fn test_user_range_converted() {
        let source = ThresholdSource::User(Thresholds {
            low: 80.0,
            high: 160.0,
            ..Default::default()
        });
        let (low, high) = source.range_in(GlucoseUnit::MmolL);
        assert!((low - 80.0 / MGDL_PER_MMOL).abs() < 1e-9);
        assert!((high - 160.0 / MGDL_PER_MMOL).abs() < 1e-9);
    }

    #[test]
    fn test_thresholds_ordering() {
        assert!(Thresholds::default().is_ordered());
        let bad = Thresholds {
            low: 200.0,
            ..Default::default()
        };
        assert!(!bad.is_ordered());
    }

    #[test]
    fn test_unit_serde_labels() {
        let json = serde_json::to_string(&GlucoseUnit::MmolL).unwrap();
        assert_eq!(json, "\"mmol/L\"");
    }
}
