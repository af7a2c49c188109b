//! Trend classification
//!
//! Computes the slope between the current and previous reading and buckets
//! it into one of seven arrows. A slope over a zero or overly long gap is
//! flagged as not computable and must be hidden rather than shown as flat.

use crate::types::{GlucoseReading, Slope, TrendArrow};

/// Longest gap between two readings over which a slope is still shown
pub const MAX_SLOPE_WINDOW_MINUTES: i64 = 21;

/// Longest gap in milliseconds
pub const MAX_SLOPE_WINDOW_MS: i64 = MAX_SLOPE_WINDOW_MINUTES * 60_000;

/// Inclusive upper bounds (mg/dL per minute) for each arrow, falling to rising
const ARROW_BOUNDS: [(f64, TrendArrow); 6] = [
    (-3.5, TrendArrow::DoubleDown),
    (-2.0, TrendArrow::Down),
    (-1.0, TrendArrow::FortyFiveDown),
    (1.0, TrendArrow::Flat),
    (2.0, TrendArrow::FortyFiveUp),
    (3.5, TrendArrow::Up),
];

/// Slope from `previous` to `current` in mg/dL per millisecond
pub fn compute_slope(current: &GlucoseReading, previous: &GlucoseReading) -> Slope {
    let gap_ms = previous.timestamp_ms() - current.timestamp_ms();

    if gap_ms == 0 || gap_ms.abs() > MAX_SLOPE_WINDOW_MS {
        return Slope::NOT_COMPUTABLE;
    }

    Slope {
        mgdl_per_ms: (previous.value_mgdl - current.value_mgdl) / gap_ms as f64,
        not_computable: false,
    }
}

/// Bucket a slope into an arrow
pub fn classify(slope: &Slope) -> TrendArrow {
    if slope.not_computable {
        return TrendArrow::NotComputable;
    }

    classify_rate(slope.mgdl_per_minute())
}

/// Bucket a rate given in mg/dL per minute
pub fn classify_rate(per_minute: f64) -> TrendArrow {
    ARROW_BOUNDS
        .iter()
        .find(|(bound, _)| per_minute <= *bound)
        .map(|(_, arrow)| *arrow)
        .unwrap_or(TrendArrow::DoubleUp)
}

/// Trend arrow for the current reading
pub fn trend_arrow(current: &GlucoseReading, previous: &GlucoseReading) -> TrendArrow {
    classify(&compute_slope(current, previous))
}
