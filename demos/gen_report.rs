//! Generate a synthetic day of CGM readings and print the three report kinds.
//!
//! Run with: cargo run --example gen_report

use chrono::{Duration, TimeZone, Utc};
use glucose_flux::statistics::StatisticsRequest;
use glucose_flux::{AnalysisConfig, AnalysisError, GlucoseProcessor, GlucoseReading, StatisticsEngine};
use tokio::runtime::Handle;

#[tokio::main]
async fn main() -> Result<(), AnalysisError> {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let mut processor = GlucoseProcessor::new(AnalysisConfig::default())?;

    // Two weeks of 5-minute readings with a post-meal bump around noon
    for i in 0..(14 * 288) {
        let at = start + Duration::minutes(5 * i);
        let minute = (i % 288) as f64 * 5.0;
        let meal = 60.0 * (-((minute - 780.0) / 90.0).powi(2)).exp();
        let noise = ((i * 37) % 11) as f64 - 5.0;
        processor.ingest(GlucoseReading::new(at, 110.0 + meal + noise))?;
    }

    let now = start + Duration::days(14);
    println!("{}", processor.current_trend_json()?);
    println!("{}", processor.daily_trend_json(now)?);

    // Statistics through the background engine; only the last request reports
    let (engine, mut reports) = StatisticsEngine::spawn(&Handle::current(), processor.source());
    for days in [1, 7, 14] {
        let request = StatisticsRequest::new(Some(now - Duration::days(days)), Some(now), *processor.config()).at(now);
        engine.submit(request)?;
    }

    if let Some(report) = reports.recv().await {
        let stats = report.outcome?;
        println!(
            "last {} days: {:.1}% in range, average {:.0} mg/dL, A1C {:.1}%",
            stats.days_used, stats.in_range_pct, stats.average, stats.a1c
        );
    }

    Ok(())
}
