//! Glucose Flux CLI - Command-line interface for Glucose Flux
//!
//! Commands:
//! - trend: Trend arrow and delta for the newest reading
//! - daily: Time-of-day percentile pattern
//! - stats: Time-in-range, variability and estimated A1C
//! - validate: Check readings for malformed values

use clap::{Args, Parser, Subcommand, ValueEnum};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use glucose_flux::encoder::{ReportBody, ReportEncoder};
use glucose_flux::pipeline::load_config;
use glucose_flux::source::{parse_array, parse_ndjson, validate_readings};
use glucose_flux::types::{A1cFormula, GlucoseReading};
use glucose_flux::units::{ThresholdSource, Thresholds};
use glucose_flux::{AnalysisConfig, AnalysisError, GlucoseProcessor, GlucoseUnit, FLUX_VERSION};

/// Glucose Flux - On-device compute engine for CGM signals
#[derive(Parser)]
#[command(name = "glucose-flux")]
#[command(author = "Synheart AI Inc")]
#[command(version = FLUX_VERSION)]
#[command(about = "Turn CGM readings into trend, pattern and statistics reports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trend arrow, delta and rate for the newest reading
    Trend {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        analysis: AnalysisArgs,
    },

    /// Time-of-day percentile pattern
    Daily {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        analysis: AnalysisArgs,

        /// End of the history window (RFC 3339, defaults to now)
        #[arg(long, value_parser = parse_instant)]
        now: Option<DateTime<Utc>>,

        /// Bucket width in minutes (must divide 1440)
        #[arg(long)]
        bucket_width: Option<u32>,

        /// History window in days
        #[arg(long)]
        days: Option<u32>,
    },

    /// Time-in-range, variability and estimated A1C
    Stats {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        analysis: AnalysisArgs,

        /// Range start (RFC 3339, inclusive)
        #[arg(long, value_parser = parse_instant)]
        from: Option<DateTime<Utc>>,

        /// Range end (RFC 3339, inclusive)
        #[arg(long, value_parser = parse_instant)]
        to: Option<DateTime<Utc>>,

        /// Reference instant for the days-used count (defaults to now)
        #[arg(long, value_parser = parse_instant)]
        now: Option<DateTime<Utc>>,

        /// A1C formula
        #[arg(long)]
        a1c: Option<A1cArg>,

        /// Low threshold in mg/dL (switches to user thresholds)
        #[arg(long)]
        low: Option<f64>,

        /// High threshold in mg/dL (switches to user thresholds)
        #[arg(long)]
        high: Option<f64>,
    },

    /// Check readings for malformed values
    Validate {
        #[command(flatten)]
        input: InputArgs,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct InputArgs {
    /// Input file path (use - for stdin)
    #[arg(short, long)]
    input: PathBuf,

    /// Input format
    #[arg(long, default_value = "ndjson")]
    input_format: InputFormat,
}

#[derive(Args)]
struct AnalysisArgs {
    /// AnalysisConfig JSON file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Display unit
    #[arg(long)]
    unit: Option<UnitArg>,

    /// Offset from UTC in minutes that defines the local day
    #[arg(long, allow_hyphen_values = true)]
    utc_offset: Option<i32>,

    /// Output format
    #[arg(long, default_value = "json-pretty")]
    output_format: OutputFormat,
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one reading per line)
    Ndjson,
    /// JSON array of readings
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Single-line JSON
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, Copy, ValueEnum)]
enum UnitArg {
    Mgdl,
    Mmol,
}

#[derive(Clone, Copy, ValueEnum)]
enum A1cArg {
    Ngsp,
    Ifcc,
}

fn parse_instant(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp '{s}': {e}"))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), FluxCliError> {
    match cli.command {
        Commands::Trend { input, analysis } => {
            let processor = load_processor(&input, build_config(&analysis)?)?;
            let body = ReportEncoder::body_from(processor.current_trend(), ReportBody::Trend)?;
            emit(body, &analysis.output_format)
        }
        Commands::Daily {
            input,
            analysis,
            now,
            bucket_width,
            days,
        } => {
            let mut config = build_config(&analysis)?;
            if let Some(width) = bucket_width {
                config.bucket_width_minutes = width;
            }
            if let Some(days) = days {
                config.daily_history_days = days;
            }

            let processor = load_processor(&input, config)?;
            let now = now.unwrap_or_else(Utc::now);
            let body = ReportEncoder::body_from(processor.daily_trend(now), ReportBody::DailyTrend)?;
            emit(body, &analysis.output_format)
        }
        Commands::Stats {
            input,
            analysis,
            from,
            to,
            now,
            a1c,
            low,
            high,
        } => {
            let mut config = build_config(&analysis)?;
            if let Some(a1c) = a1c {
                config.a1c_formula = match a1c {
                    A1cArg::Ngsp => A1cFormula::Ngsp,
                    A1cArg::Ifcc => A1cFormula::Ifcc,
                };
            }
            if low.is_some() || high.is_some() {
                let mut thresholds = match config.threshold_source {
                    ThresholdSource::User(t) => t,
                    ThresholdSource::Standard => Thresholds::default(),
                };
                thresholds.low = low.unwrap_or(thresholds.low);
                thresholds.high = high.unwrap_or(thresholds.high);
                config.threshold_source = ThresholdSource::User(thresholds);
            }

            let processor = load_processor(&input, config)?;
            let now = now.unwrap_or_else(Utc::now);
            let body = ReportEncoder::body_from(processor.statistics(from, to, now), ReportBody::Statistics)?;
            emit(body, &analysis.output_format)
        }
        Commands::Validate { input, json } => cmd_validate(&input, json),
    }
}

/// Config file first, then flag overrides
fn build_config(args: &AnalysisArgs) -> Result<AnalysisConfig, FluxCliError> {
    let mut config = match &args.config {
        Some(path) => load_config(&fs::read_to_string(path)?)?,
        None => AnalysisConfig::default(),
    };

    if let Some(unit) = args.unit {
        config.unit = match unit {
            UnitArg::Mgdl => GlucoseUnit::MgDl,
            UnitArg::Mmol => GlucoseUnit::MmolL,
        };
    }
    if let Some(offset) = args.utc_offset {
        config.utc_offset_minutes = offset;
    }

    Ok(config)
}

fn read_input(path: &Path) -> Result<String, FluxCliError> {
    if path.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            warn!("reading readings from an interactive terminal; end input with Ctrl-D");
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn read_readings(args: &InputArgs) -> Result<Vec<GlucoseReading>, FluxCliError> {
    let data = read_input(&args.input)?;
    let readings = match args.input_format {
        InputFormat::Ndjson => parse_ndjson(&data)?,
        InputFormat::Json => parse_array(&data)?,
    };

    if readings.is_empty() {
        return Err(FluxCliError::NoReadings);
    }
    debug!("read {} readings from {}", readings.len(), args.input.display());
    Ok(readings)
}

fn load_processor(input: &InputArgs, config: AnalysisConfig) -> Result<GlucoseProcessor, FluxCliError> {
    let readings = read_readings(input)?;
    let mut processor = GlucoseProcessor::new(config)?;
    for reading in readings {
        processor.ingest(reading)?;
    }
    Ok(processor)
}

fn emit(body: ReportBody, format: &OutputFormat) -> Result<(), FluxCliError> {
    let report = ReportEncoder::new().encode(body, Utc::now());
    let output = match format {
        OutputFormat::Json => serde_json::to_string(&report)?,
        OutputFormat::JsonPretty => serde_json::to_string_pretty(&report)?,
    };
    println!("{output}");
    Ok(())
}

fn cmd_validate(input: &InputArgs, json: bool) -> Result<(), FluxCliError> {
    let readings = read_readings(input)?;
    let issues = validate_readings(&readings);

    let report = ValidationReport {
        total_readings: readings.len(),
        invalid_readings: issues.len(),
        errors: issues
            .into_iter()
            .map(|issue| ValidationErrorDetail {
                index: issue.index,
                error: issue.message,
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total readings:   {}", report.total_readings);
        println!("Invalid readings: {}", report.invalid_readings);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Reading {}: {}", err.index, err.error);
            }
        }
    }

    if report.invalid_readings > 0 {
        Err(FluxCliError::ValidationFailed(report.invalid_readings))
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum FluxCliError {
    Io(io::Error),
    Analysis(AnalysisError),
    Json(serde_json::Error),
    NoReadings,
    ValidationFailed(usize),
}

impl From<io::Error> for FluxCliError {
    fn from(e: io::Error) -> Self {
        FluxCliError::Io(e)
    }
}

impl From<AnalysisError> for FluxCliError {
    fn from(e: AnalysisError) -> Self {
        FluxCliError::Analysis(e)
    }
}

impl From<serde_json::Error> for FluxCliError {
    fn from(e: serde_json::Error) -> Self {
        FluxCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FluxCliError> for CliError {
    fn from(e: FluxCliError) -> Self {
        match e {
            FluxCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FluxCliError::Analysis(e) => CliError::from(e),
            FluxCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            FluxCliError::NoReadings => CliError {
                code: "NO_READINGS".to_string(),
                message: "No readings found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            FluxCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} readings failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
        }
    }
}

impl From<AnalysisError> for CliError {
    fn from(e: AnalysisError) -> Self {
        let (code, hint) = match &e {
            AnalysisError::InvalidConfig(_) | AnalysisError::InvalidBucketWidth(_) => (
                "CONFIG_ERROR",
                "Bucket width must divide 1440 and thresholds must satisfy urgent_low < low < high < urgent_high",
            ),
            AnalysisError::ParseError(_) | AnalysisError::JsonError(_) => (
                "PARSE_ERROR",
                "Each reading needs an RFC 3339 timestamp and value_mgdl",
            ),
            AnalysisError::NoData(_) => ("NO_DATA", "Widen the time range or check the input readings"),
            AnalysisError::EncodingError(_) => ("ENCODING_ERROR", "Report could not be serialized"),
            AnalysisError::SourceError(_) => ("SOURCE_ERROR", "Reading source failed; retry the command"),
            AnalysisError::EngineClosed => ("ENGINE_CLOSED", "Statistics engine stopped before the request ran"),
        };
        CliError {
            code: code.to_string(),
            message: e.to_string(),
            hint: Some(hint.to_string()),
        }
    }
}

// Report types

#[derive(Serialize)]
struct ValidationReport {
    total_readings: usize,
    invalid_readings: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(Serialize)]
struct ValidationErrorDetail {
    index: usize,
    error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_of(e: AnalysisError) -> String {
        CliError::from(FluxCliError::Analysis(e)).code
    }

    #[test]
    fn test_analysis_errors_have_distinct_codes() {
        assert_eq!(code_of(AnalysisError::InvalidBucketWidth(7)), "CONFIG_ERROR");
        assert_eq!(code_of(AnalysisError::ParseError("bad".to_string())), "PARSE_ERROR");
        assert_eq!(code_of(AnalysisError::NoData("empty".to_string())), "NO_DATA");
        assert_eq!(code_of(AnalysisError::EncodingError("bad".to_string())), "ENCODING_ERROR");
        assert_eq!(code_of(AnalysisError::SourceError("poisoned".to_string())), "SOURCE_ERROR");
        assert_eq!(code_of(AnalysisError::EngineClosed), "ENGINE_CLOSED");
    }

    #[test]
    fn test_cli_error_keeps_message() {
        let error = CliError::from(FluxCliError::Analysis(AnalysisError::SourceError("lock poisoned".to_string())));
        assert!(error.message.contains("lock poisoned"));
        assert!(error.hint.is_some());
    }
}
