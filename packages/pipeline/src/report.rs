//! Report output: daily counts and forecasts as CSV, run summaries as JSON.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use crime_forecast_series_models::DailyCountSeries;
use serde::Serialize;

use crate::{PipelineError, PipelineReport};

/// One row of the forecast CSV.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
struct ForecastRow {
    date: NaiveDate,
    actual: Option<u64>,
    estimate: f64,
    lower: f64,
    upper: f64,
    trend: f64,
    is_history: bool,
}

/// Writes `date,count` rows for every day of the series.
///
/// # Errors
///
/// Returns [`PipelineError::Csv`] if a row cannot be written.
pub fn write_daily_csv(writer: impl Write, daily: &DailyCountSeries) -> Result<(), PipelineError> {
    let mut csv = csv::Writer::from_writer(writer);
    for row in daily.iter() {
        csv.serialize(row)?;
    }
    csv.flush()?;
    Ok(())
}

/// Writes the count-scale forecast with the actual count alongside each
/// historical day. The trend column is also exponentiated.
///
/// # Errors
///
/// Returns [`PipelineError::Csv`] if a row cannot be written.
pub fn write_forecast_csv(writer: impl Write, report: &PipelineReport) -> Result<(), PipelineError> {
    let mut csv = csv::Writer::from_writer(writer);
    for (point, log_point) in report.counts.iter().zip(&report.forecast.points) {
        csv.serialize(ForecastRow {
            date: point.date,
            actual: report.daily.get(point.date),
            estimate: point.estimate,
            lower: point.lower,
            upper: point.upper,
            trend: log_point.trend.exp(),
            is_history: point.is_history,
        })?;
    }
    csv.flush()?;
    Ok(())
}

/// Pretty-prints any report as JSON.
///
/// # Errors
///
/// Returns [`PipelineError::Json`] if serialization or the write fails.
pub fn write_report_json(mut writer: impl Write, report: &impl Serialize) -> Result<(), PipelineError> {
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Writes `daily.csv`, `forecast.csv` and `report.json` for one run into
/// `dir`, creating it if needed. Returns the paths written.
///
/// # Errors
///
/// Returns [`PipelineError`] if the directory or any file cannot be written.
pub fn write_all(dir: &Path, report: &PipelineReport) -> Result<Vec<PathBuf>, PipelineError> {
    std::fs::create_dir_all(dir)?;

    let daily = dir.join("daily.csv");
    write_daily_csv(std::fs::File::create(&daily)?, &report.daily)?;

    let forecast = dir.join("forecast.csv");
    write_forecast_csv(std::fs::File::create(&forecast)?, report)?;

    let json = dir.join("report.json");
    write_report_json(std::io::BufWriter::new(std::fs::File::create(&json)?), report)?;

    log::info!("Wrote {} report to {}", report.variant, dir.display());
    Ok(vec![daily, forecast, json])
}
