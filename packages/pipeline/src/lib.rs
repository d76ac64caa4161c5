#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! End-to-end forecasting pipeline.
//!
//! Chains the stages in order: events are aggregated into a daily series,
//! transformed to log space (optionally with outliers clipped), fitted and
//! extrapolated, then mapped back to counts and scored against the history.
//! [`compare`] runs the as-is and mitigated variants on the same series so
//! their accuracy can be set side by side.

pub mod config;
pub mod report;

use std::sync::Arc;

use chrono::NaiveDate;
use crime_forecast_forecast::ForecastError;
use crime_forecast_forecast::diagnostics;
use crime_forecast_forecast::evaluate::{mape, to_count_scale};
use crime_forecast_forecast_models::{
    AccuracyReport, CountForecastPoint, CrossValidationFold, Forecast,
};
use crime_forecast_ingest::IngestError;
use crime_forecast_series::SeriesError;
use crime_forecast_series::aggregate::aggregate_daily;
use crime_forecast_series::progress::ProgressCallback;
use crime_forecast_series::transform::transform;
use crime_forecast_series_models::{DailyCountSeries, Event, OutlierReport};
use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

pub use config::PipelineConfig;

/// Errors that can occur while running the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Reading the event log failed.
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// Aggregation or transformation failed.
    #[error(transparent)]
    Series(#[from] SeriesError),

    /// Fitting or evaluation failed.
    #[error(transparent)]
    Forecast(#[from] ForecastError),

    /// The configuration file could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Writing a CSV report failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Writing the JSON report failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which transform a run used.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Variant {
    /// Log transform only.
    AsIs,
    /// Outliers clipped to missing before the log transform.
    Mitigated,
}

impl Variant {
    /// Variant selected by `mitigate_outliers`.
    #[must_use]
    pub const fn from_mitigation(mitigate_outliers: bool) -> Self {
        if mitigate_outliers {
            Self::Mitigated
        } else {
            Self::AsIs
        }
    }

    /// Human-readable label for tables and log lines.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::AsIs => "As-is",
            Self::Mitigated => "Outliers mitigated",
        }
    }
}

/// Everything one pipeline run produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    /// Transform variant.
    pub variant: Variant,
    /// Daily counts the model was trained on.
    pub daily: DailyCountSeries,
    /// Clipping summary, when outliers were mitigated.
    pub outliers: Option<OutlierReport>,
    /// Forecast in log space, with component breakdown.
    pub forecast: Forecast,
    /// Forecast on the count scale.
    pub counts: Vec<CountForecastPoint>,
    /// MAPE over the history.
    pub accuracy: AccuracyReport,
    /// Dates the trend may change rate at.
    pub changepoints: Vec<NaiveDate>,
    /// Residual noise standard deviation in log space.
    pub noise_sd: f64,
}

/// Both variants on the same daily series.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    /// Log transform only.
    pub as_is: PipelineReport,
    /// Outliers clipped before the log transform.
    pub mitigated: PipelineReport,
}

impl Comparison {
    /// MAPE of the as-is run minus MAPE of the mitigated run, in percentage
    /// points. Positive when mitigation helped.
    #[must_use]
    pub fn mape_improvement(&self) -> f64 {
        self.as_is.accuracy.mape - self.mitigated.accuracy.mape
    }

    /// Both reports in table order.
    #[must_use]
    pub const fn reports(&self) -> [&PipelineReport; 2] {
        [&self.as_is, &self.mitigated]
    }
}

/// Runs transform, forecast and evaluation on an already aggregated series.
///
/// # Errors
///
/// Returns [`PipelineError`] if any stage fails.
pub fn run_series(
    daily: &DailyCountSeries,
    config: &PipelineConfig,
) -> Result<PipelineReport, PipelineError> {
    let variant = Variant::from_mitigation(config.transform.mitigate_outliers);
    log::info!("[{variant}] Transforming {} days", daily.len());

    let prepared = transform(daily, &config.transform)?;
    if let Some(report) = &prepared.outliers {
        log::info!(
            "[{variant}] Clipped {} outlier(s) ({} above, {} below)",
            report.clipped(),
            report.above,
            report.below
        );
    }
    let excluded = prepared.series.len() - prepared.series.observed_count();
    if excluded > 0 {
        log::warn!("[{variant}] {excluded} day(s) left out of the fit");
    }

    log::info!(
        "[{variant}] Fitting on {} observed days",
        prepared.series.observed_count()
    );
    let model = crime_forecast_forecast::fit(&prepared.series, &config.forecast)?;
    let forecast = model.predict(config.forecast.horizon_days);
    let counts = to_count_scale(&forecast);
    let accuracy = mape(&counts, daily)?;

    log::info!(
        "[{variant}] MAPE {:.2}% over {} days ({} zero-count days excluded)",
        accuracy.mape,
        accuracy.compared_days,
        accuracy.excluded_zero_actuals
    );

    Ok(PipelineReport {
        variant,
        daily: daily.clone(),
        outliers: prepared.outliers,
        changepoints: model.changepoint_dates().to_vec(),
        noise_sd: model.noise_sd(),
        forecast,
        counts,
        accuracy,
    })
}

/// Aggregates `events` and runs the configured variant.
///
/// # Errors
///
/// Returns [`PipelineError`] if any stage fails.
pub fn run(events: &[Event], config: &PipelineConfig) -> Result<PipelineReport, PipelineError> {
    let daily = aggregate_daily(events)?;
    run_series(&daily, config)
}

/// Aggregates `events` once and runs both variants on the result.
///
/// # Errors
///
/// Returns [`PipelineError`] if either run fails.
pub fn compare(events: &[Event], config: &PipelineConfig) -> Result<Comparison, PipelineError> {
    let daily = aggregate_daily(events)?;
    let as_is = run_series(&daily, &config.with_mitigation(false))?;
    let mitigated = run_series(&daily, &config.with_mitigation(true))?;

    log::info!(
        "MAPE as-is {:.2}%, mitigated {:.2}%",
        as_is.accuracy.mape,
        mitigated.accuracy.mape
    );

    Ok(Comparison { as_is, mitigated })
}

/// Aggregates `events` and backtests the configured variant.
///
/// # Errors
///
/// Returns [`PipelineError`] if aggregation or any fold fails.
pub fn cross_validate(
    events: &[Event],
    config: &PipelineConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<Vec<CrossValidationFold>, PipelineError> {
    let daily = aggregate_daily(events)?;
    Ok(diagnostics::cross_validate(
        &daily,
        &config.transform,
        &config.forecast,
        &config.cross_validation,
        progress,
    )?)
}

#[cfg(test)]
mod tests {
    use crime_forecast_forecast_models::{ForecastConfig, SeasonalityConfig};

    use super::*;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
    }

    fn events_from_counts(counts: &[u64]) -> Vec<Event> {
        start()
            .iter_days()
            .zip(counts)
            .flat_map(|(date, &n)| std::iter::repeat_n(Event::on(date), usize::try_from(n).unwrap()))
            .collect()
    }

    fn weekly_config(horizon_days: usize) -> PipelineConfig {
        PipelineConfig {
            forecast: ForecastConfig {
                seasonalities: vec![SeasonalityConfig::new("weekly", 7.0, 3)],
                horizon_days,
                ..ForecastConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn run_produces_history_plus_horizon() {
        let pattern = [6, 5, 4, 5, 6, 9, 11];
        let counts: Vec<u64> = (0..140).map(|i| pattern[i % 7]).collect();
        let report = run(&events_from_counts(&counts), &weekly_config(28)).unwrap();

        assert_eq!(report.variant, Variant::AsIs);
        assert!(report.outliers.is_none());
        assert_eq!(report.daily.len(), 140);
        assert_eq!(report.counts.len(), 140 + 28);
        assert_eq!(report.accuracy.compared_days, 140);
        assert!(report.accuracy.mape < 1.0, "MAPE {}", report.accuracy.mape);
        for point in &report.counts {
            assert!(point.lower <= point.estimate && point.estimate <= point.upper);
            assert!(point.estimate > 0.0);
        }
    }

    #[test]
    fn compare_mitigates_isolated_spike() {
        let events = events_from_counts(&[5, 5, 5, 5, 5, 5, 5, 5, 5, 100]);
        let config = PipelineConfig {
            forecast: ForecastConfig {
                seasonalities: Vec::new(),
                min_observations: 5,
                horizon_days: 5,
                ..ForecastConfig::default()
            },
            ..PipelineConfig::default()
        };
        let comparison = compare(&events, &config).unwrap();

        assert!(comparison.as_is.outliers.is_none());
        let clipped = comparison.mitigated.outliers.as_ref().unwrap();
        assert_eq!(clipped.clipped_dates, vec![start() + chrono::Duration::days(9)]);

        let spike = start() + chrono::Duration::days(9);
        let width = |r: &PipelineReport| {
            let p = r.forecast.get(spike).unwrap();
            p.upper - p.lower
        };
        assert!(width(&comparison.as_is) > 10.0 * width(&comparison.mitigated) + 0.1);
        assert_eq!(comparison.reports()[1].variant, Variant::Mitigated);
    }

    /// About three years of counts with weekly and yearly swings plus
    /// deterministic jitter.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn seasonal_counts(days: usize) -> Vec<u64> {
        use std::f64::consts::TAU;
        (0..days)
            .map(|i| {
                let day = i as f64;
                let level = 20.0
                    * (0.2 * (TAU * day / 7.0).sin() + 0.3 * (TAU * day / 365.25).cos()).exp();
                let jitter = (day * 12.9898).sin() * 43_758.545_3;
                let jitter = 4.0 * (jitter - jitter.floor()) - 2.0;
                (level + jitter).round().max(1.0) as u64
            })
            .collect()
    }

    #[test]
    fn default_config_fits_multi_year_history() {
        let events = events_from_counts(&seasonal_counts(1200));
        let config = PipelineConfig::default();
        let comparison = compare(&events, &config).unwrap();

        for report in comparison.reports() {
            assert_eq!(report.daily.len(), 1200);
            assert_eq!(report.counts.len(), 1200 + 365);
            assert_eq!(report.forecast.component_names.len(), 3);
            assert_eq!(report.accuracy.compared_days, 1200);
            assert!(report.accuracy.mape < 20.0, "MAPE {}", report.accuracy.mape);
            for point in &report.counts {
                assert!(point.lower.is_finite() && point.upper.is_finite());
                assert!(point.lower <= point.estimate && point.estimate <= point.upper);
            }
        }
    }

    #[test]
    fn empty_event_log_is_malformed() {
        assert!(matches!(
            run(&[], &weekly_config(7)),
            Err(PipelineError::Series(SeriesError::EmptyInput))
        ));
    }

    #[test]
    fn short_history_surfaces_forecast_error() {
        let events = events_from_counts(&[3; 10]);
        assert!(matches!(
            run(&events, &weekly_config(7)),
            Err(PipelineError::Forecast(ForecastError::InsufficientHistory { .. }))
        ));
    }
}
