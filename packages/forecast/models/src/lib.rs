#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Forecast configuration and result types.
//!
//! Configuration types deserialize from TOML with every field defaulted, so
//! a config file only needs to name what it overrides.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One periodic component of the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SeasonalityConfig {
    /// Component name, unique within a config (e.g. `"monthly"`).
    pub name: String,
    /// Period in days.
    pub period_days: f64,
    /// Number of Fourier harmonics.
    pub order: u32,
    /// Prior standard deviation for this component's coefficients.
    /// Falls back to [`ForecastConfig::seasonality_prior_scale`].
    #[serde(default)]
    pub prior_scale: Option<f64>,
}

impl SeasonalityConfig {
    /// Creates a component with the shared prior scale.
    #[must_use]
    pub fn new(name: &str, period_days: f64, order: u32) -> Self {
        Self {
            name: name.to_string(),
            period_days,
            order,
            prior_scale: None,
        }
    }
}

/// Settings for fitting and extrapolating the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ForecastConfig {
    /// Width of the uncertainty interval (e.g. 0.95).
    pub interval_width: f64,
    /// Days to forecast past the last historical date.
    pub horizon_days: usize,
    /// Periodic components.
    pub seasonalities: Vec<SeasonalityConfig>,
    /// Number of potential trend changepoints.
    pub n_changepoints: usize,
    /// Fraction of the observed history changepoints are placed in.
    pub changepoint_range: f64,
    /// Prior standard deviation of each changepoint's rate adjustment.
    pub changepoint_prior_scale: f64,
    /// Default prior standard deviation of seasonal coefficients.
    pub seasonality_prior_scale: f64,
    /// Prior standard deviation of the base growth rate and offset.
    pub trend_prior_scale: f64,
    /// Fewest observed days a fit is attempted on.
    pub min_observations: usize,
    /// Fewest cycles of the longest period the observed span must cover.
    pub min_seasonal_cycles: f64,
}

impl ForecastConfig {
    /// Monthly (30.5 days), "weekly" (52 days) and "daily" (365 days)
    /// components with ten harmonics each.
    #[must_use]
    pub fn default_seasonalities() -> Vec<SeasonalityConfig> {
        vec![
            SeasonalityConfig::new("monthly", 30.5, 10),
            SeasonalityConfig::new("weekly", 52.0, 10),
            SeasonalityConfig::new("daily", 365.0, 10),
        ]
    }

    /// Prior scale used for `seasonality`.
    #[must_use]
    pub fn prior_scale_for(&self, seasonality: &SeasonalityConfig) -> f64 {
        seasonality
            .prior_scale
            .unwrap_or(self.seasonality_prior_scale)
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            interval_width: 0.95,
            horizon_days: 365,
            seasonalities: Self::default_seasonalities(),
            n_changepoints: 25,
            changepoint_range: 0.8,
            changepoint_prior_scale: 0.05,
            seasonality_prior_scale: 10.0,
            trend_prior_scale: 5.0,
            min_observations: 30,
            min_seasonal_cycles: 1.0,
        }
    }
}

/// One forecast row in log space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPoint {
    /// Calendar day.
    pub date: NaiveDate,
    /// Point estimate.
    pub estimate: f64,
    /// Lower interval bound.
    pub lower: f64,
    /// Upper interval bound.
    pub upper: f64,
    /// Trend contribution (includes the series level).
    pub trend: f64,
    /// Seasonal contributions, in [`Forecast::component_names`] order.
    pub seasonal: Vec<f64>,
    /// Whether the date falls inside the fitted history.
    pub is_history: bool,
}

/// Forecast over the history plus a future horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Forecast {
    /// Seasonal component names.
    pub component_names: Vec<String>,
    /// Interval width the bounds were computed at.
    pub interval_width: f64,
    /// Rows in date order.
    pub points: Vec<ForecastPoint>,
}

impl Forecast {
    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Rows inside the fitted history.
    pub fn history(&self) -> impl Iterator<Item = &ForecastPoint> {
        self.points.iter().filter(|p| p.is_history)
    }

    /// Rows past the fitted history.
    pub fn future(&self) -> impl Iterator<Item = &ForecastPoint> {
        self.points.iter().filter(|p| !p.is_history)
    }

    /// Row for `date`, if forecast.
    #[must_use]
    pub fn get(&self, date: NaiveDate) -> Option<&ForecastPoint> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|i| &self.points[i])
    }
}

/// One forecast row on the count scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountForecastPoint {
    /// Calendar day.
    pub date: NaiveDate,
    /// Point estimate of the daily count.
    pub estimate: f64,
    /// Lower interval bound.
    pub lower: f64,
    /// Upper interval bound.
    pub upper: f64,
    /// Whether the date falls inside the fitted history.
    pub is_history: bool,
}

/// Forecast accuracy over the historical overlap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccuracyReport {
    /// Mean absolute percentage error, in percent.
    pub mape: f64,
    /// Days that contributed to the average.
    pub compared_days: usize,
    /// Days skipped because the actual count was zero.
    pub excluded_zero_actuals: usize,
}

/// Rolling-origin backtest settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct CrossValidationConfig {
    /// Days of history before the first cutoff.
    pub initial_days: usize,
    /// Days between consecutive cutoffs.
    pub period_days: usize,
    /// Days scored after each cutoff.
    pub horizon_days: usize,
}

impl Default for CrossValidationConfig {
    fn default() -> Self {
        Self {
            initial_days: 1095,
            period_days: 183,
            horizon_days: 365,
        }
    }
}

/// Result of one cross-validation fold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossValidationFold {
    /// Last training date.
    pub cutoff: NaiveDate,
    /// Days scored after the cutoff.
    pub horizon_days: usize,
    /// Accuracy over the scored days.
    pub accuracy: AccuracyReport,
}
