#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Seasonal forecaster and forecast evaluation for daily count series.
//!
//! The model is additive in log space: a piecewise-linear trend with
//! automatically placed changepoints plus one Fourier series per configured
//! seasonal component. Coefficients carry Gaussian priors, so the fit is a
//! penalized least-squares solve whose posterior also yields the interval
//! bounds. Missing observations are simply left out of the fit.
//!
//! * [`model`] fits and extrapolates.
//! * [`evaluate`] maps forecasts back to counts and computes MAPE.
//! * [`diagnostics`] runs rolling-origin cross-validation.

pub mod diagnostics;
pub mod evaluate;
pub mod features;
pub mod model;
pub mod quantile;
pub mod regression;

pub use model::{FittedModel, fit, forecast};

use thiserror::Error;

/// Errors that can occur while fitting or evaluating a forecast.
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Not enough observed history for the requested model.
    #[error("Insufficient history: {message}")]
    InsufficientHistory {
        /// Description of what went wrong.
        message: String,
    },

    /// A configuration value is out of range.
    #[error("Invalid forecast config: {message}")]
    InvalidConfig {
        /// Description of what went wrong.
        message: String,
    },

    /// The regression could not be solved.
    #[error("Numerical error: {message}")]
    Numerical {
        /// Description of what went wrong.
        message: String,
    },

    /// No day could contribute to the accuracy metric.
    #[error("Metric undefined: {message}")]
    MetricUndefined {
        /// Description of what went wrong.
        message: String,
    },

    /// Preparing a training series failed.
    #[error("Series error: {0}")]
    Series(#[from] crime_forecast_series::SeriesError),
}
