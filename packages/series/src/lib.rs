#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Daily aggregation and log-space transforms for incident event logs.
//!
//! [`aggregate`] turns raw events into a gap-free [`DailyCountSeries`] and
//! [`transform`] produces the log-space [`TransformedSeries`] the forecaster
//! fits on, optionally clipping outliers to missing first.
//!
//! [`DailyCountSeries`]: crime_forecast_series_models::DailyCountSeries
//! [`TransformedSeries`]: crime_forecast_series_models::TransformedSeries

pub mod aggregate;
pub mod progress;
pub mod transform;

use chrono::NaiveDate;
use thiserror::Error;

/// Errors that can occur while building or transforming a series.
#[derive(Debug, Error)]
pub enum SeriesError {
    /// There were no events to aggregate.
    #[error("Malformed input: no events to aggregate")]
    EmptyInput,

    /// A zero or negative count reached the log transform.
    #[error("Degenerate transform: count {count} on {date} has no logarithm")]
    DegenerateTransform {
        /// Day with the offending count.
        date: NaiveDate,
        /// The offending count.
        count: u64,
    },

    /// A transform parameter was out of range.
    #[error("Invalid parameter: {message}")]
    InvalidParameter {
        /// Description of what went wrong.
        message: String,
    },
}
