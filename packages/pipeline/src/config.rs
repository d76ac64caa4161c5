//! TOML pipeline configuration.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) runs the as-is variant with the stock seasonal components:
//!
//! ```toml
//! [input]
//! date_column = "occurred_date"
//!
//! [input.filter]
//! offenses = "violent"
//!
//! [transform]
//! mitigate_outliers = true
//! outlier_threshold = 3.0
//! zero_counts = { policy = "exclude" }
//!
//! [forecast]
//! horizon_days = 365
//! interval_width = 0.95
//! seasonalities = [{ name = "weekly", period_days = 7.0, order = 3 }]
//! ```

use std::path::Path;

use crime_forecast_forecast_models::{CrossValidationConfig, ForecastConfig};
use crime_forecast_ingest::CsvOptions;
use crime_forecast_series_models::TransformConfig;
use serde::{Deserialize, Serialize};

use crate::PipelineError;

/// All settings for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct PipelineConfig {
    /// How the event log is read and filtered.
    pub input: CsvOptions,
    /// Outlier clipping and log transform.
    pub transform: TransformConfig,
    /// Model and horizon.
    pub forecast: ForecastConfig,
    /// Backtest settings.
    pub cross_validation: CrossValidationConfig,
}

impl PipelineConfig {
    /// Parses a configuration from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the TOML is malformed or a field
    /// has the wrong type.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, PipelineError> {
        Ok(toml::de::from_str(toml_str)?)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Io`] if the file cannot be read, or
    /// [`PipelineError::Config`] if it does not parse.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        log::debug!("Loaded pipeline config from {}", path.display());
        Ok(config)
    }

    /// Same configuration with outlier mitigation switched on or off.
    #[must_use]
    pub fn with_mitigation(&self, mitigate_outliers: bool) -> Self {
        let mut config = self.clone();
        config.transform.mitigate_outliers = mitigate_outliers;
        config
    }
}
