//! Rolling-origin cross-validation.
//!
//! Each fold trains on the history up to and including a cutoff date and is
//! scored on the following `horizon_days` actual counts. The first cutoff
//! leaves `initial_days` of training history; later cutoffs advance by
//! `period_days` as long as the whole horizon still fits in the series.

use std::sync::Arc;

use chrono::Days;
use crime_forecast_forecast_models::{CrossValidationConfig, CrossValidationFold, ForecastConfig};
use crime_forecast_series::progress::ProgressCallback;
use crime_forecast_series::transform::transform;
use crime_forecast_series_models::{DailyCountSeries, TransformConfig};

use crate::ForecastError;
use crate::evaluate::{holdout_mape, to_count_scale};
use crate::model::fit;

/// Indices of the last training day of every fold.
fn cutoff_indices(len: usize, config: &CrossValidationConfig) -> Vec<usize> {
    if config.initial_days == 0 || config.horizon_days == 0 {
        return Vec::new();
    }
    let step = config.period_days.max(1);
    (config.initial_days - 1..)
        .step_by(step)
        .take_while(|cutoff| cutoff.saturating_add(config.horizon_days) < len)
        .collect()
}

/// Backtests the transform and forecast configuration on `daily`.
///
/// # Errors
///
/// * [`ForecastError::InsufficientHistory`] if the series is too short for a
///   single fold.
/// * Any error from transforming, fitting or scoring a fold.
pub fn cross_validate(
    daily: &DailyCountSeries,
    transform_config: &TransformConfig,
    forecast_config: &ForecastConfig,
    config: &CrossValidationConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<Vec<CrossValidationFold>, ForecastError> {
    let cutoffs = cutoff_indices(daily.len(), config);
    if cutoffs.is_empty() {
        return Err(ForecastError::InsufficientHistory {
            message: format!(
                "{} days cannot hold {} training days plus a {}-day horizon",
                daily.len(),
                config.initial_days,
                config.horizon_days
            ),
        });
    }

    log::info!(
        "Cross-validating {} folds ({} initial, every {} days, {}-day horizon)",
        cutoffs.len(),
        config.initial_days,
        config.period_days,
        config.horizon_days
    );
    progress.set_total(cutoffs.len() as u64);

    let mut folds = Vec::with_capacity(cutoffs.len());
    for index in cutoffs {
        let cutoff = daily.date_at(index);
        progress.set_message(format!("cutoff {cutoff}"));

        let training = daily.through(cutoff);
        let prepared = transform(&training, transform_config)?;
        let model = fit(&prepared.series, forecast_config)?;
        let predicted = to_count_scale(&model.predict(config.horizon_days));

        let horizon_end = cutoff
            .checked_add_days(Days::new(config.horizon_days as u64))
            .unwrap_or(cutoff);
        let actual = daily.through(horizon_end);
        let accuracy = holdout_mape(&predicted, &actual)?;

        log::info!(
            "Fold at {cutoff}: MAPE {:.2}% over {} days",
            accuracy.mape,
            accuracy.compared_days
        );
        folds.push(CrossValidationFold {
            cutoff,
            horizon_days: config.horizon_days,
            accuracy,
        });
        progress.inc(1);
    }

    progress.finish(format!("{} folds", folds.len()));
    Ok(folds)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use crime_forecast_forecast_models::SeasonalityConfig;
    use crime_forecast_series::progress::null_progress;

    use super::*;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 1, 1).unwrap()
    }

    fn weekly_counts(days: usize) -> DailyCountSeries {
        let pattern = [12, 10, 9, 10, 11, 15, 18];
        DailyCountSeries::new(start(), (0..days).map(|i| pattern[i % 7]).collect())
    }

    fn forecast_config() -> ForecastConfig {
        ForecastConfig {
            seasonalities: vec![SeasonalityConfig::new("weekly", 7.0, 3)],
            ..ForecastConfig::default()
        }
    }

    #[test]
    fn cutoffs_advance_by_period() {
        let config = CrossValidationConfig {
            initial_days: 365,
            period_days: 180,
            horizon_days: 30,
        };
        assert_eq!(cutoff_indices(730, &config), vec![364, 544]);
        assert!(cutoff_indices(394, &config).is_empty());
        assert_eq!(cutoff_indices(395, &config), vec![364]);

        let endless = CrossValidationConfig {
            horizon_days: usize::MAX,
            ..config
        };
        assert!(cutoff_indices(730, &endless).is_empty());
    }

    #[test]
    fn scores_each_fold_in_order() {
        let config = CrossValidationConfig {
            initial_days: 365,
            period_days: 180,
            horizon_days: 30,
        };
        let folds = cross_validate(
            &weekly_counts(730),
            &TransformConfig::default(),
            &forecast_config(),
            &config,
            &null_progress(),
        )
        .unwrap();

        assert_eq!(folds.len(), 2);
        assert_eq!(folds[0].cutoff, start() + chrono::Duration::days(364));
        assert!(folds[0].cutoff < folds[1].cutoff);
        for fold in &folds {
            assert_eq!(fold.accuracy.compared_days, 30);
            assert!(fold.accuracy.mape >= 0.0);
            assert!(fold.accuracy.mape < 1.0, "MAPE {}", fold.accuracy.mape);
        }
    }

    #[test]
    fn short_series_has_no_fold() {
        let result = cross_validate(
            &weekly_counts(100),
            &TransformConfig::default(),
            &forecast_config(),
            &CrossValidationConfig::default(),
            &null_progress(),
        );
        assert!(matches!(
            result,
            Err(ForecastError::InsufficientHistory { .. })
        ));
    }
}
