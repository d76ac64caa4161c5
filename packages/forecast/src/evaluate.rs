//! Mapping forecasts back to counts and scoring them against actuals.

use crime_forecast_forecast_models::{AccuracyReport, CountForecastPoint, Forecast};
use crime_forecast_series_models::DailyCountSeries;

use crate::ForecastError;

/// Exponentiates estimate and bounds of every forecast point.
#[must_use]
pub fn to_count_scale(forecast: &Forecast) -> Vec<CountForecastPoint> {
    forecast
        .points
        .iter()
        .map(|p| CountForecastPoint {
            date: p.date,
            estimate: p.estimate.exp(),
            lower: p.lower.exp(),
            upper: p.upper.exp(),
            is_history: p.is_history,
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn score<'a>(
    points: impl Iterator<Item = &'a CountForecastPoint>,
    actual: &DailyCountSeries,
) -> Result<AccuracyReport, ForecastError> {
    let mut total = 0.0;
    let mut compared_days = 0_usize;
    let mut excluded_zero_actuals = 0_usize;

    for point in points {
        match actual.get(point.date) {
            None => {}
            Some(0) => excluded_zero_actuals += 1,
            Some(count) => {
                let a = count as f64;
                total += (point.estimate - a).abs() / a;
                compared_days += 1;
            }
        }
    }

    if excluded_zero_actuals > 0 {
        log::warn!("Excluded {excluded_zero_actuals} zero-count day(s) from MAPE");
    }

    if compared_days == 0 {
        return Err(ForecastError::MetricUndefined {
            message: format!(
                "no day with a non-zero actual count overlaps the forecast \
                 ({excluded_zero_actuals} zero-count day(s) skipped)"
            ),
        });
    }

    Ok(AccuracyReport {
        mape: 100.0 * total / compared_days as f64,
        compared_days,
        excluded_zero_actuals,
    })
}

/// MAPE of the historical part of a count-scale forecast.
///
/// Days whose actual count is zero have no percentage error; they are left
/// out of the average and counted in
/// [`AccuracyReport::excluded_zero_actuals`].
///
/// # Errors
///
/// Returns [`ForecastError::MetricUndefined`] if no historical day has a
/// non-zero actual count.
pub fn mape(
    forecast: &[CountForecastPoint],
    actual: &DailyCountSeries,
) -> Result<AccuracyReport, ForecastError> {
    score(forecast.iter().filter(|p| p.is_history), actual)
}

/// MAPE of the future part of a count-scale forecast against held-out
/// actuals.
///
/// # Errors
///
/// Same as [`mape`].
pub fn holdout_mape(
    forecast: &[CountForecastPoint],
    actual: &DailyCountSeries,
) -> Result<AccuracyReport, ForecastError> {
    score(forecast.iter().filter(|p| !p.is_history), actual)
}
