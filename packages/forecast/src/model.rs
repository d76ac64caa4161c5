//! Fitting and extrapolating the additive model.

use std::collections::BTreeSet;

use chrono::{Days, NaiveDate};
use crime_forecast_forecast_models::{Forecast, ForecastConfig, ForecastPoint};
use crime_forecast_series_models::TransformedSeries;
use ndarray::{Array1, ArrayView1};

use crate::ForecastError;
use crate::features::{DesignSpec, SeasonalTerm, epoch_days, place_changepoints};
use crate::quantile::student_t_quantile;
use crate::regression::{Posterior, fit_penalized, partial_dot, stack_rows};

/// A model fitted to one transformed series, used read-only to predict.
#[derive(Debug, Clone)]
pub struct FittedModel {
    spec: DesignSpec,
    posterior: Posterior,
    /// Response is modelled as `(y - offset) / scale`.
    offset: f64,
    scale: f64,
    quantile: f64,
    interval_width: f64,
    history_start: NaiveDate,
    history_len: usize,
    changepoint_dates: Vec<NaiveDate>,
}

/// Longest horizon a forecast may extend past its history.
pub const MAX_HORIZON_DAYS: usize = 36_525;

fn invalid(message: String) -> ForecastError {
    ForecastError::InvalidConfig { message }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn validate(config: &ForecastConfig) -> Result<(), ForecastError> {
    if !(config.interval_width > 0.0 && config.interval_width < 1.0) {
        return Err(invalid(format!(
            "interval_width must be in (0, 1), got {}",
            config.interval_width
        )));
    }
    if !(config.changepoint_range > 0.0 && config.changepoint_range <= 1.0) {
        return Err(invalid(format!(
            "changepoint_range must be in (0, 1], got {}",
            config.changepoint_range
        )));
    }
    if config.horizon_days > MAX_HORIZON_DAYS {
        return Err(invalid(format!(
            "horizon_days must be at most {MAX_HORIZON_DAYS}, got {}",
            config.horizon_days
        )));
    }
    for (name, value) in [
        ("changepoint_prior_scale", config.changepoint_prior_scale),
        ("seasonality_prior_scale", config.seasonality_prior_scale),
        ("trend_prior_scale", config.trend_prior_scale),
    ] {
        if !positive(value) {
            return Err(invalid(format!("{name} must be positive, got {value}")));
        }
    }
    if !(config.min_seasonal_cycles.is_finite() && config.min_seasonal_cycles >= 0.0) {
        return Err(invalid(format!(
            "min_seasonal_cycles must be non-negative, got {}",
            config.min_seasonal_cycles
        )));
    }

    let mut names = BTreeSet::new();
    for seasonality in &config.seasonalities {
        if !names.insert(seasonality.name.as_str()) {
            return Err(invalid(format!(
                "seasonality '{}' is configured twice",
                seasonality.name
            )));
        }
        if !positive(seasonality.period_days) {
            return Err(invalid(format!(
                "seasonality '{}' needs a positive period, got {}",
                seasonality.name, seasonality.period_days
            )));
        }
        if seasonality.order == 0 {
            return Err(invalid(format!(
                "seasonality '{}' needs at least one harmonic",
                seasonality.name
            )));
        }
        let prior = config.prior_scale_for(seasonality);
        if !positive(prior) {
            return Err(invalid(format!(
                "seasonality '{}' needs a positive prior scale, got {prior}",
                seasonality.name
            )));
        }
    }

    Ok(())
}

/// Fits the model to the observed (non-missing) days of `series`.
///
/// # Errors
///
/// * [`ForecastError::InvalidConfig`] if `config` is out of range.
/// * [`ForecastError::InsufficientHistory`] if fewer than
///   `config.min_observations` days are observed, or the observed span is
///   shorter than `config.min_seasonal_cycles` periods of the longest
///   seasonal component.
/// * [`ForecastError::Numerical`] if an observation is not finite or the
///   regression cannot be solved.
#[allow(clippy::cast_precision_loss, clippy::too_many_lines)]
pub fn fit(series: &TransformedSeries, config: &ForecastConfig) -> Result<FittedModel, ForecastError> {
    validate(config)?;

    let observed: Vec<(NaiveDate, f64)> = series.observed().collect();
    if let Some((date, value)) = observed.iter().find(|(_, v)| !v.is_finite()) {
        return Err(ForecastError::Numerical {
            message: format!("observation on {date} is not finite ({value})"),
        });
    }

    let required = config.min_observations.max(2);
    if observed.len() < required {
        return Err(ForecastError::InsufficientHistory {
            message: format!(
                "{} observed days, need at least {required}",
                observed.len()
            ),
        });
    }

    let (first, _) = observed[0];
    let (last, _) = observed[observed.len() - 1];
    let span_days = (last - first).num_days() as f64;
    if span_days <= 0.0 {
        return Err(ForecastError::InsufficientHistory {
            message: "all observations fall on a single day".to_string(),
        });
    }
    if let Some(longest) = config
        .seasonalities
        .iter()
        .max_by(|a, b| a.period_days.total_cmp(&b.period_days))
    {
        let needed = config.min_seasonal_cycles * longest.period_days;
        if span_days < needed {
            return Err(ForecastError::InsufficientHistory {
                message: format!(
                    "observed span of {span_days} days is shorter than {} cycle(s) of the \
                     {}-day '{}' component ({needed} days)",
                    config.min_seasonal_cycles, longest.period_days, longest.name
                ),
            });
        }
    }

    let n = observed.len() as f64;
    let offset = observed.iter().map(|(_, v)| v).sum::<f64>() / n;
    let max_dev = observed
        .iter()
        .map(|(_, v)| (v - offset).abs())
        .fold(0.0_f64, f64::max);
    let scale = if max_dev > f64::EPSILON { max_dev } else { 1.0 };

    let t_start = epoch_days(first);
    let observed_t: Vec<f64> = observed
        .iter()
        .map(|(d, _)| (epoch_days(*d) - t_start) / span_days)
        .collect();
    let changepoints =
        place_changepoints(&observed_t, config.n_changepoints, config.changepoint_range);

    let spec = DesignSpec {
        t_start,
        t_span: span_days,
        changepoints,
        seasonal: config
            .seasonalities
            .iter()
            .map(|s| SeasonalTerm {
                name: s.name.clone(),
                period: s.period_days,
                order: s.order,
            })
            .collect(),
    };

    let rows: Vec<Vec<f64>> = observed.iter().map(|(d, _)| spec.row(*d)).collect();
    let x = stack_rows(&rows, spec.n_columns())?;
    let y: Array1<f64> = observed.iter().map(|(_, v)| (v - offset) / scale).collect();

    let mut penalty = Vec::with_capacity(spec.n_columns());
    let trend_precision = config.trend_prior_scale.powi(-2);
    penalty.extend([trend_precision, trend_precision]);
    penalty.extend(std::iter::repeat_n(
        config.changepoint_prior_scale.powi(-2),
        spec.changepoints.len(),
    ));
    for seasonality in &config.seasonalities {
        penalty.extend(std::iter::repeat_n(
            config.prior_scale_for(seasonality).powi(-2),
            2 * seasonality.order as usize,
        ));
    }
    let posterior = fit_penalized(&x, &y, &Array1::from(penalty))?;

    let quantile = student_t_quantile(
        f64::midpoint(1.0, config.interval_width),
        posterior.residual_dof(),
    );

    let changepoint_dates = spec
        .changepoints
        .iter()
        .filter_map(|t| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let offset_days = (t * span_days).round() as u64;
            first.checked_add_days(Days::new(offset_days))
        })
        .collect();

    log::info!(
        "Fitted model on {} of {} days: {} changepoints, {} seasonal components, {} coefficients, \
         noise sd {:.4} (log scale), {:.1} residual dof",
        observed.len(),
        series.len(),
        spec.changepoints.len(),
        spec.seasonal.len(),
        spec.n_columns(),
        posterior.noise_variance().sqrt() * scale,
        posterior.residual_dof(),
    );

    Ok(FittedModel {
        spec,
        posterior,
        offset,
        scale,
        quantile,
        interval_width: config.interval_width,
        history_start: series.start(),
        history_len: series.len(),
        changepoint_dates,
    })
}

impl FittedModel {
    /// Dates the trend is allowed to change rate at.
    #[must_use]
    pub fn changepoint_dates(&self) -> &[NaiveDate] {
        &self.changepoint_dates
    }

    /// Estimated noise standard deviation in log space.
    #[must_use]
    pub fn noise_sd(&self) -> f64 {
        self.posterior.noise_variance().sqrt() * self.scale
    }

    /// Number of days in the fitted history, missing ones included.
    #[must_use]
    pub const fn history_len(&self) -> usize {
        self.history_len
    }

    fn point(&self, date: NaiveDate, is_history: bool) -> ForecastPoint {
        let row = Array1::from(self.spec.row(date));
        let view: ArrayView1<'_, f64> = row.view();

        let estimate = self.offset + self.scale * self.posterior.predict(view);
        let half_width =
            self.quantile * self.posterior.predictive_variance(view).sqrt() * self.scale;
        let trend = self.offset
            + self.scale * partial_dot(view, &self.posterior.coefficients, self.spec.trend_columns());
        let seasonal = (0..self.spec.seasonal.len())
            .map(|i| {
                self.scale
                    * partial_dot(
                        view,
                        &self.posterior.coefficients,
                        self.spec.seasonal_columns(i),
                    )
            })
            .collect();

        ForecastPoint {
            date,
            estimate,
            lower: estimate - half_width,
            upper: estimate + half_width,
            trend,
            seasonal,
            is_history,
        }
    }

    /// Predicts every historical date plus `horizon` days after the last
    /// one.
    #[must_use]
    pub fn predict(&self, horizon: usize) -> Forecast {
        let points = self
            .history_start
            .iter_days()
            .take(self.history_len.saturating_add(horizon))
            .enumerate()
            .map(|(i, date)| self.point(date, i < self.history_len))
            .collect();

        Forecast {
            component_names: self.spec.seasonal.iter().map(|s| s.name.clone()).collect(),
            interval_width: self.interval_width,
            points,
        }
    }
}

/// Fits `series` and predicts `config.horizon_days` past its end.
///
/// # Errors
///
/// Same as [`fit`].
pub fn forecast(series: &TransformedSeries, config: &ForecastConfig) -> Result<Forecast, ForecastError> {
    let model = fit(series, config)?;
    let forecast = model.predict(config.horizon_days);
    log::info!(
        "Forecast {} days ({} history, {} ahead)",
        forecast.len(),
        model.history_len(),
        config.horizon_days
    );
    Ok(forecast)
}

#[cfg(test)]
mod tests {
    use crime_forecast_forecast_models::SeasonalityConfig;
    use crime_forecast_series::transform::transform;
    use crime_forecast_series_models::{DailyCountSeries, Observation, TransformConfig};

    use super::*;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2019, 1, 1).unwrap()
    }

    fn log_series(values: &[f64]) -> TransformedSeries {
        TransformedSeries::new(
            start(),
            values.iter().map(|&v| Observation::Observed(v)).collect(),
        )
    }

    fn weekly_config() -> ForecastConfig {
        ForecastConfig {
            seasonalities: vec![SeasonalityConfig::new("weekly", 7.0, 3)],
            horizon_days: 30,
            ..ForecastConfig::default()
        }
    }

    fn width(point: &ForecastPoint) -> f64 {
        point.upper - point.lower
    }

    /// Deterministic noise in `[-1, 1]`.
    fn noise(i: usize) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let x = (i as f64 * 12.9898).sin() * 43_758.545_3;
        2.0 * (x - x.floor()) - 1.0
    }

    #[test]
    fn forecast_length_is_history_plus_horizon() {
        let values: Vec<f64> = (0..90).map(|i| 3.0 + 0.1 * noise(i)).collect();
        let forecast = forecast(&log_series(&values), &weekly_config()).unwrap();
        assert_eq!(forecast.len(), 90 + 30);
        assert_eq!(forecast.history().count(), 90);
        assert_eq!(forecast.future().count(), 30);
        assert_eq!(forecast.points[0].date, start());
        assert_eq!(forecast.component_names, vec!["weekly".to_string()]);
    }

    #[test]
    fn constant_series_forecasts_constant_with_zero_width() {
        let c: f64 = 20.0;
        let values = vec![c.ln(); 120];
        let config = ForecastConfig {
            seasonalities: vec![
                SeasonalityConfig::new("weekly", 7.0, 3),
                SeasonalityConfig::new("monthly", 30.5, 3),
            ],
            ..weekly_config()
        };
        let forecast = forecast(&log_series(&values), &config).unwrap();
        for point in forecast.future() {
            assert!((point.estimate.exp() - c).abs() < 1e-6 * c);
            assert!(width(point) < 1e-9);
        }
    }

    #[test]
    fn default_components_hold_a_constant_level() {
        let c: f64 = 17.0;
        let config = ForecastConfig::default();
        let forecast = forecast(&log_series(&vec![c.ln(); 800]), &config).unwrap();
        assert_eq!(forecast.len(), 800 + config.horizon_days);
        assert_eq!(forecast.component_names, ["monthly", "weekly", "daily"]);
        for point in forecast.future() {
            assert!((point.estimate.exp() - c).abs() < 1e-6 * c);
            assert!(width(point) < 1e-9);
        }
    }

    #[test]
    fn recovers_weekly_pattern() {
        let truth = |i: usize| {
            #[allow(clippy::cast_precision_loss)]
            let day = i as f64;
            3.0 + 0.5 * (std::f64::consts::TAU * (day + epoch_days(start())) / 7.0).sin()
        };
        let values: Vec<f64> = (0..200).map(truth).collect();
        let forecast = forecast(&log_series(&values), &weekly_config()).unwrap();
        for (i, point) in forecast.points.iter().enumerate() {
            assert!(
                (point.estimate - truth(i)).abs() < 0.02,
                "day {i}: {} vs {}",
                point.estimate,
                truth(i)
            );
        }
        // Component and trend add back up to the estimate.
        let p = &forecast.points[210];
        assert!((p.trend + p.seasonal[0] - p.estimate).abs() < 1e-9);
    }

    #[test]
    fn noisier_history_gives_wider_intervals() {
        let calm: Vec<f64> = (0..150).map(|i| 3.0 + 0.05 * noise(i)).collect();
        let rough: Vec<f64> = (0..150).map(|i| 3.0 + 0.5 * noise(i)).collect();
        let calm_fc = forecast(&log_series(&calm), &weekly_config()).unwrap();
        let rough_fc = forecast(&log_series(&rough), &weekly_config()).unwrap();
        let mean_width = |f: &Forecast| f.future().map(width).sum::<f64>() / 30.0;
        assert!(mean_width(&rough_fc) > 5.0 * mean_width(&calm_fc));
        for point in calm_fc.points.iter().chain(&rough_fc.points) {
            assert!(point.lower <= point.estimate && point.estimate <= point.upper);
        }
    }

    #[test]
    fn tolerates_missing_observations() {
        let values: Vec<Observation> = (0..100)
            .map(|i| {
                if i % 9 == 4 {
                    Observation::Missing
                } else {
                    Observation::Observed(2.0 + 0.1 * noise(i))
                }
            })
            .collect();
        let series = TransformedSeries::new(start(), values);
        let forecast = forecast(&series, &weekly_config()).unwrap();
        assert_eq!(forecast.len(), 130);
        assert!(forecast.points.iter().all(|p| p.estimate.is_finite()));
        // Missing dates are still predicted.
        assert!((forecast.points[4].estimate - 2.0).abs() < 0.2);
    }

    #[test]
    fn outlier_widens_unmitigated_band() {
        let daily = DailyCountSeries::new(start(), vec![5, 5, 5, 5, 5, 5, 5, 5, 5, 100]);
        let config = ForecastConfig {
            seasonalities: Vec::new(),
            min_observations: 5,
            horizon_days: 5,
            ..ForecastConfig::default()
        };

        let as_is = transform(&daily, &TransformConfig::default()).unwrap();
        let mitigated = transform(
            &daily,
            &TransformConfig {
                mitigate_outliers: true,
                ..TransformConfig::default()
            },
        )
        .unwrap();
        assert!(mitigated.series.values()[9].is_missing());

        let as_is_fc = forecast(&as_is.series, &config).unwrap();
        let mitigated_fc = forecast(&mitigated.series, &config).unwrap();
        let spike = daily.date_at(9);
        let as_is_width = width(as_is_fc.get(spike).unwrap());
        let mitigated_width = width(mitigated_fc.get(spike).unwrap());

        assert!(as_is_width > 0.5, "as-is width {as_is_width}");
        assert!(as_is_width > 10.0 * mitigated_width + 0.1);
        assert!((mitigated_fc.get(spike).unwrap().estimate.exp() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn short_history_is_rejected() {
        let values = vec![1.0; 20];
        assert!(matches!(
            fit(&log_series(&values), &weekly_config()),
            Err(ForecastError::InsufficientHistory { .. })
        ));

        let values: Vec<f64> = (0..60).map(|i| 3.0 + 0.1 * noise(i)).collect();
        let err = fit(&log_series(&values), &ForecastConfig::default()).unwrap_err();
        match err {
            ForecastError::InsufficientHistory { message } => assert!(message.contains("daily")),
            other => panic!("expected insufficient history, got {other:?}"),
        }

        let empty = TransformedSeries::new(start(), vec![Observation::Missing; 50]);
        assert!(fit(&empty, &weekly_config()).is_err());
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let series = log_series(&[1.0; 60]);
        let bad = [
            ForecastConfig {
                interval_width: 1.0,
                ..weekly_config()
            },
            ForecastConfig {
                changepoint_range: 0.0,
                ..weekly_config()
            },
            ForecastConfig {
                seasonalities: vec![SeasonalityConfig::new("weekly", 0.0, 3)],
                ..weekly_config()
            },
            ForecastConfig {
                seasonalities: vec![SeasonalityConfig::new("weekly", 7.0, 0)],
                ..weekly_config()
            },
            ForecastConfig {
                seasonalities: vec![
                    SeasonalityConfig::new("weekly", 7.0, 3),
                    SeasonalityConfig::new("weekly", 14.0, 3),
                ],
                ..weekly_config()
            },
            ForecastConfig {
                changepoint_prior_scale: -1.0,
                ..weekly_config()
            },
            ForecastConfig {
                horizon_days: usize::MAX,
                ..weekly_config()
            },
        ];
        for config in &bad {
            assert!(
                matches!(fit(&series, config), Err(ForecastError::InvalidConfig { .. })),
                "accepted {config:?}"
            );
        }
    }

    #[test]
    fn changepoints_fall_inside_history() {
        let values: Vec<f64> = (0..100).map(|i| 3.0 + 0.1 * noise(i)).collect();
        let model = fit(&log_series(&values), &weekly_config()).unwrap();
        let dates = model.changepoint_dates();
        assert_eq!(dates.len(), 25);
        assert!(dates.iter().all(|d| *d > start()));
        assert!(dates.iter().all(|d| (*d - start()).num_days() <= 80));
    }
}
