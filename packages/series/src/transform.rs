//! Log transform and standard-deviation outlier clipping.
//!
//! Outliers are marked missing rather than removed so the date axis stays
//! regular. The statistics are computed on untransformed counts.

use chrono::NaiveDate;
use crime_forecast_series_models::{
    DailyCountSeries, Observation, OutlierBasis, OutlierReport, TransformConfig,
    TransformedSeries, ZeroCountPolicy,
};

use crate::SeriesError;

/// A daily count series with some days clipped to missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClippedSeries {
    /// Date of the first entry.
    pub start: NaiveDate,
    /// Counts, `None` where the day was clipped.
    pub values: Vec<Option<u64>>,
}

/// Result of [`transform`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutput {
    /// Log-space series to fit on.
    pub series: TransformedSeries,
    /// Outlier summary when mitigation was enabled.
    pub outliers: Option<OutlierReport>,
}

fn validate_threshold(k: f64) -> Result<(), SeriesError> {
    if k.is_finite() && k > 0.0 {
        Ok(())
    } else {
        Err(SeriesError::InvalidParameter {
            message: format!("outlier threshold must be a positive number, got {k}"),
        })
    }
}

/// Mean and sample standard deviation (n - 1 denominator).
#[allow(clippy::cast_precision_loss)]
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, 0.0);
    }
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (mean, (ss / (n - 1.0)).sqrt())
}

/// Flags each day that lies more than `k` standard deviations from the
/// mean, returning one flag per day alongside the summary report.
///
/// With [`OutlierBasis::LeaveOneOut`] each day is compared against the mean
/// and standard deviation of every other day; series shorter than three days
/// have nothing to compare against and are returned unflagged.
///
/// # Errors
///
/// Returns [`SeriesError::InvalidParameter`] if `k` is not a positive
/// finite number.
#[allow(clippy::cast_precision_loss)]
pub fn detect_outliers(
    series: &DailyCountSeries,
    k: f64,
    basis: OutlierBasis,
) -> Result<(Vec<bool>, OutlierReport), SeriesError> {
    validate_threshold(k)?;

    let values: Vec<f64> = series.counts().iter().map(|&c| c as f64).collect();
    let (mean, std_dev) = mean_std(&values);

    // Work on values centered at the global mean to limit cancellation.
    let centered: Vec<f64> = values.iter().map(|v| v - mean).collect();
    let mut flags = vec![0_i8; values.len()];

    match basis {
        OutlierBasis::Series => {
            for (flag, c) in flags.iter_mut().zip(&centered) {
                if *c > k * std_dev {
                    *flag = 1;
                } else if *c < -k * std_dev {
                    *flag = -1;
                }
            }
        }
        OutlierBasis::LeaveOneOut if values.len() >= 3 => {
            let sum_sq: f64 = centered.iter().map(|c| c * c).sum();
            let others = (values.len() - 1) as f64;
            for (flag, &c) in flags.iter_mut().zip(&centered) {
                let mean_others = -c / others;
                let var_others =
                    ((sum_sq - c * c - others * mean_others * mean_others) / (others - 1.0))
                        .max(0.0);
                let limit = k * var_others.sqrt();
                if c > mean_others + limit {
                    *flag = 1;
                } else if c < mean_others - limit {
                    *flag = -1;
                }
            }
        }
        OutlierBasis::LeaveOneOut => {
            log::debug!(
                "Series of {} days is too short for leave-one-out outlier detection",
                values.len()
            );
        }
    }

    let above = flags.iter().filter(|&&f| f > 0).count();
    let below = flags.iter().filter(|&&f| f < 0).count();
    let clipped_dates = flags
        .iter()
        .enumerate()
        .filter(|(_, f)| **f != 0)
        .map(|(i, _)| series.date_at(i))
        .collect();

    log::info!(
        "Outliers beyond {k} standard deviations ({basis}): {above} above, {below} below \
         (mean {mean:.2}, std dev {std_dev:.2})"
    );

    Ok((
        flags.into_iter().map(|f| f != 0).collect(),
        OutlierReport {
            threshold: k,
            basis,
            mean,
            std_dev,
            above,
            below,
            clipped_dates,
        },
    ))
}

/// Marks outlying days as missing.
///
/// # Errors
///
/// Returns [`SeriesError::InvalidParameter`] if `k` is not a positive
/// finite number.
pub fn clip_outliers(
    series: &DailyCountSeries,
    k: f64,
    basis: OutlierBasis,
) -> Result<(ClippedSeries, OutlierReport), SeriesError> {
    let (flags, report) = detect_outliers(series, k, basis)?;
    let values = series
        .counts()
        .iter()
        .zip(flags)
        .map(|(&count, outlier)| (!outlier).then_some(count))
        .collect();

    for date in &report.clipped_dates {
        log::warn!("Clipped outlier on {date}");
    }

    Ok((
        ClippedSeries {
            start: series.start(),
            values,
        },
        report,
    ))
}

#[allow(clippy::cast_precision_loss)]
fn log_values(
    start: NaiveDate,
    values: impl Iterator<Item = Option<u64>>,
    policy: ZeroCountPolicy,
) -> Result<TransformedSeries, SeriesError> {
    let floor = match policy {
        ZeroCountPolicy::Floor { epsilon } if !(epsilon.is_finite() && epsilon > 0.0) => {
            return Err(SeriesError::InvalidParameter {
                message: format!("zero-count floor must be a positive number, got {epsilon}"),
            });
        }
        ZeroCountPolicy::Floor { epsilon } => Some(epsilon.ln()),
        ZeroCountPolicy::Reject | ZeroCountPolicy::Exclude => None,
    };

    let mut zeros = 0_usize;
    let mut out = Vec::new();

    for (i, value) in values.enumerate() {
        let observation = match value {
            None => Observation::Missing,
            Some(0) => {
                zeros += 1;
                match (policy, floor) {
                    (ZeroCountPolicy::Reject, _) => {
                        return Err(SeriesError::DegenerateTransform {
                            date: start
                                .checked_add_days(chrono::Days::new(i as u64))
                                .unwrap_or(NaiveDate::MAX),
                            count: 0,
                        });
                    }
                    (_, Some(floor)) => Observation::Observed(floor),
                    (_, None) => Observation::Missing,
                }
            }
            Some(count) => Observation::Observed((count as f64).ln()),
        };
        out.push(observation);
    }

    if zeros > 0 {
        log::warn!("{zeros} zero-count days handled by {policy:?} under the log transform");
    }

    Ok(TransformedSeries::new(start, out))
}

/// Applies the natural log to every count.
///
/// # Errors
///
/// Returns [`SeriesError::DegenerateTransform`] for a zero count under
/// [`ZeroCountPolicy::Reject`], or [`SeriesError::InvalidParameter`] for an
/// invalid floor.
pub fn log_transform(
    series: &DailyCountSeries,
    policy: ZeroCountPolicy,
) -> Result<TransformedSeries, SeriesError> {
    log_values(series.start(), series.counts().iter().copied().map(Some), policy)
}

/// Applies the natural log to a clipped series; clipped days stay missing.
///
/// # Errors
///
/// Same as [`log_transform`].
pub fn log_transform_clipped(
    series: &ClippedSeries,
    policy: ZeroCountPolicy,
) -> Result<TransformedSeries, SeriesError> {
    log_values(series.start, series.values.iter().copied(), policy)
}

/// Inverse of the log transform: `exp` of every observed value.
#[must_use]
pub fn exp_transform(series: &TransformedSeries) -> Vec<Option<f64>> {
    series
        .values()
        .iter()
        .map(|v| v.value().map(f64::exp))
        .collect()
}

/// Runs the configured variant: log only ("as-is"), or outlier clipping
/// followed by the log ("mitigated").
///
/// # Errors
///
/// Returns [`SeriesError`] if clipping or the log transform fails.
pub fn transform(
    series: &DailyCountSeries,
    config: &TransformConfig,
) -> Result<TransformOutput, SeriesError> {
    if config.mitigate_outliers {
        let (clipped, report) =
            clip_outliers(series, config.outlier_threshold, config.outlier_basis)?;
        let series = log_transform_clipped(&clipped, config.zero_counts)?;
        Ok(TransformOutput {
            series,
            outliers: Some(report),
        })
    } else {
        Ok(TransformOutput {
            series: log_transform(series, config.zero_counts)?,
            outliers: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2021, 6, 1).unwrap()
    }

    fn series(counts: &[u64]) -> DailyCountSeries {
        DailyCountSeries::new(start(), counts.to_vec())
    }

    /// Deterministic, roughly normal counts around 100 (sum of uniforms).
    fn near_normal(n: usize) -> Vec<u64> {
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        (0..n)
            .map(|_| {
                let mut acc = 0.0;
                for _ in 0..12 {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    #[allow(clippy::cast_precision_loss)]
                    let u = (state >> 11) as f64 / (1_u64 << 53) as f64;
                    acc += u;
                }
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let count = (100.0 + 10.0 * (acc - 6.0)).round() as u64;
                count
            })
            .collect()
    }

    #[test]
    fn clips_single_spike_in_short_series() {
        let s = series(&[5, 5, 5, 5, 5, 5, 5, 5, 5, 100]);
        let (clipped, report) = clip_outliers(&s, 3.0, OutlierBasis::LeaveOneOut).unwrap();
        assert_eq!(clipped.values[9], None);
        assert!(clipped.values[..9].iter().all(|v| *v == Some(5)));
        assert_eq!(report.above, 1);
        assert_eq!(report.below, 0);
        assert_eq!(report.clipped_dates, vec![s.date_at(9)]);
    }

    #[test]
    fn whole_series_basis_cannot_flag_single_spike_in_ten_points() {
        let s = series(&[5, 5, 5, 5, 5, 5, 5, 5, 5, 100]);
        let (_, report) = clip_outliers(&s, 3.0, OutlierBasis::Series).unwrap();
        assert_eq!(report.clipped(), 0);
    }

    #[test]
    fn whole_series_basis_flags_spike_in_long_series() {
        let mut counts = vec![20; 200];
        counts[50] = 400;
        counts[120] = 0;
        let (flags, report) = detect_outliers(&series(&counts), 3.0, OutlierBasis::Series).unwrap();
        assert!(flags[50]);
        assert_eq!(report.above, 1);
        // A drop to zero from a constant 20 is still within 3 sigma once the
        // spike inflates the deviation.
        assert!(!flags[120]);
    }

    #[test]
    fn constant_series_has_no_outliers() {
        for basis in [OutlierBasis::Series, OutlierBasis::LeaveOneOut] {
            let (flags, report) = detect_outliers(&series(&[7; 30]), 3.0, basis).unwrap();
            assert!(flags.iter().all(|f| !f));
            assert_eq!(report.clipped(), 0);
        }
    }

    #[test]
    fn near_normal_series_loses_small_fraction() {
        let counts = near_normal(2000);
        for basis in [OutlierBasis::Series, OutlierBasis::LeaveOneOut] {
            let (_, report) = detect_outliers(&series(&counts), 3.0, basis).unwrap();
            assert!(
                report.clipped() <= 20,
                "{basis}: clipped {} of 2000",
                report.clipped()
            );
        }
    }

    #[test]
    fn rejects_non_positive_threshold() {
        assert!(matches!(
            clip_outliers(&series(&[1, 2, 3]), 0.0, OutlierBasis::Series),
            Err(SeriesError::InvalidParameter { .. })
        ));
        assert!(clip_outliers(&series(&[1, 2, 3]), f64::NAN, OutlierBasis::Series).is_err());
    }

    #[test]
    fn log_round_trip_recovers_counts() {
        let counts = [1, 3, 12, 250, 7, 88];
        let s = series(&counts);
        let logged = log_transform(&s, ZeroCountPolicy::Reject).unwrap();
        let restored = exp_transform(&logged);
        for (orig, back) in counts.iter().zip(restored) {
            #[allow(clippy::cast_precision_loss)]
            let orig = *orig as f64;
            assert!((orig - back.unwrap()).abs() < 1e-9);
        }
    }

    #[test]
    fn zero_counts_follow_policy() {
        let s = series(&[4, 0, 2]);

        match log_transform(&s, ZeroCountPolicy::Reject) {
            Err(SeriesError::DegenerateTransform { date, count }) => {
                assert_eq!(date, s.date_at(1));
                assert_eq!(count, 0);
            }
            other => panic!("expected degenerate transform, got {other:?}"),
        }

        let excluded = log_transform(&s, ZeroCountPolicy::Exclude).unwrap();
        assert!(excluded.values()[1].is_missing());
        assert_eq!(excluded.observed_count(), 2);

        let floored = log_transform(&s, ZeroCountPolicy::Floor { epsilon: 0.5 }).unwrap();
        let v = floored.values()[1].value().unwrap();
        assert!((v - 0.5_f64.ln()).abs() < 1e-12);

        assert!(log_transform(&s, ZeroCountPolicy::Floor { epsilon: -1.0 }).is_err());
    }

    #[test]
    fn mitigated_variant_keeps_dates_and_marks_gap() {
        let s = series(&[5, 5, 5, 5, 5, 5, 5, 5, 5, 100]);
        let config = TransformConfig {
            mitigate_outliers: true,
            ..TransformConfig::default()
        };
        let out = transform(&s, &config).unwrap();
        assert_eq!(out.series.len(), s.len());
        assert_eq!(out.series.start(), s.start());
        assert!(out.series.values()[9].is_missing());
        assert_eq!(out.outliers.unwrap().clipped(), 1);

        let as_is = transform(&s, &TransformConfig::default()).unwrap();
        assert!(as_is.outliers.is_none());
        assert_eq!(as_is.series.observed_count(), 10);
    }
}
