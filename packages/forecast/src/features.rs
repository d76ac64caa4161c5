//! Regression features: piecewise-linear trend and Fourier seasonality.
//!
//! Column layout of a design row:
//!
//! | columns                       | meaning                          |
//! |-------------------------------|----------------------------------|
//! | `0`                           | offset `m`                       |
//! | `1`                           | base growth rate `k` (times `t`) |
//! | `2 .. 2 + changepoints`       | `(t - s_j)+` hinges              |
//! | remaining, per component      | `sin`, `cos` pairs per harmonic  |

use std::f64::consts::TAU;
use std::ops::Range;

use chrono::{Datelike as _, NaiveDate};

/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Days since 1970-01-01.
#[must_use]
pub fn epoch_days(date: NaiveDate) -> f64 {
    f64::from(date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
}

/// Fourier terms of one seasonal component at `day`, interleaved as
/// `sin(1), cos(1), sin(2), cos(2), ...`.
fn fourier_terms(day: f64, period: f64, order: u32, out: &mut Vec<f64>) {
    for n in 1..=order {
        let angle = TAU * f64::from(n) * day / period;
        out.push(angle.sin());
        out.push(angle.cos());
    }
}

/// A seasonal component as seen by the design matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalTerm {
    /// Component name.
    pub name: String,
    /// Period in days.
    pub period: f64,
    /// Fourier harmonics.
    pub order: u32,
}

/// Everything needed to build a design row for any date.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignSpec {
    /// Epoch day mapped to `t = 0`.
    pub t_start: f64,
    /// Days mapped to a unit of `t`.
    pub t_span: f64,
    /// Changepoint locations on the `t` scale.
    pub changepoints: Vec<f64>,
    /// Seasonal components in column order.
    pub seasonal: Vec<SeasonalTerm>,
}

impl DesignSpec {
    /// Total number of columns.
    #[must_use]
    pub fn n_columns(&self) -> usize {
        2 + self.changepoints.len()
            + self
                .seasonal
                .iter()
                .map(|s| 2 * s.order as usize)
                .sum::<usize>()
    }

    /// Columns of the trend (offset, rate and hinges).
    #[must_use]
    pub fn trend_columns(&self) -> Range<usize> {
        0..2 + self.changepoints.len()
    }

    /// Columns of seasonal component `index`.
    #[must_use]
    pub fn seasonal_columns(&self, index: usize) -> Range<usize> {
        let start = self.trend_columns().end
            + self.seasonal[..index]
                .iter()
                .map(|s| 2 * s.order as usize)
                .sum::<usize>();
        start..start + 2 * self.seasonal[index].order as usize
    }

    /// Position of `date` on the trend's `t` scale.
    #[must_use]
    pub fn t(&self, date: NaiveDate) -> f64 {
        (epoch_days(date) - self.t_start) / self.t_span
    }

    /// Design row for `date`.
    #[must_use]
    pub fn row(&self, date: NaiveDate) -> Vec<f64> {
        let day = epoch_days(date);
        let t = self.t(date);

        let mut row = Vec::with_capacity(self.n_columns());
        row.push(1.0);
        row.push(t);
        row.extend(self.changepoints.iter().map(|s| (t - s).max(0.0)));
        for term in &self.seasonal {
            fourier_terms(day, term.period, term.order, &mut row);
        }
        row
    }
}

/// Places up to `requested` changepoints at evenly spaced positions among
/// the first `range` fraction of the observed `t` values.
///
/// `observed_t` must be sorted ascending. The first observed point never
/// hosts a changepoint.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn place_changepoints(observed_t: &[f64], requested: usize, range: f64) -> Vec<f64> {
    let hist_size = (observed_t.len() as f64 * range).floor() as usize;
    let count = requested.min(hist_size.saturating_sub(1));
    if count == 0 {
        return Vec::new();
    }

    let last = (hist_size - 1) as f64;
    (1..=count)
        .map(|i| {
            let index = (last * i as f64 / count as f64).round() as usize;
            observed_t[index.min(observed_t.len() - 1)]
        })
        .collect()
}
