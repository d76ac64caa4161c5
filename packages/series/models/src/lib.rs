#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Event and series types shared by the forecasting toolchain.
//!
//! A [`DailyCountSeries`] and a [`TransformedSeries`] are both anchored on a
//! start date with one entry per consecutive calendar day, so the
//! "gap-free, one row per day" invariant holds by construction.

use chrono::{Days, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A single reported incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// When the incident occurred.
    pub occurred_at: NaiveDateTime,
}

impl Event {
    /// Creates an event at the given timestamp.
    #[must_use]
    pub const fn new(occurred_at: NaiveDateTime) -> Self {
        Self { occurred_at }
    }

    /// Creates an event at midnight of the given date.
    #[must_use]
    pub fn on(date: NaiveDate) -> Self {
        Self {
            occurred_at: date.and_time(chrono::NaiveTime::MIN),
        }
    }

    /// Calendar date the incident occurred on.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.occurred_at.date()
    }
}

/// Number of events on one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyCount {
    /// Calendar day.
    pub date: NaiveDate,
    /// Events that occurred on `date`.
    pub count: u64,
}

/// Returns the date `offset` days after `start`, saturating at the maximum
/// representable date.
fn offset_date(start: NaiveDate, offset: usize) -> NaiveDate {
    start
        .checked_add_days(Days::new(offset as u64))
        .unwrap_or(NaiveDate::MAX)
}

/// A chronologically ordered, gap-free series of daily counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyCountSeries {
    start: NaiveDate,
    counts: Vec<u64>,
}

impl DailyCountSeries {
    /// Creates a series whose first entry is `start` and where each further
    /// count belongs to the next calendar day.
    #[must_use]
    pub const fn new(start: NaiveDate, counts: Vec<u64>) -> Self {
        Self { start, counts }
    }

    /// First date of the series.
    #[must_use]
    pub const fn start(&self) -> NaiveDate {
        self.start
    }

    /// Last date of the series, or `None` for an empty series.
    #[must_use]
    pub fn end(&self) -> Option<NaiveDate> {
        self.counts
            .len()
            .checked_sub(1)
            .map(|last| offset_date(self.start, last))
    }

    /// Number of days in the series.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether the series has no days.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Raw counts in date order.
    #[must_use]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Sum of all counts.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Date of the entry at `index`.
    #[must_use]
    pub fn date_at(&self, index: usize) -> NaiveDate {
        offset_date(self.start, index)
    }

    /// Count on `date`, or `None` when the date is outside the series.
    #[must_use]
    pub fn get(&self, date: NaiveDate) -> Option<u64> {
        let offset = usize::try_from((date - self.start).num_days()).ok()?;
        self.counts.get(offset).copied()
    }

    /// Iterates `(date, count)` entries in order.
    pub fn iter(&self) -> impl Iterator<Item = DailyCount> + '_ {
        self.counts
            .iter()
            .enumerate()
            .map(|(i, &count)| DailyCount {
                date: self.date_at(i),
                count,
            })
    }

    /// Returns the prefix of the series ending on `end` (inclusive). Dates
    /// after the series end return a copy of the whole series.
    #[must_use]
    pub fn through(&self, end: NaiveDate) -> Self {
        let days = (end - self.start).num_days() + 1;
        let keep = usize::try_from(days).unwrap_or(0).min(self.counts.len());
        Self {
            start: self.start,
            counts: self.counts[..keep].to_vec(),
        }
    }
}

/// A value that is either observed or explicitly missing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Observation {
    /// A usable value.
    Observed(f64),
    /// No value: removed as an outlier or excluded from the log transform.
    Missing,
}

impl Observation {
    /// Returns the observed value, if any.
    #[must_use]
    pub const fn value(self) -> Option<f64> {
        match self {
            Self::Observed(v) => Some(v),
            Self::Missing => None,
        }
    }

    /// Whether this entry is missing.
    #[must_use]
    pub const fn is_missing(self) -> bool {
        matches!(self, Self::Missing)
    }
}

impl From<Option<f64>> for Observation {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Self::Missing, Self::Observed)
    }
}

/// One day of a [`TransformedSeries`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformedPoint {
    /// Calendar day.
    pub date: NaiveDate,
    /// Log-transformed count, or missing.
    pub value: Observation,
}

/// Log-space series with the same dates as the [`DailyCountSeries`] it was
/// derived from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformedSeries {
    start: NaiveDate,
    values: Vec<Observation>,
}

impl TransformedSeries {
    /// Creates a series whose first entry is `start`.
    #[must_use]
    pub const fn new(start: NaiveDate, values: Vec<Observation>) -> Self {
        Self { start, values }
    }

    /// First date of the series.
    #[must_use]
    pub const fn start(&self) -> NaiveDate {
        self.start
    }

    /// Number of days, missing ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the series has no days.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values in date order.
    #[must_use]
    pub fn values(&self) -> &[Observation] {
        &self.values
    }

    /// Number of non-missing days.
    #[must_use]
    pub fn observed_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_missing()).count()
    }

    /// Date of the entry at `index`.
    #[must_use]
    pub fn date_at(&self, index: usize) -> NaiveDate {
        offset_date(self.start, index)
    }

    /// Last date of the series, or `None` for an empty series.
    #[must_use]
    pub fn end(&self) -> Option<NaiveDate> {
        self.values
            .len()
            .checked_sub(1)
            .map(|last| offset_date(self.start, last))
    }

    /// Iterates the days in order.
    pub fn iter(&self) -> impl Iterator<Item = TransformedPoint> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(|(i, &value)| TransformedPoint {
                date: self.date_at(i),
                value,
            })
    }

    /// Iterates only the observed `(date, value)` pairs.
    pub fn observed(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.iter()
            .filter_map(|p| p.value.value().map(|v| (p.date, v)))
    }
}

/// Which points the mean and standard deviation are computed over when
/// testing a point for being an outlier.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutlierBasis {
    /// Every point is tested against the statistics of the whole series.
    Series,
    /// Every point is tested against the statistics of all other points.
    #[default]
    LeaveOneOut,
}

/// How zero-count days are handled by the log transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ZeroCountPolicy {
    /// Fail with a degenerate-transform error.
    Reject,
    /// Mark the day as missing.
    #[default]
    Exclude,
    /// Use `ln(epsilon)` in place of `ln(0)`.
    Floor {
        /// Substitute count, must be finite and positive.
        epsilon: f64,
    },
}

/// Settings for the series transformer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TransformConfig {
    /// Clip outliers to missing before the log transform.
    pub mitigate_outliers: bool,
    /// Outlier threshold in standard deviations.
    pub outlier_threshold: f64,
    /// Statistics used for the outlier test.
    pub outlier_basis: OutlierBasis,
    /// Zero-count handling under the log transform.
    pub zero_counts: ZeroCountPolicy,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            mitigate_outliers: false,
            outlier_threshold: 3.0,
            outlier_basis: OutlierBasis::default(),
            zero_counts: ZeroCountPolicy::default(),
        }
    }
}

/// Summary of an outlier clipping pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlierReport {
    /// Threshold in standard deviations.
    pub threshold: f64,
    /// Statistics the test was run against.
    pub basis: OutlierBasis,
    /// Mean of the whole count series.
    pub mean: f64,
    /// Sample standard deviation of the whole count series.
    pub std_dev: f64,
    /// Points above the upper limit.
    pub above: usize,
    /// Points below the lower limit.
    pub below: usize,
    /// Dates that were marked missing.
    pub clipped_dates: Vec<NaiveDate>,
}

impl OutlierReport {
    /// Total number of clipped points.
    #[must_use]
    pub const fn clipped(&self) -> usize {
        self.above + self.below
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn daily_series_dates_are_consecutive() {
        let series = DailyCountSeries::new(date(2024, 2, 27), vec![1, 0, 3, 4]);
        let dates: Vec<NaiveDate> = series.iter().map(|p| p.date).collect();
        assert_eq!(
            dates,
            vec![
                date(2024, 2, 27),
                date(2024, 2, 28),
                date(2024, 2, 29),
                date(2024, 3, 1)
            ]
        );
        assert_eq!(series.end(), Some(date(2024, 3, 1)));
        assert_eq!(series.total(), 8);
    }

    #[test]
    fn get_returns_none_outside_range() {
        let series = DailyCountSeries::new(date(2024, 1, 1), vec![2, 5]);
        assert_eq!(series.get(date(2024, 1, 2)), Some(5));
        assert_eq!(series.get(date(2023, 12, 31)), None);
        assert_eq!(series.get(date(2024, 1, 3)), None);
    }

    #[test]
    fn through_truncates_prefix() {
        let series = DailyCountSeries::new(date(2024, 1, 1), vec![1, 2, 3, 4]);
        assert_eq!(series.through(date(2024, 1, 2)).counts(), &[1, 2]);
        assert_eq!(series.through(date(2025, 1, 1)).len(), 4);
        assert!(series.through(date(2023, 1, 1)).is_empty());
    }

    #[test]
    fn observation_serializes_missing_as_null() {
        let json = serde_json::to_string(&vec![Observation::Observed(1.5), Observation::Missing])
            .unwrap();
        assert_eq!(json, "[1.5,null]");
    }

    #[test]
    fn transformed_series_skips_missing_when_observed() {
        let series = TransformedSeries::new(
            date(2024, 1, 1),
            vec![
                Observation::Observed(1.0),
                Observation::Missing,
                Observation::Observed(2.0),
            ],
        );
        assert_eq!(series.observed_count(), 2);
        let observed: Vec<(NaiveDate, f64)> = series.observed().collect();
        assert_eq!(observed[1].0, date(2024, 1, 3));
    }

    #[test]
    fn transform_config_parses_zero_policy() {
        let config: TransformConfig =
            serde_json::from_str(r#"{"zero_counts":{"policy":"floor","epsilon":0.5}}"#).unwrap();
        assert_eq!(config.zero_counts, ZeroCountPolicy::Floor { epsilon: 0.5 });
        assert!((config.outlier_threshold - 3.0).abs() < f64::EPSILON);
    }
}
