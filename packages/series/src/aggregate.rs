//! Event log to daily count aggregation.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use crime_forecast_series_models::{DailyCountSeries, Event};

use crate::SeriesError;

/// Counts events per calendar day across the full date range they span.
///
/// Days without events appear with a count of zero, so the result has
/// exactly `(last - first).num_days() + 1` entries and its counts sum to
/// `events.len()`.
///
/// # Errors
///
/// Returns [`SeriesError::EmptyInput`] if `events` is empty.
pub fn aggregate_daily(events: &[Event]) -> Result<DailyCountSeries, SeriesError> {
    aggregate_dates(events.iter().map(Event::date))
}

/// Same as [`aggregate_daily`] for callers that already hold bare dates.
///
/// # Errors
///
/// Returns [`SeriesError::EmptyInput`] if `dates` yields nothing.
pub fn aggregate_dates(
    dates: impl IntoIterator<Item = NaiveDate>,
) -> Result<DailyCountSeries, SeriesError> {
    let mut by_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for date in dates {
        *by_day.entry(date).or_insert(0) += 1;
    }

    let (Some((&first, _)), Some((&last, _))) = (by_day.first_key_value(), by_day.last_key_value())
    else {
        return Err(SeriesError::EmptyInput);
    };

    let counts: Vec<u64> = first
        .iter_days()
        .take_while(|day| *day <= last)
        .map(|day| by_day.get(&day).copied().unwrap_or(0))
        .collect();

    let empty_days = counts.iter().filter(|&&c| c == 0).count();
    log::info!(
        "Aggregated {} events into {} days ({first} to {last}, {empty_days} without events)",
        counts.iter().sum::<u64>(),
        counts.len(),
    );

    Ok(DailyCountSeries::new(first, counts))
}
