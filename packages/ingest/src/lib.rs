#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CSV ingestion of incident event logs.
//!
//! Reads one event per row from a delimited file, keeping only the rows that
//! pass the configured [`EventFilter`]. Malformed dates are a hard failure:
//! nothing is aggregated from a file that cannot be read cleanly.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use crime_forecast_series::progress::ProgressCallback;
use crime_forecast_series_models::Event;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crime_forecast_crime_models::OffensePreset;

/// Date-time layouts accepted in the date column, tried in order.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
];

/// Date-only layouts accepted in the date column, tried in order.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Rows between progress updates.
const PROGRESS_INTERVAL: u64 = 10_000;

/// Errors that can occur while reading an event log.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The CSV could not be parsed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A required column is absent from the header row.
    #[error("Malformed input: missing column '{column}'")]
    MissingColumn {
        /// Name of the missing column.
        column: String,
    },

    /// A date cell is empty or in no recognised format.
    #[error("Malformed input: unparseable date '{value}' on line {row}")]
    MalformedDate {
        /// Line number in the file (the header is line 1).
        row: u64,
        /// Raw cell contents.
        value: String,
    },

    /// No row survived filtering.
    #[error("Malformed input: no events in {source_name}")]
    Empty {
        /// Description of the input.
        source_name: String,
    },

    /// A reader option is unusable.
    #[error("Invalid CSV option: {message}")]
    InvalidOption {
        /// Description of what went wrong.
        message: String,
    },
}

/// Which rows of the event log to keep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EventFilter {
    /// Offense preset matched against `offense_column`.
    pub offenses: OffensePreset,
    /// Column holding the offense description.
    pub offense_column: String,
    /// Keep only rows whose `zip_column` equals this value.
    pub zip_code: Option<String>,
    /// Column holding the zip code.
    pub zip_column: String,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            offenses: OffensePreset::All,
            offense_column: "highest_offense_description".to_string(),
            zip_code: None,
            zip_column: "zip_code".to_string(),
        }
    }
}

impl EventFilter {
    /// Whether the filter accepts every row.
    #[must_use]
    pub const fn is_pass_through(&self) -> bool {
        matches!(self.offenses, OffensePreset::All) && self.zip_code.is_none()
    }
}

/// How to read the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct CsvOptions {
    /// Column holding the occurrence date or date-time.
    pub date_column: String,
    /// Field delimiter; must be a single ASCII character.
    pub delimiter: char,
    /// Row filter.
    pub filter: EventFilter,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            date_column: "occurred_date".to_string(),
            delimiter: ',',
            filter: EventFilter::default(),
        }
    }
}

/// Parses an occurrence timestamp in any accepted layout. Date-only values
/// map to midnight.
#[must_use]
pub fn parse_event_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
                .map(|date| date.and_time(chrono::NaiveTime::MIN))
        })
}

fn column_index(headers: &csv::StringRecord, column: &str) -> Result<usize, IngestError> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(column))
        .ok_or_else(|| IngestError::MissingColumn {
            column: column.to_string(),
        })
}

/// Reads events from any CSV source.
///
/// # Errors
///
/// * [`IngestError::MissingColumn`] if the date column or a column the
///   filter needs is absent.
/// * [`IngestError::MalformedDate`] on the first kept row whose date cannot
///   be parsed.
/// * [`IngestError::Empty`] if no row is kept.
/// * [`IngestError::Csv`] / [`IngestError::InvalidOption`] for unreadable
///   input or options.
pub fn read_events(
    reader: impl Read,
    options: &CsvOptions,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<Vec<Event>, IngestError> {
    let delimiter = u8::try_from(options.delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| IngestError::InvalidOption {
            message: format!("delimiter {:?} is not a single ASCII byte", options.delimiter),
        })?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let date_idx = column_index(&headers, &options.date_column)?;
    let filter = &options.filter;
    let offense_idx = match filter.offenses {
        OffensePreset::All => None,
        _ => Some(column_index(&headers, &filter.offense_column)?),
    };
    let zip = match &filter.zip_code {
        Some(zip) => Some((column_index(&headers, &filter.zip_column)?, zip.trim())),
        None => None,
    };

    let mut events = Vec::new();
    let mut rows = 0_u64;

    for result in reader.records() {
        let record = result?;
        rows += 1;
        if rows % PROGRESS_INTERVAL == 0 {
            progress.inc(PROGRESS_INTERVAL);
        }

        let cell = |idx: usize| record.get(idx).unwrap_or("").trim();

        if let Some(idx) = offense_idx
            && !filter.offenses.matches(cell(idx))
        {
            continue;
        }
        if let Some((idx, wanted)) = zip
            && cell(idx) != wanted
        {
            continue;
        }

        let raw = cell(date_idx);
        let occurred_at = parse_event_date(raw).ok_or_else(|| IngestError::MalformedDate {
            row: record.position().map_or(rows + 1, csv::Position::line),
            value: raw.to_string(),
        })?;
        events.push(Event::new(occurred_at));
    }

    progress.inc(rows % PROGRESS_INTERVAL);
    progress.finish(format!("{} events from {rows} rows", events.len()));

    if events.is_empty() {
        return Err(IngestError::Empty {
            source_name: format!("{rows} CSV rows"),
        });
    }

    if filter.is_pass_through() {
        log::info!("Read {} events", events.len());
    } else {
        log::info!(
            "Kept {} of {rows} rows ({} offenses{})",
            events.len(),
            filter.offenses,
            filter
                .zip_code
                .as_deref()
                .map(|z| format!(", zip {z}"))
                .unwrap_or_default()
        );
    }

    Ok(events)
}

/// Reads events from a CSV file.
///
/// # Errors
///
/// Same as [`read_events`], plus [`IngestError::Io`] if the file cannot be
/// opened.
pub fn load_events(
    path: &Path,
    options: &CsvOptions,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<Vec<Event>, IngestError> {
    log::info!("Loading events from {}", path.display());
    let file = std::fs::File::open(path)?;
    read_events(std::io::BufReader::new(file), options, progress).map_err(|e| match e {
        IngestError::Empty { .. } => IngestError::Empty {
            source_name: path.display().to_string(),
        },
        other => other,
    })
}
