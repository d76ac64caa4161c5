#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `crime_forecast`: forecast daily incident counts from a CSV event log.
//!
//! Every subcommand reads the log, aggregates it per day and runs some part
//! of the pipeline. Without a subcommand an interactive menu asks what to
//! do.
//!
//! Logging goes through [`crime_forecast_cli_utils::init_logger`], so log
//! lines and progress bars share the terminal cleanly. Set `RUST_LOG` to
//! change the level.

mod commands;
mod interactive;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use crime_forecast_ingest::OffensePreset;

#[derive(Parser, Debug)]
#[command(
    name = "crime_forecast",
    about = "Seasonal forecasts of daily crime counts"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Parses an `--offenses` value with the preset's own (case-insensitive)
/// names.
fn parse_offenses(value: &str) -> Result<OffensePreset, String> {
    value
        .parse::<OffensePreset>()
        .map_err(|e| format!("{e}: expected one of all, violent, murder"))
}

/// Input selection and configuration shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct InputArgs {
    /// CSV event log with one incident per row
    #[arg(long)]
    pub input: PathBuf,
    /// TOML pipeline configuration; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Offense preset to keep (all, violent, murder)
    #[arg(long, value_parser = parse_offenses)]
    pub offenses: Option<OffensePreset>,
    /// Keep only incidents in this zip code
    #[arg(long)]
    pub zip_code: Option<String>,
}

/// Model flags shared by `forecast` and `compare`.
#[derive(Args, Debug, Clone, Default)]
pub struct ModelArgs {
    /// Days to forecast past the last observed date
    #[arg(long)]
    pub horizon: Option<usize>,
    /// Width of the uncertainty interval, in (0, 1)
    #[arg(long)]
    pub interval_width: Option<f64>,
}

/// Options for a single-variant forecast.
#[derive(Args, Debug, Clone, Default)]
pub struct ForecastArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Clip outliers to missing before the log transform
    #[arg(long)]
    pub mitigate_outliers: bool,
    #[command(flatten)]
    pub model: ModelArgs,
    /// Directory to write daily.csv, forecast.csv and report.json into
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

/// Options for the as-is against mitigated comparison. Both variants always
/// run, so there is no mitigation flag.
#[derive(Args, Debug, Clone, Default)]
pub struct CompareArgs {
    #[command(flatten)]
    pub input: InputArgs,
    #[command(flatten)]
    pub model: ModelArgs,
    /// Directory to write one report subdirectory per variant into
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

/// Options for the rolling-origin backtest.
#[derive(Args, Debug, Clone, Default)]
pub struct CrossValidateArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Clip outliers to missing before the log transform
    #[arg(long)]
    pub mitigate_outliers: bool,
    /// Days of history before the first cutoff
    #[arg(long)]
    pub initial_days: Option<usize>,
    /// Days between cutoffs
    #[arg(long)]
    pub period_days: Option<usize>,
    /// Days scored after each cutoff
    #[arg(long)]
    pub horizon_days: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fit one variant and forecast
    Forecast(ForecastArgs),
    /// Fit the as-is and outlier-mitigated variants and compare their MAPE
    Compare(CompareArgs),
    /// Aggregate the event log into daily counts only
    Aggregate {
        #[command(flatten)]
        input: InputArgs,
        /// CSV file to write; stdout if omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Backtest the configured variant on rolling cutoffs
    CrossValidate(CrossValidateArgs),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = crime_forecast_cli_utils::init_logger();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return interactive::run(&multi);
    };

    match command {
        Commands::Forecast(args) => commands::forecast(&args, &multi),
        Commands::Compare(args) => commands::compare(&args, &multi),
        Commands::Aggregate { input, output } => {
            commands::aggregate(&input, output.as_deref(), &multi)
        }
        Commands::CrossValidate(args) => commands::cross_validate(&args, &multi),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("crime_forecast").chain(args.iter().copied()))
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_offense_presets_case_insensitively() {
        let cli = parse(&["forecast", "--input", "incidents.csv", "--offenses", "Violent"]).unwrap();
        let Some(Commands::Forecast(args)) = cli.command else {
            panic!("expected forecast, got {:?}", cli.command);
        };
        assert_eq!(args.input.offenses, Some(OffensePreset::Violent));
        assert_eq!(args.input.input, PathBuf::from("incidents.csv"));
    }

    #[test]
    fn rejects_unknown_offense_preset() {
        let err = parse(&["aggregate", "--input", "a.csv", "--offenses", "arson"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn compare_has_no_mitigation_flag() {
        assert!(parse(&["compare", "--input", "a.csv", "--mitigate-outliers"]).is_err());
        let cli = parse(&["compare", "--input", "a.csv", "--horizon", "90"]).unwrap();
        let Some(Commands::Compare(args)) = cli.command else {
            panic!("expected compare, got {:?}", cli.command);
        };
        assert_eq!(args.model.horizon, Some(90));
    }

    #[test]
    fn cross_validate_takes_backtest_flags() {
        let cli = parse(&[
            "cross-validate",
            "--input",
            "a.csv",
            "--mitigate-outliers",
            "--initial-days",
            "730",
            "--horizon-days",
            "90",
        ])
        .unwrap();
        let Some(Commands::CrossValidate(args)) = cli.command else {
            panic!("expected cross-validate, got {:?}", cli.command);
        };
        assert!(args.mitigate_outliers);
        assert_eq!(args.initial_days, Some(730));
        assert_eq!(args.period_days, None);
        assert_eq!(args.horizon_days, Some(90));
    }
}
