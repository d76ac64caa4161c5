//! Subcommand implementations.

use std::path::Path;

use crime_forecast_cli_utils::{IndicatifProgress, MultiProgress};
use crime_forecast_forecast_models::CrossValidationFold;
use crime_forecast_pipeline::report::{write_all, write_daily_csv};
use crime_forecast_pipeline::{Comparison, PipelineConfig, PipelineReport};
use crime_forecast_series::aggregate::aggregate_daily;
use crime_forecast_series_models::Event;

use crate::{CompareArgs, CrossValidateArgs, ForecastArgs, InputArgs, ModelArgs};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Loads the config file (if any) and applies the input flags on top.
///
/// # Errors
///
/// Returns an error if the config file cannot be read or parsed.
pub fn input_config(args: &InputArgs) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(offenses) = args.offenses {
        config.input.filter.offenses = offenses;
    }
    if let Some(zip) = &args.zip_code {
        config.input.filter.zip_code = Some(zip.clone());
    }
    Ok(config)
}

/// [`input_config`] plus the model flags.
fn model_config(
    input: &InputArgs,
    model: &ModelArgs,
) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = input_config(input)?;
    if let Some(horizon) = model.horizon {
        config.forecast.horizon_days = horizon;
    }
    if let Some(width) = model.interval_width {
        config.forecast.interval_width = width;
    }
    Ok(config)
}

fn forecast_config(args: &ForecastArgs) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = model_config(&args.input, &args.model)?;
    if args.mitigate_outliers {
        config.transform.mitigate_outliers = true;
    }
    Ok(config)
}

fn cross_validation_config(
    args: &CrossValidateArgs,
) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = input_config(&args.input)?;
    if args.mitigate_outliers {
        config.transform.mitigate_outliers = true;
    }
    let cv = &mut config.cross_validation;
    if let Some(days) = args.initial_days {
        cv.initial_days = days;
    }
    if let Some(days) = args.period_days {
        cv.period_days = days;
    }
    if let Some(days) = args.horizon_days {
        cv.horizon_days = days;
    }
    Ok(config)
}

fn load(
    input: &Path,
    config: &PipelineConfig,
    multi: &MultiProgress,
) -> Result<Vec<Event>, Box<dyn std::error::Error>> {
    let progress = IndicatifProgress::rows_spinner(multi, "Reading events");
    let filter = &config.input.filter;
    log::info!(
        "Input {} ({}{})",
        input.display(),
        filter.offenses.label(),
        filter
            .zip_code
            .as_deref()
            .map(|z| format!(", zip {z}"))
            .unwrap_or_default()
    );
    Ok(crime_forecast_ingest::load_events(input, &config.input, &progress)?)
}

fn print_summary(report: &PipelineReport) {
    let daily = &report.daily;
    println!();
    println!("{}", report.variant.label());
    println!(
        "  history      {} to {} ({} days, {} events)",
        daily.start(),
        daily.end().unwrap_or(daily.start()),
        daily.len(),
        daily.total()
    );
    if let Some(outliers) = &report.outliers {
        println!(
            "  clipped      {} day(s) beyond {} sd",
            outliers.clipped(),
            outliers.threshold
        );
    }
    println!("  changepoints {}", report.changepoints.len());
    println!("  noise sd     {:.4} (log scale)", report.noise_sd);
    println!(
        "  MAPE         {:.2}% over {} days ({} zero-count days excluded)",
        report.accuracy.mape, report.accuracy.compared_days, report.accuracy.excluded_zero_actuals
    );
    if let Some(last) = report.counts.last() {
        println!(
            "  {}   {:.1} [{:.1}, {:.1}] at {:.0}% interval",
            last.date,
            last.estimate,
            last.lower,
            last.upper,
            report.forecast.interval_width * 100.0
        );
    }
}

fn print_comparison(comparison: &Comparison) {
    println!();
    println!("{:<20} {:>9} {:>6} {:>8} {:>8}", "VARIANT", "MAPE", "DAYS", "CLIPPED", "NOISE");
    println!("{}", "-".repeat(55));
    for report in comparison.reports() {
        println!(
            "{:<20} {:>8.2}% {:>6} {:>8} {:>8.4}",
            report.variant.label(),
            report.accuracy.mape,
            report.accuracy.compared_days,
            report.outliers.as_ref().map_or(0, |o| o.clipped()),
            report.noise_sd
        );
    }
    println!();
    println!(
        "Mitigation changed MAPE by {:+.2} points",
        -comparison.mape_improvement()
    );
}

fn print_folds(folds: &[CrossValidationFold]) {
    println!();
    println!("{:<12} {:>8} {:>9} {:>6}", "CUTOFF", "HORIZON", "MAPE", "DAYS");
    println!("{}", "-".repeat(38));
    for fold in folds {
        println!(
            "{:<12} {:>8} {:>8.2}% {:>6}",
            fold.cutoff.to_string(),
            fold.horizon_days,
            fold.accuracy.mape,
            fold.accuracy.compared_days
        );
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = folds.iter().map(|f| f.accuracy.mape).sum::<f64>() / folds.len().max(1) as f64;
    println!();
    println!("Mean MAPE {mean:.2}% over {} folds", folds.len());
}

/// `forecast`: one variant end to end.
///
/// # Errors
///
/// Returns an error if any pipeline stage or report write fails.
pub fn forecast(args: &ForecastArgs, multi: &MultiProgress) -> CliResult {
    let config = forecast_config(args)?;
    let events = load(&args.input.input, &config, multi)?;
    let report = crime_forecast_pipeline::run(&events, &config)?;
    print_summary(&report);

    if let Some(dir) = &args.output_dir {
        for path in write_all(dir, &report)? {
            println!("Wrote {}", path.display());
        }
    }
    Ok(())
}

/// `compare`: as-is against mitigated on the same series.
///
/// # Errors
///
/// Returns an error if either run or a report write fails.
pub fn compare(args: &CompareArgs, multi: &MultiProgress) -> CliResult {
    let config = model_config(&args.input, &args.model)?;
    let events = load(&args.input.input, &config, multi)?;
    let comparison = crime_forecast_pipeline::compare(&events, &config)?;
    for report in comparison.reports() {
        print_summary(report);
    }
    print_comparison(&comparison);

    if let Some(dir) = &args.output_dir {
        for report in comparison.reports() {
            write_all(&dir.join(report.variant.as_ref()), report)?;
        }
        println!("Wrote reports to {}", dir.display());
    }
    Ok(())
}

/// `aggregate`: daily counts only.
///
/// # Errors
///
/// Returns an error if the log cannot be read or the CSV cannot be written.
pub fn aggregate(args: &InputArgs, output: Option<&Path>, multi: &MultiProgress) -> CliResult {
    let config = input_config(args)?;
    let events = load(&args.input, &config, multi)?;
    let daily = aggregate_daily(&events)?;

    match output {
        Some(path) => {
            write_daily_csv(std::fs::File::create(path)?, &daily)?;
            println!("Wrote {} days to {}", daily.len(), path.display());
        }
        None => write_daily_csv(std::io::stdout().lock(), &daily)?,
    }
    Ok(())
}

/// `cross-validate`: rolling-origin backtest.
///
/// # Errors
///
/// Returns an error if the log cannot be read or a fold fails.
pub fn cross_validate(args: &CrossValidateArgs, multi: &MultiProgress) -> CliResult {
    let config = cross_validation_config(args)?;
    let events = load(&args.input.input, &config, multi)?;
    let progress = IndicatifProgress::steps_bar(multi, "Cross-validating");
    let folds = crime_forecast_pipeline::cross_validate(&events, &config, &progress)?;
    print_folds(&folds);
    Ok(())
}
