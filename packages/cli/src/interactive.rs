//! Interactive mode: pick a task from a menu and answer a few prompts.

use std::path::PathBuf;

use crime_forecast_cli_utils::MultiProgress;
use crime_forecast_ingest::OffensePreset;
use dialoguer::{Confirm, Input, Select};

use crime_forecast_pipeline::PipelineConfig;

use crate::commands;
use crate::{CompareArgs, CrossValidateArgs, ForecastArgs, InputArgs, ModelArgs};

type PromptResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Top-level task selection.
enum Task {
    Forecast,
    Compare,
    Aggregate,
    CrossValidate,
}

impl Task {
    const ALL: &[Self] = &[
        Self::Forecast,
        Self::Compare,
        Self::Aggregate,
        Self::CrossValidate,
    ];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Forecast => "Forecast daily counts",
            Self::Compare => "Compare as-is and outlier-mitigated forecasts",
            Self::Aggregate => "Aggregate events into daily counts",
            Self::CrossValidate => "Cross-validate forecast accuracy",
        }
    }
}

fn optional_path(prompt: &str) -> Result<Option<PathBuf>, dialoguer::Error> {
    let value: String = Input::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;
    let value = value.trim();
    Ok((!value.is_empty()).then(|| PathBuf::from(value)))
}

fn input_args() -> Result<InputArgs, dialoguer::Error> {
    let input: String = Input::new()
        .with_prompt("Event log CSV")
        .default("crime_reports.csv".to_string())
        .interact_text()?;
    let config = optional_path("Config TOML (blank for defaults)")?;

    let labels: Vec<&str> = OffensePreset::ALL.iter().map(|p| p.label()).collect();
    let preset = Select::new()
        .with_prompt("Which incidents?")
        .items(&labels)
        .default(0)
        .interact()?;

    let zip: String = Input::new()
        .with_prompt("Zip code (blank for all)")
        .allow_empty(true)
        .interact_text()?;
    let zip = zip.trim();

    Ok(InputArgs {
        input: PathBuf::from(input.trim()),
        config,
        offenses: Some(OffensePreset::ALL[preset]),
        zip_code: (!zip.is_empty()).then(|| zip.to_string()),
    })
}

fn mitigation_prompt(config: &PipelineConfig) -> String {
    format!(
        "Clip outliers beyond {} standard deviations?",
        config.transform.outlier_threshold
    )
}

fn confirm_mitigation(config: &PipelineConfig) -> Result<bool, dialoguer::Error> {
    Confirm::new()
        .with_prompt(mitigation_prompt(config))
        .default(config.transform.mitigate_outliers)
        .interact()
}

fn model_args(config: &PipelineConfig) -> Result<ModelArgs, dialoguer::Error> {
    let horizon: usize = Input::new()
        .with_prompt("Days to forecast")
        .default(config.forecast.horizon_days)
        .interact_text()?;
    Ok(ModelArgs {
        horizon: Some(horizon),
        interval_width: None,
    })
}

fn forecast_args() -> PromptResult<ForecastArgs> {
    let input = input_args()?;
    let config = commands::input_config(&input)?;
    let mitigate_outliers = confirm_mitigation(&config)?;
    let model = model_args(&config)?;
    let output_dir = optional_path("Output directory (blank to skip writing)")?;

    Ok(ForecastArgs {
        input,
        mitigate_outliers,
        model,
        output_dir,
    })
}

fn compare_args() -> PromptResult<CompareArgs> {
    let input = input_args()?;
    let config = commands::input_config(&input)?;
    let model = model_args(&config)?;
    let output_dir = optional_path("Output directory (blank to skip writing)")?;

    Ok(CompareArgs {
        input,
        model,
        output_dir,
    })
}

fn cross_validate_args() -> PromptResult<CrossValidateArgs> {
    let input = input_args()?;
    let config = commands::input_config(&input)?;
    let mitigate_outliers = confirm_mitigation(&config)?;

    Ok(CrossValidateArgs {
        input,
        mitigate_outliers,
        ..CrossValidateArgs::default()
    })
}

/// Runs the menu.
///
/// # Errors
///
/// Returns an error if a prompt fails or the selected task fails.
pub fn run(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    println!("Crime Forecast");
    println!();

    let labels: Vec<&str> = Task::ALL.iter().map(Task::label).collect();
    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match Task::ALL[idx] {
        Task::Forecast => commands::forecast(&forecast_args()?, multi),
        Task::Compare => commands::compare(&compare_args()?, multi),
        Task::Aggregate => {
            let input = input_args()?;
            let output = optional_path("Output CSV (blank for stdout)")?;
            commands::aggregate(&input, output.as_deref(), multi)
        }
        Task::CrossValidate => commands::cross_validate(&cross_validate_args()?, multi),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mitigation_prompt_uses_configured_threshold() {
        let config = PipelineConfig::from_toml_str("[transform]\noutlier_threshold = 2.5\n").unwrap();
        assert_eq!(
            mitigation_prompt(&config),
            "Clip outliers beyond 2.5 standard deviations?"
        );
        assert_eq!(
            mitigation_prompt(&PipelineConfig::default()),
            "Clip outliers beyond 3 standard deviations?"
        );
    }
}
