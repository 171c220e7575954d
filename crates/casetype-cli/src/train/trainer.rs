use anyhow::{Context, Result};
use log::info;

use casetype_classifiers::artifact;
use casetype_classifiers::data_handling::build_training_set;
use casetype_classifiers::io::read_cases;
use casetype_classifiers::pipeline::{train, FittedModel};
use casetype_classifiers::report::write_importance_report;

use crate::train::input::TrainConfig;

/// Load case records, fit the pipeline and write the artifact (plus the
/// optional HTML report).
pub fn run_training(config: &TrainConfig) -> Result<FittedModel> {
    let cases = read_cases(&config.train_data)?;
    info!("Loaded {} case records from {}", cases.len(), config.train_data);

    let set = build_training_set(&cases);

    let model = train(&set, &config.model).context("Training failed")?;
    artifact::save_to_path(&model, &config.output_file)
        .with_context(|| format!("Failed to write model artifact: {}", config.output_file))?;

    if let Some(report_file) = &config.report_file {
        write_importance_report(&model, report_file, "Case type model")
            .with_context(|| format!("Failed to write report: {}", report_file))?;
    }

    info!(
        "Model with {} classes written to {}",
        model.codec.num_classes(),
        config.output_file
    );
    Ok(model)
}
