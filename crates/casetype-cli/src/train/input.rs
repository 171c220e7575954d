use anyhow::{Context, Result};
use clap::ArgMatches;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use casetype_classifiers::config::{ModelConfig, ModelType};

use crate::util::validate_case_file;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub train_data: String,
    pub output_file: String,
    pub model: ModelConfig,
    pub report_file: Option<String>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            train_data: String::new(),
            output_file: String::from("model.bin"),
            model: ModelConfig::default(),
            report_file: None,
        }
    }
}

impl TrainConfig {
    pub fn load(config_path: &PathBuf) -> Result<Self> {
        let config_json = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
        serde_json::from_str(&config_json)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))
    }

    pub fn from_arguments(config_path: Option<&PathBuf>, matches: &ArgMatches) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => TrainConfig::load(path)?,
            None => TrainConfig::default(),
        };

        // Apply CLI overrides
        if let Some(train_data) = matches.get_one::<String>("train_data") {
            config.train_data = train_data.clone();
        }
        validate_case_file(&config.train_data)?;

        if let Some(output_file) = matches.get_one::<String>("output_file") {
            config.output_file = output_file.clone();
        }

        if let Some(report_file) = matches.get_one::<String>("report_file") {
            config.report_file = Some(report_file.clone());
        }

        if let Some(learning_rate) = matches.get_one::<f64>("learning_rate") {
            config.model.learning_rate = *learning_rate;
        }

        let ModelType::GBDT {
            max_depth,
            num_boost_round,
            ..
        } = &mut config.model.model_type;
        if let Some(depth) = matches.get_one::<u32>("max_depth") {
            *max_depth = *depth;
        }
        if let Some(rounds) = matches.get_one::<u32>("num_boost_round") {
            *num_boost_round = *rounds;
        }

        config.model.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let config: TrainConfig = serde_json::from_str(r#"{"train_data": "cases.json"}"#).unwrap();
        assert_eq!(config.train_data, "cases.json");
        assert_eq!(config.output_file, "model.bin");
        assert_eq!(config.model, ModelConfig::default());
        assert!(config.report_file.is_none());
    }
}
