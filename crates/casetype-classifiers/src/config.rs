use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{PipelineError, Result};

/// Central configuration for the classifier.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub learning_rate: f64,

    #[serde(flatten)]
    pub model_type: ModelType,
}

/// Supported model types and their hyper-parameters.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub enum ModelType {
    GBDT {
        max_depth: u32,
        num_boost_round: u32,
        /// Minimum hessian sum required in each child of a split.
        min_child_weight: f64,
        /// L2 penalty on leaf weights.
        reg_lambda: f64,
        /// Minimum loss reduction required to keep a split.
        gamma: f64,
    },
}

impl Default for ModelType {
    fn default() -> Self {
        ModelType::GBDT {
            max_depth: 6,
            num_boost_round: 100,
            min_child_weight: 0.0,
            reg_lambda: 1.0,
            gamma: 0.0,
        }
    }
}

impl FromStr for ModelType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gbdt" => Ok(ModelType::default()),
            _ => Err(format!("Unknown model type: {}", s)),
        }
    }
}

impl ModelConfig {
    pub fn new(learning_rate: f64, model_type: ModelType) -> Self {
        Self {
            learning_rate,
            model_type,
        }
    }

    /// Reject hyper-parameters the booster cannot train with.
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(PipelineError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        match &self.model_type {
            ModelType::GBDT {
                num_boost_round,
                min_child_weight,
                reg_lambda,
                gamma,
                ..
            } => {
                if *num_boost_round == 0 {
                    return Err(PipelineError::Config(
                        "num_boost_round must be at least 1".to_string(),
                    ));
                }
                if *min_child_weight < 0.0 || *reg_lambda < 0.0 || *gamma < 0.0 {
                    return Err(PipelineError::Config(
                        "min_child_weight, reg_lambda and gamma must be non-negative".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.3,
            model_type: ModelType::default(),
        }
    }
}
