//! casetype-classifiers: train/serve pipeline for case-type classification.
//!
//! Case records are flattened into (age, ethnicity, location) rows, one-hot
//! encoded with a vocabulary fixed at fit time, and classified by a
//! gradient-boosted tree ensemble with a softmax loss. The fitted encoder,
//! trees and label list persist together as one versioned artifact so that
//! serving reproduces the exact feature layout used for training.
pub mod artifact;
pub mod config;
pub mod data_handling;
pub mod error;
pub mod importance;
pub mod io;
pub mod label_codec;
pub mod models;
pub mod pipeline;
pub mod preprocessing;
pub mod report;
pub mod service;
pub mod synthetic;

pub use error::{PipelineError, Result};
pub use pipeline::{train, FittedModel, Pipeline, Prediction};
