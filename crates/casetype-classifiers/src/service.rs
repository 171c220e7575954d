//! Serving-side state and request handling.
//!
//! A [`ServiceContext`] owns the model served by the process. Requests take a
//! snapshot (`Arc`) of the current model and keep using it even if a newly
//! trained model is swapped in while they run. Handlers are transport
//! agnostic: they take and return JSON values plus an HTTP-style status.
use std::path::Path;
use std::sync::{Arc, RwLock};

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::artifact;
use crate::data_handling::{parse_age, FeatureRow, AGE_COLUMN, ETHNICITY_COLUMN, LOCATION_COLUMN};
use crate::error::{PipelineError, Result};
use crate::importance::{self, NamedScores};
use crate::io::CaseStore;
use crate::pipeline::{FittedModel, Prediction};

/// Decimal places for probabilities in responses.
pub const PROBABILITY_DECIMALS: i32 = 4;

/// Prediction input as received from a client; any key may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idade: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etnia: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localizacao: Option<Value>,
}

impl PredictionRequest {
    pub fn new(age: u32, ethnicity: &str, location: &str) -> Self {
        Self {
            idade: Some(Value::from(age)),
            etnia: Some(Value::from(ethnicity)),
            localizacao: Some(Value::from(location)),
        }
    }

    /// Check that all three fields are present and well-typed.
    pub fn to_feature_row(&self) -> Result<FeatureRow> {
        let missing: Vec<&str> = [
            (AGE_COLUMN, &self.idade),
            (ETHNICITY_COLUMN, &self.etnia),
            (LOCATION_COLUMN, &self.localizacao),
        ]
        .iter()
        .filter(|(_, v)| matches!(v, None | Some(Value::Null)))
        .map(|(name, _)| *name)
        .collect();
        if !missing.is_empty() {
            return Err(PipelineError::MissingField(missing.join(", ")));
        }

        let age = self.idade.as_ref().map(parse_age).transpose()?.unwrap_or_default();
        let text = |value: &Option<Value>, field: &str| match value {
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(PipelineError::feature(field, "expected a string")),
        };
        Ok(FeatureRow::new(
            f64::from(age),
            text(&self.etnia, ETHNICITY_COLUMN)?,
            text(&self.localizacao, LOCATION_COLUMN)?,
        ))
    }
}

/// Predicted label and the probability of every class, in codec order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    #[serde(rename = "classe_predita")]
    pub predicted_class: String,
    #[serde(rename = "probabilidades")]
    pub probabilities: NamedScores,
}

impl PredictionResult {
    pub fn rounded(&self) -> Self {
        Self {
            predicted_class: self.predicted_class.clone(),
            probabilities: self.probabilities.rounded(PROBABILITY_DECIMALS),
        }
    }
}

/// Run one request through a fitted model and decode the result.
pub fn predict(model: &FittedModel, request: &PredictionRequest) -> Result<PredictionResult> {
    let row = request.to_feature_row()?;
    decode_prediction(model, model.pipeline.predict(&row)?)
}

/// Validate every request up front, then score the rows in parallel.
pub fn predict_batch(
    model: &FittedModel,
    requests: &[PredictionRequest],
) -> Result<Vec<PredictionResult>> {
    let rows = requests
        .iter()
        .map(PredictionRequest::to_feature_row)
        .collect::<Result<Vec<_>>>()?;
    model
        .pipeline
        .predict_batch(&rows)
        .into_iter()
        .map(|prediction| decode_prediction(model, prediction?))
        .collect()
}

fn decode_prediction(model: &FittedModel, prediction: Prediction) -> Result<PredictionResult> {
    let predicted_class = model.codec.decode(prediction.class_index)?.to_string();
    if prediction.probabilities.len() != model.codec.num_classes() {
        return Err(PipelineError::ArtifactCorrupt(format!(
            "classifier returned {} probabilities for {} labels",
            prediction.probabilities.len(),
            model.codec.num_classes()
        )));
    }
    let probabilities = model
        .codec
        .classes()
        .iter()
        .cloned()
        .zip(prediction.probabilities)
        .collect();
    Ok(PredictionResult {
        predicted_class,
        probabilities: NamedScores::new(probabilities),
    })
}

#[derive(Debug, Clone)]
enum ModelSlot {
    Loaded(Arc<FittedModel>),
    Unavailable(String),
}

/// Health summary mirroring the service's root endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub database: &'static str,
    pub model_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_records: Option<usize>,
}

/// Process-wide serving state, passed explicitly to every handler.
pub struct ServiceContext {
    model: RwLock<ModelSlot>,
    store: Option<Arc<dyn CaseStore + Send + Sync>>,
}

impl ServiceContext {
    pub fn new(model: FittedModel) -> Self {
        Self {
            model: RwLock::new(ModelSlot::Loaded(Arc::new(model))),
            store: None,
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            model: RwLock::new(ModelSlot::Unavailable(reason.into())),
            store: None,
        }
    }

    /// Load the artifact at `path`. A failed load yields a context whose
    /// calls all report the model as unavailable.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        match artifact::load_from_path(path.as_ref()) {
            Ok(model) => Self::new(model),
            Err(e) => {
                error!("Failed to load model from {}: {}", path.as_ref().display(), e);
                Self::unavailable(e.to_string())
            }
        }
    }

    pub fn with_store(mut self, store: Arc<dyn CaseStore + Send + Sync>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn store(&self) -> Option<&Arc<dyn CaseStore + Send + Sync>> {
        self.store.as_ref()
    }

    /// The currently served model. Callers keep the snapshot for the whole request.
    pub fn snapshot(&self) -> Result<Arc<FittedModel>> {
        let slot = match self.model.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        match slot {
            ModelSlot::Loaded(model) => Ok(model),
            ModelSlot::Unavailable(reason) => Err(PipelineError::ModelUnavailable(reason)),
        }
    }

    /// Atomically replace the served model.
    pub fn swap_model(&self, model: FittedModel) {
        let next = ModelSlot::Loaded(Arc::new(model));
        match self.model.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        info!("Swapped in a new model");
    }

    pub fn predict(&self, request: &PredictionRequest) -> Result<PredictionResult> {
        let model = self.snapshot()?;
        predict(&model, request)
    }

    pub fn predict_batch(&self, requests: &[PredictionRequest]) -> Result<Vec<PredictionResult>> {
        let model = self.snapshot()?;
        predict_batch(&model, requests)
    }

    pub fn importances(&self) -> Result<NamedScores> {
        let model = self.snapshot()?;
        importance::report(&model.pipeline)
    }

    pub fn health(&self) -> HealthStatus {
        let (model_loaded, model_error) = match self.snapshot() {
            Ok(_) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        };
        let num_records = self.store.as_ref().and_then(|store| match store.count() {
            Ok(n) => Some(n),
            Err(e) => {
                warn!("Failed to count stored cases: {:#}", e);
                None
            }
        });
        HealthStatus {
            status: "online",
            database: if num_records.is_some() { "connected" } else { "disconnected" },
            model_loaded,
            model_error,
            num_records,
        }
    }
}

/// Status code and JSON body produced by a handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
}

impl Reply {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn error(err: &PipelineError) -> Self {
        Self {
            status: err.status_code(),
            body: json!({ "error": err.to_string() }),
        }
    }
}

/// Handle a prediction request body (`{"idade", "etnia", "localizacao"}`).
pub fn handle_predict(ctx: &ServiceContext, body: &Value) -> Reply {
    let request: PredictionRequest = match body {
        Value::Object(_) => match serde_json::from_value(body.clone()) {
            Ok(request) => request,
            Err(e) => return Reply::error(&PipelineError::feature("body", e.to_string())),
        },
        _ => {
            return Reply::error(&PipelineError::MissingField(format!(
                "{}, {}, {}",
                AGE_COLUMN, ETHNICITY_COLUMN, LOCATION_COLUMN
            )))
        }
    };
    match ctx.predict(&request) {
        Ok(result) => Reply::ok(json!(result.rounded())),
        Err(e) => {
            warn!("Prediction failed: {}", e);
            Reply::error(&e)
        }
    }
}

pub fn handle_importances(ctx: &ServiceContext) -> Reply {
    match ctx.importances() {
        Ok(scores) => Reply::ok(json!(scores)),
        Err(e) => {
            error!("Feature importance report failed: {}", e);
            Reply::error(&e)
        }
    }
}

pub fn handle_health(ctx: &ServiceContext) -> Reply {
    Reply::ok(json!(ctx.health()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_fields_are_listed() {
        let request: PredictionRequest = serde_json::from_value(json!({"etnia": "A"})).unwrap();
        match request.to_feature_row() {
            Err(PipelineError::MissingField(fields)) => assert_eq!(fields, "idade, localizacao"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn wrong_types_are_validation_errors() {
        let request: PredictionRequest =
            serde_json::from_value(json!({"idade": "old", "etnia": "A", "localizacao": "X"}))
                .unwrap();
        assert!(matches!(
            request.to_feature_row(),
            Err(PipelineError::FeatureValidation { .. })
        ));
        let request: PredictionRequest =
            serde_json::from_value(json!({"idade": 3, "etnia": 1, "localizacao": "X"})).unwrap();
        assert_eq!(request.to_feature_row().unwrap_err().status_code(), 400);
    }

    #[test]
    fn unavailable_context() {
        let ctx = ServiceContext::unavailable("no artifact");
        assert!(matches!(
            ctx.predict(&PredictionRequest::new(30, "A", "X")),
            Err(PipelineError::ModelUnavailable(_))
        ));
        let reply = handle_importances(&ctx);
        assert_eq!(reply.status, 500);
        let health = ctx.health();
        assert!(!health.model_loaded);
        assert_eq!(health.database, "disconnected");
    }

    #[test]
    fn load_missing_file_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ServiceContext::load(dir.path().join("absent.bin"));
        assert!(ctx.snapshot().is_err());
        assert_eq!(handle_health(&ctx).body["model_loaded"], json!(false));
    }

    #[test]
    fn batch_requires_a_model() {
        let ctx = ServiceContext::unavailable("no artifact");
        assert!(ctx.predict_batch(&[]).is_err());
    }

    #[test]
    fn non_object_body_is_bad_request() {
        let ctx = ServiceContext::unavailable("no artifact");
        assert_eq!(handle_predict(&ctx, &json!([1, 2])).status, 400);
    }
}
