//! Feature importances keyed by expanded feature name.
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{PipelineError, Result};
use crate::models::classifier_trait::ClassifierModel;
use crate::pipeline::Pipeline;

/// Ordered `name -> value` pairs that serialize as a JSON object in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamedScores(Vec<(String, f64)>);

impl NamedScores {
    pub fn new(entries: Vec<(String, f64)>) -> Self {
        Self(entries)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn entries(&self) -> &[(String, f64)] {
        &self.0
    }

    pub fn names(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.0.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy with every value rounded to `decimals` places.
    pub fn rounded(&self, decimals: i32) -> Self {
        let scale = 10f64.powi(decimals);
        Self(
            self.0
                .iter()
                .map(|(n, v)| (n.clone(), (v * scale).round() / scale))
                .collect(),
        )
    }

    /// Copy sorted by value, largest first; equal values keep their order.
    pub fn sorted_desc(&self) -> Self {
        let mut entries = self.0.clone();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1));
        Self(entries)
    }
}

impl Serialize for NamedScores {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Pair every expanded feature name with the classifier's importance weight.
///
/// Names are `<column>_<category>` for each vocabulary entry of each
/// categorical column, then the numeric column names, matching the encoder's
/// output layout.
pub fn report<C: ClassifierModel>(pipeline: &Pipeline<C>) -> Result<NamedScores> {
    if !pipeline.is_fitted() {
        return Err(PipelineError::ModelUnavailable("pipeline has not been fitted".to_string()));
    }
    let names = pipeline.encoder().feature_names();
    let weights = pipeline.classifier().feature_importances();
    if names.len() != weights.len() {
        return Err(PipelineError::LayoutMismatch {
            names: names.len(),
            weights: weights.len(),
        });
    }
    Ok(NamedScores(names.into_iter().zip(weights).collect()))
}
