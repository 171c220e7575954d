use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Bijection between target label strings and dense class indices.
///
/// Labels are indexed in the order they are first seen during [`LabelCodec::fit`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCodec {
    classes: Vec<String>,
}

impl LabelCodec {
    pub fn fit<S: AsRef<str>>(labels: &[S]) -> Self {
        let mut classes: Vec<String> = Vec::new();
        for label in labels {
            let label = label.as_ref();
            if !classes.iter().any(|c| c == label) {
                classes.push(label.to_string());
            }
        }
        Self { classes }
    }

    /// Rebuild from a persisted class list; duplicates would break the bijection.
    pub fn from_classes(classes: Vec<String>) -> Result<Self> {
        for (i, class) in classes.iter().enumerate() {
            if classes[..i].contains(class) {
                return Err(PipelineError::ArtifactCorrupt(format!(
                    "label `{}` appears twice",
                    class
                )));
            }
        }
        Ok(Self { classes })
    }

    pub fn encode(&self, label: &str) -> Result<usize> {
        self.classes
            .iter()
            .position(|c| c == label)
            .ok_or_else(|| PipelineError::UnknownLabel(label.to_string()))
    }

    pub fn encode_all<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>> {
        labels.iter().map(|l| self.encode(l.as_ref())).collect()
    }

    pub fn decode(&self, index: usize) -> Result<&str> {
        self.classes
            .get(index)
            .map(String::as_str)
            .ok_or(PipelineError::IndexOutOfRange {
                index,
                num_classes: self.classes.len(),
            })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }
}
