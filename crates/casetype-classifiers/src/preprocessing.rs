//! One-hot encoding of categorical columns with numeric passthrough.
//!
//! The encoder's fitted state fixes the output layout: for every categorical
//! column, one indicator per vocabulary entry (in first-seen order), followed
//! by every numeric column in declaration order. Values absent from a
//! vocabulary encode as an all-zero block instead of failing.

use log::debug;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::data_handling::{FeatureRow, FeatureValue, AGE_COLUMN, ETHNICITY_COLUMN, LOCATION_COLUMN};
use crate::error::{PipelineError, Result};

/// Ordered set of category strings observed for one column at fit time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    categories: Vec<String>,
}

impl Vocabulary {
    pub fn from_categories(categories: Vec<String>) -> Self {
        Self { categories }
    }

    fn observe(&mut self, value: &str) {
        if !self.categories.iter().any(|c| c == value) {
            self.categories.push(value.to_string());
        }
    }

    pub fn position(&self, value: &str) -> Option<usize> {
        self.categories.iter().position(|c| c == value)
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    fn has_duplicates(&self) -> bool {
        self.categories
            .iter()
            .enumerate()
            .any(|(i, c)| self.categories[..i].contains(c))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalColumn {
    pub name: String,
    pub vocabulary: Vocabulary,
}

/// Describes one output column of the encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnDescriptor {
    Indicator { column: String, category: String },
    Numeric { column: String },
}

impl ColumnDescriptor {
    /// Expanded feature name: `<column>_<category>` or the numeric column name.
    pub fn feature_name(&self) -> String {
        match self {
            ColumnDescriptor::Indicator { column, category } => format!("{}_{}", column, category),
            ColumnDescriptor::Numeric { column } => column.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureEncoder {
    categorical: Vec<CategoricalColumn>,
    numeric: Vec<String>,
    fitted: bool,
}

impl FeatureEncoder {
    /// An unfitted encoder over the given categorical and numeric columns.
    pub fn new(categorical: &[&str], numeric: &[&str]) -> Self {
        Self {
            categorical: categorical
                .iter()
                .map(|name| CategoricalColumn {
                    name: name.to_string(),
                    vocabulary: Vocabulary::default(),
                })
                .collect(),
            numeric: numeric.iter().map(|n| n.to_string()).collect(),
            fitted: false,
        }
    }

    /// Ethnicity and location one-hot encoded, age passed through.
    pub fn for_case_records() -> Self {
        Self::new(&[ETHNICITY_COLUMN, LOCATION_COLUMN], &[AGE_COLUMN])
    }

    /// Rebuild a fitted encoder from persisted state.
    pub fn from_state(categorical: Vec<CategoricalColumn>, numeric: Vec<String>) -> Result<Self> {
        let encoder = Self {
            categorical,
            numeric,
            fitted: true,
        };
        encoder.check_layout()?;
        Ok(encoder)
    }

    /// Learn one vocabulary per categorical column. Every row is validated
    /// before any previous state is replaced.
    pub fn fit(&mut self, rows: &[FeatureRow]) -> Result<()> {
        for row in rows {
            for name in &self.numeric {
                numeric_value(row, name)?;
            }
        }
        let mut vocabularies = Vec::with_capacity(self.categorical.len());
        for column in &self.categorical {
            let mut vocabulary = Vocabulary::default();
            for row in rows {
                vocabulary.observe(categorical_value(row, &column.name)?);
            }
            debug!(
                "Fitted vocabulary for `{}` with {} categories",
                column.name,
                vocabulary.len()
            );
            vocabularies.push(vocabulary);
        }
        for (column, vocabulary) in self.categorical.iter_mut().zip(vocabularies) {
            column.vocabulary = vocabulary;
        }
        self.fitted = true;
        Ok(())
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted
    }

    /// Width of every vector produced by [`FeatureEncoder::transform`].
    pub fn num_features(&self) -> usize {
        self.categorical.iter().map(|c| c.vocabulary.len()).sum::<usize>() + self.numeric.len()
    }

    pub fn transform(&self, row: &FeatureRow) -> Result<Vec<f64>> {
        if !self.fitted {
            return Err(PipelineError::ModelUnavailable(
                "feature encoder has not been fitted".to_string(),
            ));
        }
        let mut out = vec![0.0; self.num_features()];
        let mut offset = 0;
        for column in &self.categorical {
            let value = categorical_value(row, &column.name)?;
            if let Some(pos) = column.vocabulary.position(value) {
                out[offset + pos] = 1.0;
            }
            offset += column.vocabulary.len();
        }
        for name in &self.numeric {
            out[offset] = numeric_value(row, name)?;
            offset += 1;
        }
        Ok(out)
    }

    /// Encode many rows into a samples x features matrix.
    pub fn transform_all(&self, rows: &[FeatureRow]) -> Result<Array2<f64>> {
        let ncols = self.num_features();
        let mut data = Vec::with_capacity(rows.len() * ncols);
        for row in rows {
            data.extend(self.transform(row)?);
        }
        Array2::from_shape_vec((rows.len(), ncols), data)
            .map_err(|e| PipelineError::feature("matrix", e.to_string()))
    }

    /// Output columns in layout order.
    pub fn describe_columns(&self) -> Vec<ColumnDescriptor> {
        let mut columns = Vec::with_capacity(self.num_features());
        for column in &self.categorical {
            for category in column.vocabulary.categories() {
                columns.push(ColumnDescriptor::Indicator {
                    column: column.name.clone(),
                    category: category.clone(),
                });
            }
        }
        for name in &self.numeric {
            columns.push(ColumnDescriptor::Numeric {
                column: name.clone(),
            });
        }
        columns
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.describe_columns()
            .iter()
            .map(ColumnDescriptor::feature_name)
            .collect()
    }

    pub fn categorical_columns(&self) -> &[CategoricalColumn] {
        &self.categorical
    }

    pub fn numeric_columns(&self) -> &[String] {
        &self.numeric
    }

    fn check_layout(&self) -> Result<()> {
        let mut names: Vec<&str> = self.categorical.iter().map(|c| c.name.as_str()).collect();
        names.extend(self.numeric.iter().map(String::as_str));
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(PipelineError::ArtifactCorrupt(format!(
                    "column `{}` declared twice",
                    name
                )));
            }
        }
        if let Some(column) = self.categorical.iter().find(|c| c.vocabulary.has_duplicates()) {
            return Err(PipelineError::ArtifactCorrupt(format!(
                "vocabulary for `{}` contains duplicate categories",
                column.name
            )));
        }
        Ok(())
    }
}

fn categorical_value<'a>(row: &'a FeatureRow, column: &str) -> Result<&'a str> {
    match row.value(column) {
        Some(FeatureValue::Categorical(value)) => Ok(value),
        Some(FeatureValue::Numeric(_)) => {
            Err(PipelineError::feature(column, "expected a category"))
        }
        None => Err(PipelineError::feature(column, "column not present in record")),
    }
}

fn numeric_value(row: &FeatureRow, column: &str) -> Result<f64> {
    match row.value(column) {
        Some(FeatureValue::Numeric(value)) if value.is_finite() => Ok(value),
        Some(FeatureValue::Numeric(value)) => Err(PipelineError::feature(
            column,
            format!("expected a finite number, got {}", value),
        )),
        Some(FeatureValue::Categorical(_)) => {
            Err(PipelineError::feature(column, "expected a number"))
        }
        None => Err(PipelineError::feature(column, "column not present in record")),
    }
}
