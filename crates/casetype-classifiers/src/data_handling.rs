//! Case record types and the projection from nested records to flat feature rows.
//!
//! Stored records arrive as loosely-typed JSON documents ([`RawCaseRecord`]).
//! They are either validated into a well-typed [`CaseRecord`] or flattened
//! directly into a [`FeatureRow`] plus target label for training, where
//! incomplete documents are dropped rather than rejected.
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PipelineError, Result};

pub const AGE_COLUMN: &str = "idade";
pub const ETHNICITY_COLUMN: &str = "etnia";
pub const LOCATION_COLUMN: &str = "localizacao";
pub const CASE_TYPE_COLUMN: &str = "tipo_do_caso";
pub const CASE_DATE_COLUMN: &str = "data_do_caso";
pub const VICTIM_COLUMN: &str = "vitima";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VictimInfo {
    #[serde(rename = "etnia")]
    pub ethnicity: String,
    #[serde(rename = "idade")]
    pub age: u32,
}

/// A validated case record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    #[serde(rename = "data_do_caso")]
    pub case_date: String,
    #[serde(rename = "tipo_do_caso")]
    pub case_type: String,
    #[serde(rename = "localizacao")]
    pub location: String,
    #[serde(rename = "vitima")]
    pub victim: VictimInfo,
}

impl CaseRecord {
    pub fn new(
        case_date: impl Into<String>,
        case_type: impl Into<String>,
        location: impl Into<String>,
        ethnicity: impl Into<String>,
        age: u32,
    ) -> Self {
        Self {
            case_date: case_date.into(),
            case_type: case_type.into(),
            location: location.into(),
            victim: VictimInfo {
                ethnicity: ethnicity.into(),
                age,
            },
        }
    }

    /// Project the record into its feature row and target label.
    pub fn flatten(&self) -> (FeatureRow, String) {
        (
            FeatureRow {
                age: f64::from(self.victim.age),
                ethnicity: self.victim.ethnicity.clone(),
                location: self.location.clone(),
            },
            self.case_type.clone(),
        )
    }
}

/// Victim sub-document as stored; every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawVictim {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etnia: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idade: Option<Value>,
}

/// A case document as stored; nothing is guaranteed present or well-typed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCaseRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_do_caso: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tipo_do_caso: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localizacao: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vitima: Option<RawVictim>,
}

impl From<&CaseRecord> for RawCaseRecord {
    fn from(record: &CaseRecord) -> Self {
        RawCaseRecord {
            data_do_caso: Some(Value::from(record.case_date.clone())),
            tipo_do_caso: Some(Value::from(record.case_type.clone())),
            localizacao: Some(Value::from(record.location.clone())),
            vitima: Some(RawVictim {
                etnia: Some(Value::from(record.victim.ethnicity.clone())),
                idade: Some(Value::from(record.victim.age)),
            }),
        }
    }
}

impl RawCaseRecord {
    /// Validate every field, including the case date, into a [`CaseRecord`].
    pub fn validate(&self) -> Result<CaseRecord> {
        let victim = self
            .vitima
            .as_ref()
            .ok_or_else(|| PipelineError::MissingField(VICTIM_COLUMN.to_string()))?;
        let age = parse_age(required(victim.idade.as_ref(), AGE_COLUMN)?)?;
        let ethnicity = required_text(victim.etnia.as_ref(), ETHNICITY_COLUMN)?;
        let case_date = required_text(self.data_do_caso.as_ref(), CASE_DATE_COLUMN)?;
        parse_iso_date(&case_date)?;
        let case_type = required_text(self.tipo_do_caso.as_ref(), CASE_TYPE_COLUMN)?;
        let location = required_text(self.localizacao.as_ref(), LOCATION_COLUMN)?;

        Ok(CaseRecord {
            case_date,
            case_type,
            location,
            victim: VictimInfo { ethnicity, age },
        })
    }

    /// Flatten for training. The case date is not a feature and is not checked.
    pub fn training_example(&self) -> Result<(FeatureRow, String)> {
        let victim = self
            .vitima
            .as_ref()
            .ok_or_else(|| PipelineError::MissingField(VICTIM_COLUMN.to_string()))?;
        let age = parse_age(required(victim.idade.as_ref(), AGE_COLUMN)?)?;
        let ethnicity = required_text(victim.etnia.as_ref(), ETHNICITY_COLUMN)?;
        let location = required_text(self.localizacao.as_ref(), LOCATION_COLUMN)?;
        let case_type = required_text(self.tipo_do_caso.as_ref(), CASE_TYPE_COLUMN)?;

        Ok((
            FeatureRow {
                age: f64::from(age),
                ethnicity,
                location,
            },
            case_type,
        ))
    }
}

/// Flat feature tuple fed to the encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub age: f64,
    pub ethnicity: String,
    pub location: String,
}

/// A single cell of a [`FeatureRow`], looked up by column name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureValue<'a> {
    Numeric(f64),
    Categorical(&'a str),
}

impl FeatureRow {
    pub fn new(age: f64, ethnicity: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            age,
            ethnicity: ethnicity.into(),
            location: location.into(),
        }
    }

    pub fn value(&self, column: &str) -> Option<FeatureValue<'_>> {
        match column {
            AGE_COLUMN => Some(FeatureValue::Numeric(self.age)),
            ETHNICITY_COLUMN => Some(FeatureValue::Categorical(&self.ethnicity)),
            LOCATION_COLUMN => Some(FeatureValue::Categorical(&self.location)),
            _ => None,
        }
    }
}

/// Training rows and labels after incomplete records were dropped.
#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    pub rows: Vec<FeatureRow>,
    pub labels: Vec<String>,
    pub dropped: usize,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Flatten stored records into a training set, dropping any record that is
/// missing (or carries a malformed) age, ethnicity, location or case type.
pub fn build_training_set(records: &[RawCaseRecord]) -> TrainingSet {
    let mut set = TrainingSet::default();
    for (i, record) in records.iter().enumerate() {
        match record.training_example() {
            Ok((row, label)) => {
                set.rows.push(row);
                set.labels.push(label);
            }
            Err(e) => {
                debug!("Dropping record {}: {}", i, e);
                set.dropped += 1;
            }
        }
    }
    if set.dropped > 0 {
        warn!(
            "Dropped {} of {} records with missing or malformed fields",
            set.dropped,
            records.len()
        );
    }
    set
}

fn required<'a>(value: Option<&'a Value>, field: &str) -> Result<&'a Value> {
    match value {
        None | Some(Value::Null) => Err(PipelineError::MissingField(field.to_string())),
        Some(v) => Ok(v),
    }
}

fn required_text(value: Option<&Value>, field: &str) -> Result<String> {
    parse_text(required(value, field)?, field)
}

fn parse_text(value: &Value, field: &str) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Err(PipelineError::feature(
            field,
            format!("expected a string, got {}", other),
        )),
    }
}

/// Ages must be non-negative whole numbers; `30.0` is accepted, `30.5` is not.
pub fn parse_age(value: &Value) -> Result<u32> {
    if let Some(age) = value.as_u64() {
        return u32::try_from(age)
            .map_err(|_| PipelineError::feature(AGE_COLUMN, "age out of range"));
    }
    match value.as_f64() {
        Some(age)
            if age.is_finite()
                && age >= 0.0
                && age.fract() == 0.0
                && age <= f64::from(u32::MAX) =>
        {
            Ok(age as u32)
        }
        Some(age) => Err(PipelineError::feature(
            AGE_COLUMN,
            format!("expected a non-negative integer, got {}", age),
        )),
        None => Err(PipelineError::feature(
            AGE_COLUMN,
            format!("expected a number, got {}", value),
        )),
    }
}

/// Accepts `YYYY-MM-DD` or a full ISO-8601 date-time.
pub fn parse_iso_date(text: &str) -> Result<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(date);
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|dt| dt.date())
        .map_err(|_| {
            PipelineError::feature(
                CASE_DATE_COLUMN,
                format!("`{}` is not an ISO-8601 date", text),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawCaseRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn validate_full_record() {
        let record = raw(json!({
            "data_do_caso": "2024-03-01",
            "tipo_do_caso": "Furto",
            "localizacao": "Centro",
            "vitima": {"etnia": "Parda", "idade": 34}
        }))
        .validate()
        .unwrap();
        assert_eq!(record, CaseRecord::new("2024-03-01", "Furto", "Centro", "Parda", 34));
    }

    #[test]
    fn validate_rejects_bad_date_and_missing_victim() {
        let bad_date = raw(json!({
            "data_do_caso": "yesterday",
            "tipo_do_caso": "Furto",
            "localizacao": "Centro",
            "vitima": {"etnia": "Parda", "idade": 34}
        }));
        assert!(matches!(
            bad_date.validate(),
            Err(PipelineError::FeatureValidation { .. })
        ));

        let no_victim = raw(json!({
            "data_do_caso": "2024-03-01",
            "tipo_do_caso": "Furto",
            "localizacao": "Centro"
        }));
        assert!(matches!(
            no_victim.validate(),
            Err(PipelineError::MissingField(f)) if f == "vitima"
        ));
    }

    #[test]
    fn datetime_dates_are_accepted() {
        assert!(parse_iso_date("2024-03-01T10:15:00").is_ok());
        assert!(parse_iso_date("2024-13-01").is_err());
    }

    #[test]
    fn age_parsing() {
        assert_eq!(parse_age(&json!(30)).unwrap(), 30);
        assert_eq!(parse_age(&json!(30.0)).unwrap(), 30);
        assert!(parse_age(&json!(30.5)).is_err());
        assert!(parse_age(&json!(-1)).is_err());
        assert!(parse_age(&json!("30")).is_err());
    }

    #[test]
    fn training_set_drops_incomplete_records() {
        let records = vec![
            raw(json!({
                "tipo_do_caso": "Furto",
                "localizacao": "Centro",
                "vitima": {"etnia": "Preta", "idade": 20}
            })),
            raw(json!({
                "tipo_do_caso": "Furto",
                "localizacao": "Centro",
                "vitima": {"etnia": "Preta"}
            })),
            raw(json!({"localizacao": "Centro", "vitima": {"etnia": "Preta", "idade": 20}})),
            raw(json!({
                "tipo_do_caso": "Assalto",
                "localizacao": null,
                "vitima": {"etnia": "Branca", "idade": 50}
            })),
            raw(json!({
                "tipo_do_caso": "Assalto",
                "localizacao": "Bairro A",
                "vitima": {"etnia": "Branca", "idade": 50}
            })),
        ];
        let set = build_training_set(&records);
        assert_eq!(set.len(), 2);
        assert_eq!(set.dropped, 3);
        assert_eq!(set.labels, vec!["Furto".to_string(), "Assalto".to_string()]);
        assert_eq!(set.rows[1], FeatureRow::new(50.0, "Branca", "Bairro A"));
    }

    #[test]
    fn flatten_projects_victim_fields() {
        let record = CaseRecord::new("2024-01-01", "Tráfico", "Zona Rural", "Indígena", 61);
        let (row, label) = record.flatten();
        assert_eq!(label, "Tráfico");
        assert_eq!(row.value(AGE_COLUMN), Some(FeatureValue::Numeric(61.0)));
        assert_eq!(row.value(LOCATION_COLUMN), Some(FeatureValue::Categorical("Zona Rural")));
        assert_eq!(row.value("unknown"), None);
    }

    #[test]
    fn raw_round_trip_from_case_record() {
        let record = CaseRecord::new("2024-01-01", "Furto", "Centro", "Amarela", 8);
        let raw = RawCaseRecord::from(&record);
        assert_eq!(raw.validate().unwrap(), record);
    }
}
