//! Feature encoder and classifier composed behind one fit/predict surface.
use log::{debug, info};
use rayon::prelude::*;

use crate::config::ModelConfig;
use crate::data_handling::{FeatureRow, TrainingSet};
use crate::error::{PipelineError, Result};
use crate::label_codec::LabelCodec;
use crate::models::classifier_trait::{argmax, ClassifierModel};
use crate::models::gbdt::GBDTClassifier;
use crate::preprocessing::FeatureEncoder;

/// Class index plus the full probability vector for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub class_index: usize,
    pub probabilities: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline<C = GBDTClassifier> {
    encoder: FeatureEncoder,
    classifier: C,
}

impl Pipeline<GBDTClassifier> {
    /// Unfitted case-record pipeline using the configured booster.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            FeatureEncoder::for_case_records(),
            GBDTClassifier::new(config),
        ))
    }
}

impl<C: ClassifierModel> Pipeline<C> {
    pub fn new(encoder: FeatureEncoder, classifier: C) -> Self {
        Self {
            encoder,
            classifier,
        }
    }

    /// Assemble a pipeline from already-fitted parts, checking that the
    /// encoder's output width is what the classifier was trained on.
    pub fn from_fitted(encoder: FeatureEncoder, classifier: C) -> Result<Self> {
        let pipeline = Self::new(encoder, classifier);
        pipeline.check_layout()?;
        Ok(pipeline)
    }

    /// Fit the encoder, encode every row, then fit the classifier. Both are
    /// fitted on copies; `self` only changes when every stage succeeds.
    pub fn fit(&mut self, rows: &[FeatureRow], labels: &[usize], num_classes: usize) -> Result<()>
    where
        C: Clone,
    {
        if rows.is_empty() {
            return Err(PipelineError::EmptyTrainingSet);
        }
        if rows.len() != labels.len() {
            return Err(PipelineError::feature(
                "labels",
                format!("{} labels for {} rows", labels.len(), rows.len()),
            ));
        }
        let mut encoder = self.encoder.clone();
        encoder.fit(rows)?;
        let x = encoder.transform_all(rows)?;
        debug!("Encoded training matrix: rows={}, cols={}", x.nrows(), x.ncols());
        let mut classifier = self.classifier.clone();
        classifier.fit(&x, labels, num_classes)?;

        let fitted = Self::from_fitted(encoder, classifier)?;
        *self = fitted;
        Ok(())
    }

    pub fn predict(&self, row: &FeatureRow) -> Result<Prediction> {
        let x = self.encoder.transform(row)?;
        let probabilities = self.classifier.predict_proba(&x)?;
        Ok(Prediction {
            class_index: argmax(&probabilities),
            probabilities,
        })
    }

    pub fn encoder(&self) -> &FeatureEncoder {
        &self.encoder
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn is_fitted(&self) -> bool {
        self.encoder.is_fitted() && self.classifier.is_fitted()
    }

    pub fn check_layout(&self) -> Result<()> {
        if !self.is_fitted() {
            return Err(PipelineError::ModelUnavailable("pipeline has not been fitted".to_string()));
        }
        let declared = self.encoder.num_features();
        let expected = self.classifier.num_features();
        if declared != expected {
            return Err(PipelineError::ArtifactCorrupt(format!(
                "encoder declares {} columns but the classifier expects {}",
                declared, expected
            )));
        }
        Ok(())
    }
}

impl<C: ClassifierModel + Sync> Pipeline<C> {
    /// Predict many rows in parallel; results keep input order.
    pub fn predict_batch(&self, rows: &[FeatureRow]) -> Vec<Result<Prediction>> {
        rows.par_iter().map(|row| self.predict(row)).collect()
    }
}

/// A fitted pipeline together with the codec for its target labels.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedModel<C = GBDTClassifier> {
    pub pipeline: Pipeline<C>,
    pub codec: LabelCodec,
}

impl<C: ClassifierModel> FittedModel<C> {
    pub fn new(pipeline: Pipeline<C>, codec: LabelCodec) -> Result<Self> {
        pipeline.check_layout()?;
        if pipeline.classifier().num_classes() != codec.num_classes() {
            return Err(PipelineError::ArtifactCorrupt(format!(
                "classifier has {} classes but the label codec has {}",
                pipeline.classifier().num_classes(),
                codec.num_classes()
            )));
        }
        Ok(Self { pipeline, codec })
    }
}

/// Fit a label codec and a fresh pipeline on a training set.
pub fn train(set: &TrainingSet, config: &ModelConfig) -> Result<FittedModel> {
    if set.is_empty() {
        return Err(PipelineError::EmptyTrainingSet);
    }
    let codec = LabelCodec::fit(&set.labels);
    let y = codec.encode_all(&set.labels)?;
    let mut pipeline = Pipeline::from_config(config)?;
    pipeline.fit(&set.rows, &y, codec.num_classes())?;
    info!(
        "Trained pipeline on {} records: {} features, classes {:?}",
        set.len(),
        pipeline.encoder().num_features(),
        codec.classes()
    );
    FittedModel::new(pipeline, codec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelType;

    fn small_config() -> ModelConfig {
        ModelConfig::new(
            0.3,
            ModelType::GBDT {
                max_depth: 3,
                num_boost_round: 20,
                min_child_weight: 0.0,
                reg_lambda: 1.0,
                gamma: 0.0,
            },
        )
    }

    fn training_set() -> TrainingSet {
        TrainingSet {
            rows: vec![
                FeatureRow::new(30.0, "A", "X"),
                FeatureRow::new(45.0, "B", "Y"),
                FeatureRow::new(31.0, "A", "X"),
                FeatureRow::new(47.0, "B", "Y"),
            ],
            labels: vec!["Theft".into(), "Assault".into(), "Theft".into(), "Assault".into()],
            dropped: 0,
        }
    }

    #[test]
    fn train_and_predict() {
        let model = train(&training_set(), &small_config()).unwrap();
        let p = model.pipeline.predict(&FeatureRow::new(30.0, "A", "X")).unwrap();
        assert_eq!(model.codec.decode(p.class_index).unwrap(), "Theft");
        assert_eq!(p.probabilities.len(), 2);
    }

    #[test]
    fn predict_batch_matches_single_predictions() {
        let model = train(&training_set(), &small_config()).unwrap();
        let rows = vec![
            FeatureRow::new(30.0, "A", "X"),
            FeatureRow::new(46.0, "B", "Y"),
            FeatureRow::new(46.0, "Z", "W"),
        ];
        let batch = model.pipeline.predict_batch(&rows);
        for (row, result) in rows.iter().zip(batch) {
            assert_eq!(result.unwrap(), model.pipeline.predict(row).unwrap());
        }
    }

    #[test]
    fn refit_replaces_previous_state() {
        let mut pipeline = Pipeline::from_config(&small_config()).unwrap();
        pipeline
            .fit(&[FeatureRow::new(1.0, "A", "X"), FeatureRow::new(2.0, "B", "X")], &[0, 1], 2)
            .unwrap();
        pipeline
            .fit(&[FeatureRow::new(1.0, "C", "Y"), FeatureRow::new(2.0, "C", "Y")], &[0, 1], 2)
            .unwrap();
        assert_eq!(pipeline.encoder().feature_names(), vec!["etnia_C", "localizacao_Y", "idade"]);
    }

    #[test]
    fn failed_refit_keeps_previous_state() {
        let mut pipeline = Pipeline::from_config(&small_config()).unwrap();
        pipeline
            .fit(&[FeatureRow::new(1.0, "A", "X"), FeatureRow::new(2.0, "B", "Y")], &[0, 1], 2)
            .unwrap();
        let before = pipeline.clone();

        let bad_rows = [
            FeatureRow::new(1.0, "C", "Z"),
            FeatureRow::new(f64::NAN, "D", "W"),
        ];
        assert!(matches!(
            pipeline.fit(&bad_rows, &[0, 1], 2),
            Err(PipelineError::FeatureValidation { .. })
        ));
        assert_eq!(pipeline, before);
        assert_eq!(
            pipeline.encoder().feature_names(),
            vec!["etnia_A", "etnia_B", "localizacao_X", "localizacao_Y", "idade"]
        );

        // A label outside the class range fails in the classifier stage.
        assert!(matches!(
            pipeline.fit(&bad_rows[..1], &[5], 2),
            Err(PipelineError::IndexOutOfRange { .. })
        ));
        assert_eq!(pipeline, before);
    }

    #[test]
    fn fit_rejects_mismatched_lengths_and_empty_input() {
        let mut pipeline = Pipeline::from_config(&small_config()).unwrap();
        assert!(matches!(pipeline.fit(&[], &[], 2), Err(PipelineError::EmptyTrainingSet)));
        assert!(pipeline.fit(&[FeatureRow::new(1.0, "A", "X")], &[0, 1], 2).is_err());
        assert!(train(&TrainingSet::default(), &small_config()).is_err());
    }

    #[test]
    fn unfitted_pipeline_reports_unavailable() {
        let pipeline = Pipeline::from_config(&small_config()).unwrap();
        assert!(!pipeline.is_fitted());
        assert!(pipeline.predict(&FeatureRow::new(1.0, "A", "X")).is_err());
    }

    #[test]
    fn codec_class_count_must_match() {
        let model = train(&training_set(), &small_config()).unwrap();
        let codec = LabelCodec::fit(&["only"]);
        assert!(matches!(
            FittedModel::new(model.pipeline, codec),
            Err(PipelineError::ArtifactCorrupt(_))
        ));
    }
}
