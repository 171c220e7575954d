//! Gradient-boosted decision trees with a softmax (multi-class logistic) loss.
//!
//! Each boosting round fits one regression tree per class on the first and
//! second derivatives of the softmax cross-entropy, using exact greedy split
//! search. Raw class scores start at zero and accumulate
//! `learning_rate * tree.predict(x)`; probabilities are the softmax of the
//! accumulated scores.
use log::{debug, info};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::config::{ModelConfig, ModelType};
use crate::error::{PipelineError, Result};
use crate::models::classifier_trait::ClassifierModel;

/// Splits must reduce the loss by more than this to be kept.
const MIN_SPLIT_GAIN: f64 = 1e-6;
/// Floor on the per-sample hessian.
const MIN_HESSIAN: f64 = 1e-16;

/// Node of a regression tree. Children always sit at higher indices than their parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    Split {
        feature: usize,
        /// Samples with `x[feature] <= threshold` go left.
        threshold: f64,
        left: usize,
        right: usize,
        /// Loss reduction achieved by this split.
        gain: f64,
    },
    Leaf {
        value: f64,
    },
}

/// A regression tree predicting a raw score contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    pub fn from_nodes(nodes: Vec<TreeNode>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Check that traversal terminates and only touches known features.
    fn validate(&self, num_features: usize) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("empty tree".to_string());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    gain,
                } => {
                    if *feature >= num_features {
                        return Err(format!(
                            "node {} splits on feature {} but the model has {} features",
                            i, feature, num_features
                        ));
                    }
                    let len = self.nodes.len();
                    if *left <= i || *right <= i || *left >= len || *right >= len {
                        return Err(format!(
                            "node {} has invalid children ({}, {})",
                            i, left, right
                        ));
                    }
                    if !threshold.is_finite() || !gain.is_finite() || *gain < 0.0 {
                        return Err(format!("node {} has a non-finite threshold or gain", i));
                    }
                }
                TreeNode::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(format!("leaf {} has a non-finite value", i));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Hyper-parameters unpacked from [`ModelConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct TreeParams {
    learning_rate: f64,
    max_depth: u32,
    num_boost_round: u32,
    min_child_weight: f64,
    reg_lambda: f64,
    gamma: f64,
}

impl TreeParams {
    fn from_config(config: &ModelConfig) -> Self {
        match config.model_type {
            ModelType::GBDT {
                max_depth,
                num_boost_round,
                min_child_weight,
                reg_lambda,
                gamma,
            } => TreeParams {
                learning_rate: config.learning_rate,
                max_depth,
                num_boost_round,
                min_child_weight,
                reg_lambda,
                gamma,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Gradient Boosting Decision Tree (GBDT) classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GBDTClassifier {
    params: TreeParams,
    /// `rounds[r][k]` is the tree fitted for class `k` in round `r`.
    rounds: Vec<Vec<RegressionTree>>,
    num_features: usize,
    num_classes: usize,
}

impl GBDTClassifier {
    pub fn new(config: &ModelConfig) -> Self {
        GBDTClassifier {
            params: TreeParams::from_config(config),
            rounds: Vec::new(),
            num_features: 0,
            num_classes: 0,
        }
    }

    pub fn num_rounds(&self) -> usize {
        self.rounds.len()
    }

    pub fn learning_rate(&self) -> f64 {
        self.params.learning_rate
    }

    /// Raw (pre-softmax) class scores.
    pub fn raw_scores(&self, x: &[f64]) -> Vec<f64> {
        let mut scores = vec![0.0; self.num_classes];
        for round in &self.rounds {
            for (k, tree) in round.iter().enumerate() {
                scores[k] += self.params.learning_rate * tree.predict(x);
            }
        }
        scores
    }

    /// Structural consistency check for a deserialized model.
    pub fn validate_structure(&self) -> Result<()> {
        if self.num_classes == 0 {
            return Err(PipelineError::ArtifactCorrupt(
                "classifier has no classes".to_string(),
            ));
        }
        if !(self.params.learning_rate.is_finite() && self.params.learning_rate > 0.0) {
            return Err(PipelineError::ArtifactCorrupt(
                "classifier learning rate is not positive".to_string(),
            ));
        }
        for (r, round) in self.rounds.iter().enumerate() {
            if round.len() != self.num_classes {
                return Err(PipelineError::ArtifactCorrupt(format!(
                    "round {} has {} trees, expected {}",
                    r,
                    round.len(),
                    self.num_classes
                )));
            }
            for tree in round {
                tree.validate(self.num_features).map_err(|e| {
                    PipelineError::ArtifactCorrupt(format!("round {}: {}", r, e))
                })?;
            }
        }
        Ok(())
    }

    fn build_tree(&self, x: &Array2<f64>, grad: &[f64], hess: &[f64]) -> RegressionTree {
        let mut nodes = Vec::new();
        let indices: Vec<usize> = (0..x.nrows()).collect();
        self.grow(x, grad, hess, indices, 0, &mut nodes);
        RegressionTree { nodes }
    }

    fn grow(
        &self,
        x: &Array2<f64>,
        grad: &[f64],
        hess: &[f64],
        indices: Vec<usize>,
        depth: u32,
        nodes: &mut Vec<TreeNode>,
    ) -> usize {
        let g: f64 = indices.iter().map(|&i| grad[i]).sum();
        let h: f64 = indices.iter().map(|&i| hess[i]).sum();
        let id = nodes.len();
        let leaf = TreeNode::Leaf {
            value: -g / (h + self.params.reg_lambda),
        };

        if depth >= self.params.max_depth || indices.len() < 2 {
            nodes.push(leaf);
            return id;
        }
        let split = match self.best_split(x, grad, hess, &indices, g, h) {
            Some(split) => split,
            None => {
                nodes.push(leaf);
                return id;
            }
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| x[(i, split.feature)] <= split.threshold);

        // Reserve the slot so children land at higher indices.
        nodes.push(leaf);
        let left = self.grow(x, grad, hess, left_idx, depth + 1, nodes);
        let right = self.grow(x, grad, hess, right_idx, depth + 1, nodes);
        nodes[id] = TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
            gain: split.gain,
        };
        id
    }

    fn best_split(
        &self,
        x: &Array2<f64>,
        grad: &[f64],
        hess: &[f64],
        indices: &[usize],
        g_total: f64,
        h_total: f64,
    ) -> Option<SplitCandidate> {
        let lambda = self.params.reg_lambda;
        let parent_score = g_total * g_total / (h_total + lambda);
        let mut best: Option<SplitCandidate> = None;

        for feature in 0..x.ncols() {
            let mut sorted: Vec<(f64, usize)> =
                indices.iter().map(|&i| (x[(i, feature)], i)).collect();
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

            let mut g_left = 0.0;
            let mut h_left = 0.0;
            for w in 0..sorted.len() - 1 {
                let (value, i) = sorted[w];
                g_left += grad[i];
                h_left += hess[i];
                let next = sorted[w + 1].0;
                if next <= value {
                    continue;
                }
                let g_right = g_total - g_left;
                let h_right = h_total - h_left;
                if h_left < self.params.min_child_weight || h_right < self.params.min_child_weight {
                    continue;
                }
                let gain = 0.5
                    * (g_left * g_left / (h_left + lambda) + g_right * g_right / (h_right + lambda)
                        - parent_score)
                    - self.params.gamma;
                if gain <= MIN_SPLIT_GAIN {
                    continue;
                }
                if best.map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: value + (next - value) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }
}

/// Numerically stable softmax.
pub fn softmax(scores: &[f64]) -> Vec<f64> {
    let max_score = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp_scores: Vec<f64> = scores.iter().map(|&s| (s - max_score).exp()).collect();
    let sum_exp: f64 = exp_scores.iter().sum();
    exp_scores.iter().map(|&e| e / sum_exp).collect()
}

impl ClassifierModel for GBDTClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &[usize], num_classes: usize) -> Result<()> {
        let (nrows, ncols) = x.dim();
        if nrows == 0 {
            return Err(PipelineError::EmptyTrainingSet);
        }
        if y.len() != nrows {
            return Err(PipelineError::feature(
                "labels",
                format!("{} labels for {} rows", y.len(), nrows),
            ));
        }
        if num_classes == 0 {
            return Err(PipelineError::Config("num_classes must be at least 1".to_string()));
        }
        if let Some(&bad) = y.iter().find(|&&c| c >= num_classes) {
            return Err(PipelineError::IndexOutOfRange {
                index: bad,
                num_classes,
            });
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::feature(
                "matrix",
                "feature matrix contains non-finite values",
            ));
        }

        self.num_features = ncols;
        self.num_classes = num_classes;
        self.rounds = Vec::with_capacity(self.params.num_boost_round as usize);

        let lr = self.params.learning_rate;
        let rows: Vec<Vec<f64>> = x.outer_iter().map(|r| r.to_vec()).collect();
        let mut scores = vec![0.0; nrows * num_classes];
        let mut grad = vec![vec![0.0; nrows]; num_classes];
        let mut hess = vec![vec![0.0; nrows]; num_classes];

        debug!(
            "Training GBDT: rows={}, cols={}, classes={}, rounds={}",
            nrows, ncols, num_classes, self.params.num_boost_round
        );

        for round in 0..self.params.num_boost_round {
            for i in 0..nrows {
                let p = softmax(&scores[i * num_classes..(i + 1) * num_classes]);
                for k in 0..num_classes {
                    let target = if y[i] == k { 1.0 } else { 0.0 };
                    grad[k][i] = p[k] - target;
                    hess[k][i] = (2.0 * p[k] * (1.0 - p[k])).max(MIN_HESSIAN);
                }
            }

            let trees: Vec<RegressionTree> = (0..num_classes)
                .map(|k| self.build_tree(x, &grad[k], &hess[k]))
                .collect();

            for (i, row) in rows.iter().enumerate() {
                for (k, tree) in trees.iter().enumerate() {
                    scores[i * num_classes + k] += lr * tree.predict(row);
                }
            }
            self.rounds.push(trees);

            if (round + 1) % 25 == 0 {
                debug!("Finished boosting round {}", round + 1);
            }
        }

        info!(
            "Trained GBDT with {} rounds x {} classes on {} samples",
            self.rounds.len(),
            num_classes,
            nrows
        );
        Ok(())
    }

    fn predict_proba(&self, x: &[f64]) -> Result<Vec<f64>> {
        if !self.is_fitted() {
            return Err(PipelineError::ModelUnavailable(
                "classifier has not been fitted".to_string(),
            ));
        }
        if x.len() != self.num_features {
            return Err(PipelineError::feature(
                "features",
                format!("expected {} values, got {}", self.num_features, x.len()),
            ));
        }
        Ok(softmax(&self.raw_scores(x)))
    }

    /// Total split gain per feature over every tree, normalised to sum to 1.
    /// Unlike XGBoost's default (mean gain per split), a feature split often
    /// with small gains can outrank one split once with a large gain.
    fn feature_importances(&self) -> Vec<f64> {
        let mut importances = vec![0.0; self.num_features];
        for tree in self.rounds.iter().flatten() {
            for node in tree.nodes() {
                if let TreeNode::Split { feature, gain, .. } = node {
                    importances[*feature] += gain;
                }
            }
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for v in importances.iter_mut() {
                *v /= total;
            }
        }
        importances
    }

    fn num_features(&self) -> usize {
        self.num_features
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn is_fitted(&self) -> bool {
        self.num_classes > 0
    }

    fn name(&self) -> &str {
        "gbdt"
    }
}
