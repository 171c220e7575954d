use ndarray::Array2;

use crate::error::Result;

/// Contract between the pipeline and a multi-class classifier.
///
/// Implementations train once on an encoded feature matrix and afterwards
/// answer read-only queries, so a fitted model can be shared across threads.
pub trait ClassifierModel {
    /// Fit the model. `y` holds dense class indices in `0..num_classes`.
    fn fit(&mut self, x: &Array2<f64>, y: &[usize], num_classes: usize) -> Result<()>;

    /// Class-probability vector of length `num_classes()` for one encoded row.
    fn predict_proba(&self, x: &[f64]) -> Result<Vec<f64>>;

    /// Most probable class; ties go to the lowest index.
    fn predict_class(&self, x: &[f64]) -> Result<usize> {
        Ok(argmax(&self.predict_proba(x)?))
    }

    /// One non-negative weight per input column, in input column order.
    fn feature_importances(&self) -> Vec<f64>;

    fn num_features(&self) -> usize;

    fn num_classes(&self) -> usize;

    fn is_fitted(&self) -> bool;

    /// Optional human readable name for the model
    fn name(&self) -> &str {
        "classifier"
    }
}

/// Index of the largest value, preferring the lowest index on ties.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::argmax;

    #[test]
    fn argmax_prefers_lowest_index_on_ties() {
        assert_eq!(argmax(&[0.25, 0.5, 0.25]), 1);
        assert_eq!(argmax(&[0.5, 0.5]), 0);
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), 1);
        assert_eq!(argmax(&[]), 0);
    }
}
