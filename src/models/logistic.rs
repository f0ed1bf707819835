//! Per-label binary logistic regression on user embeddings.
use linfa::prelude::*;
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2};
use rayon::prelude::*;

/// Classifier error types.
#[derive(Debug, Fail)]
pub enum ClassifierError {
    /// The solver rejected the training data.
    #[fail(display = "Logistic regression for label {} failed: {}", label, reason)]
    Fit {
        /// Label column being trained.
        label: usize,
        /// Solver message.
        reason: String,
    },
    /// Feature rows and targets disagree.
    #[fail(display = "{} feature rows but {} targets.", _0, _1)]
    Shape(usize, usize),
}

/// Solver settings shared by every label.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hyperparameters {
    lambda: f64,
    max_iterations: u64,
}

impl Hyperparameters {
    /// `lambda` is the L2 penalty, `max_iterations` caps the solver.
    pub fn new(lambda: f64, max_iterations: usize) -> Self {
        Hyperparameters {
            lambda,
            max_iterations: max_iterations as u64,
        }
    }
}

/// A fitted binary classifier for one label.
pub enum BinaryClassifier {
    /// L2-regularised logistic regression.
    Logistic(FittedLogisticRegression<f64, bool>),
    /// All training targets had the same value.
    Constant(bool),
}

impl BinaryClassifier {
    /// Fit on `features`, one row per user, against `targets`.
    pub fn fit(
        features: &Array2<f64>,
        targets: &[bool],
        hyper: Hyperparameters,
    ) -> Result<Self, ClassifierError> {
        let rows = features.nrows();

        if rows != targets.len() {
            return Err(ClassifierError::Shape(rows, targets.len()));
        }

        let positives = targets.iter().filter(|x| **x).count();
        if positives == 0 || positives == targets.len() {
            return Ok(BinaryClassifier::Constant(positives > 0));
        }

        let dataset = Dataset::new(features.clone(), Array1::from(targets.to_vec()));

        LogisticRegression::default()
            .alpha(hyper.lambda)
            .max_iterations(hyper.max_iterations)
            .fit(&dataset)
            .map(BinaryClassifier::Logistic)
            .map_err(|e| ClassifierError::Fit {
                label: 0,
                reason: e.to_string(),
            })
    }

    /// Probability of the positive class for every row of `features`.
    pub fn predict_proba(&self, features: &Array2<f64>) -> Vec<f64> {
        match self {
            BinaryClassifier::Constant(positive) => {
                vec![if *positive { 1.0 } else { 0.0 }; features.nrows()]
            }
            BinaryClassifier::Logistic(model) => model.predict_probabilities(features).to_vec(),
        }
    }

    /// Positive when the probability exceeds one half.
    pub fn predict(&self, features: &Array2<f64>) -> Vec<bool> {
        self.predict_proba(features)
            .into_iter()
            .map(|x| x > 0.5)
            .collect()
    }

    /// Whether training saw a single class.
    pub fn is_constant(&self) -> bool {
        match self {
            BinaryClassifier::Constant(_) => true,
            BinaryClassifier::Logistic(_) => false,
        }
    }
}

/// Copy embedding rows into a feature matrix.
pub fn to_features(embedding: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn(embedding.shape(), |(row, col)| embedding[(row, col)])
}

/// Train one classifier per label column, in parallel. The result is in
/// label order.
pub fn fit_labels(
    features: &Array2<f64>,
    columns: &[Vec<bool>],
    hyper: Hyperparameters,
) -> Result<Vec<BinaryClassifier>, ClassifierError> {
    columns
        .par_iter()
        .enumerate()
        .map(|(label, targets)| {
            debug!("Training classifier for label {}", label);

            let classifier =
                BinaryClassifier::fit(features, targets, hyper).map_err(|e| match e {
                    ClassifierError::Fit { reason, .. } => ClassifierError::Fit { label, reason },
                    other => other,
                })?;

            if classifier.is_constant() {
                warn!(
                    "Label {} has a single class in the training split, predicting it constantly",
                    label
                );
            }

            Ok(classifier)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> (DMatrix<f64>, Vec<bool>) {
        let mut values = Vec::new();
        let mut targets = Vec::new();

        for idx in 0..40 {
            let offset = (idx % 5) as f64 * 0.1;
            if idx % 2 == 0 {
                values.extend_from_slice(&[1.0 + offset, 0.5 - offset]);
                targets.push(true);
            } else {
                values.extend_from_slice(&[-1.0 - offset, -0.5 + offset]);
                targets.push(false);
            }
        }

        (DMatrix::from_row_slice(40, 2, &values), targets)
    }

    fn hyper() -> Hyperparameters {
        Hyperparameters::new(0.001, 100)
    }

    #[test]
    fn features_keep_row_order() {
        let embedding = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let features = to_features(&embedding);

        assert_eq!(features.dim(), (2, 3));
        assert_eq!(features[[0, 2]], 3.0);
        assert_eq!(features[[1, 0]], 4.0);
    }

    #[test]
    fn learns_separable_labels() {
        let (embedding, targets) = separable();
        let features = to_features(&embedding);

        let classifier = BinaryClassifier::fit(&features, &targets, hyper()).unwrap();
        assert!(!classifier.is_constant());

        let probabilities = classifier.predict_proba(&features);
        assert!(probabilities.iter().all(|x| *x >= 0.0 && *x <= 1.0));
        assert_eq!(classifier.predict(&features), targets);
    }

    #[test]
    fn iteration_budget_limits_training() {
        let (embedding, mut targets) = separable();
        // Flip a few targets so the optimum is finite and far from the start.
        for idx in (0..40).step_by(7) {
            targets[idx] = !targets[idx];
        }
        let features = to_features(&embedding);

        let short = BinaryClassifier::fit(&features, &targets, Hyperparameters::new(0.001, 1))
            .unwrap()
            .predict_proba(&features);
        let long = BinaryClassifier::fit(&features, &targets, Hyperparameters::new(0.001, 500))
            .unwrap()
            .predict_proba(&features);

        assert!(short
            .iter()
            .zip(long.iter())
            .any(|(a, b)| (a - b).abs() > 1e-6));
    }

    #[test]
    fn single_class_is_constant() {
        let (embedding, _) = separable();
        let features = to_features(&embedding);

        let positive = BinaryClassifier::fit(&features, &vec![true; 40], hyper()).unwrap();
        assert!(positive.is_constant());
        assert!(positive.predict_proba(&features).iter().all(|x| *x == 1.0));

        let negative = BinaryClassifier::fit(&features, &vec![false; 40], hyper()).unwrap();
        assert!(negative.predict(&features).iter().all(|x| !x));
    }

    #[test]
    fn shape_mismatch_is_an_error() {
        let (embedding, _) = separable();
        let features = to_features(&embedding);

        assert!(BinaryClassifier::fit(&features, &[true, false], hyper()).is_err());
    }

    #[test]
    fn fits_every_label_in_order() {
        let (embedding, targets) = separable();
        let features = to_features(&embedding);
        let flipped: Vec<bool> = targets.iter().map(|x| !x).collect();

        let classifiers =
            fit_labels(&features, &[targets.clone(), vec![false; 40], flipped.clone()], hyper())
                .unwrap();

        assert_eq!(classifiers.len(), 3);
        assert_eq!(classifiers[0].predict(&features), targets);
        assert!(classifiers[1].is_constant());
        assert_eq!(classifiers[2].predict(&features), flipped);
    }
}
