//! Per-split prediction records and the multi-label metrics computed on them.
use std::fmt;

use rayon::prelude::*;

use crate::data::UserLabels;
use crate::UserId;

/// Evaluation error types.
#[derive(Debug, Fail)]
pub enum EvaluationError {
    /// A scored user has no true label vector.
    #[fail(display = "User {} has predictions but no labels.", _0)]
    MissingLabels(UserId),
    /// Predictions and truth disagree on the label count.
    #[fail(display = "User {} has {} predictions, expected {}.", user, predicted, expected)]
    LabelCount {
        /// Offending user.
        user: UserId,
        /// Number of predicted labels.
        predicted: usize,
        /// Number of true labels.
        expected: usize,
    },
    /// A label's outputs do not cover every user of the split.
    #[fail(
        display = "Got {} predictions and {} probabilities for {} users.",
        predictions, probabilities, users
    )]
    OutputCount {
        /// Number of predictions passed.
        predictions: usize,
        /// Number of probabilities passed.
        probabilities: usize,
        /// Number of users in the split.
        users: usize,
    },
}

/// Which side of a fold a set of users belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    /// Users the classifiers were trained on.
    Train,
    /// Held-out users.
    Valid,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Valid => write!(f, "valid"),
        }
    }
}

/// Predictions for the users of one split, one entry per label, filled in
/// label by label.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SplitStats {
    /// Side of the fold.
    pub split: Split,
    /// Users, in row order.
    pub users: Vec<UserId>,
    /// Per user, the thresholded prediction of every label.
    pub predictions: Vec<Vec<bool>>,
    /// Per user, the positive probability of every label.
    pub probabilities: Vec<Vec<f64>>,
}

impl SplitStats {
    /// Empty records for `users`.
    pub fn new(split: Split, users: Vec<UserId>) -> Self {
        let num_users = users.len();

        SplitStats {
            split,
            users,
            predictions: vec![Vec::new(); num_users],
            probabilities: vec![Vec::new(); num_users],
        }
    }

    /// Append one label's outputs; both slices are in user order.
    pub fn record(
        &mut self,
        predictions: &[bool],
        probabilities: &[f64],
    ) -> Result<(), EvaluationError> {
        let users = self.users.len();

        if predictions.len() != users || probabilities.len() != users {
            return Err(EvaluationError::OutputCount {
                predictions: predictions.len(),
                probabilities: probabilities.len(),
                users,
            });
        }

        for (row, (&prediction, &probability)) in
            predictions.iter().zip(probabilities.iter()).enumerate()
        {
            self.predictions[row].push(prediction);
            self.probabilities[row].push(probability);
        }

        Ok(())
    }

    /// Number of labels recorded so far.
    pub fn num_labels(&self) -> usize {
        self.predictions.first().map(|x| x.len()).unwrap_or(0)
    }

    /// True label vectors of the split's users, in row order.
    pub fn truth<'a>(&self, labels: &'a UserLabels) -> Result<Vec<&'a [bool]>, EvaluationError> {
        self.users
            .iter()
            .zip(self.predictions.iter())
            .map(|(&user, predicted)| {
                let truth = labels
                    .get(user)
                    .ok_or(EvaluationError::MissingLabels(user))?;

                if truth.len() != predicted.len() {
                    return Err(EvaluationError::LabelCount {
                        user,
                        predicted: predicted.len(),
                        expected: truth.len(),
                    });
                }

                Ok(truth)
            })
            .collect()
    }
}

/// The six metrics of one split.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
    /// See [`micro_f1`].
    pub micro_f1: f64,
    /// See [`one_error`].
    pub one_error: f64,
    /// See [`ranking_loss`].
    pub ranking_loss: f64,
    /// See [`coverage`].
    pub coverage: f64,
    /// See [`average_precision`].
    pub avg_precision: f64,
    /// See [`hamming_loss`].
    pub hamming_loss: f64,
}

/// Score `stats` against the true labels.
pub fn kpis(stats: &SplitStats, labels: &UserLabels) -> Result<Kpis, EvaluationError> {
    let truth = stats.truth(labels)?;
    let probabilities = &stats.probabilities;

    Ok(Kpis {
        micro_f1: micro_f1(&truth, &stats.predictions),
        one_error: one_error(&truth, probabilities),
        ranking_loss: ranking_loss(&truth, probabilities),
        coverage: coverage(&truth, probabilities),
        avg_precision: average_precision(&truth, probabilities),
        hamming_loss: hamming_loss(&truth, &stats.predictions),
    })
}

/// `2TP / (2TP + FP + FN)` over every user and label.
pub fn micro_f1(truth: &[&[bool]], predictions: &[Vec<bool>]) -> f64 {
    let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);

    for (actual, predicted) in truth.iter().zip(predictions.iter()) {
        for (&a, &p) in actual.iter().zip(predicted.iter()) {
            match (a, p) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (true, false) => fn_ += 1,
                (false, false) => {}
            }
        }
    }

    let denominator = 2 * tp + fp + fn_;

    if denominator == 0 {
        0.0
    } else {
        (2 * tp) as f64 / denominator as f64
    }
}

/// Fraction of (user, label) cells predicted wrongly.
pub fn hamming_loss(truth: &[&[bool]], predictions: &[Vec<bool>]) -> f64 {
    let total: usize = truth.iter().map(|x| x.len()).sum();

    if total == 0 {
        return 0.0;
    }

    let mismatches: usize = truth
        .iter()
        .zip(predictions.iter())
        .map(|(actual, predicted)| {
            actual
                .iter()
                .zip(predicted.iter())
                .filter(|(a, p)| a != p)
                .count()
        })
        .sum();

    mismatches as f64 / total as f64
}

/// Fraction of users whose top-scored label is not one of theirs.
pub fn one_error(truth: &[&[bool]], probabilities: &[Vec<f64>]) -> f64 {
    mean_over_users(truth, probabilities, |actual, probs| {
        if probs.is_empty() {
            return 0.0;
        }

        let mut top = 0;
        for (label, &probability) in probs.iter().enumerate() {
            if probability > probs[top] {
                top = label;
            }
        }

        if actual[top] {
            0.0
        } else {
            1.0
        }
    })
}

/// Fraction of (relevant, irrelevant) label pairs ordered wrongly.
pub fn ranking_loss(truth: &[&[bool]], probabilities: &[Vec<f64>]) -> f64 {
    mean_over_users(truth, probabilities, |actual, probs| {
        let (relevant, irrelevant) = partition(actual, probs);

        if relevant.is_empty() || irrelevant.is_empty() {
            return 0.0;
        }

        let misordered = relevant
            .iter()
            .map(|&positive| irrelevant.iter().filter(|&&negative| negative >= positive).count())
            .sum::<usize>();

        misordered as f64 / (relevant.len() * irrelevant.len()) as f64
    })
}

/// How far down the ranking one must go to cover every relevant label.
pub fn coverage(truth: &[&[bool]], probabilities: &[Vec<f64>]) -> f64 {
    mean_over_users(truth, probabilities, |actual, probs| {
        let deepest = actual
            .iter()
            .zip(probs.iter())
            .filter(|(a, _)| **a)
            .map(|(_, &p)| rank(probs, p))
            .max();

        match deepest {
            Some(deepest) => (deepest - 1) as f64,
            None => 0.0,
        }
    })
}

/// Mean over relevant labels of the share of relevant labels ranked at or
/// above them.
pub fn average_precision(truth: &[&[bool]], probabilities: &[Vec<f64>]) -> f64 {
    mean_over_users(truth, probabilities, |actual, probs| {
        let (relevant, irrelevant) = partition(actual, probs);

        if relevant.is_empty() || irrelevant.is_empty() {
            return 1.0;
        }

        let precision_sum: f64 = relevant
            .iter()
            .map(|&p| {
                let relevant_above = relevant.iter().filter(|&&x| x >= p).count();
                relevant_above as f64 / rank(probs, p) as f64
            })
            .sum();

        precision_sum / relevant.len() as f64
    })
}

/// Number of labels scored at least `probability`.
fn rank(probabilities: &[f64], probability: f64) -> usize {
    probabilities.iter().filter(|&&x| x >= probability).count()
}

/// Probabilities of the relevant and of the irrelevant labels.
fn partition(actual: &[bool], probabilities: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut relevant = Vec::new();
    let mut irrelevant = Vec::new();

    for (&a, &p) in actual.iter().zip(probabilities.iter()) {
        if a {
            relevant.push(p);
        } else {
            irrelevant.push(p);
        }
    }

    (relevant, irrelevant)
}

fn mean_over_users<F>(truth: &[&[bool]], probabilities: &[Vec<f64>], per_user: F) -> f64
where
    F: Fn(&[bool], &[f64]) -> f64 + Sync,
{
    if truth.is_empty() {
        return 0.0;
    }

    let total: f64 = truth
        .par_iter()
        .zip(probabilities.par_iter())
        .map(|(actual, probs)| per_user(*actual, probs.as_slice()))
        .sum();

    total / truth.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    fn example() -> (SplitStats, UserLabels) {
        let mut labels = UserLabels::new(4);
        labels.insert(1, vec![true, false, true, false]).unwrap();
        labels.insert(2, vec![false, true, false, false]).unwrap();

        let mut stats = SplitStats::new(Split::Valid, vec![1, 2]);
        let probabilities = [[0.9, 0.3], [0.6, 0.2], [0.4, 0.8], [0.1, 0.1]];

        for label_probs in probabilities.iter() {
            let predictions: Vec<bool> = label_probs.iter().map(|&x| x > 0.5).collect();
            stats.record(&predictions, label_probs).unwrap();
        }

        (stats, labels)
    }

    #[test]
    fn records_label_by_label() {
        let (stats, _) = example();

        assert_eq!(stats.num_labels(), 4);
        assert_eq!(stats.probabilities[1], vec![0.3, 0.2, 0.8, 0.1]);
        assert_eq!(stats.predictions[0], vec![true, true, false, false]);
    }

    #[test]
    fn short_outputs_are_an_error() {
        let mut stats = SplitStats::new(Split::Train, vec![1, 2, 3]);

        assert!(stats.record(&[true, false], &[0.9, 0.1, 0.3]).is_err());
        assert!(stats.record(&[true, false, true], &[0.9]).is_err());
        assert_eq!(stats.num_labels(), 0);

        stats.record(&[true, false, true], &[0.9, 0.1, 0.6]).unwrap();
        assert_eq!(stats.num_labels(), 1);
    }

    #[test]
    fn hand_computed_metrics() {
        let (stats, labels) = example();
        let kpis = kpis(&stats, &labels).unwrap();

        assert_relative_eq!(kpis.micro_f1, 1.0 / 3.0);
        assert_relative_eq!(kpis.hamming_loss, 0.5);
        assert_relative_eq!(kpis.one_error, 0.5);
        assert_relative_eq!(kpis.ranking_loss, (0.25 + 2.0 / 3.0) / 2.0);
        assert_relative_eq!(kpis.coverage, 2.0);
        assert_relative_eq!(kpis.avg_precision, ((1.0 + 2.0 / 3.0) / 2.0 + 1.0 / 3.0) / 2.0);
    }

    #[test]
    fn perfect_predictions() {
        let truth: Vec<&[bool]> = vec![&[true, false, false][..], &[false, true, true][..]];
        let predictions = vec![vec![true, false, false], vec![false, true, true]];
        let probabilities = vec![vec![0.9, 0.1, 0.2], vec![0.1, 0.7, 0.8]];

        assert_relative_eq!(micro_f1(&truth, &predictions), 1.0);
        assert_relative_eq!(hamming_loss(&truth, &predictions), 0.0);
        assert_relative_eq!(one_error(&truth, &probabilities), 0.0);
        assert_relative_eq!(ranking_loss(&truth, &probabilities), 0.0);
        assert_relative_eq!(average_precision(&truth, &probabilities), 1.0);
        // Second user needs both of the top two labels.
        assert_relative_eq!(coverage(&truth, &probabilities), 0.5);
    }

    #[test]
    fn degenerate_users() {
        let truth: Vec<&[bool]> = vec![&[false, false][..], &[true, true][..]];
        let predictions = vec![vec![false, false], vec![false, false]];
        let probabilities = vec![vec![0.2, 0.4], vec![0.3, 0.3]];

        assert_relative_eq!(micro_f1(&truth, &predictions), 0.0);
        assert_relative_eq!(ranking_loss(&truth, &probabilities), 0.0);
        assert_relative_eq!(average_precision(&truth, &probabilities), 1.0);
        // Empty label set covers nothing; ties rank both labels second.
        assert_relative_eq!(coverage(&truth, &probabilities), 0.5);
        assert_relative_eq!(one_error(&truth, &probabilities), 0.5);
    }

    #[test]
    fn ties_favour_first_label() {
        let truth: Vec<&[bool]> = vec![&[false, true][..]];
        let probabilities = vec![vec![0.5, 0.5]];

        assert_relative_eq!(one_error(&truth, &probabilities), 1.0);
        assert_relative_eq!(ranking_loss(&truth, &probabilities), 1.0);
    }

    #[test]
    fn no_users_no_errors() {
        let truth: Vec<&[bool]> = Vec::new();

        assert_relative_eq!(micro_f1(&truth, &[]), 0.0);
        assert_relative_eq!(one_error(&truth, &[]), 0.0);
        assert_relative_eq!(hamming_loss(&truth, &[]), 0.0);
    }

    #[test]
    fn missing_labels_are_an_error() {
        let (stats, _) = example();
        let mut labels = UserLabels::new(4);
        labels.insert(1, vec![true, false, true, false]).unwrap();

        assert!(kpis(&stats, &labels).is_err());
    }
}
