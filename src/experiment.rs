//! The k-fold driver: embed, classify, score and persist every fold.
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use itertools::Itertools;
use rand::SeedableRng;
use ndarray::Array2;
use rand_chacha::ChaCha8Rng;

use crate::config::{ExperimentConfig, TrainingConfig};
use crate::data::{KFolds, Ratings, UserLabels};
use crate::datasets::{self, DataLoader};
use crate::evaluation::{self, Kpis, Split, SplitStats};
use crate::models::factorization::{FactorizationError, TruncatedSvd};
use crate::models::logistic::{fit_labels, to_features, BinaryClassifier, Hyperparameters};
use crate::validation::StateValidator;
use crate::UserId;

/// Statistics and metrics of one split of one fold.
#[derive(Clone, Debug)]
pub struct SplitReport {
    /// Predictions of every user and label.
    pub stats: SplitStats,
    /// Metrics computed on `stats`.
    pub kpis: Kpis,
}

/// Outcome of one fold.
#[derive(Clone, Debug)]
pub struct FoldReport {
    /// Zero-based fold index.
    pub fold: usize,
    /// Training split first, then validation.
    pub splits: Vec<SplitReport>,
    /// Wall time of the fold.
    pub elapsed: Duration,
}

impl FoldReport {
    /// The report of `split`, if the fold produced one.
    pub fn split(&self, split: Split) -> Option<&SplitReport> {
        self.splits.iter().find(|x| x.stats.split == split)
    }
}

/// A configured k-fold experiment.
pub struct Experiment {
    config: ExperimentConfig,
}

impl Experiment {
    /// Experiment over `config`.
    pub fn new(config: ExperimentConfig) -> Self {
        Experiment { config }
    }

    /// Run with the loader the configuration names.
    pub fn run(&self) -> Result<Vec<FoldReport>, failure::Error> {
        let loader = datasets::loader(
            self.config.dataset,
            &self.config.data_dir,
            self.config.files.clone(),
            self.config.sub.clone(),
        );

        self.run_with(loader.as_ref())
    }

    /// Run with an explicit loader.
    pub fn run_with(&self, loader: &dyn DataLoader) -> Result<Vec<FoldReport>, failure::Error> {
        let training = self.config.training(loader.training_config());
        info!(
            "{}: svd_k {}, max_train_num {}, lambda {}",
            self.config.dataset, training.svd_k, training.max_train_num, training.lambda
        );

        let ratings = loader.load()?;
        let unique_users = ratings.unique_users();
        let labels = loader.labels(&unique_users)?;
        info!(
            "{} ratings from {} users over {} items, {} labels",
            ratings.len(),
            unique_users.len(),
            ratings.num_items(),
            labels.num_labels()
        );

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let folds = KFolds::new(unique_users.len(), self.config.fold_num, &mut rng)?;

        let state = FoldState {
            loader,
            training: &training,
            ratings: &ratings,
            labels: &labels,
            unique_users: &unique_users,
        };
        let mut reports = Vec::with_capacity(folds.len());

        for fold in 0..folds.len() {
            reports.push(self.run_fold(&state, &folds, fold, &mut rng)?);
        }

        Ok(reports)
    }

    fn run_fold(
        &self,
        state: &FoldState,
        folds: &KFolds,
        fold: usize,
        rng: &mut ChaCha8Rng,
    ) -> Result<FoldReport, failure::Error> {
        let start = Instant::now();
        let training = state.training;

        let split = folds.split(fold, state.unique_users);
        info!("{} users in train", split.train.len());
        info!("{} users in valid", split.valid.len());

        let validator = StateValidator::new(
            self.config.dataset,
            state.loader.dataset_sub(),
            fold,
            folds.len(),
            training.max_train_num,
            training.svd_k,
            &self.config.report_dir,
        );

        let matrix = state.ratings.to_csc(&split.ordered_users())?;
        info!(
            "Rating matrix loaded: {} users x {} items, {} entries",
            matrix.nrows(),
            matrix.ncols(),
            matrix.nnz()
        );

        let decomposition = TruncatedSvd::new(training.svd_k)
            .oversamples(self.config.oversamples)
            .power_iterations(self.config.power_iterations)
            .fit(&matrix, rng)
            .map_err(|e| {
                if let FactorizationError::RankTooLarge { k, rows, cols } = e {
                    error!(
                        "The rating file ({}) has {} users and {} items involved; \
                         cannot take {} singular values of a {} x {} matrix (svd_k)",
                        self.rating_file().display(),
                        rows,
                        cols,
                        k,
                        rows,
                        cols
                    );
                }
                e
            })?;

        info!("U dimensions = {:?}", decomposition.u.shape());
        info!("S dimensions = {}", decomposition.singular_values.len());
        info!("V' dimensions = {:?}", decomposition.v_t.shape());

        let (train_embedding, valid_embedding) = decomposition.split_rows(split.train.len());
        let train_features = to_features(&train_embedding);
        let valid_features = to_features(&valid_embedding);

        let columns: Vec<Vec<bool>> = (0..state.labels.num_labels())
            .map(|label| state.labels.column(&split.train, label))
            .collect();
        let hyper = Hyperparameters::new(training.lambda, training.max_train_num);
        let classifiers = fit_labels(&train_features, &columns, hyper)?;
        info!("Logistic regression done for {} labels", classifiers.len());

        let mut train_stats = SplitStats::new(Split::Train, split.train.clone());
        let mut valid_stats = SplitStats::new(Split::Valid, split.valid.clone());

        for classifier in &classifiers {
            record(&mut train_stats, classifier, &train_features)?;
            record(&mut valid_stats, classifier, &valid_features)?;
        }

        let mut splits = Vec::with_capacity(2);

        for stats in vec![train_stats, valid_stats] {
            let kpis = evaluation::kpis(&stats, state.labels)?;
            validator.log_stats(stats.split, &kpis);

            if self.config.dump_predictions {
                let path = validator.write_json_stats(&stats, &kpis)?;
                debug!("Predictions written to {}", path.display());
            }

            splits.push(SplitReport { stats, kpis });
        }

        let rows: Vec<(&SplitStats, &Kpis)> = splits.iter().map(|x| (&x.stats, &x.kpis)).collect();
        let path = validator.write_csv_stats(&rows)?;
        info!("Fold {} stats appended to {}", fold, path.display());

        if !self.config.quiet {
            for report in &splits {
                log_predictions(&report.stats, state.labels);
            }
        }

        let elapsed = start.elapsed();
        info!(
            "Fold {}/{} done in {:.2}s",
            fold + 1,
            folds.len(),
            elapsed.as_secs() as f64 + f64::from(elapsed.subsec_nanos()) * 1e-9
        );

        Ok(FoldReport {
            fold,
            splits,
            elapsed,
        })
    }

    fn rating_file(&self) -> PathBuf {
        self.config
            .rating_file()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| {
                self.config
                    .dataset
                    .default_files(&self.config.data_dir)
                    .rating_file
            })
    }
}

/// Data shared by every fold.
struct FoldState<'a> {
    loader: &'a dyn DataLoader,
    training: &'a TrainingConfig,
    ratings: &'a Ratings,
    labels: &'a UserLabels,
    unique_users: &'a [UserId],
}

fn record(
    stats: &mut SplitStats,
    classifier: &BinaryClassifier,
    features: &Array2<f64>,
) -> Result<(), evaluation::EvaluationError> {
    let probabilities = classifier.predict_proba(features);
    let predictions = classifier.predict(features);

    stats.record(&predictions, &probabilities)
}

fn flags(values: &[bool]) -> String {
    values.iter().map(|&x| x as u8).join(" ")
}

fn log_predictions(stats: &SplitStats, labels: &UserLabels) {
    info!("For {}, actual & predicted & predicted probs", stats.split);
    info!("user, actual, predicted, probs");

    for (user, predicted, probabilities) in
        izip!(&stats.users, &stats.predictions, &stats.probabilities)
    {
        let actual = labels.get(*user).unwrap_or(&[]);

        info!("{}", prediction_line(*user, actual, predicted, probabilities));
    }
}

fn prediction_line(
    user: UserId,
    actual: &[bool],
    predicted: &[bool],
    probabilities: &[f64],
) -> String {
    format!(
        "{}, [{}], [{}], [{}]",
        user,
        flags(actual),
        flags(predicted),
        probabilities.iter().map(|x| format!("{:.3}", x)).join(" ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use approx::assert_abs_diff_eq;
    use tempfile::TempDir;

    use crate::data::Rating;
    use crate::datasets::Dataset;

    /// Two taste groups over disjoint item ranges; the first label marks the
    /// group, the second every third user.
    struct Synthetic;

    impl DataLoader for Synthetic {
        fn training_config(&self) -> TrainingConfig {
            TrainingConfig::new(2, 100, 0.001)
        }

        fn dataset_sub(&self) -> &str {
            "synthetic"
        }

        fn load(&self) -> Result<Ratings, failure::Error> {
            let mut ratings = Ratings::new(20);

            for user in 0..30 {
                let offset = if user < 15 { 0 } else { 10 };
                for j in 0..5 {
                    let item = (user * 3 + j * 7) % 10 + offset;
                    ratings.push(Rating::new(user, item, 1.0 + ((user + j) % 5) as f64));
                }
            }

            Ok(ratings)
        }

        fn labels(&self, users: &[UserId]) -> Result<UserLabels, failure::Error> {
            let mut labels = UserLabels::new(2);

            for &user in users {
                labels.insert(user, vec![user < 15, user % 3 == 0])?;
            }

            Ok(labels)
        }
    }

    fn valid_probabilities(reports: &[FoldReport]) -> Vec<f64> {
        reports
            .iter()
            .flat_map(|x| x.split(Split::Valid))
            .flat_map(|x| x.stats.probabilities.iter())
            .flat_map(|x| x.iter().cloned())
            .collect()
    }

    fn config(dir: &TempDir) -> ExperimentConfig {
        ExperimentConfig::new(42, 3, Dataset::Yelp)
            .report_dir(dir.path())
            .quiet(true)
    }

    #[test]
    fn runs_every_fold() {
        let dir = TempDir::new().unwrap();
        let reports = Experiment::new(config(&dir).dump_predictions(true))
            .run_with(&Synthetic)
            .unwrap();

        assert_eq!(reports.len(), 3);

        let mut validated: Vec<UserId> = Vec::new();

        for (idx, report) in reports.iter().enumerate() {
            assert_eq!(report.fold, idx);
            assert_eq!(report.splits.len(), 2);

            let train = report.split(Split::Train).unwrap();
            let valid = report.split(Split::Valid).unwrap();
            assert_eq!(train.stats.users.len(), 20);
            assert_eq!(valid.stats.users.len(), 10);
            assert_eq!(valid.stats.num_labels(), 2);

            for split in &report.splits {
                let kpis = &split.kpis;
                for value in &[
                    kpis.micro_f1,
                    kpis.one_error,
                    kpis.ranking_loss,
                    kpis.avg_precision,
                    kpis.hamming_loss,
                ] {
                    assert!(*value >= 0.0 && *value <= 1.0);
                }
                assert!(kpis.coverage >= 0.0 && kpis.coverage <= 1.0);
            }

            validated.extend(valid.stats.users.iter().cloned());
        }

        validated.sort();
        assert_eq!(validated, (0..30).collect::<Vec<_>>());

        let csv = fs::read_to_string(dir.path().join("YELP_synthetic.csv")).unwrap();
        assert_eq!(csv.lines().count(), 7);

        assert!(dir.path().join("YELP_synthetic_fold2_valid.json").exists());
        assert!(dir.path().join("YELP_synthetic_fold0_train.json").exists());
    }

    #[test]
    fn logs_predictions_when_not_quiet() {
        let dir = TempDir::new().unwrap();
        let reports = Experiment::new(config(&dir).quiet(false))
            .run_with(&Synthetic)
            .unwrap();

        assert_eq!(reports.len(), 3);
    }

    #[test]
    fn prediction_lines() {
        let line = prediction_line(7, &[true, false], &[true, true], &[0.91234, 0.5]);
        assert_eq!(line, "7, [1 0], [1 1], [0.912 0.500]");

        assert_eq!(prediction_line(3, &[], &[], &[]), "3, [], [], []");
    }

    #[test]
    fn iteration_budget_reaches_the_solver() {
        let short_dir = TempDir::new().unwrap();
        let long_dir = TempDir::new().unwrap();

        let short = Experiment::new(config(&short_dir).max_train_num(1))
            .run_with(&Synthetic)
            .unwrap();
        let long = Experiment::new(config(&long_dir).max_train_num(500))
            .run_with(&Synthetic)
            .unwrap();

        let (short, long) = (valid_probabilities(&short), valid_probabilities(&long));
        assert_eq!(short.len(), long.len());
        assert!(short
            .iter()
            .zip(long.iter())
            .any(|(a, b)| (a - b).abs() > 1e-6));
    }

    #[test]
    fn group_label_is_learned() {
        let dir = TempDir::new().unwrap();
        let reports = Experiment::new(config(&dir)).run_with(&Synthetic).unwrap();

        for report in &reports {
            let train = report.split(Split::Train).unwrap();

            for (user, predicted) in train.stats.users.iter().zip(train.stats.predictions.iter()) {
                assert_eq!(predicted[0], *user < 15);
            }
        }
    }

    #[test]
    fn same_seed_same_folds() {
        let first_dir = TempDir::new().unwrap();
        let second_dir = TempDir::new().unwrap();

        let first = Experiment::new(config(&first_dir)).run_with(&Synthetic).unwrap();
        let second = Experiment::new(config(&second_dir)).run_with(&Synthetic).unwrap();

        for (a, b) in first.iter().zip(second.iter()) {
            for (x, y) in a.splits.iter().zip(b.splits.iter()) {
                assert_eq!(x.stats.users, y.stats.users);
                assert_eq!(x.stats.predictions, y.stats.predictions);
                assert_abs_diff_eq!(x.kpis.micro_f1, y.kpis.micro_f1, epsilon = 1e-12);
                assert_abs_diff_eq!(x.kpis.ranking_loss, y.kpis.ranking_loss, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn rank_too_large_fails() {
        let dir = TempDir::new().unwrap();
        let experiment = Experiment::new(config(&dir).svd_k(20));

        assert!(experiment.run_with(&Synthetic).is_err());
    }

    #[test]
    fn too_many_folds_fails() {
        let dir = TempDir::new().unwrap();
        let experiment = Experiment::new(ExperimentConfig::new(1, 31, Dataset::Yelp).report_dir(dir.path()));

        assert!(experiment.run_with(&Synthetic).is_err());
    }
}
