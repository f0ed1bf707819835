//! Experiment configuration.
use std::path::{Path, PathBuf};

use crate::datasets::Dataset;

const USAGE: &str = "svd_sing <seed> <fold_num> <dataset> [--sub <subtitle>] \
                     [--rating-file <file> --labels-file <file>] \
                     (rating and labels files only coexist under the same directory)";

/// Configuration error types.
#[derive(Debug, Fail)]
pub enum ConfigError {
    /// Invalid combination of arguments.
    #[fail(display = "[USAGE] {}", _0)]
    Usage(&'static str),
    /// Unknown dataset name.
    #[fail(display = "Unknown dataset '{}', expected one of ml-100k, ml-1m, ego-net, youtube, yelp.",
           _0)]
    UnknownDataset(String),
}

/// Per-dataset training settings.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrainingConfig {
    /// Number of singular values kept, i.e. the user embedding width.
    pub svd_k: usize,
    /// Iteration cap of each logistic regression solve.
    pub max_train_num: usize,
    /// L2 regularization strength of the logistic regression.
    pub lambda: f64,
}

impl TrainingConfig {
    /// Settings from their three values.
    pub fn new(svd_k: usize, max_train_num: usize, lambda: f64) -> Self {
        TrainingConfig {
            svd_k,
            max_train_num,
            lambda,
        }
    }
}

/// Explicit rating and label files, overriding a dataset's defaults.
#[derive(Clone, Debug, PartialEq)]
pub struct DataFiles {
    /// User-item ratings or interactions.
    pub rating_file: PathBuf,
    /// User attributes.
    pub labels_file: PathBuf,
}

impl DataFiles {
    /// Both files must sit in the same directory.
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(rating_file: P, labels_file: Q) -> Result<Self, ConfigError> {
        let rating_file = rating_file.as_ref().to_owned();
        let labels_file = labels_file.as_ref().to_owned();

        match (sub_dir(&rating_file), sub_dir(&labels_file)) {
            (Some(rating_dir), Some(labels_dir)) if rating_dir == labels_dir => Ok(DataFiles {
                rating_file,
                labels_file,
            }),
            _ => Err(ConfigError::Usage(USAGE)),
        }
    }

    /// Optional pair from the command line: both or neither.
    pub fn from_options(
        rating_file: Option<PathBuf>,
        labels_file: Option<PathBuf>,
    ) -> Result<Option<Self>, ConfigError> {
        match (rating_file, labels_file) {
            (None, None) => Ok(None),
            (Some(rating_file), Some(labels_file)) => {
                DataFiles::new(rating_file, labels_file).map(Some)
            }
            _ => Err(ConfigError::Usage(USAGE)),
        }
    }
}

fn sub_dir(path: &Path) -> Option<&std::ffi::OsStr> {
    path.parent().and_then(|x| x.file_name())
}

/// Everything one cross-validated run needs.
#[derive(Clone, Debug)]
pub struct ExperimentConfig {
    pub(crate) seed: u64,
    pub(crate) fold_num: usize,
    pub(crate) dataset: Dataset,
    pub(crate) sub: Option<String>,
    pub(crate) files: Option<DataFiles>,
    pub(crate) data_dir: PathBuf,
    pub(crate) report_dir: PathBuf,
    pub(crate) svd_k: Option<usize>,
    pub(crate) max_train_num: Option<usize>,
    pub(crate) lambda: Option<f64>,
    pub(crate) oversamples: usize,
    pub(crate) power_iterations: usize,
    pub(crate) quiet: bool,
    pub(crate) dump_predictions: bool,
}

impl ExperimentConfig {
    /// Defaults for `dataset`, folded `fold_num` ways with `seed`.
    pub fn new(seed: u64, fold_num: usize, dataset: Dataset) -> Self {
        ExperimentConfig {
            seed,
            fold_num,
            dataset,
            sub: None,
            files: None,
            data_dir: PathBuf::from("data"),
            report_dir: PathBuf::from("report"),
            svd_k: None,
            max_train_num: None,
            lambda: None,
            oversamples: 10,
            power_iterations: 4,
            quiet: false,
            dump_predictions: false,
        }
    }

    /// Sub-dataset tag, e.g. the ego-net ego or the youtube community mode.
    pub fn sub<S: Into<String>>(mut self, sub: S) -> Self {
        self.sub = Some(sub.into());
        self
    }

    /// Read these files instead of the dataset's defaults.
    pub fn files(mut self, files: DataFiles) -> Self {
        self.files = Some(files);
        self
    }

    /// Root of the default dataset files.
    pub fn data_dir<P: Into<PathBuf>>(mut self, data_dir: P) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Directory receiving the CSV and JSON reports.
    pub fn report_dir<P: Into<PathBuf>>(mut self, report_dir: P) -> Self {
        self.report_dir = report_dir.into();
        self
    }

    /// Override the dataset's embedding width.
    pub fn svd_k(mut self, svd_k: usize) -> Self {
        self.svd_k = Some(svd_k);
        self
    }

    /// Override the dataset's solver iteration cap.
    pub fn max_train_num(mut self, max_train_num: usize) -> Self {
        self.max_train_num = Some(max_train_num);
        self
    }

    /// Override the dataset's L2 penalty.
    pub fn lambda(mut self, lambda: f64) -> Self {
        self.lambda = Some(lambda);
        self
    }

    /// Extra SVD sketch columns.
    pub fn oversamples(mut self, oversamples: usize) -> Self {
        self.oversamples = oversamples;
        self
    }

    /// SVD subspace iteration rounds.
    pub fn power_iterations(mut self, power_iterations: usize) -> Self {
        self.power_iterations = power_iterations;
        self
    }

    /// Skip logging every user's actual and predicted labels.
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Also write the full per-fold predictions as JSON.
    pub fn dump_predictions(mut self, dump_predictions: bool) -> Self {
        self.dump_predictions = dump_predictions;
        self
    }

    /// The explicit rating file, when one was given.
    pub fn rating_file(&self) -> Option<&Path> {
        self.files.as_ref().map(|x| x.rating_file.as_path())
    }

    /// Apply the command line overrides to a dataset's defaults.
    pub fn training(&self, defaults: TrainingConfig) -> TrainingConfig {
        TrainingConfig {
            svd_k: self.svd_k.unwrap_or(defaults.svd_k),
            max_train_num: self.max_train_num.unwrap_or(defaults.max_train_num),
            lambda: self.lambda.unwrap_or(defaults.lambda),
        }
    }
}
