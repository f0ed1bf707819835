//! Cross-validated attribute prediction from SVD user embeddings.
//!
//! ```text
//! svd_sing 42 5 ml-100k
//! svd_sing 42 5 ego-net --sub 0 --rating-file data/ego-net/0.edges --labels-file data/ego-net/0.feat
//! ```
extern crate clap;
extern crate env_logger;
extern crate failure;
#[macro_use]
extern crate log;
extern crate svd_sing;

use std::path::PathBuf;

use clap::Parser;

use svd_sing::config::{DataFiles, ExperimentConfig};
use svd_sing::datasets::Dataset;
use svd_sing::experiment::Experiment;

#[derive(Parser, Debug)]
#[command(name = "svd_sing")]
#[command(about = "K-fold SVD embedding + logistic regression attribute prediction", long_about = None)]
struct Args {
    /// Seed for the fold shuffle and the SVD sketch
    seed: u64,

    /// Number of folds
    fold_num: usize,

    /// ml-100k, ml-1m, ego-net, youtube or yelp
    dataset: String,

    /// Subtitle appended to report names
    #[arg(long)]
    sub: Option<String>,

    /// Rating file, overriding the dataset default (needs --labels-file)
    #[arg(long)]
    rating_file: Option<PathBuf>,

    /// Label file, overriding the dataset default (needs --rating-file)
    #[arg(long)]
    labels_file: Option<PathBuf>,

    /// Directory holding one sub directory per dataset
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Where CSV and JSON reports go
    #[arg(long, default_value = "report")]
    report_dir: PathBuf,

    /// Number of singular values (embedding width)
    #[arg(long)]
    svd_k: Option<usize>,

    /// Iteration cap of each logistic regression
    #[arg(long)]
    max_train: Option<usize>,

    /// L2 regularization of the logistic regressions
    #[arg(long)]
    lambda: Option<f64>,

    /// Extra columns of the randomized SVD sketch
    #[arg(long, default_value_t = 10)]
    oversamples: usize,

    /// Subspace iterations of the randomized SVD
    #[arg(long, default_value_t = 4)]
    power_iterations: usize,

    /// Do not log every user's actual and predicted labels
    #[arg(long)]
    quiet: bool,

    /// Write per-fold predictions as JSON
    #[arg(long)]
    dump_predictions: bool,
}

impl Args {
    fn into_config(self) -> Result<ExperimentConfig, failure::Error> {
        let dataset: Dataset = self.dataset.parse()?;

        let mut config = ExperimentConfig::new(self.seed, self.fold_num, dataset)
            .data_dir(self.data_dir)
            .report_dir(self.report_dir)
            .oversamples(self.oversamples)
            .power_iterations(self.power_iterations)
            .quiet(self.quiet)
            .dump_predictions(self.dump_predictions);

        if let Some(files) = DataFiles::from_options(self.rating_file, self.labels_file)? {
            config = config.files(files);
        }
        if let Some(sub) = self.sub {
            config = config.sub(sub);
        }
        if let Some(svd_k) = self.svd_k {
            config = config.svd_k(svd_k);
        }
        if let Some(max_train) = self.max_train {
            config = config.max_train_num(max_train);
        }
        if let Some(lambda) = self.lambda {
            config = config.lambda(lambda);
        }

        Ok(config)
    }
}

fn main() -> Result<(), failure::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config()?;
    let reports = Experiment::new(config).run()?;

    let elapsed: f64 = reports
        .iter()
        .map(|x| x.elapsed.as_secs() as f64 + f64::from(x.elapsed.subsec_nanos()) * 1e-9)
        .sum();
    info!("{} folds done in {:.2}s", reports.len(), elapsed);

    Ok(())
}
