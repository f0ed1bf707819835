//! Persisting and logging the statistics of one fold.
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::datasets::Dataset;
use crate::evaluation::{Kpis, Split, SplitStats};

/// Identifies one fold of one experiment in the reports.
#[derive(Clone, Debug)]
pub struct StateValidator {
    dataset: Dataset,
    sub: String,
    fold: usize,
    num_folds: usize,
    max_train_num: usize,
    item_fields_num: usize,
    report_dir: PathBuf,
}

/// One CSV report row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatsRow {
    /// Dataset name, as given on the command line.
    pub dataset: String,
    /// Sub-dataset tag, empty when unused.
    pub sub: String,
    /// Zero-based fold index.
    pub fold: usize,
    /// Number of folds in the experiment.
    pub num_folds: usize,
    /// Which users the row describes.
    pub split: Split,
    /// Iteration cap of the logistic regressions.
    pub max_train_num: usize,
    /// Number of singular values used as features.
    pub item_fields_num: usize,
    /// Micro-averaged F1.
    pub micro_f1: f64,
    /// One-error.
    pub one_error: f64,
    /// Ranking loss.
    pub ranking_loss: f64,
    /// Coverage.
    pub coverage: f64,
    /// Average precision.
    pub avg_precision: f64,
    /// Hamming loss.
    pub hamming_loss: f64,
}

#[derive(Serialize)]
struct FoldRecord<'a> {
    dataset: &'a str,
    sub: &'a str,
    fold: usize,
    num_folds: usize,
    max_train_num: usize,
    item_fields_num: usize,
    stats: &'a SplitStats,
    kpis: &'a Kpis,
}

impl StateValidator {
    /// Describe fold `fold` of `num_folds`, writing reports under `report_dir`.
    pub fn new(
        dataset: Dataset,
        sub: &str,
        fold: usize,
        num_folds: usize,
        max_train_num: usize,
        item_fields_num: usize,
        report_dir: &Path,
    ) -> Self {
        StateValidator {
            dataset,
            sub: sub.to_owned(),
            fold,
            num_folds,
            max_train_num,
            item_fields_num,
            report_dir: report_dir.to_owned(),
        }
    }

    /// `<report_dir>/<stem>[_<sub>]<suffix>`
    pub fn report_path(&self, suffix: &str) -> PathBuf {
        let mut name = self.dataset.report_stem().to_owned();

        if !self.sub.is_empty() {
            name.push('_');
            name.push_str(&self.sub);
        }
        name.push_str(suffix);

        self.report_dir.join(name)
    }

    /// The CSV row of `split`.
    pub fn row(&self, split: Split, kpis: &Kpis) -> StatsRow {
        StatsRow {
            dataset: self.dataset.name().to_owned(),
            sub: self.sub.clone(),
            fold: self.fold,
            num_folds: self.num_folds,
            split,
            max_train_num: self.max_train_num,
            item_fields_num: self.item_fields_num,
            micro_f1: kpis.micro_f1,
            one_error: kpis.one_error,
            ranking_loss: kpis.ranking_loss,
            coverage: kpis.coverage,
            avg_precision: kpis.avg_precision,
            hamming_loss: kpis.hamming_loss,
        }
    }

    /// Append one row per split to the dataset's CSV report.
    pub fn write_csv_stats(&self, splits: &[(&SplitStats, &Kpis)]) -> Result<PathBuf, failure::Error> {
        fs::create_dir_all(&self.report_dir)?;

        let path = self.report_path(".csv");
        let is_new = !path.exists();

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(file);

        for (stats, kpis) in splits {
            writer.serialize(self.row(stats.split, kpis))?;
        }

        writer.flush()?;

        Ok(path)
    }

    /// Log the metrics of `split` at info level.
    pub fn log_stats(&self, split: Split, kpis: &Kpis) {
        info!(
            "{} [{}] fold {}/{} {}: microF1 {:.4}, oneError {:.4}, RL {:.4}, coverage {:.4}, avgPrec {:.4}, hammingLoss {:.4} (maxTrain {}, k {})",
            self.dataset,
            self.sub,
            self.fold + 1,
            self.num_folds,
            split,
            kpis.micro_f1,
            kpis.one_error,
            kpis.ranking_loss,
            kpis.coverage,
            kpis.avg_precision,
            kpis.hamming_loss,
            self.max_train_num,
            self.item_fields_num
        );
    }

    /// Dump users, predictions, probabilities and metrics of one split.
    pub fn write_json_stats(&self, stats: &SplitStats, kpis: &Kpis) -> Result<PathBuf, failure::Error> {
        fs::create_dir_all(&self.report_dir)?;

        let path = self.report_path(&format!("_fold{}_{}.json", self.fold, stats.split));
        let record = FoldRecord {
            dataset: self.dataset.name(),
            sub: &self.sub,
            fold: self.fold,
            num_folds: self.num_folds,
            max_train_num: self.max_train_num,
            item_fields_num: self.item_fields_num,
            stats,
            kpis,
        };

        serde_json::to_writer_pretty(File::create(&path)?, &record)?;

        Ok(path)
    }
}
