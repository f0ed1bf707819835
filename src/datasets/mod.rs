//! Loaders for the supported rating datasets.
//!
//! Every dataset lives in its own sub directory of the data directory and
//! ships two files: one with (user, item, rating) records and one with the
//! users' attributes, which become binary labels. The raw schemas differ
//! per dataset; each loader turns them into [`Ratings`](../data/struct.Ratings.html)
//! and [`UserLabels`](../data/struct.UserLabels.html).
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;
use std::string::FromUtf8Error;

use crate::config::{ConfigError, DataFiles, TrainingConfig};
use crate::data::{Rating, Ratings, UserLabels};
use crate::UserId;

mod ego_net;
mod movielens;
mod yelp;
mod youtube;

pub use self::ego_net::EgoNet;
pub use self::movielens::{MovieLens100K, MovieLens1M};
pub use self::yelp::Yelp;
pub use self::youtube::Youtube;

/// Dataset error types.
#[derive(Debug, Fail)]
pub enum DatasetError {
    /// A label line could not be parsed.
    #[fail(display = "Malformed label line {} in {}: {}", line, path, reason)]
    MalformedLabels {
        /// File being read.
        path: String,
        /// One-based line number.
        line: usize,
        /// What went wrong.
        reason: String,
    },
    /// The rating file produced no ratings.
    #[fail(display = "No ratings found in {}.", _0)]
    NoRatings(String),
    /// The label file defines no labels.
    #[fail(display = "No labels found in {}.", _0)]
    NoLabels(String),
}

/// The supported datasets, named after their sub directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dataset {
    /// MovieLens 100K.
    MovieLens100K,
    /// MovieLens 1M.
    MovieLens1M,
    /// SNAP ego networks (Facebook).
    EgoNet,
    /// SNAP Youtube social network with ground-truth communities.
    Youtube,
    /// Yelp user-business reviews.
    Yelp,
}

impl Dataset {
    /// Sub directory of the data directory, also the command line name.
    pub fn name(&self) -> &'static str {
        match *self {
            Dataset::MovieLens100K => "ml-100k",
            Dataset::MovieLens1M => "ml-1m",
            Dataset::EgoNet => "ego-net",
            Dataset::Youtube => "youtube",
            Dataset::Yelp => "yelp",
        }
    }

    /// File name stem for the reports written by the state validator.
    pub fn report_stem(&self) -> &'static str {
        match *self {
            Dataset::MovieLens100K => "ML100K",
            Dataset::MovieLens1M => "ML1M",
            Dataset::EgoNet => "EN",
            Dataset::Youtube => "YT",
            Dataset::Yelp => "YELP",
        }
    }

    /// Default rating and label files under `data_dir`.
    pub fn default_files(&self, data_dir: &Path) -> DataFiles {
        let (rating_file, labels_file) = match *self {
            Dataset::MovieLens100K => ("u.data", "u.user"),
            Dataset::MovieLens1M => ("ratings.dat", "users.dat"),
            Dataset::EgoNet => ("0.edges", "0.feat"),
            Dataset::Youtube => ("com-youtube.ungraph.txt", "com-youtube.top5000.cmty.txt"),
            Dataset::Yelp => ("usr2items.tsv", "usr2labels.csv"),
        };
        let dir = data_dir.join(self.name());

        DataFiles {
            rating_file: dir.join(rating_file),
            labels_file: dir.join(labels_file),
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Dataset {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "ml-100k" => Ok(Dataset::MovieLens100K),
            "ml-1m" => Ok(Dataset::MovieLens1M),
            "ego-net" => Ok(Dataset::EgoNet),
            "youtube" => Ok(Dataset::Youtube),
            "yelp" => Ok(Dataset::Yelp),
            other => Err(ConfigError::UnknownDataset(other.to_owned())),
        }
    }
}

/// Trait describing a dataset's raw files and training defaults.
pub trait DataLoader {
    /// Default SVD width, iteration budget and regularization.
    fn training_config(&self) -> TrainingConfig;
    /// Subtitle used to tell apart reports of the same dataset.
    fn dataset_sub(&self) -> &str;
    /// Parse the rating file.
    fn load(&self) -> Result<Ratings, failure::Error>;
    /// Label vectors of exactly `users`.
    fn labels(&self, users: &[UserId]) -> Result<UserLabels, failure::Error>;
}

/// Build the loader for `dataset`, reading `files` or the defaults under
/// `data_dir`.
pub fn loader(
    dataset: Dataset,
    data_dir: &Path,
    files: Option<DataFiles>,
    sub: Option<String>,
) -> Box<dyn DataLoader> {
    let files = files.unwrap_or_else(|| dataset.default_files(data_dir));
    let sub = sub.unwrap_or_default();

    match dataset {
        Dataset::MovieLens100K => Box::new(MovieLens100K::new(files, sub)),
        Dataset::MovieLens1M => Box::new(MovieLens1M::new(files, sub)),
        Dataset::EgoNet => Box::new(EgoNet::new(files, sub)),
        Dataset::Youtube => Box::new(Youtube::new(files, sub)),
        Dataset::Yelp => Box::new(Yelp::new(files, sub)),
    }
}

/// Maps raw item ids to dense indices in first-seen order.
#[derive(Debug, Default)]
pub(crate) struct ItemIndex {
    indices: HashMap<u64, usize>,
}

impl ItemIndex {
    pub(crate) fn new() -> Self {
        ItemIndex::default()
    }

    pub(crate) fn get_or_insert(&mut self, item: u64) -> usize {
        let next = self.indices.len();
        *self.indices.entry(item).or_insert(next)
    }

    pub(crate) fn len(&self) -> usize {
        self.indices.len()
    }
}

/// A one-based line number and the line, unless it is not valid UTF-8.
pub(crate) type Line = (usize, Result<String, FromUtf8Error>);

/// Numbered lines of a text file, stopping at the first I/O error. Lines
/// that fail to decode are handed back so callers can skip or reject them.
pub(crate) fn read_lines(
    path: &Path,
) -> Result<impl Iterator<Item = Result<Line, failure::Error>>, failure::Error> {
    let file = File::open(path)
        .map_err(|e| format_err!("Cannot open {}: {}", path.display(), e))?;

    Ok(BufReader::new(file)
        .split(b'\n')
        .enumerate()
        .map(|(idx, line)| -> Result<Line, failure::Error> {
            let mut bytes = line?;
            if bytes.last() == Some(&b'\r') {
                bytes.pop();
            }

            Ok((idx + 1, String::from_utf8(bytes)))
        }))
}

/// Count of rating lines that failed to parse; logged once per file.
pub(crate) struct SkippedLines<'a> {
    path: &'a Path,
    count: usize,
}

impl<'a> SkippedLines<'a> {
    pub(crate) fn new(path: &'a Path) -> Self {
        SkippedLines { path, count: 0 }
    }

    pub(crate) fn skip(&mut self, line: usize, reason: &str) {
        debug!("Skipping line {} of {}: {}", line, self.path.display(), reason);
        self.count += 1;
    }

    pub(crate) fn report(&self) {
        if self.count > 0 {
            warn!(
                "Skipped {} malformed lines in {}",
                self.count,
                self.path.display()
            );
        }
    }
}

/// Undirected edge list: every `u v` line rates `v` for `u` and `u` for `v`
/// with value 1. Lines starting with `#` are comments.
pub(crate) fn load_edge_list(path: &Path) -> Result<Ratings, failure::Error> {
    let mut items = ItemIndex::new();
    let mut ratings = Vec::new();
    let mut skipped = SkippedLines::new(path);

    for line in read_lines(path)? {
        let (line_number, line) = line?;
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                skipped.skip(line_number, &e.to_string());
                continue;
            }
        };
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split_whitespace();
        let edge = match (fields.next(), fields.next()) {
            (Some(u), Some(v)) => u.parse::<u64>().and_then(|u| v.parse::<u64>().map(|v| (u, v))),
            _ => {
                skipped.skip(line_number, "expected two node ids");
                continue;
            }
        };

        match edge {
            Ok((u, v)) => {
                ratings.push(Rating::new(u as UserId, items.get_or_insert(v), 1.0));
                ratings.push(Rating::new(v as UserId, items.get_or_insert(u), 1.0));
            }
            Err(e) => skipped.skip(line_number, &e.to_string()),
        }
    }

    skipped.report();

    finish_ratings(path, ratings, items.len())
}

pub(crate) fn finish_ratings(
    path: &Path,
    ratings: Vec<Rating>,
    num_items: usize,
) -> Result<Ratings, failure::Error> {
    if ratings.is_empty() {
        return Err(DatasetError::NoRatings(path.display().to_string()).into());
    }

    let mut data = Ratings::new(num_items);
    for rating in ratings {
        data.push(rating);
    }

    info!(
        "Loaded {} ratings over {} items from {}",
        data.len(),
        data.num_items(),
        path.display()
    );

    Ok(data)
}

/// Parse a `0`/`1` (or any number, non-zero meaning positive) label field.
pub(crate) fn parse_flag(
    path: &Path,
    line: usize,
    field: &str,
) -> Result<bool, DatasetError> {
    field
        .trim()
        .parse::<f64>()
        .map(|x| x != 0.0)
        .map_err(|e| malformed(path, line, format!("'{}': {}", field, e)))
}

pub(crate) fn malformed(path: &Path, line: usize, reason: String) -> DatasetError {
    DatasetError::MalformedLabels {
        path: path.display().to_string(),
        line,
        reason,
    }
}

/// Collect label vectors keyed by user, then keep only `users`. `path` is
/// the label file, for error messages.
pub(crate) fn labels_for(
    path: &Path,
    users: &[UserId],
    num_labels: usize,
    vectors: HashMap<UserId, Vec<bool>>,
) -> Result<UserLabels, failure::Error> {
    if num_labels == 0 {
        return Err(DatasetError::NoLabels(path.display().to_string()).into());
    }

    let mut labels = UserLabels::new(num_labels);

    for (user, vector) in vectors {
        labels.insert(user, vector)?;
    }

    Ok(labels.restricted_to(users))
}
