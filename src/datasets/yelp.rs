//! Yelp: tab separated `user item` reviews and a headerless CSV of
//! `user,label_1,..,label_n` binary attributes.
use std::collections::HashMap;
use std::str;

use super::{finish_ratings, labels_for, malformed, parse_flag, DataLoader, ItemIndex, SkippedLines};
use crate::config::{DataFiles, TrainingConfig};
use crate::data::{Rating, Ratings, UserLabels};
use crate::UserId;

/// Yelp reviews and user attributes.
#[derive(Clone, Debug)]
pub struct Yelp {
    files: DataFiles,
    sub: String,
}

impl Yelp {
    /// Loader over `files`, reporting under `sub`.
    pub fn new(files: DataFiles, sub: String) -> Self {
        Yelp { files, sub }
    }
}

impl DataLoader for Yelp {
    fn training_config(&self) -> TrainingConfig {
        TrainingConfig::new(50, 100, 0.001)
    }

    fn dataset_sub(&self) -> &str {
        &self.sub
    }

    fn load(&self) -> Result<Ratings, failure::Error> {
        let path = &self.files.rating_file;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;

        let mut items = ItemIndex::new();
        let mut ratings = Vec::new();
        let mut skipped = SkippedLines::new(path);

        for record in reader.byte_records() {
            let record = record?;
            let line = record.position().map(|x| x.line() as usize).unwrap_or(0);

            let field = |idx| record.get(idx).and_then(|x| str::from_utf8(x).ok());
            let user = field(0).and_then(|x| x.trim().parse::<UserId>().ok());
            let item = field(1).and_then(|x| x.trim().parse::<u64>().ok());

            match (user, item) {
                (Some(user), Some(item)) => {
                    ratings.push(Rating::new(user, items.get_or_insert(item), 1.0))
                }
                _ => skipped.skip(line, "expected user\\titem"),
            }
        }

        skipped.report();

        finish_ratings(path, ratings, items.len())
    }

    fn labels(&self, users: &[UserId]) -> Result<UserLabels, failure::Error> {
        let path = &self.files.labels_file;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;

        let mut num_labels = None;
        let mut vectors = HashMap::new();

        for record in reader.records() {
            let record = record.map_err(|e| {
                let line = e.position().map(|x| x.line() as usize).unwrap_or(0);
                malformed(path, line, e.to_string())
            })?;
            let line = record.position().map(|x| x.line() as usize).unwrap_or(0);

            let user = record
                .get(0)
                .ok_or_else(|| malformed(path, line, "empty line".to_owned()))?
                .trim()
                .parse::<UserId>()
                .map_err(|e| malformed(path, line, e.to_string()))?;
            let labels = record
                .iter()
                .skip(1)
                .map(|x| parse_flag(path, line, x))
                .collect::<Result<Vec<_>, _>>()?;

            let expected = *num_labels.get_or_insert(labels.len());
            if labels.len() != expected {
                return Err(malformed(
                    path,
                    line,
                    format!("{} labels, expected {}", labels.len(), expected),
                ).into());
            }

            vectors.insert(user, labels);
        }

        labels_for(path, users, num_labels.unwrap_or(0), vectors)
    }
}
