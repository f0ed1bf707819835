//! SNAP ego networks: `<ego>.edges` holds the friendships between the ego's
//! friends and `<ego>.feat` their binary profile features, which serve as
//! labels. A user's friends play the role of rated items.
use std::collections::HashMap;

use super::{labels_for, load_edge_list, malformed, parse_flag, read_lines, DataLoader};
use crate::config::{DataFiles, TrainingConfig};
use crate::data::{Ratings, UserLabels};
use crate::UserId;

/// One ego network, picked by the file names.
#[derive(Clone, Debug)]
pub struct EgoNet {
    files: DataFiles,
    sub: String,
}

impl EgoNet {
    /// Loader over `files`, reporting under `sub`.
    pub fn new(files: DataFiles, sub: String) -> Self {
        EgoNet { files, sub }
    }
}

impl DataLoader for EgoNet {
    fn training_config(&self) -> TrainingConfig {
        TrainingConfig::new(10, 100, 0.001)
    }

    fn dataset_sub(&self) -> &str {
        &self.sub
    }

    fn load(&self) -> Result<Ratings, failure::Error> {
        load_edge_list(&self.files.rating_file)
    }

    fn labels(&self, users: &[UserId]) -> Result<UserLabels, failure::Error> {
        let path = &self.files.labels_file;
        let mut num_labels = None;
        let mut vectors = HashMap::new();

        for line in read_lines(path)? {
            let (line_number, line) = line?;
            let line = line.map_err(|e| malformed(path, line_number, e.to_string()))?;
            let mut fields = line.split_whitespace();

            let user = match fields.next() {
                Some(user) => user
                    .parse::<UserId>()
                    .map_err(|e| malformed(path, line_number, e.to_string()))?,
                None => continue,
            };
            let features = fields
                .map(|x| parse_flag(path, line_number, x))
                .collect::<Result<Vec<_>, _>>()?;

            let expected = *num_labels.get_or_insert(features.len());
            if features.len() != expected {
                return Err(malformed(
                    path,
                    line_number,
                    format!("{} features, expected {}", features.len(), expected),
                ).into());
            }

            vectors.insert(user, features);
        }

        labels_for(path, users, num_labels.unwrap_or(0), vectors)
    }
}
