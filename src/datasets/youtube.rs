//! SNAP Youtube: an undirected friendship graph plus ground-truth
//! communities, one community per line. Label `j` marks membership in the
//! community on line `j`.
use std::collections::{HashMap, HashSet};

use super::{labels_for, load_edge_list, malformed, read_lines, DataLoader};
use crate::config::{DataFiles, TrainingConfig};
use crate::data::{Ratings, UserLabels};
use crate::UserId;

/// The Youtube graph and one community file.
#[derive(Clone, Debug)]
pub struct Youtube {
    files: DataFiles,
    sub: String,
}

impl Youtube {
    /// Loader over `files`, reporting under `sub`.
    pub fn new(files: DataFiles, sub: String) -> Self {
        Youtube { files, sub }
    }
}

impl DataLoader for Youtube {
    fn training_config(&self) -> TrainingConfig {
        TrainingConfig::new(100, 100, 0.001)
    }

    fn dataset_sub(&self) -> &str {
        &self.sub
    }

    fn load(&self) -> Result<Ratings, failure::Error> {
        load_edge_list(&self.files.rating_file)
    }

    fn labels(&self, users: &[UserId]) -> Result<UserLabels, failure::Error> {
        let path = &self.files.labels_file;
        let wanted: HashSet<UserId> = users.iter().cloned().collect();

        let mut communities = Vec::new();

        for line in read_lines(path)? {
            let (line_number, line) = line?;
            let line = line.map_err(|e| malformed(path, line_number, e.to_string()))?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let members = line
                .split_whitespace()
                .map(|x| {
                    x.parse::<UserId>()
                        .map_err(|e| malformed(path, line_number, format!("'{}': {}", x, e)))
                })
                .collect::<Result<Vec<_>, _>>()?;

            communities.push(members);
        }

        let num_labels = communities.len();
        let mut vectors: HashMap<UserId, Vec<bool>> = HashMap::new();

        for (label, members) in communities.iter().enumerate() {
            for member in members.iter().filter(|x| wanted.contains(*x)) {
                vectors
                    .entry(*member)
                    .or_insert_with(|| vec![false; num_labels])[label] = true;
            }
        }

        info!(
            "{} communities, {} of {} users belong to at least one",
            num_labels,
            vectors.len(),
            users.len()
        );

        labels_for(path, users, num_labels, vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::datasets::tests::{write_bytes, write_file};

    #[test]
    fn load_youtube() {
        let dir = TempDir::new().unwrap();
        let rating_file = write_file(
            &dir,
            "com-youtube.ungraph.txt",
            "# Undirected graph\n# FromNodeId\tToNodeId\n1\t2\n1\t3\n2\t4\n",
        );
        let labels_file = write_file(
            &dir,
            "com-youtube.top5000.cmty.txt",
            "1\t2\t9\n2\t4\n",
        );
        let loader =
            Youtube::new(DataFiles::new(rating_file, labels_file).unwrap(), String::new());

        let ratings = loader.load().unwrap();
        assert_eq!(ratings.len(), 6);

        let users = ratings.unique_users();
        let labels = loader.labels(&users).unwrap();

        assert_eq!(labels.num_labels(), 2);
        assert_eq!(labels.len(), 4);
        assert_eq!(labels.get(1), Some(&[true, false][..]));
        assert_eq!(labels.get(2), Some(&[true, true][..]));
        assert_eq!(labels.get(3), Some(&[false, false][..]));
        assert_eq!(labels.get(4), Some(&[false, true][..]));
        assert!(labels.get(9).is_none());
    }

    #[test]
    fn no_communities_is_an_error() {
        let dir = TempDir::new().unwrap();
        let rating_file = write_file(&dir, "graph.txt", "1\t2\n");
        let labels_file = write_file(&dir, "cmty.txt", "# nothing\n");
        let loader =
            Youtube::new(DataFiles::new(rating_file, labels_file).unwrap(), String::new());

        assert!(loader.labels(&[1, 2]).is_err());
    }

    #[test]
    fn undecodable_edges_are_skipped() {
        let dir = TempDir::new().unwrap();
        let rating_file = write_bytes(&dir, "graph.txt", b"1\t2\n1\t\xff\n2\t4\n");
        let labels_file = write_file(&dir, "cmty.txt", "1\t2\n");
        let loader =
            Youtube::new(DataFiles::new(rating_file, labels_file).unwrap(), String::new());

        assert_eq!(loader.load().unwrap().unique_users(), vec![1, 2, 4]);
    }
}
