//! MovieLens 100K and 1M.
//!
//! Both datasets describe users by age, gender and occupation. These are
//! one-hot encoded into 27 labels: 4 age buckets, 2 genders and 21
//! occupations.
use std::collections::HashMap;
use std::path::Path;

use super::{finish_ratings, labels_for, malformed, read_lines, DataLoader, ItemIndex, SkippedLines};
use crate::config::{DataFiles, TrainingConfig};
use crate::data::{Rating, Ratings, UserLabels};
use crate::UserId;

const AGE_BUCKETS: usize = 4;
const GENDERS: usize = 2;
const OCCUPATIONS: usize = 21;

/// Total number of MovieLens labels.
pub const NUM_LABELS: usize = AGE_BUCKETS + GENDERS + OCCUPATIONS;

/// Occupations listed in the 100K `u.occupation` file, in file order.
const OCCUPATIONS_100K: [&str; OCCUPATIONS] = [
    "administrator",
    "artist",
    "doctor",
    "educator",
    "engineer",
    "entertainment",
    "executive",
    "healthcare",
    "homemaker",
    "lawyer",
    "librarian",
    "marketing",
    "none",
    "other",
    "programmer",
    "retired",
    "salesman",
    "scientist",
    "student",
    "technician",
    "writer",
];

/// Buckets `<25`, `25-34`, `35-44` and `45+`. The 1M age codes
/// (1, 18, 25, 35, 45, 50, 56) fall into the same buckets.
fn age_bucket(age: u32) -> usize {
    match age {
        0..=24 => 0,
        25..=34 => 1,
        35..=44 => 2,
        _ => 3,
    }
}

fn gender_index(gender: &str) -> Option<usize> {
    match gender.trim() {
        "M" => Some(0),
        "F" => Some(1),
        _ => None,
    }
}

fn one_hot(age: u32, gender: usize, occupation: usize) -> Vec<bool> {
    let mut labels = vec![false; NUM_LABELS];

    labels[age_bucket(age)] = true;
    labels[AGE_BUCKETS + gender] = true;
    labels[AGE_BUCKETS + GENDERS + occupation] = true;

    labels
}

#[derive(Debug, Deserialize)]
struct RatingRecord {
    user_id: UserId,
    item_id: u64,
    rating: f64,
    _timestamp: u64,
}

#[derive(Debug, Deserialize)]
struct UserRecord {
    user_id: UserId,
    age: u32,
    gender: String,
    occupation: String,
    _zip_code: String,
}

/// MovieLens 100K: tab separated `u.data` and pipe separated `u.user`.
#[derive(Clone, Debug)]
pub struct MovieLens100K {
    files: DataFiles,
    sub: String,
}

impl MovieLens100K {
    /// Loader over `files`, reporting under `sub`.
    pub fn new(files: DataFiles, sub: String) -> Self {
        MovieLens100K { files, sub }
    }

    fn parse_user(path: &Path, line: usize, record: UserRecord) -> Result<(UserId, Vec<bool>), failure::Error> {
        let gender = gender_index(&record.gender)
            .ok_or_else(|| malformed(path, line, format!("unknown gender '{}'", record.gender)))?;
        let occupation = OCCUPATIONS_100K
            .iter()
            .position(|x| *x == record.occupation.trim())
            .ok_or_else(|| {
                malformed(path, line, format!("unknown occupation '{}'", record.occupation))
            })?;

        Ok((record.user_id, one_hot(record.age, gender, occupation)))
    }
}

impl DataLoader for MovieLens100K {
    fn training_config(&self) -> TrainingConfig {
        TrainingConfig::new(100, 100, 0.001)
    }

    fn dataset_sub(&self) -> &str {
        &self.sub
    }

    fn load(&self) -> Result<Ratings, failure::Error> {
        let path = &self.files.rating_file;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_path(path)?;

        let mut items = ItemIndex::new();
        let mut ratings = Vec::new();
        let mut skipped = SkippedLines::new(path);

        for record in reader.deserialize::<RatingRecord>() {
            match record {
                Ok(record) => ratings.push(Rating::new(
                    record.user_id,
                    items.get_or_insert(record.item_id),
                    record.rating,
                )),
                Err(e) => {
                    let line = e.position().map(|x| x.line() as usize).unwrap_or(0);
                    skipped.skip(line, &e.to_string());
                }
            }
        }

        skipped.report();

        finish_ratings(path, ratings, items.len())
    }

    fn labels(&self, users: &[UserId]) -> Result<UserLabels, failure::Error> {
        let path = &self.files.labels_file;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'|')
            .has_headers(false)
            .from_path(path)?;

        let mut vectors = HashMap::new();

        for (idx, record) in reader.deserialize::<UserRecord>().enumerate() {
            let record = record.map_err(|e| malformed(path, idx + 1, e.to_string()))?;
            let (user, labels) = Self::parse_user(path, idx + 1, record)?;
            vectors.insert(user, labels);
        }

        labels_for(path, users, NUM_LABELS, vectors)
    }
}

/// MovieLens 1M: `::` separated `ratings.dat` and `users.dat`.
#[derive(Clone, Debug)]
pub struct MovieLens1M {
    files: DataFiles,
    sub: String,
}

impl MovieLens1M {
    /// Loader over `files`, reporting under `sub`.
    pub fn new(files: DataFiles, sub: String) -> Self {
        MovieLens1M { files, sub }
    }

    fn parse_rating(line: &str) -> Option<(UserId, u64, f64)> {
        let mut fields = line.split("::");

        let user = fields.next()?.trim().parse().ok()?;
        let item = fields.next()?.trim().parse().ok()?;
        let rating = fields.next()?.trim().parse().ok()?;

        Some((user, item, rating))
    }

    fn parse_user(path: &Path, line_number: usize, line: &str) -> Result<(UserId, Vec<bool>), failure::Error> {
        let fields: Vec<&str> = line.split("::").collect();

        if fields.len() < 4 {
            return Err(malformed(path, line_number, format!("expected at least 4 fields, got {}", fields.len())).into());
        }

        let user = fields[0]
            .trim()
            .parse::<UserId>()
            .map_err(|e| malformed(path, line_number, e.to_string()))?;
        let gender = gender_index(fields[1])
            .ok_or_else(|| malformed(path, line_number, format!("unknown gender '{}'", fields[1])))?;
        let age = fields[2]
            .trim()
            .parse::<u32>()
            .map_err(|e| malformed(path, line_number, e.to_string()))?;
        let occupation = fields[3]
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|x| *x < OCCUPATIONS)
            .ok_or_else(|| {
                malformed(path, line_number, format!("unknown occupation '{}'", fields[3]))
            })?;

        Ok((user, one_hot(age, gender, occupation)))
    }
}

impl DataLoader for MovieLens1M {
    fn training_config(&self) -> TrainingConfig {
        TrainingConfig::new(100, 100, 0.001)
    }

    fn dataset_sub(&self) -> &str {
        &self.sub
    }

    fn load(&self) -> Result<Ratings, failure::Error> {
        let path = &self.files.rating_file;
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

            if line.trim().is_empty() {
                continue;
            }

            match Self::parse_rating(&line) {
                Some((user, item, rating)) => {
                    ratings.push(Rating::new(user, items.get_or_insert(item), rating))
                }
                None => skipped.skip(line_number, "expected user::item::rating::timestamp"),
            }
        }

        skipped.report();

        finish_ratings(path, ratings, items.len())
    }

    fn labels(&self, users: &[UserId]) -> Result<UserLabels, failure::Error> {
        let path = &self.files.labels_file;
        let mut vectors = HashMap::new();

        for line in read_lines(path)? {
            let (line_number, line) = line?;
            let line = line.map_err(|e| malformed(path, line_number, e.to_string()))?;

            if line.trim().is_empty() {
                continue;
            }

            let (user, labels) = Self::parse_user(path, line_number, &line)?;
            vectors.insert(user, labels);
        }

        labels_for(path, users, NUM_LABELS, vectors)
    }
}
