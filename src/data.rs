//! Ratings, user labels and the k-fold split of users.
use std::collections::HashMap;

use nalgebra_sparse::coo::CooMatrix;
use nalgebra_sparse::csc::CscMatrix;
use rand::seq::SliceRandom;
use rand::Rng;

use super::{ItemId, UserId};

/// Data error types.
#[derive(Debug, Fail)]
pub enum DataError {
    /// A rating belongs to a user that has no row in the matrix.
    #[fail(display = "User {} has ratings but no matrix row.", _0)]
    UnknownUser(UserId),
    /// Label vector of the wrong length.
    #[fail(display = "User {} has {} labels, expected {}.", user, got, expected)]
    LabelCount {
        /// Offending user.
        user: UserId,
        /// Length of the offending vector.
        got: usize,
        /// Label count shared by all users.
        expected: usize,
    },
    /// Fold count outside `2..=num_users`.
    #[fail(display = "Cannot split {} users into {} folds.", users, folds)]
    FoldCount {
        /// Number of unique users.
        users: usize,
        /// Requested number of folds.
        folds: usize,
    },
    /// Sparse matrix construction failed.
    #[fail(display = "Invalid sparse matrix: {}", _0)]
    Matrix(String),
}

/// One user's rating of one item.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Rating {
    user_id: UserId,
    item_id: ItemId,
    value: f64,
}

impl Rating {
    /// Rating of `item_id` by `user_id`.
    pub fn new(user_id: UserId, item_id: ItemId, value: f64) -> Self {
        Rating {
            user_id,
            item_id,
            value,
        }
    }

    /// Raw user id.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Dense item index.
    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    /// Rating value.
    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Parsed (user, item, rating) triples of one dataset.
#[derive(Clone, Debug)]
pub struct Ratings {
    num_items: usize,
    ratings: Vec<Rating>,
}

impl Ratings {
    /// No ratings over at least `num_items` items.
    pub fn new(num_items: usize) -> Self {
        Ratings {
            num_items,
            ratings: Vec::new(),
        }
    }

    /// Append a rating, growing the item count if needed.
    pub fn push(&mut self, rating: Rating) {
        self.num_items = self.num_items.max(rating.item_id() + 1);
        self.ratings.push(rating);
    }

    /// Ratings in insertion order.
    pub fn data(&self) -> &[Rating] {
        &self.ratings
    }

    /// Number of ratings.
    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    /// Whether there are no ratings.
    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }

    /// Number of item columns.
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// Distinct user ids, sorted ascending.
    pub fn unique_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.ratings.iter().map(|x| x.user_id()).collect();
        users.sort();
        users.dedup();

        users
    }

    /// Build the compressed sparse column matrix whose row `r` holds the
    /// ratings of `user_order[r]`. Duplicate entries are summed.
    pub fn to_csc(&self, user_order: &[UserId]) -> Result<CscMatrix<f64>, DataError> {
        let user_rows: HashMap<UserId, usize> = user_order
            .iter()
            .enumerate()
            .map(|(row, &user)| (user, row))
            .collect();

        let mut rows = Vec::with_capacity(self.ratings.len());
        let mut cols = Vec::with_capacity(self.ratings.len());
        let mut values = Vec::with_capacity(self.ratings.len());

        for rating in &self.ratings {
            let row = *user_rows
                .get(&rating.user_id())
                .ok_or_else(|| DataError::UnknownUser(rating.user_id()))?;

            rows.push(row);
            cols.push(rating.item_id());
            values.push(rating.value());
        }

        let coo = CooMatrix::try_from_triplets(
            user_order.len(),
            self.num_items,
            rows,
            cols,
            values,
        ).map_err(|e| DataError::Matrix(e.to_string()))?;

        Ok(CscMatrix::from(&coo))
    }
}

impl From<Vec<Rating>> for Ratings {
    fn from(data: Vec<Rating>) -> Ratings {
        let num_items = data.iter().map(|x| x.item_id() + 1).max().unwrap_or(0);

        Ratings {
            num_items,
            ratings: data,
        }
    }
}

/// Binary label vectors, one per user, all of the same length.
#[derive(Clone, Debug)]
pub struct UserLabels {
    num_labels: usize,
    labels: HashMap<UserId, Vec<bool>>,
}

impl UserLabels {
    /// No users, `num_labels` labels each.
    pub fn new(num_labels: usize) -> Self {
        UserLabels {
            num_labels,
            labels: HashMap::new(),
        }
    }

    /// Set the labels of `user`; the vector must have `num_labels` entries.
    pub fn insert(&mut self, user: UserId, labels: Vec<bool>) -> Result<(), DataError> {
        if labels.len() != self.num_labels {
            return Err(DataError::LabelCount {
                user,
                got: labels.len(),
                expected: self.num_labels,
            });
        }

        self.labels.insert(user, labels);

        Ok(())
    }

    /// Labels of `user`, if known.
    pub fn get(&self, user: UserId) -> Option<&[bool]> {
        self.labels.get(&user).map(|x| x.as_slice())
    }

    /// Length of every label vector.
    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    /// Number of users with labels.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether no user has labels.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// One label across `users`; users without a vector count as negative.
    pub fn column(&self, users: &[UserId], label: usize) -> Vec<bool> {
        users
            .iter()
            .map(|user| self.get(*user).map(|x| x[label]).unwrap_or(false))
            .collect()
    }

    /// Keep only `users`, giving an all-zero vector to those without labels.
    pub fn restricted_to(mut self, users: &[UserId]) -> UserLabels {
        let mut labels = HashMap::with_capacity(users.len());
        let mut missing = 0;

        for &user in users {
            let vector = match self.labels.remove(&user) {
                Some(vector) => vector,
                None => {
                    missing += 1;
                    vec![false; self.num_labels]
                }
            };
            labels.insert(user, vector);
        }

        if missing > 0 {
            warn!("{} users have no labels, treating them as all-negative", missing);
        }

        UserLabels {
            num_labels: self.num_labels,
            labels,
        }
    }
}

/// Disjoint validation partitions of the unique user set.
#[derive(Clone, Debug)]
pub struct KFolds {
    folds: Vec<Vec<usize>>,
}

/// Training and validation users of one fold.
#[derive(Clone, Debug, PartialEq)]
pub struct FoldSplit {
    /// Users the classifiers are trained on.
    pub train: Vec<UserId>,
    /// Held-out users.
    pub valid: Vec<UserId>,
}

impl FoldSplit {
    /// Training users followed by validation users; this is the row order
    /// of the fold's rating matrix.
    pub fn ordered_users(&self) -> Vec<UserId> {
        self.train.iter().chain(self.valid.iter()).cloned().collect()
    }
}

impl KFolds {
    /// Shuffle `0..num_users` and cut it into `num_folds` chunks whose sizes
    /// differ by at most one.
    pub fn new<R: Rng>(num_users: usize, num_folds: usize, rng: &mut R) -> Result<Self, DataError> {
        if num_folds < 2 || num_folds > num_users {
            return Err(DataError::FoldCount {
                users: num_users,
                folds: num_folds,
            });
        }

        let mut indices: Vec<usize> = (0..num_users).collect();
        indices.shuffle(rng);

        let base = num_users / num_folds;
        let extra = num_users % num_folds;

        let mut folds = Vec::with_capacity(num_folds);
        let mut start = 0;

        for fold in 0..num_folds {
            let size = if fold < extra { base + 1 } else { base };
            folds.push(indices[start..start + size].to_owned());
            start += size;
        }

        Ok(KFolds { folds })
    }

    /// Number of folds.
    pub fn len(&self) -> usize {
        self.folds.len()
    }

    /// Whether there are no folds.
    pub fn is_empty(&self) -> bool {
        self.folds.is_empty()
    }

    /// Positions in the unique user list of fold `idx`.
    pub fn fold(&self, idx: usize) -> &[usize] {
        &self.folds[idx]
    }

    /// Users of fold `idx` form the validation split; everyone else trains.
    pub fn split(&self, idx: usize, unique_users: &[UserId]) -> FoldSplit {
        let mut is_valid = vec![false; unique_users.len()];
        for &user_idx in &self.folds[idx] {
            is_valid[user_idx] = true;
        }

        let valid = self.folds[idx]
            .iter()
            .map(|&user_idx| unique_users[user_idx])
            .collect();
        let train = unique_users
            .iter()
            .zip(is_valid.iter())
            .filter(|&(_, &valid)| !valid)
            .map(|(&user, _)| user)
            .collect();

        FoldSplit { train, valid }
    }
}
