//! # svd-sing
//!
//! `svd_sing` predicts user attributes from rating data: the user-item
//! rating matrix is factorized with a truncated SVD, and one logistic
//! regression per attribute is trained on the resulting user embeddings.
//! Experiments are k-fold cross-validated over users and scored with
//! multi-label classification metrics.
//!
//! ## Example
//! Running a 5-fold experiment on MovieLens 100K, with the raw files
//! unpacked under `data/ml-100k/`:
//!
//! ```rust,no_run
//! # extern crate svd_sing;
//! use svd_sing::config::ExperimentConfig;
//! use svd_sing::datasets::Dataset;
//! use svd_sing::experiment::Experiment;
//!
//! let config = ExperimentConfig::new(42, 5, Dataset::MovieLens100K)
//!     .svd_k(50)
//!     .report_dir("report")
//!     .quiet(true);
//!
//! let reports = Experiment::new(config).run().unwrap();
//!
//! for report in &reports {
//!     for split in &report.splits {
//!         println!(
//!             "fold {} {}: micro-F1 {:.3}",
//!             report.fold, split.stats.split, split.kpis.micro_f1
//!         );
//!     }
//! }
//! ```
#![deny(missing_docs)]

#[macro_use]
extern crate serde_derive;

#[macro_use]
extern crate itertools;

#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate csv;
extern crate linfa;
extern crate linfa_logistic;
extern crate nalgebra;
extern crate nalgebra_sparse;
extern crate ndarray;
extern crate rand;
extern crate rand_chacha;
extern crate rand_distr;
extern crate rayon;
extern crate serde;
extern crate serde_json;

pub mod config;
pub mod data;
pub mod datasets;
pub mod evaluation;
pub mod experiment;
pub mod models;
pub mod validation;

/// Alias for raw user ids, as found in the rating files.
pub type UserId = usize;
/// Alias for dense item indices.
pub type ItemId = usize;
