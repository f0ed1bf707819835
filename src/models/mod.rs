//! Models module: the embedding and the per-label classifiers.
pub mod factorization;
pub mod logistic;
