//! Truncated SVD of the sparse rating matrix.
//!
//! The decomposition follows the randomized range finder of Halko, Martinsson
//! and Tropp ("Finding structure with randomness", 2011): the matrix is
//! sketched with a Gaussian test matrix, the sketch is refined with a few
//! rounds of subspace iteration, and the small projected matrix is handed to
//! nalgebra's dense SVD. When the sketch is as wide as the matrix's smaller
//! dimension the result is exact.
use std::cmp::Ordering;

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::csc::CscMatrix;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

/// Factorization error types.
#[derive(Debug, Fail)]
pub enum FactorizationError {
    /// `k` must satisfy `0 < k < min(rows, cols)`.
    #[fail(
        display = "Cannot extract {} singular values from a {} x {} matrix.",
        k, rows, cols
    )]
    RankTooLarge {
        /// Requested number of singular values.
        k: usize,
        /// Matrix rows (users).
        rows: usize,
        /// Matrix columns (items).
        cols: usize,
    },
    /// The dense SVD did not return singular vectors.
    #[fail(display = "SVD did not produce singular vectors.")]
    NoSingularVectors,
}

/// Hyperparameters of the truncated SVD.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TruncatedSvd {
    k: usize,
    oversamples: usize,
    power_iterations: usize,
}

/// The `k` leading singular triplets, in descending singular value order.
#[derive(Clone, Debug)]
pub struct Decomposition {
    /// Left singular vectors, one row per matrix row.
    pub u: DMatrix<f64>,
    /// Singular values.
    pub singular_values: DVector<f64>,
    /// Right singular vectors, transposed.
    pub v_t: DMatrix<f64>,
}

impl Decomposition {
    /// Split `U` into its first `at` rows and the rest.
    pub fn split_rows(&self, at: usize) -> (DMatrix<f64>, DMatrix<f64>) {
        let rows = self.u.nrows();

        (
            self.u.rows(0, at).into_owned(),
            self.u.rows(at, rows - at).into_owned(),
        )
    }
}

impl TruncatedSvd {
    /// Extract `k` singular triplets with the default sketch settings.
    pub fn new(k: usize) -> Self {
        TruncatedSvd {
            k,
            oversamples: 10,
            power_iterations: 4,
        }
    }

    /// Extra sketch columns beyond `k`.
    pub fn oversamples(mut self, oversamples: usize) -> Self {
        self.oversamples = oversamples;
        self
    }

    /// Rounds of subspace iteration refining the sketch.
    pub fn power_iterations(mut self, power_iterations: usize) -> Self {
        self.power_iterations = power_iterations;
        self
    }

    /// Number of singular triplets extracted.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Decompose `matrix`, drawing the test matrix from `rng`.
    pub fn fit<R: Rng>(
        &self,
        matrix: &CscMatrix<f64>,
        rng: &mut R,
    ) -> Result<Decomposition, FactorizationError> {
        let (rows, cols) = (matrix.nrows(), matrix.ncols());
        let min_dim = rows.min(cols);

        if self.k == 0 || self.k >= min_dim {
            return Err(FactorizationError::RankTooLarge {
                k: self.k,
                rows,
                cols,
            });
        }

        let width = (self.k + self.oversamples).min(min_dim);
        let transposed = matrix.transpose();

        let omega: DMatrix<f64> =
            DMatrix::from_fn(cols, width, |_, _| StandardNormal.sample(&mut *rng));
        let mut q = ortho_basis(matrix * &omega);

        for _ in 0..self.power_iterations {
            let z = ortho_basis(&transposed * &q);
            q = ortho_basis(matrix * &z);
        }

        // B = Q^T A, computed as (A^T Q)^T to stay sparse-times-dense.
        let b = (&transposed * &q).transpose();
        let svd = b.svd(true, true);

        let small_u = svd.u.ok_or(FactorizationError::NoSingularVectors)?;
        let full_v_t = svd.v_t.ok_or(FactorizationError::NoSingularVectors)?;
        let full_s = svd.singular_values;

        let mut order: Vec<usize> = (0..full_s.len()).collect();
        order.sort_by(|&a, &b| full_s[b].partial_cmp(&full_s[a]).unwrap_or(Ordering::Equal));
        order.truncate(self.k);

        let full_u = q * small_u;

        Ok(Decomposition {
            u: DMatrix::from_fn(rows, self.k, |row, col| full_u[(row, order[col])]),
            singular_values: DVector::from_iterator(self.k, order.iter().map(|&idx| full_s[idx])),
            v_t: DMatrix::from_fn(self.k, cols, |row, col| full_v_t[(order[row], col)]),
        })
    }
}

fn ortho_basis(matrix: DMatrix<f64>) -> DMatrix<f64> {
    matrix.qr().q()
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_abs_diff_eq;
    use nalgebra_sparse::coo::CooMatrix;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn diagonal() -> CscMatrix<f64> {
        let mut coo = CooMatrix::new(6, 5);
        coo.push(0, 0, 5.0);
        coo.push(1, 1, 3.0);
        coo.push(2, 2, 2.0);
        coo.push(3, 3, 1.0);

        CscMatrix::from(&coo)
    }

    fn low_rank(rows: usize, cols: usize) -> CscMatrix<f64> {
        let mut coo = CooMatrix::new(rows, cols);

        for i in 0..rows {
            for j in 0..cols {
                let first = ((i % 7) as f64 + 1.0) * ((j % 5) as f64 + 1.0);
                let second = (((i * 3) % 11) as f64 - 5.0) * (((j * 7) % 13) as f64 - 6.0);
                let third = (i % 2) as f64 * if j % 3 == 0 { 1.0 } else { 0.0 };
                coo.push(i, j, first + second + third);
            }
        }

        CscMatrix::from(&coo)
    }

    #[test]
    fn rejects_large_rank() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let matrix = diagonal();

        assert!(TruncatedSvd::new(5).fit(&matrix, &mut rng).is_err());
        assert!(TruncatedSvd::new(0).fit(&matrix, &mut rng).is_err());
        assert!(TruncatedSvd::new(4).fit(&matrix, &mut rng).is_ok());
    }

    #[test]
    fn recovers_leading_singular_values() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let decomposition = TruncatedSvd::new(2).fit(&diagonal(), &mut rng).unwrap();

        assert_eq!(decomposition.u.shape(), (6, 2));
        assert_eq!(decomposition.v_t.shape(), (2, 5));
        assert_abs_diff_eq!(decomposition.singular_values[0], 5.0, epsilon = 1e-8);
        assert_abs_diff_eq!(decomposition.singular_values[1], 3.0, epsilon = 1e-8);

        // Columns of U are orthonormal.
        let gram = decomposition.u.transpose() * &decomposition.u;
        for i in 0..2 {
            for j in 0..2 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(gram[(i, j)], expected, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn reconstructs_low_rank_matrix() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let matrix = diagonal();
        let decomposition = TruncatedSvd::new(4).fit(&matrix, &mut rng).unwrap();

        let reconstructed = &decomposition.u
            * DMatrix::from_diagonal(&decomposition.singular_values)
            * &decomposition.v_t;
        let dense = DMatrix::from(&matrix);

        for i in 0..6 {
            for j in 0..5 {
                assert_abs_diff_eq!(reconstructed[(i, j)], dense[(i, j)], epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn narrow_sketch_matches_dense_svd() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let matrix = low_rank(40, 30);

        let decomposition = TruncatedSvd::new(3)
            .oversamples(2)
            .power_iterations(2)
            .fit(&matrix, &mut rng)
            .unwrap();

        let mut expected: Vec<f64> = DMatrix::from(&matrix)
            .singular_values()
            .iter()
            .cloned()
            .collect();
        expected.sort_by(|a, b| b.partial_cmp(a).unwrap());

        for idx in 0..3 {
            assert_abs_diff_eq!(
                decomposition.singular_values[idx],
                expected[idx],
                epsilon = 1e-6 * expected[0]
            );
        }
    }

    #[test]
    fn same_seed_same_decomposition() {
        let matrix = low_rank(20, 15);
        let svd = TruncatedSvd::new(3).oversamples(2).power_iterations(1);

        let first = svd.fit(&matrix, &mut ChaCha8Rng::seed_from_u64(11)).unwrap();
        let second = svd.fit(&matrix, &mut ChaCha8Rng::seed_from_u64(11)).unwrap();

        assert_eq!(first.singular_values, second.singular_values);
        assert_eq!(first.u, second.u);
    }

    #[test]
    fn split_rows_keeps_order() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let decomposition = TruncatedSvd::new(2).fit(&diagonal(), &mut rng).unwrap();

        let (train, valid) = decomposition.split_rows(4);

        assert_eq!(train.shape(), (4, 2));
        assert_eq!(valid.shape(), (2, 2));
        assert_eq!(valid.row(0).into_owned(), decomposition.u.row(4).into_owned());
    }
}
