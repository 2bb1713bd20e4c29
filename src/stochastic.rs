use rand::prelude::*;
use rand_distr::Exp1;

use crate::error::{HmmError, Result};

/// Tolerance used when validating row sums of user supplied tables.
pub const ROW_SUM_TOLERANCE: f64 = 1e-6;

/// Row-stochastic table stored flat, row-major.
///
/// Used for the initial distribution (a single row), the transition matrix
/// and the emission matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct StochasticMatrix {
    n_rows: usize,
    n_cols: usize,
    data: Vec<f64>,
}

impl StochasticMatrix {
    pub fn new(n_rows: usize, n_cols: usize, data: Vec<f64>) -> Result<Self> {
        if n_rows == 0 || n_cols == 0 {
            return Err(HmmError::InvalidInput(format!(
                "stochastic matrix must be non-empty, got {n_rows}x{n_cols}"
            )));
        }
        if data.len() != n_rows * n_cols {
            return Err(HmmError::InvalidInput(format!(
                "table length {} != {n_rows}x{n_cols}",
                data.len()
            )));
        }
        if let Some(idx) = data.iter().position(|p| !p.is_finite() || *p < 0.0) {
            return Err(HmmError::InvalidInput(format!(
                "entry ({}, {}) = {} is not a probability",
                idx / n_cols,
                idx % n_cols,
                data[idx]
            )));
        }

        let matrix = Self { n_rows, n_cols, data };

        for (i, sum) in matrix.row_sums().into_iter().enumerate() {
            if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
                return Err(HmmError::InvalidInput(format!(
                    "row {i} sums to {sum}, expected ~1.0"
                )));
            }
        }

        Ok(matrix)
    }

    /// Single-row distribution, e.g. the initial state probabilities.
    pub fn from_vector(probs: Vec<f64>) -> Result<Self> {
        Self::new(1, probs.len(), probs)
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n_cols = rows.first().map_or(0, Vec::len);

        if let Some(i) = rows.iter().position(|r| r.len() != n_cols) {
            return Err(HmmError::InvalidInput(format!(
                "row {i} has length {}, expected {n_cols}",
                rows[i].len()
            )));
        }

        Self::new(rows.len(), n_cols, rows.concat())
    }

    /// Draws every row independently from a symmetric Dirichlet(1, ..., 1).
    pub fn random_dirichlet<R: Rng + ?Sized>(
        rng: &mut R,
        n_rows: usize,
        n_cols: usize,
    ) -> Result<Self> {
        if n_rows == 0 || n_cols == 0 {
            return Err(HmmError::InvalidInput(format!(
                "stochastic matrix must be non-empty, got {n_rows}x{n_cols}"
            )));
        }

        let mut data = Vec::with_capacity(n_rows * n_cols);
        for _ in 0..n_rows {
            data.extend(dirichlet_row(rng, n_cols));
        }

        Ok(Self { n_rows, n_cols, data })
    }

    /// Wraps rows produced by re-estimation; callers guarantee the shape.
    pub(crate) fn from_estimate(n_rows: usize, n_cols: usize, data: Vec<f64>) -> Self {
        debug_assert_eq!(data.len(), n_rows * n_cols);
        Self { n_rows, n_cols, data }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n_cols + j]
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n_cols..(i + 1) * self.n_cols]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_rows(&self) -> Vec<Vec<f64>> {
        self.data.chunks(self.n_cols).map(<[f64]>::to_vec).collect()
    }

    pub fn row_sums(&self) -> Vec<f64> {
        self.data.chunks(self.n_cols).map(|r| r.iter().sum()).collect()
    }

    /// True when every entry is a non-negative number and every row sums to 1 within `tol`.
    pub fn is_stochastic(&self, tol: f64) -> bool {
        self.data.iter().all(|p| p.is_finite() && *p >= 0.0)
            && self.row_sums().iter().all(|s| (s - 1.0).abs() <= tol)
    }
}

/// NB Dirichlet(1, ..., 1) is uniform on the simplex; normalised Exp(1) draws sample it exactly.
fn dirichlet_row<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Vec<f64> {
    loop {
        let mut row: Vec<f64> = (0..n).map(|_| rng.sample::<f64, _>(Exp1)).collect();
        let norm: f64 = row.iter().sum();

        if norm > 0.0 {
            for v in &mut row {
                *v /= norm;
            }
            return row;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;

    #[test]
    fn test_new_validates_rows() {
        assert!(StochasticMatrix::new(2, 2, vec![0.5, 0.5, 0.2, 0.8]).is_ok());
        assert!(StochasticMatrix::new(2, 2, vec![0.5, 0.5, 0.2, 0.7]).is_err());
        assert!(StochasticMatrix::new(2, 2, vec![0.5, 0.5, 0.2]).is_err());
        assert!(StochasticMatrix::new(0, 2, vec![]).is_err());
        assert!(StochasticMatrix::new(1, 2, vec![1.5, -0.5]).is_err());
        assert!(StochasticMatrix::new(1, 2, vec![f64::NAN, 1.0]).is_err());
    }

    #[test]
    fn test_from_rows() {
        let m = StochasticMatrix::from_rows(&[vec![0.7, 0.3], vec![0.4, 0.6]]).unwrap();
        assert_eq!(m.n_rows(), 2);
        assert_eq!(m.n_cols(), 2);
        assert_eq!(m.get(1, 0), 0.4);
        assert_eq!(m.row(0), &[0.7, 0.3]);
        assert_eq!(m.as_rows(), vec![vec![0.7, 0.3], vec![0.4, 0.6]]);

        assert!(StochasticMatrix::from_rows(&[vec![1.0], vec![0.5, 0.5]]).is_err());
        assert!(StochasticMatrix::from_rows(&[]).is_err());
    }

    #[test]
    fn test_random_dirichlet_rows_are_distributions() {
        let mut rng = StdRng::seed_from_u64(42);

        for (rows, cols) in [(1, 1), (1, 5), (3, 3), (4, 7)] {
            let m = StochasticMatrix::random_dirichlet(&mut rng, rows, cols).unwrap();
            assert_eq!(m.n_rows(), rows);
            assert_eq!(m.n_cols(), cols);
            assert!(m.is_stochastic(1e-12));
        }

        assert!(StochasticMatrix::random_dirichlet(&mut rng, 0, 3).is_err());
        assert!(StochasticMatrix::random_dirichlet(&mut rng, 3, 0).is_err());
    }

    #[test]
    fn test_random_dirichlet_is_seeded() {
        let a = StochasticMatrix::random_dirichlet(&mut StdRng::seed_from_u64(7), 3, 4).unwrap();
        let b = StochasticMatrix::random_dirichlet(&mut StdRng::seed_from_u64(7), 3, 4).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_dirichlet_mean_is_uniform() {
        // NB E[x_k] = 1/n under Dir(1, ..., 1).
        let mut rng = StdRng::seed_from_u64(1);
        let n = 4;
        let draws = 20_000;
        let mut mean = vec![0.0; n];

        for _ in 0..draws {
            for (m, x) in mean.iter_mut().zip(dirichlet_row(&mut rng, n)) {
                *m += x / draws as f64;
            }
        }

        for m in mean {
            assert!((m - 0.25).abs() < 0.01, "mean {m} far from 0.25");
        }
    }
}
