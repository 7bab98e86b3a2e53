//! Two-state (gap/non-gap) continuous-time Markov model.

use anyhow::{anyhow, Result};
use nalgebra::{Matrix2, Vector2};

/// The probabilistic gap model: a 2-state rate matrix with stationary
/// distribution `(1-g, g)` for gap frequency `g`, decomposed once into
/// eigenvectors and eigenvalues. `transition_matrix(t)` is then a pure
/// function of the branch length.
///
/// Rebuilt once per insertion iteration from the realized gap
/// frequency of the current tree; every probabilistic newview receives
/// it as an explicit reference.
#[derive(Debug, Clone)]
pub struct ProbGapModel {
    gap_freq: f64,
    evecs: Matrix2<f64>,
    evals: Vector2<f64>,
    evecs_inv: Matrix2<f64>,
}

impl ProbGapModel {
    pub fn new(gap_freq: f64) -> Result<Self> {
        let g = gap_freq;
        // stationary distribution of this chain is (1-g, g):
        // pi = (q10, q01) / (q01 + q10)
        let q = Matrix2::new(-g, g, 1.0 - g, -(1.0 - g));

        let evals = q
            .eigenvalues()
            .ok_or_else(|| anyhow!("gap model: eigendecomposition failed for g = {}", g))?;

        let mut cols = [Vector2::zeros(); 2];
        for (k, col) in cols.iter_mut().enumerate() {
            *col = null_vector(&q, evals[k])
                .ok_or_else(|| anyhow!("gap model: no eigenvector for eigenvalue {}", evals[k]))?;
        }
        let evecs = Matrix2::from_columns(&cols);

        let evecs_inv = evecs
            .try_inverse()
            .ok_or_else(|| anyhow!("gap model: eigenvector matrix is singular"))?;

        Ok(Self {
            gap_freq,
            evecs,
            evals,
            evecs_inv,
        })
    }

    pub fn gap_freq(&self) -> f64 {
        self.gap_freq
    }

    /// `exp(t * Q)` via the eigenbasis: `V . diag(exp(t * l_i)) . V^-1`.
    pub fn transition_matrix(&self, t: f64) -> Matrix2<f64> {
        let d = Matrix2::from_diagonal(&Vector2::new(
            (t * self.evals[0]).exp(),
            (t * self.evals[1]).exp(),
        ));
        self.evecs * d * self.evecs_inv
    }
}

/// Unit null vector of `(q - l * I)`, closed form for the 2x2 case.
fn null_vector(q: &Matrix2<f64>, l: f64) -> Option<Vector2<f64>> {
    const EPS: f64 = 1e-12;

    let a = q[(0, 0)] - l;
    let b = q[(0, 1)];
    let c = q[(1, 0)];
    let d = q[(1, 1)] - l;

    let v = if a.abs() > EPS || b.abs() > EPS {
        Vector2::new(b, -a)
    } else if c.abs() > EPS || d.abs() > EPS {
        Vector2::new(d, -c)
    } else {
        return None;
    };

    Some(v.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_transition_at_zero_is_identity() {
        let model = ProbGapModel::new(0.3).unwrap();
        let p = model.transition_matrix(0.0);

        assert_relative_eq!(p[(0, 0)], 1.0, epsilon = 1e-10);
        assert_relative_eq!(p[(1, 1)], 1.0, epsilon = 1e-10);
        assert_relative_eq!(p[(0, 1)], 0.0, epsilon = 1e-10);
        assert_relative_eq!(p[(1, 0)], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_rows_sum_to_one() {
        let model = ProbGapModel::new(0.2).unwrap();
        for &t in &[0.0, 0.1, 1.0, 10.0] {
            let p = model.transition_matrix(t);
            assert_relative_eq!(p[(0, 0)] + p[(0, 1)], 1.0, epsilon = 1e-9);
            assert_relative_eq!(p[(1, 0)] + p[(1, 1)], 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_stationarity_at_large_t() {
        let g = 0.3;
        let model = ProbGapModel::new(g).unwrap();
        let p = model.transition_matrix(1e3);

        for row in 0..2 {
            assert_relative_eq!(p[(row, 0)], 1.0 - g, epsilon = 1e-6);
            assert_relative_eq!(p[(row, 1)], g, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_extreme_frequencies_still_decompose() {
        for &g in &[0.0, 1.0, 1e-9] {
            let model = ProbGapModel::new(g).unwrap();
            let p = model.transition_matrix(0.0);
            assert_relative_eq!(p[(0, 0)], 1.0, epsilon = 1e-9);
            assert_relative_eq!(p[(1, 1)], 1.0, epsilon = 1e-9);
        }
    }
}
