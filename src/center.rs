//! Reputation-weighted centering and loading-vector seeding.

use crate::data::Matrix;
use crate::error::Result;
use crate::fixed::{self, Fixed};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Filled reports with the reputation-weighted column means removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Centered {
    /// `x[i][j] - mean[j]`; every column has zero weighted mean.
    pub matrix: Matrix,
    /// Reputation-weighted mean of each event column.
    pub means: Vec<Fixed>,
    /// Reputation normalized to sum to one.
    pub weights: Vec<Fixed>,
}

impl Centered {
    /// `true` when no reporter carrying weight deviates from the means, so
    /// the weighted covariance is exactly zero.
    pub fn is_settled(&self) -> bool {
        self.weights
            .iter()
            .enumerate()
            .all(|(i, w)| w.is_zero() || self.matrix.row(i).iter().all(|v| v.is_zero()))
    }
}

/// Current guess for the dominant axis of reporter disagreement.
///
/// `remaining` is the iteration budget still available to the solver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingVector {
    /// One weight per event.
    pub weights: Vec<Fixed>,
    /// Solver iterations left before the hard cap.
    pub remaining: u32,
}

/// Centers `filled` on its reputation-weighted column means and seeds the
/// loading vector with a budget of `max_iterations`.
pub fn center(
    filled: &Matrix,
    reputation: &[Fixed],
    max_iterations: u32,
) -> Result<(Centered, LoadingVector)> {
    let weights = fixed::normalize(reputation)?;
    let (n, m) = (filled.rows(), filled.cols());
    let mut means = Vec::with_capacity(m);
    for j in 0..m {
        let column = filled.column(j);
        let mean = match fixed::agreed_value(&column, &weights) {
            Some(value) => value,
            None => fixed::dot(&weights, &column)?,
        };
        means.push(mean);
    }
    let mut matrix = Matrix::zeros(n, m);
    for i in 0..n {
        for (j, &mean) in means.iter().enumerate() {
            matrix.set(i, j, filled.get(i, j).checked_sub(mean)?);
        }
    }
    let loading = seed(m, max_iterations)?;
    debug!(reporters = n, events = m, "centered reports");
    Ok((
        Centered {
            matrix,
            means,
            weights,
        },
        loading,
    ))
}

/// Unit-norm starting vector with entry `j` proportional to `j + 1`.
///
/// Every entry is non-zero and no two are equal, so the seed is not
/// orthogonal to the covariance of two exactly opposed events.
pub fn seed(num_events: usize, max_iterations: u32) -> Result<LoadingVector> {
    let raw: Vec<Fixed> = (1..=num_events as i64).map(Fixed::from_int).collect();
    let length = fixed::norm(&raw)?;
    let weights = raw
        .iter()
        .map(|v| v.checked_div(length))
        .collect::<Result<Vec<_>>>()?;
    Ok(LoadingVector {
        weights,
        remaining: max_iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(rows: &[&[i64]]) -> Matrix {
        let mut m = Matrix::zeros(rows.len(), rows[0].len());
        for (i, row) in rows.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                m.set(i, j, Fixed::from_int(v));
            }
        }
        m
    }

    #[test]
    fn test_columns_have_zero_weighted_mean() {
        let x = filled(&[&[1, 0], &[1, 1], &[0, 1]]);
        let rep = [Fixed::from_int(2), Fixed::from_int(1), Fixed::from_int(1)];
        let (centered, _) = center(&x, &rep, 5).unwrap();
        assert_eq!(centered.means[0], Fixed::from_ratio(3, 4).unwrap());
        assert_eq!(centered.means[1], Fixed::HALF);
        for j in 0..2 {
            let mean = fixed::dot(&centered.weights, &centered.matrix.column(j)).unwrap();
            assert!(mean.raw().abs() <= 2, "column {j} mean {mean}");
        }
    }

    #[test]
    fn test_unanimous_reports_center_to_zero() {
        // Thirds do not sum to exactly one; the column must still be exact.
        let x = filled(&[&[1, 0], &[1, 0], &[1, 0]]);
        let rep = [Fixed::ONE; 3];
        let (centered, _) = center(&x, &rep, 5).unwrap();
        assert_eq!(centered.means, vec![Fixed::ONE, Fixed::ZERO]);
        assert!(centered.matrix.is_zero());
        assert!(centered.is_settled());
    }

    #[test]
    fn test_unweighted_dissent_leaves_the_round_settled() {
        let x = filled(&[&[1], &[1], &[0]]);
        let rep = [Fixed::ONE, Fixed::ONE, Fixed::ZERO];
        let (centered, _) = center(&x, &rep, 5).unwrap();
        assert!(!centered.matrix.is_zero());
        assert!(centered.is_settled());
    }

    #[test]
    fn test_seed_is_unit_norm_and_carries_budget() {
        let loading = seed(3, 7).unwrap();
        assert_eq!(loading.remaining, 7);
        let length = fixed::norm(&loading.weights).unwrap();
        assert!((length.to_f64() - 1.0).abs() < 1e-15);
        assert!(loading.weights.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seed(1, 5).unwrap().weights, vec![Fixed::ONE]);
    }
}
