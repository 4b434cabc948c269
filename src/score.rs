//! Projection of reporters onto the loading vector.

use crate::data::Matrix;
use crate::error::Result;
use crate::fixed::{self, Fixed};

/// `score[i] = Σ_j W[i][j] · L[j]`, one score per reporter.
pub fn scores(centered: &Matrix, loading: &[Fixed]) -> Result<Vec<Fixed>> {
    (0..centered.rows())
        .map(|i| fixed::dot(centered.row(i), loading))
        .collect()
}
