//! Blending adjusted scores into new reputation.
//!
//! Reputation is redistributed, never minted: the result is rescaled to the
//! prior total and the last few scaled units lost to rounding are credited
//! to the heaviest reporter, so the total is conserved exactly.

use crate::error::{ConsensusError, Result};
use crate::fixed::{self, Fixed};
use tracing::debug;

/// Smoothed reputation in two scales.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smoothed {
    /// Smoothed weights normalized to sum to one.
    pub shares: Vec<Fixed>,
    /// Smoothed weights scaled to the prior reputation total.
    pub reputation: Vec<Fixed>,
}

/// `alpha · normalize(adjusted ⊙ prior) + (1 − alpha) · normalize(prior)`,
/// rescaled to the prior total.
///
/// Fails with [`ConsensusError::NegativeReputationCollapse`] when no reporter
/// with reputation has a positive adjusted score.
pub fn smooth(adjusted: &[Fixed], reputation: &[Fixed], alpha: Fixed) -> Result<Smoothed> {
    let total = fixed::checked_sum(reputation.iter().copied())?;
    let prior = fixed::normalize(reputation)?;
    let raw = adjusted
        .iter()
        .zip(&prior)
        .map(|(&score, &p)| score.clamp_non_negative().checked_mul(p))
        .collect::<Result<Vec<_>>>()?;
    if fixed::checked_sum(raw.iter().copied())?.is_zero() {
        return Err(ConsensusError::NegativeReputationCollapse);
    }
    let this_round = fixed::normalize(&raw)?;
    // p + alpha·(t − p): exact when this round agrees with the prior.
    let shares = this_round
        .iter()
        .zip(&prior)
        .map(|(&t, &p)| {
            p.checked_add(alpha.checked_mul(t.checked_sub(p)?)?)
                .map(Fixed::clamp_non_negative)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut updated = shares
        .iter()
        .map(|&s| s.checked_mul(total))
        .collect::<Result<Vec<_>>>()?;
    let residual = total.checked_sub(fixed::checked_sum(updated.iter().copied())?)?;
    if let Some(heaviest) = heaviest(&updated) {
        updated[heaviest] = updated[heaviest].checked_add(residual)?;
    }
    debug!(reporters = updated.len(), residual = residual.raw(), "smoothed reputation");
    Ok(Smoothed {
        shares,
        reputation: updated,
    })
}

/// Index of the largest value, lowest index on ties.
fn heaviest(values: &[Fixed]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, Fixed)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}
