//! Per-reporter participation bonus.
//!
//! A reporter's grade combines how much of the round they actually reported
//! (`participation`, the fraction of their cells that were not imputed)
//! with how closely their own reports match the resolved outcomes
//! (`agreement`, one minus the mean absolute distance over supplied cells):
//!
//! ```text
//! grade = participation · (2·agreement − 1) − (1 − participation)   ∈ [−1, 1]
//! bonus = smoothed_share · grade
//! ```
//!
//! Complete, consensus-aligned reporters earn their full share.  The grade
//! turns negative once agreement drops below one half or half the row was
//! imputed, and a complete reporter who disagreed on everything loses their
//! full share.

use crate::data::{Matrix, ReportMask};
use crate::error::Result;
use crate::fixed::Fixed;

/// Bonus vector plus the round-level missing-data share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participation {
    /// Signed bonus per reporter.
    pub bonus: Vec<Fixed>,
    /// Reputation-weighted share of imputed cells.
    pub na_fraction: Fixed,
}

/// Grades every reporter against the normalized, caught outcomes.
pub fn participation(
    filled: &Matrix,
    mask: &ReportMask,
    outcomes: &[Fixed],
    shares: &[Fixed],
) -> Result<Participation> {
    let num_events = filled.cols() as i64;
    let mut bonus = Vec::with_capacity(filled.rows());
    let mut na_fraction = Fixed::ZERO;
    for (i, &share) in shares.iter().enumerate() {
        let imputed = mask.imputed_in_row(i) as i64;
        let supplied = num_events - imputed;
        let missing_share = Fixed::from_ratio(imputed, num_events)?;
        na_fraction = na_fraction.checked_add(share.checked_mul(missing_share)?)?;

        let agreement = if supplied == 0 {
            Fixed::ZERO
        } else {
            let mut distance = Fixed::ZERO;
            for (j, &outcome) in outcomes.iter().enumerate() {
                if !mask.is_imputed(i, j) {
                    let gap = filled.get(i, j).checked_sub(outcome)?.checked_abs()?;
                    distance = distance.checked_add(gap)?;
                }
            }
            Fixed::ONE.checked_sub(distance.checked_div(Fixed::from_int(supplied))?)?
        };
        let present = Fixed::ONE.checked_sub(missing_share)?;
        let signed_agreement = agreement.checked_add(agreement)?.checked_sub(Fixed::ONE)?;
        let grade = present
            .checked_mul(signed_agreement)?
            .checked_sub(missing_share)?;
        bonus.push(share.checked_mul(grade)?);
    }
    Ok(Participation { bonus, na_fraction })
}
