//! Missing-report imputation and scaled-event normalization.
//!
//! Each event column is first mapped into `[0, 1]` (scaled events are
//! remapped from `[min, max]`, binary events pass through).  Missing cells
//! then receive the reputation-weighted mean of the reporters who did
//! report, with the weights renormalized over those reporters.  For binary
//! events the imputed mean is caught to `0`, `0.5` or `1` so a filled-in
//! cell never invents a fractional vote.

use crate::data::{EventBounds, Matrix, ReportMask, ReportMatrix};
use crate::error::{ConsensusError, Result};
use crate::fixed::Fixed;
use tracing::debug;

/// Filled reports together with the mask of imputed cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpolated {
    /// Normalized reports with every gap filled.
    pub filled: Matrix,
    /// `true` for every cell that was imputed.
    pub mask: ReportMask,
}

/// Rounds a normalized binary value to `0`, `0.5` or `1`.
///
/// Values below `0.5 - tolerance` become `0`, values above
/// `0.5 + tolerance` become `1`, everything in between is ambiguous.
pub fn catch(value: Fixed, tolerance: Fixed) -> Result<Fixed> {
    if value < Fixed::HALF.checked_sub(tolerance)? {
        Ok(Fixed::ZERO)
    } else if value > Fixed::HALF.checked_add(tolerance)? {
        Ok(Fixed::ONE)
    } else {
        Ok(Fixed::HALF)
    }
}

/// Fills and normalizes a report matrix.
///
/// Fails with [`ConsensusError::InsufficientData`] when a column with gaps
/// has no reports backed by reputation.
pub fn interpolate(
    reports: &ReportMatrix,
    reputation: &[Fixed],
    events: &[EventBounds],
    catch_tolerance: Fixed,
) -> Result<Interpolated> {
    let (n, m) = (reports.num_reporters(), reports.num_events());
    let mut filled = Matrix::zeros(n, m);
    let mut mask = ReportMask::new(n, m);

    for (j, bounds) in events.iter().enumerate() {
        let mut present_weight = Fixed::ZERO;
        let mut weighted_total = Fixed::ZERO;
        let mut missing = Vec::new();
        for (i, &rep) in reputation.iter().enumerate() {
            match reports.get(i, j) {
                Some(raw) => {
                    let value = bounds.normalize(raw)?;
                    filled.set(i, j, value);
                    present_weight = present_weight.checked_add(rep)?;
                    weighted_total = weighted_total.checked_add(rep.checked_mul(value)?)?;
                }
                None => missing.push(i),
            }
        }
        if missing.is_empty() {
            continue;
        }
        if present_weight.is_zero() {
            return Err(ConsensusError::InsufficientData { event: j });
        }
        let mut mean = weighted_total.checked_div(present_weight)?;
        if !bounds.scaled {
            mean = catch(mean, catch_tolerance)?;
        }
        for i in missing {
            filled.set(i, j, mean);
            mask.mark(i, j);
        }
    }

    debug!(
        reporters = n,
        events = m,
        imputed = mask.imputed_total(),
        "interpolated reports"
    );
    Ok(Interpolated { filled, mask })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tol() -> Fixed {
        Fixed::from_ratio(1, 10).unwrap()
    }

    fn int(v: i64) -> Fixed {
        Fixed::from_int(v)
    }

    #[test]
    fn test_catch_bands() {
        assert_eq!(catch(Fixed::from_ratio(3, 10).unwrap(), tol()).unwrap(), Fixed::ZERO);
        assert_eq!(catch(Fixed::from_ratio(55, 100).unwrap(), tol()).unwrap(), Fixed::HALF);
        assert_eq!(catch(Fixed::from_ratio(7, 10).unwrap(), tol()).unwrap(), Fixed::ONE);
    }

    #[test]
    fn test_complete_binary_matrix_is_unchanged() {
        let reports = ReportMatrix::from_rows(vec![
            vec![Some(int(1)), Some(int(0))],
            vec![Some(Fixed::HALF), Some(int(1))],
        ])
        .unwrap();
        let events = [EventBounds::binary(), EventBounds::binary()];
        let out = interpolate(&reports, &[int(1), int(2)], &events, tol()).unwrap();
        assert_eq!(out.mask.imputed_total(), 0);
        for i in 0..2 {
            for j in 0..2 {
                assert_eq!(Some(out.filled.get(i, j)), reports.get(i, j));
            }
        }
    }

    #[test]
    fn test_missing_binary_cell_gets_caught_weighted_mean() {
        // Weighted mean of present reports: (3·1 + 1·0) / 4 = 0.75 -> caught to 1.
        let reports = ReportMatrix::from_rows(vec![
            vec![Some(int(1))],
            vec![Some(int(0))],
            vec![None],
        ])
        .unwrap();
        let out = interpolate(
            &reports,
            &[int(3), int(1), int(5)],
            &[EventBounds::binary()],
            tol(),
        )
        .unwrap();
        assert_eq!(out.filled.get(2, 0), Fixed::ONE);
        assert!(out.mask.is_imputed(2, 0));
        assert!(!out.mask.is_imputed(0, 0));
    }

    #[test]
    fn test_scaled_column_is_normalized_and_imputed() {
        let bounds = EventBounds::scaled(int(0), int(100)).unwrap();
        let reports =
            ReportMatrix::from_rows(vec![vec![Some(int(20))], vec![Some(int(80))], vec![None]])
                .unwrap();
        let out = interpolate(&reports, &[int(1), int(3), int(1)], &[bounds], tol()).unwrap();
        assert_eq!(out.filled.get(0, 0), Fixed::from_ratio(1, 5).unwrap());
        assert_eq!(out.filled.get(1, 0), Fixed::from_ratio(4, 5).unwrap());
        // (0.2 + 3·0.8) / 4 = 0.65, not caught for scaled events.
        let imputed = out.filled.get(2, 0);
        assert!((imputed.to_f64() - 0.65).abs() < 1e-15);
    }

    #[test]
    fn test_empty_column_is_insufficient_data() {
        let reports =
            ReportMatrix::from_rows(vec![vec![Some(int(1)), None], vec![Some(int(1)), None]])
                .unwrap();
        let events = [EventBounds::binary(), EventBounds::binary()];
        assert_eq!(
            interpolate(&reports, &[int(1), int(1)], &events, tol()),
            Err(ConsensusError::InsufficientData { event: 1 })
        );
    }

    #[test]
    fn test_column_backed_only_by_zero_reputation_is_insufficient() {
        let reports = ReportMatrix::from_rows(vec![vec![Some(int(1))], vec![None]]).unwrap();
        assert_eq!(
            interpolate(&reports, &[Fixed::ZERO, int(1)], &[EventBounds::binary()], tol()),
            Err(ConsensusError::InsufficientData { event: 0 })
        );
    }
}
