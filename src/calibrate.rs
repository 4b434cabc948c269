//! Two-group calibration of reporter scores.
//!
//! The loading vector is only defined up to sign, so a score tells us which
//! side of the disagreement axis a reporter sits on but not which side is
//! honest.  Calibration splits reporters by score sign and computes, for
//! each event, what the outcome would be if either side were trusted.  The
//! [`adjust`](crate::adjust) stage then picks a side.

use crate::data::Matrix;
use crate::error::Result;
use crate::fixed::{self, Fixed};

/// Which side of the loading axis a reporter falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    /// Non-negative score.
    First,
    /// Negative score.
    Second,
}

/// Output of the calibration stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calibration {
    /// Group of every reporter; a total partition.
    pub groups: Vec<Group>,
    /// `score - min(score)`: weights favouring the non-negative side.
    pub set1: Vec<Fixed>,
    /// `|score - max(score)|`: weights favouring the negative side.
    pub set2: Vec<Fixed>,
    /// Reputation-weighted outcome over all reporters, per event.
    pub old: Vec<Fixed>,
    /// Reputation-weighted outcome within the first group; `None` when the
    /// group carries no reputation.
    pub new1: Option<Vec<Fixed>>,
    /// Same for the second group.
    pub new2: Option<Vec<Fixed>>,
    /// Reputation normalized to sum to one.
    pub weights: Vec<Fixed>,
}

impl Calibration {
    /// Reporters in `group`, in row order.
    pub fn members(&self, group: Group) -> impl Iterator<Item = usize> + '_ {
        self.groups
            .iter()
            .enumerate()
            .filter(move |(_, &g)| g == group)
            .map(|(i, _)| i)
    }
}

/// Partitions reporters and computes both candidate outcome vectors.
///
/// `weights` is reputation normalized to sum to one and `filled` holds the
/// normalized, gap-free reports.
pub fn calibrate(scores: &[Fixed], weights: &[Fixed], filled: &Matrix) -> Result<Calibration> {
    let groups: Vec<Group> = scores
        .iter()
        .map(|s| {
            if s.is_negative() {
                Group::Second
            } else {
                Group::First
            }
        })
        .collect();
    let min = scores.iter().copied().min().unwrap_or(Fixed::ZERO);
    let max = scores.iter().copied().max().unwrap_or(Fixed::ZERO);
    let set1 = scores
        .iter()
        .map(|s| s.checked_sub(min))
        .collect::<Result<Vec<_>>>()?;
    let set2 = scores
        .iter()
        .map(|s| s.checked_sub(max)?.checked_abs())
        .collect::<Result<Vec<_>>>()?;

    let old = weighted_outcomes(weights, filled)?;
    let new1 = group_outcomes(&groups, Group::First, weights, filled)?;
    let new2 = group_outcomes(&groups, Group::Second, weights, filled)?;

    Ok(Calibration {
        groups,
        set1,
        set2,
        old,
        new1,
        new2,
        weights: weights.to_vec(),
    })
}

fn weighted_outcomes(weights: &[Fixed], filled: &Matrix) -> Result<Vec<Fixed>> {
    (0..filled.cols())
        .map(|j| fixed::dot(weights, &filled.column(j)))
        .collect()
}

fn group_outcomes(
    groups: &[Group],
    group: Group,
    weights: &[Fixed],
    filled: &Matrix,
) -> Result<Option<Vec<Fixed>>> {
    let masked: Vec<Fixed> = weights
        .iter()
        .zip(groups)
        .map(|(&w, &g)| if g == group { w } else { Fixed::ZERO })
        .collect();
    if fixed::checked_sum(masked.iter().copied())?.is_zero() {
        return Ok(None);
    }
    weighted_outcomes(&fixed::normalize(&masked)?, filled).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(values: &[i64]) -> Matrix {
        let mut m = Matrix::zeros(values.len(), 1);
        for (i, &v) in values.iter().enumerate() {
            m.set(i, 0, Fixed::from_int(v));
        }
        m
    }

    fn fx(v: f64) -> Fixed {
        Fixed::from_f64(v).unwrap()
    }

    #[test]
    fn test_groups_form_a_total_partition() {
        let scores = [fx(0.3), fx(-0.1), Fixed::ZERO, fx(-2.0)];
        let weights = fixed::normalize(&[Fixed::ONE; 4]).unwrap();
        let cal = calibrate(&scores, &weights, &column(&[1, 0, 1, 0])).unwrap();
        let first: Vec<usize> = cal.members(Group::First).collect();
        let second: Vec<usize> = cal.members(Group::Second).collect();
        assert_eq!(first, vec![0, 2]);
        assert_eq!(second, vec![1, 3]);
    }

    #[test]
    fn test_candidate_outcomes_follow_each_group() {
        let scores = [fx(0.25), fx(0.25), fx(-0.5)];
        let weights = fixed::normalize(&[Fixed::ONE, Fixed::ONE, Fixed::from_int(2)]).unwrap();
        let cal = calibrate(&scores, &weights, &column(&[1, 1, 0])).unwrap();
        assert_eq!(cal.old, vec![Fixed::HALF]);
        assert_eq!(cal.new1, Some(vec![Fixed::ONE]));
        assert_eq!(cal.new2, Some(vec![Fixed::ZERO]));
        assert_eq!(cal.set1, vec![fx(0.75), fx(0.75), Fixed::ZERO]);
        assert_eq!(cal.set2, vec![Fixed::ZERO, Fixed::ZERO, fx(0.75)]);
    }

    #[test]
    fn test_empty_group_has_no_candidate() {
        let scores = [Fixed::ZERO; 3];
        let weights = fixed::normalize(&[Fixed::ONE; 3]).unwrap();
        let cal = calibrate(&scores, &weights, &column(&[1, 1, 1])).unwrap();
        assert!(cal.new1.is_some());
        assert!(cal.new2.is_none());
        assert_eq!(cal.members(Group::Second).count(), 0);
    }
}
