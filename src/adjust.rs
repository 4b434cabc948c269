//! Direction selection for reporter scores.
//!
//! A group is consistent with the round when trusting it moves the outcome
//! vector little.  Consistency of a group is measured per event as the
//! squared distance between that group's candidate outcome and the
//! reputation-weighted outcome of all reporters, summed over events.  The
//! more consistent group is authoritative and its shifted scores become the
//! adjusted scores.  Ties go to the first (non-negative score) group, and a
//! group without reputation never wins.

use crate::calibrate::{Calibration, Group};
use crate::error::{ConsensusError, Result};
use crate::fixed::{self, Fixed};
use tracing::debug;

/// Selected direction and the resulting per-reporter scores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjustment {
    /// Group treated as authoritative.
    pub selected: Group,
    /// Non-negative adjusted score per reporter.
    pub scores: Vec<Fixed>,
    /// Inconsistency of the first group, if it carries reputation.
    pub spread1: Option<Fixed>,
    /// Inconsistency of the second group, if it carries reputation.
    pub spread2: Option<Fixed>,
}

/// Picks the authoritative group and derives adjusted scores.
pub fn adjust(calibration: &Calibration) -> Result<Adjustment> {
    let spread1 = calibration
        .new1
        .as_deref()
        .map(|new| spread(new, &calibration.old))
        .transpose()?;
    let spread2 = calibration
        .new2
        .as_deref()
        .map(|new| spread(new, &calibration.old))
        .transpose()?;
    let selected = match (spread1, spread2) {
        (Some(a), Some(b)) if b < a => Group::Second,
        (Some(_), _) => Group::First,
        (None, Some(_)) => Group::Second,
        (None, None) => {
            return Err(ConsensusError::InvalidInput(
                "no reporter group carries reputation".into(),
            ))
        }
    };

    let chosen = match selected {
        Group::First => &calibration.set1,
        Group::Second => &calibration.set2,
    };
    // No reporter carrying reputation is rewarded: there is no direction.
    let flat = chosen
        .iter()
        .zip(&calibration.weights)
        .all(|(s, w)| s.is_zero() || w.is_zero());
    let scores = if flat {
        vec![Fixed::ONE; chosen.len()]
    } else {
        chosen.clone()
    };
    debug!(?selected, "adjusted scores");
    Ok(Adjustment {
        selected,
        scores,
        spread1,
        spread2,
    })
}

fn spread(candidate: &[Fixed], old: &[Fixed]) -> Result<Fixed> {
    let diff = candidate
        .iter()
        .zip(old)
        .map(|(&a, &b)| a.checked_sub(b))
        .collect::<Result<Vec<_>>>()?;
    fixed::dot(&diff, &diff)
}
