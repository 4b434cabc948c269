//! Final per-event outcomes.
//!
//! Each event's outcome is taken from the smoothed reputation shares.
//! Binary events are caught to `0`, `0.5` or `1`; scaled events are mapped
//! back from `[0, 1]` into their natural range.

use crate::config::{ConsensusConfig, ScaledAggregation};
use crate::data::{EventBounds, Matrix};
use crate::error::Result;
use crate::fixed::{self, Fixed};
use crate::interpolate::catch;
use tracing::debug;

/// Resolved outcomes for every event of a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Outcome in natural units.
    pub outcomes: Vec<Fixed>,
    /// Normalized reputation-weighted result before catching.
    pub raw: Vec<Fixed>,
    /// Normalized outcome after catching (binary) or unchanged (scaled).
    pub adjusted: Vec<Fixed>,
    /// Share of smoothed reputation whose report sits on the outcome.
    pub certainty: Vec<Fixed>,
}

/// Resolves every event from the smoothed shares and filled reports.
pub fn resolve(
    shares: &[Fixed],
    filled: &Matrix,
    events: &[EventBounds],
    config: &ConsensusConfig,
) -> Result<Resolution> {
    let mut resolution = Resolution {
        outcomes: Vec::with_capacity(events.len()),
        raw: Vec::with_capacity(events.len()),
        adjusted: Vec::with_capacity(events.len()),
        certainty: Vec::with_capacity(events.len()),
    };
    for (j, bounds) in events.iter().enumerate() {
        let column = filled.column(j);
        let raw = match (bounds.scaled, config.scaled_aggregation) {
            (true, ScaledAggregation::Median) => weighted_median(&column, shares)?,
            _ => match fixed::agreed_value(&column, shares) {
                Some(value) => value,
                None => fixed::dot(shares, &column)?,
            },
        };
        let adjusted = if bounds.scaled {
            raw
        } else {
            catch(raw, config.catch_tolerance)?
        };
        let mut agreeing = Fixed::ZERO;
        for (&x, &share) in column.iter().zip(shares) {
            if x.checked_sub(adjusted)?.checked_abs()? <= config.catch_tolerance {
                agreeing = agreeing.checked_add(share)?;
            }
        }
        resolution.outcomes.push(bounds.denormalize(adjusted)?);
        resolution.raw.push(raw);
        resolution.adjusted.push(adjusted);
        resolution.certainty.push(agreeing);
    }
    debug!(events = events.len(), "resolved outcomes");
    Ok(resolution)
}

/// Reputation-weighted median.
///
/// Values are ordered (ties by row), and the first value whose cumulative
/// weight reaches half the total is the median.  When the cumulative weight
/// lands exactly on the half, the median is the midpoint with the next value.
pub fn weighted_median(values: &[Fixed], weights: &[Fixed]) -> Result<Fixed> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by_key(|&i| (values[i], i));
    let total = fixed::checked_sum(weights.iter().copied())?;
    let mut cumulative = Fixed::ZERO;
    for (pos, &i) in order.iter().enumerate() {
        cumulative = cumulative.checked_add(weights[i])?;
        let doubled = cumulative.checked_add(cumulative)?;
        if doubled < total {
            continue;
        }
        if doubled == total {
            if let Some(&next) = order.get(pos + 1) {
                return values[i]
                    .checked_add(values[next])?
                    .checked_div(Fixed::from_int(2));
            }
        }
        return Ok(values[i]);
    }
    Ok(order.last().map_or(Fixed::ZERO, |&i| values[i]))
}
