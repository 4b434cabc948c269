//! Solver and resolver configuration.

use crate::error::{ConsensusError, Result};
use crate::fixed::Fixed;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// How scaled events collapse the smoothed reports into one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaledAggregation {
    /// Reputation-weighted mean.
    #[default]
    Mean,
    /// Reputation-weighted median; robust to a minority of extreme reports.
    Median,
}

/// Parameters for one resolution round.
///
/// Every field has a default, so a JSON file only needs to name the values
/// it overrides:
///
/// ```json
/// { "max_iterations": 8, "alpha": "0.2" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Hard cap on power-iteration rounds.
    pub max_iterations: u32,
    /// Loading-vector movement below which the solver stops early.
    pub tolerance: Fixed,
    /// Weight given to this round's scores when blending with prior reputation.
    pub alpha: Fixed,
    /// Half-width of the "ambiguous" band around 0.5 for binary outcomes.
    pub catch_tolerance: Fixed,
    /// Aggregation used for scaled events.
    pub scaled_aggregation: ScaledAggregation,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            tolerance: Fixed::from_raw(1i128 << 44),
            alpha: Fixed::from_raw(Fixed::ONE.raw() / 10),
            catch_tolerance: Fixed::from_raw(Fixed::ONE.raw() / 10),
            scaled_aggregation: ScaledAggregation::Mean,
        }
    }
}

impl ConsensusConfig {
    /// Loads a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).map_err(|err| ConsensusError::Io(err.to_string()))?;
        let config: Self =
            serde_json::from_str(&contents).map_err(|err| ConsensusError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(ConsensusError::InvalidInput(
                "max_iterations must be at least 1".into(),
            ));
        }
        if self.tolerance.is_negative() {
            return Err(ConsensusError::InvalidInput(
                "tolerance must be non-negative".into(),
            ));
        }
        if self.alpha.is_negative() || self.alpha > Fixed::ONE {
            return Err(ConsensusError::InvalidInput(
                "alpha must lie in [0, 1]".into(),
            ));
        }
        if self.catch_tolerance.is_negative() || self.catch_tolerance >= Fixed::HALF {
            return Err(ConsensusError::InvalidInput(
                "catch_tolerance must lie in [0, 0.5)".into(),
            ));
        }
        Ok(())
    }
}
