//! Single-round resolution pipeline.
//!
//! [`resolve_round`] chains every stage of the procedure in order:
//!
//! 1. [`interpolate`](crate::interpolate) missing reports and normalize scaled events,
//! 2. [`center`](crate::center) on reputation-weighted means and seed the loading vector,
//! 3. run the bounded [`PowerIteration`] solver,
//! 4. project reporters onto the loading vector ([`score`](crate::score)),
//! 5. [`calibrate`](crate::calibrate) the two score groups,
//! 6. [`adjust`](crate::adjust) scores toward the authoritative group,
//! 7. [`smooth`](crate::smooth) them into new reputation,
//! 8. [`resolve`](crate::resolve) event outcomes,
//! 9. grade [`participation`](crate::participation).
//!
//! Each stage owns its outputs for the lifetime of the round only; nothing
//! is shared between rounds, so independent rounds may run in parallel via
//! [`resolve_batch`].  The first failing stage aborts the round.
//!
//! # Examples
//!
//! ```
//! use reputation_oracle::{resolve_round, ConsensusConfig, EventBounds, Fixed, ReportMatrix, RoundInput};
//!
//! let yes = Some(Fixed::ONE);
//! let input = RoundInput {
//!     reports: ReportMatrix::from_rows(vec![vec![yes]; 4]).unwrap(),
//!     reputation: vec![Fixed::ONE; 4],
//!     events: vec![EventBounds::binary()],
//! };
//! let outcome = resolve_round(&input, &ConsensusConfig::default()).unwrap();
//! assert_eq!(outcome.outcomes, vec![Fixed::ONE]);
//! assert_eq!(outcome.reputation, input.reputation);
//! ```

use crate::adjust::adjust;
use crate::calibrate::calibrate;
use crate::center::center;
use crate::config::ConsensusConfig;
use crate::data::{RoundInput, RoundOutcome};
use crate::error::Result;
use crate::interpolate::{interpolate, Interpolated};
use crate::participation::participation;
use crate::resolve::resolve;
use crate::score::scores;
use crate::smooth::smooth;
use crate::solver::PowerIteration;
#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;
use tracing::{debug_span, warn};

/// Resolves one round: outcomes, updated reputation and bonuses.
pub fn resolve_round(input: &RoundInput, config: &ConsensusConfig) -> Result<RoundOutcome> {
    let span = debug_span!(
        "round",
        reporters = input.reports.num_reporters(),
        events = input.reports.num_events()
    );
    let _entered = span.enter();
    run_pipeline(input, config).map_err(|err| {
        warn!(%err, "round aborted");
        err
    })
}

fn run_pipeline(input: &RoundInput, config: &ConsensusConfig) -> Result<RoundOutcome> {
    config.validate()?;
    input.validate()?;

    let Interpolated { filled, mask } = interpolate(
        &input.reports,
        &input.reputation,
        &input.events,
        config.catch_tolerance,
    )?;
    let (centered, seed) = center(&filled, &input.reputation, config.max_iterations)?;
    let solution = PowerIteration::new(&centered, seed, config.tolerance).solve()?;
    let scores = scores(&centered.matrix, &solution.loading)?;
    let calibration = calibrate(&scores, &centered.weights, &filled)?;
    let adjustment = adjust(&calibration)?;
    let smoothed = smooth(&adjustment.scores, &input.reputation, config.alpha)?;
    let resolution = resolve(&smoothed.shares, &filled, &input.events, config)?;
    let graded = participation(&filled, &mask, &resolution.adjusted, &smoothed.shares)?;

    Ok(RoundOutcome {
        outcomes: resolution.outcomes,
        outcomes_raw: resolution.raw,
        certainty: resolution.certainty,
        reputation: smoothed.reputation,
        bonus: graded.bonus,
        mask,
        loading: solution.loading,
        scores,
        adjusted_scores: adjustment.scores,
        iterations: solution.iterations,
        converged: solution.converged,
        na_fraction: graded.na_fraction,
    })
}

/// Resolves independent rounds, in parallel where threads are available.
///
/// Results are returned in input order; one failing round does not affect
/// the others.
pub fn resolve_batch(inputs: &[RoundInput], config: &ConsensusConfig) -> Vec<Result<RoundOutcome>> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        inputs
            .par_iter()
            .map(|input| resolve_round(input, config))
            .collect()
    }
    #[cfg(target_arch = "wasm32")]
    {
        inputs
            .iter()
            .map(|input| resolve_round(input, config))
            .collect()
    }
}
