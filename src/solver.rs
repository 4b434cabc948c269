//! Power iteration over the reputation-weighted covariance.
//!
//! The solver refines the loading vector `L` with
//!
//! ```text
//! L' = Wᵀ · R · W · L,   L' ← L' / ‖L'‖
//! ```
//!
//! where `W` is the centered report matrix and `R` the diagonal of
//! normalized reputation.  It is an explicit state machine so a metered
//! caller can advance it one [`step`](PowerIteration::step) at a time and
//! still obtain exactly the result of [`solve`](PowerIteration::solve).
//!
//! The loop is bounded by the iteration budget carried in the
//! [`LoadingVector`]; it stops earlier once `‖L' − L‖` falls within the
//! configured tolerance.
//!
//! A loading vector orthogonal to every reporter deviation maps to zero.
//! The solver then restarts that iteration from the covariance column with
//! the largest norm, which is non-zero whenever the covariance is.  Only a
//! covariance that is zero at working precision yields
//! [`ConsensusError::DegenerateCovariance`].

use crate::center::{Centered, LoadingVector};
use crate::error::{ConsensusError, Result};
use crate::fixed::{self, Fixed};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Frozen solver output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    /// Unit-norm loading vector, one weight per event.
    pub loading: Vec<Fixed>,
    /// Iterations actually performed.
    pub iterations: u32,
    /// `true` when the tolerance was met (or there was nothing to solve),
    /// `false` when the iteration cap stopped the loop.
    pub converged: bool,
}

/// Solver state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverState {
    /// Still refining the loading vector.
    Running(LoadingVector),
    /// Terminal; the loading vector is frozen.
    Converged(Solution),
}

/// Bounded power iteration over one round's centered reports.
#[derive(Debug, Clone)]
pub struct PowerIteration<'a> {
    centered: &'a Centered,
    tolerance: Fixed,
    iterations: u32,
    state: SolverState,
}

impl<'a> PowerIteration<'a> {
    /// Starts the solver from a seeded loading vector.
    pub fn new(centered: &'a Centered, loading: LoadingVector, tolerance: Fixed) -> Self {
        Self {
            centered,
            tolerance,
            iterations: 0,
            state: SolverState::Running(loading),
        }
    }

    /// Current state.
    pub fn state(&self) -> &SolverState {
        &self.state
    }

    /// Advances by one iteration.  A converged solver stays converged.
    pub fn step(&mut self) -> Result<&SolverState> {
        let loading = match &self.state {
            SolverState::Converged(_) => return Ok(&self.state),
            SolverState::Running(loading) => loading,
        };

        // Reputation is unanimous: there is no disagreement axis to find.
        if self.centered.is_settled() {
            self.state = SolverState::Converged(Solution {
                loading: loading.weights.clone(),
                iterations: self.iterations,
                converged: true,
            });
            return Ok(&self.state);
        }
        if loading.remaining == 0 {
            self.state = SolverState::Converged(Solution {
                loading: loading.weights.clone(),
                iterations: self.iterations,
                converged: false,
            });
            return Ok(&self.state);
        }

        let degenerate = ConsensusError::DegenerateCovariance {
            iteration: self.iterations + 1,
        };
        let next = match unit(&self.covariance_product(&loading.weights)?)? {
            Some(next) => next,
            // The loading vector is orthogonal to every deviation.
            None => {
                let column = self.strongest_column()?.ok_or_else(|| degenerate.clone())?;
                debug!(iteration = self.iterations + 1, "reseeded from covariance column");
                unit(&column)?.ok_or(degenerate)?
            }
        };
        let delta = next
            .iter()
            .zip(&loading.weights)
            .map(|(&a, &b)| a.checked_sub(b))
            .collect::<Result<Vec<_>>>()?;
        let distance = fixed::norm(&delta)?;
        let remaining = loading.remaining - 1;
        self.iterations += 1;
        trace!(
            iteration = self.iterations,
            remaining,
            distance = %distance,
            "power iteration"
        );

        self.state = if distance <= self.tolerance || remaining == 0 {
            let converged = distance <= self.tolerance;
            debug!(iterations = self.iterations, converged, "loading vector frozen");
            SolverState::Converged(Solution {
                loading: next,
                iterations: self.iterations,
                converged,
            })
        } else {
            SolverState::Running(LoadingVector {
                weights: next,
                remaining,
            })
        };
        Ok(&self.state)
    }

    /// Runs until converged or the budget is spent.
    pub fn solve(mut self) -> Result<Solution> {
        loop {
            if let SolverState::Converged(solution) = self.step()? {
                return Ok(solution.clone());
            }
        }
    }

    /// Column of `Wᵀ · R · W` with the largest norm, lowest index on ties.
    /// `None` only when the covariance is zero.
    fn strongest_column(&self) -> Result<Option<Vec<Fixed>>> {
        let m = self.centered.matrix.cols();
        let mut best: Option<(Fixed, Vec<Fixed>)> = None;
        for j in 0..m {
            let mut basis = vec![Fixed::ZERO; m];
            basis[j] = Fixed::ONE;
            let column = self.covariance_product(&basis)?;
            if column.iter().all(|v| v.is_zero()) {
                continue;
            }
            let length = fixed::norm(&column)?;
            if best.as_ref().map_or(true, |(top, _)| length > *top) {
                best = Some((length, column));
            }
        }
        Ok(best.map(|(_, column)| column))
    }

    /// `Wᵀ · R · W · L`.
    fn covariance_product(&self, loading: &[Fixed]) -> Result<Vec<Fixed>> {
        let w = &self.centered.matrix;
        let mut projected = Vec::with_capacity(w.rows());
        for (i, &r) in self.centered.weights.iter().enumerate() {
            projected.push(r.checked_mul(fixed::dot(w.row(i), loading)?)?);
        }
        (0..w.cols())
            .map(|j| fixed::dot(&w.column(j), &projected))
            .collect()
    }
}

/// Rescales `v` to unit norm; `None` when `v` is the zero vector.
///
/// The vector is first divided by its largest magnitude so that tiny but
/// non-zero products keep their direction instead of underflowing.
fn unit(v: &[Fixed]) -> Result<Option<Vec<Fixed>>> {
    let peak = v
        .iter()
        .map(|x| x.raw().unsigned_abs())
        .max()
        .unwrap_or(0);
    if peak == 0 {
        return Ok(None);
    }
    let peak = Fixed::from_raw(
        i128::try_from(peak).map_err(|_| ConsensusError::ArithmeticOverflow)?,
    );
    let scaled = v
        .iter()
        .map(|x| x.checked_div(peak))
        .collect::<Result<Vec<_>>>()?;
    let length = fixed::norm(&scaled)?;
    scaled
        .iter()
        .map(|x| x.checked_div(length))
        .collect::<Result<Vec<_>>>()
        .map(Some)
}
