#![deny(missing_docs)]

//! # reputation_oracle
//!
//! Reputation-weighted consensus for event oracles.  A set of reporters,
//! each holding reputation, reports on a set of events; this crate decides
//! every event's outcome, rewards the reporters who agreed with the
//! consensus and moves reputation away from those who did not.
//!
//! The resolution runs as a fixed pipeline of stages, one module each:
//!
//! * [`interpolate`](interpolate/index.html) fills missing reports;
//! * [`center`](center/index.html) and [`solver`](solver/index.html) find
//!   the principal axis of disagreement by bounded power iteration;
//! * [`score`](score/index.html), [`calibrate`](calibrate/index.html) and
//!   [`adjust`](adjust/index.html) decide which side of that axis is
//!   honest;
//! * [`smooth`](smooth/index.html) turns scores into new reputation;
//! * [`resolve`](resolve/index.html) fixes the outcomes and
//!   [`participation`](participation/index.html) grades every reporter.
//!
//! All arithmetic is signed Q64.64 fixed point ([`Fixed`]), so every party
//! running the same round on any platform obtains bit-identical results.
//! [`round_digest`] fingerprints a resolved round to check exactly that.
//!
//! ## Usage
//!
//! ```rust
//! use reputation_oracle::{resolve_round, ConsensusConfig, EventBounds, Fixed, ReportMatrix, RoundInput};
//!
//! let (yes, no) = (Some(Fixed::ONE), Some(Fixed::ZERO));
//! let input = RoundInput {
//!     reports: ReportMatrix::from_rows(vec![
//!         vec![yes, no],
//!         vec![yes, no],
//!         vec![yes, no],
//!         vec![no, yes],
//!     ])
//!     .unwrap(),
//!     reputation: vec![Fixed::ONE; 4],
//!     events: vec![EventBounds::binary(); 2],
//! };
//! let outcome = resolve_round(&input, &ConsensusConfig::default()).unwrap();
//! assert_eq!(outcome.outcomes, vec![Fixed::ONE, Fixed::ZERO]);
//! assert!(outcome.reputation[3] < Fixed::ONE);
//! ```
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the application (the `oracle` binary installs one).

pub mod adjust;
pub mod calibrate;
pub mod center;
pub mod config;
pub mod consensus;
pub mod data;
pub mod digest;
pub mod error;
pub mod fixed;
pub mod interpolate;
pub mod participation;
pub mod resolve;
pub mod score;
pub mod smooth;
pub mod solver;

pub use config::{ConsensusConfig, ScaledAggregation};
pub use consensus::{resolve_batch, resolve_round};
pub use data::{EventBounds, Matrix, ReportMask, ReportMatrix, RoundInput, RoundOutcome};
pub use digest::{digest_from_hex, digest_to_hex, round_digest, RoundDigest};
pub use error::{ConsensusError, Result};
pub use fixed::Fixed;
pub use solver::{PowerIteration, Solution, SolverState};
