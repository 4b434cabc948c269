//! Deterministic round digests.
//!
//! A digest commits to a round's inputs and its resolved outcome so two
//! parties can confirm they computed the same result.  Every value is mixed
//! as its raw Q64.64 integer, never as a float or decimal string, so the
//! digest is identical on every platform.

use crate::data::{RoundInput, RoundOutcome};
use crate::error::{ConsensusError, Result};
use crate::fixed::Fixed;
use blake2::digest::{consts::U32, Digest};
use blake2::Blake2b;

/// 32-byte BLAKE2b digest of a resolved round.
pub type RoundDigest = [u8; 32];

type Blake2b256 = Blake2b<U32>;

const ROUND_DOMAIN: &[u8] = b"ORACLE_ROUND_V1";

fn mix_u64(hasher: &mut Blake2b256, value: u64) {
    hasher.update(value.to_be_bytes());
}

fn mix_fixed(hasher: &mut Blake2b256, value: Fixed) {
    hasher.update(value.raw().to_be_bytes());
}

fn mix_list(hasher: &mut Blake2b256, values: &[Fixed]) {
    mix_u64(hasher, values.len() as u64);
    for &value in values {
        mix_fixed(hasher, value);
    }
}

fn mix_input(hasher: &mut Blake2b256, input: &RoundInput) {
    let reports = &input.reports;
    mix_u64(hasher, reports.num_reporters() as u64);
    mix_u64(hasher, reports.num_events() as u64);
    for i in 0..reports.num_reporters() {
        for cell in reports.row(i) {
            match *cell {
                Some(value) => {
                    hasher.update([1u8]);
                    mix_fixed(hasher, value);
                }
                None => hasher.update([0u8]), // missing marker
            }
        }
    }
    mix_list(hasher, &input.reputation);
    for bounds in &input.events {
        hasher.update([u8::from(bounds.scaled)]);
        mix_fixed(hasher, bounds.min);
        mix_fixed(hasher, bounds.max);
    }
}

/// Digest over the round input and the fields of its outcome that other
/// parties act on: outcomes, certainty, reputation, bonus and the
/// imputation mask.
pub fn round_digest(input: &RoundInput, outcome: &RoundOutcome) -> RoundDigest {
    let mut hasher = Blake2b256::new();
    hasher.update(ROUND_DOMAIN);
    mix_input(&mut hasher, input);
    mix_list(&mut hasher, &outcome.outcomes);
    mix_list(&mut hasher, &outcome.certainty);
    mix_list(&mut hasher, &outcome.reputation);
    mix_list(&mut hasher, &outcome.bonus);
    let mask = &outcome.mask;
    mix_u64(&mut hasher, mask.num_events() as u64);
    mix_u64(&mut hasher, mask.cells().len() as u64);
    for &imputed in mask.cells() {
        hasher.update([u8::from(imputed)]);
    }
    mix_u64(&mut hasher, u64::from(outcome.iterations));
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Lower-case hex rendering of a digest.
pub fn digest_to_hex(digest: &RoundDigest) -> String {
    hex::encode(digest)
}

/// Parses a 64-character hex digest.
pub fn digest_from_hex(text: &str) -> Result<RoundDigest> {
    let bytes = hex::decode(text.trim().trim_start_matches("0x"))
        .map_err(|err| ConsensusError::Parse(format!("digest: {err}")))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        ConsensusError::Parse(format!("digest: expected 32 bytes, got {}", bytes.len()))
    })
}
