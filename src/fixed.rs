//! Deterministic fixed-point arithmetic.
//!
//! Every quantity the resolution pipeline touches is a [`Fixed`]: a signed
//! integer scaled by `2^64` (Q64.64 stored in an `i128`).  Multiplication,
//! division and square roots are computed with exact 256-bit intermediates
//! and a single, documented rounding step, so any party re-executing a round
//! on any platform obtains bit-identical results.  No floating-point value
//! ever enters the scaled domain; [`Fixed::from_f64`] and [`Fixed::to_f64`]
//! exist for tests and display only.
//!
//! Rounding rule: products and quotients are rounded half away from zero;
//! square roots are floored.

use crate::error::{ConsensusError, Result};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Number of fractional bits in the representation.
pub const FRAC_BITS: u32 = 64;

const LOW_MASK: u128 = u64::MAX as u128;
const MAX_FRACTION_DIGITS: usize = 30;
const DISPLAY_DIGITS: usize = 20;

/// Unsigned 256-bit intermediate used for exact products and quotients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Wide {
    hi: u128,
    lo: u128,
}

impl Wide {
    fn mul(a: u128, b: u128) -> Self {
        let (a0, a1) = (a & LOW_MASK, a >> 64);
        let (b0, b1) = (b & LOW_MASK, b >> 64);
        let p00 = a0 * b0;
        let p01 = a0 * b1;
        let p10 = a1 * b0;
        let p11 = a1 * b1;
        let mid = (p00 >> 64) + (p01 & LOW_MASK) + (p10 & LOW_MASK);
        Wide {
            hi: p11 + (p01 >> 64) + (p10 >> 64) + (mid >> 64),
            lo: (p00 & LOW_MASK) | ((mid & LOW_MASK) << 64),
        }
    }

    fn shl64(v: u128) -> Self {
        Wide {
            hi: v >> 64,
            lo: v << 64,
        }
    }

    fn add_small(self, v: u128) -> Self {
        let (lo, carry) = self.lo.overflowing_add(v);
        Wide {
            hi: self.hi + u128::from(carry),
            lo,
        }
    }

    fn bit(&self, i: u32) -> u128 {
        if i >= 128 {
            (self.hi >> (i - 128)) & 1
        } else {
            (self.lo >> i) & 1
        }
    }

    /// Long division by `d`, rounded half up.  `None` when the quotient
    /// does not fit in 128 bits.
    fn div_round(self, d: u128) -> Option<u128> {
        let mut rem: u128 = 0;
        let mut quot: u128 = 0;
        for i in (0..256u32).rev() {
            let carry = rem >> 127;
            rem = (rem << 1) | self.bit(i);
            let take = carry == 1 || rem >= d;
            if take {
                rem = rem.wrapping_sub(d);
                if i >= 128 {
                    return None;
                }
                quot |= 1u128 << i;
            }
        }
        if rem >= d - rem {
            quot = quot.checked_add(1)?;
        }
        Some(quot)
    }
}

/// A real number represented as `round(x · 2^64)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Fixed(i128);

impl Fixed {
    /// Scaled zero.
    pub const ZERO: Fixed = Fixed(0);
    /// Scaled one (`2^64`).
    pub const ONE: Fixed = Fixed(1 << FRAC_BITS);
    /// Scaled one half.
    pub const HALF: Fixed = Fixed(1 << (FRAC_BITS - 1));
    /// Smallest positive representable value (one scaled unit).
    pub const EPSILON: Fixed = Fixed(1);

    /// Wraps an already-scaled integer.
    pub const fn from_raw(raw: i128) -> Self {
        Fixed(raw)
    }

    /// Returns the underlying scaled integer.
    pub const fn raw(self) -> i128 {
        self.0
    }

    /// Scales an integer into the fixed-point domain.
    pub const fn from_int(v: i64) -> Self {
        Fixed((v as i128) << FRAC_BITS)
    }

    /// Returns `num / den`, rounded to the nearest scaled unit.
    pub fn from_ratio(num: i64, den: i64) -> Result<Self> {
        Fixed::from_int(num).checked_div(Fixed::from_int(den))
    }

    /// Converts a float by rounding `v · 2^64`.  Intended for tests and
    /// human-facing input only.
    pub fn from_f64(v: f64) -> Result<Self> {
        if !v.is_finite() {
            return Err(ConsensusError::DomainError);
        }
        let scaled = (v * 2f64.powi(FRAC_BITS as i32)).round();
        if scaled.abs() >= 2f64.powi(127) {
            return Err(ConsensusError::ArithmeticOverflow);
        }
        Ok(Fixed(scaled as i128))
    }

    /// Approximate float value, for display and tolerance checks.
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / 2f64.powi(FRAC_BITS as i32)
    }

    fn from_parts(negative: bool, magnitude: u128) -> Result<Self> {
        if negative {
            if magnitude > (i128::MAX as u128) + 1 {
                return Err(ConsensusError::ArithmeticOverflow);
            }
            Ok(Fixed((magnitude as i128).wrapping_neg()))
        } else {
            i128::try_from(magnitude)
                .map(Fixed)
                .map_err(|_| ConsensusError::ArithmeticOverflow)
        }
    }

    /// Returns `true` when the value is exactly zero.
    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` when the value is strictly negative.
    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Adds two values.
    #[inline]
    pub fn checked_add(self, rhs: Fixed) -> Result<Self> {
        self.0
            .checked_add(rhs.0)
            .map(Fixed)
            .ok_or(ConsensusError::ArithmeticOverflow)
    }

    /// Subtracts `rhs` from `self`.
    #[inline]
    pub fn checked_sub(self, rhs: Fixed) -> Result<Self> {
        self.0
            .checked_sub(rhs.0)
            .map(Fixed)
            .ok_or(ConsensusError::ArithmeticOverflow)
    }

    /// Negates the value.
    #[inline]
    pub fn checked_neg(self) -> Result<Self> {
        self.0
            .checked_neg()
            .map(Fixed)
            .ok_or(ConsensusError::ArithmeticOverflow)
    }

    /// Absolute value.
    #[inline]
    pub fn checked_abs(self) -> Result<Self> {
        self.0
            .checked_abs()
            .map(Fixed)
            .ok_or(ConsensusError::ArithmeticOverflow)
    }

    /// Multiplies two values using an exact 256-bit product.
    pub fn checked_mul(self, rhs: Fixed) -> Result<Self> {
        let negative = (self.0 < 0) != (rhs.0 < 0);
        let product = Wide::mul(self.0.unsigned_abs(), rhs.0.unsigned_abs())
            .add_small(1u128 << (FRAC_BITS - 1));
        if product.hi >> 64 != 0 {
            return Err(ConsensusError::ArithmeticOverflow);
        }
        let magnitude = (product.hi << 64) | (product.lo >> 64);
        Self::from_parts(negative, magnitude)
    }

    /// Divides `self` by `rhs`.
    ///
    /// Fails with [`ConsensusError::DivisionByZero`] when `rhs` is zero.
    pub fn checked_div(self, rhs: Fixed) -> Result<Self> {
        if rhs.0 == 0 {
            return Err(ConsensusError::DivisionByZero);
        }
        let negative = (self.0 < 0) != (rhs.0 < 0);
        let magnitude = Wide::shl64(self.0.unsigned_abs())
            .div_round(rhs.0.unsigned_abs())
            .ok_or(ConsensusError::ArithmeticOverflow)?;
        Self::from_parts(negative, magnitude)
    }

    /// Floored square root.
    ///
    /// Fails with [`ConsensusError::DomainError`] for negative input.
    pub fn checked_sqrt(self) -> Result<Self> {
        if self.0 < 0 {
            return Err(ConsensusError::DomainError);
        }
        // sqrt(a / 2^64) · 2^64 == sqrt(a · 2^64); the root stays below 2^96.
        let target = Wide::shl64(self.0 as u128);
        let (mut lo, mut hi) = (0u128, 1u128 << 96);
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if Wide::mul(mid, mid) <= target {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        Ok(Fixed(lo as i128))
    }

    /// Clamps negative values to zero.
    #[inline]
    pub fn clamp_non_negative(self) -> Self {
        if self.0 < 0 {
            Fixed::ZERO
        } else {
            self
        }
    }
}

/// Sums a sequence of values, failing on overflow.
pub fn checked_sum<I>(values: I) -> Result<Fixed>
where
    I: IntoIterator<Item = Fixed>,
{
    values
        .into_iter()
        .try_fold(Fixed::ZERO, |acc, v| acc.checked_add(v))
}

/// Inner product of two equally long slices.
pub fn dot(a: &[Fixed], b: &[Fixed]) -> Result<Fixed> {
    debug_assert_eq!(a.len(), b.len(), "dot product length mismatch");
    a.iter()
        .zip(b)
        .try_fold(Fixed::ZERO, |acc, (&x, &y)| acc.checked_add(x.checked_mul(y)?))
}

/// Rescales non-negative weights so they sum to one.
///
/// Fails with [`ConsensusError::DivisionByZero`] when the weights sum to zero.
pub fn normalize(weights: &[Fixed]) -> Result<Vec<Fixed>> {
    let total = checked_sum(weights.iter().copied())?;
    weights.iter().map(|w| w.checked_div(total)).collect()
}

/// Euclidean norm of a vector.
pub fn norm(v: &[Fixed]) -> Result<Fixed> {
    dot(v, v)?.checked_sqrt()
}

/// The value every entry with non-zero weight shares, if there is one.
///
/// Weighted sums of identical values drift by a few scaled units when the
/// weights do not sum to exactly one; callers use this to keep such columns
/// exact.
pub fn agreed_value(values: &[Fixed], weights: &[Fixed]) -> Option<Fixed> {
    let mut backed = values
        .iter()
        .zip(weights)
        .filter(|(_, w)| !w.is_zero())
        .map(|(&v, _)| v);
    let first = backed.next()?;
    backed.all(|v| v == first).then_some(first)
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let magnitude = self.0.unsigned_abs();
        let sign = if self.0 < 0 { "-" } else { "" };
        let int = magnitude >> FRAC_BITS;
        let mut frac = magnitude & LOW_MASK;
        if frac == 0 {
            return write!(f, "{sign}{int}");
        }
        let mut digits = String::with_capacity(DISPLAY_DIGITS);
        while frac != 0 && digits.len() < DISPLAY_DIGITS {
            frac *= 10;
            digits.push(char::from(b'0' + (frac >> FRAC_BITS) as u8));
            frac &= LOW_MASK;
        }
        write!(f, "{sign}{int}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for Fixed {
    type Err = ConsensusError;

    /// Parses a plain decimal such as `-16027.59` exactly (no float step).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
        let well_formed = !(int_part.is_empty() && frac_part.is_empty())
            && int_part.bytes().all(|b| b.is_ascii_digit())
            && frac_part.bytes().all(|b| b.is_ascii_digit())
            && frac_part.len() <= MAX_FRACTION_DIGITS;
        if !well_formed {
            return Err(ConsensusError::Parse(format!("invalid decimal `{s}`")));
        }
        let int: u128 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| ConsensusError::ArithmeticOverflow)?
        };
        if int >> 64 != 0 {
            return Err(ConsensusError::ArithmeticOverflow);
        }
        let mut magnitude = int << FRAC_BITS;
        if !frac_part.is_empty() {
            let numerator: u128 = frac_part
                .parse()
                .map_err(|_| ConsensusError::Parse(format!("invalid decimal `{s}`")))?;
            let denominator = 10u128.pow(frac_part.len() as u32);
            let frac = Wide::shl64(numerator)
                .div_round(denominator)
                .ok_or(ConsensusError::ArithmeticOverflow)?;
            magnitude = magnitude
                .checked_add(frac)
                .ok_or(ConsensusError::ArithmeticOverflow)?;
        }
        Self::from_parts(negative, magnitude)
    }
}

impl Serialize for Fixed {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Fixed {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(FixedVisitor)
    }
}

struct FixedVisitor;

impl<'de> de::Visitor<'de> for FixedVisitor {
    type Value = Fixed;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a decimal string or number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Fixed, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Fixed, E> {
        Ok(Fixed::from_int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Fixed, E> {
        i64::try_from(v)
            .map(Fixed::from_int)
            .map_err(|_| E::custom(ConsensusError::ArithmeticOverflow))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Fixed, E> {
        Fixed::from_f64(v).map_err(E::custom)
    }
}
