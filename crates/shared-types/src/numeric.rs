//! # Exact Numerics
//!
//! Amounts are arbitrary-precision integers (wei), ratios are arbitrary-precision
//! rationals. Everything here is deterministic: there is no floating point and
//! every rounding step is explicit (`floor` unless the name says otherwise).

use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};

use crate::errors::ParseError;

/// A monetary amount in wei.
pub type Amount = BigInt;

/// An exact ratio.
pub type Ratio = BigRational;

/// Fractional bits of precision used by [`log2_ratio`].
pub const LOG2_PRECISION_BITS: u32 = 64;

/// 10^18, one whole token in wei.
pub fn wei_per_token() -> Amount {
    BigInt::from(10u64).pow(18)
}

/// Parses a decimal integer amount. Hex (`0x`) is accepted for RPC parity.
pub fn parse_amount(s: &str) -> Result<Amount, ParseError> {
    let trimmed = s.trim();
    let parsed = if let Some(hex) = trimmed.strip_prefix("0x") {
        BigInt::parse_bytes(hex.as_bytes(), 16)
    } else {
        BigInt::parse_bytes(trimmed.as_bytes(), 10)
    };
    parsed.ok_or_else(|| ParseError::Amount(s.to_string()))
}

/// Parses a ratio written as `"num/den"`, an integer, or a decimal (`"0.12"`).
pub fn parse_ratio(s: &str) -> Result<Ratio, ParseError> {
    let err = || ParseError::Ratio(s.to_string());
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(err());
    }

    if let Some((num, den)) = trimmed.split_once('/') {
        let num = BigInt::parse_bytes(num.trim().as_bytes(), 10).ok_or_else(err)?;
        let den = BigInt::parse_bytes(den.trim().as_bytes(), 10).ok_or_else(err)?;
        if den.is_zero() {
            return Err(err());
        }
        return Ok(BigRational::new(num, den));
    }

    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(err());
    }
    if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
        return Err(err());
    }

    let digits = format!("{int_part}{frac_part}");
    let numer = BigInt::parse_bytes(digits.as_bytes(), 10).ok_or_else(err)?;
    let scale = u32::try_from(frac_part.len()).map_err(|_| err())?;
    let denom = BigInt::from(10u32).pow(scale);
    let value = BigRational::new(numer, denom);
    Ok(if negative { -value } else { value })
}

/// Canonical `"num/den"` rendering used in storage and the parameter blob.
pub fn format_ratio(r: &Ratio) -> String {
    format!("{}/{}", r.numer(), r.denom())
}

/// `floor(amount × ratio)`.
pub fn mul_ratio_floor(amount: &Amount, ratio: &Ratio) -> Amount {
    (amount * ratio.numer()).div_floor(ratio.denom())
}

/// `ceil(r)` for a non-negative ratio.
pub fn ceil_ratio(r: &Ratio) -> BigInt {
    r.ceil().to_integer()
}

/// `floor(r)`.
pub fn floor_ratio(r: &Ratio) -> BigInt {
    r.floor().to_integer()
}

/// Exact ratio `a / b`; zero when `b` is zero.
pub fn ratio_of(a: &Amount, b: &Amount) -> Ratio {
    if b.is_zero() {
        return Ratio::zero();
    }
    BigRational::new(a.clone(), b.clone())
}

pub fn ratio_from_ints(num: i64, den: i64) -> Ratio {
    BigRational::new(BigInt::from(num), BigInt::from(den))
}

/// True when `0 < r < 1`.
pub fn is_open_unit_interval(r: &Ratio) -> bool {
    r.is_positive() && r < &Ratio::one()
}

/// Deterministic base-2 logarithm of a positive rational, truncated to
/// [`LOG2_PRECISION_BITS`] fractional bits.
///
/// Uses the classic shift-and-square digit recurrence on exact rationals:
/// the integer part comes from normalizing `x` into `[1, 2)`, then each
/// fractional bit is produced by squaring the mantissa. The result is always
/// `≤ log2(x)` and within `2^-LOG2_PRECISION_BITS` of it. Non-positive input
/// yields zero.
pub fn log2_ratio(x: &Ratio) -> Ratio {
    if !x.is_positive() {
        return Ratio::zero();
    }

    let two = Ratio::from_integer(BigInt::from(2));
    let one = Ratio::one();
    let mut mantissa = x.clone();
    let mut int_part: i64 = 0;

    while mantissa >= two {
        mantissa /= &two;
        int_part += 1;
    }
    while mantissa < one {
        mantissa *= &two;
        int_part -= 1;
    }

    // Keep the mantissa bounded: rounding it down to a fixed grid after each
    // squaring never changes an already-emitted bit but stops the
    // numerator/denominator from doubling in size every iteration.
    let grid = BigInt::one() << (2 * LOG2_PRECISION_BITS as usize);
    let mut frac = BigInt::zero();
    for _ in 0..LOG2_PRECISION_BITS {
        mantissa = &mantissa * &mantissa;
        frac <<= 1;
        if mantissa >= two {
            mantissa /= &two;
            frac += 1;
        }
        mantissa = Ratio::new((mantissa.numer() * &grid).div_floor(mantissa.denom()), grid.clone());
        if mantissa < one {
            mantissa = one.clone();
        }
    }

    Ratio::from_integer(BigInt::from(int_part))
        + Ratio::new(frac, BigInt::one() << LOG2_PRECISION_BITS as usize)
}

/// Serde adapter storing an [`Amount`] as a decimal string.
pub mod amount_serde {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_amount(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter storing a [`Ratio`] as `"num/den"`; decimals are accepted on input.
pub mod ratio_serde {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Ratio, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_ratio(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Ratio, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_ratio(&s).map_err(serde::de::Error::custom)
    }
}
