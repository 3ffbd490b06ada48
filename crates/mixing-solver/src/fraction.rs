//! Dyadic fractions: fixed-point values of the form `numerator / 2^exponent`.
//!
//! Values are not reduced automatically. Equality, ordering and hashing all
//! work on the represented value, so `1/2` and `2/4` compare equal.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Exponents at or above this bound cannot be targeted by `set_precision`.
pub const MAX_EXPONENT: u8 = 64;

/// Errors raised while parsing or operating on dyadic fractions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FractionError {
    #[error("cannot parse \"{input}\" as a fraction: {reason}")]
    Parse { input: String, reason: &'static str },

    #[error("division by zero in fraction \"{0}\"")]
    DivisionByZero(String),

    #[error("denominator of \"{0}\" is not a power of two")]
    NotPowerOfTwo(String),

    #[error("precision of {exponent} is out of bounds")]
    ExponentOutOfRange { exponent: u16 },

    #[error("cannot decrease precision of {value} to {precision}")]
    PrecisionLoss { value: DyadicFraction, precision: u8 },

    #[error("{value} does not fit in 64 bits at precision {precision}")]
    PrecisionOverflow { value: DyadicFraction, precision: u8 },

    #[error("cannot mix {left} and {right}: sum of numerators is out of bounds")]
    ArithmeticOverflow {
        left: DyadicFraction,
        right: DyadicFraction,
    },
}

/// A fraction whose denominator is a power of two
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DyadicFraction {
    numerator: u64,
    exponent: u8,
}

impl DyadicFraction {
    pub const ZERO: Self = Self::new(0, 0);
    pub const ONE: Self = Self::new(1, 0);

    pub const fn new(numerator: u64, exponent: u8) -> Self {
        Self {
            numerator,
            exponent,
        }
    }

    pub fn numerator(self) -> u64 {
        self.numerator
    }

    pub fn exponent(self) -> u8 {
        self.exponent
    }

    /// Lowest exponent this value can be written with.
    pub fn min_exponent(self) -> u8 {
        self.reduce().exponent
    }

    /// Strip common factors of two. Zero always reduces to `0/1`.
    #[must_use]
    pub fn reduce(self) -> Self {
        if self.numerator == 0 {
            return Self::ZERO;
        }
        let shift = self.numerator.trailing_zeros().min(u32::from(self.exponent));
        Self {
            numerator: self.numerator >> shift,
            exponent: self.exponent - shift as u8,
        }
    }

    /// Rewrite the value with denominator `2^precision`.
    ///
    /// Fails when `precision` is 64 or more, when the value needs a finer
    /// denominator than requested, or when the rescaled numerator would not
    /// fit in 64 bits.
    pub fn set_precision(self, precision: u8) -> Result<Self, FractionError> {
        if precision >= MAX_EXPONENT {
            return Err(FractionError::ExponentOutOfRange {
                exponent: precision.into(),
            });
        }
        let reduced = self.reduce();
        if precision < reduced.exponent {
            return Err(FractionError::PrecisionLoss {
                value: self,
                precision,
            });
        }
        let shift = u32::from(precision - reduced.exponent);
        if reduced.numerator.leading_zeros() < shift {
            return Err(FractionError::PrecisionOverflow {
                value: self,
                precision,
            });
        }
        Ok(Self::new(reduced.numerator << shift, precision))
    }

    /// Average of two values, reduced.
    ///
    /// Both operands are brought to the larger exponent, their numerators are
    /// summed and the denominator doubled.
    pub fn mix(self, other: Self) -> Result<Self, FractionError> {
        let precision = self.exponent.max(other.exponent);
        let left = self.aligned(precision)?;
        let right = other.aligned(precision)?;

        let sum = left
            .numerator
            .checked_add(right.numerator)
            .ok_or(FractionError::ArithmeticOverflow { left: self, right: other })?;
        let exponent = precision
            .checked_add(1)
            .ok_or(FractionError::ExponentOutOfRange {
                exponent: u16::from(precision) + 1,
            })?;

        Ok(Self::new(sum, exponent).reduce())
    }

    fn aligned(self, precision: u8) -> Result<Self, FractionError> {
        if self.exponent == precision {
            Ok(self)
        } else {
            self.set_precision(precision)
        }
    }
}

/// Compare `numerator * 2^shift` against `other` without overflowing.
fn compare_scaled(numerator: u64, shift: u8, other: u64) -> Ordering {
    if numerator == 0 {
        return 0.cmp(&other);
    }
    if shift >= 64 {
        // numerator * 2^64 exceeds every u64
        return Ordering::Greater;
    }
    (u128::from(numerator) << shift).cmp(&u128::from(other))
}

impl Ord for DyadicFraction {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.exponent.cmp(&other.exponent) {
            Ordering::Equal => self.numerator.cmp(&other.numerator),
            Ordering::Less => {
                compare_scaled(self.numerator, other.exponent - self.exponent, other.numerator)
            }
            Ordering::Greater => {
                compare_scaled(other.numerator, self.exponent - other.exponent, self.numerator)
                    .reverse()
            }
        }
    }
}

impl PartialOrd for DyadicFraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DyadicFraction {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DyadicFraction {}

impl Hash for DyadicFraction {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let reduced = self.reduce();
        reduced.numerator.hash(state);
        reduced.exponent.hash(state);
    }
}

impl fmt::Display for DyadicFraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exponent == 0 || self.numerator == 0 {
            write!(f, "{}", self.numerator)
        } else if self.exponent < 128 {
            write!(f, "{}/{}", self.numerator, 1u128 << self.exponent)
        } else {
            write!(f, "{}/2^{}", self.numerator, self.exponent)
        }
    }
}

fn parse_digits(input: &str, part: &str, what: &'static str) -> Result<u64, FractionError> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FractionError::Parse {
            input: input.to_string(),
            reason: what,
        });
    }
    part.parse().map_err(|_| FractionError::Parse {
        input: input.to_string(),
        reason: "value does not fit in 64 bits",
    })
}

impl FromStr for DyadicFraction {
    type Err = FractionError;

    /// Accepts `N` or `N/D`, where `D` is a non-zero power of two.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (numerator, denominator) = match input.split_once('/') {
            Some((numerator, denominator)) => (numerator, Some(denominator)),
            None => (input, None),
        };

        let numerator = parse_digits(input, numerator, "numerator is not an integer")?;
        let Some(denominator) = denominator else {
            return Ok(Self::new(numerator, 0));
        };

        let denominator = parse_digits(input, denominator, "denominator is not an integer")?;
        if denominator == 0 {
            return Err(FractionError::DivisionByZero(input.to_string()));
        }
        if !denominator.is_power_of_two() {
            return Err(FractionError::NotPowerOfTwo(input.to_string()));
        }

        Ok(Self::new(numerator, denominator.trailing_zeros() as u8))
    }
}

impl TryFrom<String> for DyadicFraction {
    type Error = FractionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DyadicFraction> for String {
    fn from(value: DyadicFraction) -> Self {
        value.to_string()
    }
}
