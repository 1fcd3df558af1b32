//! Human-readable currency amount parsing.
//!
//! Route configurations may price a resource as `"$0.001"` instead of an
//! atomic amount; [`MoneyAmount`] parses such strings into a precise decimal
//! for mechanism-side conversion to token units.

use regex::Regex;
use rust_decimal::Decimal;
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::LazyLock;

/// A parsed, non-negative monetary amount with decimal precision.
///
/// [`scale`](MoneyAmount::scale) is the number of decimal places and
/// [`mantissa`](MoneyAmount::mantissa) the value as an integer; `"10.50"`
/// has scale 2 and mantissa 1050. Preserving the scale matters when scaling
/// to a token's decimal places.
#[derive(Debug, Clone, PartialEq)]
pub struct MoneyAmount(pub Decimal);

impl MoneyAmount {
    /// Number of decimal places in the original input.
    pub fn scale(&self) -> u32 {
        self.0.scale()
    }

    /// The value as an unsigned integer without the decimal point.
    pub fn mantissa(&self) -> u128 {
        self.0.mantissa().unsigned_abs()
    }
}

/// Errors from parsing a monetary amount.
#[derive(Debug, thiserror::Error)]
pub enum MoneyAmountParseError {
    /// The input string could not be parsed as a number.
    #[error("invalid number format")]
    InvalidFormat,
    /// The value is outside the allowed range.
    #[error("amount must be between {} and {}", constants::MIN_STR, constants::MAX_STR)]
    OutOfRange,
    /// Negative values are not allowed.
    #[error("negative value is not allowed")]
    Negative,
    /// The input has more decimal places than the token supports.
    #[error("too much precision: {money} decimals vs {token} on token")]
    WrongPrecision {
        /// Decimal places in the input.
        money: u32,
        /// Decimal places supported by the token.
        token: u32,
    },
}

mod constants {
    use super::*;

    pub const MIN_STR: &str = "0.000000001";
    pub const MAX_STR: &str = "999999999";

    pub static MIN: LazyLock<Decimal> =
        LazyLock::new(|| Decimal::from_str(MIN_STR).expect("valid decimal"));
    pub static MAX: LazyLock<Decimal> =
        LazyLock::new(|| Decimal::from_str(MAX_STR).expect("valid decimal"));
}

static STRIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\d.\-]+").expect("valid strip regex"));

impl MoneyAmount {
    /// Parses a human-readable currency string.
    ///
    /// Currency symbols, thousand separators, and whitespace are stripped
    /// before parsing. The result must be a non-negative number within the
    /// allowed range.
    pub fn parse(input: &str) -> Result<Self, MoneyAmountParseError> {
        let cleaned = STRIP_RE.replace_all(input, "").to_string();

        let parsed =
            Decimal::from_str(&cleaned).map_err(|_| MoneyAmountParseError::InvalidFormat)?;

        if parsed.is_sign_negative() {
            return Err(MoneyAmountParseError::Negative);
        }
        if parsed < *constants::MIN || parsed > *constants::MAX {
            return Err(MoneyAmountParseError::OutOfRange);
        }

        Ok(MoneyAmount(parsed))
    }
}

impl FromStr for MoneyAmount {
    type Err = MoneyAmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MoneyAmount::parse(s)
    }
}

impl TryFrom<&str> for MoneyAmount {
    type Error = MoneyAmountParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        MoneyAmount::from_str(value)
    }
}

impl Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}
