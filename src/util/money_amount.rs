use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

/// A price-like numeric value in human-readable currency format.
/// Accepts strings like `"0.01"`, `"$1,000"`, or `"€20"`.
///
/// Backed by [`Decimal`] so the value keeps exact precision until it is
/// scaled into atomic token units with [`MoneyAmount::atomic`].
#[derive(Debug, Clone, PartialEq)]
pub struct MoneyAmount(Decimal);

#[derive(Debug, thiserror::Error)]
pub enum MoneyAmountParseError {
    #[error("Invalid number format")]
    InvalidFormat,
    #[error("Amount must be between {} and {}", bounds::MIN_STR, bounds::MAX_STR)]
    OutOfRange,
    #[error("Negative value is not allowed")]
    Negative,
    #[error("Too big of a precision: {amount} vs {token} on token")]
    WrongPrecision { amount: u32, token: u32 },
}

mod bounds {
    use super::*;

    pub const MIN_STR: &str = "0.000000001";
    pub const MAX_STR: &str = "999999999";

    pub static MIN: Lazy<Decimal> = Lazy::new(|| Decimal::from_str(MIN_STR).expect("valid decimal"));
    pub static MAX: Lazy<Decimal> = Lazy::new(|| Decimal::from_str(MAX_STR).expect("valid decimal"));
}

static CLEANUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\d\.\-]+").expect("valid cleanup regex"));

impl MoneyAmount {
    pub fn parse(input: &str) -> Result<Self, MoneyAmountParseError> {
        // Strip currency symbols and thousands separators before parsing.
        let cleaned = CLEANUP.replace_all(input, "");

        let parsed =
            Decimal::from_str(&cleaned).map_err(|_| MoneyAmountParseError::InvalidFormat)?;

        if parsed.is_sign_negative() {
            return Err(MoneyAmountParseError::Negative);
        }

        if parsed < *bounds::MIN || parsed > *bounds::MAX {
            return Err(MoneyAmountParseError::OutOfRange);
        }

        Ok(MoneyAmount(parsed))
    }

    /// Number of digits after the decimal point in the original input.
    pub fn scale(&self) -> u32 {
        self.0.scale()
    }

    /// Absolute mantissa of the decimal value as an unsigned integer.
    /// For example, the mantissa of `12.34` is `1234`.
    pub fn mantissa(&self) -> u128 {
        self.0.mantissa().unsigned_abs()
    }

    /// Scales the amount into atomic units at the given token precision.
    ///
    /// `"0.01"` at 9 decimals becomes `10_000_000`; `"1.00"` at 6 decimals
    /// becomes `1_000_000`. Fails if the input carries more fractional digits
    /// than the token supports, or if the scaled value overflows `u64`.
    pub fn atomic(&self, decimals: u8) -> Result<u64, MoneyAmountParseError> {
        let scale = self.scale();
        let token_scale = u32::from(decimals);
        if scale > token_scale {
            return Err(MoneyAmountParseError::WrongPrecision {
                amount: scale,
                token: token_scale,
            });
        }
        let multiplier = 10u64
            .checked_pow(token_scale - scale)
            .ok_or(MoneyAmountParseError::OutOfRange)?;
        let digits = u64::try_from(self.mantissa()).map_err(|_| MoneyAmountParseError::OutOfRange)?;
        digits
            .checked_mul(multiplier)
            .ok_or(MoneyAmountParseError::OutOfRange)
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
        MoneyAmount::parse(value)
    }
}

impl Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_whole_number() {
        let amount = MoneyAmount::parse("100").unwrap();
        assert_eq!(amount.atomic(6).unwrap(), 100_000_000);
    }

    #[test]
    fn atomic_with_fraction() {
        let amount = MoneyAmount::parse("1.50").unwrap();
        assert_eq!(amount.atomic(6).unwrap(), 1_500_000);
    }

    #[test]
    fn atomic_sol_cent() {
        let amount = MoneyAmount::parse("0.01").unwrap();
        assert_eq!(amount.atomic(9).unwrap(), 10_000_000);
    }

    #[test]
    fn atomic_exact_precision() {
        let amount = MoneyAmount::parse("0.123456789").unwrap();
        assert_eq!(amount.atomic(9).unwrap(), 123_456_789);
    }

    #[test]
    fn atomic_smallest_unit() {
        let amount = MoneyAmount::parse("0.000001").unwrap();
        assert_eq!(amount.atomic(6).unwrap(), 1);
    }

    #[test]
    fn atomic_rejects_excess_precision() {
        let amount = MoneyAmount::parse("1.234").unwrap();
        let err = amount.atomic(2).unwrap_err();
        assert!(matches!(err, MoneyAmountParseError::WrongPrecision { .. }));
    }

    #[test]
    fn parse_with_currency_symbol_and_commas() {
        let amount = MoneyAmount::parse("$1,000.50").unwrap();
        assert_eq!(amount.atomic(6).unwrap(), 1_000_500_000);
    }

    #[test]
    fn parse_rejects_negative() {
        assert!(matches!(
            MoneyAmount::parse("-1"),
            Err(MoneyAmountParseError::Negative)
        ));
    }

    #[test]
    fn parse_rejects_zero() {
        assert!(matches!(
            MoneyAmount::parse("0"),
            Err(MoneyAmountParseError::OutOfRange)
        ));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            MoneyAmount::parse("abc"),
            Err(MoneyAmountParseError::InvalidFormat)
        ));
    }

    #[test]
    fn atomic_overflow_is_out_of_range() {
        let amount = MoneyAmount::parse("999999999").unwrap();
        assert!(matches!(
            amount.atomic(19),
            Err(MoneyAmountParseError::OutOfRange)
        ));
    }
}
