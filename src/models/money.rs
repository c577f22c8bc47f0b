use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An amount of money held in cents.
///
/// On the wire it is a JSON number with two decimal places; requests may also
/// send it as a numeric string (`"100000.00"`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type)]
#[sqlx(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Largest amount a request may carry (99,999,999.99).
    pub const MAX_AMOUNT: Money = Money(99_999_999_99);

    pub fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Rounds to the nearest cent; `None` if the value does not fit.
    pub fn try_from_units(units: f64) -> Option<Self> {
        let cents = (units * 100.0).round();
        (cents.is_finite() && cents.abs() < i64::MAX as f64).then(|| Money(cents as i64))
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    pub fn as_units(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Saturates at the `i64` bounds.
    pub fn times(self, factor: i64) -> Self {
        Money(self.0.saturating_mul(factor))
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

// Saturating, so comparisons against limits stay meaningful for huge values.
impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseMoneyError(String);

impl fmt::Display for ParseMoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid amount: {:?}", self.0)
    }
}

impl std::error::Error for ParseMoneyError {}

impl FromStr for Money {
    type Err = ParseMoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
        match cleaned.parse::<f64>() {
            Ok(units) => Money::try_from_units(units).ok_or_else(|| ParseMoneyError(s.to_string())),
            Err(_) => Err(ParseMoneyError(s.to_string())),
        }
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_units())
    }
}

struct MoneyVisitor;

impl<'de> Visitor<'de> for MoneyVisitor {
    type Value = Money;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a monetary amount as a number or numeric string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
        v.checked_mul(100)
            .map(Money)
            .ok_or_else(|| E::custom("amount out of range"))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
        i64::try_from(v)
            .ok()
            .and_then(|v| v.checked_mul(100))
            .map(Money)
            .ok_or_else(|| E::custom("amount out of range"))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Money, E> {
        Money::try_from_units(v).ok_or_else(|| E::custom("amount out of range"))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
        v.parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MoneyVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_units() {
        let json = serde_json::to_string(&Money::from_cents(888_488)).unwrap();
        assert_eq!(json, "8884.88");
    }

    #[test]
    fn deserializes_numbers_and_strings() {
        let from_int: Money = serde_json::from_str("100000").unwrap();
        let from_float: Money = serde_json::from_str("1234.5").unwrap();
        let from_str: Money = serde_json::from_str("\"100000.00\"").unwrap();
        assert_eq!(from_int, Money::from_cents(10_000_000));
        assert_eq!(from_float, Money::from_cents(123_450));
        assert_eq!(from_str, from_int);
        assert!(serde_json::from_str::<Money>("\"lots\"").is_err());
    }

    #[test]
    fn oversized_amounts_are_rejected_not_wrapped() {
        assert!(serde_json::from_str::<Money>("184467440737095517").is_err());
        assert!(serde_json::from_str::<Money>("-184467440737095517").is_err());
        assert!(serde_json::from_str::<Money>("1e300").is_err());
        assert!("1e300".parse::<Money>().is_err());
        assert!("NaN".parse::<Money>().is_err());
    }

    #[test]
    fn arithmetic_saturates() {
        let huge = Money::from_cents(i64::MAX - 1);
        assert_eq!(huge + Money::from_cents(10), Money::from_cents(i64::MAX));
        assert_eq!(huge.times(36), Money::from_cents(i64::MAX));
        assert!(huge.times(2) > Money::MAX_AMOUNT);
    }

    #[test]
    fn display_keeps_two_decimals() {
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-1250).to_string(), "-12.50");
        assert_eq!("1,800,000".parse::<Money>().unwrap(), Money::from_cents(180_000_000));
    }
}
