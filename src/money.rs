use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;
use thiserror::Error;

/// Monetary amount held as integer minor units (cents).
///
/// Decimal values only appear at the boundary: parsing user input and
/// rendering output. Both round to two places, half away from zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "Decimal", try_from = "Decimal")]
pub struct Money(i64);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("invalid amount '{0}'")]
    Invalid(String),
    #[error("amount {0} is out of range")]
    OutOfRange(Decimal),
}

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Whole major units, e.g. `Money::from_major(50)` is 50.00.
    pub const fn from_major(major: i64) -> Self {
        Money(major * 100)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub fn from_decimal(value: Decimal) -> Result<Self, MoneyError> {
        let scaled = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            * Decimal::ONE_HUNDRED;
        scaled
            .to_i64()
            .map(Money)
            .ok_or(MoneyError::OutOfRange(value))
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// `None` when the sum leaves the representable range.
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim().trim_start_matches('$').replace(',', "");
        let value = raw
            .parse::<Decimal>()
            .map_err(|_| MoneyError::Invalid(s.to_string()))?;
        Money::from_decimal(value)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.to_decimal()
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Money::from_decimal(value)
    }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Money;
    fn neg(self) -> Money {
        Money(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_major_units_into_cents() {
        assert_eq!("12.34".parse::<Money>().unwrap(), Money::from_minor(1234));
        assert_eq!("$1,000".parse::<Money>().unwrap(), Money::from_major(1000));
        assert_eq!("-5".parse::<Money>().unwrap(), Money::from_minor(-500));
    }

    #[test]
    fn rounds_half_away_from_zero_at_the_boundary() {
        assert_eq!("0.005".parse::<Money>().unwrap(), Money::from_minor(1));
        assert_eq!("0.004".parse::<Money>().unwrap(), Money::ZERO);
        assert_eq!("-0.005".parse::<Money>().unwrap(), Money::from_minor(-1));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!("abc".parse::<Money>(), Err(MoneyError::Invalid(_))));
    }

    #[test]
    fn displays_two_places() {
        assert_eq!(Money::from_minor(5).to_string(), "0.05");
        assert_eq!(Money::from_major(50).to_string(), "50.00");
    }

    #[test]
    fn checked_ops_refuse_to_wrap() {
        let near_max = Money::from_minor(i64::MAX - 10);
        assert_eq!(near_max.checked_add(Money::from_minor(100)), None);
        assert_eq!(
            near_max.checked_add(Money::from_minor(10)),
            Some(Money::from_minor(i64::MAX))
        );
        assert_eq!(Money::from_minor(i64::MIN).checked_sub(Money::from_minor(1)), None);
    }

    #[test]
    fn repeated_increments_do_not_drift() {
        let mut total = Money::ZERO;
        for _ in 0..1000 {
            total += "0.10".parse().unwrap();
        }
        assert_eq!(total, Money::from_major(100));
    }
}
