//! The internal marketplace currency.

use serde::{Deserialize, Serialize};

/// An amount of marketplace credits.
///
/// Credits are whole units and never negative. Arithmetic is checked so a
/// balance can neither underflow below zero nor silently wrap.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "i64")]
pub struct Credits(i64);

/// Error returned when constructing credits from a negative amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegativeCredits(pub i64);

impl std::fmt::Display for NegativeCredits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "credit amounts cannot be negative (got {})", self.0)
    }
}

impl std::error::Error for NegativeCredits {}

impl Credits {
    /// Creates a credit amount, rejecting negative values.
    pub fn new(amount: i64) -> Result<Self, NegativeCredits> {
        if amount < 0 {
            Err(NegativeCredits(amount))
        } else {
            Ok(Self(amount))
        }
    }

    /// Zero credits.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the raw amount.
    pub fn amount(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts, returning `None` on overflow.
    pub fn checked_add(self, other: Credits) -> Option<Credits> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Subtracts `other`, returning `None` if the result would be negative.
    pub fn checked_sub(self, other: Credits) -> Option<Credits> {
        match self.0.checked_sub(other.0) {
            Some(v) if v >= 0 => Some(Self(v)),
            _ => None,
        }
    }

    /// Returns true if this balance covers `price`.
    pub fn covers(&self, price: Credits) -> bool {
        self.0 >= price.0
    }
}

impl std::fmt::Display for Credits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<i64> for Credits {
    type Error = NegativeCredits;

    fn try_from(amount: i64) -> Result<Self, Self::Error> {
        Self::new(amount)
    }
}

impl From<Credits> for i64 {
    fn from(credits: Credits) -> Self {
        credits.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_amounts() {
        assert_eq!(Credits::new(-1), Err(NegativeCredits(-1)));
        assert_eq!(Credits::new(0).unwrap(), Credits::zero());
        assert!(Credits::zero().is_zero());
    }

    #[test]
    fn checked_sub_stops_at_zero() {
        let fifty = Credits::new(50).unwrap();
        let twenty = Credits::new(20).unwrap();
        assert_eq!(fifty.checked_sub(twenty), Some(Credits::new(30).unwrap()));
        assert_eq!(twenty.checked_sub(fifty), None);
        assert_eq!(twenty.checked_sub(twenty), Some(Credits::zero()));
    }

    #[test]
    fn checked_add_detects_overflow() {
        let max = Credits::new(i64::MAX).unwrap();
        assert_eq!(max.checked_add(Credits::new(1).unwrap()), None);
        assert_eq!(
            Credits::new(5).unwrap().checked_add(Credits::new(20).unwrap()),
            Some(Credits::new(25).unwrap())
        );
    }

    #[test]
    fn covers_compares_against_price() {
        let five = Credits::new(5).unwrap();
        let ten = Credits::new(10).unwrap();
        assert!(!five.covers(ten));
        assert!(ten.covers(ten));
    }

    #[test]
    fn deserialization_rejects_negative() {
        let ok: Credits = serde_json::from_str("42").unwrap();
        assert_eq!(ok.amount(), 42);
        assert!(serde_json::from_str::<Credits>("-3").is_err());
    }
}
