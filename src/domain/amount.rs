//! Amount and Balance types
//!
//! Domain primitives for monetary values, stored as integer minor units
//! (cents) so balance arithmetic never accumulates floating-point drift.
//! All values are validated at construction time, ensuring invalid amounts
//! cannot exist in the system.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Minor units per whole currency unit (2 decimal places).
pub const MINOR_SCALE: u32 = 2;

const MINOR_PER_UNIT: i64 = 100;

/// Maximum representable value: 1 trillion whole units, in minor units.
const MAX_AMOUNT_MINOR: i64 = 1_000_000_000_000 * MINOR_PER_UNIT;

/// Amount is a validated, strictly positive monetary value in minor units.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - At most 2 decimal places when parsed from a decimal representation
/// - Never exceeds 1 trillion whole units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount(i64);

/// Errors that can occur when creating an Amount or Balance
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Amount has too many decimal places (max {MINOR_SCALE}, got {0})")]
    TooManyDecimals(u32),

    #[error("Amount exceeds maximum allowed value")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl Amount {
    /// Create an Amount from a minor-unit count.
    pub fn from_minor(minor: i64) -> Result<Self, AmountError> {
        if minor <= 0 {
            return Err(AmountError::NotPositive(Decimal::new(minor, MINOR_SCALE)));
        }
        if minor > MAX_AMOUNT_MINOR {
            return Err(AmountError::Overflow);
        }
        Ok(Self(minor))
    }

    /// Create an Amount from a decimal value with validation.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if value <= 0
    /// - `AmountError::TooManyDecimals` if more than 2 decimal places
    /// - `AmountError::Overflow` if value exceeds 1 trillion
    pub fn from_decimal(value: Decimal) -> Result<Self, AmountError> {
        let value = value.normalize();
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }
        if value.scale() > MINOR_SCALE {
            return Err(AmountError::TooManyDecimals(value.scale()));
        }

        let minor = (value * Decimal::from(MINOR_PER_UNIT))
            .to_i64()
            .ok_or(AmountError::Overflow)?;
        Self::from_minor(minor)
    }

    /// Create an Amount from a whole number of currency units.
    pub fn from_integer(value: i64) -> Result<Self, AmountError> {
        Self::from_decimal(Decimal::from(value))
    }

    /// Create an Amount from a float, as sent by JSON clients.
    pub fn from_f64(value: f64) -> Result<Self, AmountError> {
        if !value.is_finite() {
            return Err(AmountError::ParseError(format!(
                "not a finite number: {value}"
            )));
        }
        let decimal = Decimal::from_f64(value)
            .ok_or_else(|| AmountError::ParseError(format!("unrepresentable number: {value}")))?;
        Self::from_decimal(decimal)
    }

    /// The value in minor units.
    pub fn minor(&self) -> i64 {
        self.0
    }

    /// The value as a decimal in whole units.
    pub fn as_decimal(&self) -> Decimal {
        Decimal::new(self.0, MINOR_SCALE)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_decimal())
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal =
            Decimal::from_str(s.trim()).map_err(|e| AmountError::ParseError(e.to_string()))?;
        Amount::from_decimal(decimal)
    }
}

/// Accepts the amount shapes clients actually send: a JSON number or a
/// decimal string.
impl TryFrom<&serde_json::Value> for Amount {
    type Error = AmountError;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::String(s) => s.parse(),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Amount::from_integer(i)
                } else {
                    let f = n
                        .as_f64()
                        .ok_or_else(|| AmountError::ParseError(n.to_string()))?;
                    Amount::from_f64(f)
                }
            }
            other => Err(AmountError::ParseError(format!(
                "expected a number or decimal string, got {other}"
            ))),
        }
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Fully qualified: Decimal has an inherent `serialize` method that
        // would shadow the trait method here.
        serde::Serialize::serialize(&self.as_decimal(), serializer)
    }
}

/// Balance is a company's cached ledger total (zero or positive).
/// Unlike Amount, Balance can be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Balance(i64);

impl Balance {
    /// Create a balance from a minor-unit count (zero or positive).
    pub fn from_minor(minor: i64) -> Result<Self, AmountError> {
        if minor < 0 {
            return Err(AmountError::NotPositive(Decimal::new(minor, MINOR_SCALE)));
        }
        if minor > MAX_AMOUNT_MINOR {
            return Err(AmountError::Overflow);
        }
        Ok(Self(minor))
    }

    /// Zero balance (new companies start here).
    pub fn zero() -> Self {
        Self(0)
    }

    /// The value in minor units.
    pub fn minor(&self) -> i64 {
        self.0
    }

    /// The value as a decimal in whole units.
    pub fn as_decimal(&self) -> Decimal {
        Decimal::new(self.0, MINOR_SCALE)
    }

    /// Check whether the balance covers a debit of `amount`.
    pub fn is_sufficient_for(&self, amount: &Amount) -> bool {
        self.0 >= amount.minor()
    }

    /// Add an amount to the balance.
    pub fn credit(&self, amount: &Amount) -> Result<Balance, AmountError> {
        let minor = self
            .0
            .checked_add(amount.minor())
            .ok_or(AmountError::Overflow)?;
        Balance::from_minor(minor)
    }

    /// Subtract an amount from the balance. Fails if the result would be
    /// negative; draining to exactly zero is allowed.
    pub fn debit(&self, amount: &Amount) -> Result<Balance, AmountError> {
        Balance::from_minor(self.0 - amount.minor())
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_decimal())
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::zero()
    }
}

impl Serialize for Balance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde::Serialize::serialize(&self.as_decimal(), serializer)
    }
}
