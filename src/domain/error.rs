//! Domain error types
//!
//! Business rule violations, independent of the web/infrastructure layer.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Debit would drive the company balance negative
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    /// Invalid amount (zero, negative, malformed, or exceeds limit)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Transaction type outside {credit, debit}
    #[error("Invalid transaction type: {0} (must be credit or debit)")]
    InvalidType(String),
}

impl DomainError {
    pub fn insufficient_funds(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientFunds {
            required,
            available,
        }
    }
}

impl From<crate::domain::AmountError> for DomainError {
    fn from(err: crate::domain::AmountError) -> Self {
        Self::InvalidAmount(err.to_string())
    }
}
