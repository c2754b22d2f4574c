//! Company ledger
//!
//! The append-only sequence of money movements per company, plus the cached
//! balance the movements project into. [`LedgerService`] is the single writer
//! of that balance.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{Amount, DomainError};

mod service;

pub use service::LedgerService;

/// Direction of a money movement relative to the company balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Credit,
    Debit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }

    /// Balance delta in minor units for a movement of `amount`.
    pub fn signed_minor(&self, amount: &Amount) -> i64 {
        match self {
            Self::Credit => amount.minor(),
            Self::Debit => -amount.minor(),
        }
    }
}

impl FromStr for TransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(Self::Credit),
            "debit" => Ok(Self::Debit),
            other => Err(DomainError::InvalidType(other.to_string())),
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted money movement, with attribution resolved.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub company_id: Uuid,
    pub amount: Amount,
    pub entry_type: TransactionType,
    pub description: Option<String>,
    pub order_number: Option<String>,
    pub created_by: Uuid,
    pub created_by_name: String,
    pub created_at: DateTime<Utc>,
}

/// Command to record a new money movement against a company.
#[derive(Debug, Clone)]
pub struct RecordTransaction {
    pub company_id: Uuid,
    pub amount: Amount,
    pub entry_type: TransactionType,
    pub description: Option<String>,
    pub order_number: Option<String>,
}

impl RecordTransaction {
    pub fn new(company_id: Uuid, amount: Amount, entry_type: TransactionType) -> Self {
        Self {
            company_id,
            amount,
            entry_type,
            description: None,
            order_number: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_order_number(mut self, order_number: impl Into<String>) -> Self {
        self.order_number = Some(order_number.into());
        self
    }
}

/// Non-financial fields of a transaction that may change after creation.
/// A `None` field is left untouched. Amount and company are immutable by
/// design: changing either would desynchronize the cached balance. A type
/// change is allowed but re-derives the balance delta atomically.
#[derive(Debug, Clone, Default)]
pub struct UpdateTransactionMetadata {
    pub description: Option<String>,
    pub order_number: Option<String>,
    pub entry_type: Option<TransactionType>,
}

impl UpdateTransactionMetadata {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.order_number.is_none() && self.entry_type.is_none()
    }
}

/// Filters for listing transactions.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub company_id: Option<Uuid>,
    pub entry_type: Option<TransactionType>,
}

/// Result of comparing a cached balance against the summed ledger.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceReconciliation {
    pub company_id: Uuid,
    pub cached_balance: Decimal,
    pub ledger_balance: Decimal,
    pub consistent: bool,
}
