//! erpLedger Library
//!
//! Company money ledger backend: transaction recording coupled to atomic
//! cached-balance accounting. Re-exports modules for integration testing and
//! external use.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod ledger;

pub use config::Config;
pub use domain::{ActorContext, Amount, AmountError, Balance, DomainError};
pub use error::{AppError, AppResult};
pub use ledger::{LedgerService, TransactionType};
