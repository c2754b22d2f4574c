//! Domain types
//!
//! Pure domain primitives without infrastructure dependencies.

mod amount;
mod context;
mod error;

pub use amount::{Amount, AmountError, Balance, MINOR_SCALE};
pub use context::ActorContext;
pub use error::DomainError;
