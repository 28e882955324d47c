//! Pattern learning
//!
//! Turns finished executions into pattern outcomes and moves good patterns
//! between similar domains.

mod reduce;
mod transfer;

pub use reduce::{reduce_outcomes, PatternOutcome};
pub use transfer::{PatternTransfer, TransferReport};
