//! Shared utilities: human-readable money amounts.

pub mod money_amount;

pub use money_amount::{MoneyAmount, MoneyAmountParseError};
