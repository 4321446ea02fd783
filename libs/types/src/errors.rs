//! Validation error taxonomy
//!
//! Raised by the canonicalizer and order service before any state changes.

use alloy_primitives::Address;
use thiserror::Error;

/// Draft validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for {field}: {value}")]
    InvalidEnum { field: &'static str, value: String },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unknown token: {0}")]
    UnknownToken(Address),

    #[error("Invalid stop price: {0}")]
    InvalidStopPrice(String),

    #[error("No price source available for market order")]
    MissingPrice,

    #[error("Amount overflows 256 bits: {0}")]
    AmountOverflow(String),

    #[error("Invalid expiry: {0}")]
    InvalidExpiry(String),
}
