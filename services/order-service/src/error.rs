//! Service error taxonomy

use matching_engine::{BatchError, EngineError};
use thiserror::Error;
use typed_data::SignatureError;
use types::errors::ValidationError;

use crate::chain::ChainError;

/// Top-level order-service error
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Signature error: {0}")]
    Signature(#[from] SignatureError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Batch error: {0}")]
    Batch(#[from] BatchError),

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Order not found: {0}")]
    NotFound(uuid::Uuid),
}
