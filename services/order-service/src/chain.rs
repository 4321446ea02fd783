//! On-chain collaborator
//!
//! The settlement contract is consumed through this trait; the real
//! implementation lives with the deployment, the in-memory double backs
//! tests and the reference binary.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use types::order::CanonicalOrder;

/// Chain dispatch errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("No settlement signer configured")]
    SignerMissing,

    #[error("Nonce mismatch for {maker}: expected {expected}, got {got}")]
    NonceMismatch {
        maker: Address,
        expected: U256,
        got: U256,
    },

    #[error("Contract reverted: {0}")]
    Revert(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Settlement contract surface consumed by the service
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_nonce(&self, maker: Address) -> Result<U256, ChainError>;

    /// Settle a fill; returns a transaction reference
    async fn execute_order(
        &self,
        order: &CanonicalOrder,
        signature: &str,
        fill_amount: U256,
    ) -> Result<String, ChainError>;

    async fn execute_market_order(
        &self,
        order: &CanonicalOrder,
        signature: &str,
        max_slippage: U256,
    ) -> Result<String, ChainError>;

    async fn cancel_order(&self, order: &CanonicalOrder) -> Result<String, ChainError>;

    async fn cancel_orders(&self, orders: &[CanonicalOrder]) -> Result<String, ChainError>;

    async fn increment_nonce(&self) -> Result<String, ChainError>;

    async fn balance_of(&self, user: Address, token: Address) -> Result<U256, ChainError>;
}

/// Recorded `execute_order` call on the in-memory double
#[derive(Debug, Clone)]
pub struct ExecutedFill {
    pub maker: Address,
    pub fill_amount: U256,
}

/// Deterministic chain double for tests and the reference binary
#[derive(Debug, Default)]
pub struct InMemoryChainClient {
    nonces: Mutex<HashMap<Address, U256>>,
    executed: Mutex<Vec<ExecutedFill>>,
    /// When set, every dispatch fails with this revert reason
    revert_with: Option<String>,
}

impl InMemoryChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A double whose dispatches always revert
    pub fn reverting(reason: impl Into<String>) -> Self {
        Self {
            revert_with: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn set_nonce(&self, maker: Address, nonce: U256) {
        self.nonces.lock().expect("nonce lock").insert(maker, nonce);
    }

    pub fn executed_fills(&self) -> Vec<ExecutedFill> {
        self.executed.lock().expect("executed lock").clone()
    }

    fn check_revert(&self) -> Result<(), ChainError> {
        match &self.revert_with {
            Some(reason) => Err(ChainError::Revert(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChainClient for InMemoryChainClient {
    async fn get_nonce(&self, maker: Address) -> Result<U256, ChainError> {
        Ok(self
            .nonces
            .lock()
            .expect("nonce lock")
            .get(&maker)
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn execute_order(
        &self,
        order: &CanonicalOrder,
        _signature: &str,
        fill_amount: U256,
    ) -> Result<String, ChainError> {
        self.check_revert()?;
        self.executed.lock().expect("executed lock").push(ExecutedFill {
            maker: order.maker,
            fill_amount,
        });
        Ok(format!("0x{:064x}", self.executed_fills().len()))
    }

    async fn execute_market_order(
        &self,
        order: &CanonicalOrder,
        _signature: &str,
        _max_slippage: U256,
    ) -> Result<String, ChainError> {
        self.check_revert()?;
        self.executed.lock().expect("executed lock").push(ExecutedFill {
            maker: order.maker,
            fill_amount: order.amount_give,
        });
        Ok(format!("0x{:064x}", self.executed_fills().len()))
    }

    async fn cancel_order(&self, _order: &CanonicalOrder) -> Result<String, ChainError> {
        self.check_revert()?;
        Ok("0x0".into())
    }

    async fn cancel_orders(&self, _orders: &[CanonicalOrder]) -> Result<String, ChainError> {
        self.check_revert()?;
        Ok("0x0".into())
    }

    async fn increment_nonce(&self) -> Result<String, ChainError> {
        self.check_revert()?;
        Ok("0x0".into())
    }

    async fn balance_of(&self, _user: Address, _token: Address) -> Result<U256, ChainError> {
        Ok(U256::MAX)
    }
}
