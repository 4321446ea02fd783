//! Order Service
//!
//! Orchestrates the order lifecycle: canonicalizes drafts into on-chain
//! structs, verifies EIP-712 signatures, drives the matching engine behind a
//! single-writer lock, and forwards settlement intents to the on-chain
//! collaborator. Settlement failures are captured on the trade, never
//! propagated back into matching.

pub mod canonicalize;
pub mod chain;
pub mod config;
pub mod error;
pub mod service;
pub mod settlement;

pub use canonicalize::{canonicalize, PreparedOrder};
pub use chain::{ChainClient, ChainError, InMemoryChainClient};
pub use config::CoreConfig;
pub use error::ServiceError;
pub use service::OrderService;
pub use settlement::{ContractOrderView, SettlementAdapter};
