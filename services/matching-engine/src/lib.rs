//! Matching Engine Service
//!
//! Per-pair order books with price-time priority matching, resting market
//! orders, stop triggering driven by reference-price updates, synthetic
//! liquidity for market orders priced off the oracle, and atomic N-party
//! batch settlement over closed token rings.
//!
//! **Key Invariants:**
//! - Price-time priority strictly enforced on the limit lists
//! - No terminal-status record remains in any book list
//! - A price update born from a stop-triggered trade never re-triggers stops
//!   within the same call
//! - Market-price table and its inverse orientation stay consistent

pub mod batch;
pub mod book;
pub mod engine;
pub mod store;

pub use batch::{BatchError, BatchResult};
pub use book::{BookSnapshot, DepthSnapshot};
pub use engine::{EngineConfig, EngineError, MarketPriceEntry, MatchingEngine};
pub use store::OrderFilter;
