//! Token metadata and trading-pair keys
//!
//! Tokens are identified by their 20-byte ERC-20 address. Pair keys use the
//! lowercase hex form so lookups are case-insensitive.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Decimals assumed for tokens the directory does not know
pub const DEFAULT_DECIMALS: u8 = 18;

/// ERC-20 token metadata as reported by the token directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_supply: Option<U256>,
}

impl TokenInfo {
    pub fn new(address: Address, name: impl Into<String>, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            address,
            name: name.into(),
            symbol: symbol.into(),
            decimals,
            total_supply: None,
        }
    }

    pub fn with_total_supply(mut self, total_supply: U256) -> Self {
        self.total_supply = Some(total_supply);
        self
    }
}

/// Token directory collaborator
///
/// The engine never fails on an unknown token; decimals fall back to
/// [`DEFAULT_DECIMALS`].
pub trait TokenDirectory: Send + Sync {
    /// Look up metadata for a token address
    fn metadata(&self, token: Address) -> Option<TokenInfo>;

    /// Decimals for a token, defaulting to 18 when unknown
    fn decimals(&self, token: Address) -> u8 {
        self.metadata(token)
            .map(|info| info.decimals)
            .unwrap_or(DEFAULT_DECIMALS)
    }
}

/// In-memory token directory used by tests and the reference binary
#[derive(Debug, Clone, Default)]
pub struct InMemoryTokenDirectory {
    tokens: HashMap<Address, TokenInfo>,
}

impl InMemoryTokenDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, info: TokenInfo) {
        self.tokens.insert(info.address, info);
    }

    pub fn with_token(mut self, info: TokenInfo) -> Self {
        self.insert(info);
        self
    }
}

impl TokenDirectory for InMemoryTokenDirectory {
    fn metadata(&self, token: Address) -> Option<TokenInfo> {
        self.tokens.get(&token).cloned()
    }
}

/// Oriented pair key: `lower(base)-lower(quote)`
pub fn pair_key(base: Address, quote: Address) -> String {
    format!("{base:#x}-{quote:#x}")
}

/// Inverse of an oriented pair key's orientation
pub fn inverse_pair_key(base: Address, quote: Address) -> String {
    pair_key(quote, base)
}

/// Canonical (sorted-address) pair used by the price oracle
///
/// Returns `(token_a, token_b)` with `token_a < token_b` byte-wise, plus
/// whether the given orientation was already forward.
pub fn canonical_pair(base: Address, quote: Address) -> (Address, Address, bool) {
    if base <= quote {
        (base, quote, true)
    } else {
        (quote, base, false)
    }
}
