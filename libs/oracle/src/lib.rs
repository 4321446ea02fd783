//! Reference price oracle
//!
//! Two jobs: a deterministic per-token unit value used to bootstrap a
//! synthetic price for any pair, and a per-pair dynamic price state nudged
//! by registered trades with volume weighting.
//!
//! Pair state lives under the canonical sorted-address key; reads return the
//! price oriented to the caller's base/quote order.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use types::order::{PriceSource, Side};
use types::token::{canonical_pair, TokenDirectory};
use types::units::u256_to_f64;

/// Unit values and dynamic prices are confined to this range
const VALUE_FLOOR: f64 = 1e-12;
const VALUE_CEIL: f64 = 1e12;

/// Volume weight bounds for trade registration
const WEIGHT_FLOOR: f64 = 0.05;
const WEIGHT_CEIL: f64 = 0.85;

/// Decay factor applied to the liquidity score on every registration
const LIQUIDITY_DECAY: f64 = 0.85;

/// Cap on the directional nudge applied per trade
const MAX_NUDGE: f64 = 0.25;

fn clamp_value(value: f64) -> f64 {
    value.clamp(VALUE_FLOOR, VALUE_CEIL)
}

/// Whether a quote came from registered trades or the unit-value baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSource {
    Dynamic,
    Baseline,
}

/// Dynamic state for one canonical token pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairState {
    /// Forward-oriented price (token_a priced in token_b terms)
    pub price: f64,
    pub baseline_price: f64,
    pub liquidity_score: f64,
    pub last_updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_source: Option<PriceSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_side: Option<Side>,
}

/// Full answer to a pair lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairQuote {
    pub price: f64,
    pub source: QuoteSource,
    pub base_unit_value: f64,
    pub quote_unit_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_source: Option<PriceSource>,
}

/// A trade being registered with the oracle
#[derive(Debug, Clone)]
pub struct TradeRegistration {
    pub base: Address,
    pub quote: Address,
    /// Quote per base, in the caller's orientation
    pub price: f64,
    pub base_amount: Option<f64>,
    pub quote_amount: Option<f64>,
    pub side: Option<Side>,
    pub source: Option<PriceSource>,
    pub timestamp: i64,
}

/// Deterministic unit-value oracle with dynamic pair state
pub struct PriceOracle {
    directory: Arc<dyn TokenDirectory>,
    /// Memoized symbol/name multiplier per token address
    multipliers: HashMap<Address, f64>,
    pairs: HashMap<(Address, Address), PairState>,
}

impl PriceOracle {
    pub fn new(directory: Arc<dyn TokenDirectory>) -> Self {
        Self {
            directory,
            multipliers: HashMap::new(),
            pairs: HashMap::new(),
        }
    }

    /// Deterministic unit value of a token
    ///
    /// `clamp(m(T) × base(T))` where `base(T)` is the inverse total supply
    /// when known and `m(T)` derives from a hash of address, symbol and name.
    pub fn unit_value(&mut self, token: Address) -> f64 {
        let multiplier = self.multiplier(token);
        let supply_base = self
            .directory
            .metadata(token)
            .and_then(|info| info.total_supply)
            .map(u256_to_f64)
            .filter(|supply| *supply > 0.0)
            .map(|supply| 1.0 / supply)
            .unwrap_or(1.0);
        clamp_value(multiplier * supply_base)
    }

    fn multiplier(&mut self, token: Address) -> f64 {
        if let Some(memo) = self.multipliers.get(&token) {
            return *memo;
        }
        let (symbol, name) = self
            .directory
            .metadata(token)
            .map(|info| (info.symbol, info.name))
            .unwrap_or_default();

        let mut hasher = Sha256::new();
        hasher.update(format!("{token:#x}|{symbol}|{name}").as_bytes());
        let digest = hasher.finalize();
        let hi32 = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        let fraction = hi32 as f64 / 2f64.powi(32);

        let multiplier = (0.5 + fraction) * (1.0 + (symbol.len() % 5) as f64 * 0.05);
        self.multipliers.insert(token, multiplier);
        multiplier
    }

    /// Synthetic baseline price for a pair, `uv(a) / uv(b)` forward-oriented
    fn baseline_price(&mut self, token_a: Address, token_b: Address) -> f64 {
        clamp_value(self.unit_value(token_a) / self.unit_value(token_b))
    }

    fn state_entry(&mut self, token_a: Address, token_b: Address, timestamp: i64) -> &mut PairState {
        let baseline = self.baseline_price(token_a, token_b);
        self.pairs
            .entry((token_a, token_b))
            .or_insert_with(|| PairState {
                price: baseline,
                baseline_price: baseline,
                liquidity_score: 0.0,
                last_updated_at: timestamp,
                last_source: None,
                last_side: None,
            })
    }

    /// Oriented price estimate for a pair; never fails
    pub fn estimate_pair_price(&mut self, base: Address, quote: Address) -> f64 {
        self.describe_pair(base, quote).price
    }

    /// Oriented price, source, and unit values for a pair
    pub fn describe_pair(&mut self, base: Address, quote: Address) -> PairQuote {
        let base_unit_value = self.unit_value(base);
        let quote_unit_value = self.unit_value(quote);
        let (token_a, token_b, forward) = canonical_pair(base, quote);

        let (canonical_price, source, last_source) = match self.pairs.get(&(token_a, token_b)) {
            Some(state) => (state.price, QuoteSource::Dynamic, state.last_source),
            None => (
                self.baseline_price(token_a, token_b),
                QuoteSource::Baseline,
                None,
            ),
        };

        let price = if forward {
            canonical_price
        } else {
            1.0 / canonical_price
        };

        PairQuote {
            price,
            source,
            base_unit_value,
            quote_unit_value,
            last_source,
        }
    }

    /// Fold an observed trade into the pair's dynamic price
    pub fn register_trade(&mut self, registration: TradeRegistration) {
        let TradeRegistration {
            base,
            quote,
            price,
            base_amount,
            quote_amount,
            side,
            source,
            timestamp,
        } = registration;

        if !price.is_finite() || price <= 0.0 {
            return;
        }

        let (token_a, token_b, forward) = canonical_pair(base, quote);
        let observed = if forward { price } else { 1.0 / price };

        let volume = match quote_amount {
            Some(quote_volume) if quote_volume > 0.0 => quote_volume,
            _ => base_amount.unwrap_or(0.0).max(0.0) * price,
        };

        let state = self.state_entry(token_a, token_b, timestamp);
        let weight = if volume > 0.0 {
            (volume / (state.liquidity_score + volume)).clamp(WEIGHT_FLOOR, WEIGHT_CEIL)
        } else {
            WEIGHT_FLOOR
        };

        state.price += (observed - state.price) * weight;

        if let Some(side) = side {
            let dir = match (forward, side) {
                (true, Side::Buy) | (false, Side::Sell) => 1.0,
                _ => -1.0,
            };
            state.price = clamp_value(state.price * (1.0 + dir * (weight * 0.1).min(MAX_NUDGE)));
        }

        state.liquidity_score = LIQUIDITY_DECAY * state.liquidity_score + volume;
        state.last_updated_at = timestamp;
        state.last_source = source;
        state.last_side = side;

        tracing::debug!(
            base = %base,
            quote = %quote,
            price = state.price,
            liquidity = state.liquidity_score,
            "registered trade with oracle"
        );
    }

    /// Drop the memoized multiplier for one token (metadata changed)
    pub fn invalidate(&mut self, token: Address) {
        self.multipliers.remove(&token);
    }

    /// Reset unit-value memoization and all pair state
    pub fn clear_cache(&mut self) {
        self.multipliers.clear();
        self.pairs.clear();
    }

    /// Raw pair state for diagnostics
    pub fn pair_state(&self, base: Address, quote: Address) -> Option<&PairState> {
        let (token_a, token_b, _) = canonical_pair(base, quote);
        self.pairs.get(&(token_a, token_b))
    }
}
