//! Order lifecycle types
//!
//! Covers the canonical on-chain order struct, the engine-internal order
//! record, and the enum codec mapping string-named enums to the fixed
//! `uint8` indices the settlement contract expects.

use crate::errors::ValidationError;
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Contract enum index: BUY=0, SELL=1
    pub fn index(&self) -> u8 {
        match self {
            Side::Buy => 0,
            Side::Sell => 1,
        }
    }

    pub fn from_index(index: u8) -> Result<Self, ValidationError> {
        match index {
            0 => Ok(Side::Buy),
            1 => Ok(Side::Sell),
            _ => Err(ValidationError::InvalidEnum {
                field: "side",
                value: index.to_string(),
            }),
        }
    }

    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

impl std::str::FromStr for Side {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(ValidationError::InvalidEnum {
                field: "side",
                value: other.to_string(),
            }),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Market,
    StopLoss,
    StopLimit,
}

impl OrderType {
    /// Contract enum index: LIMIT=0, MARKET=1, STOP_LOSS=2, STOP_LIMIT=3
    pub fn index(&self) -> u8 {
        match self {
            OrderType::Limit => 0,
            OrderType::Market => 1,
            OrderType::StopLoss => 2,
            OrderType::StopLimit => 3,
        }
    }

    pub fn from_index(index: u8) -> Result<Self, ValidationError> {
        match index {
            0 => Ok(OrderType::Limit),
            1 => Ok(OrderType::Market),
            2 => Ok(OrderType::StopLoss),
            3 => Ok(OrderType::StopLimit),
            _ => Err(ValidationError::InvalidEnum {
                field: "orderType",
                value: index.to_string(),
            }),
        }
    }

    /// Whether this order activates on a stop trigger
    pub fn is_stop(&self) -> bool {
        matches!(self, OrderType::StopLoss | OrderType::StopLimit)
    }
}

impl std::str::FromStr for OrderType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LIMIT" => Ok(OrderType::Limit),
            "MARKET" => Ok(OrderType::Market),
            "STOP_LOSS" => Ok(OrderType::StopLoss),
            "STOP_LIMIT" => Ok(OrderType::StopLimit),
            other => Err(ValidationError::InvalidEnum {
                field: "orderType",
                value: other.to_string(),
            }),
        }
    }
}

/// Time-in-force policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    /// Good-Till-Cancel: rests until filled or canceled
    Gtc,
    /// Immediate-Or-Cancel: match immediately, cancel remainder
    Ioc,
    /// Fill-Or-Kill: full match or reject entirely
    Fok,
    /// Must not take liquidity
    PostOnly,
}

impl TimeInForce {
    /// Contract enum index: GTC=0, IOC=1, FOK=2, POST_ONLY=3
    pub fn index(&self) -> u8 {
        match self {
            TimeInForce::Gtc => 0,
            TimeInForce::Ioc => 1,
            TimeInForce::Fok => 2,
            TimeInForce::PostOnly => 3,
        }
    }

    pub fn from_index(index: u8) -> Result<Self, ValidationError> {
        match index {
            0 => Ok(TimeInForce::Gtc),
            1 => Ok(TimeInForce::Ioc),
            2 => Ok(TimeInForce::Fok),
            3 => Ok(TimeInForce::PostOnly),
            _ => Err(ValidationError::InvalidEnum {
                field: "timeInForce",
                value: index.to_string(),
            }),
        }
    }
}

impl std::str::FromStr for TimeInForce {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GTC" => Ok(TimeInForce::Gtc),
            "IOC" => Ok(TimeInForce::Ioc),
            "FOK" => Ok(TimeInForce::Fok),
            "POST_ONLY" => Ok(TimeInForce::PostOnly),
            other => Err(ValidationError::InvalidEnum {
                field: "timeInForce",
                value: other.to_string(),
            }),
        }
    }
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Accepted, resting or queued
    Pending,
    /// Partially matched
    Partial,
    /// Completely matched (terminal)
    Filled,
    /// Canceled by user or system (terminal)
    Cancelled,
    /// Failed validation or a liquidity pre-check (terminal)
    Rejected,
    /// Expiry deadline reached (terminal)
    Expired,
    /// Transient label set on stop orders at trigger time
    Triggered,
}

impl OrderStatus {
    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }
}

/// Reject reasons recorded on the order's metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    PostOnlyWouldTrade,
    InsufficientLiquidity,
    IocUnfilled,
    InvalidStopPrice,
}

/// Where a resolved price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriceSource {
    Input,
    Derived,
    Market,
    Orderbook,
    Synthetic,
    MarketBuyImpact,
    Batch,
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PriceSource::Input => "input",
            PriceSource::Derived => "derived",
            PriceSource::Market => "market",
            PriceSource::Orderbook => "orderbook",
            PriceSource::Synthetic => "synthetic",
            PriceSource::MarketBuyImpact => "market-buy-impact",
            PriceSource::Batch => "batch",
        };
        write!(f, "{s}")
    }
}

/// Canonical on-chain order struct
///
/// Field order mirrors the settlement contract's `Order` tuple; every
/// numeric field is an exact 256-bit unsigned integer in token base units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalOrder {
    pub maker: Address,
    pub token_get: Address,
    pub amount_get: U256,
    pub token_give: Address,
    pub amount_give: U256,
    pub nonce: U256,
    /// Unix seconds, 0 = no expiry
    pub expiry: U256,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub side: Side,
    /// Fixed-point with scale 1e18, 0 when absent
    pub stop_price: U256,
    pub min_fill_amount: U256,
    pub allow_partial_fill: bool,
    pub fee_recipient: Address,
    pub fee_amount: U256,
}

impl CanonicalOrder {
    /// Validate the cross-field invariants of a canonical order
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.amount_get.is_zero() || self.amount_give.is_zero() {
            return Err(ValidationError::InvalidAmount(
                "amountGet and amountGive must be positive".into(),
            ));
        }
        if self.order_type.is_stop() && self.stop_price.is_zero() {
            return Err(ValidationError::InvalidStopPrice(
                "stop orders require a positive stopPrice".into(),
            ));
        }
        if self.min_fill_amount > self.amount_give {
            return Err(ValidationError::InvalidAmount(
                "minFillAmount exceeds amountGive".into(),
            ));
        }
        Ok(())
    }
}

/// A single fill applied to an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    /// Base-unit display amount of this fill
    pub amount: f64,
    pub price: f64,
    /// Counterparty order id, or a synthetic-liquidity id
    pub counterparty: String,
    pub executed_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<Uuid>,
}

/// Synthetic-liquidity fill annotation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyntheticFill {
    pub counterparty: String,
    pub price: f64,
    pub amount: f64,
    pub quote_amount: f64,
    pub filled_at: i64,
}

/// Typed key-value bag carried by every order record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_source: Option<PriceSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<RejectReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_source: Option<PriceSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthetic_fill: Option<SyntheticFill>,
    /// Caller-supplied on-chain fill override, exact base units
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onchain_fill_amount: Option<U256>,
    /// Ids of trades this order participated in
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub trades: Vec<Uuid>,
}

/// Engine-internal order record
///
/// Owns the canonical order plus display-side state. Display `amount` and
/// `filled` are in base-token units; `price` is quote per base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub id: Uuid,
    pub order: CanonicalOrder,
    pub base_token: Address,
    pub quote_token: Address,
    pub base_decimals: u8,
    pub quote_decimals: u8,
    pub side: Side,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub amount: f64,
    pub filled: f64,
    pub status: OrderStatus,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_at: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub executions: Vec<Execution>,
    #[serde(default)]
    pub metadata: OrderMetadata,
    /// Caller-supplied hex signature over the EIP-712 digest
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl OrderRecord {
    /// Unfilled base amount, never negative
    pub fn remaining(&self) -> f64 {
        (self.amount - self.filled).max(0.0)
    }

    /// Active records can still match or be canceled
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Apply a fill and advance the status machine
    pub fn apply_fill(
        &mut self,
        amount: f64,
        price: f64,
        counterparty: impl Into<String>,
        timestamp: i64,
        batch_id: Option<Uuid>,
    ) {
        self.filled += amount;
        self.executions.push(Execution {
            amount,
            price,
            counterparty: counterparty.into(),
            executed_at: timestamp,
            batch_id,
        });
        self.status = if self.remaining() <= f64::EPSILON {
            OrderStatus::Filled
        } else {
            OrderStatus::Partial
        };
        self.updated_at = timestamp;
    }

    /// Reject with a reason, keeping PARTIAL when fills already happened
    pub fn reject(&mut self, reason: RejectReason, timestamp: i64) {
        self.metadata.reject_reason = Some(reason);
        if self.filled > 0.0 && self.status != OrderStatus::Filled {
            self.status = OrderStatus::Partial;
        } else if self.filled == 0.0 {
            self.status = OrderStatus::Rejected;
        }
        self.updated_at = timestamp;
    }

    /// Transition to CANCELLED; no-op on terminal records
    pub fn cancel(&mut self, reason: impl Into<String>, timestamp: i64) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = OrderStatus::Cancelled;
        self.metadata.cancel_reason = Some(reason.into());
        self.updated_at = timestamp;
        true
    }

    /// Transition to EXPIRED; no-op on terminal records
    pub fn expire(&mut self, timestamp: i64) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = OrderStatus::Expired;
        self.updated_at = timestamp;
        true
    }

    /// Stop threshold as a display price (canonical scale is 1e18)
    pub fn stop_price_display(&self) -> f64 {
        crate::units::display_units(self.order.stop_price, 18)
    }

    /// Minimum fill expressed in base display units
    ///
    /// SELL minimums are stored in base units; BUY minimums were rescaled by
    /// price into quote units at canonicalization and convert back here.
    pub fn min_fill_base(&self) -> f64 {
        if self.order.min_fill_amount.is_zero() {
            return 0.0;
        }
        match self.side {
            Side::Sell => crate::units::display_units(self.order.min_fill_amount, self.base_decimals),
            Side::Buy => {
                let quote = crate::units::display_units(self.order.min_fill_amount, self.quote_decimals);
                match self.price {
                    Some(price) if price > 0.0 => quote / price,
                    _ => quote,
                }
            }
        }
    }

    /// Expiry in unix seconds, `None` when the order never expires
    pub fn expiry_seconds(&self) -> Option<u64> {
        if self.order.expiry.is_zero() {
            None
        } else {
            Some(self.order.expiry.saturating_to::<u64>())
        }
    }
}
