//! Trade and settlement types

use crate::order::{PriceSource, Side};
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of dispatching a trade to the on-chain collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub synthetic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SettlementOutcome {
    /// Marker for trades against engine-injected liquidity
    pub fn synthetic_liquidity() -> Self {
        Self {
            success: true,
            synthetic: true,
            receipt: None,
            reason: Some("synthetic_liquidity".into()),
        }
    }

    pub fn succeeded(receipt: impl Into<String>) -> Self {
        Self {
            success: true,
            synthetic: false,
            receipt: Some(receipt.into()),
            reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            synthetic: false,
            receipt: None,
            reason: Some(reason.into()),
        }
    }
}

/// A trade produced by the matching engine or the batch executor
///
/// `amount` is in base-token display units; `price` is quote per base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    pub id: Uuid,
    pub pair: String,
    pub price: f64,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buy_order_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sell_order_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maker_order_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub taker_order_id: Option<Uuid>,
    pub taker_side: Side,
    pub source: PriceSource,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub synthetic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthetic_quote_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<Uuid>,
    /// Exact base-unit fill, when known ahead of settlement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_amount: Option<U256>,
    pub executed_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement: Option<SettlementOutcome>,
}

impl TradeRecord {
    /// Quote-units value of the trade
    pub fn quote_volume(&self) -> f64 {
        self.amount * self.price
    }
}
