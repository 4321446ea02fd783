//! User-supplied order drafts
//!
//! A draft carries display-side fields as the HTTP layer hands them over.
//! Amounts and prices stay strings until the canonicalizer converts them to
//! exact base units.

use crate::order::{OrderType, Side, TimeInForce};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Expiry as either unix seconds or an ISO-8601 timestamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpiryInput {
    Unix(u64),
    Iso(String),
}

/// Caller-supplied overrides for the on-chain struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnchainOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_recipient: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_amount: Option<String>,
}

/// Draft order as submitted by a trader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub trader: String,
    pub base_token: String,
    pub quote_token: String,
    pub side: Side,
    pub order_type: OrderType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<TimeInForce>,
    /// Display amount in base tokens, e.g. "1.5"
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    /// MARKET-only price override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_fill_amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<ExpiryInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_partial_fill: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    /// Hex signature over the EIP-712 digest; required by `create`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onchain: Option<OnchainOverrides>,
}

impl OrderDraft {
    /// Minimal draft with everything optional left unset
    pub fn new(
        trader: impl Into<String>,
        base_token: impl Into<String>,
        quote_token: impl Into<String>,
        side: Side,
        order_type: OrderType,
        amount: impl Into<String>,
    ) -> Self {
        Self {
            trader: trader.into(),
            base_token: base_token.into(),
            quote_token: quote_token.into(),
            side,
            order_type,
            time_in_force: None,
            amount: amount.into(),
            price: None,
            market_price: None,
            stop_price: None,
            min_fill_amount: None,
            expiry: None,
            allow_partial_fill: None,
            nonce: None,
            id: None,
            signature: None,
            onchain: None,
        }
    }

    pub fn with_price(mut self, price: impl Into<String>) -> Self {
        self.price = Some(price.into());
        self
    }

    pub fn with_stop_price(mut self, stop_price: impl Into<String>) -> Self {
        self.stop_price = Some(stop_price.into());
        self
    }

    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = Some(tif);
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_deserializes_camel_case() {
        let json = r#"{
            "trader": "0x00000000000000000000000000000000000000aa",
            "baseToken": "0x0000000000000000000000000000000000000001",
            "quoteToken": "0x0000000000000000000000000000000000000002",
            "side": "BUY",
            "orderType": "STOP_LOSS",
            "amount": "2",
            "stopPrice": "6",
            "timeInForce": "IOC"
        }"#;
        let draft: OrderDraft = serde_json::from_str(json).unwrap();
        assert_eq!(draft.side, Side::Buy);
        assert_eq!(draft.order_type, OrderType::StopLoss);
        assert_eq!(draft.stop_price.as_deref(), Some("6"));
        assert_eq!(draft.time_in_force, Some(TimeInForce::Ioc));
    }

    #[test]
    fn test_expiry_untagged() {
        let unix: ExpiryInput = serde_json::from_str("1700000000").unwrap();
        assert_eq!(unix, ExpiryInput::Unix(1_700_000_000));

        let iso: ExpiryInput = serde_json::from_str("\"2026-01-01T00:00:00Z\"").unwrap();
        assert_eq!(iso, ExpiryInput::Iso("2026-01-01T00:00:00Z".into()));
    }
}
