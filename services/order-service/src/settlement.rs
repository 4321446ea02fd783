//! Settlement adapter
//!
//! Builds the contract-order view for a trade and dispatches it to the
//! on-chain collaborator. Failures are captured as outcomes, never raised:
//! matching is already done and is not rolled back.

use crate::chain::{ChainClient, ChainError};
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use types::order::{CanonicalOrder, OrderRecord};
use types::trade::{SettlementOutcome, TradeRecord};
use types::units::f64_to_units;

/// Wire-shaped view of the canonical order: enum indices and decimal-string
/// big integers, mirroring the settlement contract's tuple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractOrderView {
    pub maker: Address,
    pub token_get: Address,
    pub amount_get: String,
    pub token_give: Address,
    pub amount_give: String,
    pub nonce: String,
    pub expiry: String,
    pub order_type: u8,
    pub time_in_force: u8,
    pub side: u8,
    pub stop_price: String,
    pub min_fill_amount: String,
    pub allow_partial_fill: bool,
    pub fee_recipient: Address,
    pub fee_amount: String,
}

impl From<&CanonicalOrder> for ContractOrderView {
    fn from(order: &CanonicalOrder) -> Self {
        Self {
            maker: order.maker,
            token_get: order.token_get,
            amount_get: order.amount_get.to_string(),
            token_give: order.token_give,
            amount_give: order.amount_give.to_string(),
            nonce: order.nonce.to_string(),
            expiry: order.expiry.to_string(),
            order_type: order.order_type.index(),
            time_in_force: order.time_in_force.index(),
            side: order.side.index(),
            stop_price: order.stop_price.to_string(),
            min_fill_amount: order.min_fill_amount.to_string(),
            allow_partial_fill: order.allow_partial_fill,
            fee_recipient: order.fee_recipient,
            fee_amount: order.fee_amount.to_string(),
        }
    }
}

/// Dispatches settlement intents for produced trades
pub struct SettlementAdapter {
    chain: Arc<dyn ChainClient>,
    signer_configured: bool,
}

impl SettlementAdapter {
    pub fn new(chain: Arc<dyn ChainClient>, signer_configured: bool) -> Self {
        Self {
            chain,
            signer_configured,
        }
    }

    /// Exact base-unit fill for a trade, by precedence: the dispatched
    /// order's on-chain override, the trade's explicit fill, the trade
    /// amount converted at the order's decimals, the taker's override
    fn resolve_fill(
        trade: &TradeRecord,
        dispatched: &OrderRecord,
        taker: Option<&OrderRecord>,
    ) -> U256 {
        if let Some(fill) = dispatched.metadata.onchain_fill_amount {
            return fill;
        }
        if let Some(fill) = trade.fill_amount {
            return fill;
        }
        if let Ok(fill) = f64_to_units(trade.amount, dispatched.base_decimals) {
            if !fill.is_zero() {
                return fill;
            }
        }
        taker
            .and_then(|record| record.metadata.onchain_fill_amount)
            .unwrap_or(U256::ZERO)
    }

    /// Settle one trade; synthetic trades short-circuit
    pub async fn settle(
        &self,
        trade: &TradeRecord,
        maker: Option<&OrderRecord>,
        taker: Option<&OrderRecord>,
    ) -> SettlementOutcome {
        if trade.synthetic {
            return SettlementOutcome::synthetic_liquidity();
        }
        if !self.signer_configured {
            return SettlementOutcome::failed(ChainError::SignerMissing.to_string());
        }
        let Some(dispatched) = maker.or(taker) else {
            return SettlementOutcome::failed("no order available for settlement");
        };
        let Some(signature) = dispatched.signature.as_deref() else {
            return SettlementOutcome::failed("dispatched order carries no signature");
        };

        let fill_amount = Self::resolve_fill(trade, dispatched, taker);
        let view = ContractOrderView::from(&dispatched.order);
        tracing::debug!(
            trade = %trade.id,
            maker = %view.maker,
            fill = %fill_amount,
            "dispatching settlement"
        );

        match self
            .chain
            .execute_order(&dispatched.order, signature, fill_amount)
            .await
        {
            Ok(receipt) => SettlementOutcome::succeeded(receipt),
            Err(error) => {
                tracing::warn!(trade = %trade.id, %error, "settlement dispatch failed");
                SettlementOutcome::failed(error.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::InMemoryChainClient;
    use alloy_primitives::address;
    use types::order::{
        OrderMetadata, OrderStatus, OrderType, PriceSource, Side, TimeInForce,
    };
    use uuid::Uuid;

    fn record(signature: Option<&str>) -> OrderRecord {
        let order = CanonicalOrder {
            maker: address!("00000000000000000000000000000000000000aa"),
            token_get: address!("0000000000000000000000000000000000000002"),
            amount_get: U256::from(600u64),
            token_give: address!("0000000000000000000000000000000000000001"),
            amount_give: U256::from(100u64),
            nonce: U256::ZERO,
            expiry: U256::ZERO,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::Gtc,
            side: Side::Sell,
            stop_price: U256::ZERO,
            min_fill_amount: U256::ZERO,
            allow_partial_fill: true,
            fee_recipient: Address::ZERO,
            fee_amount: U256::ZERO,
        };
        OrderRecord {
            id: Uuid::new_v4(),
            base_token: order.token_give,
            quote_token: order.token_get,
            base_decimals: 6,
            quote_decimals: 6,
            side: order.side,
            order_type: order.order_type,
            time_in_force: order.time_in_force,
            price: Some(6.0),
            amount: 100.0,
            filled: 0.0,
            status: OrderStatus::Pending,
            created_at: 0,
            updated_at: 0,
            triggered_at: None,
            executions: Vec::new(),
            metadata: OrderMetadata::default(),
            signature: signature.map(Into::into),
            order,
        }
    }

    fn trade(amount: f64, synthetic: bool) -> TradeRecord {
        TradeRecord {
            id: Uuid::new_v4(),
            pair: "pair".into(),
            price: 6.0,
            amount,
            buy_order_id: None,
            sell_order_id: None,
            maker_order_id: None,
            taker_order_id: None,
            taker_side: Side::Buy,
            source: PriceSource::Orderbook,
            synthetic,
            synthetic_quote_amount: None,
            batch_id: None,
            fill_amount: None,
            executed_at: 0,
            settlement: None,
        }
    }

    #[test]
    fn test_contract_view_enum_indices() {
        let record = record(None);
        let view = ContractOrderView::from(&record.order);
        assert_eq!(view.order_type, 0);
        assert_eq!(view.time_in_force, 0);
        assert_eq!(view.side, 1);
        assert_eq!(view.amount_get, "600");
    }

    #[tokio::test]
    async fn test_synthetic_short_circuits() {
        let adapter = SettlementAdapter::new(Arc::new(InMemoryChainClient::new()), true);
        let outcome = adapter.settle(&trade(1.0, true), None, None).await;
        assert!(outcome.success);
        assert!(outcome.synthetic);
        assert_eq!(outcome.reason.as_deref(), Some("synthetic_liquidity"));
    }

    #[tokio::test]
    async fn test_signer_missing_is_captured() {
        let adapter = SettlementAdapter::new(Arc::new(InMemoryChainClient::new()), false);
        let maker = record(Some("0xsig"));
        let outcome = adapter.settle(&trade(2.0, false), Some(&maker), None).await;
        assert!(!outcome.success);
        assert!(outcome.reason.unwrap().contains("signer"));
    }

    #[tokio::test]
    async fn test_dispatch_resolves_fill_from_trade_amount() {
        let chain = Arc::new(InMemoryChainClient::new());
        let adapter = SettlementAdapter::new(chain.clone(), true);
        let maker = record(Some("0xsig"));

        let outcome = adapter.settle(&trade(2.5, false), Some(&maker), None).await;
        assert!(outcome.success);
        assert!(outcome.receipt.is_some());

        let fills = chain.executed_fills();
        assert_eq!(fills.len(), 1);
        // 2.5 at 6 decimals
        assert_eq!(fills[0].fill_amount, U256::from(2_500_000u64));
    }

    #[tokio::test]
    async fn test_override_takes_precedence() {
        let chain = Arc::new(InMemoryChainClient::new());
        let adapter = SettlementAdapter::new(chain.clone(), true);
        let mut maker = record(Some("0xsig"));
        maker.metadata.onchain_fill_amount = Some(U256::from(77u64));

        adapter.settle(&trade(2.5, false), Some(&maker), None).await;
        assert_eq!(chain.executed_fills()[0].fill_amount, U256::from(77u64));
    }

    #[tokio::test]
    async fn test_revert_captured_not_raised() {
        let adapter = SettlementAdapter::new(Arc::new(InMemoryChainClient::reverting("slippage")), true);
        let maker = record(Some("0xsig"));
        let outcome = adapter.settle(&trade(1.0, false), Some(&maker), None).await;
        assert!(!outcome.success);
        assert!(outcome.reason.unwrap().contains("slippage"));
    }
}
