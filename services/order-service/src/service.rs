//! Order service
//!
//! Single-writer orchestration over the matching engine. The engine lock is
//! never held across an await of an external collaborator: nonce resolution
//! happens before the lock, settlement dispatch after it.

use crate::canonicalize::{canonicalize, PreparedOrder};
use crate::chain::ChainClient;
use crate::config::CoreConfig;
use crate::error::ServiceError;
use crate::settlement::SettlementAdapter;
use alloy_primitives::Address;
use alloy_sol_types::Eip712Domain;
use matching_engine::{
    BatchResult, BookSnapshot, DepthSnapshot, EngineConfig, MatchingEngine, OrderFilter,
};
use oracle::PairQuote;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use types::draft::OrderDraft;
use types::errors::ValidationError;
use types::order::{OrderRecord, PriceSource};
use types::token::TokenDirectory;
use types::trade::TradeRecord;
use uuid::Uuid;

/// A trade paired with the records settlement needs
type SettlementIntent = (TradeRecord, Option<OrderRecord>, Option<OrderRecord>);

/// Orchestrates create/cancel/list, matching, and settlement dispatch
pub struct OrderService {
    engine: Mutex<MatchingEngine>,
    directory: Arc<dyn TokenDirectory>,
    chain: Arc<dyn ChainClient>,
    settlement: SettlementAdapter,
    domain: Eip712Domain,
}

impl OrderService {
    pub fn new(
        config: CoreConfig,
        directory: Arc<dyn TokenDirectory>,
        chain: Arc<dyn ChainClient>,
    ) -> Self {
        let engine = MatchingEngine::new(
            directory.clone(),
            EngineConfig {
                impact_rate: config.impact_rate,
            },
        );
        let settlement = SettlementAdapter::new(chain.clone(), config.signer.is_some());
        let domain = typed_data::signing_domain(config.chain_id, config.verifying_contract);
        Self {
            engine: Mutex::new(engine),
            directory,
            chain,
            settlement,
            domain,
        }
    }

    pub fn domain(&self) -> &Eip712Domain {
        &self.domain
    }

    fn now_nanos() -> i64 {
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    }

    fn now_seconds() -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }

    /// Nonce resolution is the only pre-lock suspension point
    async fn fetch_nonce_if_needed(
        &self,
        draft: &OrderDraft,
    ) -> Result<Option<alloy_primitives::U256>, ServiceError> {
        if draft.nonce.is_some() {
            return Ok(None);
        }
        let maker = Address::from_str(draft.trader.trim())
            .map_err(|_| ValidationError::InvalidAddress(draft.trader.clone()))?;
        Ok(Some(self.chain.get_nonce(maker).await?))
    }

    /// Canonicalize without registering: typed data + digest for signing
    pub async fn prepare(&self, draft: &OrderDraft) -> Result<PreparedOrder, ServiceError> {
        let nonce = self.fetch_nonce_if_needed(draft).await?;
        let mut engine = self.engine.lock().await;
        let prepared = canonicalize(
            draft,
            &*self.directory,
            &mut engine,
            &self.domain,
            nonce,
            Self::now_nanos(),
        )?;
        Ok(prepared)
    }

    /// Create, verify, match, and settle an order
    pub async fn create(&self, draft: &OrderDraft) -> Result<OrderRecord, ServiceError> {
        let signature = draft
            .signature
            .clone()
            .ok_or(ValidationError::MissingField("signature"))?;
        let nonce = self.fetch_nonce_if_needed(draft).await?;
        let timestamp = Self::now_nanos();

        let (id, intents) = {
            let mut engine = self.engine.lock().await;
            let mut prepared = canonicalize(
                draft,
                &*self.directory,
                &mut engine,
                &self.domain,
                nonce,
                timestamp,
            )?;
            typed_data::verify(
                &self.domain,
                &prepared.record.order,
                &signature,
                prepared.record.order.maker,
            )?;

            // Caller-supplied ids are honored only while unique
            if engine.get(&prepared.record.id).is_some() {
                prepared.record.id = Uuid::new_v4();
            }
            let id = prepared.record.id;
            let trades = engine.add_order(prepared.record, timestamp)?;
            tracing::info!(order = %id, trades = trades.len(), "order created");
            let intents = Self::collect_intents(&engine, trades);
            (id, intents)
        };

        self.dispatch_settlements(intents).await;

        let engine = self.engine.lock().await;
        engine.get(&id).cloned().ok_or(ServiceError::NotFound(id))
    }

    /// Cancel one order; terminal records come back unchanged
    pub async fn cancel(
        &self,
        id: &Uuid,
        reason: Option<String>,
    ) -> Result<OrderRecord, ServiceError> {
        let mut engine = self.engine.lock().await;
        let record = engine.cancel_order(
            id,
            reason.unwrap_or_else(|| "user_requested".into()),
            Self::now_nanos(),
        )?;
        Ok(record)
    }

    /// Cancel a batch of orders, skipping unknown ids
    pub async fn cancel_orders(&self, ids: &[Uuid], reason: Option<String>) -> Vec<OrderRecord> {
        let reason = reason.unwrap_or_else(|| "user_requested".into());
        let mut engine = self.engine.lock().await;
        let timestamp = Self::now_nanos();
        ids.iter()
            .filter_map(|id| engine.cancel_order(id, reason.clone(), timestamp).ok())
            .collect()
    }

    pub async fn get(&self, id: &Uuid) -> Option<OrderRecord> {
        self.engine.lock().await.get(id).cloned()
    }

    pub async fn list(&self, filter: OrderFilter) -> Vec<OrderRecord> {
        self.engine.lock().await.list(&filter)
    }

    pub async fn order_book(&self, base: Address, quote: Address) -> Option<BookSnapshot> {
        self.engine.lock().await.book_snapshot(base, quote)
    }

    pub async fn all_order_books(&self) -> Vec<BookSnapshot> {
        self.engine.lock().await.all_book_snapshots()
    }

    pub async fn depth(&self, base: Address, quote: Address, levels: usize) -> Option<DepthSnapshot> {
        self.engine.lock().await.depth(base, quote, levels)
    }

    pub async fn recent_trades(&self, base: Address, quote: Address, limit: usize) -> Vec<TradeRecord> {
        self.engine.lock().await.recent_trades(base, quote, limit)
    }

    pub async fn describe_pair(&self, base: Address, quote: Address) -> PairQuote {
        self.engine.lock().await.oracle_mut().describe_pair(base, quote)
    }

    /// Push a reference price; stop-trigger fills settle like any others.
    /// Returns the stored oriented price.
    pub async fn update_market_price(&self, base: Address, quote: Address, price: f64) -> f64 {
        let timestamp = Self::now_nanos();
        let (intents, stored) = {
            let mut engine = self.engine.lock().await;
            let trades =
                engine.update_market_price(base, quote, price, PriceSource::Synthetic, timestamp);
            let stored = engine.market_price(base, quote).unwrap_or(price);
            let intents = Self::collect_intents(&engine, trades);
            (intents, stored)
        };
        self.dispatch_settlements(intents).await;
        stored
    }

    /// Run an atomic cyclic batch and settle its trades
    pub async fn execute_batch(
        &self,
        order_ids: &[Uuid],
        tolerance: Option<f64>,
    ) -> Result<BatchResult, ServiceError> {
        let timestamp = Self::now_nanos();
        let (result, intents) = {
            let mut engine = self.engine.lock().await;
            let result = engine.execute_batch(order_ids, tolerance, timestamp)?;
            let intents = Self::collect_intents(&engine, result.trades.clone());
            (result, intents)
        };
        self.dispatch_settlements(intents).await;
        Ok(result)
    }

    /// Sweep expired orders off the books
    pub async fn expire_due_orders(&self) -> Vec<Uuid> {
        let mut engine = self.engine.lock().await;
        engine.expire_due_orders(Self::now_seconds(), Self::now_nanos())
    }

    fn collect_intents(engine: &MatchingEngine, trades: Vec<TradeRecord>) -> Vec<SettlementIntent> {
        trades
            .into_iter()
            .map(|trade| {
                // Batch counterparties live on other pairs; dispatch the leg
                let maker = if trade.batch_id.is_some() {
                    None
                } else {
                    trade
                        .maker_order_id
                        .and_then(|id| engine.get(&id))
                        .cloned()
                };
                let taker = trade
                    .taker_order_id
                    .and_then(|id| engine.get(&id))
                    .cloned();
                (trade, maker, taker)
            })
            .collect()
    }

    /// Post-lock suspension point: dispatch each intent, then re-lock
    /// briefly to attach outcomes to the recorded trades
    async fn dispatch_settlements(&self, intents: Vec<SettlementIntent>) {
        if intents.is_empty() {
            return;
        }
        let mut outcomes = Vec::with_capacity(intents.len());
        for (trade, maker, taker) in &intents {
            let outcome = self.settlement.settle(trade, maker.as_ref(), taker.as_ref()).await;
            outcomes.push((trade.pair.clone(), trade.id, outcome));
        }
        let mut engine = self.engine.lock().await;
        for (pair, trade_id, outcome) in outcomes {
            engine.attach_settlement(&pair, &trade_id, outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::InMemoryChainClient;
    use alloy_primitives::{address, b256};
    use alloy_signer_local::PrivateKeySigner;
    use types::order::{OrderStatus, OrderType, Side};
    use types::token::{InMemoryTokenDirectory, TokenInfo};

    const BASE: Address = address!("0000000000000000000000000000000000000001");
    const QUOTE: Address = address!("0000000000000000000000000000000000000002");

    fn signer(tag: u8) -> PrivateKeySigner {
        let mut key = [0x21u8; 32];
        key[31] = tag;
        PrivateKeySigner::from_bytes(&key.into()).unwrap()
    }

    fn service_with(chain: Arc<InMemoryChainClient>, with_signer: bool) -> OrderService {
        let directory = Arc::new(
            InMemoryTokenDirectory::new()
                .with_token(TokenInfo::new(BASE, "Base Token", "BASE", 18))
                .with_token(TokenInfo::new(QUOTE, "Quote Token", "QUOTE", 18)),
        );
        let mut config = CoreConfig::for_tests(
            31337,
            address!("5fbdb2315678afecb367f032d93f642f64180aa3"),
        );
        if with_signer {
            config = config.with_signer(PrivateKeySigner::from_bytes(&b256!(
                "0202020202020202020202020202020202020202020202020202020202020202"
            ))
            .unwrap());
        }
        OrderService::new(config, directory, chain)
    }

    async fn signed_draft(
        service: &OrderService,
        signer: &PrivateKeySigner,
        side: Side,
        amount: &str,
        price: &str,
    ) -> OrderDraft {
        use alloy_signer::SignerSync;

        let mut draft = OrderDraft::new(
            signer.address().to_checksum(None),
            format!("{BASE:#x}"),
            format!("{QUOTE:#x}"),
            side,
            OrderType::Limit,
            amount,
        )
        .with_price(price);

        let prepared = service.prepare(&draft).await.unwrap();
        let signature = signer.sign_hash_sync(&prepared.hash).unwrap();
        draft.signature = Some(hex::encode(signature.as_bytes()));
        draft
    }

    #[tokio::test]
    async fn test_create_requires_signature() {
        let service = service_with(Arc::new(InMemoryChainClient::new()), true);
        let draft = OrderDraft::new(
            "0x00000000000000000000000000000000000000aa",
            format!("{BASE:#x}"),
            format!("{QUOTE:#x}"),
            Side::Sell,
            OrderType::Limit,
            "1",
        )
        .with_price("6");

        let err = service.create(&draft).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Validation(ValidationError::MissingField("signature"))
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_wrong_signer() {
        let service = service_with(Arc::new(InMemoryChainClient::new()), true);
        let alice = signer(1);
        let mallory = signer(2);

        let mut draft = signed_draft(&service, &alice, Side::Sell, "1", "6").await;
        // Re-sign with a different key: recovered address mismatches maker
        let prepared = service.prepare(&draft).await.unwrap();
        use alloy_signer::SignerSync;
        let forged = mallory.sign_hash_sync(&prepared.hash).unwrap();
        draft.signature = Some(hex::encode(forged.as_bytes()));

        let err = service.create(&draft).await.unwrap_err();
        assert!(matches!(err, ServiceError::Signature(_)));
    }

    #[tokio::test]
    async fn test_create_match_and_settle() {
        let chain = Arc::new(InMemoryChainClient::new());
        let service = service_with(chain.clone(), true);
        let alice = signer(1);
        let bob = signer(2);

        let sell = signed_draft(&service, &alice, Side::Sell, "2", "6").await;
        let resting = service.create(&sell).await.unwrap();
        assert_eq!(resting.status, OrderStatus::Pending);

        let buy = signed_draft(&service, &bob, Side::Buy, "2", "6").await;
        let taker = service.create(&buy).await.unwrap();
        assert_eq!(taker.status, OrderStatus::Filled);

        // Settlement was dispatched and recorded on the trade
        let trades = service.recent_trades(BASE, QUOTE, 10).await;
        assert_eq!(trades.len(), 1);
        let settlement = trades[0].settlement.as_ref().unwrap();
        assert!(settlement.success);
        assert_eq!(chain.executed_fills().len(), 1);
    }

    #[tokio::test]
    async fn test_settlement_failure_captured_not_raised() {
        let chain = Arc::new(InMemoryChainClient::reverting("nonce used"));
        let service = service_with(chain, true);
        let alice = signer(1);
        let bob = signer(2);

        service
            .create(&signed_draft(&service, &alice, Side::Sell, "2", "6").await)
            .await
            .unwrap();
        let taker = service
            .create(&signed_draft(&service, &bob, Side::Buy, "2", "6").await)
            .await
            .unwrap();
        // Matching is not rolled back
        assert_eq!(taker.status, OrderStatus::Filled);

        let trades = service.recent_trades(BASE, QUOTE, 10).await;
        let settlement = trades[0].settlement.as_ref().unwrap();
        assert!(!settlement.success);
        assert!(settlement.reason.as_ref().unwrap().contains("nonce used"));
    }

    #[tokio::test]
    async fn test_cancel_and_terminal_noop() {
        let service = service_with(Arc::new(InMemoryChainClient::new()), true);
        let alice = signer(1);

        let record = service
            .create(&signed_draft(&service, &alice, Side::Sell, "2", "6").await)
            .await
            .unwrap();
        let cancelled = service.cancel(&record.id, None).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(
            cancelled.metadata.cancel_reason.as_deref(),
            Some("user_requested")
        );

        let again = service.cancel(&record.id, Some("later".into())).await.unwrap();
        assert_eq!(again.metadata.cancel_reason.as_deref(), Some("user_requested"));
    }

    #[tokio::test]
    async fn test_list_filters_by_trader() {
        let service = service_with(Arc::new(InMemoryChainClient::new()), true);
        let alice = signer(1);
        let bob = signer(2);

        service
            .create(&signed_draft(&service, &alice, Side::Sell, "2", "7").await)
            .await
            .unwrap();
        service
            .create(&signed_draft(&service, &bob, Side::Sell, "3", "8").await)
            .await
            .unwrap();

        let all = service.list(OrderFilter::default()).await;
        assert_eq!(all.len(), 2);

        let filter = OrderFilter {
            trader: Some(alice.address()),
            ..Default::default()
        };
        let mine = service.list(filter).await;
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].order.maker, alice.address());
    }

    #[tokio::test]
    async fn test_update_market_price_returns_oriented_price() {
        let service = service_with(Arc::new(InMemoryChainClient::new()), true);
        let stored = service.update_market_price(BASE, QUOTE, 4.0).await;
        assert_eq!(stored, 4.0);

        let inverse = service.order_book(QUOTE, BASE).await;
        // No book was created by a pure price update
        assert!(inverse.is_none());
        let quote = service.describe_pair(BASE, QUOTE).await;
        assert!(quote.price > 0.0);
    }

    #[tokio::test]
    async fn test_nonce_fetched_from_chain_when_absent() {
        let chain = Arc::new(InMemoryChainClient::new());
        let alice = signer(1);
        chain.set_nonce(alice.address(), alloy_primitives::U256::from(11u64));
        let service = service_with(chain, true);

        let draft = signed_draft(&service, &alice, Side::Sell, "1", "6").await;
        let record = service.create(&draft).await.unwrap();
        assert_eq!(record.order.nonce, alloy_primitives::U256::from(11u64));
    }
}
