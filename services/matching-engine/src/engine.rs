//! Matching engine core
//!
//! Owns the order registry, per-pair books, the dual-orientation market
//! price table, and the price oracle. All mutating entry points are
//! synchronous and must be externally serialized (single writer).

use crate::book::{BookList, BookSnapshot, DepthSnapshot, OrderBook};
use crate::store::{OrderFilter, OrderStore};
use alloy_primitives::Address;
use oracle::{PriceOracle, TradeRegistration};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use types::order::{
    OrderRecord, OrderStatus, OrderType, PriceSource, RejectReason, Side, TimeInForce,
};
use types::token::{pair_key, TokenDirectory};
use types::trade::{SettlementOutcome, TradeRecord};
use uuid::Uuid;

/// Tolerance for float comparisons on display amounts
const EPSILON: f64 = 1e-9;

/// Tunable engine constants
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Quote units added to the market price per base unit of market-buy fill
    pub impact_rate: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { impact_rate: 1.0 }
    }
}

/// Oriented market price with its previous value and provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketPriceEntry {
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_price: Option<f64>,
    pub source: PriceSource,
    pub updated_at: i64,
}

/// Engine errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Order not found: {0}")]
    UnknownOrder(Uuid),

    #[error("Order id already registered: {0}")]
    DuplicateOrder(Uuid),

    #[error("Book invariants corrupted for pair {0}; writes refused")]
    PairPoisoned(String),
}

#[derive(Debug, Clone, Copy)]
struct TriggerContext {
    price: f64,
    source: PriceSource,
}

/// The matching engine
pub struct MatchingEngine {
    store: OrderStore,
    books: HashMap<String, OrderBook>,
    market_prices: HashMap<String, MarketPriceEntry>,
    oracle: PriceOracle,
    config: EngineConfig,
    /// Pairs whose invariants broke; further writes are refused
    poisoned: HashSet<String>,
    /// Trades produced by the in-flight mutating operation
    produced: Vec<TradeRecord>,
}

impl MatchingEngine {
    pub fn new(directory: Arc<dyn TokenDirectory>, config: EngineConfig) -> Self {
        Self {
            store: OrderStore::new(),
            books: HashMap::new(),
            market_prices: HashMap::new(),
            oracle: PriceOracle::new(directory),
            config,
            poisoned: HashSet::new(),
            produced: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Public mutating operations
    // -----------------------------------------------------------------------

    /// Register and match an order, returning every trade it produced
    /// (including trades cascading from stop triggers)
    pub fn add_order(
        &mut self,
        record: OrderRecord,
        timestamp: i64,
    ) -> Result<Vec<TradeRecord>, EngineError> {
        let key = pair_key(record.base_token, record.quote_token);
        if self.poisoned.contains(&key) {
            return Err(EngineError::PairPoisoned(key));
        }
        if self.store.contains(&record.id) {
            return Err(EngineError::DuplicateOrder(record.id));
        }

        let id = record.id;
        let order_type = record.order_type;
        self.ensure_book(record.base_token, record.quote_token);
        self.store.insert(record);

        self.produced.clear();
        match order_type {
            OrderType::Limit => self.limit_path(id, false, timestamp),
            OrderType::Market => self.market_path(id, false, timestamp),
            OrderType::StopLoss | OrderType::StopLimit => self.stop_path(id, timestamp),
        }
        Ok(std::mem::take(&mut self.produced))
    }

    /// Update the reference price for a pair (and its inverse), scanning for
    /// stop triggers on both orientations
    pub fn update_market_price(
        &mut self,
        base: Address,
        quote: Address,
        price: f64,
        source: PriceSource,
        timestamp: i64,
    ) -> Vec<TradeRecord> {
        self.produced.clear();
        self.apply_price_update(base, quote, price, source, false, timestamp);
        std::mem::take(&mut self.produced)
    }

    /// Remove an order from every book list and transition it to CANCELLED.
    /// Terminal records are left untouched.
    pub fn cancel_order(
        &mut self,
        id: &Uuid,
        reason: impl Into<String>,
        timestamp: i64,
    ) -> Result<OrderRecord, EngineError> {
        let (base, quote) = {
            let record = self.store.get(id).ok_or(EngineError::UnknownOrder(*id))?;
            if record.status.is_terminal() {
                return Ok(record.clone());
            }
            (record.base_token, record.quote_token)
        };

        let key = pair_key(base, quote);
        if let Some(book) = self.books.get_mut(&key) {
            book.remove_everywhere(id);
        }
        let record = self.store.get_mut(id).expect("record fetched above");
        record.cancel(reason, timestamp);
        tracing::info!(order = %id, "order cancelled");
        Ok(record.clone())
    }

    /// Record a settlement outcome on a trade in the pair's history
    pub fn attach_settlement(&mut self, pair: &str, trade_id: &Uuid, outcome: SettlementOutcome) {
        if let Some(book) = self.books.get_mut(pair) {
            if let Some(trade) = book.trades.iter_mut().find(|trade| trade.id == *trade_id) {
                trade.settlement = Some(outcome);
            }
        }
    }

    /// Expire every active order whose deadline has passed
    pub fn expire_due_orders(&mut self, now_seconds: u64, timestamp: i64) -> Vec<Uuid> {
        let due = self.store.expired_ids(now_seconds);
        for id in &due {
            if let Some(record) = self.store.get(id) {
                let key = pair_key(record.base_token, record.quote_token);
                if let Some(book) = self.books.get_mut(&key) {
                    book.remove_everywhere(id);
                }
            }
            if let Some(record) = self.store.get_mut(id) {
                record.expire(timestamp);
                tracing::info!(order = %id, "order expired");
            }
        }
        due
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn get(&self, id: &Uuid) -> Option<&OrderRecord> {
        self.store.get(id)
    }

    pub fn list(&self, filter: &OrderFilter) -> Vec<OrderRecord> {
        self.store.list(filter)
    }

    pub fn market_price(&self, base: Address, quote: Address) -> Option<f64> {
        self.market_prices
            .get(&pair_key(base, quote))
            .map(|entry| entry.price)
    }

    pub fn market_price_meta(&self, base: Address, quote: Address) -> Option<&MarketPriceEntry> {
        self.market_prices.get(&pair_key(base, quote))
    }

    /// Best resting limit price on the given side of a pair
    pub fn best_limit_price(&self, base: Address, quote: Address, side: Side) -> Option<f64> {
        let book = self.books.get(&pair_key(base, quote))?;
        let list = match side {
            Side::Buy => &book.buy,
            Side::Sell => &book.sell,
        };
        list.iter()
            .filter_map(|id| self.store.get(id))
            .filter(|record| record.is_active())
            .find_map(|record| record.price)
    }

    pub fn book_snapshot(&self, base: Address, quote: Address) -> Option<BookSnapshot> {
        self.books
            .get(&pair_key(base, quote))
            .map(|book| book.snapshot(&self.store))
    }

    pub fn all_book_snapshots(&self) -> Vec<BookSnapshot> {
        self.books
            .values()
            .map(|book| book.snapshot(&self.store))
            .collect()
    }

    pub fn depth(&self, base: Address, quote: Address, levels: usize) -> Option<DepthSnapshot> {
        self.books
            .get(&pair_key(base, quote))
            .map(|book| book.depth(&self.store, levels))
    }

    pub fn recent_trades(&self, base: Address, quote: Address, limit: usize) -> Vec<TradeRecord> {
        self.books
            .get(&pair_key(base, quote))
            .map(|book| book.recent_trades(limit))
            .unwrap_or_default()
    }

    pub fn oracle_mut(&mut self) -> &mut PriceOracle {
        &mut self.oracle
    }

    pub(crate) fn store(&self) -> &OrderStore {
        &self.store
    }

    pub(crate) fn store_mut(&mut self) -> &mut OrderStore {
        &mut self.store
    }

    pub(crate) fn book_mut(&mut self, key: &str) -> Option<&mut OrderBook> {
        self.books.get_mut(key)
    }

    pub(crate) fn push_produced(&mut self, trade: TradeRecord) {
        self.produced.push(trade);
    }

    pub(crate) fn clear_produced(&mut self) {
        self.produced.clear();
    }

    pub(crate) fn take_produced(&mut self) -> Vec<TradeRecord> {
        std::mem::take(&mut self.produced)
    }

    // -----------------------------------------------------------------------
    // Order paths
    // -----------------------------------------------------------------------

    fn limit_path(&mut self, id: Uuid, skip_stop_trigger: bool, timestamp: i64) {
        // Resting opposite market orders fill first, unconditionally
        self.match_resting_markets(id, skip_stop_trigger, timestamp);

        let Some(record) = self.store.get(&id) else { return };
        if record.remaining() <= EPSILON || !record.is_active() {
            return;
        }
        let side = record.side;
        let tif = record.time_in_force;
        let allow_partial = record.order.allow_partial_fill;
        let base = record.base_token;
        let quote = record.quote_token;

        if tif == TimeInForce::PostOnly && self.best_opposite_crosses(&id) {
            if let Some(record) = self.store.get_mut(&id) {
                record.reject(RejectReason::PostOnlyWouldTrade, timestamp);
                tracing::info!(order = %id, "post-only order would trade; rejected");
            }
            return;
        }

        if tif == TimeInForce::Fok || !allow_partial {
            let fillable = self.resting_market_volume(&id) + self.crossing_limit_volume(&id);
            let remaining = self.store.get(&id).map(|r| r.remaining()).unwrap_or(0.0);
            if fillable + EPSILON < remaining {
                if let Some(record) = self.store.get_mut(&id) {
                    record.reject(RejectReason::InsufficientLiquidity, timestamp);
                    tracing::info!(order = %id, "insufficient liquidity for all-or-nothing limit");
                }
                return;
            }
        }

        self.match_crossing_limits(id, false, skip_stop_trigger, timestamp);

        let Some(record) = self.store.get(&id) else { return };
        if record.remaining() > EPSILON && record.is_active() {
            match tif {
                TimeInForce::Ioc => {
                    let record = self.store.get_mut(&id).expect("checked above");
                    record.reject(RejectReason::IocUnfilled, timestamp);
                }
                TimeInForce::Fok => {
                    let record = self.store.get_mut(&id).expect("checked above");
                    record.reject(RejectReason::InsufficientLiquidity, timestamp);
                }
                _ if !allow_partial => {
                    let record = self.store.get_mut(&id).expect("checked above");
                    record.reject(RejectReason::InsufficientLiquidity, timestamp);
                }
                _ => {
                    // TRIGGERED is transient; an unfilled rester is PENDING
                    if let Some(record) = self.store.get_mut(&id) {
                        if record.filled <= 0.0 {
                            record.status = OrderStatus::Pending;
                        }
                    }
                    let key = pair_key(base, quote);
                    let book = self.books.get_mut(&key).expect("book ensured on add");
                    book.insert_limit(id, side, &self.store);
                }
            }
        }
    }

    fn market_path(&mut self, id: Uuid, skip_stop_trigger: bool, timestamp: i64) {
        let Some(record) = self.store.get(&id) else { return };
        let side = record.side;
        let tif = record.time_in_force;
        let allow_partial = record.order.allow_partial_fill;
        let base = record.base_token;
        let quote = record.quote_token;

        // All-or-nothing pre-check; synthetic liquidity is unbounded
        if (tif == TimeInForce::Fok || !allow_partial) && !self.synthetic_eligible(&id) {
            let fillable = self.resting_market_volume(&id) + self.opposite_limit_volume(&id);
            if fillable + EPSILON < record.remaining() {
                if let Some(record) = self.store.get_mut(&id) {
                    record.reject(RejectReason::InsufficientLiquidity, timestamp);
                    tracing::info!(order = %id, "insufficient liquidity for all-or-nothing market order");
                }
                return;
            }
        }

        self.match_resting_markets(id, skip_stop_trigger, timestamp);
        if self.remaining(&id) > EPSILON {
            self.match_crossing_limits(id, true, skip_stop_trigger, timestamp);
        }

        if self.remaining(&id) > EPSILON && self.synthetic_eligible(&id) {
            self.synthetic_fill(id, timestamp);
        }

        let Some(record) = self.store.get(&id) else { return };
        if record.remaining() > EPSILON && record.is_active() {
            match tif {
                TimeInForce::Ioc => {
                    let record = self.store.get_mut(&id).expect("checked above");
                    record.reject(RejectReason::IocUnfilled, timestamp);
                }
                TimeInForce::Fok => {
                    let record = self.store.get_mut(&id).expect("checked above");
                    record.reject(RejectReason::InsufficientLiquidity, timestamp);
                }
                _ if !allow_partial => {
                    let record = self.store.get_mut(&id).expect("checked above");
                    record.reject(RejectReason::InsufficientLiquidity, timestamp);
                }
                _ => {
                    if let Some(record) = self.store.get_mut(&id) {
                        if record.filled <= 0.0 {
                            record.status = OrderStatus::Pending;
                        }
                    }
                    let key = pair_key(base, quote);
                    let book = self.books.get_mut(&key).expect("book ensured on add");
                    let list = match side {
                        Side::Buy => BookList::MarketBuy,
                        Side::Sell => BookList::MarketSell,
                    };
                    book.list_mut(list).push(id);
                }
            }
        }
    }

    fn stop_path(&mut self, id: Uuid, timestamp: i64) {
        let Some(record) = self.store.get_mut(&id) else { return };
        if record.stop_price_display() <= 0.0 {
            record.reject(RejectReason::InvalidStopPrice, timestamp);
            return;
        }
        record.status = OrderStatus::Pending;
        let base = record.base_token;
        let quote = record.quote_token;
        let order_type = record.order_type;

        let key = pair_key(base, quote);
        let list = match order_type {
            OrderType::StopLoss => BookList::StopLoss,
            _ => BookList::StopLimit,
        };
        self.books
            .get_mut(&key)
            .expect("book ensured on add")
            .list_mut(list)
            .push(id);

        // Immediate evaluation against the current price, when one exists
        let Some(current) = self.market_prices.get(&key).map(|entry| entry.price) else {
            return;
        };
        let triggered = self
            .store
            .get(&id)
            .map(|record| Self::stop_satisfied(record, current))
            .unwrap_or(false);
        if triggered {
            self.books
                .get_mut(&key)
                .expect("book ensured on add")
                .remove_everywhere(&id);
            let context = self.trigger_context(base, quote, timestamp);
            self.run_trigger_pipeline(base, quote, vec![id], context, timestamp);
        }
    }

    // -----------------------------------------------------------------------
    // Matching loops
    // -----------------------------------------------------------------------

    fn remaining(&self, id: &Uuid) -> f64 {
        self.store.get(id).map(|r| r.remaining()).unwrap_or(0.0)
    }

    fn opposite_market_list(&self, id: &Uuid) -> Option<(String, BookList)> {
        let record = self.store.get(id)?;
        let key = pair_key(record.base_token, record.quote_token);
        let list = match record.side {
            Side::Buy => BookList::MarketSell,
            Side::Sell => BookList::MarketBuy,
        };
        Some((key, list))
    }

    fn opposite_limit_list(&self, id: &Uuid) -> Option<(String, BookList)> {
        let record = self.store.get(id)?;
        let key = pair_key(record.base_token, record.quote_token);
        let list = match record.side {
            Side::Buy => BookList::Sell,
            Side::Sell => BookList::Buy,
        };
        Some((key, list))
    }

    /// Whether the maker's price satisfies the taker's limit
    fn crosses(taker_side: Side, taker_price: f64, maker_price: f64) -> bool {
        match taker_side {
            Side::Buy => maker_price <= taker_price,
            Side::Sell => maker_price >= taker_price,
        }
    }

    fn best_opposite_crosses(&self, id: &Uuid) -> bool {
        let Some(record) = self.store.get(id) else { return false };
        let Some(taker_price) = record.price else { return false };
        let Some((key, list)) = self.opposite_limit_list(id) else { return false };
        let Some(book) = self.books.get(&key) else { return false };
        book.list(list)
            .iter()
            .filter_map(|maker_id| self.store.get(maker_id))
            .filter(|maker| maker.is_active())
            .find_map(|maker| maker.price)
            .map(|maker_price| Self::crosses(record.side, taker_price, maker_price))
            .unwrap_or(false)
    }

    fn resting_market_volume(&self, id: &Uuid) -> f64 {
        let Some((key, list)) = self.opposite_market_list(id) else { return 0.0 };
        let Some(book) = self.books.get(&key) else { return 0.0 };
        book.list(list)
            .iter()
            .filter_map(|maker_id| self.store.get(maker_id))
            .filter(|maker| maker.is_active())
            .map(|maker| maker.remaining())
            .sum()
    }

    fn crossing_limit_volume(&self, id: &Uuid) -> f64 {
        let Some(record) = self.store.get(id) else { return 0.0 };
        let Some(taker_price) = record.price else { return 0.0 };
        self.limit_volume_where(id, |maker_price| {
            Self::crosses(record.side, taker_price, maker_price)
        })
    }

    fn opposite_limit_volume(&self, id: &Uuid) -> f64 {
        self.limit_volume_where(id, |_| true)
    }

    fn limit_volume_where(&self, id: &Uuid, predicate: impl Fn(f64) -> bool) -> f64 {
        let Some((key, list)) = self.opposite_limit_list(id) else { return 0.0 };
        let Some(book) = self.books.get(&key) else { return 0.0 };
        book.list(list)
            .iter()
            .filter_map(|maker_id| self.store.get(maker_id))
            .filter(|maker| maker.is_active())
            .filter(|maker| predicate(maker.price.unwrap_or(0.0)))
            .map(|maker| maker.remaining())
            .sum()
    }

    /// Match the taker against the resting opposite market queue
    fn match_resting_markets(&mut self, taker_id: Uuid, skip_stop_trigger: bool, timestamp: i64) {
        loop {
            if self.remaining(&taker_id) <= EPSILON {
                break;
            }
            let Some((key, list)) = self.opposite_market_list(&taker_id) else { break };
            let Some(book) = self.books.get_mut(&key) else { break };
            // Drop stale ids whose records went terminal
            let maker_id = loop {
                match book.list(list).first().copied() {
                    Some(candidate) => {
                        let active = self
                            .store
                            .get(&candidate)
                            .map(|record| record.is_active() && record.remaining() > EPSILON)
                            .unwrap_or(false);
                        if active {
                            break Some(candidate);
                        }
                        book.list_mut(list).remove(0);
                    }
                    None => break None,
                }
            };
            let Some(maker_id) = maker_id else { break };
            if !self.execute_match(taker_id, maker_id, skip_stop_trigger, timestamp) {
                break;
            }
            self.evict_if_done(&maker_id);
        }
    }

    /// Match the taker against the opposite limit list
    ///
    /// `unconditional` skips the price predicate (market takers).
    fn match_crossing_limits(
        &mut self,
        taker_id: Uuid,
        unconditional: bool,
        skip_stop_trigger: bool,
        timestamp: i64,
    ) {
        loop {
            if self.remaining(&taker_id) <= EPSILON {
                break;
            }
            let Some(record) = self.store.get(&taker_id) else { break };
            if !record.is_active() {
                break;
            }
            let taker_side = record.side;
            let taker_price = record.price;
            let Some((key, list)) = self.opposite_limit_list(&taker_id) else { break };
            let Some(book) = self.books.get_mut(&key) else { break };
            let maker_id = loop {
                match book.list(list).first().copied() {
                    Some(candidate) => {
                        let active = self
                            .store
                            .get(&candidate)
                            .map(|record| record.is_active() && record.remaining() > EPSILON)
                            .unwrap_or(false);
                        if active {
                            break Some(candidate);
                        }
                        book.list_mut(list).remove(0);
                    }
                    None => break None,
                }
            };
            let Some(maker_id) = maker_id else { break };

            if !unconditional {
                let maker_price = self
                    .store
                    .get(&maker_id)
                    .and_then(|maker| maker.price)
                    .unwrap_or(0.0);
                let Some(taker_price) = taker_price else { break };
                if !Self::crosses(taker_side, taker_price, maker_price) {
                    break;
                }
            }

            if !self.execute_match(taker_id, maker_id, skip_stop_trigger, timestamp) {
                break;
            }
            self.evict_if_done(&maker_id);
        }
    }

    /// Fill taker against maker once; returns false when no fill happened
    fn execute_match(
        &mut self,
        taker_id: Uuid,
        maker_id: Uuid,
        skip_stop_trigger: bool,
        timestamp: i64,
    ) -> bool {
        let (amount, trade_price, base, quote, taker_side, maker_is_market_buy, taker_is_market_buy) = {
            let Some(taker) = self.store.get(&taker_id) else { return false };
            let Some(maker) = self.store.get(&maker_id) else { return false };
            let amount = taker.remaining().min(maker.remaining());
            if amount <= EPSILON {
                return false;
            }
            let snapshot = self
                .market_prices
                .get(&pair_key(taker.base_token, taker.quote_token))
                .map(|entry| entry.price);
            let trade_price = maker
                .price
                .filter(|price| *price > 0.0)
                .or(taker.price.filter(|price| *price > 0.0))
                .or(snapshot)
                .unwrap_or(0.0);
            (
                amount,
                trade_price,
                taker.base_token,
                taker.quote_token,
                taker.side,
                maker.order_type == OrderType::Market && maker.side == Side::Buy,
                taker.order_type == OrderType::Market && taker.side == Side::Buy,
            )
        };

        self.record_fill_pair(
            taker_id,
            maker_id,
            amount,
            trade_price,
            taker_side,
            PriceSource::Orderbook,
            None,
            timestamp,
        );

        tracing::debug!(
            taker = %taker_id,
            maker = %maker_id,
            amount,
            price = trade_price,
            "trade executed"
        );

        if trade_price > 0.0 {
            self.apply_price_update(
                base,
                quote,
                trade_price,
                PriceSource::Orderbook,
                skip_stop_trigger,
                timestamp,
            );
            self.oracle.register_trade(TradeRegistration {
                base,
                quote,
                price: trade_price,
                base_amount: Some(amount),
                quote_amount: Some(amount * trade_price),
                side: Some(taker_side),
                source: Some(PriceSource::Orderbook),
                timestamp,
            });
        }

        if maker_is_market_buy {
            self.apply_market_buy_impact(base, quote, amount, trade_price, skip_stop_trigger, timestamp);
        }
        if taker_is_market_buy {
            self.apply_market_buy_impact(base, quote, amount, trade_price, skip_stop_trigger, timestamp);
        }

        true
    }

    /// Apply a fill to both sides and record the trade everywhere
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn record_fill_pair(
        &mut self,
        taker_id: Uuid,
        maker_id: Uuid,
        amount: f64,
        price: f64,
        taker_side: Side,
        source: PriceSource,
        batch_id: Option<Uuid>,
        timestamp: i64,
    ) -> TradeRecord {
        let (base, quote) = {
            let taker = self.store.get(&taker_id).expect("taker exists");
            (taker.base_token, taker.quote_token)
        };
        let key = pair_key(base, quote);

        {
            let maker_tag = maker_id.to_string();
            let taker = self.store.get_mut(&taker_id).expect("taker exists");
            taker.apply_fill(amount, price, maker_tag, timestamp, batch_id);
            if taker.filled > taker.amount + 1e-6 {
                self.poisoned.insert(key.clone());
            }
        }
        {
            let taker_tag = taker_id.to_string();
            let maker = self.store.get_mut(&maker_id).expect("maker exists");
            maker.apply_fill(amount, price, taker_tag, timestamp, batch_id);
            if maker.filled > maker.amount + 1e-6 {
                self.poisoned.insert(key.clone());
            }
        }

        let (buy_id, sell_id) = match taker_side {
            Side::Buy => (taker_id, maker_id),
            Side::Sell => (maker_id, taker_id),
        };
        let trade = TradeRecord {
            id: Uuid::new_v4(),
            pair: key.clone(),
            price,
            amount,
            buy_order_id: Some(buy_id),
            sell_order_id: Some(sell_id),
            maker_order_id: Some(maker_id),
            taker_order_id: Some(taker_id),
            taker_side,
            source,
            synthetic: false,
            synthetic_quote_amount: None,
            batch_id,
            fill_amount: None,
            executed_at: timestamp,
            settlement: None,
        };

        for id in [taker_id, maker_id] {
            if let Some(record) = self.store.get_mut(&id) {
                record.metadata.trades.push(trade.id);
            }
        }
        if let Some(book) = self.books.get_mut(&key) {
            book.record_trade(trade.clone());
        }
        self.produced.push(trade.clone());
        trade
    }

    fn evict_if_done(&mut self, id: &Uuid) {
        let done = self
            .store
            .get(id)
            .map(|record| !record.is_active() || record.remaining() <= EPSILON)
            .unwrap_or(true);
        if done {
            if let Some(record) = self.store.get(id) {
                let key = pair_key(record.base_token, record.quote_token);
                if let Some(book) = self.books.get_mut(&key) {
                    book.remove_everywhere(id);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Synthetic liquidity
    // -----------------------------------------------------------------------

    fn resolved_price(&self, id: &Uuid) -> Option<f64> {
        let record = self.store.get(id)?;
        record
            .metadata
            .triggered_price
            .filter(|price| *price > 0.0)
            .or(record.price.filter(|price| *price > 0.0))
    }

    fn synthetic_eligible(&self, id: &Uuid) -> bool {
        let Some(record) = self.store.get(id) else { return false };
        if record.order_type != OrderType::Market || record.remaining() <= EPSILON {
            return false;
        }
        if self.resolved_price(id).is_none() {
            return false;
        }
        let order_synthetic = record.metadata.price_source == Some(PriceSource::Synthetic);
        let pair_synthetic = self
            .market_prices
            .get(&pair_key(record.base_token, record.quote_token))
            .map(|entry| entry.source == PriceSource::Synthetic)
            .unwrap_or(false);
        order_synthetic || pair_synthetic
    }

    /// Fill the entire remainder against a freshly minted synthetic
    /// counterparty at the resolved price
    fn synthetic_fill(&mut self, id: Uuid, timestamp: i64) {
        let Some(price) = self.resolved_price(&id) else { return };
        let (remaining, side, base, quote, is_market_buy) = {
            let Some(record) = self.store.get(&id) else { return };
            (
                record.remaining(),
                record.side,
                record.base_token,
                record.quote_token,
                record.order_type == OrderType::Market && record.side == Side::Buy,
            )
        };
        if remaining <= EPSILON {
            return;
        }

        let counterparty = format!("synthetic-liquidity-{:08x}", rand::random::<u32>());
        let key = pair_key(base, quote);
        let quote_amount = remaining * price;

        {
            let record = self.store.get_mut(&id).expect("checked above");
            record.apply_fill(remaining, price, counterparty.clone(), timestamp, None);
            record.metadata.synthetic_fill = Some(types::order::SyntheticFill {
                counterparty: counterparty.clone(),
                price,
                amount: remaining,
                quote_amount,
                filled_at: timestamp,
            });
        }

        let trade = TradeRecord {
            id: Uuid::new_v4(),
            pair: key.clone(),
            price,
            amount: remaining,
            buy_order_id: (side == Side::Buy).then_some(id),
            sell_order_id: (side == Side::Sell).then_some(id),
            maker_order_id: None,
            taker_order_id: Some(id),
            taker_side: side,
            source: PriceSource::Synthetic,
            synthetic: true,
            synthetic_quote_amount: Some(quote_amount),
            batch_id: None,
            fill_amount: None,
            executed_at: timestamp,
            settlement: None,
        };
        if let Some(record) = self.store.get_mut(&id) {
            record.metadata.trades.push(trade.id);
        }
        if let Some(book) = self.books.get_mut(&key) {
            book.record_trade(trade.clone());
        }
        self.produced.push(trade);

        tracing::info!(order = %id, amount = remaining, price, "synthetic liquidity fill");

        // Never re-triggers stops within this call
        self.apply_price_update(base, quote, price, PriceSource::Synthetic, true, timestamp);
        self.oracle.register_trade(TradeRegistration {
            base,
            quote,
            price,
            base_amount: Some(remaining),
            quote_amount: Some(quote_amount),
            side: Some(side),
            source: Some(PriceSource::Synthetic),
            timestamp,
        });
        if is_market_buy {
            self.apply_market_buy_impact(base, quote, remaining, price, true, timestamp);
        }
    }

    // -----------------------------------------------------------------------
    // Market-buy impact
    // -----------------------------------------------------------------------

    fn apply_market_buy_impact(
        &mut self,
        base: Address,
        quote: Address,
        amount: f64,
        reference_price: f64,
        skip_stop_trigger: bool,
        timestamp: i64,
    ) {
        let baseline = self
            .market_prices
            .get(&pair_key(base, quote))
            .map(|entry| entry.price)
            .unwrap_or(reference_price);
        if baseline <= 0.0 {
            return;
        }
        let boosted = baseline + amount * self.config.impact_rate;
        if boosted <= baseline {
            return;
        }
        tracing::debug!(baseline, boosted, "market-buy price impact");
        self.apply_price_update(
            base,
            quote,
            boosted,
            PriceSource::MarketBuyImpact,
            skip_stop_trigger,
            timestamp,
        );
        self.oracle.register_trade(TradeRegistration {
            base,
            quote,
            price: boosted,
            base_amount: Some(amount),
            quote_amount: None,
            side: Some(Side::Buy),
            source: Some(PriceSource::MarketBuyImpact),
            timestamp,
        });
    }

    // -----------------------------------------------------------------------
    // Market price table & stop triggering
    // -----------------------------------------------------------------------

    /// Write both orientations of the price table, then scan stops unless
    /// this update originates from a stop-triggered trade
    pub(crate) fn apply_price_update(
        &mut self,
        base: Address,
        quote: Address,
        price: f64,
        source: PriceSource,
        skip_stop_trigger: bool,
        timestamp: i64,
    ) {
        if !price.is_finite() || price <= 0.0 {
            return;
        }
        for (key, oriented) in [
            (pair_key(base, quote), price),
            (pair_key(quote, base), 1.0 / price),
        ] {
            let previous = self.market_prices.get(&key).map(|entry| entry.price);
            self.market_prices.insert(
                key,
                MarketPriceEntry {
                    price: oriented,
                    previous_price: previous,
                    source,
                    updated_at: timestamp,
                },
            );
        }
        if !skip_stop_trigger {
            self.scan_stop_triggers(base, quote, timestamp);
        }
    }

    fn stop_satisfied(record: &OrderRecord, current_price: f64) -> bool {
        let stop = record.stop_price_display();
        if stop <= 0.0 {
            return false;
        }
        match record.side {
            Side::Sell => current_price <= stop,
            Side::Buy => current_price >= stop,
        }
    }

    fn trigger_context(&mut self, base: Address, quote: Address, timestamp: i64) -> TriggerContext {
        let key = pair_key(base, quote);
        if let Some(entry) = self.market_prices.get(&key) {
            return TriggerContext {
                price: entry.price,
                source: entry.source,
            };
        }
        // Promote an oracle snapshot so the pipeline has a reference price
        let estimate = self.oracle.estimate_pair_price(base, quote);
        self.apply_price_update(base, quote, estimate, PriceSource::Synthetic, true, timestamp);
        TriggerContext {
            price: estimate,
            source: PriceSource::Synthetic,
        }
    }

    /// Scan the stop lists of both orientations of a pair
    fn scan_stop_triggers(&mut self, base: Address, quote: Address, timestamp: i64) {
        for (book_base, book_quote) in [(base, quote), (quote, base)] {
            let key = pair_key(book_base, book_quote);
            let Some(current) = self.market_prices.get(&key).map(|entry| entry.price) else {
                continue;
            };
            let Some(book) = self.books.get(&key) else { continue };

            let mut triggered: Vec<Uuid> = Vec::new();
            for list in [BookList::StopLoss, BookList::StopLimit] {
                for id in book.list(list) {
                    if let Some(record) = self.store.get(id) {
                        if record.is_active() && Self::stop_satisfied(record, current) {
                            triggered.push(*id);
                        }
                    }
                }
            }
            if triggered.is_empty() {
                continue;
            }

            let book = self.books.get_mut(&key).expect("book exists");
            for id in &triggered {
                book.remove_everywhere(id);
            }
            let context = self.trigger_context(book_base, book_quote, timestamp);
            self.run_trigger_pipeline(book_base, book_quote, triggered, context, timestamp);
        }
    }

    /// Convert triggered stops and route them back through the limit/market
    /// paths, cross-matching opposite market stops within the batch first
    fn run_trigger_pipeline(
        &mut self,
        base: Address,
        quote: Address,
        triggered: Vec<Uuid>,
        context: TriggerContext,
        timestamp: i64,
    ) {
        let mut stop_limits: Vec<Uuid> = Vec::new();
        let mut stop_losses: Vec<Uuid> = Vec::new();

        for id in triggered {
            let Some(record) = self.store.get_mut(&id) else { continue };
            record.triggered_at = Some(timestamp);
            record.metadata.triggered_price = Some(context.price);
            record.metadata.trigger_source = Some(context.source);
            record.status = OrderStatus::Triggered;
            record.updated_at = timestamp;
            tracing::info!(order = %id, price = context.price, "stop order triggered");
            match record.order_type {
                OrderType::StopLimit => {
                    record.order_type = OrderType::Limit;
                    record.order.order_type = OrderType::Limit;
                    stop_limits.push(id);
                }
                _ => {
                    record.order_type = OrderType::Market;
                    record.order.order_type = OrderType::Market;
                    stop_losses.push(id);
                }
            }
        }

        for id in stop_limits {
            self.limit_path(id, true, timestamp);
        }

        let survivors = self.cross_match_triggered(&stop_losses, context, timestamp);
        for id in survivors {
            self.market_path(id, true, timestamp);
        }
    }

    /// Pair triggered BUY and SELL market stops against each other
    ///
    /// The older order is the maker. Returns ids still carrying remainder.
    fn cross_match_triggered(
        &mut self,
        ids: &[Uuid],
        context: TriggerContext,
        timestamp: i64,
    ) -> Vec<Uuid> {
        let mut by_age: Vec<Uuid> = ids.to_vec();
        by_age.sort_by_key(|id| self.store.get(id).map(|r| r.created_at).unwrap_or(i64::MAX));

        let mut buys: Vec<Uuid> = by_age
            .iter()
            .copied()
            .filter(|id| self.store.get(id).map(|r| r.side == Side::Buy).unwrap_or(false))
            .collect();
        let mut sells: Vec<Uuid> = by_age
            .iter()
            .copied()
            .filter(|id| self.store.get(id).map(|r| r.side == Side::Sell).unwrap_or(false))
            .collect();

        while let (Some(&buy_id), Some(&sell_id)) = (buys.first(), sells.first()) {
            let (amount, price, maker_id, taker_id, taker_side, base, quote) = {
                let Some(buy) = self.store.get(&buy_id) else {
                    buys.remove(0);
                    continue;
                };
                let Some(sell) = self.store.get(&sell_id) else {
                    sells.remove(0);
                    continue;
                };
                let amount = buy.remaining().min(sell.remaining());

                let constraint_ok = |record: &OrderRecord| {
                    let full = amount + EPSILON >= record.remaining();
                    let min_ok = record.min_fill_base() <= amount + EPSILON;
                    let all_or_nothing = record.time_in_force == TimeInForce::Fok
                        || !record.order.allow_partial_fill;
                    min_ok && (!all_or_nothing || full)
                };
                if amount <= EPSILON || !constraint_ok(buy) || !constraint_ok(sell) {
                    // Give the smaller remainder to the market path instead
                    if buy.remaining() <= sell.remaining() {
                        buys.remove(0);
                    } else {
                        sells.remove(0);
                    }
                    continue;
                }

                let price = if context.price.is_finite() && context.price > 0.0 {
                    context.price
                } else {
                    let buy_stop = buy.stop_price_display();
                    let sell_stop = sell.stop_price_display();
                    match (buy_stop > 0.0, sell_stop > 0.0) {
                        (true, true) => (buy_stop + sell_stop) / 2.0,
                        (true, false) => buy_stop,
                        (false, true) => sell_stop,
                        (false, false) => self
                            .market_prices
                            .get(&pair_key(buy.base_token, buy.quote_token))
                            .map(|entry| entry.price)
                            .unwrap_or(0.0),
                    }
                };

                let (maker_id, taker_id) = if buy.created_at <= sell.created_at {
                    (buy_id, sell_id)
                } else {
                    (sell_id, buy_id)
                };
                let taker_side = if taker_id == buy_id { Side::Buy } else { Side::Sell };
                (amount, price, maker_id, taker_id, taker_side, buy.base_token, buy.quote_token)
            };

            self.record_fill_pair(
                taker_id, maker_id, amount, price, taker_side, PriceSource::Orderbook, None,
                timestamp,
            );
            if price > 0.0 {
                // Stop-triggered fill: never re-trigger within this call
                self.apply_price_update(base, quote, price, PriceSource::Orderbook, true, timestamp);
                self.oracle.register_trade(TradeRegistration {
                    base,
                    quote,
                    price,
                    base_amount: Some(amount),
                    quote_amount: Some(amount * price),
                    side: Some(taker_side),
                    source: Some(PriceSource::Orderbook),
                    timestamp,
                });
            }

            if self.remaining(&buy_id) <= EPSILON {
                buys.remove(0);
            }
            if self.remaining(&sell_id) <= EPSILON {
                sells.remove(0);
            }
        }

        buys.into_iter()
            .chain(sells)
            .filter(|id| {
                self.store
                    .get(id)
                    .map(|record| record.is_active() && record.remaining() > EPSILON)
                    .unwrap_or(false)
            })
            .collect()
    }

    fn ensure_book(&mut self, base: Address, quote: Address) {
        let key = pair_key(base, quote);
        self.books
            .entry(key)
            .or_insert_with(|| OrderBook::new(base, quote));
    }
}
