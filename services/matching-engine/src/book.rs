//! Per-pair order book
//!
//! Six sequences per pair: price-sorted limit lists, time-sorted resting
//! market queues, and insertion-ordered stop queues, plus a bounded FIFO
//! trade history. Lists hold record ids; the store owns the records.

use crate::store::OrderStore;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use types::order::{OrderRecord, Side};
use types::trade::TradeRecord;
use uuid::Uuid;

/// Bound on the per-pair trade history
pub const TRADE_HISTORY_LIMIT: usize = 200;

/// Which of the six book lists an id lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookList {
    Buy,
    Sell,
    MarketBuy,
    MarketSell,
    StopLoss,
    StopLimit,
}

/// Order book for one oriented pair
#[derive(Debug, Clone)]
pub struct OrderBook {
    pub base_token: Address,
    pub quote_token: Address,
    /// Limit buys, price descending then time ascending
    pub buy: Vec<Uuid>,
    /// Limit sells, price ascending then time ascending
    pub sell: Vec<Uuid>,
    /// Resting market orders, FIFO
    pub market_buy: Vec<Uuid>,
    pub market_sell: Vec<Uuid>,
    /// Stop queues, insertion-ordered
    pub stop_loss: Vec<Uuid>,
    pub stop_limit: Vec<Uuid>,
    pub trades: VecDeque<TradeRecord>,
}

impl OrderBook {
    pub fn new(base_token: Address, quote_token: Address) -> Self {
        Self {
            base_token,
            quote_token,
            buy: Vec::new(),
            sell: Vec::new(),
            market_buy: Vec::new(),
            market_sell: Vec::new(),
            stop_loss: Vec::new(),
            stop_limit: Vec::new(),
            trades: VecDeque::new(),
        }
    }

    pub fn list(&self, list: BookList) -> &Vec<Uuid> {
        match list {
            BookList::Buy => &self.buy,
            BookList::Sell => &self.sell,
            BookList::MarketBuy => &self.market_buy,
            BookList::MarketSell => &self.market_sell,
            BookList::StopLoss => &self.stop_loss,
            BookList::StopLimit => &self.stop_limit,
        }
    }

    pub fn list_mut(&mut self, list: BookList) -> &mut Vec<Uuid> {
        match list {
            BookList::Buy => &mut self.buy,
            BookList::Sell => &mut self.sell,
            BookList::MarketBuy => &mut self.market_buy,
            BookList::MarketSell => &mut self.market_sell,
            BookList::StopLoss => &mut self.stop_loss,
            BookList::StopLimit => &mut self.stop_limit,
        }
    }

    /// Insert into a limit list and restore price-time order
    pub fn insert_limit(&mut self, id: Uuid, side: Side, store: &OrderStore) {
        let list = match side {
            Side::Buy => BookList::Buy,
            Side::Sell => BookList::Sell,
        };
        self.list_mut(list).push(id);
        self.sort_limits(side, store);
    }

    /// Re-sort a limit list by price-time priority
    ///
    /// Buys: price descending; sells: ascending. A missing price sorts as
    /// zero. Ties break on earlier creation.
    pub fn sort_limits(&mut self, side: Side, store: &OrderStore) {
        let keyed = |id: &Uuid| -> (f64, i64) {
            store
                .get(id)
                .map(|record| (record.price.unwrap_or(0.0), record.created_at))
                .unwrap_or((0.0, i64::MAX))
        };
        match side {
            Side::Buy => self.buy.sort_by(|a, b| {
                let (pa, ta) = keyed(a);
                let (pb, tb) = keyed(b);
                pb.partial_cmp(&pa)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(ta.cmp(&tb))
            }),
            Side::Sell => self.sell.sort_by(|a, b| {
                let (pa, ta) = keyed(a);
                let (pb, tb) = keyed(b);
                pa.partial_cmp(&pb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(ta.cmp(&tb))
            }),
        }
    }

    /// Remove an id from every list it appears in
    pub fn remove_everywhere(&mut self, id: &Uuid) {
        for list in [
            BookList::Buy,
            BookList::Sell,
            BookList::MarketBuy,
            BookList::MarketSell,
            BookList::StopLoss,
            BookList::StopLimit,
        ] {
            self.list_mut(list).retain(|entry| entry != id);
        }
    }

    /// Append to the bounded trade history, evicting the oldest
    pub fn record_trade(&mut self, trade: TradeRecord) {
        if self.trades.len() >= TRADE_HISTORY_LIMIT {
            self.trades.pop_front();
        }
        self.trades.push_back(trade);
    }

    pub fn recent_trades(&self, limit: usize) -> Vec<TradeRecord> {
        self.trades.iter().rev().take(limit).cloned().collect()
    }
}

/// Materialized book view with records resolved from the store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookSnapshot {
    pub base_token: Address,
    pub quote_token: Address,
    pub buy: Vec<OrderRecord>,
    pub sell: Vec<OrderRecord>,
    pub market_buy: Vec<OrderRecord>,
    pub market_sell: Vec<OrderRecord>,
    pub stop_loss: Vec<OrderRecord>,
    pub stop_limit: Vec<OrderRecord>,
    pub trades: Vec<TradeRecord>,
}

/// Aggregated (price, quantity) depth levels for the limit sides
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthSnapshot {
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
}

impl OrderBook {
    pub fn snapshot(&self, store: &OrderStore) -> BookSnapshot {
        let resolve = |ids: &Vec<Uuid>| -> Vec<OrderRecord> {
            ids.iter().filter_map(|id| store.get(id).cloned()).collect()
        };
        BookSnapshot {
            base_token: self.base_token,
            quote_token: self.quote_token,
            buy: resolve(&self.buy),
            sell: resolve(&self.sell),
            market_buy: resolve(&self.market_buy),
            market_sell: resolve(&self.market_sell),
            stop_loss: resolve(&self.stop_loss),
            stop_limit: resolve(&self.stop_limit),
            trades: self.trades.iter().cloned().collect(),
        }
    }

    /// Aggregate limit levels into (price, total remaining) tuples
    pub fn depth(&self, store: &OrderStore, levels: usize) -> DepthSnapshot {
        let aggregate = |ids: &Vec<Uuid>| -> Vec<(f64, f64)> {
            let mut out: Vec<(f64, f64)> = Vec::new();
            for id in ids {
                let Some(record) = store.get(id) else { continue };
                let price = record.price.unwrap_or(0.0);
                match out.last_mut() {
                    Some((level_price, quantity)) if *level_price == price => {
                        *quantity += record.remaining()
                    }
                    _ => out.push((price, record.remaining())),
                }
            }
            out.truncate(levels);
            out
        };
        DepthSnapshot {
            bids: aggregate(&self.buy),
            asks: aggregate(&self.sell),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, U256};
    use types::order::{CanonicalOrder, OrderMetadata, OrderStatus, OrderType, TimeInForce};
    use types::order::PriceSource;

    const BASE: Address = address!("0000000000000000000000000000000000000001");
    const QUOTE: Address = address!("0000000000000000000000000000000000000002");

    fn limit_record(side: Side, price: f64, created_at: i64) -> OrderRecord {
        let order = CanonicalOrder {
            maker: address!("00000000000000000000000000000000000000aa"),
            token_get: if side == Side::Sell { QUOTE } else { BASE },
            amount_get: U256::from(1u64),
            token_give: if side == Side::Sell { BASE } else { QUOTE },
            amount_give: U256::from(1u64),
            nonce: U256::ZERO,
            expiry: U256::ZERO,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::Gtc,
            side,
            stop_price: U256::ZERO,
            min_fill_amount: U256::ZERO,
            allow_partial_fill: true,
            fee_recipient: Address::ZERO,
            fee_amount: U256::ZERO,
        };
        OrderRecord {
            id: Uuid::new_v4(),
            base_token: BASE,
            quote_token: QUOTE,
            base_decimals: 18,
            quote_decimals: 18,
            side,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::Gtc,
            price: Some(price),
            amount: 10.0,
            filled: 0.0,
            status: OrderStatus::Pending,
            created_at,
            updated_at: created_at,
            triggered_at: None,
            executions: Vec::new(),
            metadata: OrderMetadata::default(),
            signature: None,
            order,
        }
    }

    fn trade(price: f64) -> TradeRecord {
        TradeRecord {
            id: Uuid::new_v4(),
            pair: "test".into(),
            price,
            amount: 1.0,
            buy_order_id: None,
            sell_order_id: None,
            maker_order_id: None,
            taker_order_id: None,
            taker_side: Side::Buy,
            source: PriceSource::Orderbook,
            synthetic: false,
            synthetic_quote_amount: None,
            batch_id: None,
            fill_amount: None,
            executed_at: 0,
            settlement: None,
        }
    }

    #[test]
    fn test_buy_list_price_time_priority() {
        let mut store = OrderStore::new();
        let mut book = OrderBook::new(BASE, QUOTE);

        let low = limit_record(Side::Buy, 99.0, 100);
        let high = limit_record(Side::Buy, 101.0, 200);
        let high_earlier = limit_record(Side::Buy, 101.0, 50);
        let ids = [low.id, high.id, high_earlier.id];
        for record in [low, high, high_earlier] {
            let id = record.id;
            store.insert(record);
            book.insert_limit(id, Side::Buy, &store);
        }

        assert_eq!(book.buy[0], ids[2]); // 101 at t=50
        assert_eq!(book.buy[1], ids[1]); // 101 at t=200
        assert_eq!(book.buy[2], ids[0]); // 99
    }

    #[test]
    fn test_sell_list_ascending() {
        let mut store = OrderStore::new();
        let mut book = OrderBook::new(BASE, QUOTE);

        let cheap = limit_record(Side::Sell, 95.0, 200);
        let pricey = limit_record(Side::Sell, 105.0, 100);
        let cheap_id = cheap.id;
        for record in [pricey, cheap] {
            let id = record.id;
            store.insert(record);
            book.insert_limit(id, Side::Sell, &store);
        }

        assert_eq!(book.sell[0], cheap_id);
    }

    #[test]
    fn test_remove_everywhere() {
        let mut store = OrderStore::new();
        let mut book = OrderBook::new(BASE, QUOTE);
        let record = limit_record(Side::Buy, 100.0, 1);
        let id = record.id;
        store.insert(record);
        book.insert_limit(id, Side::Buy, &store);
        book.stop_loss.push(id);

        book.remove_everywhere(&id);
        assert!(book.buy.is_empty());
        assert!(book.stop_loss.is_empty());
    }

    #[test]
    fn test_trade_history_bounded() {
        let mut book = OrderBook::new(BASE, QUOTE);
        for i in 0..(TRADE_HISTORY_LIMIT + 25) {
            book.record_trade(trade(i as f64));
        }
        assert_eq!(book.trades.len(), TRADE_HISTORY_LIMIT);
        // Oldest entries were evicted
        assert_eq!(book.trades.front().unwrap().price, 25.0);
        let recent = book.recent_trades(5);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].price, (TRADE_HISTORY_LIMIT + 24) as f64);
    }

    #[test]
    fn test_depth_aggregates_levels() {
        let mut store = OrderStore::new();
        let mut book = OrderBook::new(BASE, QUOTE);
        for (price, created) in [(101.0, 1), (101.0, 2), (99.0, 3)] {
            let record = limit_record(Side::Buy, price, created);
            let id = record.id;
            store.insert(record);
            book.insert_limit(id, Side::Buy, &store);
        }

        let depth = book.depth(&store, 10);
        assert_eq!(depth.bids.len(), 2);
        assert_eq!(depth.bids[0], (101.0, 20.0));
        assert_eq!(depth.bids[1], (99.0, 10.0));
    }
}
