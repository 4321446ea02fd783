//! End-to-end engine scenarios
//!
//! Exercises the full add/match/trigger/batch surface against literal
//! fixtures: stop triggering on add and on price updates, synthetic fills,
//! market-buy impact, cross-matched stop pairs, and ring settlement.

use alloy_primitives::{address, Address, U256};
use matching_engine::{EngineConfig, MatchingEngine};
use std::sync::Arc;
use types::order::{
    CanonicalOrder, OrderMetadata, OrderRecord, OrderStatus, OrderType, PriceSource, RejectReason,
    Side, TimeInForce,
};
use types::token::{InMemoryTokenDirectory, TokenInfo};
use types::units::f64_to_units;
use uuid::Uuid;

const TYD: Address = address!("0000000000000000000000000000000000000011");
const USTD: Address = address!("0000000000000000000000000000000000000022");
const AAA: Address = address!("0000000000000000000000000000000000000033");
const BBB: Address = address!("0000000000000000000000000000000000000044");
const CCC: Address = address!("0000000000000000000000000000000000000055");

fn engine() -> MatchingEngine {
    let directory = InMemoryTokenDirectory::new()
        .with_token(TokenInfo::new(TYD, "Test Yield Dollar", "TYD", 18))
        .with_token(TokenInfo::new(USTD, "Unit Stable Dollar", "USTD", 18))
        .with_token(TokenInfo::new(AAA, "Token Aaa", "AAA", 18))
        .with_token(TokenInfo::new(BBB, "Token Bbb", "BBB", 18))
        .with_token(TokenInfo::new(CCC, "Token Ccc", "CCC", 18));
    MatchingEngine::new(Arc::new(directory), EngineConfig::default())
}

struct RecordBuilder {
    base: Address,
    quote: Address,
    side: Side,
    order_type: OrderType,
    tif: TimeInForce,
    price: Option<f64>,
    amount: f64,
    stop_price: f64,
    allow_partial: bool,
    created_at: i64,
}

impl RecordBuilder {
    fn new(base: Address, quote: Address, side: Side, order_type: OrderType, amount: f64) -> Self {
        Self {
            base,
            quote,
            side,
            order_type,
            tif: TimeInForce::Gtc,
            price: None,
            amount,
            stop_price: 0.0,
            allow_partial: true,
            created_at: 1_000,
        }
    }

    fn price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    fn stop(mut self, stop_price: f64) -> Self {
        self.stop_price = stop_price;
        self
    }

    fn tif(mut self, tif: TimeInForce) -> Self {
        self.tif = tif;
        self
    }

    fn all_or_nothing(mut self) -> Self {
        self.allow_partial = false;
        self
    }

    fn at(mut self, created_at: i64) -> Self {
        self.created_at = created_at;
        self
    }

    fn build(self) -> OrderRecord {
        let reference_price = self.price.unwrap_or(if self.stop_price > 0.0 {
            self.stop_price
        } else {
            1.0
        });
        let base_units = f64_to_units(self.amount, 18).unwrap();
        let quote_units = f64_to_units(self.amount * reference_price, 18)
            .unwrap()
            .max(U256::from(1u64));
        let (token_give, amount_give, token_get, amount_get) = match self.side {
            Side::Sell => (self.base, base_units, self.quote, quote_units),
            Side::Buy => (self.quote, quote_units, self.base, base_units),
        };
        let order = CanonicalOrder {
            maker: address!("00000000000000000000000000000000000000aa"),
            token_get,
            amount_get,
            token_give,
            amount_give,
            nonce: U256::ZERO,
            expiry: U256::ZERO,
            order_type: self.order_type,
            time_in_force: self.tif,
            side: self.side,
            stop_price: f64_to_units(self.stop_price, 18).unwrap(),
            min_fill_amount: U256::ZERO,
            allow_partial_fill: self.allow_partial,
            fee_recipient: Address::ZERO,
            fee_amount: U256::ZERO,
        };
        OrderRecord {
            id: Uuid::new_v4(),
            base_token: self.base,
            quote_token: self.quote,
            base_decimals: 18,
            quote_decimals: 18,
            side: self.side,
            order_type: self.order_type,
            time_in_force: self.tif,
            price: self.price,
            amount: self.amount,
            filled: 0.0,
            status: OrderStatus::Pending,
            created_at: self.created_at,
            updated_at: self.created_at,
            triggered_at: None,
            executions: Vec::new(),
            metadata: OrderMetadata::default(),
            signature: None,
            order,
        }
    }
}

#[test]
fn buy_stop_triggers_when_added_above_current_price() {
    let mut engine = engine();
    engine.update_market_price(TYD, USTD, 6.007, PriceSource::Synthetic, 1_000);

    let stop = RecordBuilder::new(TYD, USTD, Side::Buy, OrderType::StopLoss, 1.0)
        .stop(6.0)
        .build();
    let id = stop.id;
    engine.add_order(stop, 1_100).unwrap();

    let record = engine.get(&id).unwrap();
    assert!(record.triggered_at.is_some());
    assert_eq!(record.metadata.triggered_price, Some(6.007));
    assert_eq!(record.status, OrderStatus::Filled);

    let book = engine.book_snapshot(TYD, USTD).unwrap();
    assert!(book.stop_loss.is_empty());
}

#[test]
fn opposite_stop_does_not_cascade_on_synthetic_fill() {
    let mut engine = engine();
    engine.update_market_price(TYD, USTD, 5.65, PriceSource::Synthetic, 1_000);

    let buy_stop = RecordBuilder::new(TYD, USTD, Side::Buy, OrderType::StopLoss, 1.0)
        .stop(6.0)
        .at(1_100)
        .build();
    let buy_id = buy_stop.id;
    engine.add_order(buy_stop, 1_100).unwrap();
    assert_eq!(engine.get(&buy_id).unwrap().status, OrderStatus::Pending);

    let sell_stop = RecordBuilder::new(TYD, USTD, Side::Sell, OrderType::StopLoss, 1.0)
        .stop(6.0)
        .at(1_200)
        .build();
    let sell_id = sell_stop.id;
    let trades = engine.add_order(sell_stop, 1_200).unwrap();

    // SELL stop triggered immediately (5.65 <= 6) and filled synthetically
    let sell = engine.get(&sell_id).unwrap();
    assert_eq!(sell.status, OrderStatus::Filled);
    assert!(sell.metadata.synthetic_fill.is_some());
    assert!(trades.iter().any(|trade| trade.synthetic));

    // BUY stop (needs price >= 6) stays queued
    let buy = engine.get(&buy_id).unwrap();
    assert_eq!(buy.status, OrderStatus::Pending);
    let book = engine.book_snapshot(TYD, USTD).unwrap();
    assert_eq!(book.stop_loss.len(), 1);
    assert_eq!(book.stop_loss[0].id, buy_id);
}

#[test]
fn market_order_rests_then_matches_incoming_limit() {
    let mut engine = engine();

    let market_buy = RecordBuilder::new(AAA, BBB, Side::Buy, OrderType::Market, 5.0)
        .at(1_000)
        .build();
    let market_id = market_buy.id;
    let trades = engine.add_order(market_buy, 1_000).unwrap();
    assert!(trades.is_empty());
    assert_eq!(engine.get(&market_id).unwrap().status, OrderStatus::Pending);
    let book = engine.book_snapshot(AAA, BBB).unwrap();
    assert_eq!(book.market_buy.len(), 1);

    let sell_limit = RecordBuilder::new(AAA, BBB, Side::Sell, OrderType::Limit, 5.0)
        .price(100.0)
        .at(1_100)
        .build();
    let sell_id = sell_limit.id;
    let trades = engine.add_order(sell_limit, 1_100).unwrap();

    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].amount, 5.0);
    assert_eq!(trades[0].price, 100.0);
    assert_eq!(engine.get(&market_id).unwrap().status, OrderStatus::Filled);
    assert_eq!(engine.get(&sell_id).unwrap().status, OrderStatus::Filled);

    let book = engine.book_snapshot(AAA, BBB).unwrap();
    assert!(book.market_buy.is_empty());
    assert!(book.sell.is_empty());
}

#[test]
fn market_buy_impact_boosts_reference_price() {
    let mut engine = engine();
    engine.update_market_price(AAA, BBB, 100.0, PriceSource::Synthetic, 1_000);

    let sell = RecordBuilder::new(AAA, BBB, Side::Sell, OrderType::Limit, 4.0)
        .price(100.0)
        .at(1_100)
        .build();
    engine.add_order(sell, 1_100).unwrap();

    let buy = RecordBuilder::new(AAA, BBB, Side::Buy, OrderType::Market, 2.0)
        .at(1_200)
        .build();
    let buy_id = buy.id;
    let trades = engine.add_order(buy, 1_200).unwrap();

    assert_eq!(trades.len(), 1);
    assert_eq!(engine.get(&buy_id).unwrap().status, OrderStatus::Filled);

    let meta = engine.market_price_meta(AAA, BBB).unwrap();
    assert_eq!(meta.previous_price, Some(100.0));
    assert_eq!(meta.price, 102.0);
    assert_eq!(meta.source, PriceSource::MarketBuyImpact);
}

#[test]
fn stop_pair_cross_match_on_first_price_update() {
    let mut engine = engine();

    let buy_stop = RecordBuilder::new(TYD, USTD, Side::Buy, OrderType::StopLoss, 2.0)
        .stop(6.0)
        .at(1_000)
        .build();
    let buy_id = buy_stop.id;
    engine.add_order(buy_stop, 1_000).unwrap();
    assert_eq!(engine.get(&buy_id).unwrap().status, OrderStatus::Pending);

    let sell_stop = RecordBuilder::new(TYD, USTD, Side::Sell, OrderType::StopLoss, 2.0)
        .stop(6.0)
        .at(1_100)
        .build();
    let sell_id = sell_stop.id;
    engine.add_order(sell_stop, 1_100).unwrap();
    assert_eq!(engine.get(&sell_id).unwrap().status, OrderStatus::Pending);

    let trades = engine.update_market_price(TYD, USTD, 6.0, PriceSource::Synthetic, 1_200);

    assert_eq!(engine.get(&buy_id).unwrap().status, OrderStatus::Filled);
    assert_eq!(engine.get(&sell_id).unwrap().status, OrderStatus::Filled);
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].buy_order_id, Some(buy_id));
    assert_eq!(trades[0].sell_order_id, Some(sell_id));
    assert_eq!(trades[0].price, 6.0);
    assert_eq!(trades[0].amount, 2.0);

    let book = engine.book_snapshot(TYD, USTD).unwrap();
    assert!(book.stop_loss.is_empty());
}

#[test]
fn stop_recursion_guard_blocks_cascaded_triggers() {
    let mut engine = engine();
    engine.update_market_price(TYD, USTD, 5.0, PriceSource::Synthetic, 1_000);

    // Triggers at 6, then synthetically fills and boosts the price to 8
    let near_stop = RecordBuilder::new(TYD, USTD, Side::Buy, OrderType::StopLoss, 2.0)
        .stop(6.0)
        .at(1_000)
        .build();
    let near_id = near_stop.id;
    engine.add_order(near_stop, 1_000).unwrap();

    // Would trigger at 6.5; the boosted price crosses it but only via the
    // guarded update
    let far_stop = RecordBuilder::new(TYD, USTD, Side::Buy, OrderType::StopLoss, 1.0)
        .stop(6.5)
        .at(1_100)
        .build();
    let far_id = far_stop.id;
    engine.add_order(far_stop, 1_100).unwrap();

    engine.update_market_price(TYD, USTD, 6.0, PriceSource::Synthetic, 1_200);

    assert_eq!(engine.get(&near_id).unwrap().status, OrderStatus::Filled);
    // Market-buy impact pushed the price past 6.5 but must not re-trigger
    assert!(engine.market_price(TYD, USTD).unwrap() >= 6.5);
    assert_eq!(engine.get(&far_id).unwrap().status, OrderStatus::Pending);

    // The next external update does trigger it
    engine.update_market_price(TYD, USTD, 8.1, PriceSource::Synthetic, 1_300);
    assert_eq!(engine.get(&far_id).unwrap().status, OrderStatus::Filled);
}

#[test]
fn market_price_inverse_identity() {
    let mut engine = engine();
    engine.update_market_price(AAA, BBB, 4.0, PriceSource::Market, 1_000);
    assert_eq!(engine.market_price(AAA, BBB), Some(4.0));
    assert_eq!(engine.market_price(BBB, AAA), Some(1.0 / 4.0));
}

#[test]
fn post_only_rejected_when_it_would_trade() {
    let mut engine = engine();
    let sell = RecordBuilder::new(AAA, BBB, Side::Sell, OrderType::Limit, 10.0)
        .price(100.0)
        .build();
    engine.add_order(sell, 1_000).unwrap();

    let crossing = RecordBuilder::new(AAA, BBB, Side::Buy, OrderType::Limit, 5.0)
        .price(101.0)
        .tif(TimeInForce::PostOnly)
        .at(1_100)
        .build();
    let crossing_id = crossing.id;
    engine.add_order(crossing, 1_100).unwrap();
    let record = engine.get(&crossing_id).unwrap();
    assert_eq!(record.status, OrderStatus::Rejected);
    assert_eq!(
        record.metadata.reject_reason,
        Some(RejectReason::PostOnlyWouldTrade)
    );

    let passive = RecordBuilder::new(AAA, BBB, Side::Buy, OrderType::Limit, 5.0)
        .price(99.0)
        .tif(TimeInForce::PostOnly)
        .at(1_200)
        .build();
    let passive_id = passive.id;
    engine.add_order(passive, 1_200).unwrap();
    assert_eq!(engine.get(&passive_id).unwrap().status, OrderStatus::Pending);
    let book = engine.book_snapshot(AAA, BBB).unwrap();
    assert_eq!(book.buy.len(), 1);
}

#[test]
fn fok_rejects_without_fills_when_liquidity_short() {
    let mut engine = engine();
    let sell = RecordBuilder::new(AAA, BBB, Side::Sell, OrderType::Limit, 3.0)
        .price(100.0)
        .build();
    let sell_id = sell.id;
    engine.add_order(sell, 1_000).unwrap();

    let fok = RecordBuilder::new(AAA, BBB, Side::Buy, OrderType::Limit, 5.0)
        .price(100.0)
        .tif(TimeInForce::Fok)
        .at(1_100)
        .build();
    let fok_id = fok.id;
    let trades = engine.add_order(fok, 1_100).unwrap();

    assert!(trades.is_empty());
    let record = engine.get(&fok_id).unwrap();
    assert_eq!(record.status, OrderStatus::Rejected);
    assert_eq!(record.filled, 0.0);
    assert_eq!(
        record.metadata.reject_reason,
        Some(RejectReason::InsufficientLiquidity)
    );
    // The resting sell is untouched
    assert_eq!(engine.get(&sell_id).unwrap().filled, 0.0);

    let exact = RecordBuilder::new(AAA, BBB, Side::Buy, OrderType::Limit, 3.0)
        .price(100.0)
        .tif(TimeInForce::Fok)
        .at(1_200)
        .build();
    let exact_id = exact.id;
    engine.add_order(exact, 1_200).unwrap();
    assert_eq!(engine.get(&exact_id).unwrap().status, OrderStatus::Filled);
}

#[test]
fn ioc_partial_fill_keeps_partial_status() {
    let mut engine = engine();
    let sell = RecordBuilder::new(AAA, BBB, Side::Sell, OrderType::Limit, 3.0)
        .price(100.0)
        .build();
    engine.add_order(sell, 1_000).unwrap();

    let ioc = RecordBuilder::new(AAA, BBB, Side::Buy, OrderType::Limit, 5.0)
        .price(100.0)
        .tif(TimeInForce::Ioc)
        .at(1_100)
        .build();
    let ioc_id = ioc.id;
    let trades = engine.add_order(ioc, 1_100).unwrap();

    assert_eq!(trades.len(), 1);
    let record = engine.get(&ioc_id).unwrap();
    assert_eq!(record.status, OrderStatus::Partial);
    assert_eq!(record.filled, 3.0);
    assert_eq!(record.metadata.reject_reason, Some(RejectReason::IocUnfilled));

    // The remainder never rested
    let book = engine.book_snapshot(AAA, BBB).unwrap();
    assert!(book.buy.is_empty());
}

#[test]
fn limit_match_uses_maker_price() {
    let mut engine = engine();
    let sell = RecordBuilder::new(AAA, BBB, Side::Sell, OrderType::Limit, 2.0)
        .price(98.0)
        .build();
    engine.add_order(sell, 1_000).unwrap();

    let buy = RecordBuilder::new(AAA, BBB, Side::Buy, OrderType::Limit, 2.0)
        .price(105.0)
        .at(1_100)
        .build();
    let trades = engine.add_order(buy, 1_100).unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].price, 98.0);
}

#[test]
fn book_lists_keep_price_time_priority() {
    let mut engine = engine();
    for (price, at) in [(100.0, 1_000), (102.0, 1_100), (102.0, 900), (98.0, 1_200)] {
        let record = RecordBuilder::new(AAA, BBB, Side::Buy, OrderType::Limit, 1.0)
            .price(price)
            .at(at)
            .build();
        engine.add_order(record, at).unwrap();
    }
    let book = engine.book_snapshot(AAA, BBB).unwrap();
    let keyed: Vec<(f64, i64)> = book
        .buy
        .iter()
        .map(|record| (record.price.unwrap(), record.created_at))
        .collect();
    assert_eq!(keyed, vec![(102.0, 900), (102.0, 1_100), (100.0, 1_000), (98.0, 1_200)]);
}

#[test]
fn cancel_removes_from_every_list() {
    let mut engine = engine();
    let record = RecordBuilder::new(AAA, BBB, Side::Buy, OrderType::Limit, 1.0)
        .price(100.0)
        .build();
    let id = record.id;
    engine.add_order(record, 1_000).unwrap();

    let cancelled = engine.cancel_order(&id, "user requested", 1_100).unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.metadata.cancel_reason.as_deref(), Some("user requested"));
    let book = engine.book_snapshot(AAA, BBB).unwrap();
    assert!(book.buy.is_empty());

    // Terminal cancel is a no-op
    let again = engine.cancel_order(&id, "again", 1_200).unwrap();
    assert_eq!(again.metadata.cancel_reason.as_deref(), Some("user requested"));
}

#[test]
fn expiry_sweep_expires_due_orders() {
    let mut engine = engine();
    let mut record = RecordBuilder::new(AAA, BBB, Side::Buy, OrderType::Limit, 1.0)
        .price(100.0)
        .build();
    record.order.expiry = U256::from(1_700_000_000u64);
    let id = record.id;
    engine.add_order(record, 1_000).unwrap();

    let expired = engine.expire_due_orders(1_700_000_001, 2_000);
    assert_eq!(expired, vec![id]);
    assert_eq!(engine.get(&id).unwrap().status, OrderStatus::Expired);
    assert!(engine.book_snapshot(AAA, BBB).unwrap().buy.is_empty());
}

// ---------------------------------------------------------------------------
// Batch ring settlement
// ---------------------------------------------------------------------------

#[test]
fn two_party_ring_executes_atomically() {
    let mut engine = engine();
    // Opposite flows expressed on mirrored pairs so neither rests against
    // the other: A->B at 6 and B->A at 1/6
    let forward = RecordBuilder::new(AAA, BBB, Side::Sell, OrderType::Limit, 10.0)
        .price(6.0)
        .at(1_000)
        .build();
    let backward = RecordBuilder::new(BBB, AAA, Side::Sell, OrderType::Limit, 24.0)
        .price(1.0 / 6.0)
        .at(1_100)
        .build();
    let ids = [forward.id, backward.id];
    engine.add_order(forward, 1_000).unwrap();
    engine.add_order(backward, 1_100).unwrap();

    let result = engine.execute_batch(&ids, None, 2_000).unwrap();

    // Backward leg caps the ring: 24 B buys back 4 A
    assert_eq!(result.offer_amounts, vec![4.0, 24.0]);
    assert_eq!(result.request_amounts[0], 24.0);
    assert!((result.request_amounts[1] - 4.0).abs() <= 1e-8);

    let forward_record = engine.get(&ids[0]).unwrap();
    assert_eq!(forward_record.status, OrderStatus::Partial);
    assert_eq!(forward_record.filled, 4.0);
    let backward_record = engine.get(&ids[1]).unwrap();
    assert_eq!(backward_record.status, OrderStatus::Filled);

    // The fully filled leg left its book
    assert!(engine.book_snapshot(BBB, AAA).unwrap().sell.is_empty());
    assert_eq!(engine.book_snapshot(AAA, BBB).unwrap().sell.len(), 1);
}

#[test]
fn three_party_ring_settles_max_volume() {
    let mut engine = engine();
    // A->B at 2, B->C at 3, C->A at 1/6; rates multiply to 1
    let leg1 = RecordBuilder::new(AAA, BBB, Side::Sell, OrderType::Limit, 12.0)
        .price(2.0)
        .at(1_000)
        .build();
    let leg2 = RecordBuilder::new(BBB, CCC, Side::Sell, OrderType::Limit, 18.0)
        .price(3.0)
        .at(1_100)
        .build();
    let leg3 = RecordBuilder::new(CCC, AAA, Side::Sell, OrderType::Limit, 90.0)
        .price(1.0 / 6.0)
        .at(1_200)
        .build();
    let ids = [leg1.id, leg2.id, leg3.id];
    engine.add_order(leg1, 1_000).unwrap();
    engine.add_order(leg2, 1_100).unwrap();
    engine.add_order(leg3, 1_200).unwrap();

    let result = engine.execute_batch(&ids, None, 2_000).unwrap();

    // Leg volumes: offer[0] limited by leg2 (18/2 = 9) vs leg3 (90/6 = 15)
    assert_eq!(result.offer_amounts[0], 9.0);
    assert_eq!(result.request_amounts[0], 18.0);
    assert_eq!(result.offer_amounts[1], 18.0);
    assert_eq!(result.request_amounts[1], 54.0);
    assert_eq!(result.offer_amounts[2], 54.0);
    assert!((result.request_amounts[2] - result.offer_amounts[0]).abs() <= 1e-8);

    // Fills: leg1 sold 9 of 12, leg2 fully filled, leg3 sold 54 of 90
    let leg1_record = engine.get(&ids[0]).unwrap();
    assert_eq!(leg1_record.status, OrderStatus::Partial);
    assert_eq!(leg1_record.filled, 9.0);
    let leg2_record = engine.get(&ids[1]).unwrap();
    assert_eq!(leg2_record.status, OrderStatus::Filled);
    let leg3_record = engine.get(&ids[2]).unwrap();
    assert_eq!(leg3_record.filled, 54.0);

    // Executions are tagged with the batch id
    assert!(leg1_record.executions[0].batch_id == Some(result.batch_id));

    // Each leg produced a trade and a batch-sourced price update
    assert!(result.trades.len() >= 3);
    assert_eq!(
        engine.market_price_meta(AAA, BBB).unwrap().source,
        PriceSource::Batch
    );
}

#[test]
fn batch_rejects_open_ring() {
    let mut engine = engine();
    let leg1 = RecordBuilder::new(AAA, BBB, Side::Sell, OrderType::Limit, 5.0)
        .price(2.0)
        .build();
    let leg2 = RecordBuilder::new(AAA, BBB, Side::Sell, OrderType::Limit, 5.0)
        .price(2.0)
        .at(1_100)
        .build();
    let ids = [leg1.id, leg2.id];
    engine.add_order(leg1, 1_000).unwrap();
    engine.add_order(leg2, 1_100).unwrap();

    let err = engine.execute_batch(&ids, None, 2_000).unwrap_err();
    assert!(matches!(err, matching_engine::BatchError::OpenRing { .. }));
    // No fills applied
    assert_eq!(engine.get(&ids[0]).unwrap().filled, 0.0);
}

#[test]
fn batch_rejects_imbalanced_rates() {
    let mut engine = engine();
    let sell = RecordBuilder::new(AAA, BBB, Side::Sell, OrderType::Limit, 5.0)
        .price(6.0)
        .at(1_000)
        .build();
    // Same pair, opposite side, incompatible price; registered first so the
    // later sell at 6 does not cross its 5 bid
    let buy = RecordBuilder::new(AAA, BBB, Side::Buy, OrderType::Limit, 5.0)
        .price(5.0)
        .at(900)
        .build();
    let ids = [sell.id, buy.id];
    engine.add_order(buy, 900).unwrap();
    engine.add_order(sell, 1_000).unwrap();

    let err = engine.execute_batch(&ids, None, 2_000).unwrap_err();
    assert!(matches!(
        err,
        matching_engine::BatchError::ImbalancedRates { .. }
    ));
}

#[test]
fn batch_rejects_all_or_nothing_partial() {
    let mut engine = engine();
    // The 8 B on the backward leg only buys back 4 A, so the 20 A
    // all-or-nothing seller cannot be filled completely
    let seller = RecordBuilder::new(AAA, BBB, Side::Sell, OrderType::Limit, 20.0)
        .price(2.0)
        .all_or_nothing()
        .at(1_000)
        .build();
    let backward = RecordBuilder::new(BBB, AAA, Side::Sell, OrderType::Limit, 8.0)
        .price(0.5)
        .at(1_100)
        .build();
    let ids = [seller.id, backward.id];
    engine.add_order(seller, 1_000).unwrap();
    engine.add_order(backward, 1_100).unwrap();

    let err = engine.execute_batch(&ids, None, 2_000).unwrap_err();
    assert!(matches!(
        err,
        matching_engine::BatchError::AllOrNothingViolation { .. }
    ));
    assert_eq!(engine.get(&ids[0]).unwrap().filled, 0.0);
    assert_eq!(engine.get(&ids[1]).unwrap().filled, 0.0);
}
