//! Batch cyclic settlement
//!
//! Validates that a list of active orders forms a closed token ring whose
//! conversion rates multiply to one, computes the maximum atomic volume the
//! ring supports, and applies the fills. All validation happens before any
//! state change; an error leaves every order untouched.

use crate::engine::MatchingEngine;
use alloy_primitives::Address;
use oracle::TradeRegistration;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use types::order::{OrderRecord, PriceSource, Side};
use types::token::pair_key;
use types::trade::TradeRecord;
use uuid::Uuid;

/// Default tolerance on the ring's rate product and closure
pub const DEFAULT_TOLERANCE: f64 = 1e-8;

/// Batch execution errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BatchError {
    #[error("Batch requires at least 2 orders, got {0}")]
    TooFewOrders(usize),

    #[error("Order not found: {0}")]
    UnknownOrder(Uuid),

    #[error("Order {0} is not active")]
    InactiveOrder(Uuid),

    #[error("Order {0} has no price")]
    MissingPrice(Uuid),

    #[error("Token ring is open at position {position}")]
    OpenRing { position: usize },

    #[error("Ring rates multiply to {product}, not 1")]
    ImbalancedRates { product: f64 },

    #[error("First leg has no offerable volume")]
    NoLiquidity,

    #[error("Computed fill for order {order} exceeds its remainder")]
    Overfill { order: Uuid },

    #[error("Order {order} forbids partial fills and the ring cannot fill it completely")]
    AllOrNothingViolation { order: Uuid },
}

/// Result of an executed batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub offer_amounts: Vec<f64>,
    pub request_amounts: Vec<f64>,
    pub trades: Vec<TradeRecord>,
    pub orders: Vec<OrderRecord>,
}

/// One order's role in the ring
struct RingLeg {
    id: Uuid,
    side: Side,
    price: f64,
    rate: f64,
    offer_token: Address,
    request_token: Address,
    offer_remaining: f64,
    remaining: f64,
    allow_partial: bool,
    base_token: Address,
    quote_token: Address,
}

impl MatchingEngine {
    /// Execute an atomic cyclic batch over the given order ids
    pub fn execute_batch(
        &mut self,
        order_ids: &[Uuid],
        tolerance: Option<f64>,
        timestamp: i64,
    ) -> Result<BatchResult, BatchError> {
        let tolerance = tolerance.unwrap_or(DEFAULT_TOLERANCE);
        if order_ids.len() < 2 {
            return Err(BatchError::TooFewOrders(order_ids.len()));
        }
        self.clear_produced();

        // Collect and validate legs before touching any state
        let mut legs: Vec<RingLeg> = Vec::with_capacity(order_ids.len());
        for id in order_ids {
            let record = self
                .store()
                .get(id)
                .ok_or(BatchError::UnknownOrder(*id))?;
            if !record.is_active() {
                return Err(BatchError::InactiveOrder(*id));
            }
            let price = record
                .price
                .filter(|price| *price > 0.0)
                .ok_or(BatchError::MissingPrice(*id))?;
            let remaining = record.remaining();
            let (rate, offer_token, request_token, offer_remaining) = match record.side {
                Side::Sell => (price, record.base_token, record.quote_token, remaining),
                Side::Buy => (
                    1.0 / price,
                    record.quote_token,
                    record.base_token,
                    remaining * price,
                ),
            };
            legs.push(RingLeg {
                id: *id,
                side: record.side,
                price,
                rate,
                offer_token,
                request_token,
                offer_remaining,
                remaining,
                allow_partial: record.order.allow_partial_fill,
                base_token: record.base_token,
                quote_token: record.quote_token,
            });
        }

        let n = legs.len();
        for position in 0..n {
            if legs[position].request_token != legs[(position + 1) % n].offer_token {
                return Err(BatchError::OpenRing { position });
            }
        }

        let product: f64 = legs.iter().map(|leg| leg.rate).product();
        if (product - 1.0).abs() > tolerance {
            return Err(BatchError::ImbalancedRates { product });
        }

        if legs[0].offer_remaining <= 0.0 {
            return Err(BatchError::NoLiquidity);
        }

        // Maximum volume the ring supports, expressed in leg-0 offer units
        let mut cumulative_rate = 1.0;
        let mut max_offer = legs[0].offer_remaining;
        for i in 1..n {
            cumulative_rate *= legs[i - 1].rate;
            let candidate = legs[i].offer_remaining / cumulative_rate;
            max_offer = max_offer.min(candidate);
        }

        let mut offers = vec![0.0; n];
        let mut requests = vec![0.0; n];
        offers[0] = max_offer;
        for i in 0..n {
            requests[i] = offers[i] * legs[i].rate;
            if i + 1 < n {
                offers[i + 1] = requests[i];
            }
        }
        if (requests[n - 1] - offers[0]).abs() > tolerance {
            return Err(BatchError::ImbalancedRates {
                product: requests[n - 1] / offers[0],
            });
        }

        // Per-leg fill checks
        let mut base_fills = vec![0.0; n];
        for i in 0..n {
            let base_filled = match legs[i].side {
                Side::Sell => offers[i],
                Side::Buy => requests[i],
            };
            if base_filled > legs[i].remaining + tolerance {
                return Err(BatchError::Overfill { order: legs[i].id });
            }
            if !legs[i].allow_partial && (base_filled - legs[i].remaining).abs() > tolerance {
                return Err(BatchError::AllOrNothingViolation { order: legs[i].id });
            }
            base_fills[i] = base_filled;
        }

        // Validation passed: apply fills, trades, price and oracle updates
        let batch_id = Uuid::new_v4();
        for i in 0..n {
            let leg = &legs[i];
            let counterparty = legs[(i + 1) % n].id;

            let record = self
                .store_mut()
                .get_mut(&leg.id)
                .expect("validated above");
            record.apply_fill(
                base_fills[i],
                leg.price,
                counterparty.to_string(),
                timestamp,
                Some(batch_id),
            );
            let filled_now = record.remaining() <= 1e-9;
            let key = pair_key(leg.base_token, leg.quote_token);

            let trade = TradeRecord {
                id: Uuid::new_v4(),
                pair: key.clone(),
                price: leg.price,
                amount: base_fills[i],
                buy_order_id: (leg.side == Side::Buy).then_some(leg.id),
                sell_order_id: (leg.side == Side::Sell).then_some(leg.id),
                maker_order_id: Some(counterparty),
                taker_order_id: Some(leg.id),
                taker_side: leg.side,
                source: PriceSource::Batch,
                synthetic: false,
                synthetic_quote_amount: None,
                batch_id: Some(batch_id),
                fill_amount: None,
                executed_at: timestamp,
                settlement: None,
            };
            if let Some(record) = self.store_mut().get_mut(&leg.id) {
                record.metadata.trades.push(trade.id);
            }
            if filled_now {
                if let Some(book) = self.book_mut(&key) {
                    book.remove_everywhere(&leg.id);
                }
            }
            if let Some(book) = self.book_mut(&key) {
                book.record_trade(trade.clone());
            }
            self.push_produced(trade);

            self.apply_price_update(
                leg.base_token,
                leg.quote_token,
                leg.price,
                PriceSource::Batch,
                false,
                timestamp,
            );
            self.oracle_mut().register_trade(TradeRegistration {
                base: leg.base_token,
                quote: leg.quote_token,
                price: leg.price,
                base_amount: Some(base_fills[i]),
                quote_amount: Some(base_fills[i] * leg.price),
                side: Some(leg.side),
                source: Some(PriceSource::Batch),
                timestamp,
            });
        }

        tracing::info!(
            batch = %batch_id,
            legs = n,
            volume = max_offer,
            "batch ring executed"
        );

        let orders = order_ids
            .iter()
            .filter_map(|id| self.store().get(id).cloned())
            .collect();

        // Includes any trades cascading from stop triggers on batch price updates
        let trades = self.take_produced();

        Ok(BatchResult {
            batch_id,
            offer_amounts: offers,
            request_amounts: requests,
            trades,
            orders,
        })
    }
}
