//! Order canonicalizer
//!
//! Turns a display-side draft into the canonical on-chain struct plus its
//! typed data and digest. Pure with respect to engine state: it reads
//! prices but never mutates books or records.

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::Eip712Domain;
use chrono::DateTime;
use matching_engine::MatchingEngine;
use serde_json::Value;
use std::str::FromStr;
use types::draft::{ExpiryInput, OrderDraft};
use types::errors::ValidationError;
use types::order::{
    CanonicalOrder, OrderMetadata, OrderRecord, OrderStatus, OrderType, PriceSource, Side,
};
use types::token::TokenDirectory;
use types::units::{display_units, f64_to_units, parse_units};
use uuid::Uuid;

/// Canonicalization output: the unsaved record, wallet typed data, digest
#[derive(Debug, Clone)]
pub struct PreparedOrder {
    pub record: OrderRecord,
    pub typed_data: Value,
    pub hash: B256,
}

fn parse_address(field: &'static str, raw: &str) -> Result<Address, ValidationError> {
    Address::from_str(raw.trim()).map_err(|_| ValidationError::InvalidAddress(format!("{field}: {raw}")))
}

fn parse_u256(field: &'static str, raw: &str) -> Result<U256, ValidationError> {
    U256::from_str(raw.trim())
        .map_err(|_| ValidationError::InvalidAmount(format!("{field}: {raw}")))
}

fn pow10(decimals: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals as u64))
}

/// `base_units × price_units / 10^base_decimals`, exact
fn scale_by_price(
    base_units: U256,
    price_units: U256,
    base_decimals: u8,
) -> Result<U256, ValidationError> {
    base_units
        .checked_mul(price_units)
        .map(|product| product / pow10(base_decimals))
        .ok_or_else(|| ValidationError::AmountOverflow("amount × price".into()))
}

/// Resolve the draft's display price per the precedence ladder
///
/// Explicit input wins; market orders fall through the market-price
/// override, the price table, the best opposite limit, and finally the
/// synthetic oracle estimate. Stop orders without a price derive it from
/// their stop threshold.
fn resolve_price(
    draft: &OrderDraft,
    engine: &mut MatchingEngine,
    base: Address,
    quote: Address,
    quote_decimals: u8,
) -> Result<(f64, U256, PriceSource), ValidationError> {
    if let Some(raw) = draft.price.as_deref() {
        let units = parse_units(raw, quote_decimals)?;
        if units.is_zero() {
            return Err(ValidationError::InvalidAmount(format!("price: {raw}")));
        }
        return Ok((display_units(units, quote_decimals), units, PriceSource::Input));
    }

    match draft.order_type {
        OrderType::Market => {
            if let Some(raw) = draft.market_price.as_deref() {
                let units = parse_units(raw, quote_decimals)?;
                if units.is_zero() {
                    return Err(ValidationError::InvalidAmount(format!("marketPrice: {raw}")));
                }
                return Ok((
                    display_units(units, quote_decimals),
                    units,
                    PriceSource::Derived,
                ));
            }
            if let Some(entry) = engine.market_price_meta(base, quote) {
                let price = entry.price;
                return Ok((price, f64_to_units(price, quote_decimals)?, PriceSource::Market));
            }
            let opposite = match draft.side {
                Side::Buy => Side::Sell,
                Side::Sell => Side::Buy,
            };
            if let Some(price) = engine.best_limit_price(base, quote, opposite) {
                return Ok((
                    price,
                    f64_to_units(price, quote_decimals)?,
                    PriceSource::Orderbook,
                ));
            }
            let estimate = engine.oracle_mut().estimate_pair_price(base, quote);
            if !estimate.is_finite() || estimate <= 0.0 {
                return Err(ValidationError::MissingPrice);
            }
            Ok((
                estimate,
                f64_to_units(estimate, quote_decimals)?,
                PriceSource::Synthetic,
            ))
        }
        OrderType::StopLoss | OrderType::StopLimit => {
            let raw = draft
                .stop_price
                .as_deref()
                .ok_or(ValidationError::InvalidStopPrice("stop price required".into()))?;
            let units = parse_units(raw, quote_decimals)?;
            if units.is_zero() {
                return Err(ValidationError::InvalidStopPrice(raw.into()));
            }
            Ok((
                display_units(units, quote_decimals),
                units,
                PriceSource::Derived,
            ))
        }
        OrderType::Limit => Err(ValidationError::MissingField("price")),
    }
}

fn resolve_expiry(expiry: Option<&ExpiryInput>) -> Result<U256, ValidationError> {
    match expiry {
        None => Ok(U256::ZERO),
        Some(ExpiryInput::Unix(seconds)) => Ok(U256::from(*seconds)),
        Some(ExpiryInput::Iso(raw)) => {
            let parsed = DateTime::parse_from_rfc3339(raw)
                .map_err(|_| ValidationError::InvalidExpiry(raw.clone()))?;
            let seconds = parsed.timestamp();
            if seconds < 0 {
                return Err(ValidationError::InvalidExpiry(raw.clone()));
            }
            Ok(U256::from(seconds as u64))
        }
    }
}

/// Canonicalize a draft into an unsaved order record plus typed data
///
/// `fetched_nonce` supplies the on-chain nonce when the draft carries none.
pub fn canonicalize(
    draft: &OrderDraft,
    directory: &dyn TokenDirectory,
    engine: &mut MatchingEngine,
    domain: &Eip712Domain,
    fetched_nonce: Option<U256>,
    timestamp: i64,
) -> Result<PreparedOrder, ValidationError> {
    let maker = parse_address("trader", &draft.trader)?;
    let base = parse_address("baseToken", &draft.base_token)?;
    let quote = parse_address("quoteToken", &draft.quote_token)?;

    let base_decimals = directory.decimals(base);
    let quote_decimals = directory.decimals(quote);

    let base_units = parse_units(&draft.amount, base_decimals)?;
    if base_units.is_zero() {
        return Err(ValidationError::InvalidAmount(format!(
            "amount: {}",
            draft.amount
        )));
    }

    let (display_price, price_units, price_source) =
        resolve_price(draft, engine, base, quote, quote_decimals)?;

    let quote_units = scale_by_price(base_units, price_units, base_decimals)?;
    if quote_units.is_zero() {
        return Err(ValidationError::InvalidAmount(
            "computed quote amount is zero".into(),
        ));
    }

    let (token_give, amount_give, token_get, amount_get) = match draft.side {
        Side::Sell => (base, base_units, quote, quote_units),
        Side::Buy => (quote, quote_units, base, base_units),
    };

    let nonce = match draft.nonce.as_deref() {
        Some(raw) => parse_u256("nonce", raw)?,
        None => fetched_nonce.unwrap_or(U256::ZERO),
    };

    let expiry = resolve_expiry(draft.expiry.as_ref())?;

    let stop_price = match draft.stop_price.as_deref() {
        Some(raw) => {
            let units = parse_units(raw, 18)?;
            if draft.order_type.is_stop() && units.is_zero() {
                return Err(ValidationError::InvalidStopPrice(raw.into()));
            }
            units
        }
        None => {
            if draft.order_type.is_stop() {
                return Err(ValidationError::InvalidStopPrice("stop price required".into()));
            }
            U256::ZERO
        }
    };

    // SELL minimums stay in base units; BUY minimums rescale into the
    // give-side (quote) units
    let min_fill_amount = match draft.min_fill_amount.as_deref() {
        Some(raw) => {
            let in_base = parse_units(raw, base_decimals)?;
            match draft.side {
                Side::Sell => in_base,
                Side::Buy => scale_by_price(in_base, price_units, base_decimals)?,
            }
        }
        None => U256::ZERO,
    };

    let (fee_recipient, fee_amount, onchain_fill_amount, onchain_nonce) = match &draft.onchain {
        Some(overrides) => (
            overrides
                .fee_recipient
                .as_deref()
                .map(|raw| parse_address("feeRecipient", raw))
                .transpose()?
                .unwrap_or(Address::ZERO),
            overrides
                .fee_amount
                .as_deref()
                .map(|raw| parse_u256("feeAmount", raw))
                .transpose()?
                .unwrap_or(U256::ZERO),
            overrides
                .fill_amount
                .as_deref()
                .map(|raw| parse_u256("fillAmount", raw))
                .transpose()?,
            overrides
                .nonce
                .as_deref()
                .map(|raw| parse_u256("nonce", raw))
                .transpose()?,
        ),
        None => (Address::ZERO, U256::ZERO, None, None),
    };

    let order = CanonicalOrder {
        maker,
        token_get,
        amount_get,
        token_give,
        amount_give,
        nonce: onchain_nonce.unwrap_or(nonce),
        expiry,
        order_type: draft.order_type,
        time_in_force: draft.time_in_force.unwrap_or(types::order::TimeInForce::Gtc),
        side: draft.side,
        stop_price,
        min_fill_amount,
        allow_partial_fill: draft.allow_partial_fill.unwrap_or(true),
        fee_recipient,
        fee_amount,
    };
    order.validate()?;

    let hash = typed_data::hash_order(domain, &order);
    let typed_data = typed_data::typed_data_json(domain, &order);

    let record = OrderRecord {
        id: draft.id.unwrap_or_else(Uuid::new_v4),
        base_token: base,
        quote_token: quote,
        base_decimals,
        quote_decimals,
        side: draft.side,
        order_type: draft.order_type,
        time_in_force: order.time_in_force,
        price: Some(display_price),
        amount: display_units(base_units, base_decimals),
        filled: 0.0,
        status: OrderStatus::Pending,
        created_at: timestamp,
        updated_at: timestamp,
        triggered_at: None,
        executions: Vec::new(),
        metadata: OrderMetadata {
            price_source: Some(price_source),
            onchain_fill_amount,
            ..OrderMetadata::default()
        },
        signature: draft.signature.clone(),
        order,
    };

    Ok(PreparedOrder {
        record,
        typed_data,
        hash,
    })
}
