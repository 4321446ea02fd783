//! EIP-712 typed-data codec
//!
//! Hashes canonical orders under the exchange signing domain and recovers
//! the maker from a secp256k1 signature. The digest must stay bit-identical
//! to the settlement contract's `getOrderHash`, so the `Order` tuple below
//! is frozen: field order, names, and ABI types may not change.

use alloy_primitives::{Address, B256, Signature, U256};
use alloy_sol_types::{sol, Eip712Domain, SolStruct};
use serde_json::{json, Value};
use types::order::CanonicalOrder;

// ---------------------------------------------------------------------------
// Domain & primary type
// ---------------------------------------------------------------------------

/// EIP-712 domain name (frozen)
pub const DOMAIN_NAME: &str = "DEX";

/// EIP-712 domain version (frozen)
pub const DOMAIN_VERSION: &str = "1";

sol! {
    /// On-chain order tuple
    ///
    /// Enum-typed fields travel as their `uint8` indices.
    #[derive(Debug, PartialEq, Eq)]
    struct Order {
        address maker;
        address tokenGet;
        uint256 amountGet;
        address tokenGive;
        uint256 amountGive;
        uint256 nonce;
        uint256 expiry;
        uint8 orderType;
        uint8 timeInForce;
        uint8 side;
        uint256 stopPrice;
        uint256 minFillAmount;
        bool allowPartialFill;
        address feeRecipient;
        uint256 feeAmount;
    }
}

/// Build the signing domain for a deployment
pub fn signing_domain(chain_id: u64, verifying_contract: Address) -> Eip712Domain {
    Eip712Domain::new(
        Some(DOMAIN_NAME.into()),
        Some(DOMAIN_VERSION.into()),
        Some(U256::from(chain_id)),
        Some(verifying_contract),
        None,
    )
}

impl From<&CanonicalOrder> for Order {
    fn from(order: &CanonicalOrder) -> Self {
        Order {
            maker: order.maker,
            tokenGet: order.token_get,
            amountGet: order.amount_get,
            tokenGive: order.token_give,
            amountGive: order.amount_give,
            nonce: order.nonce,
            expiry: order.expiry,
            orderType: order.order_type.index(),
            timeInForce: order.time_in_force.index(),
            side: order.side.index(),
            stopPrice: order.stop_price,
            minFillAmount: order.min_fill_amount,
            allowPartialFill: order.allow_partial_fill,
            feeRecipient: order.fee_recipient,
            feeAmount: order.fee_amount,
        }
    }
}

// ---------------------------------------------------------------------------
// Hashing / recovery
// ---------------------------------------------------------------------------

/// EIP-712 digest of an order under the given domain
///
/// `keccak256(0x1901 ‖ domainSeparator ‖ hashStruct(order))`
pub fn hash_order(domain: &Eip712Domain, order: &CanonicalOrder) -> B256 {
    Order::from(order).eip712_signing_hash(domain)
}

/// Parse a 65-byte hex signature, enforcing low-s and v ∈ {27, 28}
pub fn parse_signature(signature: &str) -> Result<Signature, SignatureError> {
    let bytes = hex::decode(signature.trim_start_matches("0x"))
        .map_err(|_| SignatureError::NotHex)?;
    if bytes.len() != 65 {
        return Err(SignatureError::InvalidLength(bytes.len()));
    }
    let v = bytes[64];
    if v != 27 && v != 28 {
        return Err(SignatureError::InvalidV(v));
    }
    let r = U256::from_be_slice(&bytes[0..32]);
    let s = U256::from_be_slice(&bytes[32..64]);
    let parsed = Signature::new(r, s, v == 28);
    if parsed.normalize_s().is_some() {
        return Err(SignatureError::HighS);
    }
    Ok(parsed)
}

/// Recover the signer address from a digest and hex signature
pub fn recover(digest: B256, signature: &str) -> Result<Address, SignatureError> {
    let parsed = parse_signature(signature)?;
    parsed
        .recover_address_from_prehash(&digest)
        .map_err(|_| SignatureError::Unrecoverable)
}

/// Verify that `signature` over `order` was produced by `expected_maker`
pub fn verify(
    domain: &Eip712Domain,
    order: &CanonicalOrder,
    signature: &str,
    expected_maker: Address,
) -> Result<(), SignatureError> {
    let digest = hash_order(domain, order);
    let recovered = recover(digest, signature)?;
    if recovered != expected_maker {
        return Err(SignatureError::SignerMismatch {
            expected: expected_maker,
            recovered,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Wallet-facing typed-data view
// ---------------------------------------------------------------------------

/// JSON shape consumed by `eth_signTypedData_v4`
///
/// uint256 fields render as decimal strings so wallets never round them.
pub fn typed_data_json(domain: &Eip712Domain, order: &CanonicalOrder) -> Value {
    json!({
        "domain": {
            "name": DOMAIN_NAME,
            "version": DOMAIN_VERSION,
            "chainId": domain.chain_id.map(|id| id.to::<u64>()).unwrap_or_default(),
            "verifyingContract": domain.verifying_contract.unwrap_or_default().to_checksum(None),
        },
        "types": {
            "EIP712Domain": [
                {"name": "name", "type": "string"},
                {"name": "version", "type": "string"},
                {"name": "chainId", "type": "uint256"},
                {"name": "verifyingContract", "type": "address"},
            ],
            "Order": [
                {"name": "maker", "type": "address"},
                {"name": "tokenGet", "type": "address"},
                {"name": "amountGet", "type": "uint256"},
                {"name": "tokenGive", "type": "address"},
                {"name": "amountGive", "type": "uint256"},
                {"name": "nonce", "type": "uint256"},
                {"name": "expiry", "type": "uint256"},
                {"name": "orderType", "type": "uint8"},
                {"name": "timeInForce", "type": "uint8"},
                {"name": "side", "type": "uint8"},
                {"name": "stopPrice", "type": "uint256"},
                {"name": "minFillAmount", "type": "uint256"},
                {"name": "allowPartialFill", "type": "bool"},
                {"name": "feeRecipient", "type": "address"},
                {"name": "feeAmount", "type": "uint256"},
            ],
        },
        "primaryType": "Order",
        "message": {
            "maker": order.maker.to_checksum(None),
            "tokenGet": order.token_get.to_checksum(None),
            "amountGet": order.amount_get.to_string(),
            "tokenGive": order.token_give.to_checksum(None),
            "amountGive": order.amount_give.to_string(),
            "nonce": order.nonce.to_string(),
            "expiry": order.expiry.to_string(),
            "orderType": order.order_type.index(),
            "timeInForce": order.time_in_force.index(),
            "side": order.side.index(),
            "stopPrice": order.stop_price.to_string(),
            "minFillAmount": order.min_fill_amount.to_string(),
            "allowPartialFill": order.allow_partial_fill,
            "feeRecipient": order.fee_recipient.to_checksum(None),
            "feeAmount": order.fee_amount.to_string(),
        },
    })
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Typed-data codec errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Signature is not valid hex")]
    NotHex,

    #[error("Signature must be 65 bytes, got {0}")]
    InvalidLength(usize),

    #[error("Recovery id must be 27 or 28, got {0}")]
    InvalidV(u8),

    #[error("Signature s value is not canonical (high-s)")]
    HighS,

    #[error("Signature does not recover to any address")]
    Unrecoverable,

    #[error("Recovered signer {recovered} does not match maker {expected}")]
    SignerMismatch { expected: Address, recovered: Address },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
