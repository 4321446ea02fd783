//! Reference binary: wires the service against in-memory collaborators and
//! runs a short scripted session. The HTTP surface lives outside this crate.

use alloy_primitives::{address, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use order_service::{CoreConfig, InMemoryChainClient, OrderService};
use std::sync::Arc;
use types::draft::OrderDraft;
use types::order::{OrderType, Side};
use types::token::{InMemoryTokenDirectory, TokenInfo};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt::init();
    tracing::info!("Starting order service (in-memory session)");

    let base = address!("0000000000000000000000000000000000000001");
    let quote = address!("0000000000000000000000000000000000000002");
    let directory = Arc::new(
        InMemoryTokenDirectory::new()
            .with_token(
                TokenInfo::new(base, "Test Yield Dollar", "TYD", 18)
                    .with_total_supply(U256::from(1_000_000u64) * U256::from(10u64).pow(U256::from(18u64))),
            )
            .with_token(TokenInfo::new(quote, "Unit Stable Dollar", "USTD", 18)),
    );
    let chain = Arc::new(InMemoryChainClient::new());

    let config = match CoreConfig::load() {
        Ok(config) => config,
        Err(error) => {
            tracing::warn!(%error, "falling back to local defaults");
            CoreConfig::for_tests(31337, address!("5fbdb2315678afecb367f032d93f642f64180aa3"))
        }
    }
    .with_signer(PrivateKeySigner::random());

    let service = OrderService::new(config, directory, chain.clone());

    let maker = PrivateKeySigner::random();
    let taker = PrivateKeySigner::random();

    // Maker rests a sell, taker crosses it with a buy
    let mut sell = OrderDraft::new(
        maker.address().to_checksum(None),
        format!("{base:#x}"),
        format!("{quote:#x}"),
        Side::Sell,
        OrderType::Limit,
        "5",
    )
    .with_price("6");
    let prepared = service.prepare(&sell).await?;
    sell.signature = Some(hex::encode(maker.sign_hash_sync(&prepared.hash)?.as_bytes()));
    let resting = service.create(&sell).await?;
    tracing::info!(order = %resting.id, status = ?resting.status, "sell resting");

    let mut buy = OrderDraft::new(
        taker.address().to_checksum(None),
        format!("{base:#x}"),
        format!("{quote:#x}"),
        Side::Buy,
        OrderType::Limit,
        "5",
    )
    .with_price("6");
    let prepared = service.prepare(&buy).await?;
    buy.signature = Some(hex::encode(taker.sign_hash_sync(&prepared.hash)?.as_bytes()));
    let crossed = service.create(&buy).await?;
    tracing::info!(order = %crossed.id, status = ?crossed.status, "buy crossed");

    let trades = service.recent_trades(base, quote, 10).await;
    for trade in &trades {
        tracing::info!(
            trade = %trade.id,
            price = trade.price,
            amount = trade.amount,
            settled = trade.settlement.as_ref().map(|s| s.success).unwrap_or(false),
            "trade"
        );
    }
    tracing::info!(fills = chain.executed_fills().len(), "settlement dispatches");

    let pair = service.describe_pair(base, quote).await;
    tracing::info!(price = pair.price, source = ?pair.source, "pair quote");

    Ok(())
}
