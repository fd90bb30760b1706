//! HTTP server for the venue.
//!
//! Reads [`Config`] from the environment, funds the configured accounts on an in-memory
//! ledger, starts the settlement worker and serves the router.

use spot_venue::{
    api, run_settlement_worker, Config, Exchange, InMemoryLedger, Settlement, SettlementQueue,
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    let _ = env_logger::try_init();
    let config = Config::from_env();

    let (queue, rx) = SettlementQueue::channel();
    let stats = queue.stats();
    let exchange = Arc::new(Exchange::new(config.markets.clone(), queue));
    let ledger = InMemoryLedger::new();
    for account in &config.accounts {
        ledger.deposit(&account.address, config.initial_balance);
        exchange.register_account(account.clone());
    }
    let settlement: Arc<dyn Settlement> = Arc::new(ledger);
    tokio::spawn(run_settlement_worker(rx, settlement, config.settlement, stats));

    let app = api::create_router(exchange);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await.expect("bind");
    log::info!(
        "listening on http://{} markets={:?} accounts={}",
        addr,
        config.markets.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
        config.accounts.len()
    );
    axum::serve(listener, app.into_make_service())
        .await
        .expect("serve");
}
