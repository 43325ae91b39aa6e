use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use userstream::UserStreamError;
use userstream::config::fetch_config;
use userstream::rest::RestClient;
use userstream::tls::build_tls_config;
use userstream::websocket::AccountSync;

#[tokio::main]
async fn main() -> Result<(), UserStreamError> {
    // Initialize tracing subscriber for logging output.
    tracing_subscriber::fmt::init();

    let app_config = fetch_config()?;
    info!(account = %app_config.binance.account_type, "Configuration loaded");

    let tls = build_tls_config(app_config.binance.ca_bundle.as_deref())?;
    let api = Arc::new(RestClient::new(&app_config.binance, tls.clone())?);
    let sync = AccountSync::new(
        api,
        app_config.binance.stream_url.clone(),
        tls,
        app_config.sync,
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            return;
        }
        info!("Shutdown requested");
        signal_token.cancel();
    });

    sync.run(shutdown).await;

    let snapshot = sync.store().snapshot();
    info!(
        balances = snapshot.balances.len(),
        open_orders = snapshot.open_orders.len(),
        "Final account state"
    );

    Ok(())
}
