use std::sync::Arc;

use anyhow::{Context, bail};

use entry_bridge::bridge::{Bridge, BridgeOutcome};
use entry_bridge::config::Config;
use entry_bridge::health::HealthChecker;
use entry_bridge::ledger;
use entry_bridge::logging::init_logging;
use entry_bridge::metrics::MetricsCollector;
use entry_bridge::rpc::{HttpLedgerClient, HttpSigner};
use entry_bridge::server::HealthServer;
use entry_bridge::types::BridgeParams;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("loading configuration")?;
    config.validate().context("validating configuration")?;
    init_logging(&config.log_level);

    let mut args = std::env::args().skip(1);
    let (Some(amount), Some(l2_address)) = (args.next(), args.next()) else {
        bail!("usage: entry-bridge <amount> <l2-address>");
    };
    let params = BridgeParams::new(amount, l2_address);

    let Some(codec) = ledger::consensus_codec() else {
        tracing::error!("no consensus transaction id codec compiled in; refusing to sign and broadcast");
        bail!("entry-bridge was built without the `kaspa` feature; rebuild with `--features kaspa`");
    };

    let metrics = Arc::new(MetricsCollector::new());
    if let Some(port) = config.metrics_port {
        let server = HealthServer::new(Arc::new(HealthChecker::new(metrics.clone(), config.clone())), port);
        tokio::spawn(async move {
            if let Err(e) = server.start().await {
                tracing::error!(error = %e, "health server stopped");
            }
        });
    }

    let ledger_client = Arc::new(HttpLedgerClient::new(&config, metrics.clone())?);
    let signer = Arc::new(HttpSigner::new(&config)?);
    let bridge = Bridge::new(config.bridge_settings()?, codec, ledger_client, signer, metrics)
        .with_nonce_source(config.nonce_source());

    match bridge.execute(&params, &config.sender_address).await? {
        BridgeOutcome::Confirmed { mined, broadcast_id } => {
            tracing::info!(
                tx_id = %broadcast_id,
                nonce = mined.nonce,
                iterations = mined.iterations,
                "bridge transfer broadcast"
            );
            println!("{broadcast_id}");
        }
        BridgeOutcome::BroadcastMismatch { mined, broadcast_id } => {
            tracing::warn!(
                mined_id = %mined.transaction_id,
                broadcast_id = %broadcast_id,
                "transfer broadcast without the entry prefix; funds went to the entry address unrecognized"
            );
            println!("{broadcast_id}");
            std::process::exit(2);
        }
    }
    Ok(())
}
