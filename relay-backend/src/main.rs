use std::process::ExitCode;

use relay_backend::{shutdown_signal, Relay, RelayConfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

// ─── Main ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_backend=info,telemetry_relay=info,tower_http=warn".into()),
        )
        .init();

    info!("🏁 Telemetry Relay starting...");

    let config = RelayConfig::from_env();
    info!(
        "Config: host={} udp={} ws={} http={}",
        config.host, config.udp_port, config.ws_port, config.http_port
    );

    // Bind failures are the one startup error we do not absorb.
    let relay = match Relay::bind(&config).await {
        Ok(relay) => relay,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(sig) => info!("{sig} received"),
            Err(e) => {
                // Still serve; the process can only be killed now.
                error!("{e}");
                std::future::pending::<()>().await;
            }
        }
        signal_token.cancel();
    });

    match relay.run(shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
