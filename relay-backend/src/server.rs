//! # server
//!
//! Binds the three listeners and runs them until shutdown.
//!
//! Binding happens up front in [`Relay::bind`] so a port conflict surfaces as
//! one `RelayError::Bind` before anything starts serving. [`Relay::run`] then
//! spawns one task per listener, waits for the shutdown token, closes every
//! subscriber and gives the tasks a short drain window.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use telemetry_types::{PacketSchema, DASH_SCHEMA};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{RelayConfig, SHUTDOWN_DRAIN_SECS};
use crate::diagnostics::{bind_http, serve_http};
use crate::error::{RelayError, Result, ServerRole};
use crate::hub::{BroadcastHub, SharedHub};
use crate::state::{ServerState, SharedServerState};
use crate::udp_listener::{bind_udp, UdpListener};
use crate::ws_server::{bind_ws, serve_ws};

#[derive(Debug, Clone, Copy)]
pub struct RelayAddrs {
    pub udp: SocketAddr,
    pub ws: SocketAddr,
    pub http: SocketAddr,
}

pub struct Relay {
    udp: UdpListener,
    ws: TcpListener,
    http: TcpListener,
    addrs: RelayAddrs,
    hub: SharedHub,
    state: SharedServerState,
}

impl Relay {
    pub async fn bind(config: &RelayConfig) -> Result<Self> {
        Self::bind_with_schema(config, &DASH_SCHEMA).await
    }

    pub async fn bind_with_schema(config: &RelayConfig, schema: &'static PacketSchema) -> Result<Self> {
        let udp_addr = config.udp_addr();
        let ws_addr = config.ws_addr();
        let http_addr = config.http_addr();

        let udp_socket = bind_udp(&udp_addr).await?;
        let ws = bind_ws(&ws_addr).await?;
        let http = bind_http(&http_addr).await?;

        let local = |role: ServerRole, addr: &str, r: std::io::Result<SocketAddr>| {
            r.map_err(|source| RelayError::Bind {
                role,
                addr: addr.to_string(),
                source,
            })
        };
        let addrs = RelayAddrs {
            udp: local(ServerRole::Udp, &udp_addr, udp_socket.local_addr())?,
            ws: local(ServerRole::WebSocket, &ws_addr, ws.local_addr())?,
            http: local(ServerRole::Http, &http_addr, http.local_addr())?,
        };

        let state: SharedServerState = Arc::new(ServerState::new());
        let hub: SharedHub = Arc::new(BroadcastHub::new(state.clone()));
        let udp = UdpListener::new(udp_socket, schema, hub.clone(), state.clone());

        Ok(Self {
            udp,
            ws,
            http,
            addrs,
            hub,
            state,
        })
    }

    /// Actual bound addresses (differs from config when port 0 was requested).
    pub fn addrs(&self) -> RelayAddrs {
        self.addrs
    }

    /// Serves until `shutdown` fires. Returns the error of a listener that
    /// failed on its own, which also triggers shutdown.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let Relay {
            udp,
            ws,
            http,
            addrs,
            hub,
            state,
        } = self;

        let udp_task = tokio::spawn(udp.run(shutdown.clone()));
        let ws_task = spawn_server(serve_ws(ws, hub.clone(), shutdown.clone()), shutdown.clone());
        let http_task = spawn_server(
            serve_http(http, state.clone(), addrs.ws.port(), shutdown.clone()),
            shutdown.clone(),
        );

        info!("🚀 Relay up: UDP {} → ws://{} · http://{}", addrs.udp, addrs.ws, addrs.http);

        shutdown.cancelled().await;
        info!("Shutting down: closing {} subscriber(s)", hub.subscriber_count().await);
        hub.close_all().await;

        let drain = async { tokio::join!(udp_task, ws_task, http_task) };
        let outcome = match tokio::time::timeout(Duration::from_secs(SHUTDOWN_DRAIN_SECS), drain).await {
            Ok((_, ws, http)) => [ws, http]
                .into_iter()
                .filter_map(|joined| joined.ok())
                .find_map(|r| r.err())
                .map_or(Ok(()), Err),
            Err(_) => {
                warn!("Shutdown drain timed out after {SHUTDOWN_DRAIN_SECS}s");
                Ok(())
            }
        };

        info!("Relay stopped ({} packets relayed)", state.packets_received());
        outcome
    }
}

// A listener that dies on its own takes the whole relay down with it.
fn spawn_server<F>(fut: F, shutdown: CancellationToken) -> JoinHandle<Result<()>>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let result = fut.await;
        if let Err(e) = &result {
            error!("{e}");
            shutdown.cancel();
        }
        result
    })
}

/// Resolves on SIGINT (Ctrl-C) or, on Unix, SIGTERM. Returns the signal name.
pub async fn shutdown_signal() -> Result<&'static str> {
    let ctrl_c = async { tokio::signal::ctrl_c().await.map(|_| "SIGINT") };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate())?.recv().await;
        Ok::<_, std::io::Error>("SIGTERM")
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<std::io::Result<&'static str>>();

    let received = tokio::select! {
        r = ctrl_c => r,
        r = terminate => r,
    };
    received.map_err(RelayError::Signal)
}
