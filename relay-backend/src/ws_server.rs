//! # ws_server
//!
//! WebSocket endpoint for live subscribers. Each accepted connection becomes
//! one task that registers with the hub and then runs two halves:
//!   - writer: drains the subscriber's hub queue onto the socket
//!   - reader: waits for the client to close (client messages are ignored)
//!
//! Whichever half ends first ends the connection and unsubscribes it. So does
//! the hub evicting the subscriber, or the shutdown token. Data is pushed by
//! the hub; nothing here polls.

use std::fmt::Display;
use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{RelayError, Result, ServerRole};
use crate::hub::{SharedHub, Subscription};

/// How long the closing frame may take before the socket is simply dropped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

pub async fn bind_ws(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr).await.map_err(|source| RelayError::Bind {
        role: ServerRole::WebSocket,
        addr: addr.to_string(),
        source,
    })
}

#[derive(Clone)]
struct WsState {
    hub: SharedHub,
    shutdown: CancellationToken,
}

pub fn router(hub: SharedHub, shutdown: CancellationToken) -> Router {
    Router::new()
        .route("/", get(ws_upgrade))
        .route("/ws", get(ws_upgrade))
        .with_state(WsState { hub, shutdown })
}

pub async fn serve_ws(listener: TcpListener, hub: SharedHub, shutdown: CancellationToken) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("🔌 Subscribers on ws://{addr}");
    }

    let app = router(hub, shutdown.clone());
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|source| RelayError::Serve {
            role: ServerRole::WebSocket,
            source,
        })
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(st): State<WsState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_subscriber(socket, remote, st.hub, st.shutdown))
}

async fn handle_subscriber(
    socket: WebSocket,
    remote: SocketAddr,
    hub: SharedHub,
    shutdown: CancellationToken,
) {
    let subscription = hub.subscribe(remote).await;
    let handle = subscription.handle;
    let (sink, stream) = socket.split();
    pump(sink, stream, subscription, remote, shutdown).await;
    hub.unsubscribe(handle).await;
}

/// Runs one subscriber connection until the peer leaves, the hub drops the
/// subscriber, or the relay shuts down, then sends a close frame.
async fn pump<Si, St, E>(
    mut sink: Si,
    mut stream: St,
    subscription: Subscription,
    remote: SocketAddr,
    shutdown: CancellationToken,
) where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
    St: Stream<Item = std::result::Result<Message, E>> + Unpin,
    E: Display,
{
    let Subscription {
        mut receiver, closed, ..
    } = subscription;

    let writer = async {
        while let Some(payload) = receiver.recv().await {
            if let Err(e) = sink.send(Message::Text(payload.to_string())).await {
                debug!("WS {remote}: send failed: {e}");
                return;
            }
        }
        debug!("WS {remote}: hub closed the queue");
    };

    let reader = async {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    debug!("WS {remote}: read error: {e}");
                    break;
                }
                Ok(_) => {}
            }
        }
    };

    // `closed` covers a writer stuck on a peer that stopped reading.
    tokio::select! {
        _ = writer => {}
        _ = reader => {}
        _ = closed.cancelled() => debug!("WS {remote}: dropped by the hub"),
        _ = shutdown.cancelled() => {}
    }

    // Best effort; the peer may already be gone or stalled.
    if tokio::time::timeout(CLOSE_TIMEOUT, sink.send(Message::Close(None))).await.is_err() {
        debug!("WS {remote}: close frame timed out");
    }
}
