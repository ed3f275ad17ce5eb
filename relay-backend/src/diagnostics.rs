//! # diagnostics
//!
//! HTTP surface for operators: `GET /status` (JSON counters), `GET /` (a live
//! page that subscribes to the WebSocket feed itself) and `GET /health`.
//! Reads `ServerState` through snapshots only.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::error::{RelayError, Result, ServerRole};
use crate::state::{SharedServerState, StatusSnapshot};

const LIVE_PAGE: &str = include_str!("../assets/live.html");

pub async fn bind_http(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr).await.map_err(|source| RelayError::Bind {
        role: ServerRole::Http,
        addr: addr.to_string(),
        source,
    })
}

#[derive(Clone)]
struct DiagState {
    state: SharedServerState,
    page: Arc<str>,
}

/// `ws_port` is baked into the live page so it can find the feed on the same host.
pub fn router(state: SharedServerState, ws_port: u16) -> Router {
    let page: Arc<str> = LIVE_PAGE.replace("{{WS_PORT}}", &ws_port.to_string()).into();

    // Dashboards on other origins poll /status
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(live_page))
        .route("/status", get(status))
        .route("/health", get(|| async { "ok" }))
        .with_state(DiagState { state, page })
        .layer(cors)
}

pub async fn serve_http(
    listener: TcpListener,
    state: SharedServerState,
    ws_port: u16,
    shutdown: CancellationToken,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("🩺 Diagnostics on http://{addr} (/status, /)");
    }

    let app = router(state, ws_port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|source| RelayError::Serve {
            role: ServerRole::Http,
            source,
        })
}

async fn live_page(State(st): State<DiagState>) -> Html<String> {
    Html(st.page.to_string())
}

async fn status(State(st): State<DiagState>) -> Json<StatusSnapshot> {
    Json(st.state.snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use telemetry_types::{decode, TelemetryRecord, DASH_PACKET_SIZE};
    use tower::ServiceExt;

    use crate::state::ServerState;

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn status_before_any_packet() {
        let state = Arc::new(ServerState::new());
        let (code, body) = get_body(router(state, 8765), "/status").await;
        assert_eq!(code, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["packetsReceived"], 0);
        assert_eq!(json["clientsConnected"], 0);
        assert!(json["lastPacketTime"].is_null());
        assert_eq!(json["hasTelemetry"], false);
        assert!(json["uptime"].as_f64().unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn status_reflects_counters() {
        let state = Arc::new(ServerState::new());
        state.record_packet();
        let seq = state.record_packet();
        let frame = decode(&[0u8; DASH_PACKET_SIZE]).unwrap();
        state.set_last_record(Arc::new(TelemetryRecord::new(frame, 99, seq)));
        state.set_clients_connected(4);

        let (_, body) = get_body(router(state, 8765), "/status").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["packetsReceived"], 2);
        assert_eq!(json["clientsConnected"], 4);
        assert_eq!(json["lastPacketTime"], 99);
        assert_eq!(json["hasTelemetry"], true);
    }

    #[tokio::test]
    async fn status_does_not_touch_counters() {
        let state = Arc::new(ServerState::new());
        let app = router(state.clone(), 8765);
        for _ in 0..3 {
            get_body(app.clone(), "/status").await;
        }
        assert_eq!(state.packets_received(), 0);
        assert_eq!(state.clients_connected(), 0);
    }

    #[tokio::test]
    async fn live_page_points_at_ws_port() {
        let (code, body) = get_body(router(Arc::new(ServerState::new()), 9123), "/").await;
        assert_eq!(code, StatusCode::OK);
        assert!(body.contains("9123"));
        assert!(!body.contains("{{WS_PORT}}"));
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (code, body) = get_body(router(Arc::new(ServerState::new()), 8765), "/health").await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body, "ok");
    }
}
