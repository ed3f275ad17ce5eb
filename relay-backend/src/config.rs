use std::net::{Ipv6Addr, SocketAddr};

use tracing::warn;

// ── Configuration ─────────────────────────────────────────────────────────────

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_UDP_PORT: u16 = 5555;
pub const DEFAULT_WS_PORT: u16 = 8765;
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Largest datagram read in one `recv_from`; longer ones are truncated by the OS.
pub const RECV_BUFFER_BYTES: usize = 2048;
/// Outbound records queued per subscriber before it is considered stuck and dropped.
pub const SUBSCRIBER_QUEUE_DEPTH: usize = 256;
/// How long shutdown waits for the server tasks to wind down.
pub const SHUTDOWN_DRAIN_SECS: u64 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Interface all three servers bind on (default 0.0.0.0)
    pub host: String,
    /// UDP telemetry input (default 5555)
    pub udp_port: u16,
    /// WebSocket fan-out (default 8765)
    pub ws_port: u16,
    /// HTTP diagnostics (default 8080)
    pub http_port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            udp_port: DEFAULT_UDP_PORT,
            ws_port: DEFAULT_WS_PORT,
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

impl RelayConfig {
    /// Reads `HOST`, `UDP_PORT`, `WS_PORT` and `HTTP_PORT` from the environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = |key: &str, default: u16| match lookup(key) {
            None => default,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("{key}={raw:?} is not a valid port, using {default}");
                default
            }),
        };

        Self {
            host: lookup("HOST")
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            udp_port: port("UDP_PORT", DEFAULT_UDP_PORT),
            ws_port: port("WS_PORT", DEFAULT_WS_PORT),
            http_port: port("HTTP_PORT", DEFAULT_HTTP_PORT),
        }
    }

    pub fn udp_addr(&self) -> String {
        join_host_port(&self.host, self.udp_port)
    }

    pub fn ws_addr(&self) -> String {
        join_host_port(&self.host, self.ws_port)
    }

    pub fn http_addr(&self) -> String {
        join_host_port(&self.host, self.http_port)
    }
}

// IPv6 literals need brackets to be parsed back as a socket address.
fn join_host_port(host: &str, port: u16) -> String {
    match host.parse::<Ipv6Addr>() {
        Ok(ip) => SocketAddr::from((ip, port)).to_string(),
        Err(_) => format!("{host}:{port}"),
    }
}
