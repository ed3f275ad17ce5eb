//! # udp_listener
//!
//! Receives telemetry datagrams, decodes them and hands records to the hub.
//!
//! ## Architecture
//! Runs as its own Tokio task (see `server`). For each datagram:
//!   1. Drops it if shorter than the schema's packet size
//!   2. Decodes it (a decode error is dropped the same way)
//!   3. Counts it in `ServerState` and stamps receive time + sequence number
//!   4. Publishes it to the hub, which only does non-blocking queue pushes
//!
//! A malformed datagram or a receive error never ends the loop. Only the
//! shutdown token does.

use std::net::SocketAddr;

use telemetry_types::{decode_with, PacketSchema, TelemetryRecord};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::RECV_BUFFER_BYTES;
use crate::error::{RelayError, Result, ServerRole};
use crate::hub::SharedHub;
use crate::state::{now_ms, SharedServerState};

/// Accepted-packet interval between throughput log lines.
const STATS_EVERY: u64 = 600;

pub async fn bind_udp(addr: &str) -> Result<UdpSocket> {
    UdpSocket::bind(addr).await.map_err(|source| RelayError::Bind {
        role: ServerRole::Udp,
        addr: addr.to_string(),
        source,
    })
}

pub struct UdpListener {
    socket: UdpSocket,
    schema: &'static PacketSchema,
    hub: SharedHub,
    state: SharedServerState,
}

impl UdpListener {
    pub fn new(
        socket: UdpSocket,
        schema: &'static PacketSchema,
        hub: SharedHub,
        state: SharedServerState,
    ) -> Self {
        Self {
            socket,
            schema,
            hub,
            state,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub async fn run(self, shutdown: CancellationToken) {
        if let Ok(addr) = self.local_addr() {
            info!("📡 Telemetry listener on UDP {addr} ({} schema, {} bytes)", self.schema.name, self.schema.packet_size());
        }

        let mut buf = vec![0u8; RECV_BUFFER_BYTES.max(self.schema.packet_size())];

        loop {
            let received = tokio::select! {
                _ = shutdown.cancelled() => break,
                r = self.socket.recv_from(&mut buf) => r,
            };

            match received {
                Ok((len, src)) => self.handle_datagram(&buf[..len], src).await,
                Err(e) => {
                    // e.g. ICMP port unreachable surfacing on some platforms
                    warn!("UDP: recv error: {e}");
                }
            }
        }

        info!("UDP listener stopped after {} packets", self.state.packets_received());
    }

    async fn handle_datagram(&self, data: &[u8], src: SocketAddr) {
        if data.len() < self.schema.packet_size() {
            trace!("UDP: dropped {}-byte datagram from {src}", data.len());
            return;
        }

        let frame = match decode_with(self.schema, data) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("UDP: malformed datagram from {src}: {e}");
                return;
            }
        };

        let seq = self.state.record_packet();
        let record = TelemetryRecord::new(frame, now_ms(), seq);
        self.hub.publish(record).await;

        if seq == 1 {
            info!("UDP: first telemetry packet from {src}");
        } else if seq % STATS_EVERY == 0 {
            info!("UDP: {seq} packets received, {} subscriber(s)", self.state.clients_connected());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use telemetry_types::{PacketBuilder, DASH_PACKET_SIZE, DASH_SCHEMA};

    use crate::hub::BroadcastHub;
    use crate::state::ServerState;

    async fn wait_for_packets(state: &ServerState, n: u64) {
        for _ in 0..200 {
            if state.packets_received() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn counts_valid_packets_and_drops_malformed_ones() {
        let state = Arc::new(ServerState::new());
        let hub = Arc::new(BroadcastHub::new(state.clone()));
        let mut sub = hub.subscribe(SocketAddr::from(([127, 0, 0, 1], 1))).await;

        let socket = bind_udp("127.0.0.1:0").await.unwrap();
        let listener = UdpListener::new(socket, &DASH_SCHEMA, hub.clone(), state.clone());
        let target = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(listener.run(shutdown.clone()));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let valid = PacketBuilder::new(&DASH_SCHEMA)
            .set("currentEngineRpm", 6500.0)
            .unwrap()
            .build();

        // K = 3 valid, J = 2 malformed, interleaved
        sender.send_to(&valid, target).await.unwrap();
        sender.send_to(&[0u8; 10], target).await.unwrap();
        sender.send_to(&valid, target).await.unwrap();
        sender.send_to(&[0u8; DASH_PACKET_SIZE - 1], target).await.unwrap();
        sender.send_to(&valid, target).await.unwrap();

        wait_for_packets(&state, 3).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(state.packets_received(), 3);

        for expected_seq in 1..=3u64 {
            let payload = tokio::time::timeout(Duration::from_secs(1), sub.receiver.recv())
                .await
                .unwrap()
                .unwrap();
            let json: serde_json::Value = serde_json::from_str(&payload).unwrap();
            assert_eq!(json["packetCount"], expected_seq);
            assert_eq!(json["currentEngineRpm"].as_f64(), Some(6500.0));
        }
        assert!(sub.receiver.try_recv().is_err());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn bind_failure_reports_address() {
        let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let err = bind_udp(&addr).await.unwrap_err();
        assert!(matches!(err, RelayError::Bind { role: ServerRole::Udp, .. }));
        assert!(err.to_string().contains(&addr));
    }
}
