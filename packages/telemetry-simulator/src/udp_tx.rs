//! udp_tx.rs — UDP transmitter for Dash datagrams
//!
//! Encodes one simulated tick with `PacketBuilder` and sends it to the relay.
//! Send errors are logged but never stop the sim.

use std::net::UdpSocket;

use telemetry_types::{PacketBuilder, PacketSchema};
use tracing::{debug, warn};

pub struct UdpTransmitter {
    socket: UdpSocket,
    target: String,
    schema: &'static PacketSchema,
}

impl UdpTransmitter {
    pub fn new(target: &str, schema: &'static PacketSchema) -> Result<Self, std::io::Error> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(false)?;
        Ok(Self {
            socket,
            target: target.to_string(),
            schema,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Encode and send one tick. Returns whether the datagram left the socket.
    pub fn send_values(&self, values: &[(String, f64)]) -> bool {
        let packet = match PacketBuilder::new(self.schema).set_all(values.iter().map(|(k, v)| (k.as_str(), *v))) {
            Ok(builder) => builder.build(),
            Err(e) => {
                warn!("UDP: encode failed: {e}");
                return false;
            }
        };
        self.send(&packet)
    }

    /// Send a truncated datagram the relay must discard without counting.
    pub fn send_malformed(&self) -> bool {
        let short = vec![0u8; self.schema.packet_size() / 2];
        self.send(&short)
    }

    fn send(&self, bytes: &[u8]) -> bool {
        match self.socket.send_to(bytes, &self.target) {
            Ok(n) => {
                debug!("UDP → {} {n} bytes", self.target);
                true
            }
            Err(e) => {
                warn!("UDP: send to {} failed: {e}", self.target);
                false
            }
        }
    }
}
