//! # state
//!
//! Process-wide counters and the latest decoded record.
//!
//! ## Single-writer rule
//! - `packets_received` is only incremented by the UDP listener.
//! - `last_record` and `clients_connected` are only written by the broadcast hub.
//! - The diagnostics server only reads, through [`ServerState::snapshot`].
//!
//! The `last_record` lock is held just long enough to swap or clone an `Arc`,
//! never across I/O.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::Serialize;
use telemetry_types::TelemetryRecord;

pub type SharedServerState = Arc<ServerState>;

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug)]
pub struct ServerState {
    packets_received: AtomicU64,
    clients_connected: AtomicUsize,
    started_at: Instant,
    started_at_wall: DateTime<Utc>,
    last_record: RwLock<Option<Arc<TelemetryRecord>>>,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerState {
    pub fn new() -> Self {
        Self {
            packets_received: AtomicU64::new(0),
            clients_connected: AtomicUsize::new(0),
            started_at: Instant::now(),
            started_at_wall: Utc::now(),
            last_record: RwLock::new(None),
        }
    }

    /// Counts one accepted datagram and returns its sequence number (1-based).
    pub fn record_packet(&self) -> u64 {
        self.packets_received.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received.load(Ordering::Relaxed)
    }

    pub fn set_clients_connected(&self, n: usize) {
        self.clients_connected.store(n, Ordering::Relaxed);
    }

    pub fn clients_connected(&self) -> usize {
        self.clients_connected.load(Ordering::Relaxed)
    }

    pub fn set_last_record(&self, record: Arc<TelemetryRecord>) {
        // A poisoned lock still holds a whole Arc; keep going with it.
        let mut slot = self.last_record.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(record);
    }

    pub fn last_record(&self) -> Option<Arc<TelemetryRecord>> {
        self.last_record
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let last_packet_time = self.last_record().map(|r| r.received_at_ms);
        StatusSnapshot {
            uptime: self.uptime().as_secs_f64(),
            packets_received: self.packets_received(),
            clients_connected: self.clients_connected(),
            last_packet_time,
            has_telemetry: last_packet_time.is_some(),
            started_at: self.started_at_wall,
        }
    }
}

/// Body of `GET /status`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    /// Seconds since process start
    pub uptime: f64,
    pub packets_received: u64,
    pub clients_connected: usize,
    /// Receive time (unix ms) of the newest record; `null` until the first packet
    pub last_packet_time: Option<u64>,
    pub has_telemetry: bool,
    pub started_at: DateTime<Utc>,
}
