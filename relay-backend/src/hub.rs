//! # hub
//!
//! Broadcast hub: owns the subscriber registry and the latest serialized
//! record, and fans every published record out to all subscribers.
//!
//! ## Delivery model
//! Each subscriber gets a bounded queue. `publish` serializes the record once
//! and `try_send`s the same `Arc<str>` into every queue, so it never waits on a
//! socket. A subscriber whose queue is full or closed is dropped from the
//! registry and its `closed` token is cancelled; everyone else still gets the
//! record. The subscriber's own connection task (see `ws_server`) drains its
//! queue onto the WebSocket and ends as soon as `closed` fires, even when its
//! socket write is stalled.
//!
//! ## Invariants
//! - Per subscriber, payloads arrive in publish order.
//! - `subscribe` enqueues the latest payload under the same lock `publish`
//!   takes, so a late joiner never sees a record twice or out of order.
//! - `unsubscribe` is idempotent.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use telemetry_types::TelemetryRecord;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SUBSCRIBER_QUEUE_DEPTH;
use crate::state::SharedServerState;

/// One serialized record, shared by every subscriber queue.
pub type Payload = Arc<str>;

pub type SharedHub = Arc<BroadcastHub>;

// ── Subscriber bookkeeping ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(Uuid);

impl std::fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Subscriber {
    remote: SocketAddr,
    connected_at: DateTime<Utc>,
    tx: mpsc::Sender<Payload>,
    closed: CancellationToken,
}

/// Returned by [`BroadcastHub::subscribe`]: the handle to unsubscribe with,
/// the queue the connection task drains, and a token the hub cancels once the
/// subscriber is no longer registered.
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub receiver: mpsc::Receiver<Payload>,
    pub closed: CancellationToken,
}

/// Registry entry as seen from outside the hub.
#[derive(Debug, Clone)]
pub struct SubscriberInfo {
    pub handle: SubscriptionHandle,
    pub remote: SocketAddr,
    pub connected_at: DateTime<Utc>,
}

#[derive(Default)]
struct Registry {
    subscribers: HashMap<SubscriptionHandle, Subscriber>,
    latest: Option<Payload>,
}

// ── Hub ───────────────────────────────────────────────────────────────────────

pub struct BroadcastHub {
    registry: RwLock<Registry>,
    state: SharedServerState,
    queue_depth: usize,
}

impl BroadcastHub {
    pub fn new(state: SharedServerState) -> Self {
        Self::with_queue_depth(state, SUBSCRIBER_QUEUE_DEPTH)
    }

    pub fn with_queue_depth(state: SharedServerState, queue_depth: usize) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            state,
            queue_depth: queue_depth.max(1),
        }
    }

    /// Store `record` as the latest and push it to every subscriber.
    pub async fn publish(&self, record: TelemetryRecord) {
        let payload: Payload = match record.to_json() {
            Ok(json) => json.into(),
            Err(e) => {
                // Only reachable if a field type stops being serializable.
                warn!("Hub: failed to serialize record #{}: {e}", record.sequence_number);
                return;
            }
        };

        let mut reg = self.registry.write().await;
        reg.latest = Some(payload.clone());
        self.state.set_last_record(Arc::new(record));

        let mut dropped = Vec::new();
        for (handle, sub) in reg.subscribers.iter() {
            match sub.tx.try_send(payload.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("Hub: subscriber {handle} ({}) is not keeping up, disconnecting", sub.remote);
                    dropped.push(*handle);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Hub: subscriber {handle} ({}) already gone", sub.remote);
                    dropped.push(*handle);
                }
            }
        }

        if !dropped.is_empty() {
            for handle in dropped {
                if let Some(sub) = reg.subscribers.remove(&handle) {
                    sub.closed.cancel();
                }
            }
            self.state.set_clients_connected(reg.subscribers.len());
        }
    }

    pub async fn subscribe(&self, remote: SocketAddr) -> Subscription {
        let (tx, receiver) = mpsc::channel(self.queue_depth);
        let handle = SubscriptionHandle(Uuid::new_v4());
        let closed = CancellationToken::new();

        let mut reg = self.registry.write().await;
        if let Some(latest) = reg.latest.clone() {
            // Fresh queue with capacity ≥ 1: cannot fail.
            let _ = tx.try_send(latest);
        }
        reg.subscribers.insert(
            handle,
            Subscriber {
                remote,
                connected_at: Utc::now(),
                tx,
                closed: closed.clone(),
            },
        );
        self.state.set_clients_connected(reg.subscribers.len());
        info!("Hub: subscriber {handle} joined from {remote} ({} connected)", reg.subscribers.len());

        Subscription { handle, receiver, closed }
    }

    pub async fn unsubscribe(&self, handle: SubscriptionHandle) {
        let mut reg = self.registry.write().await;
        if let Some(sub) = reg.subscribers.remove(&handle) {
            sub.closed.cancel();
            self.state.set_clients_connected(reg.subscribers.len());
            let secs = (Utc::now() - sub.connected_at).num_seconds();
            info!(
                "Hub: subscriber {handle} from {} left after {secs}s ({} connected)",
                sub.remote,
                reg.subscribers.len()
            );
        }
    }

    /// Drops every subscriber queue and fires every `closed` token.
    pub async fn close_all(&self) {
        let mut reg = self.registry.write().await;
        let n = reg.subscribers.len();
        for (_, sub) in reg.subscribers.drain() {
            sub.closed.cancel();
        }
        self.state.set_clients_connected(0);
        if n > 0 {
            info!("Hub: closed {n} subscriber(s)");
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.registry.read().await.subscribers.len()
    }

    pub async fn subscribers(&self) -> Vec<SubscriberInfo> {
        self.registry
            .read()
            .await
            .subscribers
            .iter()
            .map(|(handle, sub)| SubscriberInfo {
                handle: *handle,
                remote: sub.remote,
                connected_at: sub.connected_at,
            })
            .collect()
    }

    pub async fn latest_payload(&self) -> Option<Payload> {
        self.registry.read().await.latest.clone()
    }
}
