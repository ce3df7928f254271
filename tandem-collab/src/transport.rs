//! In-process delivery hub: fan-out of encoded operations to N-1 peers.
//!
//! Stands in for the peer-to-peer data channel. The contract matches
//! what the engine expects from a real transport: best-effort,
//! unordered between senders, at-least-once — duplicates are the
//! receiver's problem, which the engine solves by op-id dedup.
//!
//! Built on a tokio broadcast channel: every subscriber gets an
//! independent receiver buffering up to `capacity` deliveries; lagging
//! receivers drop the oldest. Send-side stats are atomics so
//! publishing never takes a lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use tandem_core::{Operation, SyncError};

use crate::protocol::Peer;

/// One delivery: the sender's id and an encoded operation.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub from: String,
    pub payload: String,
}

impl Delivery {
    /// Decode the carried operation.
    pub fn op(&self) -> Result<Operation, SyncError> {
        Operation::decode(&self.payload)
    }
}

/// Snapshot of hub counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    pub deliveries_sent: u64,
    pub deliveries_dropped: u64,
    pub active_peers: usize,
}

struct AtomicHubStats {
    sent: AtomicU64,
    dropped: AtomicU64,
}

/// Fan-out channel shared by every peer of one document.
pub struct DeliveryHub {
    sender: broadcast::Sender<Arc<Delivery>>,
    peers: Arc<RwLock<HashMap<String, Peer>>>,
    capacity: usize,
    stats: Arc<AtomicHubStats>,
}

impl DeliveryHub {
    /// Create a hub buffering up to `capacity` deliveries per receiver.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            peers: Arc::new(RwLock::new(HashMap::new())),
            capacity,
            stats: Arc::new(AtomicHubStats {
                sent: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Register a peer; returns its receiver. Receivers see every
    /// delivery including their own — filtering by `from` is the
    /// subscriber's job.
    pub async fn add_peer(&self, peer: Peer) -> broadcast::Receiver<Arc<Delivery>> {
        let mut peers = self.peers.write().await;
        peers.insert(peer.user_id.clone(), peer);
        self.sender.subscribe()
    }

    /// Drop a peer from the roster. Its receiver keeps draining
    /// whatever was already buffered.
    pub async fn remove_peer(&self, user_id: &str) -> Option<Peer> {
        self.peers.write().await.remove(user_id)
    }

    /// Publish raw payload bytes. Returns how many receivers got it.
    pub fn publish(&self, from: impl Into<String>, payload: impl Into<String>) -> usize {
        let delivery = Arc::new(Delivery {
            from: from.into(),
            payload: payload.into(),
        });
        let count = self.sender.send(delivery).unwrap_or(0);
        if count == 0 {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.sent.fetch_add(1, Ordering::Relaxed);
        }
        count
    }

    /// Encode and publish one operation.
    pub fn publish_op(&self, from: &str, op: &Operation) -> Result<usize, SyncError> {
        Ok(self.publish(from, op.encode()?))
    }

    /// Subscribe without joining the roster (observers, tests).
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Delivery>> {
        self.sender.subscribe()
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn has_peer(&self, user_id: &str) -> bool {
        self.peers.read().await.contains_key(user_id)
    }

    pub async fn peers(&self) -> Vec<Peer> {
        self.peers.read().await.values().cloned().collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn stats(&self) -> HubStats {
        HubStats {
            deliveries_sent: self.stats.sent.load(Ordering::Relaxed),
            deliveries_dropped: self.stats.dropped.load(Ordering::Relaxed),
            active_peers: self.peers.read().await.len(),
        }
    }
}
