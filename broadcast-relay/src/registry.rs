use std::{
    collections::BTreeMap,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::Bytes;
use flume::{Receiver, Sender, TrySendError};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::{message, relay::RelayConfig};

pub type SessionId = u64;

/// Live sessions plus the shared inbound channel every reader pushes into.
///
/// Session ids grow with acceptance order, so iterating the map visits
/// sessions oldest first. Entries are removed when a session ends, which
/// also closes that session's mailbox.
pub struct Registry {
    sessions: RwLock<BTreeMap<SessionId, Sender<Bytes>>>,
    inbound: Sender<Bytes>,
    next_id: AtomicU64,
    marker: u8,
    mailbox_capacity: usize,
}

/// Per-recipient outcome counts for one broadcast.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: usize,
    pub dropped: usize,
    pub closed: usize,
}

/// Sole consumer of a registry's inbound channel.
///
/// Only [`Registry::new`] creates one and [`BroadcastLoop::run`] consumes it,
/// so each registry has at most one broadcast loop. The loop ends once the
/// registry and every session reader are gone.
pub struct BroadcastLoop {
    registry: Weak<Registry>,
    inbound: Receiver<Bytes>,
}

impl Registry {
    pub fn new(config: &RelayConfig) -> (Arc<Self>, BroadcastLoop) {
        let (inbound_tx, inbound_rx) = flume::bounded(config.inbound_capacity);
        let registry = Arc::new(Self {
            sessions: RwLock::new(BTreeMap::new()),
            inbound: inbound_tx,
            next_id: AtomicU64::new(1),
            marker: config.marker,
            mailbox_capacity: config.mailbox_capacity,
        });
        let broadcast = BroadcastLoop {
            registry: Arc::downgrade(&registry),
            inbound: inbound_rx,
        };
        (registry, broadcast)
    }

    /// Allocates a mailbox for a new session and adds it to the live set.
    ///
    /// With the default capacity of zero the mailbox holds nothing: a
    /// broadcast only lands if the session's writer is already waiting.
    pub async fn register(&self) -> (SessionId, Receiver<Bytes>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (mailbox_tx, mailbox_rx) = flume::bounded(self.mailbox_capacity);
        self.sessions.write().await.insert(id, mailbox_tx);
        (id, mailbox_rx)
    }

    /// Removes a session. Dropping its sender closes the mailbox, which is
    /// what stops the session's writer.
    pub async fn deregister(&self, id: SessionId) -> bool {
        self.sessions.write().await.remove(&id).is_some()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub fn inbound(&self) -> Sender<Bytes> {
        self.inbound.clone()
    }

    /// Offers `message` to every live mailbox without waiting.
    ///
    /// A mailbox with no room, including a rendezvous mailbox whose writer is
    /// busy, loses this message; nothing is retried or reported to the sender.
    pub async fn fan_out(&self, message: &Bytes) -> FanOut {
        let sessions = self.sessions.read().await;
        let mut report = FanOut::default();

        for (id, mailbox) in sessions.iter() {
            match mailbox.try_send(message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    trace!(session = id, "writer busy, dropping message");
                    report.dropped += 1;
                }
                Err(TrySendError::Disconnected(_)) => report.closed += 1,
            }
        }

        report
    }
}

impl BroadcastLoop {
    pub async fn run(self) {
        while let Ok(chunk) = self.inbound.recv_async().await {
            let Some(registry) = self.registry.upgrade() else {
                break;
            };
            let message = message::tag(registry.marker, &chunk);
            let report = registry.fan_out(&message).await;
            debug!(
                bytes = message.len(),
                delivered = report.delivered,
                dropped = report.dropped,
                closed = report.closed,
                "broadcast message"
            );
        }
        debug!("registry gone, broadcast loop exiting");
    }
}
