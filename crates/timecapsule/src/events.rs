//! Typed event bus for capsule lifecycle changes.
//!
//! Services publish [`CapsuleEvent`]s; consumers hold a [`Subscription`]
//! and stop receiving when they drop it or call [`Subscription::unsubscribe`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Buffered events per subscriber before the slowest one starts lagging.
const EVENT_CAPACITY: usize = 256;

/// Something that happened to a capsule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CapsuleEvent {
    /// A capsule was created.
    CapsuleCreated {
        /// The new capsule.
        capsule_id: String,
        /// Its name.
        name: String,
        /// When it unlocks.
        unlock_at: DateTime<Utc>,
    },

    /// A user became a member.
    MemberJoined {
        /// The capsule joined.
        capsule_id: String,
        /// The new member.
        user_id: String,
    },

    /// A user was removed from the members.
    MemberRemoved {
        /// The capsule left.
        capsule_id: String,
        /// The removed member.
        user_id: String,
    },

    /// A clip was uploaded.
    ClipAdded {
        /// The capsule the clip belongs to.
        capsule_id: String,
        /// The new clip.
        clip_id: String,
        /// When the clip was recorded.
        recorded_at: DateTime<Utc>,
    },

    /// The unseal sweep flipped the capsule's flag. Emitted once per capsule.
    CapsuleUnsealed {
        /// The unsealed capsule.
        capsule_id: String,
        /// When the sweep flipped it.
        unsealed_at: DateTime<Utc>,
    },
}

impl CapsuleEvent {
    /// The capsule this event concerns.
    #[must_use]
    pub fn capsule_id(&self) -> &str {
        match self {
            Self::CapsuleCreated { capsule_id, .. }
            | Self::MemberJoined { capsule_id, .. }
            | Self::MemberRemoved { capsule_id, .. }
            | Self::ClipAdded { capsule_id, .. }
            | Self::CapsuleUnsealed { capsule_id, .. } => capsule_id,
        }
    }
}

/// Cloneable handle for publishing and subscribing to capsule events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CapsuleEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Returns the number of subscribers that will see it. Publishing with
    /// nobody listening is fine.
    pub fn publish(&self, event: CapsuleEvent) -> usize {
        debug!(capsule_id = event.capsule_id(), ?event, "publishing event");
        self.tx.send(event).unwrap_or(0)
    }

    /// Start receiving events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A live subscription to an [`EventBus`].
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<CapsuleEvent>,
}

impl Subscription {
    /// Wait for the next event. Returns `None` once the bus is gone.
    ///
    /// If this subscriber fell behind, the missed events are skipped with a
    /// warning.
    pub async fn recv(&mut self) -> Option<CapsuleEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("event subscriber lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<CapsuleEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("event subscriber lagged, skipped {} events", skipped);
                }
                Err(_) => return None,
            }
        }
    }

    /// Drain every queued event.
    pub fn drain(&mut self) -> Vec<CapsuleEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Stop receiving events.
    pub fn unsubscribe(self) {
        drop(self);
    }
}
