// src/reload/mod.rs

//! Live-reload fan-out.
//!
//! A [`ReloadChannel`] is cloned into the build pipeline (publisher) and the
//! server (one subscription per connected client). Delivery is
//! at-most-once: subscribers only see events published while they are
//! subscribed, and a subscriber that falls behind skips what it missed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

const DEFAULT_CAPACITY: usize = 16;

/// "Reload now", numbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReloadEvent {
    pub seq: u64,
}

#[derive(Debug, Clone)]
pub struct ReloadChannel {
    tx: broadcast::Sender<ReloadEvent>,
    seq: Arc<AtomicU64>,
}

impl Default for ReloadChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloadChannel {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// `capacity` bounds how far a subscriber may lag before it skips.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Broadcast a new event to the current subscribers. The sequence
    /// number advances even when nobody is listening.
    pub fn publish(&self) -> ReloadEvent {
        let event = ReloadEvent {
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
        };
        // No subscribers is fine: events are not buffered for later ones.
        let receivers = self.tx.send(event).unwrap_or(0);
        debug!(seq = event.seq, receivers, "published reload event");
        event
    }

    pub fn subscribe(&self) -> ReloadSubscription {
        ReloadSubscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Sequence number of the last published event (0 before the first).
    pub fn last_seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }
}

/// One client's view of the channel. Dropping it unsubscribes.
#[derive(Debug)]
pub struct ReloadSubscription {
    rx: broadcast::Receiver<ReloadEvent>,
}

impl ReloadSubscription {
    /// Next event; `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<ReloadEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(missed, "reload subscriber lagged; skipping missed events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already waiting.
    pub fn try_recv(&mut self) -> Option<ReloadEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}

    pub fn into_stream(self) -> impl Stream<Item = ReloadEvent> + Send + 'static {
        BroadcastStream::new(self.rx).filter_map(|item| match item {
            Ok(event) => Some(event),
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                debug!(missed, "reload stream lagged; skipping missed events");
                None
            }
        })
    }
}
