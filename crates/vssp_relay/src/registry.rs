//! Viewer registry and per-viewer outbound channels.
//!
//! The relay loop owns the registry and only ever enqueues. Each WebSocket
//! connection drains the receiving half of its own [`ViewerChannel`], so a slow
//! viewer loses its own oldest frames instead of stalling ingestion for
//! everyone.

use bytes::Bytes;
use std::collections::BTreeMap;
use tokio::sync::broadcast;

use crate::error::ViewerDeliveryError;

pub type ViewerId = u64;

/// How an envelope was accepted by a viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Queued,
    /// Queued, and the viewer's oldest pending envelope was overwritten.
    QueuedDroppedOldest,
}

/// Anything the fanout can hand an envelope to without waiting.
pub trait ViewerSink {
    fn offer(&self, envelope: &Bytes) -> Result<Offer, ViewerDeliveryError>;
}

/// Sending half of one viewer's bounded envelope queue.
///
/// Backed by a single-subscriber `broadcast` channel: when the viewer falls
/// `depth` envelopes behind, the oldest one is overwritten and the receiver
/// sees `RecvError::Lagged`. Dropping the channel ends the receiver's stream
/// once it has drained.
#[derive(Debug)]
pub struct ViewerChannel {
    sender: broadcast::Sender<Bytes>,
    depth: usize,
}

impl ViewerChannel {
    /// Create a channel holding up to `depth` envelopes, rounded up to a power
    /// of two as `broadcast` does internally.
    pub fn new(depth: usize) -> (Self, broadcast::Receiver<Bytes>) {
        let depth = depth.max(1).next_power_of_two();
        let (sender, receiver) = broadcast::channel(depth);
        (Self { sender, depth }, receiver)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Envelopes the viewer has not received yet.
    pub fn pending(&self) -> usize {
        self.sender.len()
    }

    /// True once the viewer's receiver is gone.
    pub fn is_closed(&self) -> bool {
        self.sender.receiver_count() == 0
    }
}

impl ViewerSink for ViewerChannel {
    fn offer(&self, envelope: &Bytes) -> Result<Offer, ViewerDeliveryError> {
        let full = self.sender.len() >= self.depth;
        self.sender
            .send(envelope.clone())
            .map_err(|_| ViewerDeliveryError::Closed)?;
        Ok(if full {
            Offer::QueuedDroppedOldest
        } else {
            Offer::Queued
        })
    }
}

/// Live viewers, keyed by connection id. Removing a viewer drops its sink.
pub struct ViewerRegistry<S> {
    viewers: BTreeMap<ViewerId, S>,
}

impl<S> Default for ViewerRegistry<S> {
    fn default() -> Self {
        Self {
            viewers: BTreeMap::new(),
        }
    }
}

impl<S: ViewerSink> ViewerRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a viewer. A previous viewer under the same id is replaced.
    pub fn register(&mut self, id: ViewerId, sink: S) {
        self.viewers.insert(id, sink);
    }

    /// Remove a viewer. Removing an unknown id is a no-op.
    pub fn remove(&mut self, id: ViewerId) -> bool {
        self.viewers.remove(&id).is_some()
    }

    pub fn clear(&mut self) {
        self.viewers.clear();
    }

    pub fn contains(&self, id: ViewerId) -> bool {
        self.viewers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ViewerId, &S)> {
        self.viewers.iter().map(|(id, sink)| (*id, sink))
    }
}
