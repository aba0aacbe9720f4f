//! Subscriber registry for device events.
//!
//! Subscribers are notified in registration order. Each one owns a bounded
//! queue; a subscriber that falls behind misses events instead of stalling
//! the read loop, and a dropped [`EventStream`] is pruned on the next emit.
//! Once the device has shut down the registry is closed and new streams end
//! immediately.

use tokio::sync::mpsc;

use super::DeviceEvent;

/// Receiving end of one subscription.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<DeviceEvent>,
}

impl EventStream {
    /// Wait for the next event.
    ///
    /// Returns `None` once the device has shut down and the queue is drained.
    pub async fn recv(&mut self) -> Option<DeviceEvent> {
        self.rx.recv().await
    }

    /// Take an event if one is already queued.
    pub fn try_recv(&mut self) -> Option<DeviceEvent> {
        self.rx.try_recv().ok()
    }
}

/// Ordered set of subscriber queues.
pub(crate) struct ListenerRegistry {
    subscribers: Vec<mpsc::Sender<DeviceEvent>>,
    capacity: usize,
    closed: bool,
}

impl ListenerRegistry {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            subscribers: Vec::new(),
            capacity: capacity.max(1),
            closed: false,
        }
    }

    /// Queue length for subscribers registered from now on.
    pub(crate) fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
    }

    /// Register a new subscriber at the end of the notification order.
    ///
    /// After [`close`](Self::close) the stream is returned already ended.
    pub(crate) fn subscribe(&mut self) -> EventStream {
        let (tx, rx) = mpsc::channel(self.capacity);
        if !self.closed {
            self.subscribers.push(tx);
        }
        EventStream { rx }
    }

    /// Deliver an event to every live subscriber.
    pub(crate) fn emit(&mut self, event: &DeviceEvent) {
        self.subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Event subscriber queue full, dropping {:?}", event);
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Drop every subscriber so their streams end, and refuse new ones.
    pub(crate) fn close(&mut self) {
        self.closed = true;
        self.subscribers.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.subscribers.len()
    }
}
