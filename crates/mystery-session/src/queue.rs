//! FIFO buffers of received (and locally mirrored) messages.
//!
//! Messages wait here until the dispatch router pulls them on its tick.
//! The router may hand a message back with [`Queue::put_back`] when the
//! presentation layer is busy; it then becomes the next one dequeued,
//! ahead of everything that arrived after it.

use std::collections::VecDeque;

use mystery_protocol::{Envelope, PrivateEnvelope};

/// Ordered buffer with a put-back operation.
#[derive(Debug, Clone)]
pub struct Queue<T> {
    items: VecDeque<T>,
}

/// Room messages awaiting dispatch. Kinds are computed on consumption.
pub type MessageQueue = Queue<Envelope>;

/// Direct messages awaiting dispatch.
pub type PrivateMessageQueue = Queue<PrivateEnvelope>;

impl<T> Queue<T> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    /// Appends an already built item.
    pub fn push(&mut self, item: T) {
        self.items.push_back(item);
    }

    /// Removes and returns the oldest item. `None` is the normal result of
    /// polling an empty queue.
    pub fn dequeue(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Returns a dequeued item so that it is the next one dequeued.
    pub fn put_back(&mut self, item: T) {
        self.items.push_front(item);
    }

    /// The item [`dequeue`](Self::dequeue) would return.
    pub fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl Queue<Envelope> {
    /// Wraps a raw line from `sender` and appends it.
    pub fn enqueue(&mut self, raw: impl Into<String>, sender: impl Into<String>) {
        self.push(Envelope::new(raw, sender));
    }
}

impl Queue<PrivateEnvelope> {
    /// Wraps a direct message from `sender` to `receiver` and appends it.
    pub fn enqueue(
        &mut self,
        raw: impl Into<String>,
        sender: impl Into<String>,
        receiver: impl Into<String>,
    ) {
        self.push(PrivateEnvelope::new(raw, sender, receiver));
    }
}
