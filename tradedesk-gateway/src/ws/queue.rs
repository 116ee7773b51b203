//! FIFO buffer for messages sent while no link is open.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use super::message::Message;

/// A message waiting for a link.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    /// The message to send.
    pub payload: Message,
    /// When it was queued.
    pub enqueued_at: DateTime<Utc>,
}

/// Unbounded FIFO of outbound messages.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    items: VecDeque<QueuedMessage>,
}

impl OutboundQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message.
    pub fn enqueue(&mut self, payload: Message) {
        self.items.push_back(QueuedMessage {
            payload,
            enqueued_at: Utc::now(),
        });
    }

    /// Sends queued messages oldest first until `send` fails.
    ///
    /// The message that failed and everything behind it stay queued.
    /// Returns how many were sent.
    pub fn flush<E>(&mut self, mut send: impl FnMut(&Message) -> Result<(), E>) -> usize {
        let mut sent = 0;
        while let Some(front) = self.items.front() {
            if send(&front.payload).is_err() {
                break;
            }
            self.items.pop_front();
            sent += 1;
        }
        sent
    }

    /// Drops every queued message, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.items.len();
        self.items.clear();
        dropped
    }

    /// Number of queued messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates queued messages oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &QueuedMessage> {
        self.items.iter()
    }
}
