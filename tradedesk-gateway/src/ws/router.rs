//! Subscription registry and inbound message fan-out.
//!
//! Consumers register a handler for a channel, optionally narrowed by a
//! filter. Every decoded inbound message is offered to each subscription in
//! registration order; a handler matches when its channel equals the
//! message's [`route_key`](Message::route_key) or is the wildcard channel.
//!
//! # Reentrancy
//!
//! Dispatch works on a snapshot of the registry taken before any handler
//! runs, so handlers may subscribe or unsubscribe freely. Changes take
//! effect from the next message.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, trace};

use super::message::Message;

/// Identifier returned by [`MessageRouter::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Raw numeric value.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Callback invoked with each matching message.
pub type MessageHandler = Arc<dyn Fn(&Message) + Send + Sync>;

/// Predicate that further narrows a subscription.
pub type MessageFilter = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

#[derive(Clone)]
struct Subscription {
    channel: String,
    handler: MessageHandler,
    filter: Option<MessageFilter>,
}

impl Subscription {
    fn matches(&self, message: &Message, wildcard: &str) -> bool {
        let channel_matches = self.channel == wildcard || self.channel == message.route_key();
        channel_matches && self.filter.as_ref().is_none_or(|accept| accept(message))
    }
}

/// Routes inbound messages to subscribed handlers.
pub struct MessageRouter {
    wildcard: String,
    // Ids are monotonic, so key order is registration order.
    subscriptions: RwLock<BTreeMap<SubscriptionId, Subscription>>,
    next_id: AtomicU64,
}

impl MessageRouter {
    /// Creates a router whose wildcard channel is `wildcard`.
    #[must_use]
    pub fn new(wildcard: impl Into<String>) -> Self {
        Self {
            wildcard: wildcard.into(),
            subscriptions: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers `handler` for every message on `channel`.
    pub fn subscribe<F>(&self, channel: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.insert(channel.into(), Arc::new(handler), None)
    }

    /// Registers `handler` for messages on `channel` that also pass `filter`.
    pub fn subscribe_with_filter<F, P>(
        &self,
        channel: impl Into<String>,
        handler: F,
        filter: P,
    ) -> SubscriptionId
    where
        F: Fn(&Message) + Send + Sync + 'static,
        P: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.insert(channel.into(), Arc::new(handler), Some(Arc::new(filter)))
    }

    fn insert(
        &self,
        channel: String,
        handler: MessageHandler,
        filter: Option<MessageFilter>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(subscription_id = %id, channel = %channel, filtered = filter.is_some(), "Subscription added");
        self.subscriptions.write().insert(
            id,
            Subscription {
                channel,
                handler,
                filter,
            },
        );
        id
    }

    /// Removes a subscription. Returns false if `id` was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscriptions.write().remove(&id).is_some();
        if removed {
            debug!(subscription_id = %id, "Subscription removed");
        }
        removed
    }

    /// Offers `message` to every matching subscription in registration order.
    ///
    /// A panicking handler is logged and skipped. Returns the number of
    /// handlers that ran to completion.
    pub fn dispatch(&self, message: &Message) -> usize {
        let snapshot: Vec<(SubscriptionId, Subscription)> = self
            .subscriptions
            .read()
            .iter()
            .map(|(id, sub)| (*id, sub.clone()))
            .collect();

        let mut delivered = 0;
        for (id, subscription) in snapshot {
            if !subscription.matches(message, &self.wildcard) {
                continue;
            }
            let handler = &subscription.handler;
            match catch_unwind(AssertUnwindSafe(|| handler(message))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    error!(
                        subscription_id = %id,
                        channel = %subscription.channel,
                        kind = %message.kind,
                        panic = %panic_message(panic.as_ref()),
                        "Subscription handler panicked"
                    );
                }
            }
        }

        if delivered == 0 {
            trace!(route = %message.route_key(), "No subscribers for message");
        }
        delivered
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Removes every subscription.
    pub fn clear(&self) {
        self.subscriptions.write().clear();
    }

    /// The wildcard channel.
    #[must_use]
    pub fn wildcard(&self) -> &str {
        &self.wildcard
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new("*")
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("wildcard", &self.wildcard)
            .field("subscriptions", &self.subscription_count())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
