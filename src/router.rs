//! Publish/subscribe routing for thread lifecycle events.
//!
//! Threads never call back into the controller. They return events as
//! values; the controller publishes them here and pops deliveries off the
//! queue in order. Listeners are keyed by the event source (a thread id) and
//! a set of topics, so the controller can tear down one thread's listeners
//! without touching anyone else's.
//!
//! A delivery whose listener was unsubscribed after the event was published
//! is skipped when popped, so an unsubscribe takes effect immediately even
//! for events already in flight.

#[cfg(test)]
#[path = "router_test.rs"]
mod router_test;

use std::collections::VecDeque;
use std::fmt::Debug;
use std::hash::Hash;

use tracing::trace;

/// An event the router can file by source and topic.
pub trait Routable: Clone {
    type Source: Copy + Eq + Hash + Debug;
    type Topic: Copy + Eq + Debug;

    fn source(&self) -> Self::Source;
    fn topic(&self) -> Self::Topic;
}

/// Handle returned by [`EventRouter::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// One queued event addressed to one listener.
#[derive(Debug, Clone)]
pub struct Delivery<E> {
    pub listener: ListenerId,
    pub event: E,
}

#[derive(Debug)]
struct Listener<S, T> {
    id: ListenerId,
    source: S,
    topics: Vec<T>,
}

/// FIFO event router with per-source subscriptions.
#[derive(Debug)]
pub struct EventRouter<E: Routable> {
    next_id: u64,
    listeners: Vec<Listener<E::Source, E::Topic>>,
    queue: VecDeque<Delivery<E>>,
}

impl<E: Routable> EventRouter<E> {
    #[must_use]
    pub fn new() -> Self {
        Self { next_id: 1, listeners: Vec::new(), queue: VecDeque::new() }
    }

    // --- Subscriptions ---

    /// Listen for `topics` emitted by `source`.
    pub fn subscribe(&mut self, source: E::Source, topics: &[E::Topic]) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push(Listener { id, source, topics: topics.to_vec() });
        id
    }

    /// Drop one listener. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }

    /// Drop every listener attached to `source`. Returns how many were removed.
    pub fn unsubscribe_source(&mut self, source: E::Source) -> usize {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.source != source);
        before - self.listeners.len()
    }

    /// Drop every listener and every queued delivery.
    pub fn clear(&mut self) {
        self.listeners.clear();
        self.queue.clear();
    }

    // --- Publishing ---

    /// Queue `event` for every listener subscribed to its source and topic.
    ///
    /// Returns the number of deliveries queued; events nobody listens to are
    /// dropped.
    pub fn publish(&mut self, event: E) -> usize {
        let source = event.source();
        let topic = event.topic();
        let mut queued = 0;
        for listener in &self.listeners {
            if listener.source == source && listener.topics.contains(&topic) {
                self.queue.push_back(Delivery { listener: listener.id, event: event.clone() });
                queued += 1;
            }
        }
        if queued == 0 {
            trace!(?source, ?topic, "event dropped: no listener");
        }
        queued
    }

    /// Publish every event in order.
    pub fn publish_all(&mut self, events: impl IntoIterator<Item = E>) -> usize {
        events.into_iter().map(|e| self.publish(e)).sum()
    }

    /// Pop the next delivery whose listener is still subscribed.
    pub fn next_delivery(&mut self) -> Option<Delivery<E>> {
        while let Some(delivery) = self.queue.pop_front() {
            if self.is_live(delivery.listener) {
                return Some(delivery);
            }
        }
        None
    }

    // --- Queries ---

    #[must_use]
    pub fn is_live(&self, id: ListenerId) -> bool {
        self.listeners.iter().any(|l| l.id == id)
    }

    /// Whether any listener would receive `topic` from `source`.
    #[must_use]
    pub fn is_subscribed(&self, source: E::Source, topic: E::Topic) -> bool {
        self.listeners
            .iter()
            .any(|l| l.source == source && l.topics.contains(&topic))
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Number of queued deliveries, including any addressed to listeners
    /// that have since been removed.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl<E: Routable> Default for EventRouter<E> {
    fn default() -> Self {
        Self::new()
    }
}
