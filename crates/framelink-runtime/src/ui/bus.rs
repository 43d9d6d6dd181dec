use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

/// Bus subscriber callback.
pub type BusHandler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Host-wide directive bus: `(channel, command) -> subscribers`.
///
/// Delivery is synchronous on the sender's stack; there is no
/// acknowledgement and no queueing for late subscribers.
#[derive(Clone, Default)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    next: AtomicU64,
    topics: DashMap<String, Vec<(SubscriptionId, BusHandler)>>,
}

fn topic(channel: &str, command: &str) -> String {
    format!("{channel}/{command}")
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, channel: &str, command: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next.fetch_add(1, Ordering::Relaxed));
        self.inner
            .topics
            .entry(topic(channel, command))
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    pub fn unsubscribe(&self, channel: &str, command: &str, id: SubscriptionId) -> bool {
        let key = topic(channel, command);
        let Some(mut subs) = self.inner.topics.get_mut(&key) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|(s, _)| *s != id);
        let removed = subs.len() != before;
        drop(subs);
        self.inner.topics.remove_if(&key, |_, subs| subs.is_empty());
        removed
    }

    /// Deliver to every subscriber of `(channel, command)`. Returns how
    /// many were called.
    pub fn send(&self, channel: &str, command: &str, payload: Value) -> usize {
        // Snapshot first: a subscriber may (un)subscribe while being called.
        let subs: Vec<BusHandler> = self
            .inner
            .topics
            .get(&topic(channel, command))
            .map(|s| s.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        if subs.is_empty() {
            tracing::debug!(channel, command, "bus directive without subscribers");
        }
        for h in &subs {
            h(&payload);
        }
        subs.len()
    }
}
