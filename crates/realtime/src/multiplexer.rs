//! Topic table and dispatch.
//!
//! Maps each [`Topic`] to the callbacks interested in it. Dispatch clones
//! the callback list out of the table before invoking anything, so a
//! callback may subscribe or unsubscribe while it runs.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use serde_json::Value;
use tracing::{error, trace};

use blockfeed_protocol::{InboundMessage, Topic};

use crate::service::Shared;

/// Error a subscriber callback may return.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// A subscriber callback. Receives the decoded payload for its topic.
pub type Callback = Arc<dyn Fn(&Value) -> Result<(), CallbackError> + Send + Sync>;

/// Identifies one registration within the table.
pub(crate) type SubscriberId = u64;

/// A registration taken out of the table.
///
/// The callback is handed back so the caller can drop it after releasing
/// its locks: a callback may own a [`Subscription`] whose drop re-enters
/// the service.
pub(crate) struct Removed {
    pub(crate) callback: Callback,
    /// The topic lost its last subscriber and was dropped from the table.
    pub(crate) last: bool,
}

/// Topic -> callbacks. Topics never linger with zero callbacks.
#[derive(Default)]
pub(crate) struct TopicTable {
    next_id: SubscriberId,
    topics: BTreeMap<Topic, Vec<(SubscriberId, Callback)>>,
}

impl TopicTable {
    /// Registers a callback. Returns its id and whether it is the first
    /// subscriber of `topic`.
    pub(crate) fn insert(&mut self, topic: Topic, callback: Callback) -> (SubscriberId, bool) {
        self.next_id += 1;
        let id = self.next_id;
        let entry = self.topics.entry(topic).or_default();
        let first = entry.is_empty();
        entry.push((id, callback));
        (id, first)
    }

    pub(crate) fn remove(&mut self, topic: Topic, id: SubscriberId) -> Option<Removed> {
        let entry = self.topics.get_mut(&topic)?;
        let pos = entry.iter().position(|(sid, _)| *sid == id)?;
        let (_, callback) = entry.remove(pos);
        let last = entry.is_empty();
        if last {
            self.topics.remove(&topic);
        }
        Some(Removed { callback, last })
    }

    /// Empties the table, returning every callback for the caller to drop.
    pub(crate) fn drain(&mut self) -> Vec<Callback> {
        std::mem::take(&mut self.topics)
            .into_values()
            .flat_map(|entry| entry.into_iter().map(|(_, cb)| cb))
            .collect()
    }

    pub(crate) fn contains(&self, topic: Topic, id: SubscriberId) -> bool {
        self.topics
            .get(&topic)
            .is_some_and(|entry| entry.iter().any(|(sid, _)| *sid == id))
    }

    /// Topics with at least one subscriber, in stable order.
    pub(crate) fn topics(&self) -> Vec<Topic> {
        self.topics.keys().copied().collect()
    }

    pub(crate) fn subscriber_count(&self, topic: Topic) -> usize {
        self.topics.get(&topic).map_or(0, Vec::len)
    }

    pub(crate) fn callbacks(&self, topic: Topic) -> Vec<Callback> {
        self.topics
            .get(&topic)
            .map(|entry| entry.iter().map(|(_, cb)| cb.clone()).collect())
            .unwrap_or_default()
    }
}

/// What a single dispatch pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Topic events decoded from the frame.
    pub events: usize,
    /// Callback invocations that returned `Ok`.
    pub delivered: usize,
    /// Callback invocations that failed (error or panic).
    pub failed: usize,
}

/// A failed callback invocation.
pub(crate) struct CallbackFailure {
    pub(crate) topic: Topic,
    pub(crate) error: String,
}

/// Routes every topic event of `message` to its callbacks.
///
/// `lookup` returns the callbacks currently registered for a topic; it is
/// called without any lock held by this function. Each callback runs in
/// isolation: a returned error or a panic is reported through `on_failure`
/// and the remaining callbacks still run.
pub(crate) fn dispatch(
    message: InboundMessage,
    lookup: impl Fn(Topic) -> Vec<Callback>,
    mut on_failure: impl FnMut(CallbackFailure),
) -> DispatchSummary {
    let mut summary = DispatchSummary::default();
    for event in message.into_events() {
        summary.events += 1;
        let callbacks = lookup(event.topic);
        trace!(topic = %event.topic, subscribers = callbacks.len(), "dispatching");
        for cb in callbacks {
            match invoke(&cb, &event.payload) {
                Ok(()) => summary.delivered += 1,
                Err(reason) => {
                    summary.failed += 1;
                    error!(topic = %event.topic, error = %reason, "subscriber callback failed");
                    on_failure(CallbackFailure {
                        topic: event.topic,
                        error: reason,
                    });
                }
            }
        }
    }
    summary
}

fn invoke(cb: &Callback, payload: &Value) -> Result<(), String> {
    match catch_unwind(AssertUnwindSafe(|| cb(payload))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(panic) => Err(panic_message(panic.as_ref())),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Handle returned by [`RealtimeService::subscribe`](crate::RealtimeService::subscribe).
///
/// [`unsubscribe`](Subscription::unsubscribe) removes exactly this
/// registration; later calls do nothing. Dropping the handle unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    topic: Topic,
    id: SubscriberId,
    service: Weak<Shared>,
    active: AtomicBool,
}

impl Subscription {
    pub(crate) fn new(topic: Topic, id: SubscriberId, service: Weak<Shared>) -> Self {
        Self {
            topic,
            id,
            service,
            active: AtomicBool::new(true),
        }
    }

    /// Topic this handle is registered under.
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Returns `true` while the callback is still registered. Becomes
    /// `false` after `unsubscribe`, and also once the service drops it
    /// (`disconnect`, `reconnect`, `remove_all_subscriptions`) or goes away.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
            && self
                .service
                .upgrade()
                .is_some_and(|service| service.is_registered(self.topic, self.id))
    }

    /// Removes the callback. Safe to call any number of times.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(service) = self.service.upgrade() {
            service.unsubscribe(self.topic, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
