//! Priority-ordered, single-process event bus.
//!
//! Three FIFO lanes (HIGH, NORMAL, LOW) feed a single dispatcher task that
//! drains HIGH fully before NORMAL, and NORMAL fully before LOW. `publish`
//! is synchronous and cheap (lock, push, notify); dispatch happens on the
//! bus's own task so publishers never block on subscriber handlers.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::types::{Event, EventPriority};

pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscription {
    id: Uuid,
    once: bool,
    handler: Handler,
}

struct Lanes {
    high: Mutex<VecDeque<Event>>,
    normal: Mutex<VecDeque<Event>>,
    low: Mutex<VecDeque<Event>>,
}

impl Lanes {
    fn new() -> Self {
        Self { high: Mutex::new(VecDeque::new()),
               normal: Mutex::new(VecDeque::new()),
               low: Mutex::new(VecDeque::new()) }
    }

    fn push(&self, event: Event) {
        let lane = match event.priority {
            EventPriority::High => &self.high,
            EventPriority::Normal => &self.normal,
            EventPriority::Low => &self.low,
        };
        lane.lock().push_back(event);
    }

    /// Pops the next event honoring HIGH > NORMAL > LOW draining order.
    fn pop(&self) -> Option<Event> {
        if let Some(ev) = self.high.lock().pop_front() {
            return Some(ev);
        }
        if let Some(ev) = self.normal.lock().pop_front() {
            return Some(ev);
        }
        self.low.lock().pop_front()
    }
}

struct Inner {
    lanes: Lanes,
    subscribers: DashMap<String, Vec<Subscription>>,
    wildcard: Mutex<Vec<Subscription>>,
    notify: Notify,
}

/// A handle to the bus. Cheap to clone; all clones share the same lanes and
/// subscriber registry.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    /// Creates a bus and spawns its dispatcher task on the current tokio
    /// runtime. The returned `JoinHandle` runs forever; drop the `EventBus`
    /// (all clones) to let the dispatcher idle-exit is not implemented —
    /// callers abort the handle on shutdown, the same fire-and-forget
    /// convention `chem-core`'s own spawned tasks use.
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let inner = Arc::new(Inner { lanes: Lanes::new(),
                                     subscribers: DashMap::new(),
                                     wildcard: Mutex::new(Vec::new()),
                                     notify: Notify::new() });
        let bus = Self { inner: inner.clone() };
        let handle = tokio::spawn(Self::dispatch_loop(inner));
        (bus, handle)
    }

    async fn dispatch_loop(inner: Arc<Inner>) {
        loop {
            inner.notify.notified().await;
            while let Some(event) = inner.lanes.pop() {
                Self::dispatch_one(&inner, &event);
            }
        }
    }

    fn dispatch_one(inner: &Inner, event: &Event) {
        if let Some(mut subs) = inner.subscribers.get_mut(&event.event_type) {
            subs.retain(|s| {
                    (s.handler)(event);
                    !s.once
                });
        }
        let mut wildcard = inner.wildcard.lock();
        wildcard.retain(|s| {
                    (s.handler)(event);
                    !s.once
                });
    }

    /// Publishes an event. Returns immediately; dispatch is asynchronous.
    pub fn publish(&self, event: Event) {
        self.inner.lanes.push(event);
        self.inner.notify.notify_one();
    }

    /// Subscribes a persistent handler to a specific event type.
    pub fn on(&self, event_type: impl Into<String>, handler: Handler) -> Uuid {
        self.subscribe(event_type, handler, false)
    }

    /// Subscribes a handler that fires at most once, then unregisters.
    pub fn once(&self, event_type: impl Into<String>, handler: Handler) -> Uuid {
        self.subscribe(event_type, handler, true)
    }

    fn subscribe(&self, event_type: impl Into<String>, handler: Handler, once: bool) -> Uuid {
        let id = Uuid::new_v4();
        let event_type = event_type.into();
        let sub = Subscription { id, once, handler };
        if event_type == crate::types::kind::WILDCARD {
            self.inner.wildcard.lock().push(sub);
        } else {
            self.inner.subscribers.entry(event_type).or_default().push(sub);
        }
        id
    }

    /// Removes a subscription by id, searching both the typed and wildcard
    /// registries.
    pub fn unsubscribe(&self, id: Uuid) {
        for mut entry in self.inner.subscribers.iter_mut() {
            entry.value_mut().retain(|s| s.id != id);
        }
        self.inner.wildcard.lock().retain(|s| s.id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::kind;
    use parking_lot::Mutex as PMutex;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn dispatches_in_priority_order() {
        let (bus, _handle) = EventBus::spawn();
        let order: Arc<PMutex<Vec<&'static str>>> = Arc::new(PMutex::new(Vec::new()));

        let o1 = order.clone();
        bus.on("evt",
               Arc::new(move |e: &Event| {
                   let label: &'static str = match e.priority {
                       EventPriority::High => "high",
                       EventPriority::Normal => "normal",
                       EventPriority::Low => "low",
                   };
                   o1.lock().push(label);
               }));

        bus.publish(Event::new("evt", json!({})).with_priority(EventPriority::Low));
        bus.publish(Event::new("evt", json!({})).with_priority(EventPriority::High));
        bus.publish(Event::new("evt", json!({})).with_priority(EventPriority::Normal));

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(*order.lock(), vec!["high", "normal", "low"]);
    }

    #[tokio::test]
    async fn once_subscription_fires_single_time() {
        let (bus, _handle) = EventBus::spawn();
        let count = Arc::new(PMutex::new(0usize));
        let c = count.clone();
        bus.once(kind::FLOW_STARTED, Arc::new(move |_| *c.lock() += 1));

        bus.publish(Event::new(kind::FLOW_STARTED, json!({})));
        bus.publish(Event::new(kind::FLOW_STARTED, json!({})));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(*count.lock(), 1);
    }

    #[tokio::test]
    async fn wildcard_subscriber_sees_every_type() {
        let (bus, _handle) = EventBus::spawn();
        let seen = Arc::new(PMutex::new(Vec::new()));
        let s = seen.clone();
        bus.on(kind::WILDCARD,
               Arc::new(move |e: &Event| s.lock().push(e.event_type.clone())));

        bus.publish(Event::new(kind::FLOW_STARTED, json!({})));
        bus.publish(Event::new(kind::FLOW_FINISHED, json!({})));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(*seen.lock(), vec![kind::FLOW_STARTED, kind::FLOW_FINISHED]);
    }
}
