//! Local lifecycle event subscription.
//!
//! `Flow::on` is the cheapest way to observe one flow's lifecycle events
//! without wiring up a shared `flow_events::EventBus`. When a flow is also
//! handed a bus (see `Flow::with_bus`), every event is published to both:
//! local handlers run synchronously in dispatch order, the bus fans out
//! asynchronously to whoever else is listening (e.g. the memory connector).

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

pub type LocalHandler = Arc<dyn Fn(&Value) + Send + Sync>;

struct Subscription {
    event_name: String,
    handler: LocalHandler,
}

/// A flow-local registry of lifecycle event subscribers, keyed by event
/// name or the wildcard `"*"`.
#[derive(Default)]
pub struct LocalEventEmitter {
    subscriptions: Mutex<Vec<Subscription>>,
}

impl LocalEventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, event_name: impl Into<String>, handler: LocalHandler) {
        self.subscriptions.lock().push(Subscription { event_name: event_name.into(), handler });
    }

    /// Invokes every handler registered for `event_name`, plus every
    /// wildcard handler, in registration order.
    pub fn emit(&self, event_name: &str, payload: &Value) {
        for sub in self.subscriptions.lock().iter() {
            if sub.event_name == event_name || sub.event_name == "*" {
                (sub.handler)(payload);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PMutex;
    use serde_json::json;

    #[test]
    fn wildcard_and_named_handlers_both_fire() {
        let emitter = LocalEventEmitter::new();
        let seen = Arc::new(PMutex::new(Vec::new()));

        let s1 = seen.clone();
        emitter.on("flow_started", Arc::new(move |_| s1.lock().push("named")));
        let s2 = seen.clone();
        emitter.on("*", Arc::new(move |_| s2.lock().push("wildcard")));

        emitter.emit("flow_started", &json!({}));

        assert_eq!(*seen.lock(), vec!["named", "wildcard"]);
    }
}
