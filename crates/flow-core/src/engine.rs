//! The single-flow dispatch loop: one `Flow` per execution, strictly
//! sequential on its own task, honoring AND/OR join semantics and router
//! suppression.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex as SyncMutex;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::errors::{FlowCoreError, FlowCoreResult};
use crate::events::{LocalEventEmitter, LocalHandler};
use crate::method::{MethodBody, MethodDescriptor, MethodInput, MethodKind, MethodOutcome};
use crate::result::{MethodExecutionResult, MethodStatus};
use crate::state::{FlowState, FlowStateData};

/// Fan-out point shared by a `Flow` and its `StateHandle`s: both need to
/// emit lifecycle events (the flow on dispatch transitions, the handle on
/// `state_changed`), so both hold an `Arc` to the same emitter/bus pair
/// rather than the handle needing a back-reference to its owning `Flow`.
struct Notifier {
    emitter: LocalEventEmitter,
    bus: SyncMutex<Option<flow_events::EventBus>>,
}

impl Notifier {
    fn emit(&self, event_type: &str, payload: Value) {
        self.emitter.emit(event_type, &payload);
        if let Some(bus) = self.bus.lock().as_ref() {
            bus.publish(flow_events::Event::new(event_type, payload));
        }
    }
}

/// Shared, versioned access to a flow's state payload. Method bodies hold a
/// clone of this rather than a raw reference so they can be `'static` and
/// cross await points freely; only the currently-dispatching method is
/// expected to call `set`.
pub struct StateHandle<S> {
    inner: Arc<RwLock<FlowState<S>>>,
    notifier: Arc<Notifier>,
}

impl<S> Clone for StateHandle<S> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), notifier: self.notifier.clone() }
    }
}

impl<S: FlowStateData> StateHandle<S> {
    pub async fn get(&self) -> S {
        self.inner.read().await.data.clone()
    }

    /// Replaces the payload, bumps the version, and emits `state_changed`.
    pub async fn set(&self, data: S) {
        let (state_id, version) = {
            let mut guard = self.inner.write().await;
            guard.set(data);
            (guard.id, guard.version)
        };
        self.notifier.emit(flow_events::kind::STATE_CHANGED, json!({ "stateId": state_id, "version": version }));
    }

    pub async fn version(&self) -> u64 {
        self.inner.read().await.version
    }
}

/// A ready-queue entry: the method to dispatch next, and the input it was
/// enqueued with.
struct QueueEntry {
    method_name: String,
    input: MethodInput,
}

/// One flow execution: a frozen method table plus the bookkeeping needed to
/// dispatch it to completion.
pub struct Flow<S> {
    methods: HashMap<String, MethodDescriptor<S>>,
    on_error: Option<MethodBody<S>>,
    state: StateHandle<S>,
    notifier: Arc<Notifier>,
}

impl<S: FlowStateData> Flow<S> {
    pub(crate) fn new(methods: HashMap<String, MethodDescriptor<S>>, on_error: Option<MethodBody<S>>,
                       initial_state: FlowState<S>)
                       -> Self {
        let notifier = Arc::new(Notifier { emitter: LocalEventEmitter::new(), bus: SyncMutex::new(None) });
        Self { methods,
               on_error,
               state: StateHandle { inner: Arc::new(RwLock::new(initial_state)), notifier: notifier.clone() },
               notifier }
    }

    /// Attaches a shared event bus; lifecycle events (including
    /// `state_changed`, emitted by `StateHandle::set`) are published to it
    /// in addition to any local `on()` handlers.
    pub fn with_bus(self, bus: flow_events::EventBus) -> Self {
        *self.notifier.bus.lock() = Some(bus);
        self
    }

    /// Subscribes a local handler to one event name, or `"*"` for all.
    pub fn on(&self, event_name: impl Into<String>, handler: LocalHandler) {
        self.notifier.emitter.on(event_name, handler);
    }

    /// The flow's underlying state cell, for callers (e.g. the memory
    /// connector) that need to read the current payload outside of a
    /// dispatching method.
    pub fn state_cell(&self) -> Arc<RwLock<FlowState<S>>> {
        self.state.inner.clone()
    }

    fn emit(&self, event_type: &str, payload: Value) {
        self.notifier.emit(event_type, payload);
    }

    /// Runs the flow to completion. Returns the value of the method that
    /// produced the final result (the last completed method, or the value
    /// passed to `STOP`).
    pub async fn execute(&self, inputs: Value) -> FlowCoreResult<Value> {
        let state_id = self.state.inner.read().await.id;
        self.emit(flow_events::kind::FLOW_STARTED, json!({ "stateId": state_id }));

        let mut ready: VecDeque<QueueEntry> = VecDeque::new();
        let mut enqueued_this_execution: HashSet<String> = HashSet::new();

        for m in self.start_methods_in_declaration_order() {
            ready.push_back(QueueEntry { method_name: m.to_string(), input: MethodInput::Single(inputs.clone()) });
            enqueued_this_execution.insert(m.to_string());
        }

        let mut results: HashMap<String, MethodExecutionResult> = HashMap::new();
        let mut raw_values: HashMap<String, Value> = HashMap::new();
        let mut last_value: Option<Value> = None;
        let mut failed = false;

        while let Some(entry) = ready.pop_front() {
            let descriptor = self.methods
                                  .get(&entry.method_name)
                                  .expect("trigger validation guarantees method exists");

            if descriptor.kind == MethodKind::Router {
                if let Some(predicate) = &descriptor.predicate {
                    let input_value = entry.input.as_single().cloned().unwrap_or(Value::Null);
                    if !predicate(&input_value) {
                        // Suppressed at enqueue-time per the dispatch algorithm: the
                        // router never runs and its subtree is absent from the
                        // event stream entirely.
                        continue;
                    }
                }
            }

            self.emit(flow_events::kind::METHOD_EXECUTION_STARTED, json!({ "methodName": descriptor.name }));
            let start_time = Utc::now();

            let outcome = (*descriptor.body)(self.state.clone(), entry.input.clone()).await;
            let end_time = Utc::now();

            match outcome {
                Ok(MethodOutcome::Stop(value)) => {
                    self.record_success(&mut results, &mut raw_values, &descriptor.name, &value, start_time,
                                         end_time);
                    last_value = Some(value);
                    self.emit(flow_events::kind::METHOD_EXECUTION_FINISHED,
                              json!({ "methodName": descriptor.name, "result": last_value, "durationMs": (end_time - start_time).num_milliseconds() }));
                    break;
                }
                Ok(MethodOutcome::Value(value)) => {
                    self.record_success(&mut results, &mut raw_values, &descriptor.name, &value, start_time,
                                         end_time);
                    last_value = Some(value.clone());
                    self.emit(flow_events::kind::METHOD_EXECUTION_FINISHED,
                              json!({ "methodName": descriptor.name, "result": value, "durationMs": (end_time - start_time).num_milliseconds() }));

                    self.enqueue_listeners(&descriptor.name, &value, &raw_values, &mut ready,
                                            &mut enqueued_this_execution);
                }
                Err(err) => {
                    let message = err.to_string();
                    results.insert(descriptor.name.clone(),
                                    MethodExecutionResult { method_name: descriptor.name.clone(),
                                                             status: MethodStatus::Failed,
                                                             value: None,
                                                             error: Some(message.clone()),
                                                             start_time,
                                                             end_time,
                                                             attempts: 1 });
                    self.emit(flow_events::kind::METHOD_EXECUTION_FAILED,
                              json!({ "methodName": descriptor.name, "error": message }));

                    if let Some(on_error) = &self.on_error {
                        let payload = MethodInput::Single(json!({ "methodName": descriptor.name, "error": message }));
                        match (**on_error)(self.state.clone(), payload).await {
                            Ok(MethodOutcome::Stop(value)) => {
                                last_value = Some(value);
                                break;
                            }
                            Ok(MethodOutcome::Value(value)) => {
                                last_value = Some(value);
                            }
                            Err(_) => {
                                failed = true;
                                break;
                            }
                        }
                    } else {
                        failed = true;
                        break;
                    }
                }
            }
        }

        self.emit(flow_events::kind::FLOW_FINISHED, json!({ "stateId": state_id }));

        if failed {
            return Err(FlowCoreError::Internal("flow terminated on unrecovered method failure".to_string()));
        }

        last_value.ok_or(FlowCoreError::NoStartMethods)
    }

    fn record_success(&self, results: &mut HashMap<String, MethodExecutionResult>,
                       raw_values: &mut HashMap<String, Value>, name: &str, value: &Value,
                       start_time: chrono::DateTime<Utc>, end_time: chrono::DateTime<Utc>) {
        raw_values.insert(name.to_string(), value.clone());
        results.insert(name.to_string(),
                        MethodExecutionResult { method_name: name.to_string(),
                                                 status: MethodStatus::Completed,
                                                 value: Some(value.clone()),
                                                 error: None,
                                                 start_time,
                                                 end_time,
                                                 attempts: 1 });
    }

    fn start_methods_in_declaration_order(&self) -> Vec<&str> {
        // HashMap iteration order is not declaration order, so sort by the
        // index `FlowBuilder` stamped on each descriptor at registration
        // time instead of falling back to method name.
        let mut methods: Vec<&MethodDescriptor<S>> =
            self.methods.values().filter(|m| m.kind == MethodKind::Start).collect();
        methods.sort_unstable_by_key(|m| m.declaration_order);
        methods.into_iter().map(|m| m.name.as_str()).collect()
    }

    fn enqueue_listeners(&self, producer: &str, producer_value: &Value, raw_values: &HashMap<String, Value>,
                          ready: &mut VecDeque<QueueEntry>, enqueued_this_execution: &mut HashSet<String>) {
        let mut listeners: Vec<&MethodDescriptor<S>> =
            self.methods.values().filter(|m| m.kind != MethodKind::Start).collect();
        listeners.sort_unstable_by_key(|m| m.declaration_order);
        let listener_names: Vec<&str> = listeners.into_iter().map(|m| m.name.as_str()).collect();

        for name in listener_names {
            let descriptor = &self.methods[name];
            let trigger = match &descriptor.trigger {
                Some(t) => t,
                None => continue,
            };

            match trigger {
                crate::method::TriggerSpec::Simple(upstream) if upstream == producer => {
                    if enqueued_this_execution.insert(name.to_string()) {
                        ready.push_back(QueueEntry { method_name: name.to_string(),
                                                      input: MethodInput::Single(producer_value.clone()) });
                    }
                }
                crate::method::TriggerSpec::And(names) if names.iter().any(|n| n == producer) => {
                    if enqueued_this_execution.contains(name) {
                        continue;
                    }
                    let all_ready = names.iter().all(|n| raw_values.contains_key(n));
                    if all_ready {
                        let mut map = HashMap::new();
                        for n in names {
                            map.insert(n.clone(), raw_values[n].clone());
                        }
                        enqueued_this_execution.insert(name.to_string());
                        ready.push_back(QueueEntry { method_name: name.to_string(), input: MethodInput::Many(map) });
                    }
                }
                crate::method::TriggerSpec::Or(names) if names.iter().any(|n| n == producer) => {
                    if enqueued_this_execution.insert(name.to_string()) {
                        ready.push_back(QueueEntry { method_name: name.to_string(),
                                                      input: MethodInput::Single(producer_value.clone()) });
                    }
                }
                _ => {}
            }
        }
    }
}
