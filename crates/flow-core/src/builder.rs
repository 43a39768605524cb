//! Two-phase flow builder.
//!
//! Generalizes the fixed step-by-step `EngineBuilder` pattern into a named
//! trigger graph: callers register a start method, any number of listeners
//! (simple/AND/OR triggers) and routers, then `build()` freezes the
//! registrations into a validated `MethodTable` and produces a `Flow`.
//! Validation (dangling triggers, cycles, at least one start method) runs
//! once here, not on every dispatch.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::engine::{Flow, StateHandle};
use crate::errors::{FlowCoreError, FlowCoreResult};
use crate::method::{MethodBody, MethodDescriptor, MethodInput, MethodKind, MethodOutcome, RouterPredicate,
                     TriggerSpec};
use crate::state::{FlowState, FlowStateData};
use crate::trigger;

fn wrap_body<S, F, Fut>(f: F) -> MethodBody<S>
    where S: Send + Sync + 'static,
          F: Fn(StateHandle<S>, MethodInput) -> Fut + Send + Sync + 'static,
          Fut: Future<Output = Result<MethodOutcome, FlowCoreError>> + Send + 'static
{
    Arc::new(move |state, input| Box::pin(f(state, input)))
}

/// Accumulates method registrations for one flow definition.
pub struct FlowBuilder<S> {
    methods: HashMap<String, MethodDescriptor<S>>,
    on_error: Option<MethodBody<S>>,
    next_order: usize,
}

impl<S: FlowStateData> Default for FlowBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: FlowStateData> FlowBuilder<S> {
    pub fn new() -> Self {
        Self { methods: HashMap::new(), on_error: None, next_order: 0 }
    }

    fn next_order(&mut self) -> usize {
        let order = self.next_order;
        self.next_order += 1;
        order
    }

    /// Registers the flow's single wildcard error listener. It receives
    /// `MethodInput::Single({methodName, error})`; if its body returns a
    /// non-`Stop` outcome, execution continues, otherwise the flow ends.
    pub fn on_error<F, Fut>(mut self, body: F) -> Self
        where F: Fn(StateHandle<S>, MethodInput) -> Fut + Send + Sync + 'static,
              Fut: Future<Output = Result<MethodOutcome, FlowCoreError>> + Send + 'static
    {
        self.on_error = Some(wrap_body(body));
        self
    }

    /// Registers a start method: one with no upstream trigger, eligible to
    /// run as soon as the flow is dispatched.
    pub fn start<F, Fut>(mut self, name: impl Into<String>, body: F) -> FlowCoreResult<Self>
        where F: Fn(StateHandle<S>, MethodInput) -> Fut + Send + Sync + 'static,
              Fut: Future<Output = Result<MethodOutcome, FlowCoreError>> + Send + 'static
    {
        let name = name.into();
        if self.methods.contains_key(&name) {
            return Err(FlowCoreError::DuplicateMethod(name));
        }
        let declaration_order = self.next_order();
        self.methods.insert(name.clone(),
                             MethodDescriptor { name,
                                                 kind: MethodKind::Start,
                                                 trigger: None,
                                                 predicate: None,
                                                 body: wrap_body(body),
                                                 declaration_order });
        Ok(self)
    }

    /// Registers a listener eligible to run once its trigger condition is
    /// satisfied (a single upstream method, or an AND/OR join over several).
    pub fn listen<F, Fut>(mut self, name: impl Into<String>, trigger: TriggerSpec, body: F)
                           -> FlowCoreResult<Self>
        where F: Fn(StateHandle<S>, MethodInput) -> Fut + Send + Sync + 'static,
              Fut: Future<Output = Result<MethodOutcome, FlowCoreError>> + Send + 'static
    {
        let name = name.into();
        if self.methods.contains_key(&name) {
            return Err(FlowCoreError::DuplicateMethod(name));
        }
        let declaration_order = self.next_order();
        self.methods.insert(name.clone(),
                             MethodDescriptor { name,
                                                 kind: MethodKind::Listener,
                                                 trigger: Some(trigger),
                                                 predicate: None,
                                                 body: wrap_body(body),
                                                 declaration_order });
        Ok(self)
    }

    /// Registers a router: a listener whose predicate, evaluated on the
    /// incoming upstream result, either allows dispatch of `body` or
    /// suppresses the router's entire downstream subtree.
    pub fn router<F, Fut>(mut self, name: impl Into<String>, upstream: impl Into<String>,
                           predicate: impl Fn(&Value) -> bool + Send + Sync + 'static, body: F)
                           -> FlowCoreResult<Self>
        where F: Fn(StateHandle<S>, MethodInput) -> Fut + Send + Sync + 'static,
              Fut: Future<Output = Result<MethodOutcome, FlowCoreError>> + Send + 'static
    {
        let name = name.into();
        if self.methods.contains_key(&name) {
            return Err(FlowCoreError::DuplicateMethod(name));
        }
        let predicate: RouterPredicate = Arc::new(predicate);
        let declaration_order = self.next_order();
        self.methods.insert(name.clone(),
                             MethodDescriptor { name,
                                                 kind: MethodKind::Router,
                                                 trigger: Some(TriggerSpec::Simple(upstream.into())),
                                                 predicate: Some(predicate),
                                                 body: wrap_body(body),
                                                 declaration_order });
        Ok(self)
    }

    /// Validates the trigger graph and freezes the method table into a
    /// `Flow` ready to execute against `initial_state`.
    pub fn build(self, initial_state: S) -> FlowCoreResult<Flow<S>> {
        trigger::validate(&self.methods)?;
        Ok(Flow::new(self.methods, self.on_error, FlowState::new(initial_state)))
    }
}
