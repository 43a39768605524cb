//! Method descriptors: the declarative metadata the runtime dispatches
//! from, built by `FlowBuilder` instead of discovered via reflection.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::errors::FlowCoreError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a listener is waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerSpec {
    /// Fires once the named upstream method has produced a result.
    Simple(String),
    /// Fires once every named upstream method has produced a result in the
    /// current execution (one-shot; does not re-fire on later results).
    And(Vec<String>),
    /// Fires on the first of the named upstream methods to produce a
    /// result (one-shot).
    Or(Vec<String>),
}

impl TriggerSpec {
    /// The upstream method names this trigger depends on.
    pub fn upstreams(&self) -> &[String] {
        match self {
            TriggerSpec::Simple(name) => std::slice::from_ref(name),
            TriggerSpec::And(names) | TriggerSpec::Or(names) => names,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Start,
    Listener,
    Router,
}

/// The data a dispatched method receives: nothing (start methods), the
/// single upstream result (simple/OR triggers, or a router's input), or the
/// full map of upstream results (AND joins).
#[derive(Debug, Clone)]
pub enum MethodInput {
    None,
    Single(Value),
    Many(HashMap<String, Value>),
}

impl MethodInput {
    /// Convenience accessor for the common single-input case; `Many`
    /// returns `None` since there is no one value to hand back.
    pub fn as_single(&self) -> Option<&Value> {
        match self {
            MethodInput::Single(v) => Some(v),
            _ => None,
        }
    }
}

/// What a method body returned.
#[derive(Debug, Clone)]
pub enum MethodOutcome {
    /// A normal result, to be recorded and used to satisfy downstream
    /// triggers.
    Value(Value),
    /// The sentinel that ends the flow immediately, successfully, carrying
    /// this as the final result.
    Stop(Value),
}

pub type RouterPredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

pub type MethodBody<S> =
    Arc<dyn Fn(crate::engine::StateHandle<S>, MethodInput) -> BoxFuture<'static, Result<MethodOutcome, FlowCoreError>>
        + Send
        + Sync>;

/// Declarative description of one method in a flow's method table.
pub struct MethodDescriptor<S> {
    pub name: String,
    pub kind: MethodKind,
    pub trigger: Option<TriggerSpec>,
    pub predicate: Option<RouterPredicate>,
    pub body: MethodBody<S>,
    /// Registration order on the `FlowBuilder`, lost once methods land in a
    /// `HashMap`. Dispatch sorts on this instead of method name so that two
    /// methods ready in the same step run in declaration order.
    pub declaration_order: usize,
}

impl<S> std::fmt::Debug for MethodDescriptor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDescriptor")
         .field("name", &self.name)
         .field("kind", &self.kind)
         .field("trigger", &self.trigger)
         .finish()
    }
}
