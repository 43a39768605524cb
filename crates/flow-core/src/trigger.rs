//! Trigger graph validation.
//!
//! Nodes are method names; edges run from a trigger's upstream names to the
//! method that declares the trigger. Validated at build time, not at
//! dispatch time, so a malformed flow never starts executing.

use std::collections::{HashMap, HashSet};

use crate::errors::FlowCoreError;
use crate::method::{MethodDescriptor, MethodKind};

/// Checks every listener/router trigger names a registered method, and that
/// the graph has no cycle reachable from a start method back to itself.
pub fn validate<S>(methods: &HashMap<String, MethodDescriptor<S>>) -> Result<(), FlowCoreError> {
    let has_start = methods.values().any(|m| m.kind == MethodKind::Start);
    if !has_start {
        return Err(FlowCoreError::NoStartMethods);
    }

    for method in methods.values() {
        if let Some(trigger) = &method.trigger {
            for upstream in trigger.upstreams() {
                if !methods.contains_key(upstream) {
                    return Err(FlowCoreError::UnknownTriggerReference(upstream.clone()));
                }
            }
        }
    }

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for method in methods.values() {
        if let Some(trigger) = &method.trigger {
            for upstream in trigger.upstreams() {
                adjacency.entry(upstream.as_str()).or_default().push(method.name.as_str());
            }
        }
    }

    let mut visited: HashSet<&str> = HashSet::new();
    for name in methods.keys() {
        if !visited.contains(name.as_str()) {
            let mut stack: HashSet<&str> = HashSet::new();
            detect_cycle(name, &adjacency, &mut visited, &mut stack)?;
        }
    }

    Ok(())
}

fn detect_cycle<'a>(node: &'a str, adjacency: &HashMap<&'a str, Vec<&'a str>>,
                     visited: &mut HashSet<&'a str>, stack: &mut HashSet<&'a str>)
                     -> Result<(), FlowCoreError> {
    visited.insert(node);
    stack.insert(node);

    if let Some(neighbors) = adjacency.get(node) {
        for &next in neighbors {
            if stack.contains(next) {
                return Err(FlowCoreError::TriggerGraphCycle(next.to_string()));
            }
            if !visited.contains(next) {
                detect_cycle(next, adjacency, visited, stack)?;
            }
        }
    }

    stack.remove(node);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::{MethodInput, MethodOutcome, TriggerSpec};
    use std::sync::Arc;

    fn stub_body<S: Send + Sync + 'static>()
     -> crate::method::MethodBody<S> {
        Arc::new(|_state, _input: MethodInput| {
            Box::pin(async move { Ok(MethodOutcome::Value(serde_json::json!(null))) })
        })
    }

    fn start<S: Send + Sync + 'static>(name: &str) -> MethodDescriptor<S> {
        MethodDescriptor { name: name.to_string(),
                            kind: MethodKind::Start,
                            trigger: None,
                            predicate: None,
                            body: stub_body(),
                            declaration_order: 0 }
    }

    fn listener<S: Send + Sync + 'static>(name: &str, trigger: TriggerSpec) -> MethodDescriptor<S> {
        MethodDescriptor { name: name.to_string(),
                            kind: MethodKind::Listener,
                            trigger: Some(trigger),
                            predicate: None,
                            body: stub_body(),
                            declaration_order: 0 }
    }

    #[test]
    fn rejects_dangling_trigger_reference() {
        let mut methods: HashMap<String, MethodDescriptor<()>> = HashMap::new();
        methods.insert("a".into(), start("a"));
        methods.insert("b".into(), listener("b", TriggerSpec::Simple("ghost".into())));

        let err = validate(&methods).unwrap_err();
        assert_eq!(err, FlowCoreError::UnknownTriggerReference("ghost".into()));
    }

    #[test]
    fn rejects_cycle() {
        let mut methods: HashMap<String, MethodDescriptor<()>> = HashMap::new();
        methods.insert("s".into(), start("s"));
        methods.insert("a".into(), listener("a", TriggerSpec::Simple("b".into())));
        methods.insert("b".into(), listener("b", TriggerSpec::Simple("a".into())));

        assert!(matches!(validate(&methods), Err(FlowCoreError::TriggerGraphCycle(_))));
    }

    #[test]
    fn accepts_linear_graph() {
        let mut methods: HashMap<String, MethodDescriptor<()>> = HashMap::new();
        methods.insert("a".into(), start("a"));
        methods.insert("b".into(), listener("b", TriggerSpec::Simple("a".into())));
        methods.insert("c".into(), listener("c", TriggerSpec::Simple("b".into())));

        assert!(validate(&methods).is_ok());
    }
}
