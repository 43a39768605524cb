//! Dependency graph storage: node registry, edge table, cycle detection,
//! and readiness/cascade computation. The scheduler's run loop owns one
//! `FlowGraph` exclusively (no internal locking) and mutates it only from
//! that loop, mirroring `chem-core::engine::core::FlowEngine`'s
//! single-owner state model.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::errors::{SchedulerError, SchedulerResult};
use crate::node::{FlowEdge, FlowNode, NodeStatus};
use crate::schedulable::SchedulableFlow;

#[derive(Default)]
pub struct FlowGraph {
    nodes: HashMap<Uuid, FlowNode>,
    edges: HashMap<(Uuid, Uuid), FlowEdge>,
    forward: HashMap<Uuid, Vec<Uuid>>,
    order_counter: usize,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: Option<Uuid>, flow: Arc<dyn SchedulableFlow>, depends_on: Vec<Uuid>,
                     priority: i64, metadata: HashMap<String, Value>)
                     -> SchedulerResult<Uuid> {
        let id = id.unwrap_or_else(Uuid::new_v4);
        if self.nodes.contains_key(&id) {
            return Err(SchedulerError::DuplicateFlowId(id));
        }

        // Cycle-check only against dependencies that are already registered;
        // a reference to a not-yet-registered flow is validated later, at
        // `execute()`'s graph-validation pass (registerFlow's contract defers
        // that check).
        for &dep in &depends_on {
            if self.nodes.contains_key(&dep) && self.creates_cycle(dep, id) {
                return Err(SchedulerError::Cycle { from: dep, to: id });
            }
        }

        for &dep in &depends_on {
            self.forward.entry(dep).or_default().push(id);
            self.edges.insert((dep, id), FlowEdge { from: dep, to: id, condition: None, data_mapping: None });
        }

        let order = self.order_counter;
        self.order_counter += 1;
        self.nodes.insert(id, FlowNode::new(id, flow, depends_on, priority, metadata, order));
        Ok(id)
    }

    pub fn add_dependency(&mut self, from: Uuid, to: Uuid, condition: Option<Arc<dyn Fn(&Value) -> bool + Send + Sync>>,
                           data_mapping: Option<Arc<dyn Fn(&Value) -> Value + Send + Sync>>)
                           -> SchedulerResult<()> {
        if !self.nodes.contains_key(&from) {
            return Err(SchedulerError::UnknownDependency(from));
        }
        if !self.nodes.contains_key(&to) {
            return Err(SchedulerError::UnknownDependency(to));
        }
        if self.creates_cycle(from, to) {
            return Err(SchedulerError::Cycle { from, to });
        }

        self.forward.entry(from).or_default().push(to);
        self.edges.insert((from, to), FlowEdge { from, to, condition, data_mapping });
        if let Some(node) = self.nodes.get_mut(&to) {
            if !node.depends_on.contains(&from) {
                node.depends_on.push(from);
            }
        }
        Ok(())
    }

    /// True if a path `to -> ... -> from` already exists, i.e. adding the
    /// edge `from -> to` would close a cycle.
    fn creates_cycle(&self, from: Uuid, to: Uuid) -> bool {
        if from == to {
            return true;
        }
        let mut stack = vec![to];
        let mut seen = HashSet::new();
        while let Some(n) = stack.pop() {
            if n == from {
                return true;
            }
            if !seen.insert(n) {
                continue;
            }
            if let Some(successors) = self.forward.get(&n) {
                stack.extend(successors.iter().copied());
            }
        }
        false
    }

    /// Validates every dependency reference resolves to a registered node
    /// and that no cycle slipped through deferred registration. Run once at
    /// the top of `execute()`.
    pub fn validate(&self) -> SchedulerResult<()> {
        for node in self.nodes.values() {
            for dep in &node.depends_on {
                if !self.nodes.contains_key(dep) {
                    return Err(SchedulerError::UnknownDependency(*dep));
                }
            }
        }
        for node in self.nodes.values() {
            for dep in &node.depends_on {
                if self.path_exists(node.id, *dep) {
                    return Err(SchedulerError::Cycle { from: *dep, to: node.id });
                }
            }
        }
        Ok(())
    }

    fn path_exists(&self, from: Uuid, to: Uuid) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(n) = stack.pop() {
            if n == to {
                return true;
            }
            if !seen.insert(n) {
                continue;
            }
            if let Some(successors) = self.forward.get(&n) {
                stack.extend(successors.iter().copied());
            }
        }
        false
    }

    pub fn node(&self, id: &Uuid) -> Option<&FlowNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &Uuid) -> Option<&mut FlowNode> {
        self.nodes.get_mut(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &FlowNode> {
        self.nodes.values()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut FlowNode> {
        self.nodes.values_mut()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge(&self, from: Uuid, to: Uuid) -> Option<&FlowEdge> {
        self.edges.get(&(from, to))
    }

    /// `pending` nodes whose every dependency is `successful` and whose
    /// gating edge condition (if any) evaluated true, sorted by priority
    /// descending then insertion order.
    pub fn ready_ids(&self) -> Vec<Uuid> {
        let mut ready: Vec<&FlowNode> = self.nodes
                                             .values()
                                             .filter(|n| n.status == NodeStatus::Pending)
                                             .filter(|n| {
                                                 n.depends_on.iter().all(|dep| {
                                                     self.nodes
                                                         .get(dep)
                                                         .map(|d| d.status == NodeStatus::Successful)
                                                         .unwrap_or(false)
                                                     && self.edge(*dep, n.id)
                                                            .and_then(|e| e.condition.as_ref())
                                                            .map(|cond| {
                                                                self.nodes
                                                                    .get(dep)
                                                                    .and_then(|d| d.result.as_ref())
                                                                    .map(|r| cond(r))
                                                                    .unwrap_or(false)
                                                            })
                                                            .unwrap_or(true)
                                                 })
                                             })
                                             .collect();
        ready.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.insertion_order.cmp(&b.insertion_order)));
        ready.into_iter().map(|n| n.id).collect()
    }

    /// Applies cascade rules for every still-pending node: cancels it if a
    /// predecessor failed and `fail_fast` is set; skips it if a predecessor's
    /// gating edge condition evaluated false. Both land in the skipped
    /// bucket at result-build time; only nodes that ran and failed
    /// themselves count as `failed`. Returns the ids that changed.
    pub fn apply_cascades(&mut self, fail_fast: bool) -> Vec<Uuid> {
        let pending_ids: Vec<Uuid> =
            self.nodes.values().filter(|n| n.status == NodeStatus::Pending).map(|n| n.id).collect();
        let mut changed = Vec::new();

        for id in pending_ids {
            let depends_on = self.nodes[&id].depends_on.clone();

            let mut should_fail = false;
            let mut should_skip = false;
            for dep in &depends_on {
                let Some(dep_node) = self.nodes.get(dep) else { continue };
                match dep_node.status {
                    NodeStatus::Failed | NodeStatus::Cancelled if fail_fast => should_fail = true,
                    NodeStatus::Successful => {
                        if let Some(edge) = self.edge(*dep, id) {
                            if let Some(cond) = &edge.condition {
                                if let Some(result) = &dep_node.result {
                                    if !cond(result) {
                                        should_skip = true;
                                    }
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }

            if should_fail {
                let node = self.nodes.get_mut(&id).unwrap();
                node.status = NodeStatus::Cancelled;
                node.error = Some("cancelled: upstream dependency failed (failFast)".to_string());
                changed.push(id);
            } else if should_skip {
                let node = self.nodes.get_mut(&id).unwrap();
                node.status = NodeStatus::Skipped;
                changed.push(id);
            }
        }

        changed
    }

    /// Builds a starting node's input by merging scheduler-level `input_data`
    /// with, for each predecessor, either `edge.dataMapping(result)` or
    /// `{ predecessor_id: result }`, per spec.md §4.2 step 4.
    pub fn build_input(&self, id: Uuid, input_data: &Value) -> Value {
        let mut map = match input_data {
            Value::Object(m) => m.clone(),
            Value::Null => Map::new(),
            other => {
                let mut m = Map::new();
                m.insert("input".to_string(), other.clone());
                m
            }
        };

        if let Some(node) = self.nodes.get(&id) {
            for dep in &node.depends_on {
                let Some(dep_node) = self.nodes.get(dep) else { continue };
                let Some(result) = &dep_node.result else { continue };
                if let Some(edge) = self.edge(*dep, id) {
                    if let Some(mapping) = &edge.data_mapping {
                        if let Value::Object(mapped) = mapping(result) {
                            map.extend(mapped);
                            continue;
                        }
                    }
                }
                map.insert(dep.to_string(), result.clone());
            }
        }

        Value::Object(map)
    }
}
