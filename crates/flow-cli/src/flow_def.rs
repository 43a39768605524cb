//! Declarative flow-definition loading for `run-flow`.
//!
//! spec.md's external interface names a Flow by its state type and Rust
//! method table (§6), which by construction can't be loaded from a path at
//! runtime without an embedded scripting/plugin layer — out of scope here.
//! `run-flow <path>` instead loads a JSON description of a dependency graph
//! of passthrough flows (each node is a trivial single-method `Flow<()>`
//! that forwards its input to its result), which is enough to exercise the
//! full scheduler (dependencies, priorities, concurrency, retries) end to
//! end. Real embeddings register actual `Flow<S>` instances with
//! `FlowScheduler::register_flow` directly, in Rust, the way `flowforge`'s
//! own demo binary does.

use std::collections::HashMap;
use std::path::Path;

use flow_core::{Flow, FlowBuilder, MethodOutcome};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::errors::CliError;

#[derive(Debug, Deserialize)]
pub struct FlowDefNode {
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub priority: i64,
}

#[derive(Debug, Deserialize)]
pub struct FlowDefinition {
    pub nodes: Vec<FlowDefNode>,
}

impl FlowDefinition {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path)?;
        let def: FlowDefinition = serde_json::from_str(&text)?;
        if def.nodes.is_empty() {
            return Err(CliError::Usage("flow definition has no nodes".to_string()));
        }
        Ok(def)
    }

    /// Registers every node into `scheduler`, translating `depends_on` names
    /// into scheduler ids. Returns the name -> id map for result lookups.
    pub fn register_into(&self, scheduler: &mut flow_scheduler::FlowScheduler) -> Result<HashMap<String, Uuid>, CliError> {
        let mut ids = HashMap::new();

        for node in &self.nodes {
            if ids.contains_key(&node.name) {
                return Err(CliError::Usage(format!("duplicate node name `{}`", node.name)));
            }
            let depends_on = node.depends_on
                                  .iter()
                                  .map(|dep| {
                                      ids.get(dep).copied().ok_or_else(|| {
                                          CliError::Usage(format!("node `{}` depends on unknown/forward-declared node `{dep}` \
                                                                    (nodes must be declared after their dependencies)",
                                                                   node.name))
                                      })
                                  })
                                  .collect::<Result<Vec<_>, _>>()?;

            let flow = passthrough_flow(&node.name)?;
            let id = scheduler.register_flow(std::sync::Arc::new(flow), None, depends_on, node.priority,
                                              HashMap::new())?;
            ids.insert(node.name.clone(), id);
        }

        Ok(ids)
    }
}

fn passthrough_flow(name: &str) -> Result<Flow<()>, CliError> {
    let name = name.to_string();
    let flow = FlowBuilder::<()>::new().start(name, |_state, input| async move {
                                            let value = input.as_single().cloned().unwrap_or(Value::Null);
                                            Ok(MethodOutcome::Value(value))
                                        })?
                                        .build(())?;
    Ok(flow)
}
