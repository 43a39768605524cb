//! `FlowScheduler`: the multi-flow DAG orchestrator. Generalizes the
//! teacher's synchronous `FlowEngine::run_flow_to_completion` loop
//! (`chem-core::engine::core::FlowEngine`) into an async, bounded-parallel
//! executor: one `tokio::spawn`ed task per running flow, a single owning
//! loop that is the only thing that ever mutates the dependency graph.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use flow_events::{kind, Event, EventBus};
use flow_memory::{FlowStateStatus, MemoryConnector};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::checkpoint::{self, Checkpoint};
use crate::clock::{Clock, SystemClock};
use crate::config::{effective_max_concurrent, MemoryUtilizationProbe, NoOpProbe, SchedulerOptions};
use crate::critical_path::{self, CriticalPathResult};
use crate::errors::{SchedulerError, SchedulerResult};
use crate::graph::FlowGraph;
use crate::node::NodeStatus;
use crate::retry::{self, ErrorCategory, PermissiveClassifier, TransientClassifier};
use crate::schedulable::SchedulableFlow;

pub struct ExecutionResult {
    pub successful: bool,
    pub completed: Vec<Uuid>,
    pub failed: Vec<Uuid>,
    pub skipped: Vec<Uuid>,
    pub results: HashMap<Uuid, Value>,
    pub errors: HashMap<Uuid, String>,
    pub execution_time_ms: i64,
    pub critical_path: Vec<Uuid>,
    pub critical_path_execution_time_ms: i64,
    /// Set when the run ended on a scheduler-fatal condition (deadlock or
    /// total timeout); `completed`/`results` still reflect whatever finished
    /// beforehand, per spec.md's "result carries partial successes".
    pub fatal_error: Option<String>,
}

struct NodeFailure {
    message: String,
    category: ErrorCategory,
}

enum NodeEvent {
    Finished { id: Uuid, outcome: Result<Value, NodeFailure> },
    RetryReady { id: Uuid },
}

/// Executes many `Flow`s whose inter-flow dependencies form a DAG. Owns the
/// graph exclusively; `execute` is the only method that mutates it
/// concurrently with spawned work (spawned tasks only run flows and report
/// back over a channel, they never touch the graph directly).
pub struct FlowScheduler {
    graph: FlowGraph,
    clock: Arc<dyn Clock>,
    classifier: Arc<dyn TransientClassifier>,
    probe: Arc<dyn MemoryUtilizationProbe>,
    memory: Option<Arc<MemoryConnector>>,
    bus: Option<EventBus>,
    scheduler_flow_id: Uuid,
    cancel: CancellationToken,
}

impl Default for FlowScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowScheduler {
    pub fn new() -> Self {
        Self { graph: FlowGraph::new(),
               clock: Arc::new(SystemClock),
               classifier: Arc::new(PermissiveClassifier),
               probe: Arc::new(NoOpProbe),
               memory: None,
               bus: None,
               scheduler_flow_id: Uuid::new_v4(),
               cancel: CancellationToken::new() }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn TransientClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_memory_probe(mut self, probe: Arc<dyn MemoryUtilizationProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_memory(mut self, memory: Arc<MemoryConnector>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn register_flow(&mut self, flow: Arc<dyn SchedulableFlow>, id: Option<Uuid>, depends_on: Vec<Uuid>,
                          priority: i64, metadata: HashMap<String, Value>)
                          -> SchedulerResult<Uuid> {
        self.graph.register(id, flow, depends_on, priority, metadata)
    }

    pub fn add_dependency(&mut self, from: Uuid, to: Uuid,
                           condition: Option<Arc<dyn Fn(&Value) -> bool + Send + Sync>>,
                           data_mapping: Option<Arc<dyn Fn(&Value) -> Value + Send + Sync>>)
                           -> SchedulerResult<()> {
        self.graph.add_dependency(from, to, condition, data_mapping)
    }

    /// Cancels every in-flight and future node of the current/next `execute`
    /// call. Cooperative: running flows observe cancellation only at their
    /// own suspension points (spec.md §5).
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn restore_from_checkpoint(&mut self, checkpoint: Checkpoint) -> SchedulerResult<Vec<Uuid>> {
        checkpoint::restore(&mut self.graph, &checkpoint)?;
        if checkpoint.critical_path.is_empty() {
            Ok(critical_path::analyze(&self.graph).critical_path)
        } else {
            Ok(checkpoint.critical_path)
        }
    }

    pub async fn execute(&mut self, options: SchedulerOptions) -> SchedulerResult<ExecutionResult> {
        self.graph.validate()?;
        self.cancel = CancellationToken::new();

        let execution_start_time = Utc::now();
        let total_deadline = options.total_timeout_ms.map(|ms| tokio::time::Instant::now() + Duration::from_millis(ms));

        if let Some(bus) = &self.bus {
            bus.publish(Event::new(kind::EXECUTION_STARTED,
                                    json!({ "flowCount": self.graph.len(), "maxConcurrent": options.max_concurrent })));
        }

        let (tx, mut rx) = mpsc::channel::<NodeEvent>(256);
        let mut running: HashSet<Uuid> = HashSet::new();
        // Ids with an armed retry timer: the node's status is `Scheduled`,
        // not `Pending`, so it is invisible to `ready_ids`/the pending scan
        // below. Keeping a separate set is what stops the run from looking
        // finished (or deadlocked) while a `RetryReady` is still in flight.
        let mut retrying: HashSet<Uuid> = HashSet::new();
        let mut last_start_at: Option<tokio::time::Instant> = None;
        let mut fatal_error: Option<SchedulerError> = None;

        'outer: loop {
            self.graph.apply_cascades(options.fail_fast);

            if running.is_empty() && retrying.is_empty() {
                let any_pending = self.graph.nodes().any(|n| n.status == NodeStatus::Pending);
                let ready_now = self.graph.ready_ids();
                if !any_pending {
                    break 'outer;
                }
                if ready_now.is_empty() {
                    fatal_error = Some(SchedulerError::DeadlockError {
                        pending: self.graph.nodes().filter(|n| n.status == NodeStatus::Pending).count(),
                    });
                    break 'outer;
                }
            }

            let effective = effective_max_concurrent(&options, self.probe.utilization());
            while running.len() < effective {
                let Some(next_id) = self.graph.ready_ids().into_iter().next() else { break };

                if options.min_execution_delay_ms > 0 {
                    if let Some(last) = last_start_at {
                        let need = Duration::from_millis(options.min_execution_delay_ms);
                        let elapsed = last.elapsed();
                        if elapsed < need {
                            tokio::time::sleep(need - elapsed).await;
                        }
                    }
                }

                self.start_node(next_id, &options, &tx);
                running.insert(next_id);
                last_start_at = Some(tokio::time::Instant::now());
            }

            if running.is_empty() && retrying.is_empty() {
                continue;
            }

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    fatal_error = Some(SchedulerError::CancellationError);
                    break 'outer;
                }
                _ = sleep_until_opt(total_deadline) => {
                    fatal_error = Some(SchedulerError::TotalTimeoutError(options.total_timeout_ms.unwrap_or(0)));
                    break 'outer;
                }
                _ = sleep_interval_opt(options.checkpoint_interval_ms) => {
                    self.write_checkpoint(execution_start_time).await;
                }
                maybe_ev = rx.recv() => {
                    match maybe_ev {
                        Some(NodeEvent::Finished { id, outcome }) => {
                            running.remove(&id);
                            self.handle_finished(id, outcome, &options, &tx, &mut retrying);
                        }
                        Some(NodeEvent::RetryReady { id }) => {
                            retrying.remove(&id);
                            if let Some(node) = self.graph.node_mut(&id) {
                                node.status = NodeStatus::Pending;
                            }
                        }
                        None => {}
                    }
                }
            }
        }

        if fatal_error.is_some() {
            self.cancel.cancel();
            for id in &running {
                if let Some(node) = self.graph.node_mut(id) {
                    node.status = NodeStatus::Cancelled;
                    node.end_time = Some(Utc::now());
                }
            }
        }

        let cp = critical_path::analyze(&self.graph);
        for (id, on_path) in &cp.on_critical_path {
            if let Some(node) = self.graph.node_mut(id) {
                node.on_critical_path = *on_path;
            }
        }

        self.write_checkpoint(execution_start_time).await;

        let result = self.build_result(execution_start_time, &cp, fatal_error);

        if let Some(bus) = &self.bus {
            if result.fatal_error.is_none() {
                bus.publish(Event::new(kind::EXECUTION_COMPLETED,
                                        json!({ "completed": result.completed, "failed": result.failed, "executionTimeMs": result.execution_time_ms })));
            } else {
                bus.publish(Event::new(kind::EXECUTION_FAILED,
                                        json!({ "error": result.fatal_error, "completed": result.completed, "failed": result.failed })));
            }
        }

        Ok(result)
    }

    fn start_node(&mut self, id: Uuid, options: &SchedulerOptions, tx: &mpsc::Sender<NodeEvent>) {
        let input = self.graph.build_input(id, &options.input_data);
        let node = self.graph.node_mut(&id).expect("ready_ids only returns registered ids");
        node.status = NodeStatus::Running;
        node.start_time = Some(Utc::now());
        let flow = node.flow.clone();
        let attempt = node.attempts + 1;
        node.attempts += 1;

        if let Some(hook) = &options.before_execution {
            hook(id);
        }

        tracing::info!(flow_id = %id, attempt, "flow node starting");

        let tx = tx.clone();
        let timeout_ms = options.execution_timeout_ms;
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    Err(NodeFailure { message: "cancelled".to_string(), category: ErrorCategory::Unknown })
                }
                outcome = run_with_timeout(flow, input, timeout_ms) => outcome,
            };
            let _ = tx.send(NodeEvent::Finished { id, outcome }).await;
        });
    }

    fn handle_finished(&mut self, id: Uuid, outcome: Result<Value, NodeFailure>, options: &SchedulerOptions,
                        tx: &mpsc::Sender<NodeEvent>, retrying: &mut HashSet<Uuid>) {
        match outcome {
            Ok(value) => {
                if let Some(node) = self.graph.node_mut(&id) {
                    node.status = NodeStatus::Successful;
                    node.result = Some(value.clone());
                    node.end_time = Some(Utc::now());
                }
                if let Some(hook) = &options.after_execution {
                    hook(id, &value);
                }
                tracing::info!(flow_id = %id, "flow node succeeded");
            }
            Err(failure) => {
                let message = failure.message;
                let attempts = self.graph.node(&id).map(|n| n.attempts).unwrap_or(0);
                let retries_remain = attempts <= options.retry_count;
                let transient = self.classifier.is_transient(failure.category);
                let forced_retry = options.on_error.as_ref().map(|hook| hook(id, &message)).unwrap_or(false);
                let should_retry = forced_retry || (retries_remain && transient);

                if should_retry {
                    if let Some(node) = self.graph.node_mut(&id) {
                        node.status = NodeStatus::Scheduled;
                        node.error = Some(message.clone());
                    }
                    let delay = retry::backoff_delay(attempts, options.retry_delay_ms, options.max_delay_ms);
                    tracing::warn!(flow_id = %id, attempt = attempts, delay_ms = delay.as_millis() as u64, "flow node failed, retrying");

                    if let Some(bus) = &self.bus {
                        bus.publish(Event::new(kind::FLOW_RETRY,
                                                json!({ "flowId": id, "attempt": attempts, "delayMs": delay.as_millis() as u64, "error": message })));
                    }

                    retrying.insert(id);
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(NodeEvent::RetryReady { id }).await;
                    });
                } else {
                    if let Some(node) = self.graph.node_mut(&id) {
                        node.status = NodeStatus::Failed;
                        node.error = Some(message.clone());
                        node.end_time = Some(Utc::now());
                    }
                    tracing::error!(flow_id = %id, error = %message, "flow node failed permanently");
                    if let Some(bus) = &self.bus {
                        bus.publish(Event::new(kind::ERROR, json!({ "error": message, "flowId": id })));
                    }
                }
            }
        }
    }

    async fn write_checkpoint(&self, execution_start_time: DateTime<Utc>) {
        let Some(memory) = &self.memory else { return };
        let cp = critical_path::analyze(&self.graph);
        let checkpoint = checkpoint::build(&self.graph, execution_start_time, &cp.critical_path);
        let Ok(value) = serde_json::to_value(&checkpoint) else { return };
        let _ = memory.persist_flow_state(self.scheduler_flow_id, "scheduler", 0, FlowStateStatus::Updated, value)
                      .await;
        if let Some(bus) = &self.bus {
            bus.publish(Event::new(kind::CHECKPOINT_CREATED, json!({ "schedulerFlowId": self.scheduler_flow_id })));
        }
    }

    fn build_result(&self, execution_start_time: DateTime<Utc>, cp: &CriticalPathResult,
                     fatal_error: Option<SchedulerError>)
                     -> ExecutionResult {
        let mut completed = Vec::new();
        let mut failed = Vec::new();
        let mut skipped = Vec::new();
        let mut results = HashMap::new();
        let mut errors = HashMap::new();

        for node in self.graph.nodes() {
            match node.status {
                NodeStatus::Successful => {
                    completed.push(node.id);
                    if let Some(v) = &node.result {
                        results.insert(node.id, v.clone());
                    }
                }
                NodeStatus::Failed => {
                    failed.push(node.id);
                    errors.insert(node.id, node.error.clone().unwrap_or_default());
                }
                NodeStatus::Skipped | NodeStatus::Cancelled => skipped.push(node.id),
                NodeStatus::Pending | NodeStatus::Scheduled | NodeStatus::Running => {}
            }
        }

        let execution_time_ms = (Utc::now() - execution_start_time).num_milliseconds();

        ExecutionResult { successful: fatal_error.is_none() && failed.is_empty(),
                           completed,
                           failed,
                           skipped,
                           results,
                           errors,
                           execution_time_ms,
                           critical_path: cp.critical_path.clone(),
                           critical_path_execution_time_ms: cp.critical_path_execution_time_ms,
                           fatal_error: fatal_error.map(|e| e.to_string()) }
    }
}

async fn run_with_timeout(flow: Arc<dyn SchedulableFlow>, input: Value, timeout_ms: Option<u64>)
                          -> Result<Value, NodeFailure> {
    match timeout_ms {
        Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), flow.execute(input)).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(NodeFailure { message: e.to_string(), category: ErrorCategory::Unknown }),
            Err(_) => Err(NodeFailure { message: format!("execution timed out after {ms}ms"),
                                        category: ErrorCategory::Timeout }),
        },
        None => match flow.execute(input).await {
            Ok(v) => Ok(v),
            Err(e) => Err(NodeFailure { message: e.to_string(), category: ErrorCategory::Unknown }),
        },
    }
}

async fn sleep_until_opt(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending::<()>().await,
    }
}

async fn sleep_interval_opt(ms: Option<u64>) {
    match ms {
        Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
        None => std::future::pending::<()>().await,
    }
}
