use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use flow_core::{FlowCoreError, FlowCoreResult};
use flow_events::{kind, Event, EventBus};
use flow_scheduler::{FlowScheduler, SchedulableFlow, SchedulerOptions};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// Fails its first `fail_times` invocations, then succeeds with `ok_value`.
struct FlakyFlow {
    fail_times: usize,
    calls: AtomicUsize,
    ok_value: Value,
}

impl FlakyFlow {
    fn new(fail_times: usize, ok_value: Value) -> Self {
        Self { fail_times, calls: AtomicUsize::new(0), ok_value }
    }
}

#[async_trait]
impl SchedulableFlow for FlakyFlow {
    async fn execute(&self, _input: Value) -> FlowCoreResult<Value> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.fail_times {
            Err(FlowCoreError::Internal(format!("attempt {n} failed")))
        } else {
            Ok(self.ok_value.clone())
        }
    }
}

struct AlwaysOk(Value);

#[async_trait]
impl SchedulableFlow for AlwaysOk {
    async fn execute(&self, _input: Value) -> FlowCoreResult<Value> {
        Ok(self.0.clone())
    }
}

struct AlwaysFail;

#[async_trait]
impl SchedulableFlow for AlwaysFail {
    async fn execute(&self, _input: Value) -> FlowCoreResult<Value> {
        Err(FlowCoreError::Internal("always fails".to_string()))
    }
}

struct NeverCalled(Arc<AtomicUsize>);

#[async_trait]
impl SchedulableFlow for NeverCalled {
    async fn execute(&self, _input: Value) -> FlowCoreResult<Value> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(json!("should not run"))
    }
}

// S4: scheduler retries a failing flow up to `retryCount`, succeeding on the
// final attempt, and reports exactly the expected invocation/event count.
#[tokio::test]
async fn retries_failing_flow_until_it_succeeds() {
    let (bus, _handle) = EventBus::spawn();
    let retries: Arc<Mutex<usize>> = Arc::new(Mutex::new(0));
    let r = retries.clone();
    bus.on(kind::FLOW_RETRY, Arc::new(move |_: &Event| *r.lock() += 1));

    let mut scheduler = FlowScheduler::new().with_bus(bus);
    let flow = Arc::new(FlakyFlow::new(2, json!("ok")));
    let f = scheduler.register_flow(flow, None, vec![], 0, HashMap::new()).unwrap();

    let options = SchedulerOptions::new().with_retry(2, 10);
    let result = scheduler.execute(options).await.unwrap();

    assert!(result.successful);
    assert_eq!(result.completed, vec![f]);
    assert_eq!(result.results.get(&f), Some(&json!("ok")));

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(*retries.lock(), 2);
}

// S5: failFast cascades a downstream node's failure to its dependents
// without ever starting them, while independent branches still complete.
#[tokio::test]
async fn fail_fast_cascades_and_skips_downstream() {
    let mut scheduler = FlowScheduler::new();

    let a = scheduler.register_flow(Arc::new(AlwaysOk(json!("a"))), None, vec![], 0, HashMap::new()).unwrap();
    let b = scheduler.register_flow(Arc::new(AlwaysFail), None, vec![a], 0, HashMap::new()).unwrap();
    let never_ran = Arc::new(AtomicUsize::new(0));
    let d = scheduler.register_flow(Arc::new(NeverCalled(never_ran.clone())), None, vec![b], 0, HashMap::new())
                     .unwrap();

    let options = SchedulerOptions::new().with_retry(0, 0).with_fail_fast(true);
    let result = scheduler.execute(options).await.unwrap();

    assert!(!result.successful);
    assert_eq!(result.completed, vec![a]);
    assert_eq!(result.failed, vec![b]);
    assert!(result.skipped.contains(&d));
    assert_eq!(never_ran.load(Ordering::SeqCst), 0);
}

// S6: a cycle introduced through `addDependency` is rejected immediately,
// at graph-build time, rather than deferred to `execute()`.
#[tokio::test]
async fn add_dependency_rejects_cycle_at_build_time() {
    let mut scheduler = FlowScheduler::new();

    let a = scheduler.register_flow(Arc::new(AlwaysOk(json!("a"))), None, vec![], 0, HashMap::new()).unwrap();
    let b = scheduler.register_flow(Arc::new(AlwaysOk(json!("b"))), None, vec![a], 0, HashMap::new()).unwrap();

    let err = scheduler.add_dependency(b, a, None, None).unwrap_err();
    assert!(matches!(err, flow_scheduler::SchedulerError::Cycle { .. }));
}

// S6b: a dependency left dangling by `registerFlow` is only surfaced once
// `execute()` validates the whole graph, not at registration time.
#[tokio::test]
async fn dangling_dependency_is_deferred_to_execute() {
    let mut scheduler = FlowScheduler::new();
    let unknown = uuid::Uuid::new_v4();

    let registered = scheduler.register_flow(Arc::new(AlwaysOk(json!("a"))), None, vec![unknown], 0,
                                              HashMap::new());
    assert!(registered.is_ok());

    let err = scheduler.execute(SchedulerOptions::new()).await.unwrap_err();
    assert!(matches!(err, flow_scheduler::SchedulerError::UnknownDependency(id) if id == unknown));
}
