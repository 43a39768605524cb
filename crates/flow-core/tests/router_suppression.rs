use std::sync::{Arc, Mutex};

use flow_core::{FlowBuilder, MethodOutcome, TriggerSpec};
use serde_json::{json, Value};

#[tokio::test]
async fn router_with_false_predicate_suppresses_its_subtree() {
    let flow =
        FlowBuilder::<()>::new().start("A", |_state, _input| async move {
                                     Ok(MethodOutcome::Value(json!({ "quality": "low" })))
                                 })
                                 .unwrap()
                                 .router("R", "A", |result: &Value| result.get("quality").and_then(Value::as_str)
                                                                           == Some("high"),
                                         |_state, input| async move {
                                             Ok(MethodOutcome::Value(input.as_single().cloned()
                                                                           .unwrap_or(Value::Null)))
                                         })
                                 .unwrap()
                                 .listen("L", TriggerSpec::Simple("R".into()), |_state, _input| async move {
                                     Ok(MethodOutcome::Value(json!("high-branch")))
                                 })
                                 .unwrap()
                                 .build(())
                                 .unwrap();

    let l_finished = Arc::new(Mutex::new(false));
    let l = l_finished.clone();
    flow.on(flow_events::kind::METHOD_EXECUTION_FINISHED,
            Arc::new(move |payload: &Value| {
                if payload.get("methodName").and_then(Value::as_str) == Some("L") {
                    *l.lock().unwrap() = true;
                }
            }));

    let result = flow.execute(json!(null)).await.unwrap();
    assert_eq!(result, json!({ "quality": "low" }));
    assert!(!*l_finished.lock().unwrap(), "L must never fire when the router predicate is false");
}
