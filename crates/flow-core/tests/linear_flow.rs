use std::sync::{Arc, Mutex};

use flow_core::{FlowBuilder, MethodOutcome, TriggerSpec};
use flow_events::kind;
use serde_json::{json, Value};

#[tokio::test]
async fn linear_chain_produces_expected_value_and_event_order() {
    let flow = FlowBuilder::<()>::new().start("A", |_state, _input| async move {
                                           Ok(MethodOutcome::Value(json!(1)))
                                       })
                                       .unwrap()
                                       .listen("B", TriggerSpec::Simple("A".into()), |_state, input| async move {
                                           let n = input.as_single().and_then(Value::as_i64).unwrap_or(0);
                                           Ok(MethodOutcome::Value(json!(n + 1)))
                                       })
                                       .unwrap()
                                       .listen("C", TriggerSpec::Simple("B".into()), |_state, input| async move {
                                           let n = input.as_single().and_then(Value::as_i64).unwrap_or(0);
                                           Ok(MethodOutcome::Value(json!(n * 10)))
                                       })
                                       .unwrap()
                                       .build(())
                                       .unwrap();

    // Records (event_type, methodName) pairs, or ("flow_started"/"flow_finished", "") for
    // flow-level events, in dispatch order.
    let trace: Arc<Mutex<Vec<(String, String)>>> = Arc::new(Mutex::new(Vec::new()));

    for event_type in [kind::FLOW_STARTED, kind::METHOD_EXECUTION_STARTED, kind::METHOD_EXECUTION_FINISHED,
                        kind::FLOW_FINISHED]
    {
        let t = trace.clone();
        let et = event_type.to_string();
        flow.on(event_type,
                Arc::new(move |payload: &Value| {
                    let method = payload.get("methodName").and_then(Value::as_str).unwrap_or("").to_string();
                    t.lock().unwrap().push((et.clone(), method));
                }));
    }

    let result = flow.execute(json!(null)).await.unwrap();
    assert_eq!(result, json!(20));

    let seen = trace.lock().unwrap();
    let expected = vec![(kind::FLOW_STARTED.to_string(), String::new()),
                         (kind::METHOD_EXECUTION_STARTED.to_string(), "A".to_string()),
                         (kind::METHOD_EXECUTION_FINISHED.to_string(), "A".to_string()),
                         (kind::METHOD_EXECUTION_STARTED.to_string(), "B".to_string()),
                         (kind::METHOD_EXECUTION_FINISHED.to_string(), "B".to_string()),
                         (kind::METHOD_EXECUTION_STARTED.to_string(), "C".to_string()),
                         (kind::METHOD_EXECUTION_FINISHED.to_string(), "C".to_string()),
                         (kind::FLOW_FINISHED.to_string(), String::new())];
    assert_eq!(*seen, expected);
}
