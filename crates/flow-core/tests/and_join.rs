use std::sync::{Arc, Mutex};

use flow_core::{FlowBuilder, MethodOutcome, TriggerSpec};
use serde_json::{json, Value};

#[tokio::test]
async fn and_join_fires_exactly_once_regardless_of_arrival_order() {
    let flow = FlowBuilder::<()>::new().start("A", |_state, _input| async move {
                                           Ok(MethodOutcome::Value(json!(1)))
                                       })
                                       .unwrap()
                                       .start("B", |_state, _input| async move {
                                           Ok(MethodOutcome::Value(json!(2)))
                                       })
                                       .unwrap()
                                       .listen("C", TriggerSpec::And(vec!["A".into(), "B".into()]),
                                               |_state, input| async move {
                                                   let map = match input {
                                                       flow_core::MethodInput::Many(m) => m,
                                                       _ => panic!("expected AND join map input"),
                                                   };
                                                   let a = map["A"].as_i64().unwrap();
                                                   let b = map["B"].as_i64().unwrap();
                                                   Ok(MethodOutcome::Value(json!(a + b)))
                                               })
                                       .unwrap()
                                       .build(())
                                       .unwrap();

    let c_started_count = Arc::new(Mutex::new(0u32));
    let c = c_started_count.clone();
    flow.on(flow_events::kind::METHOD_EXECUTION_STARTED,
            Arc::new(move |payload: &Value| {
                if payload.get("methodName").and_then(Value::as_str) == Some("C") {
                    *c.lock().unwrap() += 1;
                }
            }));

    let result = flow.execute(json!(null)).await.unwrap();
    assert_eq!(result, json!(3));
    assert_eq!(*c_started_count.lock().unwrap(), 1);
}
