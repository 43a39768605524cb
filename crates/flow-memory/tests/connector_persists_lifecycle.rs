use std::sync::Arc;

use flow_core::{FlowBuilder, MethodOutcome};
use flow_memory::{InMemoryBackend, MemoryConfig, MemoryConnector, MemoryType};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn connect_to_flow_persists_started_and_finished_state() {
    let connector = MemoryConnector::new(Arc::new(InMemoryBackend::new()), MemoryConfig::default());

    let flow = FlowBuilder::<i64>::new().start("A", |state, _input| async move {
                                            state.set(42).await;
                                            Ok(MethodOutcome::Value(json!(1)))
                                        })
                                        .unwrap()
                                        .build(0)
                                        .unwrap();

    let flow_id = Uuid::new_v4();
    connector.connect_to_flow(&flow, flow_id, "demo", 0);

    // connect_to_flow's initial CONFIG/STATE write is spawned, not awaited;
    // give it a tick before dispatching.
    tokio::task::yield_now().await;
    flow.execute(json!(null)).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let history = connector.get_flow_state_history(flow_id, None, None).await.unwrap();
    assert!(history.len() >= 2, "expected at least started+finished snapshots, got {}", history.len());

    let latest = connector.get_latest_flow_state(flow_id).await.unwrap();
    assert!(latest.is_some());
}

#[tokio::test]
async fn method_results_and_errors_are_queryable_separately() {
    let connector = MemoryConnector::new(Arc::new(InMemoryBackend::new()), MemoryConfig::default());
    let flow_id = Uuid::new_v4();

    connector.persist_method_result(flow_id, "demo", 0, "step_a", json!({"methodName": "step_a", "result": 7}))
              .await
              .unwrap();
    connector.persist_flow_error(flow_id, "demo", 0, "boom", json!({"methodName": "step_b", "error": "boom"}))
              .await
              .unwrap();

    let results = connector.get_method_results(flow_id, None, None).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].memory_type, MemoryType::MethodResult);

    let errors = connector.get_flow_errors(flow_id, None, None).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].memory_type, MemoryType::Error);
}

#[tokio::test]
async fn clear_flow_data_removes_matching_items_and_cache() {
    let connector = MemoryConnector::new(Arc::new(InMemoryBackend::new()), MemoryConfig::default());
    let flow_id = Uuid::new_v4();

    connector.persist_flow_state(flow_id, "demo", 0, flow_memory::FlowStateStatus::Started, json!({"x": 1}))
              .await
              .unwrap();
    connector.persist_method_result(flow_id, "demo", 0, "step_a", json!({"ok": true})).await.unwrap();

    let removed = connector.clear_flow_data(flow_id, Some(MemoryType::State), None).await.unwrap();
    assert_eq!(removed, 1);
    assert!(connector.get_latest_flow_state(flow_id).await.unwrap().is_none());

    let remaining_results = connector.get_method_results(flow_id, None, None).await.unwrap();
    assert_eq!(remaining_results.len(), 1);
}

#[tokio::test]
async fn state_snapshot_count_is_capped_per_flow() {
    let backend = Arc::new(InMemoryBackend::new());
    let config = MemoryConfig { max_state_snapshots_per_flow: 3, ..MemoryConfig::default() };
    let connector = MemoryConnector::new(backend, config);
    let flow_id = Uuid::new_v4();

    for i in 0..10 {
        connector.persist_flow_state(flow_id, "demo", 0, flow_memory::FlowStateStatus::Updated, json!({"i": i}))
                  .await
                  .unwrap();
    }

    let history = connector.get_flow_state_history(flow_id, None, None).await.unwrap();
    assert!(history.len() <= 3, "expected at most 3 retained snapshots, got {}", history.len());
}

#[tokio::test]
async fn search_without_vector_retriever_is_unsupported() {
    let connector = MemoryConnector::new(Arc::new(InMemoryBackend::new()), MemoryConfig::default());
    let err = connector.search_flow_data("anything", Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, flow_memory::MemoryError::UnsupportedQuery));
}
