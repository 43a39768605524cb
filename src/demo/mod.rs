//! A small, concrete pipeline used by the `flowforge` binary: ingest a batch
//! of records, validate and enrich them in parallel, join the two branches,
//! and emit a report. Grounded the same way `chem-gl-chemflow`'s own
//! `main.rs` chained `SeedStep -> SplitStep -> ForwardStep -> PrintAndCountStep`,
//! generalized from that crate's fixed step list to `flow-core`'s named
//! trigger graph.

use flow_core::{Flow, FlowBuilder, FlowCoreError, FlowCoreResult, MethodInput, MethodOutcome, TriggerSpec};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// The pipeline's state payload. Opaque to the runtime; only the method
/// bodies below interpret it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineState {
    pub records_seen: usize,
    pub valid_records: usize,
    pub enriched_records: usize,
}

/// Builds the `ingest -> {validate, enrich} -> report` flow.
///
/// `validate` and `enrich` both listen on `ingest`'s result and run as
/// independent branches; `report` is an AND join over both, so it only
/// dispatches once both branches have produced a result.
pub fn build_ingest_pipeline() -> FlowCoreResult<Flow<PipelineState>> {
    FlowBuilder::<PipelineState>::new()
        .start("ingest", |state, input| async move {
            let records = input.as_single()
                                .and_then(Value::as_array)
                                .cloned()
                                .ok_or_else(|| FlowCoreError::Internal("ingest expects a JSON array".to_string()))?;

            let mut s = state.get().await;
            s.records_seen = records.len();
            state.set(s).await;

            Ok(MethodOutcome::Value(Value::Array(records)))
        })?
        .listen("validate", TriggerSpec::Simple("ingest".to_string()), |state, input| async move {
            let records = input.as_single().and_then(Value::as_array).cloned().unwrap_or_default();
            let valid: Vec<Value> = records.into_iter()
                                            .filter(|r| r.get("id").and_then(Value::as_str).is_some())
                                            .collect();

            let mut s = state.get().await;
            s.valid_records = valid.len();
            state.set(s).await;

            Ok(MethodOutcome::Value(json!({ "valid": valid })))
        })?
        .listen("enrich", TriggerSpec::Simple("ingest".to_string()), |state, input| async move {
            let records = input.as_single().and_then(Value::as_array).cloned().unwrap_or_default();
            let enriched: Vec<Value> = records.into_iter()
                                               .map(|mut r| {
                                                   if let Value::Object(map) = &mut r {
                                                       map.insert("enrichedAt".to_string(),
                                                                   json!(chrono::Utc::now().to_rfc3339()));
                                                   }
                                                   r
                                               })
                                               .collect();

            let mut s = state.get().await;
            s.enriched_records = enriched.len();
            state.set(s).await;

            Ok(MethodOutcome::Value(json!({ "enriched": enriched })))
        })?
        .listen("report",
                TriggerSpec::And(vec!["validate".to_string(), "enrich".to_string()]),
                |state, input| async move {
                    let MethodInput::Many(by_method) = input else {
                        return Err(FlowCoreError::Internal("report expects an AND-join input".to_string()));
                    };
                    let s = state.get().await;
                    Ok(MethodOutcome::Stop(json!({
                        "recordsSeen": s.records_seen,
                        "validCount": s.valid_records,
                        "enrichedCount": s.enriched_records,
                        "validate": by_method.get("validate"),
                        "enrich": by_method.get("enrich"),
                    })))
                })?
        .build(PipelineState::default())
}

/// A second, independent flow the demo schedules downstream of the ingest
/// pipeline: it only summarizes whatever input it is handed, standing in
/// for "a flow whose trigger is another flow's completion" at the
/// scheduler level (`flow-scheduler` handles inter-*flow* dependencies;
/// `flow-core`'s AND/OR joins handle inter-*method* dependencies within one
/// flow, as `report` does above).
pub fn build_notify_flow() -> FlowCoreResult<Flow<()>> {
    FlowBuilder::<()>::new().start("notify", |_state, input| async move {
                                let summary = input.as_single().cloned().unwrap_or(Value::Null);
                                Ok(MethodOutcome::Value(json!({ "notified": true, "of": summary })))
                            })?
                            .build(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ingest_pipeline_joins_both_branches() {
        let flow = build_ingest_pipeline().expect("pipeline builds");
        let input = json!([{ "id": "a" }, { "id": "b" }, { "missing": true }]);
        let result = flow.execute(input).await.expect("pipeline runs");

        assert_eq!(result["recordsSeen"], json!(3));
        assert_eq!(result["validCount"], json!(2));
        assert_eq!(result["enrichedCount"], json!(3));
    }

    #[tokio::test]
    async fn notify_flow_echoes_its_input() {
        let flow = build_notify_flow().expect("notify flow builds");
        let result = flow.execute(json!({ "ok": true })).await.expect("notify runs");
        assert_eq!(result["notified"], json!(true));
    }
}
