//! `flowforge`: demo binary wiring the flow-execution workspace together —
//! builds the sample ingest pipeline (`src/demo`), registers it and a
//! dependent notify flow with a `FlowScheduler`, wires a `MemoryConnector`
//! and shared `EventBus` for observability, and runs both to completion.

use std::sync::Arc;

use flowforge::demo::{build_ingest_pipeline, build_notify_flow};
use flowforge::{kind, Event, EventBus, FlowScheduler, MemoryConfig, MemoryConnector, SchedulerOptions};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let (bus, _bus_handle) = EventBus::spawn();
    bus.on(kind::WILDCARD, Arc::new(log_event));

    let memory = flow_memory_connector();

    let ingest_flow = build_ingest_pipeline()?;
    ingest_flow.on(kind::FLOW_FINISHED, Arc::new(|_| tracing::debug!("ingest pipeline finished")));
    memory.connect_to_flow(&ingest_flow, uuid::Uuid::new_v4(), "ingest-pipeline", 1);

    let notify_flow = build_notify_flow()?;

    let mut scheduler = FlowScheduler::new().with_bus(bus).with_memory(memory);

    let ingest_id = scheduler.register_flow(Arc::new(ingest_flow), None, Vec::new(), 0, Default::default())?;
    scheduler.register_flow(Arc::new(notify_flow), None, vec![ingest_id], 0, Default::default())?;

    let input = json!([
        { "id": "rec-1", "amount": 12 },
        { "id": "rec-2", "amount": 7 },
        { "missing_id": true },
    ]);

    let options = SchedulerOptions::new().with_input_data(input).with_max_concurrent(4);
    let result = scheduler.execute(options).await?;

    println!("flows completed: {}, failed: {}, skipped: {}", result.completed.len(), result.failed.len(),
             result.skipped.len());
    for (id, value) in &result.results {
        println!("{id}: {}", serde_json::to_string_pretty(value)?);
    }

    if !result.successful {
        return Err(format!("scheduler run did not succeed: {:?}", result.fatal_error).into());
    }

    Ok(())
}

fn log_event(event: &Event) {
    tracing::info!(event_type = %event.event_type, "flowforge event");
}

fn flow_memory_connector() -> Arc<MemoryConnector> {
    MemoryConnector::new(Arc::new(flow_memory::InMemoryBackend::new()), MemoryConfig::from_env())
}
