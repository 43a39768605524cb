//! `flow-cli`: the scheduler CLI surface from spec.md §6.
//!
//! Exit codes: 0 success, 1 usage error, 2 execution failure, matching
//! `chem-cli`'s convention of a single `main` that maps errors to a process
//! exit code rather than panicking.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use flow_cli::errors::CliError;
use flow_cli::flow_def::FlowDefinition;
use flow_cli::reset::{self, MemoryBackendSelector};
use flow_cli::services::{ChatService, StubChatService, StubTrainingService, TrainingService};
use flow_events::{kind, Event, EventBus};
use flow_memory::{InMemoryBackend, MemoryConfig, MemoryConnector};
use flow_scheduler::{FlowScheduler, SchedulerOptions};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "flow-cli")]
#[command(about = "Run and inspect flow-execution-engine flows")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a flow definition by path, instantiate, execute with optional
    /// input JSON; prints elapsed time and result JSON.
    RunFlow {
        path: PathBuf,
        #[arg(long)]
        input: Option<String>,
        #[arg(long)]
        verbose: bool,
    },
    /// Clear the named memory back-ends; at least one selector is required.
    ResetMemories {
        #[arg(long)]
        long: bool,
        #[arg(long)]
        short: bool,
        #[arg(long)]
        entities: bool,
        #[arg(long)]
        knowledge: bool,
        #[arg(long = "kickoff-outputs")]
        kickoff_outputs: bool,
        #[arg(long)]
        all: bool,
    },
    /// Invoke the external training service; writes results JSON.
    TrainCrew {
        #[arg(short = 'n', long = "iterations", default_value_t = 1)]
        iterations: u32,
        #[arg(short = 'f', long = "filename", default_value = "training_output.json")]
        filename: PathBuf,
        #[arg(long)]
        verbose: bool,
    },
    /// Interactive REPL; `exit` or SIGINT terminates cleanly.
    Chat {
        #[arg(short = 'm', long = "model", default_value = "flowforge-default")]
        model: String,
        #[arg(short = 'v', long)]
        verbose: bool,
        #[arg(long = "no-stream")]
        no_stream: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::try_init().ok();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::RunFlow { path, input, verbose } => run_flow(path, input, verbose).await,
        Commands::ResetMemories { long, short, entities, knowledge, kickoff_outputs, all } => {
            reset_memories(long, short, entities, knowledge, kickoff_outputs, all).await
        }
        Commands::TrainCrew { iterations, filename, verbose } => train_crew(iterations, filename, verbose).await,
        Commands::Chat { model, verbose, no_stream } => chat(model, verbose, no_stream).await,
    };

    match result {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            eprintln!("{}: {}", category_label(&err), err);
            std::process::exit(err.exit_code());
        }
    }
}

fn category_label(err: &CliError) -> &'static str {
    match err {
        CliError::Usage(_) => "usage error",
        CliError::Execution(_) => "execution error",
    }
}

async fn run_flow(path: PathBuf, input: Option<String>, verbose: bool) -> Result<(), CliError> {
    let definition = FlowDefinition::load(&path)?;
    let mut scheduler = FlowScheduler::new();

    let (bus, _bus_handle) = EventBus::spawn();
    if verbose {
        bus.on(kind::WILDCARD, Arc::new(trace_event));
        scheduler = scheduler.with_bus(bus);
    }

    definition.register_into(&mut scheduler)?;

    let input_data = match input {
        Some(raw) => serde_json::from_str(&raw)?,
        None => serde_json::Value::Null,
    };
    let options = SchedulerOptions::new().with_input_data(input_data);

    let start = Instant::now();
    let result = scheduler.execute(options).await?;
    let elapsed_ms = start.elapsed().as_millis();

    println!("elapsed: {elapsed_ms}ms");
    let summary = serde_json::json!({
        "successful": result.successful,
        "completed": result.completed.len(),
        "failed": result.failed.len(),
        "skipped": result.skipped.len(),
        "results": result.results,
        "errors": result.errors,
        "criticalPathExecutionTimeMs": result.critical_path_execution_time_ms,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    if !result.successful {
        return Err(CliError::Execution(result.fatal_error.unwrap_or_else(|| "one or more flows failed".to_string())));
    }
    Ok(())
}

fn trace_event(event: &Event) {
    tracing::info!(event_type = %event.event_type, payload = %event.payload, "event");
}

async fn reset_memories(long: bool, short: bool, entities: bool, knowledge: bool, kickoff_outputs: bool, all: bool)
                         -> Result<(), CliError> {
    let mut selectors = Vec::new();
    if all {
        selectors.extend_from_slice(&MemoryBackendSelector::ALL);
    } else {
        if long {
            selectors.push(MemoryBackendSelector::Long);
        }
        if short {
            selectors.push(MemoryBackendSelector::Short);
        }
        if entities {
            selectors.push(MemoryBackendSelector::Entities);
        }
        if knowledge {
            selectors.push(MemoryBackendSelector::Knowledge);
        }
        if kickoff_outputs {
            selectors.push(MemoryBackendSelector::KickoffOutputs);
        }
    }

    if selectors.is_empty() {
        return Err(CliError::Usage("at least one memory selector is required (--long/--short/--entities/\
                                     --knowledge/--kickoff-outputs/--all)"
            .to_string()));
    }

    let connector = MemoryConnector::new(Arc::new(InMemoryBackend::new()), MemoryConfig::from_env());
    let removed = reset::reset(&connector, &selectors).await;

    let mut names: Vec<&&str> = removed.keys().collect();
    names.sort();
    for name in names {
        println!("cleared {name}: {} item(s)", removed[name]);
    }
    Ok(())
}

async fn train_crew(iterations: u32, filename: PathBuf, verbose: bool) -> Result<(), CliError> {
    if verbose {
        tracing::info!(iterations, filename = %filename.display(), "starting training run");
    }
    let service = StubTrainingService;
    let result = service.train(iterations, &filename.display().to_string())
                         .await
                         .map_err(CliError::Execution)?;

    let json = serde_json::to_string_pretty(&result)?;
    std::fs::write(&filename, &json)?;
    println!("training results written to {}", filename.display());
    Ok(())
}

async fn chat(model: String, verbose: bool, no_stream: bool) -> Result<(), CliError> {
    let service = StubChatService;
    println!("flow-cli chat (model: {model}) — type 'exit' to quit");

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                println!("\ninterrupted, exiting");
                return Ok(());
            }
            line = lines.next_line() => {
                let Some(line) = line.map_err(|e| CliError::Execution(e.to_string()))? else {
                    return Ok(());
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" {
                    return Ok(());
                }

                if verbose {
                    tracing::debug!(message = line, no_stream, "sending chat message");
                }

                let reply = service.send(&model, line).await.map_err(CliError::Execution)?;
                println!("{reply}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }
}
