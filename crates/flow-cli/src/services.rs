//! External-collaborator trait boundaries. spec.md §1 places LLM/training
//! providers out of scope ("external collaborators"); the CLI still needs a
//! seam to call through, so these traits define the contract and ship a
//! local stub sufficient to exercise `train-crew`/`chat` without pulling in
//! any concrete provider SDK.

use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait TrainingService: Send + Sync {
    async fn train(&self, iterations: u32, filename: &str) -> Result<Value, String>;
}

#[async_trait]
pub trait ChatService: Send + Sync {
    async fn send(&self, model: &str, message: &str) -> Result<String, String>;
}

/// Deterministic local stand-in: echoes back a result shaped like a real
/// training run would be, without training anything.
pub struct StubTrainingService;

#[async_trait]
impl TrainingService for StubTrainingService {
    async fn train(&self, iterations: u32, filename: &str) -> Result<Value, String> {
        Ok(serde_json::json!({
            "iterations": iterations,
            "filename": filename,
            "status": "completed",
        }))
    }
}

/// Deterministic local stand-in for a chat backend: echoes the prompt back
/// prefixed with the model name, so `chat`'s REPL loop is fully exercisable
/// without a network call.
pub struct StubChatService;

#[async_trait]
impl ChatService for StubChatService {
    async fn send(&self, model: &str, message: &str) -> Result<String, String> {
        Ok(format!("[{model}] {message}"))
    }
}
