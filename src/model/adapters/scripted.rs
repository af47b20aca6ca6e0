//! Scripted backend for tests and demos.

use crate::conversation::domain::ToolCallPart;
use crate::model::domain::{ModelRequest, ModelResponse};
use crate::model::ports::{ModelBackend, ModelBackendError, ModelBackendResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone)]
struct ScriptStep {
    outcome: ModelBackendResult<ModelResponse>,
    latency: Option<Duration>,
}

#[derive(Debug, Default)]
struct ScriptState {
    steps: VecDeque<ScriptStep>,
    requests: Vec<ModelRequest>,
}

/// Backend that replays queued responses in order and records every
/// request it receives.
///
/// Clones share the same script, so a test can keep a handle for
/// inspection after handing the backend to a session.
#[derive(Debug, Clone, Default)]
pub struct ScriptedModel {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedModel {
    /// Creates a backend with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, outcome: ModelBackendResult<ModelResponse>, latency: Option<Duration>) {
        self.lock()
            .steps
            .push_back(ScriptStep { outcome, latency });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues a text answer.
    #[must_use]
    pub fn then_text(self, text: impl Into<String>) -> Self {
        self.push(Ok(ModelResponse::Text(text.into())), None);
        self
    }

    /// Queues a batch of tool calls.
    #[must_use]
    pub fn then_tool_calls(self, calls: Vec<ToolCallPart>) -> Self {
        self.push(Ok(ModelResponse::ToolCalls { text: None, calls }), None);
        self
    }

    /// Queues an arbitrary response delivered after `latency`.
    #[must_use]
    pub fn then_delayed(self, response: ModelResponse, latency: Duration) -> Self {
        self.push(Ok(response), Some(latency));
        self
    }

    /// Queues a backend failure.
    #[must_use]
    pub fn then_error(self, error: ModelBackendError) -> Self {
        self.push(Err(error), None);
        self
    }

    /// Returns every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.lock().requests.clone()
    }

    /// Returns how many queued responses are left.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.lock().steps.len()
    }
}

#[async_trait]
impl ModelBackend for ScriptedModel {
    async fn complete(&self, request: &ModelRequest) -> ModelBackendResult<ModelResponse> {
        let step = {
            let mut state = self.lock();
            state.requests.push(request.clone());
            state.steps.pop_front()
        };
        let Some(next) = step else {
            return Err(ModelBackendError::Exhausted);
        };
        if let Some(latency) = next.latency {
            tokio::time::sleep(latency).await;
        }
        next.outcome
    }
}
