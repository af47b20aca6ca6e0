//! The built-in tool that lets the model ask the human a question.

use crate::model::domain::ToolSchema;
use crate::routing::ports::{LocalTool, LocalToolError};
use crate::session::domain::{HumanInput, SessionEvent};
use crate::session::ports::HumanInterface;
use crate::tool_registry::domain::ToolOutput;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Name under which the tool is offered to the model.
pub const HUMAN_INPUT_TOOL: &str = "__human_input__";

/// Asks the human a question and returns their answer as the tool result.
///
/// Questions from one batch are asked one at a time: each question is shown
/// and answered before the next is displayed. When the human ends the
/// session at the answer prompt the tool cancels `ended` and fails with
/// [`LocalToolError::SessionEnded`].
pub struct HumanInputTool {
    human: Arc<dyn HumanInterface>,
    ended: CancellationToken,
    asking: Mutex<()>,
}

impl HumanInputTool {
    /// Creates the tool over a human interface.
    #[must_use]
    pub fn new(human: Arc<dyn HumanInterface>, ended: CancellationToken) -> Self {
        Self {
            human,
            ended,
            asking: Mutex::new(()),
        }
    }
}

#[async_trait]
impl LocalTool for HumanInputTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            HUMAN_INPUT_TOOL,
            "Ask the human a question and wait for their answer",
            json!({
                "type": "object",
                "properties": {
                    "prompt": {
                        "type": "string",
                        "description": "The question to show the human"
                    }
                },
                "required": ["prompt"]
            }),
        )
    }

    async fn call(&self, arguments: &Value) -> Result<ToolOutput, LocalToolError> {
        let prompt = arguments
            .get("prompt")
            .and_then(Value::as_str)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| LocalToolError::InvalidArguments("prompt must be a non-empty string".to_owned()))?;
        info!("model requested human input");
        let _turn = self.asking.lock().await;
        if self.ended.is_cancelled() {
            return Err(LocalToolError::SessionEnded);
        }
        self.human
            .display(&SessionEvent::Notice(prompt.to_owned()))
            .await
            .map_err(|err| LocalToolError::Failed(err.to_string()))?;
        match self.human.read_input("answer > ").await {
            Ok(HumanInput::Message(answer)) => Ok(ToolOutput::text(answer)),
            Ok(HumanInput::EndSession) => {
                info!("human ended the session at the answer prompt");
                self.ended.cancel();
                Err(LocalToolError::SessionEnded)
            }
            Err(err) => Err(LocalToolError::Failed(err.to_string())),
        }
    }
}

impl std::fmt::Debug for HumanInputTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HumanInputTool")
            .field("ended", &self.ended.is_cancelled())
            .finish_non_exhaustive()
    }
}
