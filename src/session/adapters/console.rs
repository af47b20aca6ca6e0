//! Terminal interface: stdin for input, stdout for output.

use crate::session::domain::{HumanInput, SessionEvent};
use crate::session::ports::{HumanInterface, HumanInterfaceError};
use async_trait::async_trait;
use std::io::BufRead;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Longest tool result shown in full on the console.
const RESULT_PREVIEW_CHARS: usize = 400;

/// Console-backed human interface.
///
/// Stdin is read on a detached thread so a pending read never holds up
/// runtime shutdown. End of input is reported as
/// [`HumanInput::EndSession`].
pub struct ConsoleInterface {
    lines: AsyncMutex<mpsc::UnboundedReceiver<std::io::Result<String>>>,
    stdout: AsyncMutex<Stdout>,
}

impl ConsoleInterface {
    /// Starts the stdin reader thread.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                if sender.send(line).is_err() {
                    break;
                }
            }
            debug!("stdin closed");
        });
        Self {
            lines: AsyncMutex::new(receiver),
            stdout: AsyncMutex::new(tokio::io::stdout()),
        }
    }

    async fn write(&self, text: &str) -> Result<(), HumanInterfaceError> {
        let mut stdout = self.stdout.lock().await;
        stdout
            .write_all(text.as_bytes())
            .await
            .map_err(HumanInterfaceError::io)?;
        stdout.flush().await.map_err(HumanInterfaceError::io)
    }
}

impl Default for ConsoleInterface {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConsoleInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleInterface").finish_non_exhaustive()
    }
}

#[async_trait]
impl HumanInterface for ConsoleInterface {
    async fn read_input(&self, prompt: &str) -> Result<HumanInput, HumanInterfaceError> {
        self.write(prompt).await?;
        let next = self.lines.lock().await.recv().await;
        match next {
            Some(Ok(line)) => Ok(HumanInput::Message(line)),
            Some(Err(err)) => Err(HumanInterfaceError::io(err)),
            None => Ok(HumanInput::EndSession),
        }
    }

    async fn display(&self, event: &SessionEvent) -> Result<(), HumanInterfaceError> {
        self.write(&format_event(event)).await
    }
}

/// Renders an event as console text, newline included.
pub(crate) fn format_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::AssistantText(text) => format!("\n{text}\n\n"),
        SessionEvent::ToolCall {
            tool, arguments, ..
        } => format!("[tool] {tool} {arguments}\n"),
        SessionEvent::ToolResult {
            call_id,
            success,
            content,
        } => {
            let outcome = if *success { "ok" } else { "error" };
            format!("[tool] {call_id} {outcome}: {}\n", preview(content))
        }
        SessionEvent::Notice(text) => format!("{text}\n"),
        SessionEvent::Error(text) => format!("error: {text}\n"),
    }
}

fn preview(content: &str) -> String {
    if content.chars().count() <= RESULT_PREVIEW_CHARS {
        return content.to_owned();
    }
    let head: String = content.chars().take(RESULT_PREVIEW_CHARS).collect();
    format!("{head}...")
}

/// Cancels `token` when the process receives Ctrl-C.
///
/// The watcher exits on its own once the token is cancelled.
#[must_use]
pub fn cancel_on_ctrl_c(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if signal.is_ok() {
                    info!("interrupt received, cancelling session");
                    token.cancel();
                }
            }
            () = token.cancelled() => {}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(SessionEvent::Notice("2 servers".to_owned()), "2 servers\n")]
    #[case(SessionEvent::Error("model timed out".to_owned()), "error: model timed out\n")]
    #[case(
        SessionEvent::ToolCall { call_id: "c1".to_owned(), tool: "echo".to_owned(), arguments: json!({"a": 1}) },
        "[tool] echo {\"a\":1}\n"
    )]
    #[case(
        SessionEvent::ToolResult { call_id: "c1".to_owned(), success: false, content: "boom".to_owned() },
        "[tool] c1 error: boom\n"
    )]
    fn events_render_as_lines(#[case] event: SessionEvent, #[case] expected: &str) {
        assert_eq!(format_event(&event), expected);
    }

    #[rstest]
    fn long_results_are_truncated() {
        let content = "x".repeat(RESULT_PREVIEW_CHARS + 10);
        let rendered = preview(&content);
        assert!(rendered.ends_with("..."));
        assert_eq!(rendered.chars().count(), RESULT_PREVIEW_CHARS + 3);
    }
}
