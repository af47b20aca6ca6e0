//! The session loop: human input, model turns and tool dispatch.

use super::human_tool::HumanInputTool;
use crate::SharedClock;
use crate::conversation::domain::{ContentPart, Role, ToolCallPart};
use crate::conversation::services::{ConversationState, StagedExchange};
use crate::model::domain::{ModelRequest, ModelResponse};
use crate::model::ports::ModelBackend;
use crate::routing::domain::ToolCallRequest;
use crate::routing::services::{RouteError, ToolRouter, result_part};
use crate::session::domain::{
    HumanInput, SessionCommand, SessionConfig, SessionEvent, SessionFatalError, SessionState,
    TerminationReason, render_instruction,
};
use crate::session::ports::HumanInterface;
use crate::tool_registry::services::ConnectionPool;
use camino::Utf8Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// How a finished session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    /// Why the loop stopped.
    pub reason: TerminationReason,
    /// Turns left in the conversation.
    pub turns: usize,
    /// Connections closed on the way out.
    pub connections_closed: usize,
}

/// Whether an exchange ran to completion, was cancelled or was ended by
/// the human.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Cancelled,
    Ended,
}

/// Outcome of one batch of tool calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Round {
    Committed,
    Rejected,
    Cancelled,
    Ended,
}

/// One running agent.
///
/// The session is the only writer of its conversation. It owns the router
/// (and through it a shared handle on the pool) and closes the pool exactly
/// once when [`run`](Self::run) returns, whatever the reason.
pub struct Session {
    config: SessionConfig,
    instruction: String,
    conversation: ConversationState,
    router: ToolRouter,
    model: Arc<dyn ModelBackend>,
    human: Arc<dyn HumanInterface>,
    state: SessionState,
    cancel: CancellationToken,
    ended: CancellationToken,
}

impl Session {
    /// Builds a session over a connected pool.
    ///
    /// When human input is enabled the model is also offered the
    /// `__human_input__` tool. Ending the session at that tool's prompt ends
    /// the whole session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionFatalError::Instruction`] when the instruction
    /// template does not render.
    pub fn new(
        config: SessionConfig,
        pool: Arc<ConnectionPool>,
        model: Arc<dyn ModelBackend>,
        human: Arc<dyn HumanInterface>,
        clock: SharedClock,
    ) -> Result<Self, SessionFatalError> {
        let instruction = render_instruction(config.instruction(), clock.utc())?;
        let ended = CancellationToken::new();
        let router = ToolRouter::new(pool, config.tool_timeout());
        let router = if config.human_input() {
            router.with_local_tool(Arc::new(HumanInputTool::new(
                Arc::clone(&human),
                ended.clone(),
            )))
        } else {
            router
        };
        Ok(Self {
            config,
            instruction,
            conversation: ConversationState::new(clock),
            router,
            model,
            human,
            state: SessionState::Idle,
            cancel: CancellationToken::new(),
            ended,
        })
    }

    /// Returns the token that cancels this session.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Returns the session settings.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the rendered instruction.
    #[must_use]
    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Returns the current loop state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the conversation log.
    #[must_use]
    pub const fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    /// Returns the tool router.
    #[must_use]
    pub const fn router(&self) -> &ToolRouter {
        &self.router
    }

    /// Runs the loop until the human ends it, it is cancelled or a fatal
    /// error occurs. The pool is closed before this returns.
    ///
    /// # Errors
    ///
    /// Returns a [`SessionFatalError`] when the loop cannot continue.
    pub async fn run(&mut self) -> Result<SessionSummary, SessionFatalError> {
        let span = info_span!(
            "session",
            agent = %self.config.name(),
            model = %self.config.model()
        );
        async {
            info!(
                servers = self.router.pool().len(),
                ready = self.router.pool().ready_count(),
                human_input = self.config.human_input(),
                use_history = self.config.use_history(),
                "session started"
            );
            let outcome = self.drive().await;
            self.state = SessionState::Terminated;
            let connections_closed = self.router.pool().close().await;
            match &outcome {
                Ok(reason) => info!(%reason, connections_closed, "session terminated"),
                Err(err) => error!(error = %err, connections_closed, "session failed"),
            }
            outcome.map(|reason| SessionSummary {
                reason,
                turns: self.conversation.len(),
                connections_closed,
            })
        }
        .instrument(span)
        .await
    }

    async fn drive(&mut self) -> Result<TerminationReason, SessionFatalError> {
        if !self.config.human_input() {
            return self.run_single_shot().await;
        }
        loop {
            self.transition(SessionState::AwaitingHumanInput)?;
            self.ensure_live_servers()?;
            let Some(input) = self.read_input().await? else {
                return Ok(TerminationReason::Cancelled);
            };
            let HumanInput::Message(text) = input else {
                return Ok(TerminationReason::EndSignal);
            };
            if let Some(parsed) = SessionCommand::parse(&text) {
                match parsed {
                    Ok(SessionCommand::Exit) => return Ok(TerminationReason::EndSignal),
                    Ok(command) => {
                        if self.command(command).await? == Flow::Cancelled {
                            return Ok(TerminationReason::Cancelled);
                        }
                    }
                    Err(err) => self.display(&SessionEvent::Error(err.to_string())).await?,
                }
                continue;
            }
            if text.trim().is_empty() {
                continue;
            }
            match self.exchange(text).await? {
                Flow::Continue => {}
                Flow::Cancelled => return Ok(TerminationReason::Cancelled),
                Flow::Ended => return Ok(TerminationReason::EndSignal),
            }
        }
    }

    async fn run_single_shot(&mut self) -> Result<TerminationReason, SessionFatalError> {
        let message = match self.config.message() {
            Some(text) => text.to_owned(),
            None => {
                self.transition(SessionState::AwaitingHumanInput)?;
                match self.read_input().await? {
                    None => return Ok(TerminationReason::Cancelled),
                    Some(HumanInput::EndSession) => return Ok(TerminationReason::EndSignal),
                    Some(HumanInput::Message(text)) => text,
                }
            }
        };
        match self.exchange(message).await? {
            Flow::Continue => Ok(TerminationReason::Completed),
            Flow::Cancelled => Ok(TerminationReason::Cancelled),
            Flow::Ended => Ok(TerminationReason::EndSignal),
        }
    }

    /// Reads one input; `None` when the session was cancelled first.
    async fn read_input(&self) -> Result<Option<HumanInput>, SessionFatalError> {
        let prompt = format!("{} > ", self.config.name());
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Ok(None),
            input = self.human.read_input(&prompt) => Ok(Some(input?)),
        }
    }

    /// Handles one human message through to the model's final answer.
    async fn exchange(&mut self, text: String) -> Result<Flow, SessionFatalError> {
        self.conversation
            .append(Role::Human, vec![ContentPart::text(text)])?;
        let mut rounds: u32 = 0;
        loop {
            self.ensure_live_servers()?;
            self.transition(SessionState::ModelInvocation)?;
            let request = self.model_request();
            debug!(
                round = rounds,
                turns = request.turns.len(),
                tools = request.tools.len(),
                "invoking model"
            );
            let response = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Ok(Flow::Cancelled),
                response = self.model.complete(&request) => response,
            };
            let (text, calls) = match response {
                Ok(ModelResponse::Text(answer)) => {
                    self.reply(answer).await?;
                    return Ok(Flow::Continue);
                }
                Ok(ModelResponse::ToolCalls { text, calls }) if calls.is_empty() => {
                    match text {
                        Some(answer) => self.reply(answer).await?,
                        None => {
                            self.report("model returned neither text nor tool calls")
                                .await?;
                        }
                    }
                    return Ok(Flow::Continue);
                }
                Ok(ModelResponse::ToolCalls { text, calls }) => (text, calls),
                Err(err) => {
                    warn!(error = %err, "model call failed");
                    self.report(&format!("model error: {err}")).await?;
                    return Ok(Flow::Continue);
                }
            };
            if rounds >= self.config.max_tool_rounds() {
                warn!(rounds, "tool round limit reached");
                self.report(&format!(
                    "stopped after {rounds} tool rounds without a final answer"
                ))
                .await?;
                return Ok(Flow::Continue);
            }
            rounds = rounds.saturating_add(1);
            match self.dispatch(text, calls).await? {
                Round::Committed => {}
                Round::Rejected => return Ok(Flow::Continue),
                Round::Cancelled => return Ok(Flow::Cancelled),
                Round::Ended => return Ok(Flow::Ended),
            }
        }
    }

    /// Runs one batch of tool calls and commits the calls with their
    /// results. A batch that is cancelled, or in which the human ends the
    /// session, is discarded without touching the log.
    async fn dispatch(
        &mut self,
        text: Option<String>,
        calls: Vec<ToolCallPart>,
    ) -> Result<Round, SessionFatalError> {
        let requests: Vec<ToolCallRequest> = calls.iter().map(ToolCallRequest::from).collect();
        let mut staged = StagedExchange::new();
        if let Err(err) = staged.push_tool_calls(text.clone(), calls) {
            warn!(error = %err, "model issued invalid tool calls");
            self.report(&format!("model returned invalid tool calls: {err}"))
                .await?;
            return Ok(Round::Rejected);
        }
        self.transition(SessionState::ToolDispatch)?;
        if let Some(preamble) = text.filter(|value| !value.trim().is_empty()) {
            self.display(&SessionEvent::AssistantText(preamble)).await?;
        }
        for request in &requests {
            self.display(&SessionEvent::ToolCall {
                call_id: request.call_id.clone(),
                tool: request.tool.clone(),
                arguments: request.arguments.clone(),
            })
            .await?;
        }

        let outcomes = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                info!(calls = requests.len(), "session cancelled during tool dispatch");
                return Ok(Round::Cancelled);
            }
            () = self.ended.cancelled() => {
                info!(calls = requests.len(), "session ended during tool dispatch");
                return Ok(Round::Ended);
            }
            outcomes = self.router.dispatch_all(&requests) => outcomes,
        };
        if outcomes
            .iter()
            .any(|outcome| outcome.as_ref().err().is_some_and(RouteError::ends_session))
        {
            info!(calls = requests.len(), "session ended during tool dispatch");
            return Ok(Round::Ended);
        }

        for (request, outcome) in requests.iter().zip(outcomes) {
            let result = result_part(request, outcome);
            self.display(&SessionEvent::ToolResult {
                call_id: result.call_id.clone(),
                success: result.success,
                content: result.content_text(),
            })
            .await?;
            staged.push_result(result)?;
        }
        let committed = self.conversation.commit(staged)?;
        debug!(committed, "tool exchange committed");
        Ok(Round::Committed)
    }

    async fn reply(&mut self, answer: String) -> Result<(), SessionFatalError> {
        self.conversation
            .append(Role::Assistant, vec![ContentPart::text(answer.clone())])?;
        self.display(&SessionEvent::AssistantText(answer)).await
    }

    async fn report(&self, message: &str) -> Result<(), SessionFatalError> {
        self.display(&SessionEvent::Error(message.to_owned())).await
    }

    async fn display(&self, event: &SessionEvent) -> Result<(), SessionFatalError> {
        Ok(self.human.display(event).await?)
    }

    fn model_request(&self) -> ModelRequest {
        ModelRequest {
            model: self.config.model().clone(),
            instruction: self.instruction.clone(),
            turns: self.conversation.model_context(self.config.use_history()),
            tools: self.router.available_tools(),
        }
    }

    fn ensure_live_servers(&self) -> Result<(), SessionFatalError> {
        let pool = self.router.pool();
        if !pool.is_empty() && pool.live_count() == 0 {
            warn!(servers = pool.len(), "every server connection is closed");
            return Err(SessionFatalError::NoLiveServers);
        }
        Ok(())
    }

    fn transition(&mut self, next: SessionState) -> Result<(), SessionFatalError> {
        if self.state == next && !next.is_terminal() {
            return Ok(());
        }
        if !self.state.can_transition_to(next) {
            return Err(SessionFatalError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!(from = %self.state, to = %next, "session state changed");
        self.state = next;
        Ok(())
    }

    /// Runs one command unless the session is cancelled first.
    async fn command(&mut self, command: SessionCommand) -> Result<Flow, SessionFatalError> {
        let name = command.name();
        let cancel = self.cancel.clone();
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!(command = name, "session cancelled while running a command");
                Ok(Flow::Cancelled)
            }
            outcome = self.run_command(command) => outcome.map(|()| Flow::Continue),
        }
    }

    async fn run_command(&mut self, command: SessionCommand) -> Result<(), SessionFatalError> {
        debug!(command = command.name(), "running command");
        let event = match command {
            SessionCommand::Help => SessionEvent::Notice(SessionCommand::HELP.to_owned()),
            SessionCommand::Tools => SessionEvent::Notice(self.describe_tools()),
            SessionCommand::Servers => SessionEvent::Notice(self.describe_servers().await),
            SessionCommand::Clear => {
                let removed = self.conversation.clear();
                SessionEvent::Notice(format!("cleared {removed} turns"))
            }
            SessionCommand::Reconnect(name) => match self.router.pool().reconnect(&name).await {
                Ok(capabilities) => SessionEvent::Notice(format!(
                    "{name} reconnected with {} tools",
                    capabilities.tools().len()
                )),
                Err(err) => SessionEvent::Error(err.to_string()),
            },
            SessionCommand::Refresh(name) => match self.router.pool().refresh(&name).await {
                Ok(capabilities) => SessionEvent::Notice(format!(
                    "{name} now serves {} tools",
                    capabilities.tools().len()
                )),
                Err(err) => SessionEvent::Error(err.to_string()),
            },
            SessionCommand::Save(path) => match self.save(&path).await {
                Ok(turns) => SessionEvent::Notice(format!("saved {turns} turns to {path}")),
                Err(message) => SessionEvent::Error(message),
            },
            SessionCommand::Exit => SessionEvent::Notice("ending session".to_owned()),
        };
        self.display(&event).await
    }

    fn describe_tools(&self) -> String {
        let tools = self.router.available_tools();
        if tools.is_empty() {
            return "no tools available".to_owned();
        }
        tools
            .iter()
            .map(|tool| {
                if tool.description.is_empty() {
                    tool.name.clone()
                } else {
                    format!("{}: {}", tool.name, tool.description)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn describe_servers(&self) -> String {
        let report = self.router.pool().health_report().await;
        if report.is_empty() {
            return "no servers configured".to_owned();
        }
        report
            .iter()
            .map(|server| {
                let detail = server
                    .health
                    .message()
                    .map(|message| format!(" ({message})"))
                    .unwrap_or_default();
                format!(
                    "{}: {}, {}{detail}, {} tools",
                    server.name,
                    server.status,
                    server.health.status(),
                    server.tool_count
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn save(&self, path: &Utf8Path) -> Result<usize, String> {
        let json = self
            .conversation
            .export_json()
            .map_err(|err| err.to_string())?;
        tokio::fs::write(path.as_std_path(), json)
            .await
            .map_err(|err| format!("could not write {path}: {err}"))?;
        Ok(self.conversation.len())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("conversation", &self.conversation)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}
