//! Scripted human for tests and demos.

use crate::session::domain::{HumanInput, SessionEvent};
use crate::session::ports::{HumanInterface, HumanInterfaceError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Step {
    Message(String),
    End,
    Fail,
    Wait,
    Delay(Duration, String),
}

/// One thing the scripted human saw, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    /// An input prompt.
    Prompt(String),
    /// A displayed event.
    Displayed(SessionEvent),
}

#[derive(Debug, Default)]
struct ScriptState {
    steps: VecDeque<Step>,
    log: Vec<Interaction>,
}

/// Human interface that replays queued inputs and records every event.
///
/// Once the script runs out it reports [`HumanInput::EndSession`]. Clones
/// share the same script and recordings.
#[derive(Debug, Clone, Default)]
pub struct ScriptedHuman {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedHuman {
    /// Creates an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(self, step: Step) -> Self {
        self.lock().steps.push_back(step);
        self
    }

    /// Queues a line of input.
    #[must_use]
    pub fn then_message(self, text: impl Into<String>) -> Self {
        self.push(Step::Message(text.into()))
    }

    /// Queues a line of input delivered after `delay`.
    #[must_use]
    pub fn then_delayed(self, delay: Duration, text: impl Into<String>) -> Self {
        self.push(Step::Delay(delay, text.into()))
    }

    /// Queues the end-session signal.
    #[must_use]
    pub fn then_end(self) -> Self {
        self.push(Step::End)
    }

    /// Queues a read failure.
    #[must_use]
    pub fn then_fail(self) -> Self {
        self.push(Step::Fail)
    }

    /// Queues a read that never completes.
    #[must_use]
    pub fn then_wait(self) -> Self {
        self.push(Step::Wait)
    }

    /// Returns every prompt and event so far, in order.
    #[must_use]
    pub fn interactions(&self) -> Vec<Interaction> {
        self.lock().log.clone()
    }

    /// Returns every prompt shown so far.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.lock()
            .log
            .iter()
            .filter_map(|entry| match entry {
                Interaction::Prompt(prompt) => Some(prompt.clone()),
                Interaction::Displayed(_) => None,
            })
            .collect()
    }

    /// Returns every event displayed so far.
    #[must_use]
    pub fn events(&self) -> Vec<SessionEvent> {
        self.lock()
            .log
            .iter()
            .filter_map(|entry| match entry {
                Interaction::Displayed(event) => Some(event.clone()),
                Interaction::Prompt(_) => None,
            })
            .collect()
    }

    /// Returns the assistant text displayed so far.
    #[must_use]
    pub fn assistant_texts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::AssistantText(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Returns the error messages displayed so far.
    #[must_use]
    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SessionEvent::Error(text) => Some(text),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl HumanInterface for ScriptedHuman {
    async fn read_input(&self, prompt: &str) -> Result<HumanInput, HumanInterfaceError> {
        let step = {
            let mut state = self.lock();
            state.log.push(Interaction::Prompt(prompt.to_owned()));
            state.steps.pop_front()
        };
        match step {
            None | Some(Step::End) => Ok(HumanInput::EndSession),
            Some(Step::Message(text)) => Ok(HumanInput::Message(text)),
            Some(Step::Fail) => Err(HumanInterfaceError::Closed),
            Some(Step::Wait) => std::future::pending().await,
            Some(Step::Delay(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(HumanInput::Message(text))
            }
        }
    }

    async fn display(&self, event: &SessionEvent) -> Result<(), HumanInterfaceError> {
        self.lock().log.push(Interaction::Displayed(event.clone()));
        Ok(())
    }
}
