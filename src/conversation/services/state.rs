//! The ordered, append-only conversation log.

use crate::SharedClock;
use crate::conversation::domain::{
    ContentPart, ConversationError, Role, SequenceNumber, ToolCallPart, ToolResultPart, Turn,
    TurnDraft,
};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Immutable view of the turns at the moment it was taken.
///
/// A snapshot is finite and restartable: [`iter`](Self::iter) can be called
/// any number of times and always yields the same turns in sequence order.
/// Later appends to the log do not show up in an existing snapshot.
#[derive(Debug, Clone, Default)]
pub struct ConversationSnapshot {
    turns: Arc<[Arc<Turn>]>,
}

impl ConversationSnapshot {
    /// Iterates over the turns in sequence order.
    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter().map(AsRef::as_ref)
    }

    /// Returns the number of turns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Returns whether the snapshot holds no turns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Returns the last turn.
    #[must_use]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last().map(AsRef::as_ref)
    }

    /// Copies the turns out.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Turn> {
        self.iter().cloned().collect()
    }
}

impl Serialize for ConversationSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

/// Turns staged for an atomic commit.
///
/// The session stages an assistant tool-call turn together with the results
/// of its calls, then commits them in one step. Dropping a staged exchange
/// discards it without touching the log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagedExchange {
    drafts: Vec<TurnDraft>,
}

impl StagedExchange {
    /// Creates an empty exchange.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a turn.
    ///
    /// # Errors
    ///
    /// Returns a [`ConversationError`] when the content violates the role's
    /// rules or reuses a staged call identifier.
    pub fn push(&mut self, role: Role, content: Vec<ContentPart>) -> Result<(), ConversationError> {
        let draft = TurnDraft::new(role, content)?;
        let mut seen: BTreeSet<&str> = self.staged_call_ids().collect();
        for call_id in call_ids(&draft) {
            if !seen.insert(call_id) {
                return Err(ConversationError::DuplicateToolCall(call_id.to_owned()));
            }
        }
        self.drafts.push(draft);
        Ok(())
    }

    fn staged_call_ids(&self) -> impl Iterator<Item = &str> {
        self.drafts.iter().flat_map(call_ids)
    }

    /// Stages an assistant turn carrying optional text and tool calls.
    ///
    /// # Errors
    ///
    /// Returns a [`ConversationError`] when the turn would be empty or a call
    /// is invalid.
    pub fn push_tool_calls(
        &mut self,
        text: Option<String>,
        calls: Vec<ToolCallPart>,
    ) -> Result<(), ConversationError> {
        let content = text
            .filter(|value| !value.trim().is_empty())
            .map(ContentPart::text)
            .into_iter()
            .chain(calls.into_iter().map(ContentPart::ToolCall))
            .collect();
        self.push(Role::Assistant, content)
    }

    /// Stages the result of one tool call.
    ///
    /// # Errors
    ///
    /// Returns a [`ConversationError`] only if the draft is malformed, which
    /// a single result never is.
    pub fn push_result(&mut self, result: ToolResultPart) -> Result<(), ConversationError> {
        self.push(Role::ToolResult, vec![ContentPart::ToolResult(result)])
    }

    /// Returns the staged drafts.
    #[must_use]
    pub fn drafts(&self) -> &[TurnDraft] {
        &self.drafts
    }

    /// Returns whether nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }

    /// Checks that every staged call has exactly one staged result and that
    /// every staged result answers a staged call.
    fn check_pairing(&self) -> Result<(), ConversationError> {
        let mut pending: BTreeMap<&str, usize> = BTreeMap::new();
        for draft in &self.drafts {
            for part in draft.content() {
                match part {
                    ContentPart::ToolCall(call) => {
                        pending.insert(call.call_id.as_str(), 0);
                    }
                    ContentPart::ToolResult(result) => {
                        let Some(count) = pending.get_mut(result.call_id.as_str()) else {
                            return Err(ConversationError::UnmatchedToolResult(
                                result.call_id.clone(),
                            ));
                        };
                        if *count > 0 {
                            return Err(ConversationError::UnmatchedToolResult(
                                result.call_id.clone(),
                            ));
                        }
                        *count = 1;
                    }
                    ContentPart::Text(_) => {}
                }
            }
        }
        let unresolved: Vec<String> = pending
            .into_iter()
            .filter(|(_, count)| *count == 0)
            .map(|(call_id, _)| call_id.to_owned())
            .collect();
        if unresolved.is_empty() {
            Ok(())
        } else {
            Err(ConversationError::UnresolvedToolCalls(unresolved))
        }
    }
}

fn call_ids(draft: &TurnDraft) -> impl Iterator<Item = &str> {
    draft.content().iter().filter_map(|part| match part {
        ContentPart::ToolCall(call) => Some(call.call_id.as_str()),
        ContentPart::Text(_) | ContentPart::ToolResult(_) => None,
    })
}

/// The conversation log of one session.
///
/// Only the session mutates the log. Sequence numbers increase strictly and
/// are never reused, so replaying a snapshot reproduces append order.
pub struct ConversationState {
    turns: Vec<Arc<Turn>>,
    last_sequence: SequenceNumber,
    clock: SharedClock,
}

impl ConversationState {
    /// Creates an empty log.
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        Self {
            turns: Vec::new(),
            last_sequence: SequenceNumber::new(0),
            clock,
        }
    }

    /// Appends one turn.
    ///
    /// # Errors
    ///
    /// Returns a [`ConversationError`] when the content violates the role's
    /// rules; the log is unchanged.
    pub fn append(
        &mut self,
        role: Role,
        content: Vec<ContentPart>,
    ) -> Result<&Turn, ConversationError> {
        let sequence = self.last_sequence.next();
        let turn = Turn::new(role, content, sequence, self.clock.as_ref())?;
        self.last_sequence = sequence;
        self.turns.push(Arc::new(turn));
        debug!(role = %role, sequence = sequence.value(), "turn appended");
        self.turns
            .last()
            .map(AsRef::as_ref)
            .ok_or(ConversationError::EmptyContent(role))
    }

    /// Appends every staged turn, or none of them.
    ///
    /// Returns the number of turns committed.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::UnresolvedToolCalls`] or
    /// [`ConversationError::UnmatchedToolResult`] when calls and results do
    /// not pair up; the log is unchanged.
    pub fn commit(&mut self, staged: StagedExchange) -> Result<usize, ConversationError> {
        staged.check_pairing()?;
        let mut sequence = self.last_sequence;
        let mut turns = Vec::with_capacity(staged.drafts.len());
        for draft in staged.drafts {
            sequence = sequence.next();
            let (role, content) = draft.into_parts();
            turns.push(Arc::new(Turn::new(
                role,
                content,
                sequence,
                self.clock.as_ref(),
            )?));
        }
        let committed = turns.len();
        self.turns.extend(turns);
        self.last_sequence = sequence;
        debug!(committed, last = sequence.value(), "exchange committed");
        Ok(committed)
    }

    /// Returns an immutable view of every turn.
    #[must_use]
    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            turns: self.turns.iter().cloned().collect(),
        }
    }

    /// Returns the turns to send to the model.
    ///
    /// With history the whole log is returned. Without it only the latest
    /// human turn and the turns after it are returned.
    #[must_use]
    pub fn model_context(&self, use_history: bool) -> ConversationSnapshot {
        if use_history {
            return self.snapshot();
        }
        let start = self
            .turns
            .iter()
            .rposition(|turn| turn.role() == Role::Human)
            .unwrap_or(self.turns.len());
        ConversationSnapshot {
            turns: self.turns.iter().skip(start).cloned().collect(),
        }
    }

    /// Removes every turn. Sequence numbering continues where it left off.
    ///
    /// Returns the number of turns removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.turns.len();
        self.turns.clear();
        debug!(removed, "conversation cleared");
        removed
    }

    /// Returns the number of turns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Returns whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Returns the sequence number of the most recent turn ever appended.
    #[must_use]
    pub const fn last_sequence(&self) -> SequenceNumber {
        self.last_sequence
    }

    /// Serialises the log as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConversationError::Serialization`] if encoding fails.
    pub fn export_json(&self) -> Result<String, ConversationError> {
        serde_json::to_string_pretty(&self.snapshot())
            .map_err(|err| ConversationError::Serialization(err.to_string()))
    }
}

impl std::fmt::Debug for ConversationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationState")
            .field("turns", &self.turns.len())
            .field("last_sequence", &self.last_sequence)
            .finish_non_exhaustive()
    }
}
