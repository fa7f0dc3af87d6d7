//! Run state machine
//!
//! `Init -> Extracting -> Generating -> Validating -> Assembling -> Done`,
//! with `Failed` reachable from every non-terminal state. Every transition
//! is checked and recorded.

use crate::error::StateMachineError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Stage of one report run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Not started
    Init,
    /// Loading records, schema validation, template, fact index
    Extracting,
    /// Producing content blocks
    Generating,
    /// Running the validation pass
    Validating,
    /// Writing artifacts
    Assembling,
    /// Artifacts written
    Done,
    /// Aborted
    Failed,
}

impl RunState {
    /// Terminal states accept no further transitions
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Lower-case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Extracting => "extracting",
            Self::Generating => "generating",
            Self::Validating => "validating",
            Self::Assembling => "assembling",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl Display for RunState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: RunState) -> Vec<RunState> {
    use RunState::{Assembling, Done, Extracting, Failed, Generating, Init, Validating};
    match from {
        Init => vec![Extracting, Failed],
        Extracting => vec![Generating, Failed],
        Generating => vec![Validating, Failed],
        Validating => vec![Assembling, Failed],
        Assembling => vec![Done, Failed],
        Done | Failed => vec![],
    }
}

/// Validates a state transition
///
/// # Errors
/// Returns [`StateMachineError::IllegalTransition`] when `to` is not
/// reachable from `from`
pub fn validate_transition(from: RunState, to: RunState) -> Result<(), StateMachineError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StateMachineError::IllegalTransition { from, to })
    }
}

/// One recorded transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// State left
    pub from: RunState,
    /// State entered
    pub to: RunState,
    /// Why the run failed, for transitions into `Failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Checked state holder with history
#[derive(Debug, Clone)]
pub struct RunStateMachine {
    state: RunState,
    history: Vec<Transition>,
}

impl Default for RunStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStateMachine {
    /// Machine in `Init`
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RunState::Init,
            history: Vec::new(),
        }
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Transitions taken so far
    #[inline]
    #[must_use]
    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    /// Move to `to`
    ///
    /// # Errors
    /// Returns error if the transition is not allowed
    pub fn advance(&mut self, to: RunState) -> Result<(), StateMachineError> {
        self.transition(to, None)
    }

    /// Move to `Failed`, recording `reason`
    ///
    /// # Errors
    /// Returns error if the machine is already terminal
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), StateMachineError> {
        self.transition(RunState::Failed, Some(reason.into()))
    }

    fn transition(&mut self, to: RunState, reason: Option<String>) -> Result<(), StateMachineError> {
        validate_transition(self.state, to)?;
        tracing::debug!("Run state {} -> {}", self.state, to);
        self.history.push(Transition {
            from: self.state,
            to,
            reason,
        });
        self.state = to;
        Ok(())
    }
}
