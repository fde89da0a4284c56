//! Session state machine.

use serde::{Deserialize, Serialize};

/// Current state of a command session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingResponse,
    Completed,
    Aborted,
}

impl SessionState {
    /// Completed and Aborted are final.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalState {
    Completed,
    Aborted,
}

impl From<TerminalState> for SessionState {
    fn from(state: TerminalState) -> Self {
        match state {
            TerminalState::Completed => Self::Completed,
            TerminalState::Aborted => Self::Aborted,
        }
    }
}

/// State machine for tracking session progress.
///
/// Once a terminal state is reached every further transition is refused.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    state: SessionState,
    log_lines: usize,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            log_lines: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `new_state`. Returns `false` if the session already ended.
    pub fn transition(&mut self, new_state: SessionState) -> bool {
        if self.state.is_terminal() {
            tracing::warn!(from = ?self.state, to = ?new_state, "Ignoring transition out of terminal state");
            return false;
        }
        tracing::debug!(from = ?self.state, to = ?new_state, "State transition");
        self.state = new_state;
        true
    }

    /// Enter a terminal state.
    pub fn finish(&mut self, end: TerminalState) -> bool {
        self.transition(end.into())
    }

    pub fn record_log_line(&mut self) {
        self.log_lines = self.log_lines.saturating_add(1);
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            log_lines: self.log_lines,
        }
    }
}

/// Session statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Stdout lines forwarded as log text.
    pub log_lines: usize,
}
